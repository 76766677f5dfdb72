//! Web generator: type the prompt into a generator web UI and scrape the result.
use std::collections::HashSet;
use std::time::Duration;

use crate::error::BackendFailure;
use crate::generation::poll::{PollPolicy, PollStatus};
use crate::generation::types::{Artifact, ArtifactData, GenerationParams, GeneratorKind, MediaKind};
use crate::web::driver::{DriverError, Locator, WebDriverClient};
use crate::web::session::{SessionError, SessionHandle, SessionManager};
use crate::web::sites::SiteProfile;

const GENERATOR: GeneratorKind = GeneratorKind::Web;

/// Result elements inspected when snapshotting the page before a job.
const SNAPSHOT_LIMIT: usize = 20;

#[derive(Debug, Clone)]
pub struct WebAutomationSettings {
    pub site_url: String,
    /// Bound on driving the page once the session is held.
    pub job_timeout: Duration,
    /// Bound on waiting for another job to release the session.
    pub acquire_timeout: Duration,
    pub result_poll_interval: Duration,
}

#[derive(Clone)]
pub struct WebAutomationAdapter {
    sessions: SessionManager,
    settings: WebAutomationSettings,
    profile: SiteProfile,
}

impl WebAutomationAdapter {
    pub fn new(sessions: SessionManager, settings: WebAutomationSettings) -> Self {
        let profile = SiteProfile::for_url(&settings.site_url);
        WebAutomationAdapter { sessions, settings, profile }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Queue wait plus page driving.
    pub fn timeout(&self) -> Duration {
        self.settings.acquire_timeout.saturating_add(self.settings.job_timeout)
    }

    pub async fn submit(
        &self,
        prompt: &str,
        kind: MediaKind,
        _params: GenerationParams,
    ) -> Result<Artifact, BackendFailure> {
        let handle = self.sessions.acquire(self.settings.acquire_timeout).await.map_err(session_failure)?;
        tracing::info!("Driving {} with browser session {}", self.settings.site_url, handle.session_id());

        let outcome = tokio::time::timeout(self.settings.job_timeout, self.drive(&handle, prompt, kind)).await;
        let result = match outcome {
            Ok(Ok(src)) => Ok(Artifact { kind, data: ArtifactData::Url(src), source_generator: GENERATOR }),
            Ok(Err(e)) => Err(self.classify(&handle, e)),
            Err(_) => Err(BackendFailure::timeout(
                GENERATOR,
                format!("page did not finish within {:?}", self.settings.job_timeout),
            )),
        };
        self.sessions.release(handle);
        result
    }

    async fn drive(&self, handle: &SessionHandle, prompt: &str, kind: MediaKind) -> Result<String, JobError> {
        let driver = self.sessions.driver();
        let session = handle.session_id();

        driver.navigate(session, &self.settings.site_url).await?;

        let input = first_match(driver, session, self.profile.input_locators())
            .await?
            .ok_or(JobError::Page("no prompt input field found"))?;
        if let Err(e) = driver.clear(session, &input).await {
            if e.is_fatal() {
                return Err(e.into());
            }
            tracing::debug!("Could not clear prompt input: {}", e);
        }
        driver.send_keys(session, &input, prompt).await?;

        let result_locator = self.profile.result_locator(kind);
        let seen: HashSet<String> = self
            .current_sources(driver, session, result_locator, SNAPSHOT_LIMIT)
            .await?
            .into_iter()
            .collect();

        let button = first_match(driver, session, self.profile.button_locators())
            .await?
            .ok_or(JobError::Page("could not find generate button"))?;
        driver.click(session, &button).await?;

        let interval = self.settings.result_poll_interval.max(Duration::from_millis(10));
        let attempts = (self.settings.job_timeout.as_millis() / interval.as_millis()).max(1) as u32;
        let seen = &seen;
        let polled = PollPolicy::fixed(attempts, interval)
            .run(|_| async move {
                let fresh = self
                    .current_sources(driver, session, result_locator, self.profile.newest)
                    .await?
                    .into_iter()
                    .find(|src| !seen.contains(src) && self.profile.accepts_src(src));
                Ok::<_, JobError>(match fresh {
                    Some(src) => PollStatus::Ready(src),
                    None => PollStatus::Pending,
                })
            })
            .await?;

        polled.map_err(|_| JobError::NoResult)
    }

    /// `src` values of the newest result elements, newest first.
    async fn current_sources(
        &self,
        driver: &WebDriverClient,
        session: &str,
        locator: Locator<'_>,
        limit: usize,
    ) -> Result<Vec<String>, JobError> {
        let elements = driver.find_elements(session, locator).await?;
        let mut sources = Vec::new();
        for element in elements.iter().rev().take(limit) {
            if let Some(src) = driver.attribute(session, element, "src").await? {
                sources.push(src);
            }
        }
        Ok(sources)
    }

    fn classify(&self, handle: &SessionHandle, err: JobError) -> BackendFailure {
        match err {
            JobError::Driver(e) if e.is_fatal() => {
                handle.mark_failed(&e.to_string());
                BackendFailure::unreachable(GENERATOR, e.to_string())
            }
            JobError::Driver(DriverError::Timeout(msg)) => BackendFailure::timeout(GENERATOR, msg),
            JobError::Driver(e @ DriverError::Protocol(_)) => BackendFailure::invalid_response(GENERATOR, e.to_string()),
            JobError::Driver(e) => BackendFailure::rejected(GENERATOR, e.to_string()),
            JobError::Page(msg) => BackendFailure::rejected(GENERATOR, msg),
            JobError::NoResult => BackendFailure::timeout(GENERATOR, "no generated result appeared on the page"),
        }
    }
}

#[derive(Debug)]
enum JobError {
    Driver(DriverError),
    Page(&'static str),
    NoResult,
}

impl From<DriverError> for JobError {
    fn from(e: DriverError) -> Self {
        JobError::Driver(e)
    }
}

/// First element matched by any of `locators`, trying them in order.
async fn first_match<'a>(
    driver: &WebDriverClient,
    session: &str,
    locators: impl Iterator<Item = Locator<'a>>,
) -> Result<Option<String>, DriverError> {
    for locator in locators {
        match driver.find_element(session, locator).await {
            Ok(id) => return Ok(Some(id)),
            Err(e) if e.is_no_such_element() => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

fn session_failure(err: SessionError) -> BackendFailure {
    match err {
        SessionError::Busy(_) => BackendFailure::rejected(GENERATOR, err.to_string()),
        SessionError::Timeout(_) => BackendFailure::timeout(GENERATOR, err.to_string()),
        SessionError::Unreachable(_) => BackendFailure::unreachable(GENERATOR, err.to_string()),
    }
}
