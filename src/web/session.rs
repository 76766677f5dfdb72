//! Ownership of the single shared browser session.
//!
//! One WebDriver session serves every web-automation job, one job at a time.
//! Access goes through `SessionManager::acquire`, which hands out at most one
//! `SessionHandle`. Waiters queue FIFO on a one-permit semaphore; the queue is
//! bounded and each wait has a deadline.
//!
//! State machine:
//!
//! ```text
//! Uninitialized --init--> Ready --acquire--> Busy --release--> Ready
//!                                             Busy --fatal--> Failed --init--> Ready
//!                                                             Failed --init fails--> Failed
//! ```
//!
//! Every (re)initialisation bumps an epoch. Handles remember the epoch they
//! were issued under, so releasing or failing a handle after a `reset` cannot
//! clobber the state of the newer session.
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::web::driver::WebDriverClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Ready,
    Busy,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Ready => "ready",
            SessionState::Busy => "busy",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("browser session wait queue is full ({0} waiting)")]
    Busy(usize),

    #[error("timed out after {0:?} waiting for the browser session")]
    Timeout(Duration),

    #[error("browser session unavailable: {0}")]
    Unreachable(String),
}

struct Slot {
    state: SessionState,
    session_id: Option<String>,
    epoch: u64,
    last_error: Option<String>,
}

struct Inner {
    driver: WebDriverClient,
    gate: Arc<Semaphore>,
    slot: Mutex<Slot>,
    waiting: AtomicUsize,
    max_waiters: usize,
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

/// Decrements the waiter count when a queued acquire finishes or is cancelled.
struct WaitGuard<'a>(&'a AtomicUsize);

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SessionManager {
    pub fn new(driver: WebDriverClient, max_waiters: usize) -> Self {
        SessionManager {
            inner: Arc::new(Inner {
                driver,
                gate: Arc::new(Semaphore::new(1)),
                slot: Mutex::new(Slot {
                    state: SessionState::Uninitialized,
                    session_id: None,
                    epoch: 0,
                    last_error: None,
                }),
                waiting: AtomicUsize::new(0),
                max_waiters,
            }),
        }
    }

    pub fn driver(&self) -> &WebDriverClient {
        &self.inner.driver
    }

    pub fn state(&self) -> SessionState {
        self.inner.slot().state
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.slot().last_error.clone()
    }

    /// Number of callers currently queued for the session.
    pub fn waiting(&self) -> usize {
        self.inner.waiting.load(Ordering::SeqCst)
    }

    /// Wait up to `wait` for exclusive use of the session.
    ///
    /// A session that is uninitialised or failed is (re)created once before the
    /// handle is returned; if that fails the caller gets `Unreachable`.
    pub async fn acquire(&self, wait: Duration) -> Result<SessionHandle, SessionError> {
        let permit = self.wait_for_slot(wait).await?;

        let state = self.inner.slot().state;
        match state {
            SessionState::Ready => {}
            SessionState::Busy => {
                tracing::warn!("Browser session marked busy while its slot was free, reusing it");
            }
            SessionState::Uninitialized | SessionState::Failed => {
                if state == SessionState::Failed {
                    tracing::warn!("Browser session failed earlier, attempting one reset");
                }
                self.initialize().await?;
            }
        }

        let mut slot = self.inner.slot();
        let session_id = slot
            .session_id
            .clone()
            .ok_or_else(|| SessionError::Unreachable("no browser session after initialisation".to_string()))?;
        slot.state = SessionState::Busy;
        Ok(SessionHandle {
            inner: Arc::clone(&self.inner),
            permit: Some(permit),
            session_id,
            epoch: slot.epoch,
        })
    }

    /// Return a handle early. Dropping the handle has the same effect.
    pub fn release(&self, handle: SessionHandle) {
        drop(handle);
    }

    /// Tear down the current browser session.
    ///
    /// Outstanding handles become stale; the next `acquire` creates a fresh
    /// session.
    pub async fn reset(&self) {
        let old = {
            let mut slot = self.inner.slot();
            slot.epoch += 1;
            slot.state = SessionState::Uninitialized;
            slot.session_id.take()
        };
        if let Some(old) = old {
            self.discard(&old).await;
        }
        tracing::info!("Browser session reset");
    }

    /// Stop handing out the session and close the browser.
    pub async fn shutdown(&self) {
        self.inner.gate.close();
        self.reset().await;
    }

    async fn wait_for_slot(&self, wait: Duration) -> Result<OwnedSemaphorePermit, SessionError> {
        let gate = Arc::clone(&self.inner.gate);
        match gate.clone().try_acquire_owned() {
            Ok(permit) => return Ok(permit),
            Err(TryAcquireError::Closed) => return Err(closed()),
            Err(TryAcquireError::NoPermits) => {}
        }

        let queued = self.inner.waiting.fetch_add(1, Ordering::SeqCst);
        let _guard = WaitGuard(&self.inner.waiting);
        if queued >= self.inner.max_waiters {
            tracing::warn!(queued, "Browser session wait queue full");
            return Err(SessionError::Busy(queued));
        }

        match tokio::time::timeout(wait, gate.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(closed()),
            Err(_) => Err(SessionError::Timeout(wait)),
        }
    }

    /// Create a new WebDriver session, discarding any previous one.
    ///
    /// Only called while holding the slot permit.
    async fn initialize(&self) -> Result<(), SessionError> {
        let old = self.inner.slot().session_id.take();
        if let Some(old) = old {
            self.discard(&old).await;
        }

        match self.inner.driver.new_session().await {
            Ok(id) => {
                tracing::info!("Browser session {} ready", id);
                let mut slot = self.inner.slot();
                slot.session_id = Some(id);
                slot.state = SessionState::Ready;
                slot.epoch += 1;
                slot.last_error = None;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to start browser session: {}", e);
                let mut slot = self.inner.slot();
                slot.state = SessionState::Failed;
                slot.last_error = Some(e.to_string());
                Err(SessionError::Unreachable(e.to_string()))
            }
        }
    }

    async fn discard(&self, session_id: &str) {
        if let Err(e) = self.inner.driver.delete_session(session_id).await {
            tracing::warn!("Could not close browser session {}: {}", session_id, e);
        }
    }
}

fn closed() -> SessionError {
    SessionError::Unreachable("browser session manager is shut down".to_string())
}

/// Exclusive use of the browser session. Released on drop.
pub struct SessionHandle {
    inner: Arc<Inner>,
    permit: Option<OwnedSemaphorePermit>,
    session_id: String,
    epoch: u64,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Record a fatal automation error; the next acquire recreates the session.
    pub fn mark_failed(&self, reason: &str) {
        let mut slot = self.inner.slot();
        if slot.epoch == self.epoch {
            tracing::warn!("Browser session {} failed: {}", self.session_id, reason);
            slot.state = SessionState::Failed;
            slot.last_error = Some(reason.to_string());
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        let Some(permit) = self.permit.take() else { return };
        {
            let mut slot = self.inner.slot();
            if slot.epoch == self.epoch && slot.state == SessionState::Busy {
                slot.state = SessionState::Ready;
            }
        }
        drop(permit);
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.session_id)
            .field("epoch", &self.epoch)
            .finish()
    }
}
