//! Minimal W3C WebDriver client (chromedriver, geckodriver, Selenium).
//!
//! Only the commands the automation flow needs: create/delete a session,
//! navigate, find elements, type, click and read attributes.
use std::time::Duration;

use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

/// W3C element reference key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum DriverError {
    /// The driver could not be reached at all.
    #[error("webdriver unreachable: {0}")]
    Transport(String),

    #[error("webdriver command timed out: {0}")]
    Timeout(String),

    /// The driver answered with a W3C error object.
    #[error("webdriver error '{error}': {message}")]
    Command { error: String, message: String },

    #[error("unexpected webdriver response: {0}")]
    Protocol(String),
}

impl DriverError {
    /// Errors after which the browser session cannot be trusted anymore.
    pub fn is_fatal(&self) -> bool {
        match self {
            DriverError::Transport(_) => true,
            DriverError::Command { error, .. } => matches!(
                error.as_str(),
                "invalid session id" | "session not created" | "no such window" | "unknown error"
            ),
            DriverError::Timeout(_) | DriverError::Protocol(_) => false,
        }
    }

    pub fn is_no_such_element(&self) -> bool {
        matches!(self, DriverError::Command { error, .. } if error == "no such element")
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DriverError::Timeout(err.to_string())
        } else if err.is_decode() {
            DriverError::Protocol(err.to_string())
        } else {
            DriverError::Transport(err.to_string())
        }
    }
}

/// How to find an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator<'a> {
    Css(&'a str),
    XPath(&'a str),
}

impl Locator<'_> {
    fn to_json(self) -> Value {
        match self {
            Locator::Css(sel) => json!({ "using": "css selector", "value": sel }),
            Locator::XPath(path) => json!({ "using": "xpath", "value": path }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    value: Value,
}

#[derive(Debug, Clone, Copy)]
pub struct BrowserOptions {
    pub headless: bool,
    pub command_timeout: Duration,
}

#[derive(Clone)]
pub struct WebDriverClient {
    client: Client,
    base_url: String,
    options: BrowserOptions,
}

impl WebDriverClient {
    pub fn new(base_url: String, options: BrowserOptions) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        WebDriverClient { client: Client::new(), base_url: base, options }
    }

    /// Start a new browser; returns the WebDriver session id.
    pub async fn new_session(&self) -> Result<String, DriverError> {
        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-setuid-sandbox".to_string(),
            "--window-size=1280,720".to_string(),
            format!("--user-agent={}", USER_AGENT),
        ];
        if self.options.headless {
            args.push("--headless=new".to_string());
        }
        let body = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        });
        let value = self.command(Method::POST, "/session", Some(body)).await?;
        value
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DriverError::Protocol(format!("no sessionId in {}", value)))
    }

    pub async fn delete_session(&self, session: &str) -> Result<(), DriverError> {
        self.command(Method::DELETE, &format!("/session/{}", session), None).await?;
        Ok(())
    }

    pub async fn navigate(&self, session: &str, url: &str) -> Result<(), DriverError> {
        self.command(Method::POST, &format!("/session/{}/url", session), Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    pub async fn find_element(&self, session: &str, locator: Locator<'_>) -> Result<String, DriverError> {
        let value = self
            .command(Method::POST, &format!("/session/{}/element", session), Some(locator.to_json()))
            .await?;
        element_id(&value)
    }

    pub async fn find_elements(&self, session: &str, locator: Locator<'_>) -> Result<Vec<String>, DriverError> {
        let value = self
            .command(Method::POST, &format!("/session/{}/elements", session), Some(locator.to_json()))
            .await?;
        value
            .as_array()
            .ok_or_else(|| DriverError::Protocol(format!("expected element list, got {}", value)))?
            .iter()
            .map(element_id)
            .collect()
    }

    pub async fn clear(&self, session: &str, element: &str) -> Result<(), DriverError> {
        self.command(Method::POST, &format!("/session/{}/element/{}/clear", session, element), Some(json!({})))
            .await?;
        Ok(())
    }

    pub async fn send_keys(&self, session: &str, element: &str, text: &str) -> Result<(), DriverError> {
        self.command(
            Method::POST,
            &format!("/session/{}/element/{}/value", session, element),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    pub async fn click(&self, session: &str, element: &str) -> Result<(), DriverError> {
        self.command(Method::POST, &format!("/session/{}/element/{}/click", session, element), Some(json!({})))
            .await?;
        Ok(())
    }

    pub async fn attribute(&self, session: &str, element: &str, name: &str) -> Result<Option<String>, DriverError> {
        let value = self
            .command(Method::GET, &format!("/session/{}/element/{}/attribute/{}", session, element, name), None)
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, DriverError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("WebDriver {} {}", method, url);
        let mut request = self.client.request(method, &url).timeout(self.options.command_timeout);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(DriverError::from_reqwest)?;
        let status = response.status();
        let envelope: Envelope = response.json().await.map_err(DriverError::from_reqwest)?;

        if status.is_success() {
            return Ok(envelope.value);
        }
        let error = envelope.value.get("error").and_then(Value::as_str).unwrap_or("unknown error").to_string();
        let message = envelope.value.get("message").and_then(Value::as_str).unwrap_or_default().to_string();
        Err(DriverError::Command { error, message })
    }
}

fn element_id(value: &Value) -> Result<String, DriverError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DriverError::Protocol(format!("no element reference in {}", value)))
}
