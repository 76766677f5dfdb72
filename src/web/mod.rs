//! Browser automation against generator web UIs.
//!
//! - `driver`: W3C WebDriver HTTP client.
//! - `session`: the single shared browser session and its access discipline.
//! - `sites`: per-site selectors.
//! - `adapter`: the web generator built on the three above.
pub mod adapter;
pub mod driver;
pub mod session;
pub mod sites;

pub use adapter::{WebAutomationAdapter, WebAutomationSettings};
pub use driver::{BrowserOptions, WebDriverClient};
pub use session::{SessionError, SessionHandle, SessionManager, SessionState};
