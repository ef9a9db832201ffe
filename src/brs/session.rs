//! Authenticated BRS session.
//!
//! The portal session is an explicit value handed to the client. Nothing about
//! the login lives in global state.

use cookie::Cookie;
use custom_debug_derive::Debug;

/// Name of the portal's session cookie.
pub const SESSION_COOKIE: &str = "JSESSIONID";

#[derive(Debug, Clone)]
pub struct Session {
    login: String,
    #[debug(skip)]
    sid: String,
}

impl Session {
    pub fn new(login: impl Into<String>, sid: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            sid: sid.into().trim().to_string(),
        }
    }

    /// Identity used to key per-user caches.
    pub fn login(&self) -> &str {
        &self.login
    }

    /// Value for the `Cookie` request header.
    pub fn cookie_header(&self) -> String {
        Cookie::new(SESSION_COOKIE, self.sid.as_str())
            .stripped()
            .to_string()
    }
}
