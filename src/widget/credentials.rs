//! Credential sources for the authorization request

use crate::config::WidgetConfig;
use parking_lot::RwLock;

/// Supplies the token sent with authorization requests
pub trait CredentialSource: Send + Sync {
    /// The current token, if any
    fn token(&self) -> Option<String>;
}

/// No credential; the header is omitted
pub struct NoCredentials;

impl CredentialSource for NoCredentials {
    fn token(&self) -> Option<String> {
        None
    }
}

/// A fixed token
pub struct StaticCredentials(String);

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl CredentialSource for StaticCredentials {
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Reads a named cookie out of the page's cookie string
///
/// The host keeps the cookie string current with [`CookieCredentials::update`].
pub struct CookieCredentials {
    name: String,
    cookies: RwLock<String>,
}

impl CookieCredentials {
    pub fn new(name: impl Into<String>, cookies: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cookies: RwLock::new(cookies.into()),
        }
    }

    /// Read the cookie named by `csrf_cookie`
    pub fn from_config(config: &WidgetConfig, cookies: impl Into<String>) -> Self {
        Self::new(config.csrf_cookie.clone(), cookies)
    }

    pub fn update(&self, cookies: impl Into<String>) {
        *self.cookies.write() = cookies.into();
    }
}

impl CredentialSource for CookieCredentials {
    fn token(&self) -> Option<String> {
        find_cookie(&self.cookies.read(), &self.name)
    }
}

/// Value of cookie `name` in a `a=1; b=2` style string.
///
/// A name that appears more than once is ambiguous and yields `None`.
pub fn find_cookie(cookies: &str, name: &str) -> Option<String> {
    let mut matches = cookies
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .filter(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string());

    match (matches.next(), matches.next()) {
        (Some(value), None) => Some(value),
        _ => None,
    }
}
