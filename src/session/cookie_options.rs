use cookie::time::{Duration, OffsetDateTime};
use cookie::{Cookie, SameSite};

/// Default lifetime of a session, in seconds: 30 days.
pub const DEFAULT_MAX_AGE: i64 = 86400 * 30;

/// Configuration options for session cookies.
///
/// The store holds one set of defaults; every session handle receives its own
/// copy at creation, so changing a handle's options never leaks into another
/// request.
///
/// `max_age` doubles as the session TTL:
///
/// - `> 0`: the record lives that many seconds and the cookie carries the same
///   `Max-Age`.
/// - `0`: browser-session cookie; the record falls back to the store's
///   session-cookie TTL.
/// - `< 0`: the session is deleted on the next save.
///
/// # Example
///
/// ```rust
/// use kvsession::CookieOptions;
///
/// let cookie_options = CookieOptions::build()
///         .http_only(true)
///         .same_site(kvsession::cookie::SameSite::Lax)
///         .secure(true)
///         .max_age(60 * 60)
///         .path("/");
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct CookieOptions {
    pub http_only: bool,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub same_site: SameSite,
    pub secure: bool,
    pub max_age: i64,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            http_only: true,
            domain: None,
            path: Some("/".to_string()),
            same_site: SameSite::Lax,
            secure: true,
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

impl CookieOptions {
    /// Creates a new `CookieOptions` with default values.
    pub fn build() -> Self {
        Self::default()
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the session TTL in seconds.
    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = seconds;
        self
    }

    /// Builds the response cookie carrying `value` under `name`.
    ///
    /// A negative `max_age` yields a removal cookie: empty value, `Max-Age=0`
    /// and an `Expires` date in the past.
    ///
    /// Returns `None` when `now + max_age` is not a representable date.
    pub(crate) fn to_cookie(
        &self,
        name: &str,
        value: String,
        now: OffsetDateTime,
    ) -> Option<Cookie<'static>> {
        let cookie_builder = Cookie::build((name.to_string(), value))
            .secure(self.secure)
            .http_only(self.http_only)
            .same_site(self.same_site);

        let cookie_builder = if self.max_age > 0 {
            let max_age = Duration::seconds(self.max_age);
            cookie_builder
                .max_age(max_age)
                .expires(now.checked_add(max_age)?)
        } else if self.max_age < 0 {
            cookie_builder
                .max_age(Duration::ZERO)
                .expires(OffsetDateTime::UNIX_EPOCH)
        } else {
            cookie_builder
        };

        let cookie_builder = if let Some(domain) = &self.domain {
            cookie_builder.domain(domain.clone())
        } else {
            cookie_builder
        };

        let cookie_builder = if let Some(path) = &self.path {
            cookie_builder.path(path.clone())
        } else {
            cookie_builder
        };

        Some(cookie_builder.build())
    }
}
