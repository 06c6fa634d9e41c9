//! Authenticated encoding of session ids into cookie values.
//!
//! A [`TokenCodec`] turns `(cookie name, session id)` into a tamper-evident
//! token and back. The store keeps a list of codecs so keys can be rotated:
//! tokens are always produced by the first codec that succeeds, and accepted
//! from any codec that verifies them.

use std::fmt::Debug;

mod secure;

pub use secure::{MAX_TOKEN_LEN, SecureCookie};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("no token codecs configured")]
    NoCodecs,

    #[error("hash key is not set")]
    NoHashKey,

    #[error("token exceeds {} bytes", MAX_TOKEN_LEN)]
    TooLong,

    #[error("malformed token: {0}")]
    Malformed(&'static str),

    #[error("token signature does not match")]
    InvalidMac,

    #[error("token has expired")]
    Expired,
}

/// Encodes and verifies the token carried in a session cookie.
pub trait TokenCodec: Debug + Send + Sync + 'static {
    fn encode(&self, name: &str, value: &str) -> Result<String, Error>;

    /// Verifies `token` for cookie `name` and returns the encoded value.
    fn decode(&self, name: &str, token: &str) -> Result<String, Error>;

    /// Exposes the validity window of codecs that have one.
    ///
    /// Codecs whose tokens never age out keep the default, and are skipped by
    /// [`Store::set_max_age`](crate::Store::set_max_age).
    fn max_age_mut(&mut self) -> Option<&mut dyn MaxAge> {
        None
    }
}

/// A codec whose tokens are only valid for a bounded time.
pub trait MaxAge {
    /// Sets the validity window in seconds. Zero or less disables the check.
    fn set_max_age(&mut self, seconds: i64);
}

/// Encodes with the first codec that succeeds.
pub fn encode_multi(
    name: &str,
    value: &str,
    codecs: &[Box<dyn TokenCodec>],
) -> Result<String, Error> {
    let mut first_err = None;
    for codec in codecs {
        match codec.encode(name, value) {
            Ok(token) => return Ok(token),
            Err(err) => {
                first_err.get_or_insert(err);
            }
        }
    }
    Err(first_err.unwrap_or(Error::NoCodecs))
}

/// Decodes with the first codec that verifies the token.
///
/// When every codec rejects the token, the first codec's error is returned.
pub fn decode_multi(
    name: &str,
    token: &str,
    codecs: &[Box<dyn TokenCodec>],
) -> Result<String, Error> {
    let mut first_err = None;
    for codec in codecs {
        match codec.decode(name, token) {
            Ok(value) => return Ok(value),
            Err(err) => {
                first_err.get_or_insert(err);
            }
        }
    }
    Err(first_err.unwrap_or(Error::NoCodecs))
}
