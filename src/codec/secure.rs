use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{Error, MaxAge, TokenCodec};
use crate::session::DEFAULT_MAX_AGE;
use crate::store::{Clock, SystemClock};

type HmacSha256 = Hmac<Sha256>;

/// Upper bound on the size of an encoded token.
pub const MAX_TOKEN_LEN: usize = 4096;

/// HMAC-SHA256 signed, timestamped cookie values.
///
/// A token is the unpadded url-safe base64 of `timestamp|value|mac`, where
/// `value` is itself base64 and `mac` covers `name|timestamp|value`. Binding
/// the cookie name into the MAC stops a token minted for one session name from
/// being replayed under another.
///
/// Tokens older than `max_age` seconds are rejected, which keeps the token's
/// validity window in step with the record TTL when both are set through
/// [`Store::set_max_age`](crate::Store::set_max_age).
#[derive(Clone)]
pub struct SecureCookie {
    hash_key: Vec<u8>,
    max_age: i64,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for SecureCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureCookie")
            .field("hash_key", &"<redacted>")
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl SecureCookie {
    pub fn new(hash_key: impl Into<Vec<u8>>) -> Self {
        Self {
            hash_key: hash_key.into(),
            max_age: DEFAULT_MAX_AGE,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn max_age(&self) -> i64 {
        self.max_age
    }

    fn mac(&self, name: &str, payload: &[u8]) -> Result<HmacSha256, Error> {
        if self.hash_key.is_empty() {
            return Err(Error::NoHashKey);
        }
        let mut mac = HmacSha256::new_from_slice(&self.hash_key).map_err(|_| Error::NoHashKey)?;
        mac.update(name.as_bytes());
        mac.update(b"|");
        mac.update(payload);
        Ok(mac)
    }
}

impl TokenCodec for SecureCookie {
    fn encode(&self, name: &str, value: &str) -> Result<String, Error> {
        let timestamp = self.clock.now().unix_timestamp();
        let payload = format!("{timestamp}|{}", URL_SAFE_NO_PAD.encode(value));
        let tag = self.mac(name, payload.as_bytes())?.finalize().into_bytes();

        let mut raw = payload.into_bytes();
        raw.push(b'|');
        raw.extend_from_slice(&tag);

        let token = URL_SAFE_NO_PAD.encode(raw);
        if token.len() > MAX_TOKEN_LEN {
            return Err(Error::TooLong);
        }
        Ok(token)
    }

    fn decode(&self, name: &str, token: &str) -> Result<String, Error> {
        if token.len() > MAX_TOKEN_LEN {
            return Err(Error::TooLong);
        }
        let raw = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| Error::Malformed("token is not base64"))?;

        // the mac is raw bytes and may itself contain '|'
        let mut parts = raw.splitn(3, |b| *b == b'|');
        let (Some(timestamp), Some(value), Some(tag)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::Malformed("missing token fields"));
        };

        let signed_len = timestamp.len() + 1 + value.len();
        self.mac(name, &raw[..signed_len])?
            .verify_slice(tag)
            .map_err(|_| Error::InvalidMac)?;

        let timestamp: i64 = std::str::from_utf8(timestamp)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(Error::Malformed("invalid timestamp"))?;
        if self.max_age > 0 && timestamp < self.clock.now().unix_timestamp() - self.max_age {
            return Err(Error::Expired);
        }

        let value = URL_SAFE_NO_PAD
            .decode(value)
            .map_err(|_| Error::Malformed("value is not base64"))?;
        String::from_utf8(value).map_err(|_| Error::Malformed("value is not utf-8"))
    }

    fn max_age_mut(&mut self) -> Option<&mut dyn MaxAge> {
        Some(self)
    }
}

impl MaxAge for SecureCookie {
    fn set_max_age(&mut self, seconds: i64) {
        self.max_age = seconds;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ManualClock;

    fn codec(clock: &Arc<ManualClock>) -> SecureCookie {
        SecureCookie::new(b"a very secret hash key".to_vec()).with_clock(clock.clone())
    }

    #[test]
    fn encoded_ids_decode_under_the_same_name() {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let codec = codec(&clock);

        let token = codec.encode("sess", "SESSIONID234").unwrap();
        assert_ne!(token, "SESSIONID234");
        assert_eq!(codec.decode("sess", &token).unwrap(), "SESSIONID234");
    }

    #[test]
    fn token_is_bound_to_the_cookie_name() {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let codec = codec(&clock);

        let token = codec.encode("sess", "abc").unwrap();
        assert_eq!(codec.decode("other", &token), Err(Error::InvalidMac));
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let codec = codec(&clock);
        let token = codec.encode("sess", "abc").unwrap();

        let mut raw = URL_SAFE_NO_PAD.decode(&token).unwrap();
        let forged_value = URL_SAFE_NO_PAD.encode("xyz");
        let start = raw.iter().position(|b| *b == b'|').unwrap() + 1;
        raw.splice(start..start + forged_value.len(), forged_value.bytes());
        let forged = URL_SAFE_NO_PAD.encode(raw);

        assert_eq!(codec.decode("sess", &forged), Err(Error::InvalidMac));
        assert_eq!(
            codec.decode("sess", "not base64 at all!"),
            Err(Error::Malformed("token is not base64"))
        );
        assert_eq!(
            codec.decode("sess", &URL_SAFE_NO_PAD.encode("12345")),
            Err(Error::Malformed("missing token fields"))
        );
        assert_eq!(
            codec.decode("sess", &"A".repeat(MAX_TOKEN_LEN + 1)),
            Err(Error::TooLong)
        );
    }

    #[test]
    fn tokens_expire_after_max_age() {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let mut codec = codec(&clock);
        codec.set_max_age(60);

        let token = codec.encode("sess", "abc").unwrap();
        clock.advance(60);
        assert_eq!(codec.decode("sess", &token).unwrap(), "abc");
        clock.advance(1);
        assert_eq!(codec.decode("sess", &token), Err(Error::Expired));

        codec.set_max_age(0);
        assert_eq!(codec.decode("sess", &token).unwrap(), "abc");
    }

    #[test]
    fn missing_hash_key_is_an_error() {
        let codec = SecureCookie::new(Vec::new());
        assert_eq!(codec.encode("sess", "abc"), Err(Error::NoHashKey));
    }
}
