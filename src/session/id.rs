use data_encoding::BASE32_NOPAD;
use rand::TryRngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

/// Number of random bytes behind a generated session id.
pub const ID_BYTES: usize = 32;

/// Length of a generated id: 32 bytes in unpadded base32.
pub const ID_LEN: usize = 52;

#[derive(thiserror::Error, Debug)]
#[error("failed to read from the OS random source: {0}")]
pub struct IdError(String);

/// A session record identifier.
///
/// Generated ids are 32 bytes from the OS random source, base32 encoded with
/// the trailing `=` padding stripped. Ids decoded from a verified token are
/// taken as-is.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, Hash, PartialEq)]
pub struct Id(String);

impl Id {
    pub fn generate() -> Result<Self, IdError> {
        let mut bytes = [0u8; ID_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|err| IdError(err.to_string()))?;
        Ok(Self::from_bytes(&bytes))
    }

    pub fn from_bytes(bytes: &[u8; ID_BYTES]) -> Self {
        Self(BASE32_NOPAD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Id {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unpadded_base32() {
        let id = Id::generate().unwrap();
        assert_eq!(id.as_str().len(), ID_LEN);
        assert!(!id.as_str().contains('='));
        assert!(
            id.as_str()
                .chars()
                .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c))
        );
    }

    #[test]
    fn successive_ids_differ() {
        let a = Id::generate().unwrap();
        let b = Id::generate().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn fixed_bytes_encode_deterministically() {
        let zeros = Id::from_bytes(&[0u8; ID_BYTES]);
        assert_eq!(zeros.as_str(), "A".repeat(ID_LEN));

        let ones = Id::from_bytes(&[0xff; ID_BYTES]);
        assert_eq!(ones.as_str().len(), ID_LEN);
        assert_ne!(zeros, ones);
        assert_eq!(ones, Id::from_bytes(&[0xff; ID_BYTES]));
    }
}
