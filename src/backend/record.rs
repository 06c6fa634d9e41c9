use super::{AttributeValue, ID_ATTRIBUTE, Item};

const DATA_ATTRIBUTE: &str = "data";
const EXPIRES_ATTRIBUTE: &str = "expires";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RecordError {
    #[error("session record is missing the `{0}` attribute")]
    Missing(&'static str),

    #[error("session record attribute `{0}` has the wrong type or format")]
    Invalid(&'static str),
}

/// The persisted form of a session.
///
/// Stored as three attributes: `id` (string), `data` (binary payload) and
/// `expires` (unix seconds, as a number). Other attributes are ignored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: String,
    pub data: Vec<u8>,
    pub expires: i64,
}

impl SessionRecord {
    /// A record is live while its expiry is strictly in the future.
    pub fn is_live_at(&self, now: i64) -> bool {
        self.expires > now
    }

    pub fn into_item(self) -> Item {
        Item::from([
            (ID_ATTRIBUTE.to_string(), AttributeValue::S(self.id)),
            (DATA_ATTRIBUTE.to_string(), AttributeValue::B(self.data)),
            (
                EXPIRES_ATTRIBUTE.to_string(),
                AttributeValue::N(self.expires.to_string()),
            ),
        ])
    }

    pub fn from_item(mut item: Item) -> Result<Self, RecordError> {
        let id = read_id(&item)?.to_string();
        let expires = read_expires(&item)?;
        let data = match item.remove(DATA_ATTRIBUTE) {
            Some(AttributeValue::B(data)) => data,
            Some(_) => return Err(RecordError::Invalid(DATA_ATTRIBUTE)),
            None => return Err(RecordError::Missing(DATA_ATTRIBUTE)),
        };
        Ok(Self { id, data, expires })
    }
}

/// Reads the `id` attribute of a raw item.
pub(crate) fn read_id(item: &Item) -> Result<&str, RecordError> {
    item.get(ID_ATTRIBUTE)
        .ok_or(RecordError::Missing(ID_ATTRIBUTE))?
        .as_s()
        .ok_or(RecordError::Invalid(ID_ATTRIBUTE))
}

/// Reads the `expires` attribute of a raw item.
pub(crate) fn read_expires(item: &Item) -> Result<i64, RecordError> {
    item.get(EXPIRES_ATTRIBUTE)
        .ok_or(RecordError::Missing(EXPIRES_ATTRIBUTE))?
        .as_n()
        .and_then(|n| n.parse().ok())
        .ok_or(RecordError::Invalid(EXPIRES_ATTRIBUTE))
}
