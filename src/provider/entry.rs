use serde::{Deserialize, Serialize};

/// The record kept for every live key: its value plus the bucket it
/// currently sits in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// `prefix:deadline` of the bucket holding this key
    pub bucket_key: String,
    /// The caller's payload
    pub value: String,
}

impl Entry {
    pub fn new(bucket_key: String, value: String) -> Self {
        Self { bucket_key, value }
    }

    /// Deadline encoded in the bucket key, in Unix seconds.
    pub fn deadline(&self) -> Option<i64> {
        super::bucket_deadline(&self.bucket_key)
    }

    pub(crate) fn encode(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub(crate) fn decode(data: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(data)?)
    }
}
