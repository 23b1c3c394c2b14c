use serde::de::DeserializeOwned;
use serde::Serialize;
use crate::core::error::{Error, ErrorKind, Result};

/// Serialize results and ACLs for the web layer and security files.
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| Error::new(ErrorKind::Serialization, format!("Unable to serialize: {e}")))
}

pub fn from_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|e| Error::new(ErrorKind::Serialization, format!("Unable to deserialize: {e}")))
}
