//! Remote document types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Kind of per-user document kept in the remote store.
///
/// One remote document exists per `(user, data type)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DataType {
    /// User preferences record
    Preferences,
    /// Pinned link collection
    Links,
    /// Any other document type
    Other(String),
}

impl DataType {
    /// Data types the sync controller keeps in step with local state.
    pub const SYNCED: [Self; 2] = [Self::Preferences, Self::Links];

    /// Document id used in the remote store.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Preferences => "preferences",
            Self::Links => "links",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for DataType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "preferences" => Self::Preferences,
            "links" => Self::Links,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for DataType {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<DataType> for String {
    fn from(value: DataType) -> Self {
        match value {
            DataType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.contains('/') {
            return Err(Error::InvalidInput(format!("Invalid data type: {s:?}")));
        }
        Ok(Self::from(trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_map_to_variants() {
        assert_eq!(DataType::from("preferences"), DataType::Preferences);
        assert_eq!(DataType::from("links"), DataType::Links);
        assert_eq!(
            DataType::from("notes"),
            DataType::Other("notes".to_string())
        );
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&DataType::Links).unwrap();
        assert_eq!(json, "\"links\"");
        let parsed: DataType = serde_json::from_str("\"preferences\"").unwrap();
        assert_eq!(parsed, DataType::Preferences);
    }

    #[test]
    fn parse_rejects_path_separators() {
        assert!("users/x".parse::<DataType>().is_err());
        assert!("  ".parse::<DataType>().is_err());
        assert_eq!("links".parse::<DataType>().unwrap(), DataType::Links);
    }
}
