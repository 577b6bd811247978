use serde::{Deserialize, Serialize};
use std::fmt;

/// Filing receipt number (`rcept_no`), unique per disclosure.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilingId(pub String);

impl FilingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FilingId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Filing-type code used to filter listing queries (`pblntf_detail_ty`, e.g. `I002`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilingType(pub String);

impl FilingType {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filing_id_serializes_as_plain_string() {
        let id = FilingId::new("20240115000123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"20240115000123\"");
    }

    #[test]
    fn filing_ids_order_lexicographically() {
        let a = FilingId::new("20240102000001");
        let b = FilingId::new("20240102000002");
        assert!(a < b);
    }
}
