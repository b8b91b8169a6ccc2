//! In-memory directory lookup
//!
//! The real contact directory lives outside this service; `StaticDirectory`
//! is the lookup shipped with the binary. It is loaded once from a JSON file
//! mapping numbers to display names:
//!
//! ```json
//! { "+39 051 2345678": "Mario Rossi", "3283259080": "Anna Bianchi" }
//! ```
//!
//! Keys and queried numbers are both normalized with [`phone::to_national`],
//! so formatting differences between the directory and the PBX do not matter.

use crate::error::AppError;
use crate::phone;
use crate::traits::DirectoryLookup;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    country_code: String,
    entries: HashMap<String, String>,
}

impl StaticDirectory {
    pub fn new(country_code: impl Into<String>) -> Self {
        Self {
            country_code: country_code.into(),
            entries: HashMap::new(),
        }
    }

    /// Build a directory from `(number, name)` pairs
    pub fn from_entries<I, N, D>(country_code: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (N, D)>,
        N: AsRef<str>,
        D: Into<String>,
    {
        let mut directory = Self::new(country_code);
        for (number, name) in entries {
            directory.insert(number.as_ref(), name);
        }
        directory
    }

    /// Load a `{ number: name }` JSON file
    pub fn from_file(country_code: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("cannot read directory file {}: {}", path.display(), e))
        })?;
        let map: HashMap<String, String> = serde_json::from_str(&raw)?;

        let directory = Self::from_entries(country_code, map);
        info!(
            path = %path.display(),
            entries = directory.len(),
            "Directory loaded"
        );
        Ok(directory)
    }

    pub fn insert(&mut self, number: &str, name: impl Into<String>) {
        let key = phone::to_national(number, &self.country_code);
        if !key.is_empty() {
            self.entries.insert(key, name.into());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl DirectoryLookup for StaticDirectory {
    async fn lookup(&self, number: &str) -> Result<Option<String>, AppError> {
        let key = phone::to_national(number, &self.country_code);
        if key.is_empty() {
            return Ok(None);
        }

        let name = self.entries.get(&key).cloned();
        debug!(number = %key, found = name.is_some(), "Directory lookup");
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> StaticDirectory {
        StaticDirectory::from_entries(
            "39",
            [("+39 051 2345678", "Mario Rossi"), ("3283259080", "Anna Bianchi")],
        )
    }

    #[tokio::test]
    async fn test_lookup_matches_normalized_numbers() {
        let dir = directory();

        assert_eq!(
            dir.lookup("0512345678").await.unwrap(),
            Some("Mario Rossi".to_string())
        );
        assert_eq!(
            dir.lookup("+39 328 325 9080").await.unwrap(),
            Some("Anna Bianchi".to_string())
        );
    }

    #[tokio::test]
    async fn test_lookup_miss() {
        let dir = directory();

        assert_eq!(dir.lookup("1001").await.unwrap(), None);
        assert_eq!(dir.lookup("").await.unwrap(), None);
    }

    #[test]
    fn test_from_file_missing_is_config_error() {
        let err = StaticDirectory::from_file("39", "/nonexistent/rubrica.json").unwrap_err();
        assert_eq!(err.error_code(), "config_error");
    }

    #[test]
    fn test_from_file_reads_json_map() {
        let path = std::env::temp_dir().join(format!("rubrica-dir-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"051 2345678": "Mario Rossi"}"#).unwrap();

        let dir = StaticDirectory::from_file("39", &path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(dir.len(), 1);
        assert!(!dir.is_empty());
    }
}
