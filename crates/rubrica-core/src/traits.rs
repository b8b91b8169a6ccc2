//! Seams to external collaborators

use crate::error::AppError;
use async_trait::async_trait;

/// Resolves a phone number to a contact display name
///
/// Called once per ring event, so implementations must tolerate high call
/// rates. A miss is `Ok(None)`; an `Err` is treated by callers exactly like a
/// miss.
#[async_trait]
pub trait DirectoryLookup: Send + Sync {
    async fn lookup(&self, number: &str) -> Result<Option<String>, AppError>;
}
