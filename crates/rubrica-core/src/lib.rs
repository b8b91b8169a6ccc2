//! Rubrica Core Library
//!
//! Foundational pieces shared by every crate of the PBX event pipeline:
//!
//! - Domain models (credentials, call records, domain events)
//! - The challenge/response authenticator used by both PBX protocols
//! - The directory lookup seam and a static in-memory implementation
//! - Phone number normalization helpers
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod challenge;
pub mod config;
pub mod directory;
pub mod error;
pub mod models;
pub mod phone;
pub mod traits;

pub use challenge::{ChallengeAuthenticator, DigestScheme};
pub use config::AppConfig;
pub use directory::StaticDirectory;
pub use error::AppError;
pub use models::{CallRecord, CallState, Credential, DomainEvent};
pub use traits::DirectoryLookup;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
