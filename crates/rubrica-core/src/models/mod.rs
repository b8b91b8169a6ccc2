//! Domain models for the PBX event pipeline

pub mod call;
pub mod credential;
pub mod event;

pub use call::{CallRecord, CallState};
pub use credential::Credential;
pub use event::DomainEvent;
