//! HTTP request handlers

pub mod calls;
pub mod dial;
pub mod events;
pub mod health;
pub mod lookup;
pub mod ws;

pub use calls::configure as configure_calls;
pub use dial::configure as configure_dial;
pub use events::{event_stream, StreamSettings};
pub use health::{health_check, PbxStatus};
pub use lookup::configure as configure_lookup;
pub use ws::ws_handler;
