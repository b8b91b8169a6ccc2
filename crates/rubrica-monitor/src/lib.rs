//! PBX real-time event pipeline
//!
//! ```text
//!  PBX (wss) --> PbxEventClient --> Reconciler --+--> CallStateStore
//!                                                |--> ExtensionStatusTable
//!                                                +--> EventBroadcaster --> N subscribers
//! ```
//!
//! The client owns the websocket lifecycle and is the only writer of the
//! tables. Request handlers read table snapshots and subscribe to the
//! broadcaster; they never call into the client's loop.

pub mod broadcaster;
pub mod channels;
pub mod client;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod reconcile;
pub mod store;

pub use broadcaster::{EventBroadcaster, Subscription, DEFAULT_QUEUE_CAPACITY};
pub use channels::ChannelTracker;
pub use client::{ClientSettings, ConnectionState, PbxEventClient};
pub use connection::{PbxConnection, TlsTrust};
pub use error::MonitorError;
pub use reconcile::Reconciler;
pub use store::{CallStateStore, ExtensionStatusTable};
