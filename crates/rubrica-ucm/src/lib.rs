//! PBX HTTPS API client for click-to-dial
//!
//! The PBX exposes a JSON API on `https://host:8089/api`. Every command needs
//! a session cookie obtained through a two-step challenge/login handshake, and
//! the cookie expires a few minutes after issuance. This crate provides:
//!
//! - [`UcmApi`]: the three API calls the pipeline needs, with an HTTP
//!   implementation ([`HttpUcmApi`]) that trusts the PBX's self-signed
//!   certificate on that client only
//! - [`SessionCache`]: a single-flight cache of the session token
//! - [`DialInvoker`]: the click-to-dial command built on top of the cache
//!
//! # Architecture
//!
//! ```text
//!  POST /api/call
//!        |
//!        v
//!   DialInvoker ---- get_token ----> SessionCache --(challenge, login)--+
//!        |                                                              |
//!        +------------- dial_outbound ------------------------------> UcmApi
//! ```

pub mod api;
pub mod dial;
pub mod error;
pub mod session;

pub use api::{HttpUcmApi, UcmApi};
pub use dial::{DialInvoker, DialOutcome};
pub use error::UcmError;
pub use session::{AuthToken, SessionCache, SESSION_TTL};
