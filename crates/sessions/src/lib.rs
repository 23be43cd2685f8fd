//! Session lifecycle manager: a bounded, TTL-evicting registry of live
//! protocol connections, event-driven state transitions, bounded
//! reconnection, cold-start recovery, and periodic cleanup.
//!
//! The registry is the single authority on "is this session alive right
//! now"; the HTTP surface and the wire engine both hang off it. All
//! mutation funnels through one lock that is never held across an
//! await, so connection opens, reconnect backoffs, and request handling
//! interleave freely.

pub mod cleanup;
pub mod lifecycle;
pub mod recovery;
pub mod registry;
pub mod session;

#[cfg(test)]
pub(crate) mod testutil;

pub use registry::{RegistryConfig, RegistryError, SessionRegistry};
pub use session::{SessionStatus, SessionView};
