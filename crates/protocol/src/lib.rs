//! Protocol adapter seam: the boundary between the session lifecycle
//! manager and the messaging wire engine.
//!
//! The gateway never speaks the wire protocol itself. It opens
//! connections through [`ProtocolAdapter`], sends through
//! [`ProtocolHandle`], and consumes a normalized, per-key-ordered stream
//! of [`SessionEvent`]s. Credential material lives on disk under one
//! directory per session key ([`CredentialStore`]); presence of a
//! well-formed record is what makes a session revivable after restart.
//!
//! A [`loopback`] driver implements the seam in-process for local
//! development. Real wire engines implement the same traits out-of-tree.

pub mod adapter;
pub mod creds;
pub mod event;
pub mod jid;
pub mod loopback;
pub mod qr;

pub use adapter::{AdapterError, ProtocolAdapter, ProtocolHandle, ProtocolSession};
pub use creds::{CredentialRecord, CredentialStore};
pub use event::{DisconnectReason, SessionEvent};
pub use jid::Jid;
