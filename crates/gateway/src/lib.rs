//! Gateway: HTTP surface over the session lifecycle manager.
//!
//! Lifecycle:
//! 1. Load + validate config
//! 2. Resolve auth, bind address
//! 3. Build registry, spawn cleanup scheduler and startup recovery
//! 4. Serve HTTP (sessions, messages, admin, health)
//!
//! All domain logic lives in `wagate-sessions` and `wagate-protocol`;
//! this crate only routes, validates, and translates errors.

pub mod auth;
pub mod error;
pub mod server;
pub mod state;

pub use auth::ResolvedAuth;
pub use error::ApiError;
pub use state::GatewayState;
