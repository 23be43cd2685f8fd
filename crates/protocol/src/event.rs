// ── Lifecycle events ─────────────────────────────────────────────────────────

/// Normalized lifecycle events emitted by a protocol connection.
///
/// The wire engine pushes these through the per-session channel returned
/// by [`crate::ProtocolAdapter::open`]; delivery order is preserved per
/// key. There is no ordering guarantee across keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A pairing code was issued. The raw payload is rendered to a QR
    /// data URL before being stored on the session; each new code
    /// replaces the previous one.
    PairingCode { code: String },
    /// The connection reached the authenticated state.
    Connected { identity: String },
    /// The connection closed.
    Disconnected { reason: DisconnectReason },
}

// ── Disconnect reasons ───────────────────────────────────────────────────────

/// Close reasons surfaced by the wire engine, decoded from the status
/// code carried on the closing frame.
///
/// Reconnect eligibility is an explicit policy table, not an inference
/// from a single magic number:
///
/// | code  | reason                 | reconnect |
/// |-------|------------------------|-----------|
/// | 401   | logged out             | no        |
/// | 408   | connection lost        | yes       |
/// | 411   | multi-device mismatch  | yes       |
/// | 428   | connection closed      | yes       |
/// | 440   | connection replaced    | yes       |
/// | 500   | bad session            | yes       |
/// | 515   | restart required       | yes       |
/// | other | unknown                | yes       |
///
/// Only a credential logout is a permanent invalidation. Every other
/// close is eligible for reconnection, subject to the per-session
/// attempt bound enforced by the lifecycle controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Credentials were invalidated on the server side (401).
    LoggedOut,
    /// Transport dropped without a close frame (408).
    ConnectionLost,
    /// Companion device list changed under us (411).
    MultiDeviceMismatch,
    /// Orderly close (428).
    ConnectionClosed,
    /// Another client took over this identity (440).
    ConnectionReplaced,
    /// Server-side session state is unusable (500).
    BadSession,
    /// Stream must be re-established, normal right after pairing (515).
    RestartRequired,
    /// Any status code not in the table above.
    Unknown(u16),
}

impl DisconnectReason {
    /// Decode the status code from a closing frame.
    pub fn from_code(code: u16) -> Self {
        match code {
            401 => Self::LoggedOut,
            408 => Self::ConnectionLost,
            411 => Self::MultiDeviceMismatch,
            428 => Self::ConnectionClosed,
            440 => Self::ConnectionReplaced,
            500 => Self::BadSession,
            515 => Self::RestartRequired,
            other => Self::Unknown(other),
        }
    }

    /// Whether this close is eligible for automatic reconnection.
    pub fn should_reconnect(self) -> bool {
        !matches!(self, Self::LoggedOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_mapping() {
        assert_eq!(DisconnectReason::from_code(401), DisconnectReason::LoggedOut);
        assert_eq!(
            DisconnectReason::from_code(515),
            DisconnectReason::RestartRequired
        );
        assert_eq!(
            DisconnectReason::from_code(440),
            DisconnectReason::ConnectionReplaced
        );
        assert_eq!(DisconnectReason::from_code(599), DisconnectReason::Unknown(599));
    }

    #[test]
    fn test_only_logout_is_permanent() {
        assert!(!DisconnectReason::LoggedOut.should_reconnect());
        assert!(DisconnectReason::RestartRequired.should_reconnect());
        assert!(DisconnectReason::ConnectionLost.should_reconnect());
        assert!(DisconnectReason::ConnectionReplaced.should_reconnect());
        assert!(DisconnectReason::BadSession.should_reconnect());
        assert!(DisconnectReason::Unknown(599).should_reconnect());
    }
}
