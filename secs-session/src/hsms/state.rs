//! HSMS connection state machine

use crate::error::{SecsError, SecsResult};

/// HSMS connection state
///
/// # State Transitions
/// ```text
/// NotConnected -> Connecting   (dial / accept)
/// Connecting   -> NotSelected  (TCP established)
/// Connecting   -> NotConnected (T5 expiry, refused)
/// NotSelected  -> Selected     (Select handshake)
/// Selected     -> NotSelected  (Deselect)
/// any          -> NotConnected (transport error, Separate, T6/T7 expiry)
/// any          -> Closed       (close())
/// Closed       -> NotConnected (re-open)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HsmsConnectionState {
    /// No TCP connection (initial state)
    #[default]
    NotConnected,
    /// TCP connection being established
    Connecting,
    /// TCP connected, Select not yet completed; T7 running
    NotSelected,
    /// Data messages may flow
    Selected,
    /// Communicator closed by the user
    Closed,
}

impl HsmsConnectionState {
    /// Check if data messages can be exchanged
    pub fn is_ready(&self) -> bool {
        matches!(self, HsmsConnectionState::Selected)
    }

    /// Check if a TCP connection is attached
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            HsmsConnectionState::NotSelected | HsmsConnectionState::Selected
        )
    }

    /// Validate state transition
    pub fn validate_transition(&self, new_state: HsmsConnectionState) -> SecsResult<()> {
        use HsmsConnectionState::*;
        let valid = match (*self, new_state) {
            (NotConnected, Connecting)
            | (Connecting, NotSelected)
            | (NotSelected, Selected)
            | (Selected, NotSelected)
            | (Selected, Selected) => true,
            // disconnect from any state, or re-open after close
            (_, NotConnected) => true,
            (_, Closed) => true,
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(SecsError::Protocol(format!(
                "Invalid state transition: {:?} -> {:?}",
                self, new_state
            )))
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            HsmsConnectionState::NotConnected => "NotConnected",
            HsmsConnectionState::Connecting => "Connecting",
            HsmsConnectionState::NotSelected => "NotSelected",
            HsmsConnectionState::Selected => "Selected",
            HsmsConnectionState::Closed => "Closed",
        }
    }
}
