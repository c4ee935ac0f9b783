//! Communicator events

use crate::error::SecsError;
use secs_codec::SecsMessage;
use std::sync::Arc;

/// Notifications delivered to every subscriber
///
/// `Message` carries primaries and any reply that matched no pending
/// request. `Error` carries failures that have no waiting caller.
#[derive(Debug, Clone)]
pub enum CommunicatorEvent {
    Connected,
    Selected,
    Disconnected,
    Message(SecsMessage),
    Error(Arc<SecsError>),
}

impl CommunicatorEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommunicatorEvent::Connected => "connected",
            CommunicatorEvent::Selected => "selected",
            CommunicatorEvent::Disconnected => "disconnected",
            CommunicatorEvent::Message(_) => "message",
            CommunicatorEvent::Error(_) => "error",
        }
    }
}
