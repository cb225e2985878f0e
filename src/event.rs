//! Events emitted by the [`RealtimeClient`](crate::client::RealtimeClient).

use crate::error_codes::ErrorCode;
use crate::protocol::{BroadcastEvent, RowChange, ServerFrame};

/// High-level events delivered on the client's event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// Synthetic: the transport loop started.
    Connected,
    /// A topic subscription was confirmed.
    Subscribed { topic: String },
    /// A topic subscription was refused.
    SubscribeFailed {
        topic: String,
        reason: String,
        error_code: Option<ErrorCode>,
    },
    /// A topic subscription ended.
    Unsubscribed { topic: String },
    /// Broadcast from a peer.
    Broadcast { topic: String, event: BroadcastEvent },
    /// Row-level change.
    Change { topic: String, change: RowChange },
    /// The service acknowledged a broadcast.
    BroadcastAck { topic: String },
    /// Channel error; logged by the client and forwarded.
    ChannelError {
        topic: Option<String>,
        message: String,
        error_code: Option<ErrorCode>,
    },
    /// Keep-alive reply.
    HeartbeatAck,
    /// Synthetic: the transport loop exited. Always the last event.
    Disconnected { reason: Option<String> },
}

impl RealtimeEvent {
    /// The topic this event belongs to, if any.
    pub fn topic(&self) -> Option<&str> {
        match self {
            Self::Subscribed { topic }
            | Self::SubscribeFailed { topic, .. }
            | Self::Unsubscribed { topic }
            | Self::Broadcast { topic, .. }
            | Self::Change { topic, .. }
            | Self::BroadcastAck { topic } => Some(topic),
            Self::ChannelError { topic, .. } => topic.as_deref(),
            Self::Connected | Self::HeartbeatAck | Self::Disconnected { .. } => None,
        }
    }
}

impl From<ServerFrame> for RealtimeEvent {
    fn from(frame: ServerFrame) -> Self {
        match frame {
            ServerFrame::Subscribed { topic } => Self::Subscribed { topic },
            ServerFrame::SubscribeFailed {
                topic,
                reason,
                error_code,
            } => Self::SubscribeFailed {
                topic,
                reason,
                error_code,
            },
            ServerFrame::Unsubscribed { topic } => Self::Unsubscribed { topic },
            ServerFrame::Broadcast { topic, event } => Self::Broadcast { topic, event },
            ServerFrame::Change { topic, change } => Self::Change { topic, change },
            ServerFrame::BroadcastAck { topic } => Self::BroadcastAck { topic },
            ServerFrame::ChannelError {
                topic,
                message,
                error_code,
            } => Self::ChannelError {
                topic,
                message,
                error_code,
            },
            ServerFrame::HeartbeatAck => Self::HeartbeatAck,
        }
    }
}
