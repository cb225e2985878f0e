//! Concrete [`Transport`](crate::Transport) implementations.
//!
//! | Feature                | Transport              |
//! |------------------------|------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`] |
//! | always                 | [`LoopbackTransport`]  |
//!
//! The loopback transport connects to an in-process [`LoopbackHub`]; tests
//! and the `local_game` demo use it in place of the hosted service.

pub mod loopback;
#[cfg(feature = "transport-websocket")]
pub mod websocket;

pub use loopback::{LoopbackHub, LoopbackTransport};
#[cfg(feature = "transport-websocket")]
pub use websocket::WebSocketTransport;
