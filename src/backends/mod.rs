//! [`Backend`](crate::Backend) implementations.
//!
//! The hosted store is reached through the caller's own implementation of
//! the trait; [`MemoryBackend`] runs everything in-process for tests and
//! the `local_game` demo.

pub mod memory;

pub use memory::{MemoryBackend, Question, RoomChange};
