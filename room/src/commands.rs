//! Command types `RoomHandler` consumes and emits.
//!
//! Both are owned by `room_core` since `conference`'s reference backend also
//! needs to name them; this module just re-exports them under the `room`
//! crate's namespace so `handler.rs` reads as if they were local.

pub use room_core::{NetworkCommand, RoomCommand};
