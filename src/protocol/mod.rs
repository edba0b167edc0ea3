//! Protocol module - frame kinds, close codes and read outcomes.
//!
//! Framing itself belongs to the transport. This module only names what
//! crosses the boundary between a transport and the dispatch loop.

mod frame;

pub use frame::{CloseCode, FrameType, Inbound};
