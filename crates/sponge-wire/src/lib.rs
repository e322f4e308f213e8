#![warn(clippy::pedantic)]

pub mod error;
pub mod layout;
pub mod snapshot;
pub mod state_frame;

pub use error::WireError;
pub use layout::{BLOCK_SIZE, block_count, block_offset, content_key};
pub use state_frame::StateFrame;
