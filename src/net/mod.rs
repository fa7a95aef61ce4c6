//! Cloud server link: command framing and the TCP channel

mod channel;
mod framing;

pub use channel::NetworkChannel;
pub use framing::{FrameBuffer, KNOWN_COMMANDS, RemoteCommand, try_extract_one};
