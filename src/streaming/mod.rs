//! TCP frame streaming: wire protocol, server, and client.

pub mod client;
pub mod messages;
pub mod server;
pub mod wire;

pub use client::ImageFileClient;
pub use messages::{ChannelFormat, ClientRequest, FrameHeader, ServerInfo};
pub use server::{ImageFileServer, StopHandle};
pub use wire::MAX_HEADER_BYTES;
