//! chitra-cam - camera emulation over a local TCP connection
//!
//! Serves still images from disk as if they were live camera frames, for
//! testing software that consumes a camera abstraction without any camera
//! hardware attached.
//!
//! The crate has two endpoints sharing one wire protocol:
//!
//! - [`ImageFileServer`]: walks a directory of `.jpg`/`.png` files, serves
//!   the current image on request at a bounded frame rate, and advances
//!   through the set on `next_image` requests.
//! - [`ImageFileClient`]: a [`FrameProvider`] implementation that connects
//!   to the server and reassembles frames from the byte stream.
//!
//! Hardware-backed cameras implement the same [`FrameProvider`] trait, so
//! consumers cannot tell the emulation from the real thing.

pub mod camera;
pub mod config;
pub mod error;
pub mod sequencer;
pub mod streaming;

// Re-export commonly used types
pub use camera::{FrameProvenance, FrameProvider, GrabbedFrame, PixelFormat};
pub use config::{AppConfig, ServerConfig};
pub use error::{Error, Result};
pub use streaming::{ImageFileClient, ImageFileServer};
