//! Wire message types for the frame streaming protocol.
//!
//! Every textual message on the connection is a single-line UTF-8 JSON
//! object terminated by `\n`. Three message shapes exist:
//!
//! | Direction | Message | Shape |
//! |-----------|---------|-------|
//! | client → server | request | `{"message": "get_frame" \| "get_server_info" \| "next_image"}` |
//! | server → client | frame header | [`FrameHeader`], followed by raw pixel bytes |
//! | server → client | server info | [`ServerInfo`] |
//!
//! A frame header announces exactly `width * height * channels` raw bytes
//! immediately after its terminating newline; there is no other framing.
//! Field names are the stable wire contract shared with every client
//! implementation and must not be renamed.

use crate::camera::PixelFormat;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Requests a client may issue. One request per round trip; requests are
/// strictly request→response, never pipelined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Ask for the current frame (header line + raw payload).
    GetFrame,
    /// Ask for the server's capabilities and current image metadata.
    GetServerInfo,
    /// Advance the server to its next image. No response is sent.
    NextImage,
}

/// Raw request line, accepting any message string so that unknown values
/// can be ignored instead of failing the connection.
#[derive(Debug, Deserialize)]
struct RequestLine {
    message: String,
}

impl ClientRequest {
    /// Parse a request line. Unknown message values yield `Ok(None)`;
    /// malformed JSON is a protocol error.
    pub fn parse(line: &[u8]) -> Result<Option<ClientRequest>> {
        let raw: RequestLine = serde_json::from_slice(line)
            .map_err(|e| Error::Protocol(format!("malformed request: {}", e)))?;
        Ok(match raw.message.as_str() {
            "get_frame" => Some(ClientRequest::GetFrame),
            "get_server_info" => Some(ClientRequest::GetServerInfo),
            "next_image" => Some(ClientRequest::NextImage),
            _ => None,
        })
    }
}

/// Channel layouts a frame payload can use on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChannelFormat {
    Bgr8,
    Rgb8,
    Mono8,
}

impl From<ChannelFormat> for PixelFormat {
    fn from(format: ChannelFormat) -> Self {
        match format {
            ChannelFormat::Bgr8 => PixelFormat::Bgr8,
            ChannelFormat::Rgb8 => PixelFormat::Rgb8,
            ChannelFormat::Mono8 => PixelFormat::Mono8,
        }
    }
}

/// Header line announcing one frame. The raw payload of exactly
/// [`payload_len`](FrameHeader::payload_len) bytes follows the newline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameHeader {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub channel_format: ChannelFormat,
    /// File name of the source image, with extension.
    pub image_file_name: String,
}

impl FrameHeader {
    /// Byte length of the payload this header announces.
    pub fn payload_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }
}

/// Response to a `get_server_info` request, built from current server
/// state. Dimensions are zero when no image is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub fps: f64,
    pub image_width: u32,
    pub image_height: u32,
    /// Integer pixel-format code, see [`PixelFormat::code`].
    pub camera_pixel_format: u8,
    /// File stem of the current image, without extension.
    pub image_file_name: String,
    pub camera_name: String,
    pub server_port: u16,
}

impl ServerInfo {
    pub fn pixel_format(&self) -> PixelFormat {
        PixelFormat::from_code(self.camera_pixel_format)
    }
}
