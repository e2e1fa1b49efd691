//! Frame provider contract shared by hardware-backed and emulated cameras.
//!
//! Any camera implementation exposes the same capability surface: lifecycle
//! control (`initialize`/`deinitialize`), streaming control
//! (`start_streaming`/`stop_streaming`), frame acquisition (`get_frame`),
//! and read-only geometry/format/rate accessors. Consumers program against
//! [`FrameProvider`] and never learn whether frames come from a vendor SDK
//! or from the TCP image emulator in this crate.

use crate::error::{Error, Result};
use std::fmt;
use std::time::SystemTime;

/// Pixel formats with their stable wire integer codes.
///
/// The codes are part of the server-info wire contract
/// (`camera_pixel_format`) and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Bgr8,
    Rgb8,
    Mono8,
    BayerGr8,
    BayerBg8,
    BayerRg8,
    BayerGb8,
    Unknown,
}

impl PixelFormat {
    /// Wire integer code for this format.
    pub fn code(self) -> u8 {
        match self {
            PixelFormat::Bgr8 => 0,
            PixelFormat::Rgb8 => 1,
            PixelFormat::Mono8 => 2,
            PixelFormat::BayerGr8 => 3,
            PixelFormat::BayerBg8 => 4,
            PixelFormat::BayerRg8 => 5,
            PixelFormat::BayerGb8 => 6,
            PixelFormat::Unknown => 7,
        }
    }

    /// Resolve a wire integer code. Unrecognized codes map to `Unknown`.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => PixelFormat::Bgr8,
            1 => PixelFormat::Rgb8,
            2 => PixelFormat::Mono8,
            3 => PixelFormat::BayerGr8,
            4 => PixelFormat::BayerBg8,
            5 => PixelFormat::BayerRg8,
            6 => PixelFormat::BayerGb8,
            _ => PixelFormat::Unknown,
        }
    }
}

/// Where a frame came from: which provider, which server port, which file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameProvenance {
    pub source: String,
    pub port: u16,
    pub image_file_name: String,
}

/// One decoded camera frame: pixel bytes plus acquisition metadata.
///
/// Pixel data is row-major, `height x width x channels`, one byte per
/// channel sample.
#[derive(Clone)]
pub struct GrabbedFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    pixel_format: PixelFormat,
    timestamp: SystemTime,
    provenance: FrameProvenance,
}

impl GrabbedFrame {
    /// Build a frame, checking that the buffer length matches the declared
    /// `width * height * channels` geometry.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        channels: u8,
        pixel_format: PixelFormat,
        timestamp: SystemTime,
        provenance: FrameProvenance,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(Error::Protocol(format!(
                "frame buffer holds {} bytes but geometry {}x{}x{} requires {}",
                data.len(),
                width,
                height,
                channels,
                expected
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            channels,
            pixel_format,
            timestamp,
            provenance,
        })
    }

    /// Raw pixel bytes, row-major.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the frame, returning the pixel buffer.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn provenance(&self) -> &FrameProvenance {
        &self.provenance
    }

    /// One image row, `width * channels` bytes.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.width as usize * self.channels as usize;
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }
}

impl fmt::Debug for GrabbedFrame {
    // Keep pixel bytes out of log output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrabbedFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("pixel_format", &self.pixel_format)
            .field("bytes", &self.data.len())
            .field("provenance", &self.provenance)
            .finish()
    }
}

/// Camera capability interface.
///
/// Implemented by the TCP frame client in this crate and by hardware
/// wrappers elsewhere.
pub trait FrameProvider: Send {
    /// Human-readable provider name.
    fn camera_name(&self) -> &str;

    /// Width of the last negotiated or received image, zero before `initialize`.
    fn image_width(&self) -> u32;

    /// Height of the last negotiated or received image, zero before `initialize`.
    fn image_height(&self) -> u32;

    /// Pixel format of the last negotiated or received image.
    fn pixel_format(&self) -> PixelFormat;

    /// Negotiated or last observed frame rate in frames per second.
    fn frame_rate(&self) -> f64;

    /// Prepare the camera: acquire resources and learn its geometry.
    fn initialize(&mut self) -> Result<()>;

    /// Release camera resources and forget cached geometry.
    fn deinitialize(&mut self) -> Result<()>;

    /// Make the camera ready to deliver frames.
    fn start_streaming(&mut self) -> Result<()>;

    /// Stop frame delivery.
    fn stop_streaming(&mut self) -> Result<()>;

    /// Acquire the next frame.
    fn get_frame(&mut self) -> Result<GrabbedFrame>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_format_codes_round_trip() {
        for format in [
            PixelFormat::Bgr8,
            PixelFormat::Rgb8,
            PixelFormat::Mono8,
            PixelFormat::BayerGr8,
            PixelFormat::BayerBg8,
            PixelFormat::BayerRg8,
            PixelFormat::BayerGb8,
            PixelFormat::Unknown,
        ] {
            assert_eq!(PixelFormat::from_code(format.code()), format);
        }
    }

    #[test]
    fn unrecognized_code_maps_to_unknown() {
        assert_eq!(PixelFormat::from_code(42), PixelFormat::Unknown);
        assert_eq!(PixelFormat::from_code(7), PixelFormat::Unknown);
    }

    #[test]
    fn frame_geometry_must_match_buffer_length() {
        let provenance = FrameProvenance {
            source: "test".to_string(),
            port: 0,
            image_file_name: "x.png".to_string(),
        };
        let ok = GrabbedFrame::new(
            vec![0u8; 2 * 3 * 3],
            3,
            2,
            3,
            PixelFormat::Rgb8,
            SystemTime::now(),
            provenance.clone(),
        );
        assert!(ok.is_ok());

        let bad = GrabbedFrame::new(
            vec![0u8; 5],
            3,
            2,
            3,
            PixelFormat::Rgb8,
            SystemTime::now(),
            provenance,
        );
        assert!(matches!(bad, Err(Error::Protocol(_))));
    }

    #[test]
    fn row_returns_one_stride() {
        let provenance = FrameProvenance {
            source: "test".to_string(),
            port: 0,
            image_file_name: "x.png".to_string(),
        };
        let mut data = vec![0u8; 2 * 2 * 3];
        data[6..12].copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        let frame = GrabbedFrame::new(
            data,
            2,
            2,
            3,
            PixelFormat::Rgb8,
            SystemTime::now(),
            provenance,
        )
        .unwrap();
        assert_eq!(frame.row(1), &[1, 2, 3, 4, 5, 6]);
    }
}
