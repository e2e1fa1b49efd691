//! Frame streaming client: the emulated-camera side of [`FrameProvider`].
//!
//! Connects to a local frame server, requests frames one at a time, and
//! reassembles each frame from however the transport happened to chunk
//! it: the header line is scanned for its newline, and any payload bytes
//! that arrived in the same read are retained as the start of the pixel
//! data.
//!
//! All operations are synchronous calls on the caller's thread; there is
//! no background reader. The client never reconnects on its own — after a
//! connection error the caller decides whether to call
//! [`start_streaming`](FrameProvider::start_streaming) again.

use crate::camera::{FrameProvenance, FrameProvider, GrabbedFrame, PixelFormat};
use crate::error::{Error, Result};
use crate::streaming::messages::{ClientRequest, FrameHeader, ServerInfo};
use crate::streaming::wire::{self, MAX_HEADER_BYTES};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::{Duration, Instant, SystemTime};

const CAMERA_NAME: &str = "ImageFileClient";

/// Per-read ceiling while scanning for the header newline.
const HEADER_CHUNK_BYTES: usize = 1024;

/// TCP client that consumes the image file server as if it were a camera.
pub struct ImageFileClient {
    port: u16,
    chunk_size: usize,
    read_timeout: Duration,
    stream: Option<TcpStream>,
    streaming: bool,
    image_width: u32,
    image_height: u32,
    pixel_format: PixelFormat,
    fps: f64,
    last_frame_time: Option<Instant>,
    /// Reused for every socket read; the lock keeps header and payload
    /// reads of concurrent logical operations from interleaving.
    scratch: Mutex<Vec<u8>>,
}

impl ImageFileClient {
    /// # Arguments
    /// * `port` - server port on localhost
    /// * `chunk_size` - per-read buffer size for payload reception
    /// * `read_timeout` - socket timeout for connect, reads, and writes
    pub fn new(port: u16, chunk_size: usize, read_timeout: Duration) -> Self {
        Self {
            port,
            chunk_size: chunk_size.max(1),
            read_timeout,
            stream: None,
            streaming: false,
            image_width: 0,
            image_height: 0,
            pixel_format: PixelFormat::Unknown,
            fps: 0.0,
            last_frame_time: None,
            scratch: Mutex::new(vec![0u8; chunk_size.max(1)]),
        }
    }

    fn close_socket(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Fetch the server info over the open connection.
    fn request_server_info(&mut self) -> Result<ServerInfo> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            Error::Connection(
                "not connected to server; cannot request server information".to_string(),
            )
        })?;
        wire::write_all(stream, &wire::encode_line(&ClientRequest::GetServerInfo)?)?;

        let mut scratch = self.scratch.lock();
        let read = wire::read_line(stream, &mut scratch, MAX_HEADER_BYTES)?;
        drop(scratch);

        let info: ServerInfo = serde_json::from_slice(&read.line)
            .map_err(|e| Error::Protocol(format!("malformed server info: {}", e)))?;
        debug!("Server info: {:?}", info);
        Ok(info)
    }
}

impl FrameProvider for ImageFileClient {
    fn camera_name(&self) -> &str {
        CAMERA_NAME
    }

    fn image_width(&self) -> u32 {
        self.image_width
    }

    fn image_height(&self) -> u32 {
        self.image_height
    }

    fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    fn frame_rate(&self) -> f64 {
        self.fps
    }

    /// Connect, fetch the server info once to learn dimensions, format and
    /// frame rate, then disconnect. Does not leave a connection open.
    fn initialize(&mut self) -> Result<()> {
        if self.streaming {
            warn!("Streaming already started.");
            return Err(Error::State("streaming already started".to_string()));
        }
        if self.stream.is_some() {
            warn!("Socket already connected.");
            return Err(Error::State("socket already connected".to_string()));
        }

        self.start_streaming()?;
        let info = self.request_server_info();
        if let Err(e) = self.stop_streaming() {
            warn!("Failed to disconnect after server info request: {}", e);
        }
        let info = info?;

        self.fps = info.fps;
        self.image_width = info.image_width;
        self.image_height = info.image_height;
        self.pixel_format = info.pixel_format();
        Ok(())
    }

    /// Close the socket if one is open and forget everything learned from
    /// the server.
    fn deinitialize(&mut self) -> Result<()> {
        self.close_socket();
        self.streaming = false;
        self.fps = 0.0;
        self.image_width = 0;
        self.image_height = 0;
        self.pixel_format = PixelFormat::Unknown;
        self.last_frame_time = None;
        Ok(())
    }

    /// Open a persistent connection to the server.
    fn start_streaming(&mut self) -> Result<()> {
        if self.streaming {
            warn!("Streaming already started.");
            return Err(Error::State("streaming already started".to_string()));
        }
        if self.stream.is_some() {
            warn!("Socket already connected.");
            return Err(Error::State("socket already connected".to_string()));
        }

        let addr = SocketAddr::from(([127, 0, 0, 1], self.port));
        match TcpStream::connect_timeout(&addr, self.read_timeout) {
            Ok(stream) => {
                let timeout = Some(self.read_timeout);
                stream.set_read_timeout(timeout)?;
                stream.set_write_timeout(timeout)?;
                self.stream = Some(stream);
                self.streaming = true;
                info!("Connected to server on port {}", self.port);
                Ok(())
            }
            Err(e) => {
                error!("Failed to connect to server on port {}: {}", self.port, e);
                self.close_socket();
                Err(Error::Connection(format!(
                    "failed to connect to server on port {}: {}",
                    self.port, e
                )))
            }
        }
    }

    fn stop_streaming(&mut self) -> Result<()> {
        if !self.streaming {
            warn!("Streaming not started.");
            return Err(Error::State("streaming not started".to_string()));
        }
        self.streaming = false;
        self.close_socket();
        info!("Camera streaming stopped.");
        Ok(())
    }

    /// Request and reassemble one frame. The connection stays open between
    /// calls; partial frames are never delivered.
    fn get_frame(&mut self) -> Result<GrabbedFrame> {
        if !self.streaming {
            return Err(Error::State(
                "streaming not started; call start_streaming first".to_string(),
            ));
        }
        let stream = self.stream.as_mut().ok_or_else(|| {
            Error::Connection("not connected to server; connection may have been closed".to_string())
        })?;

        wire::write_all(stream, &wire::encode_line(&ClientRequest::GetFrame)?)?;

        let mut scratch = self.scratch.lock();

        // Header line, keeping any payload bytes that shared its chunk.
        let header_cap = HEADER_CHUNK_BYTES.min(scratch.len());
        let read = wire::read_line(stream, &mut scratch[..header_cap], MAX_HEADER_BYTES)?;
        let header: FrameHeader = serde_json::from_slice(&read.line)
            .map_err(|e| Error::Protocol(format!("malformed frame header: {}", e)))?;
        debug!("Image header: {:?}", header);

        // Exactly width*height*channels payload bytes, starting with
        // whatever arrived alongside the header.
        let total = header.payload_len();
        let mut payload = vec![0u8; total];
        let prefix = read.trailing.len().min(total);
        payload[..prefix].copy_from_slice(&read.trailing[..prefix]);
        let mut received = prefix;

        while received < total {
            let want = self.chunk_size.min(total - received).min(scratch.len());
            let count = wire::read_chunk(stream, &mut scratch[..want])?;
            if count == 0 {
                return Err(Error::Connection(
                    "server closed connection while reading image data".to_string(),
                ));
            }
            payload[received..received + count].copy_from_slice(&scratch[..count]);
            received += count;
        }
        drop(scratch);

        // Observed instantaneous frame rate, diagnostic only.
        let now = Instant::now();
        if let Some(last) = self.last_frame_time {
            let dt = now.duration_since(last).as_secs_f64();
            if dt > 0.0 {
                self.fps = 1.0 / dt;
            }
        }
        self.last_frame_time = Some(now);

        GrabbedFrame::new(
            payload,
            header.width,
            header.height,
            header.channels,
            header.channel_format.into(),
            SystemTime::now(),
            FrameProvenance {
                source: CAMERA_NAME.to_string(),
                port: self.port,
                image_file_name: header.image_file_name,
            },
        )
    }
}

impl ImageFileClient {
    /// Ask the server to advance to its next image. Fire-and-forget: the
    /// protocol defines no acknowledgment, so a success here only means
    /// the request was written. `get_frame` keeps returning the previous
    /// image until the server has processed the advance.
    pub fn request_next_image(&mut self) -> Result<()> {
        if !self.streaming {
            warn!("Streaming not started. Call start_streaming first.");
            return Err(Error::State("streaming not started".to_string()));
        }
        let stream = self.stream.as_mut().ok_or_else(|| {
            Error::Connection("not connected to server; connection may have been closed".to_string())
        })?;
        wire::write_all(stream, &wire::encode_line(&ClientRequest::NextImage)?)
    }
}
