//! Frame streaming server: serves still images over TCP as camera frames.
//!
//! One dedicated thread owns the listening socket and serves a single
//! connection at a time; control calls (`request_next_image`,
//! `request_stop`) arrive from other threads and touch only two pieces of
//! shared state, the sequencer behind a mutex and an atomic stop flag.
//!
//! # Connection lifecycle
//!
//! ```text
//! 1. Accept loop polls the listener, checking the stop flag each tick
//! 2. A client connects; the socket gets the configured read timeout
//! 3. Requests are served one at a time until the client leaves,
//!    a connection error occurs, or a stop is requested
//! 4. The socket closes; the accept loop resumes polling
//! ```
//!
//! Per-connection failures (timeout, reset, broken pipe) never stop the
//! server; bind and listen failures do, since the server cannot recover
//! from a dead listener.
//!
//! # Frame pacing
//!
//! `get_frame` responses are paced to the configured frame rate: if the
//! previous frame left less than `1/frame_rate` seconds ago, the serving
//! thread sleeps out the remainder before writing. This is a rate
//! ceiling, not a cadence guarantee; a slow client only ever sees frames
//! later, never dropped. Serving the server info also re-arms the pacing
//! clock so info negotiation is not followed by a frame burst.

use crate::camera::PixelFormat;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::sequencer::ImageSequencer;
use crate::streaming::messages::{ChannelFormat, ClientRequest, FrameHeader, ServerInfo};
use crate::streaming::wire::{self, LineScanner, MAX_HEADER_BYTES};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often the accept loop wakes to poll for connections and the stop
/// flag; bounds shutdown latency while no client is connected.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Per-read ceiling while scanning for a request line's newline.
const REQUEST_CHUNK_BYTES: usize = 1024;

/// Cloneable handle that lets another thread request a server stop.
#[derive(Clone)]
pub struct StopHandle {
    stop_requested: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn request_stop(&self) {
        info!("Server stop requested.");
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}

/// TCP server emulating a streaming camera from a directory of images.
pub struct ImageFileServer {
    config: ServerConfig,
    sequencer: Arc<Mutex<ImageSequencer>>,
    stop_requested: Arc<AtomicBool>,
    server_thread: Option<JoinHandle<()>>,
}

impl ImageFileServer {
    pub fn new(config: ServerConfig) -> Self {
        let sequencer = ImageSequencer::new(
            config.image_root.clone(),
            config.repeat,
            config.skip_path_substrings.clone(),
        );
        Self {
            config,
            sequencer: Arc::new(Mutex::new(sequencer)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            server_thread: None,
        }
    }

    /// Pre-load the first image and spawn the accept-and-serve loop.
    ///
    /// Fails without spawning anything when the image root yields no
    /// images or the first image does not decode; the stop flag is raised
    /// so `wait_for_stop` callers are released either way.
    pub fn start(&mut self) -> Result<()> {
        if self.server_thread.is_some() {
            return Err(Error::State("server already started".to_string()));
        }

        debug!("Starting server...");
        {
            let mut sequencer = self.sequencer.lock();
            if let Err(e) = sequencer.init() {
                self.stop_requested.store(true, Ordering::SeqCst);
                return Err(e);
            }
            match sequencer.advance() {
                Ok(true) => {
                    info!(
                        "Serving image {}",
                        sequencer
                            .current_path()
                            .unwrap_or_else(|| Path::new("?"))
                            .display()
                    );
                }
                Ok(false) => {
                    error!(
                        "Unable to find any image in {} or its subdirectories",
                        self.config.image_root.display()
                    );
                    self.stop_requested.store(true, Ordering::SeqCst);
                    return Err(Error::NoImages(self.config.image_root.clone()));
                }
                Err(e) => {
                    error!(
                        "Failed to read image at path {:?}: {}",
                        sequencer.current_path(),
                        e
                    );
                    self.stop_requested.store(true, Ordering::SeqCst);
                    return Err(e);
                }
            }
        }

        let context = ServeContext {
            config: self.config.clone(),
            sequencer: Arc::clone(&self.sequencer),
            stop_requested: Arc::clone(&self.stop_requested),
        };
        let handle = thread::Builder::new()
            .name("frame-server".to_string())
            .spawn(move || context.run())?;
        self.server_thread = Some(handle);
        Ok(())
    }

    /// Advance to the next image without a client round trip.
    ///
    /// Returns `Ok(false)` when the enumeration is exhausted and `repeat`
    /// is off, in which case a server stop has been requested.
    pub fn request_next_image(&self) -> Result<bool> {
        let mut sequencer = self.sequencer.lock();
        match sequencer.advance() {
            Ok(true) => {
                info!(
                    "Serving image {}",
                    sequencer
                        .current_path()
                        .unwrap_or_else(|| Path::new("?"))
                        .display()
                );
                Ok(true)
            }
            Ok(false) => {
                self.stop_handle().request_stop();
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Cooperative shutdown: the serving thread observes the flag on its
    /// next poll tick.
    pub fn request_stop(&self) {
        self.stop_handle().request_stop();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Handle for requesting a stop from another thread (signal handlers,
    /// control shells).
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop_requested: Arc::clone(&self.stop_requested),
        }
    }

    /// Block until the serving thread has fully exited.
    pub fn wait_for_stop(&mut self) {
        if let Some(handle) = self.server_thread.take() {
            let _ = handle.join();
        }
    }

    pub fn current_image_path(&self) -> Option<PathBuf> {
        self.sequencer.lock().current_path().map(Path::to_path_buf)
    }

    pub fn image_root(&self) -> &Path {
        &self.config.image_root
    }

    pub fn repeat(&self) -> bool {
        self.config.repeat
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }
}

impl Drop for ImageFileServer {
    fn drop(&mut self) {
        self.request_stop();
        self.wait_for_stop();
    }
}

/// Everything the serving thread needs, detached from the handle struct.
struct ServeContext {
    config: ServerConfig,
    sequencer: Arc<Mutex<ImageSequencer>>,
    stop_requested: Arc<AtomicBool>,
}

impl ServeContext {
    fn run(self) {
        let listener = match TcpListener::bind(("127.0.0.1", self.config.port)) {
            Ok(listener) => listener,
            Err(e) => {
                error!("Cannot open port {} on localhost: {}", self.config.port, e);
                self.stop_requested.store(true, Ordering::SeqCst);
                return;
            }
        };
        if let Err(e) = listener.set_nonblocking(true) {
            error!("Failed to configure listener: {}", e);
            self.stop_requested.store(true, Ordering::SeqCst);
            return;
        }

        info!("Server listening on port {}", self.config.port);
        while !self.stop_requested.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((mut stream, addr)) => {
                    info!("Client connected from {}", addr);
                    if let Err(e) = self.configure_client(&stream) {
                        warn!("Failed to configure client socket: {}", e);
                        continue;
                    }
                    match self.handle_connection(&mut stream) {
                        Ok(()) => {}
                        Err(Error::Timeout) => warn!("Client timeout"),
                        Err(Error::Connection(e)) => warn!("Client is gone: {}", e),
                        Err(e) => error!("Error handling client: {}", e),
                    }
                    debug!("Client connection closed.");
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
        debug!("Server loop terminated.");
    }

    fn configure_client(&self, stream: &TcpStream) -> std::io::Result<()> {
        // The stream inherits non-blocking mode from the listener on some
        // platforms; request handling wants plain blocking reads.
        stream.set_nonblocking(false)?;
        let timeout = Some(self.config.client_read_timeout());
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;
        Ok(())
    }

    /// Serve one client until it disconnects, fails, or a stop is
    /// requested. Read timeouts keep the loop alive; everything else ends
    /// the connection.
    fn handle_connection(&self, stream: &mut TcpStream) -> Result<()> {
        let frame_interval = Duration::from_secs_f64(1.0 / self.config.frame_rate);
        // Backdate the pacing clock so the first frame goes out immediately.
        let mut last_frame_time = Instant::now()
            .checked_sub(frame_interval)
            .unwrap_or_else(Instant::now);
        let mut scratch = [0u8; REQUEST_CHUNK_BYTES];
        let mut scanner = LineScanner::new();

        while !self.stop_requested.load(Ordering::SeqCst) {
            let request = match scanner.read_line(stream, &mut scratch, MAX_HEADER_BYTES) {
                Ok(line) => ClientRequest::parse(&line)?,
                Err(Error::Timeout) => {
                    warn!("Timeout while waiting for client request.");
                    continue;
                }
                Err(Error::Connection(_)) => {
                    info!("Client disconnected.");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            debug!("Client request: {:?}", request);

            match request {
                Some(ClientRequest::GetFrame) => {
                    let elapsed = last_frame_time.elapsed();
                    if elapsed < frame_interval {
                        thread::sleep(frame_interval - elapsed);
                    }
                    debug!("Sending frame data to client.");
                    self.write_frame(stream)?;
                    last_frame_time = Instant::now();
                }
                Some(ClientRequest::GetServerInfo) => {
                    debug!("Sending server info to client.");
                    self.write_server_info(stream)?;
                    last_frame_time = Instant::now();
                }
                Some(ClientRequest::NextImage) => {
                    // No response for this request, success or not.
                    let mut sequencer = self.sequencer.lock();
                    match sequencer.advance() {
                        Ok(true) => {
                            info!(
                                "Serving image {}",
                                sequencer
                                    .current_path()
                                    .unwrap_or_else(|| Path::new("?"))
                                    .display()
                            );
                            last_frame_time = Instant::now();
                        }
                        Ok(false) => {
                            info!("All images served; stopping server.");
                            self.stop_requested.store(true, Ordering::SeqCst);
                        }
                        Err(e) => {
                            error!(
                                "Failed to read image at path {:?}: {}",
                                sequencer.current_path(),
                                e
                            );
                            return Err(e);
                        }
                    }
                }
                None => {
                    warn!("Invalid client request.");
                }
            }
        }
        Ok(())
    }

    /// Write the current header line followed by the full raw payload in
    /// bounded-size chunks.
    fn write_frame(&self, stream: &mut TcpStream) -> Result<()> {
        let sequencer = self.sequencer.lock();
        let shape = sequencer.shape();
        let path = sequencer
            .current_path()
            .ok_or_else(|| Error::State("no image loaded".to_string()))?;

        let header = FrameHeader {
            width: shape.width,
            height: shape.height,
            channels: shape.channels,
            channel_format: ChannelFormat::Rgb8,
            image_file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        debug!("Sending header: {:?}", header);
        wire::write_all(stream, &wire::encode_line(&header)?)?;

        for chunk in sequencer.buffer().chunks(self.config.chunk_size) {
            wire::write_all(stream, chunk)?;
        }
        Ok(())
    }

    fn write_server_info(&self, stream: &mut TcpStream) -> Result<()> {
        let info = {
            let sequencer = self.sequencer.lock();
            let shape = sequencer.shape();
            ServerInfo {
                fps: self.config.frame_rate,
                image_width: shape.width,
                image_height: shape.height,
                camera_pixel_format: PixelFormat::Rgb8.code(),
                image_file_name: sequencer
                    .current_path()
                    .and_then(|path| path.file_stem())
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "No Image Loaded".to_string()),
                camera_name: "ImageFileServer".to_string(),
                server_port: self.config.port,
            }
        };
        wire::write_all(stream, &wire::encode_line(&info)?)
    }
}
