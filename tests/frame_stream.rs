//! End-to-end tests for the frame streaming server and client.
//!
//! Each test spins up a real [`ImageFileServer`] on an ephemeral loopback
//! port over a temporary directory of generated PNG fixtures, then drives
//! it with an [`ImageFileClient`] (or a raw socket where the test needs a
//! misbehaving peer).

use chitra_cam::config::ServerConfig;
use chitra_cam::{Error, FrameProvider, ImageFileClient, ImageFileServer, PixelFormat};
use image::{Rgb, RgbImage};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const CHUNK_SIZE: usize = 6000;
const READ_TIMEOUT: Duration = Duration::from_secs(2);

fn write_png(dir: &Path, name: &str, width: u32, height: u32, color: [u8; 3]) {
    RgbImage::from_pixel(width, height, Rgb(color))
        .save(dir.join(name))
        .unwrap();
}

/// Two distinguishable fixtures, enumerated as a.png then b.png.
fn two_fixtures() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_png(dir.path(), "a.png", 4, 3, [255, 0, 0]);
    write_png(dir.path(), "b.png", 5, 2, [0, 0, 255]);
    dir
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn server_config(root: &Path, repeat: bool, frame_rate: f64, port: u16) -> ServerConfig {
    ServerConfig {
        image_root: root.to_path_buf(),
        repeat,
        port,
        chunk_size: CHUNK_SIZE,
        client_read_timeout_secs: 2.0,
        frame_rate,
        skip_path_substrings: Vec::new(),
    }
}

fn start_server(root: &Path, repeat: bool, frame_rate: f64) -> (ImageFileServer, u16) {
    let port = free_port();
    let mut server = ImageFileServer::new(server_config(root, repeat, frame_rate, port));
    server.start().unwrap();
    wait_for_listener(port);
    (server, port)
}

/// Block until the server thread has bound its listener.
fn wait_for_listener(port: u16) {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    for _ in 0..200 {
        if TcpStream::connect_timeout(&addr, Duration::from_millis(50)).is_ok() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("server never started listening on port {}", port);
}

fn connect_client(port: u16) -> ImageFileClient {
    let mut client = ImageFileClient::new(port, CHUNK_SIZE, READ_TIMEOUT);
    client.start_streaming().unwrap();
    client
}

fn assert_solid(frame: &chitra_cam::GrabbedFrame, width: u32, height: u32, color: [u8; 3]) {
    assert_eq!(frame.width(), width);
    assert_eq!(frame.height(), height);
    assert_eq!(frame.channels(), 3);
    assert_eq!(frame.pixel_format(), PixelFormat::Rgb8);
    assert_eq!(frame.data().len(), (width * height * 3) as usize);
    assert!(frame.data().chunks(3).all(|px| px == color));
}

#[test]
fn serves_current_frame_until_advanced() {
    let fixtures = two_fixtures();
    let (mut server, port) = start_server(fixtures.path(), false, 1000.0);
    let mut client = connect_client(port);

    // get_frame does not advance: the same image twice.
    let first = client.get_frame().unwrap();
    assert_solid(&first, 4, 3, [255, 0, 0]);
    assert_eq!(first.provenance().image_file_name, "a.png");
    assert_eq!(first.provenance().port, port);

    let again = client.get_frame().unwrap();
    assert_solid(&again, 4, 3, [255, 0, 0]);

    // next_image advances in enumeration order.
    client.request_next_image().unwrap();
    let second = client.get_frame().unwrap();
    assert_solid(&second, 5, 2, [0, 0, 255]);
    assert_eq!(second.provenance().image_file_name, "b.png");

    client.stop_streaming().unwrap();
    server.request_stop();
    server.wait_for_stop();
}

#[test]
fn initialize_negotiates_server_info_and_disconnects() {
    let fixtures = two_fixtures();
    let (mut server, port) = start_server(fixtures.path(), true, 25.0);

    let mut provider: Box<dyn FrameProvider> =
        Box::new(ImageFileClient::new(port, CHUNK_SIZE, READ_TIMEOUT));
    provider.initialize().unwrap();
    assert_eq!(provider.image_width(), 4);
    assert_eq!(provider.image_height(), 3);
    assert_eq!(provider.frame_rate(), 25.0);
    assert_eq!(provider.pixel_format(), PixelFormat::Rgb8);

    // initialize leaves no connection open, so streaming can start fresh.
    provider.start_streaming().unwrap();
    let frame = provider.get_frame().unwrap();
    assert_solid(&frame, 4, 3, [255, 0, 0]);
    provider.stop_streaming().unwrap();
    provider.deinitialize().unwrap();
    assert_eq!(provider.image_width(), 0);

    server.request_stop();
    server.wait_for_stop();
}

#[test]
fn frame_pacing_enforces_rate_ceiling() {
    let fixtures = two_fixtures();
    let (mut server, port) = start_server(fixtures.path(), true, 10.0);
    let mut client = connect_client(port);

    // First frame is unpaced; the following ones must be at least
    // 1/frame_rate apart (minus scheduler slack).
    client.get_frame().unwrap();
    let t0 = Instant::now();
    client.get_frame().unwrap();
    let t1 = Instant::now();
    client.get_frame().unwrap();
    let t2 = Instant::now();

    let min_gap = Duration::from_millis(80);
    assert!(t1 - t0 >= min_gap, "gap {:?} under rate ceiling", t1 - t0);
    assert!(t2 - t1 >= min_gap, "gap {:?} under rate ceiling", t2 - t1);

    client.stop_streaming().unwrap();
    server.request_stop();
    server.wait_for_stop();
}

#[test]
fn exhaustion_with_repeat_off_stops_server() {
    let fixtures = two_fixtures();
    let (mut server, port) = start_server(fixtures.path(), false, 1000.0);
    let mut client = connect_client(port);

    assert_eq!(
        client.get_frame().unwrap().provenance().image_file_name,
        "a.png"
    );
    client.request_next_image().unwrap();
    assert_eq!(
        client.get_frame().unwrap().provenance().image_file_name,
        "b.png"
    );

    // Third advance exhausts the set: the server stops silently, no
    // acknowledgment is sent.
    client.request_next_image().unwrap();
    thread::sleep(Duration::from_millis(300));

    let err = client.get_frame().unwrap_err();
    assert!(
        matches!(err, Error::Connection(_)),
        "expected connection error after server stop, got {:?}",
        err
    );

    server.wait_for_stop();
    assert!(server.is_stop_requested());
}

#[test]
fn repeat_on_wraps_to_first_image() {
    let fixtures = two_fixtures();
    let (mut server, port) = start_server(fixtures.path(), true, 1000.0);
    let mut client = connect_client(port);

    assert_eq!(
        client.get_frame().unwrap().provenance().image_file_name,
        "a.png"
    );
    client.request_next_image().unwrap();
    assert_eq!(
        client.get_frame().unwrap().provenance().image_file_name,
        "b.png"
    );
    client.request_next_image().unwrap();
    let wrapped = client.get_frame().unwrap();
    assert_eq!(wrapped.provenance().image_file_name, "a.png");
    assert_solid(&wrapped, 4, 3, [255, 0, 0]);

    client.stop_streaming().unwrap();
    server.request_stop();
    server.wait_for_stop();
}

#[test]
fn control_side_next_image_advances_the_server() {
    let fixtures = two_fixtures();
    let (mut server, port) = start_server(fixtures.path(), false, 1000.0);
    assert_eq!(server.current_image_path().unwrap().file_name().unwrap(), "a.png");

    assert!(server.request_next_image().unwrap());
    assert_eq!(server.current_image_path().unwrap().file_name().unwrap(), "b.png");

    let mut client = connect_client(port);
    assert_eq!(
        client.get_frame().unwrap().provenance().image_file_name,
        "b.png"
    );
    client.stop_streaming().unwrap();

    // Control-side exhaustion requests a stop, same as the wire path.
    assert!(!server.request_next_image().unwrap());
    assert!(server.is_stop_requested());
    server.wait_for_stop();
}

#[test]
fn stop_request_is_observed_with_no_client_connected() {
    let fixtures = two_fixtures();
    let (mut server, _port) = start_server(fixtures.path(), true, 1000.0);

    let started = Instant::now();
    server.request_stop();
    server.wait_for_stop();
    assert!(
        started.elapsed() < Duration::from_secs(3),
        "shutdown took {:?}",
        started.elapsed()
    );
}

#[test]
fn start_fails_when_root_has_no_images() {
    let empty = TempDir::new().unwrap();
    let mut server = ImageFileServer::new(server_config(empty.path(), false, 30.0, free_port()));
    assert!(matches!(server.start(), Err(Error::NoImages(_))));
    assert!(server.is_stop_requested());
}

#[test]
fn start_fails_when_root_is_missing() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope");
    let mut server = ImageFileServer::new(server_config(&missing, false, 30.0, free_port()));
    assert!(matches!(server.start(), Err(Error::Config(_))));
}

#[test]
fn oversized_header_is_a_protocol_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    // Rogue server: answers the first request with an endless,
    // unterminated header and keeps the socket open.
    let rogue = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 256];
        let _ = stream.read(&mut buf);
        let junk = vec![b'x'; 80_000];
        let _ = stream.write_all(&junk);
        thread::sleep(Duration::from_millis(500));
    });

    let mut client = connect_client(port);
    let err = client.get_frame().unwrap_err();
    assert!(
        matches!(err, Error::Protocol(_)),
        "expected protocol error, got {:?}",
        err
    );
    client.stop_streaming().unwrap();
    rogue.join().unwrap();
}

#[test]
fn malformed_header_is_a_protocol_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let rogue = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 256];
        let _ = stream.read(&mut buf);
        let _ = stream.write_all(b"this is not json\n");
        thread::sleep(Duration::from_millis(200));
    });

    let mut client = connect_client(port);
    let err = client.get_frame().unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
    client.stop_streaming().unwrap();
    rogue.join().unwrap();
}

#[test]
fn skipped_paths_are_never_served() {
    let dir = TempDir::new().unwrap();
    write_png(dir.path(), "keep.png", 4, 3, [1, 2, 3]);
    let hidden = dir.path().join("skipme");
    std::fs::create_dir(&hidden).unwrap();
    write_png(&hidden, "secret.png", 4, 3, [9, 9, 9]);

    let port = free_port();
    let mut config = server_config(dir.path(), true, 1000.0, port);
    config.skip_path_substrings = vec!["skipme".to_string()];
    let mut server = ImageFileServer::new(config);
    server.start().unwrap();
    wait_for_listener(port);

    let mut client = connect_client(port);
    // Cycle twice around a one-image set: the skipped file never shows up.
    for _ in 0..3 {
        let frame = client.get_frame().unwrap();
        assert_eq!(frame.provenance().image_file_name, "keep.png");
        client.request_next_image().unwrap();
    }

    client.stop_streaming().unwrap();
    server.request_stop();
    server.wait_for_stop();
}
