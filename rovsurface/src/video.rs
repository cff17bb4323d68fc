//! Video channels from the vehicle cameras
//!
//! Each camera gets its own TCP stream and thread. The vehicle pushes a
//! frame, terminates it with the end marker, and waits for an
//! acknowledgement before sending the next one, so the channel is
//! naturally paced by the surface. Only the most recent decoded frame is
//! kept; display code reads it at its own rate and intermediate frames
//! are simply dropped.
//!
//! Unlike the control channel, a decode failure here tears the session
//! down: once the byte stream is misaligned there is no way to find the
//! next frame boundary short of reconnecting.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};

use rovlib::protocol::{FRAME_ACK, RECV_BUFFER_SIZE};
use rovlib::{Frame, FrameBuffer, RovError, RovResult};

use crate::connection::{connect, ChannelConfig};

/// Reconnecting single-camera video channel
pub struct VideoStream {
    host: String,
    port: u16,
    config: ChannelConfig,
    buffer: FrameBuffer,
    latest: Arc<Mutex<Option<Frame>>>,
    recv_buffer: Vec<u8>,
}

impl VideoStream {
    pub fn new(host: &str, port: u16, config: ChannelConfig) -> Self {
        Self {
            host: host.to_string(),
            port,
            config,
            buffer: FrameBuffer::new(),
            latest: Arc::new(Mutex::new(None)),
            recv_buffer: vec![0u8; RECV_BUFFER_SIZE],
        }
    }

    /// Shared slot holding the most recent frame
    pub fn frame_handle(&self) -> Arc<Mutex<Option<Frame>>> {
        Arc::clone(&self.latest)
    }

    /// Clone of the most recent frame, if any arrived yet
    pub fn frame(&self) -> Option<Frame> {
        self.latest.lock().unwrap().clone()
    }

    /// Run one receive step: pull bytes, and when they complete a frame,
    /// decode it, publish it, and acknowledge.
    fn receive(&mut self, stream: &mut TcpStream) -> RovResult<()> {
        let size = match stream.read(&mut self.recv_buffer) {
            Ok(0) => return Err(RovError::PeerClosed),
            Ok(size) => size,
            Err(ref e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                return Ok(())
            }
            Err(e) => return Err(RovError::Io(e)),
        };
        self.buffer.extend(&self.recv_buffer[..size]);

        if let Some(payload) = self.buffer.take_frame() {
            if payload.is_empty() {
                debug!("Camera {} sent an empty frame", self.port);
            } else {
                let frame = Frame::from_bytes(&payload)?;
                *self.latest.lock().unwrap() = Some(frame);
            }
            stream.write_all(FRAME_ACK)?;
        }
        Ok(())
    }

    /// Connect, receive, and reconnect until `running` clears
    pub fn run(&mut self, running: &AtomicBool) {
        while running.load(Ordering::SeqCst) {
            info!("Connecting video channel to {}:{}", self.host, self.port);

            let mut stream = match connect(&self.host, self.port, &self.config) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Video channel {} connect failed: {}", self.port, e);
                    thread::sleep(self.config.reconnect_delay);
                    continue;
                }
            };

            info!("Video channel {} established", self.port);
            self.buffer = FrameBuffer::new();

            while running.load(Ordering::SeqCst) {
                if let Err(e) = self.receive(&mut stream) {
                    warn!("Video channel {} lost: {}", self.port, e);
                    break;
                }
            }
            // On shutdown the reconnect delay would only stall the join
            if running.load(Ordering::SeqCst) {
                thread::sleep(self.config.reconnect_delay);
            }
        }
    }
}

/// Spawn one video channel thread
pub fn spawn_video_loop(mut stream: VideoStream, running: Arc<AtomicBool>) -> JoinHandle<()> {
    thread::spawn(move || stream.run(&running))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rovlib::protocol::FRAME_END_MARKER;
    use std::net::TcpListener;
    use std::time::Duration;

    fn test_config() -> ChannelConfig {
        ChannelConfig {
            reconnect_delay: Duration::from_millis(10),
            communication_delay: Duration::from_millis(5),
            connect_timeout: Duration::from_millis(500),
            read_timeout: Duration::from_millis(100),
        }
    }

    fn test_frame(shade: u8) -> Frame {
        Frame {
            width: 4,
            height: 2,
            channels: 3,
            data: vec![shade; 24],
        }
    }

    fn send_frame(peer: &mut TcpStream, frame: &Frame) {
        let mut bytes = frame.to_bytes();
        bytes.extend_from_slice(FRAME_END_MARKER);
        // Split the stream to exercise reassembly across receive calls
        let mid = bytes.len() / 2;
        peer.write_all(&bytes[..mid]).unwrap();
        peer.flush().unwrap();
        peer.write_all(&bytes[mid..]).unwrap();
    }

    fn expect_ack(peer: &mut TcpStream) {
        let mut ack = [0u8; FRAME_ACK.len()];
        peer.read_exact(&mut ack).unwrap();
        assert_eq!(&ack, FRAME_ACK);
    }

    #[test]
    fn test_receive_publishes_latest_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();
            send_frame(&mut peer, &test_frame(1));
            expect_ack(&mut peer);
            send_frame(&mut peer, &test_frame(2));
            expect_ack(&mut peer);
        });

        let mut video = VideoStream::new("127.0.0.1", port, test_config());
        let mut stream = connect("127.0.0.1", port, &test_config()).unwrap();

        while video.frame().is_none() {
            video.receive(&mut stream).unwrap();
        }
        assert_eq!(video.frame().unwrap(), test_frame(1));

        while video.frame() == Some(test_frame(1)) {
            video.receive(&mut stream).unwrap();
        }
        assert_eq!(video.frame().unwrap(), test_frame(2));
        server.join().unwrap();
    }

    #[test]
    fn test_corrupt_frame_fails_the_session() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();
            peer.write_all(b"garbage that is no frame").unwrap();
            peer.write_all(FRAME_END_MARKER).unwrap();
            // Hold the socket open so the error comes from decoding
            thread::sleep(Duration::from_millis(200));
        });

        let mut video = VideoStream::new("127.0.0.1", port, test_config());
        let mut stream = connect("127.0.0.1", port, &test_config()).unwrap();

        let mut outcome = Ok(());
        for _ in 0..10 {
            outcome = video.receive(&mut stream);
            if outcome.is_err() {
                break;
            }
        }
        assert!(matches!(outcome, Err(RovError::Frame(_))));
        assert!(video.frame().is_none());
        server.join().unwrap();
    }

    #[test]
    fn test_shutdown_skips_reconnect_delay() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();
            let mut buf = [0u8; 8];
            while peer.read(&mut buf).unwrap_or(0) > 0 {}
        });

        // A long reconnect delay must not stall the join once the
        // running flag clears
        let config = ChannelConfig {
            reconnect_delay: Duration::from_secs(5),
            ..test_config()
        };
        let video = VideoStream::new("127.0.0.1", port, config);
        let running = Arc::new(AtomicBool::new(true));
        let handle = spawn_video_loop(video, Arc::clone(&running));

        thread::sleep(Duration::from_millis(100));
        let start = std::time::Instant::now();
        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        server.join().unwrap();
    }

    #[test]
    fn test_run_reconnects_after_peer_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let sessions = thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();
            send_frame(&mut peer, &test_frame(1));
            expect_ack(&mut peer);
            drop(peer);

            let (mut peer, _) = listener.accept().unwrap();
            send_frame(&mut peer, &test_frame(2));
            expect_ack(&mut peer);
        });

        let video = VideoStream::new("127.0.0.1", port, test_config());
        let latest = video.frame_handle();
        let running = Arc::new(AtomicBool::new(true));
        let handle = spawn_video_loop(video, Arc::clone(&running));

        sessions.join().unwrap();

        for _ in 0..100 {
            if latest.lock().unwrap().as_ref() == Some(&test_frame(2)) {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(latest.lock().unwrap().as_ref(), Some(&test_frame(2)));

        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();
    }
}
