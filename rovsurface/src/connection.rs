//! Control channel to the vehicle
//!
//! One persistent TCP connection carrying a strict request/response
//! rhythm: the surface sends the safeguarded transmit projection as a
//! JSON object, the vehicle answers with its telemetry, and both sides
//! merge what they receive. The channel never gives up; any transport
//! failure tears the session down and the loop reconnects after a delay.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{info, warn};

use rovlib::protocol::{decode_state, encode_state, RECV_BUFFER_SIZE};
use rovlib::{DataStore, RovError, RovResult};

use crate::config::SurfaceConfig;

/// Lifecycle of one channel session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Timing parameters shared by the control and video channels
#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    pub reconnect_delay: Duration,
    pub communication_delay: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl From<&SurfaceConfig> for ChannelConfig {
    fn from(config: &SurfaceConfig) -> Self {
        Self {
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
            communication_delay: Duration::from_millis(config.communication_delay_ms),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            read_timeout: Duration::from_millis(config.read_timeout_ms),
        }
    }
}

/// Resolve and connect with timeouts applied.
///
/// The read timeout keeps blocked receive calls bounded so the channel
/// loops can observe shutdown.
pub(crate) fn connect(host: &str, port: u16, config: &ChannelConfig) -> RovResult<TcpStream> {
    let addr: SocketAddr = (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| RovError::Config(format!("cannot resolve {}:{}", host, port)))?;

    let stream = TcpStream::connect_timeout(&addr, config.connect_timeout)?;
    stream.set_read_timeout(Some(config.read_timeout))?;
    Ok(stream)
}

/// Reconnecting control channel
pub struct Connection {
    host: String,
    port: u16,
    config: ChannelConfig,
    state: Arc<Mutex<SessionState>>,
    recv_buffer: Vec<u8>,
}

impl Connection {
    pub fn new(host: &str, port: u16, config: ChannelConfig) -> Self {
        Self {
            host: host.to_string(),
            port,
            config,
            state: Arc::new(Mutex::new(SessionState::Disconnected)),
            recv_buffer: vec![0u8; RECV_BUFFER_SIZE],
        }
    }

    /// Observable session state, for status display and tests
    pub fn state_handle(&self) -> Arc<Mutex<SessionState>> {
        Arc::clone(&self.state)
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap() = state;
    }

    /// Run one send/receive cycle over an established stream.
    ///
    /// A read timeout counts as a completed cycle with nothing to merge;
    /// a zero-length read means the vehicle closed the connection.
    fn exchange(&mut self, stream: &mut TcpStream, store: &DataStore) -> RovResult<()> {
        let outgoing = encode_state(&store.transmit(&[]))?;
        stream.write_all(&outgoing)?;

        let size = match stream.read(&mut self.recv_buffer) {
            Ok(0) => return Err(RovError::PeerClosed),
            Ok(size) => size,
            Err(ref e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                return Ok(())
            }
            Err(e) => return Err(RovError::Io(e)),
        };

        match decode_state(&self.recv_buffer[..size]) {
            Ok(entries) => store.set_all(entries),
            // Malformed telemetry is dropped, the session stays up
            Err(e) => warn!("Dropping undecodable telemetry: {}", e),
        }
        Ok(())
    }

    /// Connect, exchange, and reconnect until `running` clears
    pub fn run(&mut self, store: &DataStore, running: &AtomicBool) {
        while running.load(Ordering::SeqCst) {
            self.set_state(SessionState::Connecting);
            info!("Connecting control channel to {}:{}", self.host, self.port);

            let mut stream = match connect(&self.host, self.port, &self.config) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Control channel connect failed: {}", e);
                    self.set_state(SessionState::Disconnected);
                    thread::sleep(self.config.reconnect_delay);
                    continue;
                }
            };

            self.set_state(SessionState::Connected);
            info!("Control channel established");

            while running.load(Ordering::SeqCst) {
                if let Err(e) = self.exchange(&mut stream, store) {
                    if e.is_transport() {
                        warn!("Control channel lost: {}", e);
                        break;
                    }
                    warn!("Control channel exchange error: {}", e);
                }
                thread::sleep(self.config.communication_delay);
            }

            self.set_state(SessionState::Disconnected);
            // On shutdown the reconnect delay would only stall the join
            if running.load(Ordering::SeqCst) {
                thread::sleep(self.config.reconnect_delay);
            }
        }
    }
}

/// Spawn the control channel thread
pub fn spawn_control_loop(
    mut connection: Connection,
    store: Arc<DataStore>,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || connection.run(&store, &running))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rovlib::Safeguard;
    use std::net::TcpListener;

    fn test_config() -> ChannelConfig {
        ChannelConfig {
            reconnect_delay: Duration::from_millis(10),
            communication_delay: Duration::from_millis(5),
            connect_timeout: Duration::from_millis(500),
            read_timeout: Duration::from_millis(100),
        }
    }

    #[test]
    fn test_exchange_merges_telemetry() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();
            let mut buf = [0u8; RECV_BUFFER_SIZE];
            let size = peer.read(&mut buf).unwrap();
            let request = decode_state(&buf[..size]).unwrap();
            peer.write_all(b"{\"Sen_Dep\": 3.5}").unwrap();
            request
        });

        let store = DataStore::new(Safeguard::default());
        store.set("Thr_FP", 1500.0);

        let mut connection = Connection::new("127.0.0.1", port, test_config());
        let mut stream = connect("127.0.0.1", port, &test_config()).unwrap();
        connection.exchange(&mut stream, &store).unwrap();

        let request = server.join().unwrap();
        assert_eq!(request.get("Thr_FP"), Some(&1500.0));
        assert_eq!(store.get(&["Sen_Dep"]).get("Sen_Dep"), Some(&3.5));
    }

    #[test]
    fn test_zero_read_reports_peer_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (peer, _) = listener.accept().unwrap();
            drop(peer);
        });

        let store = DataStore::new(Safeguard::default());
        let mut connection = Connection::new("127.0.0.1", port, test_config());
        let mut stream = connect("127.0.0.1", port, &test_config()).unwrap();
        server.join().unwrap();

        let mut outcome = Ok(());
        // The local send buffer may absorb a write after the peer is
        // gone; drive cycles until the close is observed
        for _ in 0..10 {
            outcome = connection.exchange(&mut stream, &store);
            if outcome.is_err() {
                break;
            }
        }
        let err = outcome.unwrap_err();
        assert!(err.is_transport(), "expected transport error, got {}", err);
    }

    #[test]
    fn test_shutdown_skips_reconnect_delay() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();
            let mut buf = [0u8; RECV_BUFFER_SIZE];
            while peer.read(&mut buf).unwrap_or(0) > 0 {
                // The surface may already be gone when the reply goes out
                if peer.write_all(b"{\"Sen_Dep\": 1.0}").is_err() {
                    break;
                }
            }
        });

        // A long reconnect delay must not stall the join once the
        // running flag clears
        let config = ChannelConfig {
            reconnect_delay: Duration::from_secs(5),
            ..test_config()
        };
        let connection = Connection::new("127.0.0.1", port, config);
        let store = Arc::new(DataStore::new(Safeguard::default()));
        let running = Arc::new(AtomicBool::new(true));
        let handle = spawn_control_loop(connection, Arc::clone(&store), Arc::clone(&running));

        thread::sleep(Duration::from_millis(100));
        let start = std::time::Instant::now();
        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        server.join().unwrap();
    }

    #[test]
    fn test_run_reconnects_after_session_loss() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let sessions = thread::spawn(move || {
            // First session: answer once, then drop to force a reconnect
            let (mut peer, _) = listener.accept().unwrap();
            let mut buf = [0u8; RECV_BUFFER_SIZE];
            let size = peer.read(&mut buf).unwrap();
            assert!(size > 0);
            peer.write_all(b"{\"Sen_Dep\": 1.0}").unwrap();
            drop(peer);

            // Second session proves the channel came back on its own
            let (mut peer, _) = listener.accept().unwrap();
            let size = peer.read(&mut buf).unwrap();
            assert!(size > 0);
            peer.write_all(b"{\"Sen_Dep\": 2.0}").unwrap();
        });

        let store = Arc::new(DataStore::new(Safeguard::default()));
        store.set("Thr_FP", 1500.0);
        let running = Arc::new(AtomicBool::new(true));

        let connection = Connection::new("127.0.0.1", port, test_config());
        let state = connection.state_handle();
        let handle = spawn_control_loop(connection, Arc::clone(&store), Arc::clone(&running));

        sessions.join().unwrap();

        // Wait for the second session's telemetry to land
        for _ in 0..100 {
            if store.get(&["Sen_Dep"]).get("Sen_Dep") == Some(&2.0) {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(store.get(&["Sen_Dep"]).get("Sen_Dep"), Some(&2.0));

        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();
        assert_eq!(*state.lock().unwrap(), SessionState::Disconnected);
    }
}
