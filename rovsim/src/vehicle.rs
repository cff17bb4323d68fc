//! Simulated vehicle endpoints
//!
//! Stands in for the ROV on the bench: a control server that echoes
//! fake sensor telemetry for every state message it receives, and one
//! video server per camera pushing synthetic frames under the
//! frame/acknowledge rhythm the surface expects.

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use rand::Rng;

use rovlib::protocol::{decode_state, encode_state, FRAME_ACK, FRAME_END_MARKER, RECV_BUFFER_SIZE};
use rovlib::{Frame, RovResult};

const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Fake sensor suite: a bounded random walk per reading
struct Sensors {
    depth: f64,
    temperature: f64,
    pressure: f64,
}

impl Sensors {
    fn new() -> Self {
        Self {
            depth: 5.0,
            temperature: 11.0,
            pressure: 1.5,
        }
    }

    fn step(&mut self) -> HashMap<String, f64> {
        let mut rng = rand::thread_rng();
        self.depth = (self.depth + rng.gen_range(-0.05..0.05)).clamp(0.0, 30.0);
        self.temperature = (self.temperature + rng.gen_range(-0.02..0.02)).clamp(4.0, 20.0);
        self.pressure = (self.pressure + rng.gen_range(-0.01..0.01)).clamp(1.0, 4.0);

        let mut readings = HashMap::new();
        readings.insert("Sen_Dep".to_string(), self.depth);
        readings.insert("Sen_Tmp".to_string(), self.temperature);
        readings.insert("Sen_PSI".to_string(), self.pressure);
        readings
    }
}

/// Control endpoint: one state message in, one telemetry message out
pub struct ControlServer {
    port: u16,
    sensors: Sensors,
}

impl ControlServer {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            sensors: Sensors::new(),
        }
    }

    pub fn run(&mut self, running: Arc<AtomicBool>) -> RovResult<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.port))?;
        listener.set_nonblocking(true)?;
        info!("Control server listening on port {}", self.port);

        while running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    info!("Control connection from {}", peer);
                    if let Err(e) = self.handle_connection(stream, &running) {
                        warn!("Control connection ended: {}", e);
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) => {
                    warn!("Control accept error: {}", e);
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }
        Ok(())
    }

    fn handle_connection(
        &mut self,
        mut stream: TcpStream,
        running: &AtomicBool,
    ) -> RovResult<()> {
        stream.set_read_timeout(Some(Duration::from_millis(500)))?;
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        while running.load(Ordering::SeqCst) {
            let size = match stream.read(&mut buf) {
                Ok(0) => {
                    info!("Surface closed the control connection");
                    return Ok(());
                }
                Ok(size) => size,
                Err(ref e)
                    if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
                {
                    continue
                }
                Err(e) => return Err(e.into()),
            };

            match decode_state(&buf[..size]) {
                Ok(state) => debug!("Received {} actuator values", state.len()),
                Err(e) => warn!("Undecodable state message: {}", e),
            }

            let telemetry = encode_state(&self.sensors.step())?;
            stream.write_all(&telemetry)?;
        }
        Ok(())
    }
}

/// Video endpoint: pushes synthetic frames, one acknowledgement apart
pub struct VideoServer {
    port: u16,
    width: u32,
    height: u32,
    frame_interval: Duration,
}

impl VideoServer {
    pub fn new(port: u16, width: u32, height: u32, frame_interval: Duration) -> Self {
        Self {
            port,
            width,
            height,
            frame_interval,
        }
    }

    pub fn run(&mut self, running: Arc<AtomicBool>) -> RovResult<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.port))?;
        listener.set_nonblocking(true)?;
        info!("Video server listening on port {}", self.port);

        while running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    info!("Video connection from {} on port {}", peer, self.port);
                    if let Err(e) = self.handle_connection(stream, &running) {
                        warn!("Video connection on port {} ended: {}", self.port, e);
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) => {
                    warn!("Video accept error on port {}: {}", self.port, e);
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }
        Ok(())
    }

    fn handle_connection(
        &mut self,
        mut stream: TcpStream,
        running: &AtomicBool,
    ) -> RovResult<()> {
        stream.set_read_timeout(Some(Duration::from_millis(500)))?;
        let mut sequence = 0u32;
        let mut ack = [0u8; FRAME_ACK.len()];

        while running.load(Ordering::SeqCst) {
            let frame = self.generate_frame(sequence);
            stream.write_all(&frame.to_bytes())?;
            stream.write_all(FRAME_END_MARKER)?;
            sequence = sequence.wrapping_add(1);

            // Block until the surface acknowledges before the next frame
            loop {
                match stream.read_exact(&mut ack) {
                    Ok(()) => break,
                    Err(ref e)
                        if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
                    {
                        if !running.load(Ordering::SeqCst) {
                            return Ok(());
                        }
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            thread::sleep(self.frame_interval);
        }
        Ok(())
    }

    /// Noise with a sequence-dependent tint, enough to see motion
    fn generate_frame(&self, sequence: u32) -> Frame {
        let mut rng = rand::thread_rng();
        let size = self.width as usize * self.height as usize * 3;
        let tint = (sequence % 256) as u8;
        let data = (0..size)
            .map(|i| {
                if i % 3 == 0 {
                    tint
                } else {
                    rng.gen()
                }
            })
            .collect();

        Frame {
            width: self.width,
            height: self.height,
            channels: 3,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_frame_decodes() {
        let server = VideoServer::new(50010, 8, 6, Duration::from_millis(100));
        let frame = server.generate_frame(7);
        let decoded = Frame::from_bytes(&frame.to_bytes()).unwrap();
        assert_eq!(decoded.width, 8);
        assert_eq!(decoded.height, 6);
        assert_eq!(decoded.data.len(), 8 * 6 * 3);
    }

    #[test]
    fn test_sensor_walk_stays_bounded() {
        let mut sensors = Sensors::new();
        for _ in 0..1000 {
            let readings = sensors.step();
            let depth = readings["Sen_Dep"];
            assert!((0.0..=30.0).contains(&depth));
        }
    }
}
