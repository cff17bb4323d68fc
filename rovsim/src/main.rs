//! ROV vehicle simulator (rovsim)
//!
//! Bench stand-in for the vehicle. Serves the endpoints the surface
//! station connects to:
//!
//! | Endpoint | Type | Port  | Behaviour                               |
//! |----------|------|-------|-----------------------------------------|
//! | Control  | TCP  | 50000 | JSON state in, fake telemetry out       |
//! | Camera 0 | TCP  | 50010 | synthetic frames, one per acknowledge   |
//! | Camera 1 | TCP  | 50011 | synthetic frames, one per acknowledge   |
//! | Camera 2 | TCP  | 50012 | synthetic frames, one per acknowledge   |

mod vehicle;

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info};

use vehicle::{ControlServer, VideoServer};

const CONTROL_PORT: u16 = 50000;
const VIDEO_PORT_BASE: u16 = 50010;
const FRAME_WIDTH: u32 = 160;
const FRAME_HEIGHT: u32 = 120;
const FRAME_INTERVAL: Duration = Duration::from_millis(40);

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let camera_count: u16 = env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(3);

    info!(
        "Vehicle simulator starting, control on {}, {} cameras from {}",
        CONTROL_PORT, camera_count, VIDEO_PORT_BASE
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running_clone.store(false, Ordering::SeqCst);
    })
    .unwrap_or_else(|e| {
        error!("Error setting Ctrl+C handler: {}", e);
        std::process::exit(1);
    });

    let mut handles = Vec::new();

    let control_running = Arc::clone(&running);
    handles.push(thread::spawn(move || {
        let mut server = ControlServer::new(CONTROL_PORT);
        if let Err(e) = server.run(control_running) {
            error!("Control server error: {}", e);
        }
    }));

    for camera in 0..camera_count {
        let video_running = Arc::clone(&running);
        handles.push(thread::spawn(move || {
            let mut server = VideoServer::new(
                VIDEO_PORT_BASE + camera,
                FRAME_WIDTH,
                FRAME_HEIGHT,
                FRAME_INTERVAL,
            );
            if let Err(e) = server.run(video_running) {
                error!("Video server error: {}", e);
            }
        }));
    }

    info!("All simulated endpoints started");

    for handle in handles {
        let _ = handle.join();
    }

    info!("Vehicle simulator shutdown complete");
}
