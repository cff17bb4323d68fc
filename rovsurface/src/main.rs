//! ROV surface control station entry point
//!
//! Wires the pieces together: the gamepad read loop, the allocation
//! tick, the control channel, and one video channel per camera, all
//! sharing a data store and a shutdown flag.

use std::env;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use rovlib::{DataStore, Safeguard};
use rovsurface::actuators::spawn_update_loop;
use rovsurface::config::{load_config, InputBackend, SurfaceConfig};
use rovsurface::connection::{spawn_control_loop, ChannelConfig, Connection};
use rovsurface::controller::{Controller, EventSource, StdinEventSource};
use rovsurface::video::{spawn_video_loop, VideoStream};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let config = match env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            match load_config(&path) {
                Ok(config) => config,
                Err(e) => {
                    error!("Error loading configuration: {}", e);
                    process::exit(1);
                }
            }
        }
        None => SurfaceConfig::default(),
    };

    info!(
        "Surface station starting, vehicle at {}:{}, {} cameras",
        config.host, config.control_port, config.camera_count
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running_clone.store(false, Ordering::SeqCst);
    }) {
        error!("Error setting Ctrl+C handler: {}", e);
        process::exit(1);
    }

    let store = Arc::new(DataStore::new(Safeguard::default()));
    store.clear();

    let channel_config = ChannelConfig::from(&config);
    let mut handles = Vec::new();

    // Input and allocation only run when an input backend is attached;
    // the link threads run regardless so telemetry and video keep
    // flowing from the vehicle
    let source: Option<Box<dyn EventSource>> = match config.input {
        InputBackend::None => {
            warn!("No game controllers detected; input disabled");
            None
        }
        InputBackend::Stdin => Some(Box::new(StdinEventSource::new())),
    };

    if let Some(source) = source {
        let controller = Controller::new();
        handles.push(controller.spawn_read_loop(source, Arc::clone(&running)));
        handles.push(spawn_update_loop(
            &controller,
            Arc::clone(&store),
            Duration::from_millis(config.update_delay_ms),
            Arc::clone(&running),
        ));
    }

    let connection = Connection::new(&config.host, config.control_port, channel_config);
    handles.push(spawn_control_loop(
        connection,
        Arc::clone(&store),
        Arc::clone(&running),
    ));

    for camera in 0..config.camera_count {
        let video = VideoStream::new(
            &config.host,
            config.video_port_base + camera,
            channel_config,
        );
        handles.push(spawn_video_loop(video, Arc::clone(&running)));
    }

    info!("All loops started");

    for handle in handles {
        let _ = handle.join();
    }

    info!("Surface station shutdown complete");
}
