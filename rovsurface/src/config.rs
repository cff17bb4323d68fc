//! Configuration for the surface station

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use rovlib::{RovError, RovResult};

/// Input backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputBackend {
    /// No input hardware attached; input-dependent tasks are disabled
    None,
    /// Read `CODE STATE` event lines from stdin (bench testing)
    Stdin,
}

/// Surface station configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Vehicle address
    pub host: String,
    /// Control channel port
    pub control_port: u16,
    /// First video channel port; camera i connects to video_port_base + i
    pub video_port_base: u16,
    /// Number of camera streams
    pub camera_count: u16,
    /// Delay before a session reconnect attempt, milliseconds
    pub reconnect_delay_ms: u64,
    /// Delay between control channel exchange cycles, milliseconds
    pub communication_delay_ms: u64,
    /// Allocation engine tick, milliseconds
    pub update_delay_ms: u64,
    /// Socket connect timeout, milliseconds
    pub connect_timeout_ms: u64,
    /// Socket read timeout, milliseconds; lets the loops observe shutdown
    pub read_timeout_ms: u64,
    /// Input backend
    pub input: InputBackend,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            control_port: 50000,
            video_port_base: 50010,
            camera_count: 3,
            reconnect_delay_ms: 1000,
            communication_delay_ms: 50,
            update_delay_ms: 30,
            connect_timeout_ms: 2000,
            read_timeout_ms: 1000,
            input: InputBackend::Stdin,
        }
    }
}

/// Load configuration from a JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> RovResult<SurfaceConfig> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let config: SurfaceConfig = serde_json::from_reader(reader)?;

    if config.video_port_base.checked_add(config.camera_count).is_none() {
        return Err(RovError::Config(
            "video port range exceeds the valid port space".to_string(),
        ));
    }

    Ok(config)
}

/// Configuration constants
pub mod constants {
    /// Hardware axis range reported by the controller
    pub const AXIS_MIN: i32 = -32768;
    pub const AXIS_MAX: i32 = 32767;

    /// Hardware trigger range
    pub const TRIGGER_MIN: i32 = 0;
    pub const TRIGGER_MAX: i32 = 255;

    /// Operational PWM range shared by all actuators
    pub const PWM_MIN: i32 = 1100;
    pub const PWM_MAX: i32 = 1900;

    /// Operational range of the forward trigger
    pub const TRIGGER_PWM_MIN: i32 = 1500;
    pub const TRIGGER_PWM_MAX: i32 = 1900;

    /// Minimum raw change accepted by an axis setter (smaller is more
    /// sensitive)
    pub const AXIS_SENSITIVITY: i32 = 100;

    /// Minimum raw change accepted by a trigger setter
    pub const TRIGGER_SENSITIVITY: i32 = 2;

    /// Half-width of the idle deadzone band on normalised axis values
    pub const AXIS_DEADZONE: i32 = 25;

    /// Arm servo step per tick while hat X is held
    pub const ARM_SERVO_SPEED: i32 = 20;

    /// Light brightness step per tick while A/B is held
    pub const LAMP_SPEED: i32 = 50;
}
