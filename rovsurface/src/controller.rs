//! Gamepad input mapping
//!
//! Normalises raw controller events into a filtered state snapshot. Event
//! sourcing itself is external: anything able to deliver discrete
//! `(code, state)` pairs implements `EventSource`. Axis and trigger
//! setters apply hysteresis against the last accepted raw reading so
//! sensor jitter never reaches the allocation engine; getters
//! MinMax-normalise into the operational PWM range, and axis getters
//! clamp to the idle baseline inside the deadzone band.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{info, warn};

use rovlib::{RovError, RovResult};

use crate::config::constants::{
    AXIS_DEADZONE, AXIS_MAX, AXIS_MIN, AXIS_SENSITIVITY, PWM_MAX, PWM_MIN, TRIGGER_MAX,
    TRIGGER_MIN, TRIGGER_PWM_MAX, TRIGGER_PWM_MIN, TRIGGER_SENSITIVITY,
};

/// Idle baseline: the PWM value meaning "no operator input"
pub const IDLE_PWM: i32 = 1500;

/// Fixed offset from idle contributed by a button override
pub const BUTTON_OFFSET: i32 = 400;

/// MinMax normalisation from the hardware range onto the intended range
pub fn normalise(
    value: i32,
    current_min: i32,
    current_max: i32,
    intended_min: i32,
    intended_max: i32,
) -> i32 {
    (intended_min as f64
        + (value - current_min) as f64 * (intended_max - intended_min) as f64
            / (current_max - current_min) as f64) as i32
}

/// One discrete controller event
#[derive(Debug, Clone)]
pub struct InputEvent {
    pub code: String,
    pub state: i32,
}

/// External source of controller events.
///
/// Raw HID access lives outside this crate; a source only has to block
/// until the next `(code, state)` pair is available.
pub trait EventSource: Send {
    fn next_event(&mut self) -> RovResult<InputEvent>;
}

/// Bench-test event source reading `CODE STATE` lines from stdin
pub struct StdinEventSource {
    lines: std::io::Lines<std::io::BufReader<std::io::Stdin>>,
}

impl StdinEventSource {
    pub fn new() -> Self {
        use std::io::BufRead;
        Self {
            lines: std::io::BufReader::new(std::io::stdin()).lines(),
        }
    }
}

impl Default for StdinEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for StdinEventSource {
    fn next_event(&mut self) -> RovResult<InputEvent> {
        loop {
            let line = match self.lines.next() {
                Some(line) => line?,
                None => return Err(RovError::PeerClosed),
            };
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next().and_then(|word| word.parse().ok())) {
                (Some(code), Some(state)) => {
                    return Ok(InputEvent {
                        code: code.to_string(),
                        state,
                    })
                }
                _ => warn!("Ignoring malformed input line: {:?}", line),
            }
        }
    }
}

/// Raw controller readings; axis and trigger fields hold the last
/// accepted raw value used for the hysteresis comparison
#[derive(Debug, Clone, Default)]
pub struct ControllerState {
    left_axis_x: i32,
    left_axis_y: i32,
    right_axis_x: i32,
    right_axis_y: i32,
    left_trigger: i32,
    right_trigger: i32,
    hat_x: i32,
    hat_y: i32,
    pub button_a: bool,
    pub button_b: bool,
    pub button_x: bool,
    pub button_y: bool,
    pub button_lb: bool,
    pub button_rb: bool,
    pub button_left_stick: bool,
    pub button_right_stick: bool,
    pub button_select: bool,
    pub button_start: bool,
}

impl ControllerState {
    /// Accept a raw axis reading only at a hardware extreme or when it
    /// moved at least the sensitivity threshold from the last accepted one
    fn accept_axis(current: &mut i32, value: i32) {
        if value == AXIS_MAX || value == AXIS_MIN || (*current - value).abs() >= AXIS_SENSITIVITY {
            *current = value;
        }
    }

    fn accept_trigger(current: &mut i32, value: i32) {
        if value == TRIGGER_MAX
            || value == TRIGGER_MIN
            || (*current - value).abs() >= TRIGGER_SENSITIVITY
        {
            *current = value;
        }
    }

    /// Route one event into its field; unrecognised codes are ignored
    pub fn dispatch(&mut self, event: &InputEvent) {
        let state = event.state;
        match event.code.as_str() {
            "ABS_X" => Self::accept_axis(&mut self.left_axis_x, state),
            "ABS_Y" => Self::accept_axis(&mut self.left_axis_y, state),
            "ABS_RX" => Self::accept_axis(&mut self.right_axis_x, state),
            "ABS_RY" => Self::accept_axis(&mut self.right_axis_y, state),
            "ABS_Z" => Self::accept_trigger(&mut self.left_trigger, state),
            "ABS_RZ" => Self::accept_trigger(&mut self.right_trigger, state),
            "ABS_HAT0X" => self.hat_x = state,
            // Hat Y is reported inverted by the hardware
            "ABS_HAT0Y" => self.hat_y = -state,
            "BTN_SOUTH" => self.button_a = state != 0,
            "BTN_EAST" => self.button_b = state != 0,
            "BTN_WEST" => self.button_x = state != 0,
            "BTN_NORTH" => self.button_y = state != 0,
            "BTN_TL" => self.button_lb = state != 0,
            "BTN_TR" => self.button_rb = state != 0,
            "BTN_THUMBL" => self.button_left_stick = state != 0,
            "BTN_THUMBR" => self.button_right_stick = state != 0,
            // Start and select arrive swapped on this pad
            "BTN_START" => self.button_select = state != 0,
            "BTN_SELECT" => self.button_start = state != 0,
            _ => {}
        }
    }

    /// Normalise an axis into PWM, clamping to idle inside the deadzone
    fn axis_pwm(raw: i32) -> i32 {
        let value = normalise(raw, AXIS_MIN, AXIS_MAX, PWM_MIN, PWM_MAX);
        if (value - IDLE_PWM).abs() <= AXIS_DEADZONE {
            IDLE_PWM
        } else {
            value
        }
    }

    pub fn left_axis_x_pwm(&self) -> i32 {
        Self::axis_pwm(self.left_axis_x)
    }

    pub fn left_axis_y_pwm(&self) -> i32 {
        Self::axis_pwm(self.left_axis_y)
    }

    pub fn right_axis_x_pwm(&self) -> i32 {
        Self::axis_pwm(self.right_axis_x)
    }

    pub fn right_axis_y_pwm(&self) -> i32 {
        Self::axis_pwm(self.right_axis_y)
    }

    /// Left trigger drives reverse: its PWM range runs from idle downwards
    pub fn left_trigger_pwm(&self) -> i32 {
        normalise(
            self.left_trigger,
            TRIGGER_MIN,
            TRIGGER_MAX,
            TRIGGER_PWM_MIN,
            2 * TRIGGER_PWM_MIN - TRIGGER_PWM_MAX,
        )
    }

    pub fn right_trigger_pwm(&self) -> i32 {
        normalise(
            self.right_trigger,
            TRIGGER_MIN,
            TRIGGER_MAX,
            TRIGGER_PWM_MIN,
            TRIGGER_PWM_MAX,
        )
    }

    pub fn hat_x(&self) -> i32 {
        self.hat_x
    }

    pub fn hat_y(&self) -> i32 {
        self.hat_y
    }

    /// Take an immutable snapshot of the normalised state
    pub fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            left_axis_x: self.left_axis_x_pwm(),
            left_axis_y: self.left_axis_y_pwm(),
            right_axis_x: self.right_axis_x_pwm(),
            right_axis_y: self.right_axis_y_pwm(),
            left_trigger: self.left_trigger_pwm(),
            right_trigger: self.right_trigger_pwm(),
            hat_x: self.hat_x,
            hat_y: self.hat_y,
            button_a: self.button_a,
            button_b: self.button_b,
            button_x: self.button_x,
            button_y: self.button_y,
            button_lb: self.button_lb,
            button_rb: self.button_rb,
        }
    }
}

/// Normalised controller state as seen by the allocation engine, taken
/// once per tick
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlSnapshot {
    pub left_axis_x: i32,
    pub left_axis_y: i32,
    pub right_axis_x: i32,
    pub right_axis_y: i32,
    pub left_trigger: i32,
    pub right_trigger: i32,
    pub hat_x: i32,
    pub hat_y: i32,
    pub button_a: bool,
    pub button_b: bool,
    pub button_x: bool,
    pub button_y: bool,
    pub button_lb: bool,
    pub button_rb: bool,
}

impl ControlSnapshot {
    /// Snapshot with every input at rest
    pub fn idle() -> Self {
        ControllerState::default().snapshot()
    }
}

/// Live controller shared between the read loop and the allocation tick
pub struct Controller {
    state: Arc<Mutex<ControllerState>>,
}

impl Controller {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ControllerState::default())),
        }
    }

    pub fn snapshot(&self) -> ControlSnapshot {
        self.state.lock().unwrap().snapshot()
    }

    /// Handle to the shared state, for loops that outlive this reference
    pub fn clone_state(&self) -> Arc<Mutex<ControllerState>> {
        Arc::clone(&self.state)
    }

    /// Spawn the event read loop. It blocks on the source and never holds
    /// the state lock across a read.
    pub fn spawn_read_loop(
        &self,
        mut source: Box<dyn EventSource>,
        running: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        thread::spawn(move || {
            info!("Controller read loop started");
            while running.load(Ordering::SeqCst) {
                match source.next_event() {
                    Ok(event) => state.lock().unwrap().dispatch(&event),
                    Err(e) => {
                        warn!("Input source closed: {}", e);
                        break;
                    }
                }
            }
        })
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}
