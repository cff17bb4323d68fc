//! Actuator allocation
//!
//! Translates a normalised controller snapshot into per-actuator PWM
//! values once per tick. Each thruster has a fixed priority chain: the
//! first active input wins and the rest are ignored, so opposing inputs
//! never sum. Stateful actuators (arm servo, lamp) step relative to
//! their previous position instead of mapping an input directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::info;

use rovlib::DataStore;

use crate::config::constants::{ARM_SERVO_SPEED, LAMP_SPEED, PWM_MAX, PWM_MIN};
use crate::controller::{ControlSnapshot, Controller, BUTTON_OFFSET, IDLE_PWM};

/// Pure allocation rule for one stateless actuator
type ActuatorRule = fn(&ControlSnapshot) -> i32;

/// Stateless actuators and their rules, in transmission order
pub const ACTUATOR_RULES: &[(&str, ActuatorRule)] = &[
    ("Thr_FP", thruster_fp),
    ("Thr_FS", thruster_fs),
    ("Thr_AP", thruster_ap),
    ("Thr_AS", thruster_as),
    ("Thr_TFP", thruster_tfp),
    ("Thr_TFS", thruster_tfs),
    ("Thr_TAP", thruster_tap),
    ("Thr_TAS", thruster_tas),
    ("Mot_G", motor_gripper),
    ("Mot_F", motor_box),
];

/// Mirror an input to the opposite side of the idle point
fn mirrored(value: i32) -> i32 {
    2 * IDLE_PWM - value
}

/// Forward port: surge from the triggers, yaw from the right stick,
/// lateral override on X/Y
fn thruster_fp(s: &ControlSnapshot) -> i32 {
    if s.right_trigger != IDLE_PWM {
        s.right_trigger
    } else if s.left_trigger != IDLE_PWM {
        s.left_trigger
    } else if s.right_axis_x != IDLE_PWM {
        s.right_axis_x
    } else if s.button_x {
        IDLE_PWM - BUTTON_OFFSET
    } else if s.button_y {
        IDLE_PWM + BUTTON_OFFSET
    } else {
        IDLE_PWM
    }
}

/// Forward starboard: as the port side, but yaw and the lateral
/// override act mirrored
fn thruster_fs(s: &ControlSnapshot) -> i32 {
    if s.right_trigger != IDLE_PWM {
        s.right_trigger
    } else if s.left_trigger != IDLE_PWM {
        s.left_trigger
    } else if s.right_axis_x != IDLE_PWM {
        mirrored(s.right_axis_x)
    } else if s.button_x {
        IDLE_PWM + BUTTON_OFFSET
    } else if s.button_y {
        IDLE_PWM - BUTTON_OFFSET
    } else {
        IDLE_PWM
    }
}

/// Aft port: yaw takes priority over surge at the stern
fn thruster_ap(s: &ControlSnapshot) -> i32 {
    if s.right_axis_x != IDLE_PWM {
        s.right_axis_x
    } else if s.right_trigger != IDLE_PWM {
        s.right_trigger
    } else if s.left_trigger != IDLE_PWM {
        s.left_trigger
    } else if s.button_x {
        IDLE_PWM + BUTTON_OFFSET
    } else if s.button_y {
        IDLE_PWM - BUTTON_OFFSET
    } else {
        IDLE_PWM
    }
}

fn thruster_as(s: &ControlSnapshot) -> i32 {
    if s.right_axis_x != IDLE_PWM {
        mirrored(s.right_axis_x)
    } else if s.right_trigger != IDLE_PWM {
        s.right_trigger
    } else if s.left_trigger != IDLE_PWM {
        s.left_trigger
    } else if s.button_x {
        IDLE_PWM - BUTTON_OFFSET
    } else if s.button_y {
        IDLE_PWM + BUTTON_OFFSET
    } else {
        IDLE_PWM
    }
}

/// Top forward port: heave from the bumpers, then pitch and roll from
/// the left stick
fn thruster_tfp(s: &ControlSnapshot) -> i32 {
    if s.button_rb {
        IDLE_PWM + BUTTON_OFFSET
    } else if s.button_lb {
        IDLE_PWM - BUTTON_OFFSET
    } else if s.left_axis_y != IDLE_PWM {
        s.left_axis_y
    } else if s.left_axis_x != IDLE_PWM {
        s.left_axis_x
    } else {
        IDLE_PWM
    }
}

fn thruster_tfs(s: &ControlSnapshot) -> i32 {
    if s.button_rb {
        IDLE_PWM + BUTTON_OFFSET
    } else if s.button_lb {
        IDLE_PWM - BUTTON_OFFSET
    } else if s.left_axis_y != IDLE_PWM {
        s.left_axis_y
    } else if s.left_axis_x != IDLE_PWM {
        mirrored(s.left_axis_x)
    } else {
        IDLE_PWM
    }
}

fn thruster_tap(s: &ControlSnapshot) -> i32 {
    if s.button_rb {
        IDLE_PWM + BUTTON_OFFSET
    } else if s.button_lb {
        IDLE_PWM - BUTTON_OFFSET
    } else if s.left_axis_y != IDLE_PWM {
        mirrored(s.left_axis_y)
    } else if s.left_axis_x != IDLE_PWM {
        s.left_axis_x
    } else {
        IDLE_PWM
    }
}

fn thruster_tas(s: &ControlSnapshot) -> i32 {
    if s.button_rb {
        IDLE_PWM + BUTTON_OFFSET
    } else if s.button_lb {
        IDLE_PWM - BUTTON_OFFSET
    } else if s.left_axis_y != IDLE_PWM {
        mirrored(s.left_axis_y)
    } else if s.left_axis_x != IDLE_PWM {
        mirrored(s.left_axis_x)
    } else {
        IDLE_PWM
    }
}

/// Gripper: hat Y drives it fully open or closed
fn motor_gripper(s: &ControlSnapshot) -> i32 {
    IDLE_PWM + s.hat_y * BUTTON_OFFSET
}

/// Sampling box motor is not bound to an input yet
fn motor_box(_s: &ControlSnapshot) -> i32 {
    IDLE_PWM
}

/// Per-tick allocation engine. Holds the positions of the stateful
/// actuators and writes the computed values into the data store.
pub struct Allocator {
    arm_servo: i32,
    lamp_brightness: i32,
    last_written: HashMap<String, f64>,
}

impl Allocator {
    pub fn new() -> Self {
        Self {
            arm_servo: IDLE_PWM,
            lamp_brightness: PWM_MIN,
            last_written: HashMap::new(),
        }
    }

    /// Step the arm servo while hat X is held, clamped to the PWM range
    fn step_arm(&mut self, hat_x: i32) -> i32 {
        if hat_x == 1 && self.arm_servo + ARM_SERVO_SPEED <= PWM_MAX {
            self.arm_servo += ARM_SERVO_SPEED;
        } else if hat_x == -1 && self.arm_servo - ARM_SERVO_SPEED >= PWM_MIN {
            self.arm_servo -= ARM_SERVO_SPEED;
        }
        self.arm_servo
    }

    /// Step the lamp brightness while B/A is held; past either end of
    /// the range the value wraps around to the opposite end
    fn step_lamp(&mut self, brighter: bool, dimmer: bool) -> i32 {
        if brighter {
            self.lamp_brightness += LAMP_SPEED;
            if self.lamp_brightness > PWM_MAX {
                self.lamp_brightness = PWM_MIN;
            }
        } else if dimmer {
            self.lamp_brightness -= LAMP_SPEED;
            if self.lamp_brightness < PWM_MIN {
                self.lamp_brightness = PWM_MAX;
            }
        }
        self.lamp_brightness
    }

    /// Compute all actuator values for one snapshot
    pub fn compute(&mut self, snapshot: &ControlSnapshot) -> HashMap<String, f64> {
        let mut values: HashMap<String, f64> = ACTUATOR_RULES
            .iter()
            .map(|(key, rule)| (key.to_string(), rule(snapshot) as f64))
            .collect();

        values.insert("Mot_R".to_string(), self.step_arm(snapshot.hat_x) as f64);
        values.insert(
            "LED_M".to_string(),
            self.step_lamp(snapshot.button_b, snapshot.button_a) as f64,
        );

        // Raw normalised inputs are kept alongside the actuator values
        // for telemetry and logging on the vehicle side
        values.insert("lax".to_string(), snapshot.left_axis_x as f64);
        values.insert("lay".to_string(), snapshot.left_axis_y as f64);
        values.insert("rax".to_string(), snapshot.right_axis_x as f64);
        values.insert("ray".to_string(), snapshot.right_axis_y as f64);
        values.insert("lt".to_string(), snapshot.left_trigger as f64);
        values.insert("rt".to_string(), snapshot.right_trigger as f64);
        values.insert("hx".to_string(), snapshot.hat_x as f64);
        values.insert("hy".to_string(), snapshot.hat_y as f64);

        values
    }

    /// Run one allocation tick, writing to the store only when a value
    /// actually changed
    pub fn tick(&mut self, snapshot: &ControlSnapshot, store: &DataStore) {
        let values = self.compute(snapshot);
        let changed: Vec<(String, f64)> = values
            .into_iter()
            .filter(|(key, value)| self.last_written.get(key) != Some(value))
            .collect();
        for (key, value) in &changed {
            self.last_written.insert(key.clone(), *value);
        }
        store.set_all(changed);
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the periodic allocation loop
pub fn spawn_update_loop(
    controller: &Controller,
    store: Arc<DataStore>,
    delay: Duration,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    let state = controller.clone_state();
    thread::spawn(move || {
        info!("Allocation loop started");
        let mut allocator = Allocator::new();
        while running.load(Ordering::SeqCst) {
            let snapshot = state.lock().unwrap().snapshot();
            allocator.tick(&snapshot, &store);
            thread::sleep(delay);
        }
    })
}
