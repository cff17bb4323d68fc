//! Current safeguard for the transmit projection
//!
//! Predicts the total current drawn by the commanded actuator values via
//! an empirical per-actuator quadratic model, and rescales the commands
//! whenever the prediction would exceed the hardware amp budget. Scaling
//! inverts the model in closed form and keeps the root closer to the
//! original command, so the direction of the operator's intent survives
//! uniform de-rating.

use std::collections::{HashMap, HashSet};

use log::warn;

use crate::protocol::SAFEGUARD_KEYS;

/// Quadratic current model and budget configuration
#[derive(Debug, Clone)]
pub struct SafeguardConfig {
    /// Keys whose values are subject to rescaling
    pub keys: HashSet<String>,
    /// Total current budget in amps (pick slightly below the fuse rating)
    pub amp_limit: f64,
    /// Raw command values exempt from rescaling ("no demand")
    pub idle_values: Vec<f64>,
    /// Model constants: current(v) = a*v^2 + b*v + c
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Default for SafeguardConfig {
    fn default() -> Self {
        Self {
            keys: SAFEGUARD_KEYS.iter().map(|key| key.to_string()).collect(),
            amp_limit: 99.0,
            idle_values: vec![1500.0],
            a: 0.000_095_379_64,
            b: -0.286_487_2,
            c: 214.951_3,
        }
    }
}

/// The safeguard engine applied to every transmit projection
#[derive(Debug, Clone)]
pub struct Safeguard {
    config: SafeguardConfig,
}

impl Safeguard {
    pub fn new(config: SafeguardConfig) -> Self {
        Self { config }
    }

    /// Predicted current draw for one command value
    pub fn amp(&self, value: f64) -> f64 {
        let SafeguardConfig { a, b, c, .. } = self.config;
        a * value * value + b * value + c
    }

    fn is_idle(&self, value: f64) -> bool {
        self.config.idle_values.iter().any(|idle| *idle == value)
    }

    /// Solve current(v') = target for v', keeping the root nearer the
    /// original command. Returns None when the model cannot be inverted
    /// at this target (negative discriminant or degenerate `a`).
    fn rescaled(&self, original: f64, target_amp: f64) -> Option<f64> {
        let SafeguardConfig { a, b, c, .. } = self.config;
        if a == 0.0 {
            return None;
        }
        let discriminant = b * b - 4.0 * a * (c - target_amp);
        if discriminant < 0.0 {
            return None;
        }
        let root = discriminant.sqrt();
        let high = (-b + root) / (2.0 * a);
        let low = (-b - root) / (2.0 * a);
        if (original - high).abs() <= (original - low).abs() {
            Some(high)
        } else {
            Some(low)
        }
    }

    /// Rescale the safeguarded values in `data` in place so the predicted
    /// total current stays within the amp budget. Keys outside the
    /// safeguarded set, and values in the idle set, are never touched.
    pub fn apply(&self, data: &mut HashMap<String, f64>) {
        let guarded: Vec<(String, f64, f64)> = data
            .iter()
            .filter(|(key, _)| self.config.keys.contains(key.as_str()))
            .map(|(key, value)| (key.clone(), *value, self.amp(*value)))
            .collect();

        let total: f64 = guarded.iter().map(|(_, _, amp)| amp).sum();
        if total <= self.config.amp_limit {
            return;
        }

        let ratio = self.config.amp_limit / total;
        for (key, value, amp) in guarded {
            if self.is_idle(value) {
                continue;
            }
            match self.rescaled(value, amp * ratio) {
                Some(scaled) => {
                    data.insert(key, scaled);
                }
                None => warn!(
                    "Current model not invertible for {} = {} (target {:.3} A); value left as commanded",
                    key, value, amp * ratio
                ),
            }
        }
    }
}

impl Default for Safeguard {
    fn default() -> Self {
        Self::new(SafeguardConfig::default())
    }
}
