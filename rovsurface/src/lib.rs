//! ROV surface control station library
//!
//! Bridges the operator's gamepad to the vehicle: input mapping, actuator
//! allocation, the current safeguard (via rovlib), and the reconnecting
//! control and video channels.

pub mod actuators;
pub mod config;
pub mod connection;
pub mod controller;
pub mod video;
