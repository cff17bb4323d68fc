//! ROV Surface/Vehicle Shared Library (rovlib)
//!
//! This library contains definitions shared between the surface control
//! station (rovsurface) and the vehicle-side tooling (rovsim): the keyed
//! state store, the current safeguard, the control-channel codec, and the
//! video frame format.

pub mod error;
pub mod frame;
pub mod protocol;
pub mod safeguard;
pub mod store;

pub use error::*;
pub use frame::*;
pub use safeguard::*;
pub use store::*;
