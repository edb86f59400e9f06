//! Physics of the measurement: heat load, calibration, Q0.

pub mod calibration;
pub mod heat_load;
pub mod q0;

pub use calibration::*;
pub use heat_load::*;
pub use q0::*;
