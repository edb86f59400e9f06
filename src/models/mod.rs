//! Relaxation model implementation.
//!
//! Kept as small, pure functions so the fitter and the plotting code share a
//! single definition of the curve.

pub mod model;

pub use model::*;
