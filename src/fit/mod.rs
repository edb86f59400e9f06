//! Transient fitting.
//!
//! Responsibilities:
//!
//! - choose the cutoff (start of the fit window), optionally by scanning
//!   candidate windows in parallel
//! - fit the exponential relaxation with Levenberg–Marquardt
//! - generate τ restart seeds when the heuristic start fails

pub mod cutoff;
pub mod fitter;
pub mod tau_grid;

pub use cutoff::*;
pub use fitter::*;
pub use tau_grid::*;
