//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - run inputs (`Run`, `SampleSeries`, `Session`, `SessionConstants`)
//! - physics configuration (`HeatLoadModel`, `Q0Formula`)
//! - derived values (`CutoffResult`, `FitResult`, `CalibrationCurve`, `Q0Result`)
//! - reports (`RunReport`, `SessionReport`, `RunFailure`)

pub mod types;

pub use types::*;
