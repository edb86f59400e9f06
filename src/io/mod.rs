//! Input/output helpers.
//!
//! - session JSON loading/saving with optional per-run sample CSVs (`session`)
//! - result exports (CSV/JSON) (`export`)

pub mod export;
pub mod session;

pub use export::*;
pub use session::*;
