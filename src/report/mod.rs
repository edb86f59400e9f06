//! Terminal reporting for processed sessions.

pub mod format;

pub use format::*;
