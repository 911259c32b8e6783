//! graphear-core — Pure types, time formatting and text preparation.
//!
//! No async runtime, no I/O, no platform dependencies.

pub mod text_prep;
pub mod time;
pub mod types;
