//! # Contracts
//!
//! Interface contracts shared by every crate of the A/V sync workspace.
//! Business crates depend on this crate only, never on each other's internals.
//!
//! ## Time Model
//! - Capture timestamps are `u64` nanoseconds
//! - Engine events are relative to the first video frame

mod config;
mod error;
mod marker;
mod media;
mod sink;
pub mod tone;

pub use config::*;
pub use error::*;
pub use marker::*;
pub use media::*;
pub use sink::*;
