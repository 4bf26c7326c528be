//! Infrastructure implementations.
//!
//! Contains port trait implementations, settings and snapshot file IO.

pub mod audit;
pub mod clock;
pub mod export;
pub mod ports;
pub mod settings;
