//! MAX6639 Rust driver.
//!
//! Platform-agnostic driver for the MAX6639 2-channel PWM fan-speed and
//! temperature controller, built on the `embedded-hal` I2C and delay traits,
//! with an optional async API behind the `async` feature and `defmt` support
//! behind the `defmt` feature.

#![no_std]

pub mod data_types;
pub mod driver;
pub mod error;
pub mod registers;

pub use data_types::{Address, Channel};
pub use driver::Max6639;
pub use error::Error;
pub use registers::DEFAULT_I2C_ADDRESS;
