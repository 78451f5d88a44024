//! `dht-bitbang` is a library crate that reads `DHT11` and `DHT22`
//! (`AM2302`) humidity and temperature sensors by bit-banging their
//! single-wire data line.
//!
//! A read attempt is strictly sequential:
//!
//! 1. **Trigger**: the line is held low for 1 ms and then released.
//! 2. **Sample**: the line is busy-polled and every level is recorded
//!    together with how long it was held, filling a fixed window of
//!    [`CAPTURE_LEN`] entries.
//! 3. **Locate**: the 40-bit data frame is found at the end of the window.
//! 4. **Decode**: each high pulse becomes a bit, while every pulse is
//!    checked against the sensor timing tolerances.
//!
//! The result is a [`Frame`] of 40 raw bits. Converting those bits into
//! humidity and temperature values is left to the caller.
//!
//! The hardware is accessed only through the [`embedded-hal`] digital and
//! delay traits and an [`embedded-timers`] clock, so the decoder runs
//! unchanged on any platform providing these abstractions, and can be fed
//! synthetic traces in tests.
//!
//! [`embedded-hal`]: https://crates.io/crates/embedded-hal
//! [`embedded-timers`]: https://crates.io/crates/embedded-timers

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![no_std]

/// Errors produced by a read attempt.
pub mod error;
/// Frame location, bit decoding and timing validation.
pub mod frame;
/// The sensor session and its hardware-facing phases.
pub mod sensor;
/// Captured level and duration samples.
pub mod trace;

pub use error::{DhtError, FrameError};
pub use frame::{FRAME_BITS, FRAME_LEN, Frame};
pub use sensor::{Dht, MIN_READ_INTERVAL, SensorKind, TemperatureUnit};
pub use trace::{CAPTURE_LEN, Trace, TraceEntry};
