use core::fmt;
use core::time::Duration;

use embedded_hal::digital::PinState;

/// Errors detected while turning a captured trace into a frame.
///
/// Every variant terminates the current read attempt. None of them is
/// fatal to the session: a later read may succeed once the minimum read
/// interval has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// No low level was found near the end of the capture window.
    ///
    /// The sensor is likely unresponsive or disconnected.
    FrameBoundaryMissing,
    /// A trace entry does not have the level expected at its position.
    ///
    /// The located frame start was wrong or some samples were dropped.
    MisalignedFrame {
        /// Position of the offending entry in the trace.
        index: usize,
        /// Level expected at that position.
        expected: PinState,
    },
    /// A pulse lasted longer than the protocol allows.
    PulseTooLong {
        /// Level of the pulse.
        level: PinState,
        /// Measured duration.
        duration: Duration,
    },
    /// A pulse was shorter than the protocol allows.
    PulseTooShort {
        /// Level of the pulse.
        level: PinState,
        /// Measured duration.
        duration: Duration,
    },
}

#[inline]
const fn level_name(level: PinState) -> &'static str {
    match level {
        PinState::High => "high",
        PinState::Low => "low",
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrameBoundaryMissing => {
                write!(f, "missing readings: no frame boundary found")
            }
            Self::MisalignedFrame { index, expected } => write!(
                f,
                "missing readings: level not {} at entry {index}",
                level_name(*expected)
            ),
            Self::PulseTooLong { level, duration } => write!(
                f,
                "missing readings: {} level duration too long: {duration:?}",
                level_name(*level)
            ),
            Self::PulseTooShort { level, duration } => write!(
                f,
                "missing readings: {} level duration too short: {duration:?}",
                level_name(*level)
            ),
        }
    }
}

impl core::error::Error for FrameError {}

/// Errors that may occur when reading a sensor.
#[derive(Debug)]
pub enum DhtError<E> {
    /// GPIO pin errors.
    Pin(E),
    /// The captured trace does not hold a valid frame.
    Frame(FrameError),
}

impl<E> From<E> for DhtError<E> {
    fn from(e: E) -> Self {
        DhtError::Pin(e)
    }
}

impl<E: fmt::Display> fmt::Display for DhtError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pin(e) => write!(f, "GPIO pin error: {e}"),
            Self::Frame(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl<E> core::error::Error for DhtError<E>
where
    E: core::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Pin(e) => Some(e),
            Self::Frame(e) => Some(e),
        }
    }
}
