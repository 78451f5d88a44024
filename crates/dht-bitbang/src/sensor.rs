//! # Sensor session
//!
//! A [`Dht`] owns the data pin of one sensor and performs read attempts on
//! it. The pin must be an open-drain output whose level can be read back:
//! driving it high releases the line to the pull-up resistor, which is how
//! the sensor gets control of the line after the start signal.
//!
//! A read attempt is blocking and runs entirely on the calling thread:
//!
//! - The line is pulled low for [`TRIGGER_PULSE_MS`] and then released.
//! - The line is busy-polled [`CAPTURE_LEN`] times, each time recording its
//!   level and how long it held it, up to [`EDGE_TIMEOUT`].
//! - The line is driven back to its idle-high state.
//! - The captured trace is handed over to the frame decoder.
//!
//! Trigger and sampling run inside a critical section when the
//! `critical-section` feature is enabled, so that interrupts do not corrupt
//! the measured pulse widths. The critical section is released on every
//! exit path. Nothing is logged while it is held.
//!
//! The sensor must not be read more than once every [`MIN_READ_INTERVAL`].
//! [`Dht::read`] does not enforce it: the caller is expected to check
//! [`Dht::is_ready`] or to use [`Dht::read_with_retries`].

use core::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin, PinState};

use embedded_timers::clock::Clock;

use log::{debug, info, warn};

#[cfg(feature = "critical-section")]
use critical_section::with as isolate;

use crate::error::DhtError;
use crate::frame::{self, Frame};
use crate::trace::{CAPTURE_LEN, Trace, TraceEntry};

#[cfg(not(feature = "critical-section"))]
#[inline(always)]
fn isolate<R>(f: impl FnOnce(()) -> R) -> R {
    f(())
}

/// How long the line is held low to start a reading, in milliseconds.
pub const TRIGGER_PULSE_MS: u32 = 1;

/// Longest time a single level is waited for while sampling.
pub const EDGE_TIMEOUT: Duration = Duration::from_millis(1);

/// Minimum time between two read attempts on the same sensor.
pub const MIN_READ_INTERVAL: Duration = Duration::from_secs(2);

// A new session behaves as if it had been read this long before.
const INITIAL_LAST_READ_AGE: Duration = Duration::from_secs(1);

/// Sensor sub-types.
///
/// The kind does not change how a frame is read. It only tells the caller
/// how to interpret the frame bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    /// `DHT11`: 8-bit integer humidity and temperature fields.
    Dht11,
    /// `DHT22` and `AM2302`: 16-bit humidity and temperature fields with a
    /// 0.1 resolution.
    Dht22,
}

impl From<&str> for SensorKind {
    /// Parses a sensor name case-insensitively.
    ///
    /// `"dht11"` selects [`SensorKind::Dht11`], any other name selects
    /// [`SensorKind::Dht22`].
    fn from(name: &str) -> Self {
        if name.eq_ignore_ascii_case("dht11") {
            Self::Dht11
        } else {
            Self::Dht22
        }
    }
}

/// Temperature unit requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TemperatureUnit {
    /// Degrees Celsius (°C).
    #[default]
    Celsius,
    /// Degrees Fahrenheit (°F).
    Fahrenheit,
}

/// A session with a single `DHT11` or `DHT22` sensor.
///
/// A session is not meant to be shared across threads: concurrent reads of
/// the same sensor must be serialized by the caller.
pub struct Dht<'a, P, D, C>
where
    P: InputPin + OutputPin,
    D: DelayNs,
    C: Clock,
{
    pin: P,
    delay: D,
    clock: &'a C,
    kind: SensorKind,
    unit: TemperatureUnit,
    last_read: C::Instant,
    // Added to the time elapsed since `last_read`.
    last_read_age: Duration,
    errors: u32,
}

impl<'a, P, D, C> Dht<'a, P, D, C>
where
    P: InputPin + OutputPin,
    D: DelayNs,
    C: Clock,
{
    /// Creates a [`Dht`] session for the given pin, delay provider and
    /// clock.
    ///
    /// The line is driven to its idle-high state and the last read is
    /// backdated by one second, so the sensor can be read one second after
    /// the session has been created.
    ///
    /// # Errors
    ///
    /// Returns an error if driving the pin fails.
    pub fn new(
        mut pin: P,
        delay: D,
        clock: &'a C,
        unit: TemperatureUnit,
        kind: SensorKind,
    ) -> Result<Self, P::Error> {
        pin.set_high()?;

        Ok(Self {
            pin,
            delay,
            clock,
            kind,
            unit,
            last_read: clock.now(),
            last_read_age: INITIAL_LAST_READ_AGE,
            errors: 0,
        })
    }

    /// Returns the sensor kind.
    #[must_use]
    pub const fn kind(&self) -> SensorKind {
        self.kind
    }

    /// Returns the temperature unit requested for this sensor.
    #[must_use]
    pub const fn unit(&self) -> TemperatureUnit {
        self.unit
    }

    /// Returns the number of failed read attempts since the session was
    /// created.
    #[must_use]
    pub const fn errors(&self) -> u32 {
        self.errors
    }

    /// Returns the time elapsed since the last read attempt started,
    /// whatever its outcome.
    #[must_use]
    pub fn elapsed_since_last_read(&self) -> Duration {
        (self.clock.now() - self.last_read).saturating_add(self.last_read_age)
    }

    /// Returns how long the caller has to wait before the sensor can be read
    /// again.
    #[must_use]
    pub fn time_until_ready(&self) -> Duration {
        MIN_READ_INTERVAL.saturating_sub(self.elapsed_since_last_read())
    }

    /// Checks whether [`MIN_READ_INTERVAL`] has passed since the last read
    /// attempt.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.time_until_ready().is_zero()
    }

    /// Performs a single read attempt and returns the raw frame.
    ///
    /// The last read time is refreshed when sampling starts, whether the
    /// attempt succeeds or not. A failed attempt is never retried.
    ///
    /// # Errors
    ///
    /// - [`DhtError::Pin`] if driving or reading the pin fails.
    /// - [`DhtError::Frame`] if the captured trace does not hold a valid
    ///   frame.
    pub fn read(&mut self) -> Result<Frame, DhtError<P::Error>> {
        let result = self.read_frame();

        if let Err(e) = &result {
            self.errors = self.errors.saturating_add(1);
            let failures = self.errors;
            match e {
                DhtError::Pin(e) => {
                    warn!("Sensor read failed ({failures} total): GPIO pin error: {e:?}");
                }
                DhtError::Frame(e) => warn!("Sensor read failed ({failures} total): {e}"),
            }
        }

        result
    }

    /// Reads the sensor, retrying failed attempts.
    ///
    /// Before each attempt, waits until [`MIN_READ_INTERVAL`] has passed
    /// since the previous one. At least one attempt is always performed.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt if all of them fail.
    pub fn read_with_retries(&mut self, attempts: usize) -> Result<Frame, DhtError<P::Error>> {
        let attempts = attempts.max(1);
        let mut attempt = 1;

        loop {
            self.wait_until_ready();

            match self.read() {
                Ok(frame) => {
                    if attempt > 1 {
                        info!("Sensor read succeeded after {attempt} attempts");
                    }
                    return Ok(frame);
                }
                Err(e) if attempt == attempts => return Err(e),
                Err(_) => attempt += 1,
            }
        }
    }

    /// Releases the pin and the delay provider.
    #[must_use]
    pub fn release(self) -> (P, D) {
        (self.pin, self.delay)
    }

    fn read_frame(&mut self) -> Result<Frame, DhtError<P::Error>> {
        let trace = self.capture()?;

        let start = frame::locate(trace.entries()).map_err(DhtError::Frame)?;
        debug!("Captured {CAPTURE_LEN} trace entries, frame starts at entry {start}");

        frame::decode(trace.entries(), start).map_err(DhtError::Frame)
    }

    fn capture(&mut self) -> Result<Trace, DhtError<P::Error>> {
        self.last_read = self.clock.now();
        self.last_read_age = Duration::ZERO;

        let mut trace = Trace::empty();
        let sampled = isolate(|_| -> Result<(), P::Error> {
            self.trigger()?;
            self.sample(&mut trace)
        });

        // Back to idle-high even when sampling failed, reporting the first error.
        let idle = self.pin.set_high();
        sampled?;
        idle?;

        Ok(trace)
    }

    fn trigger(&mut self) -> Result<(), P::Error> {
        self.pin.set_low()?;
        self.delay.delay_ms(TRIGGER_PULSE_MS);

        // Release the line so the sensor can drive it.
        self.pin.set_high()
    }

    fn sample(&mut self, trace: &mut Trace) -> Result<(), P::Error> {
        let mut previous = self.pin.is_high()?;
        let mut current = previous;

        for entry in trace.entries_mut() {
            let start = self.clock.now();
            let mut held = Duration::ZERO;

            while current == previous && held < EDGE_TIMEOUT {
                current = self.pin.is_high()?;
                held = self.clock.now() - start;
            }

            *entry = TraceEntry::new(PinState::from(previous), held);
            previous = current;
        }

        Ok(())
    }

    fn wait_until_ready(&mut self) {
        let wait = self.time_until_ready();
        if !wait.is_zero() {
            debug!("Waiting {wait:?} before reading the sensor");
            self.delay
                .delay_us(u32::try_from(wait.as_micros()).unwrap_or(u32::MAX));
        }
    }
}
