use core::time::Duration;

use embedded_hal::digital::PinState;

/// Number of entries recorded by every capture.
///
/// Covers the 80 entries of a data frame plus the line release and the
/// sensor acknowledgment pulses that precede it.
pub const CAPTURE_LEN: usize = 84;

/// A single sample: a line level and how long the line held it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEntry {
    /// Level of the line.
    pub level: PinState,
    /// How long the line stayed at `level`.
    pub duration: Duration,
}

impl TraceEntry {
    const IDLE: Self = Self::new(PinState::High, Duration::ZERO);

    /// Creates a [`TraceEntry`].
    #[must_use]
    pub const fn new(level: PinState, duration: Duration) -> Self {
        Self { level, duration }
    }

    /// Creates a high level [`TraceEntry`] lasting `micros` microseconds.
    #[must_use]
    pub const fn high_us(micros: u64) -> Self {
        Self::new(PinState::High, Duration::from_micros(micros))
    }

    /// Creates a low level [`TraceEntry`] lasting `micros` microseconds.
    #[must_use]
    pub const fn low_us(micros: u64) -> Self {
        Self::new(PinState::Low, Duration::from_micros(micros))
    }
}

/// The capture window of a single read attempt.
///
/// Entries are stored in chronological order, from the line release up
/// to the end of the capture. The window lives on the stack, so filling
/// it never allocates.
#[derive(Debug, Clone)]
pub struct Trace {
    entries: [TraceEntry; CAPTURE_LEN],
}

impl Trace {
    pub(crate) const fn empty() -> Self {
        Self {
            entries: [TraceEntry::IDLE; CAPTURE_LEN],
        }
    }

    /// Creates a [`Trace`] out of already recorded entries.
    #[must_use]
    pub const fn from_entries(entries: [TraceEntry; CAPTURE_LEN]) -> Self {
        Self { entries }
    }

    /// Returns the recorded entries.
    #[must_use]
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    #[inline]
    pub(crate) fn entries_mut(&mut self) -> &mut [TraceEntry; CAPTURE_LEN] {
        &mut self.entries
    }
}

impl AsRef<[TraceEntry]> for Trace {
    fn as_ref(&self) -> &[TraceEntry] {
        self.entries()
    }
}
