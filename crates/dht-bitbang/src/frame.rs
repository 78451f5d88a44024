//! # Frame decoding
//!
//! A data frame occupies the last [`FRAME_LEN`] entries of a capture that
//! ends on a low level. It is made of [`FRAME_BITS`] bit-pairs, each one
//! being a high pulse followed by a low separator pulse:
//!
//! - The duration of the high pulse encodes the bit value: up to
//!   [`BIT_ONE_THRESHOLD`] it is a `0`, above it a `1`.
//! - No high pulse may exceed [`HIGH_PULSE_MAX`].
//! - Every low pulse must last between [`LOW_PULSE_MIN`] and
//!   [`LOW_PULSE_MAX`], both inclusive.
//!
//! These thresholds are sensor protocol constants. Changing them changes
//! which traces decode, so they are not configurable.

use core::time::Duration;

use embedded_hal::digital::PinState;

use crate::error::FrameError;
use crate::trace::TraceEntry;

/// Number of data bits transmitted by the sensor.
pub const FRAME_BITS: usize = 40;

/// Number of trace entries spanned by a frame, one high and one low
/// entry for each bit.
pub const FRAME_LEN: usize = FRAME_BITS * 2;

/// Longest high pulse still decoded as a `0` bit.
pub const BIT_ONE_THRESHOLD: Duration = Duration::from_micros(30);

/// Longest valid high pulse.
pub const HIGH_PULSE_MAX: Duration = Duration::from_micros(90);

/// Shortest valid low pulse.
pub const LOW_PULSE_MIN: Duration = Duration::from_micros(35);

/// Longest valid low pulse.
pub const LOW_PULSE_MAX: Duration = Duration::from_micros(70);

/// The 40 raw bits sent by the sensor, most significant bit first.
///
/// Bytes `0` and `1` carry the humidity, bytes `2` and `3` the temperature
/// and byte `4` the checksum. Their interpretation depends on the sensor
/// kind and is left to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    bits: [u8; FRAME_BITS],
}

impl Frame {
    /// Decodes the frame held at the end of a captured trace.
    ///
    /// Locates the frame with [`locate`] and then validates and decodes it
    /// with [`decode`].
    ///
    /// # Errors
    ///
    /// Returns the first [`FrameError`] detected. No partial frame is ever
    /// returned.
    pub fn from_trace(entries: &[TraceEntry]) -> Result<Self, FrameError> {
        let start = locate(entries)?;
        decode(entries, start)
    }

    /// Creates a [`Frame`] from five already decoded bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 5]) -> Self {
        let mut bits = [0; FRAME_BITS];
        for (i, bit) in bits.iter_mut().enumerate() {
            *bit = (bytes[i / 8] >> (7 - i % 8)) & 1;
        }
        Self { bits }
    }

    /// Returns the bits in transmission order, each one being `0` or `1`.
    #[must_use]
    pub const fn bits(&self) -> &[u8; FRAME_BITS] {
        &self.bits
    }

    /// Returns the bit at `index`, or `None` past the end of the frame.
    #[must_use]
    pub fn bit(&self, index: usize) -> Option<u8> {
        self.bits.get(index).copied()
    }

    /// Packs the bits into five bytes, most significant bit first.
    #[must_use]
    pub fn bytes(&self) -> [u8; 5] {
        let mut bytes = [0; 5];
        for (i, bit) in self.bits.iter().enumerate() {
            bytes[i / 8] |= bit << (7 - i % 8);
        }
        bytes
    }

    /// Checks whether the last byte equals the low 8 bits of the sum of the
    /// first four.
    #[must_use]
    pub fn checksum_matches(&self) -> bool {
        let [hh, hl, th, tl, checksum] = self.bytes();
        hh.wrapping_add(hl).wrapping_add(th).wrapping_add(tl) == checksum
    }
}

/// Finds the index of the first entry of the frame.
///
/// The trace is scanned backwards for its last low entry, which closes the
/// frame. The frame starts [`FRAME_LEN`]` - 1` entries before it.
///
/// # Errors
///
/// Returns [`FrameError::FrameBoundaryMissing`] when the last low entry is
/// too close to the start of the trace to close a whole frame, or when
/// there is no low entry at all.
pub fn locate(entries: &[TraceEntry]) -> Result<usize, FrameError> {
    let end = entries
        .iter()
        .rposition(|entry| entry.level == PinState::Low)
        .ok_or(FrameError::FrameBoundaryMissing)?;

    end.checked_sub(FRAME_LEN - 1)
        .ok_or(FrameError::FrameBoundaryMissing)
}

/// Decodes and validates the frame beginning at `start`.
///
/// High pulses are checked and decoded first, then the low pulses
/// following each of them are checked.
///
/// # Errors
///
/// - [`FrameError::FrameBoundaryMissing`] if the trace is too short to hold
///   a frame at `start`.
/// - [`FrameError::MisalignedFrame`] if an entry has an unexpected level.
/// - [`FrameError::PulseTooLong`] or [`FrameError::PulseTooShort`] if a
///   pulse violates the protocol timing.
pub fn decode(entries: &[TraceEntry], start: usize) -> Result<Frame, FrameError> {
    let frame = start
        .checked_add(FRAME_LEN)
        .and_then(|end| entries.get(start..end))
        .ok_or(FrameError::FrameBoundaryMissing)?;

    let mut bits = [0; FRAME_BITS];
    for (i, (bit, entry)) in bits.iter_mut().zip(frame.iter().step_by(2)).enumerate() {
        *bit = decode_bit(entry, start + 2 * i)?;
    }

    for (i, entry) in frame.iter().skip(1).step_by(2).enumerate() {
        check_separator(entry, start + 2 * i + 1)?;
    }

    Ok(Frame { bits })
}

#[inline]
fn decode_bit(entry: &TraceEntry, index: usize) -> Result<u8, FrameError> {
    if entry.level != PinState::High {
        return Err(FrameError::MisalignedFrame {
            index,
            expected: PinState::High,
        });
    }

    if entry.duration > HIGH_PULSE_MAX {
        return Err(FrameError::PulseTooLong {
            level: PinState::High,
            duration: entry.duration,
        });
    }

    Ok(u8::from(entry.duration > BIT_ONE_THRESHOLD))
}

#[inline]
fn check_separator(entry: &TraceEntry, index: usize) -> Result<(), FrameError> {
    if entry.level != PinState::Low {
        return Err(FrameError::MisalignedFrame {
            index,
            expected: PinState::Low,
        });
    }

    if entry.duration > LOW_PULSE_MAX {
        return Err(FrameError::PulseTooLong {
            level: PinState::Low,
            duration: entry.duration,
        });
    }

    if entry.duration < LOW_PULSE_MIN {
        return Err(FrameError::PulseTooShort {
            level: PinState::Low,
            duration: entry.duration,
        });
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    extern crate std;
    use std::vec::Vec;

    use crate::trace::CAPTURE_LEN;

    pub(crate) const PATTERN: [u8; FRAME_BITS] = [
        1, 0, 1, 1, 0, 0, 0, 1, // 0xB1
        0, 0, 0, 0, 0, 0, 1, 0, // 0x02
        0, 0, 0, 1, 1, 0, 0, 1, // 0x19
        1, 1, 0, 0, 1, 0, 1, 0, // 0xCA
        1, 1, 1, 1, 1, 1, 1, 0, // 0xFE
    ];

    const ZERO_US: u64 = 26;
    const ONE_US: u64 = 70;
    const SEPARATOR_US: u64 = 50;

    // Release high, acknowledgment low and high, first bit separator, then the frame.
    fn capture(bits: &[u8; FRAME_BITS]) -> Vec<TraceEntry> {
        let mut entries = Vec::with_capacity(CAPTURE_LEN);
        entries.push(TraceEntry::high_us(30));
        entries.push(TraceEntry::low_us(80));
        entries.push(TraceEntry::high_us(80));
        entries.push(TraceEntry::low_us(SEPARATOR_US));
        for bit in bits {
            entries.push(TraceEntry::high_us(if *bit == 1 { ONE_US } else { ZERO_US }));
            entries.push(TraceEntry::low_us(SEPARATOR_US));
        }
        entries
    }

    #[test]
    fn test_decode_fixed_pattern() {
        let entries = capture(&PATTERN);
        assert_eq!(entries.len(), CAPTURE_LEN);

        assert_eq!(locate(&entries), Ok(4));

        let frame = Frame::from_trace(&entries).unwrap();
        assert_eq!(frame.bits(), &PATTERN);
        assert_eq!(frame.bytes(), [0xB1, 0x02, 0x19, 0xCA, 0xFE]);
    }

    #[test]
    fn test_decode_alternating_and_uniform_patterns() {
        let patterns = [
            [0; FRAME_BITS],
            [1; FRAME_BITS],
            core::array::from_fn(|i| (i % 2) as u8),
            core::array::from_fn(|i| u8::from(i % 3 == 0)),
        ];

        for pattern in patterns {
            let frame = Frame::from_trace(&capture(&pattern)).unwrap();
            assert_eq!(frame.bits(), &pattern);
        }
    }

    #[test]
    fn test_decode_frame_at_trace_start() {
        // Frame only: the last low entry sits at index 79.
        let entries = capture(&PATTERN).split_off(4);
        assert_eq!(entries.len(), FRAME_LEN);

        assert_eq!(locate(&entries), Ok(0));
        assert_eq!(Frame::from_trace(&entries).unwrap().bits(), &PATTERN);
    }

    #[test]
    fn test_locate_ignores_trailing_high_entries() {
        let mut entries = capture(&PATTERN);
        let _ = entries.drain(..2);
        entries.push(TraceEntry::high_us(1000));
        entries.push(TraceEntry::high_us(1000));
        assert_eq!(entries.len(), CAPTURE_LEN);

        assert_eq!(locate(&entries), Ok(2));
        assert_eq!(Frame::from_trace(&entries).unwrap().bits(), &PATTERN);
    }

    #[test]
    fn test_locate_boundary_too_early() {
        // Last low entry at index 60 of an 84-entry trace.
        let mut entries = capture(&PATTERN);
        entries[60] = TraceEntry::low_us(50);
        for entry in &mut entries[61..] {
            *entry = TraceEntry::high_us(1000);
        }
        assert_eq!(entries.len(), CAPTURE_LEN);

        assert_eq!(locate(&entries), Err(FrameError::FrameBoundaryMissing));
        assert_eq!(
            Frame::from_trace(&entries),
            Err(FrameError::FrameBoundaryMissing)
        );
    }

    #[test]
    fn test_locate_boundary_one_entry_short() {
        // The last low entry sits at index 78, one short of a whole frame.
        let entries = capture(&PATTERN).split_off(5);
        assert_eq!(entries.len(), FRAME_LEN - 1);

        assert_eq!(locate(&entries), Err(FrameError::FrameBoundaryMissing));
    }

    #[test]
    fn test_locate_unresponsive_sensor() {
        let entries = [TraceEntry::high_us(1000); CAPTURE_LEN];
        assert_eq!(locate(&entries), Err(FrameError::FrameBoundaryMissing));

        assert_eq!(locate(&[]), Err(FrameError::FrameBoundaryMissing));
    }

    #[test]
    fn test_decode_start_out_of_range() {
        let entries = capture(&PATTERN);
        assert_eq!(
            decode(&entries, 5),
            Err(FrameError::FrameBoundaryMissing)
        );
        assert_eq!(
            decode(&entries, usize::MAX),
            Err(FrameError::FrameBoundaryMissing)
        );
    }

    #[test]
    fn test_high_pulse_boundaries() {
        let mut entries = capture(&[0; FRAME_BITS]);

        entries[4].duration = Duration::from_micros(30);
        assert_eq!(Frame::from_trace(&entries).unwrap().bit(0), Some(0));

        entries[4].duration = Duration::from_nanos(30_001);
        assert_eq!(Frame::from_trace(&entries).unwrap().bit(0), Some(1));

        entries[4].duration = Duration::from_micros(90);
        assert_eq!(Frame::from_trace(&entries).unwrap().bit(0), Some(1));

        entries[4].duration = Duration::from_nanos(90_001);
        assert_eq!(
            Frame::from_trace(&entries),
            Err(FrameError::PulseTooLong {
                level: PinState::High,
                duration: Duration::from_nanos(90_001),
            })
        );
    }

    #[test]
    fn test_high_pulse_too_long() {
        let mut entries = capture(&PATTERN);
        entries[20].duration = Duration::from_micros(95);

        assert_eq!(
            Frame::from_trace(&entries),
            Err(FrameError::PulseTooLong {
                level: PinState::High,
                duration: Duration::from_micros(95),
            })
        );
    }

    #[test]
    fn test_high_pulses_checked_before_low_pulses() {
        let mut entries = capture(&PATTERN);
        entries[5].duration = Duration::from_micros(10);
        entries[82].duration = Duration::from_micros(95);

        assert!(matches!(
            Frame::from_trace(&entries),
            Err(FrameError::PulseTooLong {
                level: PinState::High,
                ..
            })
        ));
    }

    #[test]
    fn test_low_pulse_boundaries() {
        let mut entries = capture(&PATTERN);

        entries[5].duration = Duration::from_micros(35);
        entries[83].duration = Duration::from_micros(70);
        assert_eq!(Frame::from_trace(&entries).unwrap().bits(), &PATTERN);

        entries[5].duration = Duration::from_nanos(34_999);
        assert_eq!(
            Frame::from_trace(&entries),
            Err(FrameError::PulseTooShort {
                level: PinState::Low,
                duration: Duration::from_nanos(34_999),
            })
        );

        entries[5].duration = Duration::from_micros(35);
        entries[83].duration = Duration::from_nanos(70_001);
        assert_eq!(
            Frame::from_trace(&entries),
            Err(FrameError::PulseTooLong {
                level: PinState::Low,
                duration: Duration::from_nanos(70_001),
            })
        );
    }

    #[test]
    fn test_misaligned_frame() {
        // A bit pulse recorded as low.
        let mut entries = capture(&PATTERN);
        entries[10].level = PinState::Low;
        assert_eq!(
            decode(&entries, 4),
            Err(FrameError::MisalignedFrame {
                index: 10,
                expected: PinState::High,
            })
        );

        // A separator recorded as high.
        let mut entries = capture(&PATTERN);
        entries[11].level = PinState::High;
        assert_eq!(
            decode(&entries, 4),
            Err(FrameError::MisalignedFrame {
                index: 11,
                expected: PinState::Low,
            })
        );

        // Starting one entry too early puts a separator where a bit is expected.
        let entries = capture(&PATTERN);
        assert_eq!(
            decode(&entries, 3),
            Err(FrameError::MisalignedFrame {
                index: 3,
                expected: PinState::High,
            })
        );
    }

    #[test]
    fn test_bytes_and_checksum() {
        let frame = Frame::from_bytes([0x02, 0x58, 0x00, 0xFA, 0x54]);
        assert_eq!(frame.bytes(), [0x02, 0x58, 0x00, 0xFA, 0x54]);
        assert!(frame.checksum_matches());
        assert_eq!(frame.bit(6), Some(1));
        assert_eq!(frame.bit(7), Some(0));
        assert_eq!(frame.bit(FRAME_BITS), None);

        let frame = Frame::from_bytes([0x02, 0x58, 0x00, 0xFA, 0x55]);
        assert!(!frame.checksum_matches());

        // Checksum wraps on overflow.
        assert!(Frame::from_bytes([0xFF, 0xFF, 0x01, 0x02, 0x01]).checksum_matches());
    }
}
