//! Encode and synthesize longwave time signals.
//!
//! This crate encodes the minute frames of four public time signals ([DCF77], [WWVB], [JJY40/60]
//! and [BPC]) and turns them into audible, amplitude-modulated PCM. A receiving watch placed next
//! to a speaker picks up a harmonic of the audio carrier and decodes it like the real broadcast.
//!
//! The crate is layered bottom-up:
//! - [`bits`]: BCD, padded BCD, bit-order aware field packing and parity.
//! - [`dcf77`], [`wwvb`], [`jjy`], [`bpc`]: frame builders, decoders and symbol timing for each
//! 	protocol. Every builder converts its input to the protocol's own time zone.
//! - [`waveform`]: the carrier synthesizer.
//! - [`render`]: one second of 16-bit little-endian PCM for a given frame and second.
//!
//! The crate does no I/O and keeps no state between calls; scheduling output against a wall
//! clock is left to the caller.
//!
//! [DCF77]: https://en.wikipedia.org/wiki/DCF77
//! [WWVB]: https://en.wikipedia.org/wiki/WWVB
//! [JJY40/60]: https://en.wikipedia.org/wiki/JJY
//! [BPC]: https://en.wikipedia.org/wiki/BPC_(time_signal)
//!
//! # Examples
//! ```
//! # use chrono::{TimeZone, Utc};
//! # use signals::{Protocol, Renderer};
//! // Sunday, May 26, 2024. 18:58 CEST / 16:58 UTC.
//! let time = Utc.with_ymd_and_hms(2024, 5, 26, 16, 58, 0).unwrap();
//! let frame = Protocol::Dcf77.build_frame(&time).unwrap();
//!
//! // Bit 17 is set while CEST is in effect
//! assert_eq!(frame.symbol(17).unwrap(), 1);
//!
//! // Render second 21 at 48 kHz: 48000 samples of 2 bytes each
//! let renderer = Renderer::new(Protocol::Dcf77, 48000).unwrap();
//! let pcm = renderer.render_second(&frame, 21).unwrap();
//! assert_eq!(pcm.len(), 96000);
//! ```

use core::{fmt, str::FromStr};
use chrono::{DateTime, TimeZone, Timelike, Utc};

pub mod bits;
pub mod dcf77;
pub mod wwvb;
pub mod jjy;
pub mod bpc;
pub mod waveform;
pub mod render;

pub use render::{Envelope, Renderer};
pub use waveform::Shape;

use bpc::BpcFrame;
use dcf77::Dcf77Frame;
use jjy::JjyFrame;
use wwvb::WwvbFrame;

/// The error type for encoding, decoding and rendering time signals.
///
/// Every variant describes invalid input supplied by the caller. None of them are transient, so
/// retrying the same call will fail the same way.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
	/// A value does not fit in the bit field it is written to.
	#[error("value {value} does not fit in {width} bits")]
	ValueTooWide { value: u64, width: u32 },
	/// A bit field extends past the end of the 64-bit word, or has zero width.
	#[error("bit field at offset {offset} with width {width} is out of range")]
	BitRange { offset: u32, width: u32 },
	/// A value is too large to be encoded as BCD.
	#[error("value {0} is out of range for BCD encoding")]
	BcdOutOfRange(u32),
	/// A nibble greater than 9 was found while decoding BCD.
	#[error("invalid BCD digit {0}")]
	InvalidBcdDigit(u8),
	/// A second-of-minute outside [0, 59]. Leap seconds are reported as 60.
	#[error("second {0} is outside [0, 59]")]
	InvalidSecond(u32),
	/// A bit or symbol index outside the frame.
	#[error("symbol index {0} is outside the frame")]
	InvalidSymbolIndex(u32),
	/// Decoded fields do not form a valid date and time.
	#[error("frame does not encode a valid date and time")]
	InvalidDate,
	/// A BPC symbol string could not be parsed.
	#[error("invalid BPC symbol string: {0}")]
	InvalidSymbolString(String),
	/// A protocol name that is not one of the supported signals.
	#[error("unknown signal: {0}")]
	UnknownProtocol(String),
	/// A waveform name that is not one of the supported shapes.
	#[error("unknown waveform shape: {0}")]
	UnknownShape(String),
	/// A carrier frequency that is not positive or not below the Nyquist frequency.
	#[error("carrier frequency {0} Hz cannot be synthesized at this sample rate")]
	InvalidCarrier(f64),
	/// A modulation depth outside [0, 1].
	#[error("modulation depth {0} is outside [0, 1]")]
	InvalidDepth(f64),
	/// A frame was handed to a renderer for a different protocol.
	#[error("cannot render a {frame} frame as {renderer}")]
	ProtocolMismatch { frame: Protocol, renderer: Protocol }
}

/// Per-protocol constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Profile {
	/// Short name of the signal.
	pub name: &'static str,
	/// Location of the real transmitter.
	pub station: &'static str,
	/// Frequencies of the real broadcast, in kHz.
	pub broadcast_khz: &'static [f64],
	/// Candidate audio carriers in Hz. Each is a sub-harmonic of a broadcast frequency, so the
	/// harmonics of a square wave land on the frequency a receiver listens to.
	pub carriers: [f64; 3],
	/// Fractional amplitude reduction during the low part of each symbol.
	pub depth: f64
}

impl Profile {
	/// The carrier used unless overridden: the middle candidate.
	pub fn default_carrier(&self) -> f64 {
		self.carriers[1]
	}
}

/// Supported time signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
	Dcf77,
	Wwvb,
	Jjy,
	Bpc
}

impl Protocol {
	/// All supported protocols.
	pub const ALL: [Protocol; 4] = [Protocol::Dcf77, Protocol::Wwvb, Protocol::Jjy, Protocol::Bpc];

	/// Constants for this protocol.
	pub fn profile(self) -> &'static Profile {
		match self {
			Protocol::Dcf77 => &dcf77::PROFILE,
			Protocol::Wwvb => &wwvb::PROFILE,
			Protocol::Jjy => &jjy::PROFILE,
			Protocol::Bpc => &bpc::PROFILE
		}
	}

	/// Build the frame for the minute containing `time`.
	///
	/// `time` may be in any time zone; each builder converts it to the zone its protocol
	/// broadcasts in. Callers that want to transmit the next minute (as real stations do) should
	/// pass that minute.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidSecond`] if `time` falls on a leap second, or another [`Error`] if
	/// the date cannot be represented by the protocol.
	pub fn build_frame<Z: TimeZone>(self, time: &DateTime<Z>) -> Result<MinuteFrame, Error> {
		Ok(match self {
			Protocol::Dcf77 => MinuteFrame::Dcf77(Dcf77Frame::new(time)?),
			Protocol::Wwvb => MinuteFrame::Wwvb(WwvbFrame::new(time)?),
			Protocol::Jjy => MinuteFrame::Jjy(JjyFrame::new(time)?),
			Protocol::Bpc => MinuteFrame::Bpc(BpcFrame::new(time)?)
		})
	}
}

impl fmt::Display for Protocol {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.profile().name)
	}
}

impl FromStr for Protocol {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"dcf77" => Ok(Protocol::Dcf77),
			"wwvb" => Ok(Protocol::Wwvb),
			"jjy" | "jjy40" | "jjy60" => Ok(Protocol::Jjy),
			"bpc" => Ok(Protocol::Bpc),
			_ => Err(Error::UnknownProtocol(s.to_string()))
		}
	}
}

/// One encoded minute of any supported protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinuteFrame {
	Dcf77(Dcf77Frame),
	Wwvb(WwvbFrame),
	Jjy(JjyFrame),
	Bpc(BpcFrame)
}

impl MinuteFrame {
	/// The protocol this frame belongs to.
	pub fn protocol(&self) -> Protocol {
		match self {
			MinuteFrame::Dcf77(_) => Protocol::Dcf77,
			MinuteFrame::Wwvb(_) => Protocol::Wwvb,
			MinuteFrame::Jjy(_) => Protocol::Jjy,
			MinuteFrame::Bpc(_) => Protocol::Bpc
		}
	}

	/// Second of the timestamp the frame was built from.
	pub fn second(&self) -> u32 {
		match self {
			MinuteFrame::Dcf77(f) => f.second(),
			MinuteFrame::Wwvb(f) => f.second(),
			MinuteFrame::Jjy(f) => f.second(),
			MinuteFrame::Bpc(f) => f.second()
		}
	}

	/// The bit (0 or 1) or, for BPC, the 2-bit symbol transmitted during second `index`.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidSymbolIndex`] if `index > 59`.
	pub fn symbol(&self, index: u32) -> Result<u8, Error> {
		match self {
			MinuteFrame::Dcf77(f) => f.bit(index).map(u8::from),
			MinuteFrame::Wwvb(f) => f.bit(index).map(u8::from),
			MinuteFrame::Jjy(f) => f.bit(index).map(u8::from),
			MinuteFrame::Bpc(f) => f.symbol(index)
		}
	}

	/// Recover the encoded minute.
	///
	/// Two-digit years are placed in the century of `reference_year`.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidBcdDigit`] or [`Error::InvalidDate`] if the frame does not hold a
	/// valid date and time.
	pub fn decode(&self, reference_year: i32) -> Result<DateTime<Utc>, Error> {
		match self {
			MinuteFrame::Dcf77(f) => f.decode(reference_year),
			MinuteFrame::Wwvb(f) => f.decode(reference_year),
			MinuteFrame::Jjy(f) => f.decode(reference_year),
			MinuteFrame::Bpc(f) => f.decode(reference_year)
		}
	}
}

/// Second-of-minute of `time`, counting a leap second as 60.
pub(crate) fn second_of<Z: TimeZone>(time: &DateTime<Z>) -> Result<u32, Error> {
	let second = time.second() + time.nanosecond() / 1_000_000_000;
	if second > 59 {
		Err(Error::InvalidSecond(second))
	} else {
		Ok(second)
	}
}

/// Start of the minute containing `time`, in `zone`.
///
/// Truncation happens in UTC so that it never hits a repeated or skipped local time.
pub(crate) fn minute_start<Z: TimeZone, T: TimeZone>(time: &DateTime<Z>, zone: &T)
	-> Result<DateTime<T>, Error>
{
	let utc = time.with_timezone(&Utc);
	let start = utc.with_second(0).and_then(|t| t.with_nanosecond(0)).ok_or(Error::InvalidDate)?;
	Ok(start.with_timezone(zone))
}

/// Check that a bit index lies within a 60-second frame.
#[inline(always)]
pub(crate) fn check_index(index: u32) -> Result<(), Error> {
	if index > 59 { Err(Error::InvalidSymbolIndex(index)) } else { Ok(()) }
}

/// Place a two-digit year in the century of `reference_year`.
pub(crate) fn expand_year(two_digit: u32, reference_year: i32) -> i32 {
	reference_year - reference_year.rem_euclid(100) + two_digit as i32
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn protocol_parse_test() {
		assert_eq!("dcf77".parse(), Ok(Protocol::Dcf77));
		assert_eq!("WWVB".parse(), Ok(Protocol::Wwvb));
		assert_eq!("Jjy".parse(), Ok(Protocol::Jjy));
		assert_eq!("jjy40".parse(), Ok(Protocol::Jjy));
		assert_eq!("JJY60".parse(), Ok(Protocol::Jjy));
		assert_eq!("bpc".parse(), Ok(Protocol::Bpc));
		assert_eq!("msf".parse::<Protocol>(), Err(Error::UnknownProtocol("msf".to_string())));

		for p in Protocol::ALL {
			assert_eq!(p.to_string().parse(), Ok(p));
		}
	}

	#[test]
	fn profile_test() {
		assert_eq!(Protocol::Dcf77.profile().default_carrier(), 15500.);
		assert_eq!(Protocol::Wwvb.profile().default_carrier(), 12000.);
		assert_eq!(Protocol::Jjy.profile().default_carrier(), 13333.);
		assert_eq!(Protocol::Bpc.profile().default_carrier(), 13700.);

		for p in Protocol::ALL {
			let profile = p.profile();
			assert!(profile.depth > 0. && profile.depth <= 1.);
			assert!(profile.carriers.windows(2).all(|w| w[0] < w[1]));
		}
	}

	#[test]
	fn frame_dispatch_test() {
		// 2024-05-26 16:58:30 UTC
		let time = Utc.with_ymd_and_hms(2024, 5, 26, 16, 58, 30).unwrap();
		for p in Protocol::ALL {
			let frame = p.build_frame(&time).unwrap();
			assert_eq!(frame.protocol(), p);
			assert_eq!(frame.second(), 30);
			assert_eq!(frame.symbol(60), Err(Error::InvalidSymbolIndex(60)));
			assert_eq!(frame.decode(2024), Ok(Utc.with_ymd_and_hms(2024, 5, 26, 16, 58, 0).unwrap()));
		}
	}

	#[test]
	fn leap_second_test() {
		let time = Utc.with_ymd_and_hms(2016, 12, 31, 23, 59, 59).unwrap()
			+ chrono::TimeDelta::milliseconds(500);
		assert_eq!(second_of(&time), Ok(59));

		let leap = chrono::NaiveDate::from_ymd_opt(2016, 12, 31).unwrap()
			.and_hms_milli_opt(23, 59, 59, 1500).unwrap()
			.and_utc();
		for p in Protocol::ALL {
			assert_eq!(p.build_frame(&leap), Err(Error::InvalidSecond(60)));
		}
	}

	#[test]
	fn expand_year_test() {
		assert_eq!(expand_year(24, 2024), 2024);
		assert_eq!(expand_year(99, 2024), 2099);
		assert_eq!(expand_year(0, 1999), 1900);
	}
}
