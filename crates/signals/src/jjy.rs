//! Support for encoding the JJY time signal.
//!
//! See [JJY documentation](https://en.wikipedia.org/wiki/JJY#Timecode) for details.
//!
//! JJY transmits Japan Standard Time, every field most significant bit first. Minutes 15 and 45
//! of every hour carry a call-sign announcement instead of the year and day of week:
//!
//! | Bits  | Time frame                 | Call-sign frame              |
//! | ----- | -------------------------- | ---------------------------- |
//! | 1-8   | Minute                     | Minute                       |
//! | 12-18 | Hour                       | Hour                         |
//! | 22-33 | Day of year                | Day of year                  |
//! | 36    | Even parity over the hour  | Even parity over the hour    |
//! | 37    | Even parity over the minute| Even parity over the minute  |
//! | 40-48 | Year within century (41-48)| Morse "JJY" (seconds 40-48)  |
//! | 50-52 | Day of week, Sunday = 0    | Service interruption (0)     |
//! | 53-54 | Leap second (0)            | Service interruption (0)     |
//!
//! # Examples
//!
//! ```
//! # use chrono::TimeZone;
//! # use chrono_tz::Asia::Tokyo;
//! # use signals::jjy::JjyFrame;
//! // Saturday, July 4, 2020. 11:36 JST.
//! let time = Tokyo.with_ymd_and_hms(2020, 7, 4, 11, 36, 0).unwrap();
//! let frame = JjyFrame::new(&time).unwrap();
//! assert_eq!(frame.bits(), 0xC0801828420CC);
//! assert!(!frame.is_call_sign());
//!
//! let frame = JjyFrame::new(&Tokyo.with_ymd_and_hms(2020, 7, 4, 11, 45, 0).unwrap()).unwrap();
//! assert!(frame.is_call_sign());
//! ```

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Asia::Tokyo;
use crate::bits::{bcd, even_parity, extract_bits, from_bcd, padded_bcd5, set_bits, unpack_padded_bcd5, BitOrder};
use crate::render::Envelope;
use crate::{check_index, expand_year, minute_start, second_of, Error, Profile};

/// JJY constants.
pub const PROFILE: Profile = Profile {
	name: "JJY",
	station: "Mount Otakadoya (40 kHz) and Mount Hagane (60 kHz), Japan",
	broadcast_khz: &[40., 60.],
	carriers: [4100., 13333., 15900.],
	depth: 0.90
};

/// On/off pattern spelling "JJY" in Morse code, spread over seconds 40-48 of a call-sign minute.
pub const MORSE: &[u8] = b"001011011011001011011011001101011011000101101101100101101101100110101101100";

/// First second of the call-sign announcement.
pub const MORSE_START: u32 = 40;
/// Number of seconds of the call-sign announcement.
pub const MORSE_SECONDS: u32 = 9;

/// Insert a field, most significant bit first.
#[inline(always)]
fn put(data: u64, value: u64, offset: u32, width: u32) -> Result<u64, Error> {
	set_bits(data, value, offset, width, BitOrder::MsbFirst)
}

/// Read a field, most significant bit first.
#[inline(always)]
fn get(data: u64, offset: u32, width: u32) -> Result<u64, Error> {
	extract_bits(data, offset, width, BitOrder::MsbFirst)
}

/// An encoded JJY minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JjyFrame {
	/// Bit `n` is transmitted during second `n`.
	bits: u64,
	second: u32,
	call_sign: bool
}

impl JjyFrame {
	/// Encode the minute containing `time`.
	///
	/// `time` is converted to Japan Standard Time. Minutes 15 and 45 produce call-sign frames.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidSecond`] for a leap second.
	pub fn new<Z: TimeZone>(time: &DateTime<Z>) -> Result<JjyFrame, Error> {
		let second = second_of(time)?;
		let t = minute_start(time, &Tokyo)?;
		let call_sign = matches!(t.minute(), 15 | 45);

		let mut d = 0;
		d = put(d, padded_bcd5(t.minute())? as u64, 1, 8)?;
		d = put(d, padded_bcd5(t.hour())? as u64, 12, 7)?;
		d = put(d, padded_bcd5(t.ordinal())? as u64, 22, 12)?;
		d = put(d, even_parity(d, 12, 19)? as u64, 36, 1)?;
		d = put(d, even_parity(d, 1, 9)? as u64, 37, 1)?;

		if call_sign {
			// Call sign, then service interruption flags: no interruption scheduled
			d = put(d, bcd(0)? as u64, 40, 9)?;
			d = put(d, 0, 50, 3)?;
			d = put(d, 0, 53, 1)?;
			d = put(d, 0, 54, 2)?;
		} else {
			d = put(d, bcd(t.year().rem_euclid(100) as u32)? as u64, 41, 8)?;
			d = put(d, padded_bcd5(t.weekday().num_days_from_sunday())? as u64, 50, 3)?;
			// Leap second flags
			d = put(d, 0, 53, 2)?;
		}

		Ok(JjyFrame { bits: d, second, call_sign })
	}

	/// The packed frame; bit `n` is transmitted during second `n`.
	pub fn bits(&self) -> u64 {
		self.bits
	}

	/// Second of the timestamp the frame was built from.
	pub fn second(&self) -> u32 {
		self.second
	}

	/// Whether this is a call-sign announcement frame.
	pub fn is_call_sign(&self) -> bool {
		self.call_sign
	}

	/// The bit transmitted during second `index`.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidSymbolIndex`] if `index > 59`.
	pub fn bit(&self, index: u32) -> Result<bool, Error> {
		check_index(index)?;
		Ok((self.bits >> index) & 1 == 1)
	}

	/// Recover the encoded minute.
	///
	/// Call-sign frames carry no year, so they decode into `reference_year` itself.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidDate`] if a parity bit does not match or the fields do not form a
	/// valid date and time.
	pub fn decode(&self, reference_year: i32) -> Result<DateTime<Utc>, Error> {
		let d = self.bits;
		if even_parity(d, 12, 19)? != self.bit(36)? || even_parity(d, 1, 9)? != self.bit(37)? {
			return Err(Error::InvalidDate);
		}

		let year = if self.call_sign {
			reference_year
		} else {
			expand_year(from_bcd(get(d, 41, 8)?)?, reference_year)
		};
		let date = NaiveDate::from_yo_opt(year, unpack_padded_bcd5(get(d, 22, 12)?)?)
			.ok_or(Error::InvalidDate)?;
		let naive = date.and_hms_opt(
			unpack_padded_bcd5(get(d, 12, 7)?)?,
			unpack_padded_bcd5(get(d, 1, 8)?)?,
			0
		).ok_or(Error::InvalidDate)?;

		Tokyo.from_local_datetime(&naive)
			.single()
			.map(|t| t.with_timezone(&Utc))
			.ok_or(Error::InvalidDate)
	}
}

/// Timing of second `second` of `frame`.
///
/// JJY starts each second at full power and drops to the reduced level after 200 ms for markers,
/// 500 ms for a 1 and 800 ms for a 0. Seconds 40-48 of a call-sign frame are keyed in Morse.
pub(crate) fn envelope(frame: &JjyFrame, second: u32, sample_rate: usize) -> Result<Envelope, Error> {
	check_index(second)?;
	if frame.call_sign && (MORSE_START..MORSE_START + MORSE_SECONDS).contains(&second) {
		return Ok(Envelope::Morse(second - MORSE_START));
	}
	if second == 0 || second % 10 == 9 {
		return Ok(Envelope::HighFirst(sample_rate / 5));
	}
	Ok(if frame.bit(second)? {
		Envelope::HighFirst(sample_rate / 2)
	} else {
		Envelope::HighFirst(sample_rate * 4 / 5)
	})
}

/// Whether the Morse pattern keys the carrier on at `sample` of the `index`th second of the
/// call-sign announcement.
///
/// The nine seconds are mapped linearly onto [`MORSE`].
pub(crate) fn morse_on(index: u32, sample: usize, sample_rate: usize) -> bool {
	let offset = index as usize * sample_rate + sample;
	let span = MORSE_SECONDS as usize * sample_rate;
	let i = (MORSE.len() as f64 / span as f64 * offset as f64).round() as usize;
	MORSE.get(i.min(MORSE.len() - 1)).copied() == Some(b'1')
}
