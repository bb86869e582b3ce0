//! Support for encoding the amplitude modulated WWVB time signal.
//!
//! See [WWVB documentation](https://www.nist.gov/pml/time-and-frequency-division/time-distribution/radio-station-wwvb/wwvb-time-code-format)
//! for details.
//!
//! WWVB transmits UTC. Every field is sent most significant bit first, and the minute, hour,
//! day-of-year and year fields reserve 5 bits per decimal digit (see
//! [`padded_bcd5`](crate::bits::padded_bcd5)):
//!
//! | Bits  | Field                                              |
//! | ----- | -------------------------------------------------- |
//! | 1-8   | Minute                                             |
//! | 12-18 | Hour                                               |
//! | 22-33 | Day of year                                        |
//! | 36-38 | DUT1 sign, `101` for positive, `010` for negative  |
//! | 40-43 | DUT1 magnitude in tenths of a second               |
//! | 45-53 | Year within century                                |
//! | 55    | Leap year                                          |
//! | 56    | Leap second at the end of the month                |
//! | 57-58 | DST status                                         |
//!
//! Seconds 0, 9, 19, ..., 59 are markers and carry no data.
//!
//! # Examples
//!
//! ```
//! # use chrono::{TimeZone, Utc};
//! # use signals::wwvb::WwvbFrame;
//! // Wednesday, July 4, 2012. 17:30 UTC, UT1 - UTC = +0.4 s.
//! let time = Utc.with_ymd_and_hms(2012, 7, 4, 17, 30, 0).unwrap();
//! let frame = WwvbFrame::with_dut1(&time, 0.4).unwrap();
//! assert_eq!(frame.bits(), 0x69102518287200C);
//! assert_eq!(frame.dst_status(), 0b11);
//! ```

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};
use crate::bits::{
	bcd, extract_bits, from_bcd, padded_bcd5, reverse_bits, set_bits, unpack_padded_bcd5, BitOrder
};
use crate::render::Envelope;
use crate::{check_index, expand_year, minute_start, second_of, Error, Profile};

/// WWVB constants.
pub const PROFILE: Profile = Profile {
	name: "WWVB",
	station: "Fort Collins, Colorado",
	broadcast_khz: &[60.],
	carriers: [8571., 12000., 15000.],
	depth: 0.90
};

/// DUT1 sign field for a positive or zero correction.
const DUT1_POSITIVE: u64 = 0b101;
/// DUT1 sign field for a negative correction.
const DUT1_NEGATIVE: u64 = 0b010;

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

/// DST status code for `date`, following the US rule (second Sunday of March, first Sunday of
/// November).
///
/// - `0b00`: DST not in effect
/// - `0b10`: DST begins today
/// - `0b11`: DST in effect
/// - `0b01`: DST ends today
pub fn dst_status(date: NaiveDate) -> u8 {
	let day = date.day();
	let dow = date.weekday().num_days_from_sunday();
	// Sundays in the month up to and including `date`
	let sundays = (day + 6 - dow) / 7;
	let sunday = dow == 0;

	match date.month() {
		3 if sunday && sundays == 2 => 0b10,
		3 if sundays >= 2 => 0b11,
		4..=10 => 0b11,
		11 if sunday && sundays == 1 => 0b01,
		11 if sundays < 1 => 0b11,
		_ => 0b00
	}
}

/// An encoded WWVB minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WwvbFrame {
	/// Bit `n` is transmitted during second `n`.
	bits: u64,
	second: u32
}

impl WwvbFrame {
	/// Encode the minute containing `time` with a DUT1 correction of zero.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidSecond`] for a leap second.
	pub fn new<Z: TimeZone>(time: &DateTime<Z>) -> Result<WwvbFrame, Error> {
		WwvbFrame::with_dut1(time, 0.)
	}

	/// Encode the minute containing `time` with DUT1 (UT1 - UTC) of `dut1` seconds.
	///
	/// The magnitude is rounded to the nearest tenth of a second and clamped to 0.9 s.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidSecond`] for a leap second.
	pub fn with_dut1<Z: TimeZone>(time: &DateTime<Z>, dut1: f64) -> Result<WwvbFrame, Error> {
		let second = second_of(time)?;
		let t = minute_start(time, &Utc)?;
		let date = t.date_naive();

		let sign = if dut1 >= 0. || dut1.is_nan() { DUT1_POSITIVE } else { DUT1_NEGATIVE };
		let magnitude = (dut1.abs() * 10.).round().clamp(0., 9.) as u32;

		let mut d = 0;
		d = put(d, padded_bcd5(t.minute())? as u64, 1, 8)?;
		d = put(d, padded_bcd5(t.hour())? as u64, 12, 7)?;
		d = put(d, padded_bcd5(t.ordinal())? as u64, 22, 12)?;
		d = put(d, sign, 36, 3)?;
		d = put(d, bcd(magnitude)? as u64, 40, 4)?;
		d = put(d, padded_bcd5(t.year().rem_euclid(100) as u32)? as u64, 45, 9)?;
		d = put(d, date.leap_year() as u64, 55, 1)?;
		d = put(d, matches!(t.month(), 6 | 12) as u64, 56, 1)?;
		d = put(d, dst_status(date) as u64, 57, 2)?;

		Ok(WwvbFrame { bits: d, second })
	}

	/// The packed frame; bit `n` is transmitted during second `n`.
	pub fn bits(&self) -> u64 {
		self.bits
	}

	/// Second of the timestamp the frame was built from.
	pub fn second(&self) -> u32 {
		self.second
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

	/// The DST status code, see [`dst_status`].
	pub fn dst_status(&self) -> u8 {
		((self.bits >> 57) & 1) as u8 * 2 + ((self.bits >> 58) & 1) as u8
	}

	/// DUT1 as encoded, in seconds.
	pub fn dut1(&self) -> f64 {
		let magnitude = reverse_bits((self.bits >> 40) & 0xf, 4);
		let tenths = magnitude as f64 / 10.;
		if (self.bits >> 36) & 0b111 == DUT1_NEGATIVE { -tenths } else { tenths }
	}

	/// Recover the encoded minute.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidBcdDigit`] or [`Error::InvalidDate`] if the fields do not form a
	/// valid date and time.
	pub fn decode(&self, reference_year: i32) -> Result<DateTime<Utc>, Error> {
		let d = self.bits;
		let year = expand_year(unpack_padded_bcd5(get(d, 45, 9)?)?, reference_year);
		let date = NaiveDate::from_yo_opt(year, unpack_padded_bcd5(get(d, 22, 12)?)?)
			.ok_or(Error::InvalidDate)?;
		let naive = date.and_hms_opt(
			unpack_padded_bcd5(get(d, 12, 7)?)?,
			unpack_padded_bcd5(get(d, 1, 8)?)?,
			0
		).ok_or(Error::InvalidDate)?;
		// Reject a magnitude that is not a BCD digit
		from_bcd(get(d, 40, 4)?)?;
		Ok(naive.and_utc())
	}
}

/// Timing of second `second` of `frame`.
///
/// Carrier is reduced for 800 ms at markers, 500 ms to send a 1 and 200 ms to send a 0.
pub(crate) fn envelope(frame: &WwvbFrame, second: u32, sample_rate: usize) -> Result<Envelope, Error> {
	if second == 0 || second % 10 == 9 {
		check_index(second)?;
		return Ok(Envelope::LowFirst(sample_rate * 4 / 5));
	}
	Ok(if frame.bit(second)? {
		Envelope::LowFirst(sample_rate / 2)
	} else {
		Envelope::LowFirst(sample_rate / 5)
	})
}
