//! Support for encoding the DCF77 time signal.
//!
//! See [DCF77 documentation](https://en.wikipedia.org/wiki/DCF77#Time_code_details) for details.
//!
//! DCF77 transmits the minute that starts at the **next** minute marker, in German civil time
//! (CET or CEST). All fields are BCD, least significant bit first:
//!
//! | Bits  | Field                                       |
//! | ----- | ------------------------------------------- |
//! | 0     | Start of minute, always 0                   |
//! | 1-14  | Civil warnings, unused (0)                  |
//! | 15    | Call bit, unused (0)                        |
//! | 16    | CET/CEST change within the next hour        |
//! | 17-18 | CEST / CET in effect                        |
//! | 19    | Leap second within the next hour (always 0) |
//! | 20    | Start of time, always 1                     |
//! | 21-28 | Minute, even parity                         |
//! | 29-35 | Hour, even parity                           |
//! | 36-41 | Day of month                                |
//! | 42-44 | Day of week, Monday = 1                     |
//! | 45-49 | Month                                       |
//! | 50-57 | Year within century                         |
//! | 58    | Even parity over bits 36-57                 |
//! | 59    | No modulation (minute marker)               |
//!
//! # Examples
//!
//! ```
//! # use chrono::{TimeZone, Utc};
//! # use signals::dcf77::Dcf77Frame;
//! // Sunday, May 26, 2024. 18:58 CEST / 16:58 UTC.
//! let time = Utc.with_ymd_and_hms(2024, 5, 26, 16, 58, 0).unwrap();
//! let frame = Dcf77Frame::new(&time).unwrap();
//! assert_eq!(frame.bits(), 0x090BE631B120000);
//! assert!(frame.is_cest());
//! ```

use chrono::{DateTime, Datelike, LocalResult, NaiveDate, TimeDelta, TimeZone, Timelike, Utc};
use chrono_tz::{Europe::Berlin, OffsetComponents, Tz};
use crate::bits::{bcd, even_parity, extract_bits, from_bcd, set_bits, BitOrder};
use crate::render::Envelope;
use crate::{check_index, expand_year, minute_start, second_of, Error, Profile};

/// DCF77 constants.
pub const PROFILE: Profile = Profile {
	name: "DCF77",
	station: "Mainflingen, Germany",
	broadcast_khz: &[77.5],
	carriers: [12916., 15500., 19375.],
	depth: 0.85
};

/// Whether daylight saving time (CEST) is in effect at `time`.
fn is_dst(time: &DateTime<Tz>) -> bool {
	time.offset().dst_offset() != TimeDelta::zero()
}

/// Insert a BCD field, least significant bit first.
#[inline(always)]
fn put(data: u64, value: u32, offset: u32, width: u32) -> Result<u64, Error> {
	set_bits(data, bcd(value)? as u64, offset, width, BitOrder::LsbFirst)
}

/// Insert the even parity bit of `from..to` at `to`.
#[inline(always)]
fn put_parity(data: u64, from: u32, to: u32) -> Result<u64, Error> {
	set_bits(data, even_parity(data, from, to)? as u64, to, 1, BitOrder::LsbFirst)
}

/// Read a BCD field, least significant bit first.
#[inline(always)]
fn get(data: u64, offset: u32, width: u32) -> Result<u32, Error> {
	from_bcd(extract_bits(data, offset, width, BitOrder::LsbFirst)?)
}

/// An encoded DCF77 minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dcf77Frame {
	/// Bit `n` is transmitted during second `n`.
	bits: u64,
	second: u32
}

impl Dcf77Frame {
	/// Encode the minute containing `time`.
	///
	/// `time` is converted to German civil time. The DST announcement bit is set when the CET/CEST
	/// state one minute before the encoded minute differs from the state 59 minutes after it.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidSecond`] for a leap second.
	pub fn new<Z: TimeZone>(time: &DateTime<Z>) -> Result<Dcf77Frame, Error> {
		let second = second_of(time)?;
		let minute = minute_start(time, &Berlin)?;

		let dst = is_dst(&minute);
		let announce = is_dst(&(minute - TimeDelta::minutes(1)))
			!= is_dst(&(minute + TimeDelta::minutes(59)));

		let mut d = 0;
		d = set_bits(d, announce as u64, 16, 1, BitOrder::LsbFirst)?;
		d = set_bits(d, dst as u64, 17, 1, BitOrder::LsbFirst)?;
		d = set_bits(d, !dst as u64, 18, 1, BitOrder::LsbFirst)?;
		d = set_bits(d, 1, 20, 1, BitOrder::LsbFirst)?;
		d = put(d, minute.minute(), 21, 7)?;
		d = put_parity(d, 21, 28)?;
		d = put(d, minute.hour(), 29, 6)?;
		d = put_parity(d, 29, 35)?;
		d = put(d, minute.day(), 36, 6)?;
		d = put(d, minute.weekday().number_from_monday(), 42, 3)?;
		d = put(d, minute.month(), 45, 5)?;
		d = put(d, minute.year().rem_euclid(100) as u32, 50, 8)?;
		d = put_parity(d, 36, 58)?;

		Ok(Dcf77Frame { bits: d, second })
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

	/// Whether the frame announces CEST.
	pub fn is_cest(&self) -> bool {
		(self.bits >> 17) & 1 == 1
	}

	/// Whether the frame announces a CET/CEST change within the next hour.
	pub fn announces_change(&self) -> bool {
		(self.bits >> 16) & 1 == 1
	}

	/// Recover the encoded minute.
	///
	/// The CEST flag picks the right instant during the repeated hour at the end of summer time.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidDate`] if a parity bit does not match or the fields do not form a
	/// valid German civil time.
	pub fn decode(&self, reference_year: i32) -> Result<DateTime<Utc>, Error> {
		let d = self.bits;
		for (from, to) in [(21, 28), (29, 35), (36, 58)] {
			if even_parity(d, from, to + 1)? {
				return Err(Error::InvalidDate);
			}
		}

		let year = expand_year(get(d, 50, 8)?, reference_year);
		let date = NaiveDate::from_ymd_opt(year, get(d, 45, 5)?, get(d, 36, 6)?)
			.ok_or(Error::InvalidDate)?;
		let naive = date.and_hms_opt(get(d, 29, 6)?, get(d, 21, 7)?, 0).ok_or(Error::InvalidDate)?;

		let local = match Berlin.from_local_datetime(&naive) {
			LocalResult::Single(t) => t,
			LocalResult::Ambiguous(a, b) => if is_dst(&a) == self.is_cest() { a } else { b },
			LocalResult::None => return Err(Error::InvalidDate)
		};
		Ok(local.with_timezone(&Utc))
	}
}

/// Timing of second `second` of `frame`.
///
/// Carrier is reduced for 200 ms to send a 1 and for 100 ms to send a 0. Second 59 is not
/// reduced at all, which marks the start of the next minute.
pub(crate) fn envelope(frame: &Dcf77Frame, second: u32, sample_rate: usize) -> Result<Envelope, Error> {
	if second == 59 {
		return Ok(Envelope::LowFirst(0));
	}
	Ok(if frame.bit(second)? {
		Envelope::LowFirst(sample_rate / 5)
	} else {
		Envelope::LowFirst(sample_rate / 10)
	})
}
