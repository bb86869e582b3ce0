//! Support for encoding the BPC time signal.
//!
//! See [BPC documentation](https://en.wikipedia.org/wiki/BPC_(time_signal)) for details.
//!
//! BPC transmits China Standard Time as 2-bit symbols, one per second, in three identical
//! 20-second sub-frames that differ only in their sub-frame id. Each sub-frame is 40 bits, with
//! every field in binary, most significant bit first:
//!
//! | Bits  | Field                                    |
//! | ----- | ---------------------------------------- |
//! | 0-1   | Sub-frame id (0, 1, 2)                   |
//! | 2-3   | Unused                                   |
//! | 4-7   | Hour, 12-hour format                     |
//! | 8-13  | Minute                                   |
//! | 14    | Unused                                   |
//! | 15-17 | Day of week, Monday = 1                  |
//! | 18    | PM                                       |
//! | 19    | Even parity over bits 0-17               |
//! | 20    | Unused                                   |
//! | 21-25 | Day of month                             |
//! | 26-29 | Month                                    |
//! | 30-35 | Year within century, low 6 bits          |
//! | 36    | Year within century, bit 6               |
//! | 37    | Even parity over bits 20-35              |
//! | 38-39 | Sync, always 0                           |
//!
//! Bits `2k` and `2k + 1` form the symbol sent during second `k` of the sub-frame. The frame is
//! stored as two 60-bit planes holding the high and low bit of each symbol.
//!
//! # Examples
//!
//! ```
//! # use chrono::TimeZone;
//! # use chrono_tz::Asia::Shanghai;
//! # use signals::bpc::BpcFrame;
//! // Sunday, May 26, 2024. 18:58 CST.
//! let time = Shanghai.with_ymd_and_hms(2024, 5, 26, 18, 58, 0).unwrap();
//! let frame = BpcFrame::new(&time).unwrap();
//! assert_eq!(frame.read_symbols(0, 5).unwrap(), vec![0, 0, 1, 2, 3]);
//! assert!(frame.to_string().starts_with("0000011011101001111101101001010110000100"));
//! ```

use core::fmt;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Asia::Shanghai;
use crate::bits::{even_parity, extract_bits, set_bits, BitOrder};
use crate::render::Envelope;
use crate::{check_index, expand_year, minute_start, second_of, Error, Profile};

/// BPC constants.
pub const PROFILE: Profile = Profile {
	name: "BPC",
	station: "Shangqiu, China",
	broadcast_khz: &[68.5],
	carriers: [11416., 13700., 17125.],
	depth: 0.95
};

/// Number of bits in a sub-frame.
const SUB_FRAME_BITS: u32 = 40;
/// Number of seconds (symbols) in a sub-frame.
const SUB_FRAME_SYMBOLS: u32 = 20;
/// Length of the textual symbol string.
pub const SYMBOL_STRING_LEN: usize = 120;

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

/// Build sub-frame `id` for `t`. Bit `n` of the result is bit `n` of the sub-frame.
fn sub_frame(id: u64, t: &DateTime<chrono_tz::Tz>) -> Result<u64, Error> {
	let year = t.year().rem_euclid(100) as u64;

	let mut d = put(0, id, 0, 2)?;
	d = put(d, (t.hour() % 12) as u64, 4, 4)?;
	d = put(d, t.minute() as u64, 8, 6)?;
	d = put(d, t.weekday().number_from_monday() as u64, 15, 3)?;
	d = put(d, (t.hour() >= 12) as u64, 18, 1)?;
	d = put(d, even_parity(d, 0, 18)? as u64, 19, 1)?;
	d = put(d, t.day() as u64, 21, 5)?;
	d = put(d, t.month() as u64, 26, 4)?;
	d = put(d, year & 0x3f, 30, 6)?;
	d = put(d, (year >> 6) & 1, 36, 1)?;
	d = put(d, even_parity(d, 20, 36)? as u64, 37, 1)?;
	Ok(d)
}

/// An encoded BPC minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BpcFrame {
	/// High bit of the symbol sent during second `n` is bit `n`.
	hi: u64,
	/// Low bit of the symbol sent during second `n` is bit `n`.
	lo: u64,
	second: u32
}

impl BpcFrame {
	/// Encode the minute containing `time`.
	///
	/// `time` is converted to China Standard Time.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidSecond`] for a leap second.
	pub fn new<Z: TimeZone>(time: &DateTime<Z>) -> Result<BpcFrame, Error> {
		let second = second_of(time)?;
		let t = minute_start(time, &Shanghai)?;

		let mut frame = BpcFrame { hi: 0, lo: 0, second };
		for id in 0..3 {
			frame.set_sub_frame(id as u32, sub_frame(id, &t)?);
		}
		Ok(frame)
	}

	/// Parse the 120 character `0`/`1` form produced by [`Display`](fmt::Display).
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidSymbolString`] if `s` is not 120 characters of `0` and `1`, and
	/// [`Error::InvalidSecond`] if `second > 59`.
	pub fn from_symbol_str(s: &str, second: u32) -> Result<BpcFrame, Error> {
		if second > 59 {
			return Err(Error::InvalidSecond(second));
		}
		if s.len() != SYMBOL_STRING_LEN {
			return Err(Error::InvalidSymbolString(
				format!("expected {} characters, found {}", SYMBOL_STRING_LEN, s.len())
			));
		}

		let mut frame = BpcFrame { hi: 0, lo: 0, second };
		for (id, chunk) in s.as_bytes().chunks(SUB_FRAME_BITS as usize).enumerate() {
			let mut sub = 0;
			for (i, c) in chunk.iter().enumerate() {
				match c {
					b'0' => {},
					b'1' => sub |= 1 << i,
					_ => return Err(Error::InvalidSymbolString(
						format!("unexpected character {:?} at {}", *c as char, id * SUB_FRAME_BITS as usize + i)
					))
				}
			}
			frame.set_sub_frame(id as u32, sub);
		}
		Ok(frame)
	}

	/// Spread the bits of a sub-frame over the two symbol planes.
	fn set_sub_frame(&mut self, id: u32, sub: u64) {
		for k in 0..SUB_FRAME_SYMBOLS {
			let pos = id * SUB_FRAME_SYMBOLS + k;
			self.hi |= ((sub >> (2 * k)) & 1) << pos;
			self.lo |= ((sub >> (2 * k + 1)) & 1) << pos;
		}
	}

	/// Reassemble sub-frame `id` from the two symbol planes.
	fn sub_frame(&self, id: u32) -> u64 {
		let mut sub = 0;
		for k in 0..SUB_FRAME_SYMBOLS {
			let pos = id * SUB_FRAME_SYMBOLS + k;
			sub |= ((self.hi >> pos) & 1) << (2 * k);
			sub |= ((self.lo >> pos) & 1) << (2 * k + 1);
		}
		sub
	}

	/// The high and low symbol planes.
	pub fn planes(&self) -> (u64, u64) {
		(self.hi, self.lo)
	}

	/// Second of the timestamp the frame was built from.
	pub fn second(&self) -> u32 {
		self.second
	}

	/// The symbol (0-3) transmitted during second `index`.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidSymbolIndex`] if `index > 59`.
	pub fn symbol(&self, index: u32) -> Result<u8, Error> {
		check_index(index)?;
		Ok((((self.hi >> index) & 1) << 1 | ((self.lo >> index) & 1)) as u8)
	}

	/// The symbols transmitted during seconds `from..to`.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidSymbolIndex`] if the range is reversed or extends past second 59.
	pub fn read_symbols(&self, from: u32, to: u32) -> Result<Vec<u8>, Error> {
		if to > 60 {
			return Err(Error::InvalidSymbolIndex(to));
		}
		if from > to {
			return Err(Error::InvalidSymbolIndex(from));
		}
		(from..to).map(|i| self.symbol(i)).collect()
	}

	/// Recover the encoded minute from the first sub-frame.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidDate`] if a parity bit does not match or the fields do not form a
	/// valid date and time.
	pub fn decode(&self, reference_year: i32) -> Result<DateTime<Utc>, Error> {
		let d = self.sub_frame(0);
		if even_parity(d, 0, 18)? != (get(d, 19, 1)? == 1) || even_parity(d, 20, 36)? != (get(d, 37, 1)? == 1) {
			return Err(Error::InvalidDate);
		}

		let hour = get(d, 4, 4)? + 12 * get(d, 18, 1)?;
		let year = expand_year((get(d, 30, 6)? | get(d, 36, 1)? << 6) as u32, reference_year);
		let date = NaiveDate::from_ymd_opt(year, get(d, 26, 4)? as u32, get(d, 21, 5)? as u32)
			.ok_or(Error::InvalidDate)?;
		let naive = date.and_hms_opt(hour as u32, get(d, 8, 6)? as u32, 0).ok_or(Error::InvalidDate)?;

		Shanghai.from_local_datetime(&naive)
			.single()
			.map(|t| t.with_timezone(&Utc))
			.ok_or(Error::InvalidDate)
	}
}

impl fmt::Display for BpcFrame {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for id in 0..3 {
			let sub = self.sub_frame(id);
			for i in 0..SUB_FRAME_BITS {
				f.write_str(if (sub >> i) & 1 == 1 { "1" } else { "0" })?;
			}
		}
		Ok(())
	}
}

/// Timing of second `second` of `frame`.
///
/// Symbols 0-3 reduce the carrier for 100-400 ms. Seconds 19, 39 and 59 are reduced for the
/// whole second and separate the sub-frames.
pub(crate) fn envelope(frame: &BpcFrame, second: u32, sample_rate: usize) -> Result<Envelope, Error> {
	if second % SUB_FRAME_SYMBOLS == SUB_FRAME_SYMBOLS - 1 {
		check_index(second)?;
		return Ok(Envelope::LowFirst(sample_rate));
	}
	let symbol = frame.symbol(second)? as usize;
	Ok(Envelope::LowFirst(sample_rate * (symbol + 1) / 10))
}
