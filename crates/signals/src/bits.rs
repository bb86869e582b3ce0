//! Bit-field packing primitives shared by every frame builder.
//!
//! All time codes handled by this crate are built the same way: a handful of decimal fields are
//! converted to BCD (optionally padded to 5 bits per digit), written into a 60-bit word at a fixed
//! offset, and protected by even parity bits. Fields are transmitted either LSB first or MSB first
//! depending on the protocol, so every insert/extract takes a [`BitOrder`].
//!
//! Bit `n` of a packed frame is the bit transmitted during second `n` of the minute.
//!
//! # Examples
//! ```
//! # use signals::bits::{bcd, set_bits, extract_bits, even_parity, BitOrder};
//! // Minute 58, written LSB first at offset 21 like DCF77
//! let data = set_bits(0, bcd(58).unwrap() as u64, 21, 7, BitOrder::LsbFirst).unwrap();
//! assert_eq!(extract_bits(data, 21, 7, BitOrder::LsbFirst).unwrap(), 0x58);
//!
//! // 0x58 has three bits set, so the parity bit must be set to make the count even
//! assert!(even_parity(data, 21, 28).unwrap());
//! ```

use crate::Error;

/// Transmission order of a multi-bit field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitOrder {
	/// The least significant bit of the value is transmitted first (lowest bit index).
	LsbFirst,
	/// The most significant bit of the value is transmitted first (lowest bit index).
	MsbFirst
}

/// Check that `offset..offset + width` lies within a 64-bit word.
#[inline(always)]
fn check_range(offset: u32, width: u32) -> Result<(), Error> {
	if width == 0 || width > 64 || offset > 64 - width {
		Err(Error::BitRange { offset, width })
	} else {
		Ok(())
	}
}

/// Mask covering the low `width` bits.
#[inline(always)]
fn low_mask(width: u32) -> u64 {
	if width >= 64 { u64::MAX } else { (1 << width) - 1 }
}

/// Encode `value` as BCD, least significant digit in the lowest nibble.
///
/// # Errors
///
/// Returns [`Error::BcdOutOfRange`] if `value > 255`.
///
/// # Examples
/// ```
/// # use signals::bits::bcd;
/// assert_eq!(bcd(0).unwrap(), 0x0);
/// assert_eq!(bcd(59).unwrap(), 0x59);
/// assert_eq!(bcd(255).unwrap(), 0x255);
/// assert!(bcd(256).is_err());
/// ```
pub fn bcd(value: u32) -> Result<u16, Error> {
	if value > 255 {
		return Err(Error::BcdOutOfRange(value));
	}

	let mut v = value as u16;
	let mut r = 0;
	let mut shift = 0;
	while v > 0 {
		r |= (v % 10) << shift;
		v /= 10;
		shift += 4;
	}
	Ok(r)
}

/// Decode a BCD value produced by [`bcd`].
///
/// # Errors
///
/// Returns [`Error::InvalidBcdDigit`] if any nibble is greater than 9.
pub fn from_bcd(value: u64) -> Result<u32, Error> {
	let mut v = value;
	let mut factor = 1;
	let mut r: u32 = 0;
	while v > 0 {
		let digit = (v & 0xf) as u8;
		if digit > 9 {
			return Err(Error::InvalidBcdDigit(digit));
		}
		r += digit as u32 * factor;
		factor *= 10;
		v >>= 4;
	}
	Ok(r)
}

/// Encode up to three decimal digits with 5 bits reserved per digit.
///
/// The ones digit lands in bits 0-3, tens in bits 5-8 and hundreds in bits 10-13, leaving bits 4
/// and 9 clear. WWVB and JJY reserve these gaps in their minute, hour, day-of-year and year
/// fields.
///
/// # Errors
///
/// Returns [`Error::BcdOutOfRange`] if `value > 999`.
///
/// # Examples
/// ```
/// # use signals::bits::padded_bcd5;
/// assert_eq!(padded_bcd5(186).unwrap(), (1 << 10) | (8 << 5) | 6);
/// ```
pub fn padded_bcd5(value: u32) -> Result<u16, Error> {
	if value > 999 {
		return Err(Error::BcdOutOfRange(value));
	}
	Ok(((((value / 100) % 10) << 10) | (((value / 10) % 10) << 5) | (value % 10)) as u16)
}

/// Inverse of [`padded_bcd5`].
///
/// # Errors
///
/// Returns [`Error::InvalidBcdDigit`] if any of the three digits is greater than 9.
pub fn unpack_padded_bcd5(value: u64) -> Result<u32, Error> {
	let mut r = 0;
	for shift in [10, 5, 0] {
		let digit = ((value >> shift) & 0xf) as u8;
		if digit > 9 {
			return Err(Error::InvalidBcdDigit(digit));
		}
		r = r * 10 + digit as u32;
	}
	Ok(r)
}

/// Reverse the low `count` bits of `value`. Bits above `count` are dropped.
///
/// # Examples
/// ```
/// # use signals::bits::reverse_bits;
/// assert_eq!(reverse_bits(0b0001, 4), 0b1000);
/// assert_eq!(reverse_bits(0b1101_0110, 3), 0b011);
/// ```
pub fn reverse_bits(value: u64, count: u32) -> u64 {
	match count {
		0 => 0,
		c if c >= 64 => value.reverse_bits(),
		c => (value & low_mask(c)).reverse_bits() >> (64 - c)
	}
}

/// Read `width` bits of `data` starting at bit `offset`.
///
/// With [`BitOrder::MsbFirst`], the bit at `offset` is the most significant bit of the result.
///
/// # Errors
///
/// Returns [`Error::BitRange`] if the field does not fit in 64 bits.
pub fn extract_bits(data: u64, offset: u32, width: u32, order: BitOrder) -> Result<u64, Error> {
	check_range(offset, width)?;
	let v = (data >> offset) & low_mask(width);
	Ok(match order {
		BitOrder::LsbFirst => v,
		BitOrder::MsbFirst => reverse_bits(v, width)
	})
}

/// Write `value` into `width` bits of `data` starting at bit `offset`.
///
/// The target span is cleared first; all other bits of `data` are preserved.
///
/// # Errors
///
/// Returns [`Error::ValueTooWide`] if `value` needs more than `width` bits and
/// [`Error::BitRange`] if the field does not fit in 64 bits.
///
/// # Examples
/// ```
/// # use signals::bits::{set_bits, BitOrder};
/// assert_eq!(set_bits(0, 0b110, 1, 3, BitOrder::LsbFirst).unwrap(), 0b1100);
/// assert_eq!(set_bits(0, 0b110, 1, 3, BitOrder::MsbFirst).unwrap(), 0b0110);
/// assert!(set_bits(0, 8, 0, 3, BitOrder::LsbFirst).is_err());
/// ```
pub fn set_bits(data: u64, value: u64, offset: u32, width: u32, order: BitOrder)
	-> Result<u64, Error>
{
	check_range(offset, width)?;
	if value & !low_mask(width) != 0 {
		return Err(Error::ValueTooWide { value, width });
	}

	let v = match order {
		BitOrder::LsbFirst => value,
		BitOrder::MsbFirst => reverse_bits(value, width)
	};
	Ok((data & !(low_mask(width) << offset)) | (v << offset))
}

/// Even parity over bits `from..to` of `data`.
///
/// Returns `true` if an odd number of bits are set, i.e. the parity bit that must be transmitted
/// to make the total count even.
///
/// # Errors
///
/// Returns [`Error::BitRange`] if the range is empty or extends past bit 63.
pub fn even_parity(data: u64, from: u32, to: u32) -> Result<bool, Error> {
	if to <= from {
		return Err(Error::BitRange { offset: from, width: 0 });
	}
	Ok(extract_bits(data, from, to - from, BitOrder::LsbFirst)?.count_ones() & 1 == 1)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bcd_test() {
		assert_eq!(bcd(7), Ok(0x7));
		assert_eq!(bcd(10), Ok(0x10));
		assert_eq!(bcd(99), Ok(0x99));
		assert_eq!(bcd(200), Ok(0x200));
		assert_eq!(bcd(256), Err(Error::BcdOutOfRange(256)));

		for v in 0..=99 {
			assert_eq!(from_bcd(bcd(v).unwrap() as u64), Ok(v));
		}

		assert_eq!(from_bcd(0x1a), Err(Error::InvalidBcdDigit(0xa)));
		assert_eq!(from_bcd(0xf3), Err(Error::InvalidBcdDigit(0xf)));
	}

	#[test]
	fn padded_bcd5_test() {
		assert_eq!(padded_bcd5(0), Ok(0));
		assert_eq!(padded_bcd5(59), Ok((5 << 5) | 9));
		assert_eq!(padded_bcd5(366), Ok((3 << 10) | (6 << 5) | 6));
		assert_eq!(padded_bcd5(1000), Err(Error::BcdOutOfRange(1000)));

		for v in 0..=999 {
			assert_eq!(unpack_padded_bcd5(padded_bcd5(v).unwrap() as u64), Ok(v));
		}

		assert_eq!(unpack_padded_bcd5(0xc << 5), Err(Error::InvalidBcdDigit(0xc)));
	}

	#[test]
	fn reverse_bits_test() {
		assert_eq!(reverse_bits(0b1, 1), 0b1);
		assert_eq!(reverse_bits(0b10110, 5), 0b01101);
		assert_eq!(reverse_bits(0b1011_0000, 4), 0);
		assert_eq!(reverse_bits(1, 64), 1 << 63);
		assert_eq!(reverse_bits(0xff, 0), 0);
	}

	#[test]
	fn set_extract_test() {
		let data = 0xffff_ffff_ffff_ffff;
		let d = set_bits(data, 0, 8, 8, BitOrder::LsbFirst).unwrap();
		assert_eq!(d, 0xffff_ffff_ffff_00ff);

		let d = set_bits(0, 0b1000_0001, 1, 8, BitOrder::MsbFirst).unwrap();
		assert_eq!(d, 0b1_0000_0010);
		let d = set_bits(0, 0b1000_0000, 1, 8, BitOrder::MsbFirst).unwrap();
		assert_eq!(d, 0b10);
		assert_eq!(extract_bits(d, 1, 8, BitOrder::MsbFirst), Ok(0b1000_0000));
		assert_eq!(extract_bits(d, 1, 8, BitOrder::LsbFirst), Ok(0b1));

		assert_eq!(set_bits(0, 1, 63, 1, BitOrder::LsbFirst), Ok(1 << 63));
		assert_eq!(set_bits(0, 1, 63, 2, BitOrder::LsbFirst), Err(Error::BitRange { offset: 63, width: 2 }));
		assert_eq!(set_bits(0, 4, 0, 2, BitOrder::MsbFirst), Err(Error::ValueTooWide { value: 4, width: 2 }));
		assert_eq!(extract_bits(0, 0, 0, BitOrder::LsbFirst), Err(Error::BitRange { offset: 0, width: 0 }));
	}

	#[test]
	fn parity_test() {
		assert_eq!(even_parity(0b1011, 0, 4), Ok(true));
		assert_eq!(even_parity(0b1011, 0, 2), Ok(false));
		assert_eq!(even_parity(0b1011, 1, 4), Ok(false));
		assert!(even_parity(0, 4, 4).is_err());

		// Inserting the parity bit always leaves an even count over the protected span
		for v in 0..128u64 {
			let data = set_bits(0, v, 21, 7, BitOrder::LsbFirst).unwrap();
			let p = even_parity(data, 21, 28).unwrap() as u64;
			let data = set_bits(data, p, 28, 1, BitOrder::LsbFirst).unwrap();
			assert_eq!(even_parity(data, 21, 29), Ok(false));
		}
	}
}
