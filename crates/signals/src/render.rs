//! Render frames into PCM.
//!
//! A [`Renderer`] turns one second of a [`MinuteFrame`] into mono, 16-bit signed, little-endian
//! PCM: exactly `sample_rate * 2` bytes, whatever the protocol, second or symbol.
//!
//! # Examples
//! ```
//! # use chrono::{TimeZone, Utc};
//! # use signals::{Envelope, Protocol, Renderer, Shape};
//! let time = Utc.with_ymd_and_hms(2012, 7, 4, 17, 30, 0).unwrap();
//! let frame = Protocol::Wwvb.build_frame(&time).unwrap();
//!
//! let renderer = Renderer::new(Protocol::Wwvb, 48000).unwrap()
//! 	.with_shape(Shape::Sine)
//! 	.with_carrier(15000.).unwrap();
//!
//! // Second 0 is a marker: 800 ms of reduced carrier
//! assert_eq!(renderer.envelope(&frame, 0).unwrap(), Envelope::LowFirst(38400));
//! assert_eq!(renderer.render_second(&frame, 0).unwrap().len(), 96000);
//! ```

use crate::{bpc, dcf77, jjy, wwvb};
use crate::{Error, MinuteFrame, Protocol, Shape};

/// Amplitude envelope of one second of signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
	/// Reduced carrier for the first `n` samples, then full carrier.
	LowFirst(usize),
	/// Full carrier for the first `n` samples, then reduced carrier.
	HighFirst(usize),
	/// Second `n` (0-8) of the JJY Morse call sign: carrier keyed fully on or off.
	Morse(u32)
}

impl Envelope {
	/// Amplitude fraction in [0, 1] of `sample` within the second.
	///
	/// # Examples
	/// ```
	/// # use signals::Envelope;
	/// let e = Envelope::LowFirst(4800);
	/// assert_eq!(e.amplitude(0, 48000, 0.75), 0.25);
	/// assert_eq!(e.amplitude(4800, 48000, 0.75), 1.);
	///
	/// let e = Envelope::HighFirst(4800);
	/// assert_eq!(e.amplitude(0, 48000, 0.75), 1.);
	/// assert_eq!(e.amplitude(4800, 48000, 0.75), 0.25);
	/// ```
	pub fn amplitude(&self, sample: usize, sample_rate: usize, depth: f64) -> f64 {
		match *self {
			Envelope::LowFirst(n) => if sample < n { 1. - depth } else { 1. },
			Envelope::HighFirst(n) => if sample < n { 1. } else { 1. - depth },
			Envelope::Morse(index) => if jjy::morse_on(index, sample, sample_rate) { 1. } else { 0. }
		}
	}
}

/// Synthesizes PCM for a single protocol.
///
/// The carrier and depth default to the protocol's [`Profile`](crate::Profile); the shape
/// defaults to [`Shape::Square`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Renderer {
	protocol: Protocol,
	sample_rate: u32,
	carrier: f64,
	depth: f64,
	shape: Shape
}

impl Renderer {
	/// Create a renderer for `protocol` at `sample_rate` Hz.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidCarrier`] if the default carrier is not below the Nyquist frequency
	/// of `sample_rate`.
	pub fn new(protocol: Protocol, sample_rate: u32) -> Result<Renderer, Error> {
		let profile = protocol.profile();
		Renderer {
			protocol,
			sample_rate,
			carrier: 0.,
			depth: profile.depth,
			shape: Shape::default()
		}.with_carrier(profile.default_carrier())
	}

	/// Use a carrier of `hz` instead of the default.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidCarrier`] unless `0 < hz < sample_rate / 2`.
	pub fn with_carrier(mut self, hz: f64) -> Result<Renderer, Error> {
		if !(hz > 0. && hz < self.sample_rate as f64 / 2.) {
			return Err(Error::InvalidCarrier(hz));
		}
		self.carrier = hz;
		Ok(self)
	}

	/// Use a modulation depth of `depth` instead of the default.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidDepth`] unless `depth` is in [0, 1].
	pub fn with_depth(mut self, depth: f64) -> Result<Renderer, Error> {
		if !(0. ..=1.).contains(&depth) {
			return Err(Error::InvalidDepth(depth));
		}
		self.depth = depth;
		Ok(self)
	}

	/// Use a carrier of shape `shape`.
	pub fn with_shape(mut self, shape: Shape) -> Renderer {
		self.shape = shape;
		self
	}

	/// Protocol this renderer accepts frames for.
	pub fn protocol(&self) -> Protocol {
		self.protocol
	}

	/// Output sample rate in Hz.
	pub fn sample_rate(&self) -> u32 {
		self.sample_rate
	}

	/// Carrier frequency in Hz.
	pub fn carrier(&self) -> f64 {
		self.carrier
	}

	/// Fraction of the carrier removed during reduced-amplitude spans.
	pub fn depth(&self) -> f64 {
		self.depth
	}

	/// Waveform of the carrier.
	pub fn shape(&self) -> Shape {
		self.shape
	}

	/// Number of bytes in one rendered second.
	pub fn bytes_per_second(&self) -> usize {
		self.sample_rate as usize * 2
	}

	/// Timing of second `second` of `frame`.
	///
	/// # Errors
	///
	/// Returns [`Error::ProtocolMismatch`] if `frame` belongs to another protocol and
	/// [`Error::InvalidSecond`] if `second > 59`.
	pub fn envelope(&self, frame: &MinuteFrame, second: u32) -> Result<Envelope, Error> {
		if frame.protocol() != self.protocol {
			return Err(Error::ProtocolMismatch { frame: frame.protocol(), renderer: self.protocol });
		}
		if second > 59 {
			return Err(Error::InvalidSecond(second));
		}

		let rate = self.sample_rate as usize;
		match frame {
			MinuteFrame::Dcf77(f) => dcf77::envelope(f, second, rate),
			MinuteFrame::Wwvb(f) => wwvb::envelope(f, second, rate),
			MinuteFrame::Jjy(f) => jjy::envelope(f, second, rate),
			MinuteFrame::Bpc(f) => bpc::envelope(f, second, rate)
		}
	}

	/// Render second `second` of `frame`.
	///
	/// # Errors
	///
	/// See [`Renderer::envelope`].
	pub fn render_second(&self, frame: &MinuteFrame, second: u32) -> Result<Vec<u8>, Error> {
		let mut out = Vec::with_capacity(self.bytes_per_second());
		self.render_second_into(frame, second, &mut out)?;
		Ok(out)
	}

	/// Render second `second` of `frame` into `out`, replacing its contents.
	///
	/// Sample `k` of the second is sample `second * sample_rate + k` of the minute, which keeps
	/// the carrier phase continuous across seconds.
	///
	/// # Errors
	///
	/// See [`Renderer::envelope`]. `out` is left empty on error.
	pub fn render_second_into(&self, frame: &MinuteFrame, second: u32, out: &mut Vec<u8>)
		-> Result<(), Error>
	{
		out.clear();
		let envelope = self.envelope(frame, second)?;
		let rate = self.sample_rate as usize;
		let start = second as u64 * self.sample_rate as u64;

		out.reserve(self.bytes_per_second());
		for k in 0..rate {
			let amplitude = envelope.amplitude(k, rate, self.depth);
			let s = self.shape.sample(start + k as u64, self.carrier, amplitude, self.sample_rate);
			out.extend_from_slice(&s.to_le_bytes());
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use chrono::{TimeZone, Utc};
	use chrono_tz::Asia::Tokyo;
	use super::*;

	/// Decode little-endian PCM bytes.
	fn samples(pcm: &[u8]) -> Vec<i16> {
		pcm.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect()
	}

	fn frame(protocol: Protocol) -> MinuteFrame {
		let time = Utc.with_ymd_and_hms(2024, 5, 26, 16, 58, 0).unwrap();
		protocol.build_frame(&time).unwrap()
	}

	#[test]
	fn length_test() {
		for protocol in Protocol::ALL {
			let f = frame(protocol);
			let default = protocol.profile().default_carrier();
			assert_eq!(Renderer::new(protocol, 8000), Err(Error::InvalidCarrier(default)));

			// Low rate keeps the test fast
			let r = Renderer::new(protocol, 48000).unwrap().with_carrier(1000.).unwrap();
			let r = Renderer { sample_rate: 8000, ..r };
			let mut out = Vec::new();
			for second in 0..60 {
				r.render_second_into(&f, second, &mut out).unwrap();
				assert_eq!(out.len(), 16000, "{} second {}", protocol, second);
			}
		}
	}

	#[test]
	fn builder_test() {
		let r = Renderer::new(Protocol::Bpc, 48000).unwrap();
		assert_eq!(r.protocol(), Protocol::Bpc);
		assert_eq!(r.sample_rate(), 48000);
		assert_eq!(r.carrier(), 13700.);
		assert_eq!(r.depth(), 0.95);
		assert_eq!(r.shape(), Shape::Square);
		assert_eq!(r.bytes_per_second(), 96000);

		assert_eq!(r.with_carrier(24000.), Err(Error::InvalidCarrier(24000.)));
		assert_eq!(r.with_carrier(0.), Err(Error::InvalidCarrier(0.)));
		assert_eq!(r.with_carrier(23999.).unwrap().carrier(), 23999.);
		assert_eq!(r.with_depth(1.5), Err(Error::InvalidDepth(1.5)));
		assert_eq!(r.with_depth(-0.1), Err(Error::InvalidDepth(-0.1)));
		assert_eq!(r.with_depth(0.5).unwrap().depth(), 0.5);
		assert_eq!(r.with_shape(Shape::Sine).shape(), Shape::Sine);
	}

	#[test]
	fn mismatch_test() {
		let r = Renderer::new(Protocol::Wwvb, 48000).unwrap();
		let f = frame(Protocol::Dcf77);
		let e = Error::ProtocolMismatch { frame: Protocol::Dcf77, renderer: Protocol::Wwvb };
		assert_eq!(r.render_second(&f, 0), Err(e.clone()));
		assert_eq!(r.envelope(&f, 0), Err(e));

		let f = frame(Protocol::Wwvb);
		assert_eq!(r.render_second(&f, 60), Err(Error::InvalidSecond(60)));

		let mut out = vec![1, 2, 3];
		assert!(r.render_second_into(&f, 60, &mut out).is_err());
		assert!(out.is_empty());
	}

	#[test]
	fn envelope_test() {
		// DCF77 second 17 (CEST, 1): 200 ms at 15% amplitude, then full amplitude
		let r = Renderer::new(Protocol::Dcf77, 48000).unwrap();
		let f = frame(Protocol::Dcf77);
		let s = samples(&r.render_second(&f, 17).unwrap());
		assert!(s[..9600].iter().all(|v| v.abs() == 4915));
		assert!(s[9600..].iter().all(|v| v.abs() == 32767));

		// Minute marker: no reduction at all
		let s = samples(&r.render_second(&f, 59).unwrap());
		assert!(s.iter().all(|v| v.abs() == 32767));

		// JJY is inverted: full amplitude first. Second 1 of 11:36 JST is a 0 (800 ms).
		let time = Tokyo.with_ymd_and_hms(2020, 7, 4, 11, 36, 0).unwrap();
		let f = Protocol::Jjy.build_frame(&time).unwrap();
		let r = Renderer::new(Protocol::Jjy, 48000).unwrap();
		let s = samples(&r.render_second(&f, 1).unwrap());
		let low = (32767. * (1. - r.depth())).round() as i16;
		assert!(s[..38400].iter().all(|v| v.abs() == 32767));
		assert!(s[38400..].iter().all(|v| v.abs() == low));

		// BPC sub-frame separator: reduced for the whole second
		let r = Renderer::new(Protocol::Bpc, 48000).unwrap();
		let f = frame(Protocol::Bpc);
		let low = (32767. * (1. - r.depth())).round() as i16;
		let s = samples(&r.render_second(&f, 39).unwrap());
		assert!(s.iter().all(|v| v.abs() == low));
	}

	#[test]
	fn morse_test() {
		let time = Tokyo.with_ymd_and_hms(2020, 7, 4, 11, 45, 0).unwrap();
		let f = Protocol::Jjy.build_frame(&time).unwrap();
		let r = Renderer::new(Protocol::Jjy, 48000).unwrap();

		let mut keyed = 0;
		for second in 40..49 {
			let s = samples(&r.render_second(&f, second).unwrap());
			assert!(s.iter().all(|v| *v == 0 || v.abs() == 32767));
			keyed += s.iter().filter(|v| v.abs() == 32767).count();
		}
		// Roughly the share of 1s in the pattern
		let ones = jjy::MORSE.iter().filter(|c| **c == b'1').count();
		let expected = ones * 9 * 48000 / jjy::MORSE.len();
		assert!(keyed.abs_diff(expected) < 48000 / 10);

		// The pattern starts with the carrier off
		let s = samples(&r.render_second(&f, 40).unwrap());
		assert_eq!(s[0], 0);
	}

	#[test]
	fn continuity_test() {
		// Rendering second 59 matches sampling the minute directly
		for protocol in Protocol::ALL {
			let r = Renderer::new(protocol, 48000).unwrap().with_shape(Shape::Sine);
			let f = frame(protocol);
			let e = r.envelope(&f, 59).unwrap();
			let s = samples(&r.render_second(&f, 59).unwrap());
			for k in [0, 1, 4799, 4800, 9600, 47999] {
				let expected = r.shape().sample(59 * 48000 + k as u64, r.carrier(), e.amplitude(k, 48000, r.depth()), 48000);
				assert_eq!(s[k], expected);
			}
		}
	}
}
