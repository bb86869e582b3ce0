//! Carrier synthesis.
//!
//! The carrier phase is a function of the sample index counted from the start of the minute, so
//! consecutive seconds join without discontinuities no matter how the output is chunked.

use core::{f64::consts::PI, fmt, str::FromStr};
use crate::Error;

/// Peak value of a full-scale sample.
const FULL_SCALE: f64 = i16::MAX as f64;

/// Shape of the audio carrier.
///
/// Square waves have the strongest harmonics and give the best reception, which is why they are
/// the default.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
	Sine,
	#[default]
	Square,
	Triangle
}

impl Shape {
	/// All supported shapes.
	pub const ALL: [Shape; 3] = [Shape::Sine, Shape::Square, Shape::Triangle];

	/// Value of the carrier in [-1, 1] at `phase` radians.
	#[inline(always)]
	fn unit(self, phase: f64) -> f64 {
		let s = phase.sin();
		match self {
			Shape::Sine => s,
			Shape::Square => if s >= 0. { 1. } else { -1. },
			Shape::Triangle => 2. / PI * s.asin()
		}
	}

	/// Synthesize sample `index` of a carrier at `frequency` Hz.
	///
	/// `index` counts from the start of the minute at `sample_rate` samples per second.
	/// `amplitude` is clamped to [0, 1].
	///
	/// # Examples
	/// ```
	/// # use signals::Shape;
	/// // A quarter period in, a 12 kHz sine at 48 kHz peaks
	/// assert_eq!(Shape::Sine.sample(1, 12000., 1., 48000), 32767);
	/// assert_eq!(Shape::Sine.sample(1, 12000., 0.5, 48000), 16384);
	/// assert_eq!(Shape::Square.sample(3, 12000., 1., 48000), -32767);
	/// ```
	pub fn sample(self, index: u64, frequency: f64, amplitude: f64, sample_rate: u32) -> i16 {
		// Reduce to a fraction of a period first to keep precision for large indices
		let cycles = (index as f64 * frequency / sample_rate as f64).fract();
		let amplitude = amplitude.clamp(0., 1.);
		(self.unit(2. * PI * cycles) * FULL_SCALE * amplitude).round() as i16
	}
}

impl fmt::Display for Shape {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Shape::Sine => "sine",
			Shape::Square => "square",
			Shape::Triangle => "triangle"
		})
	}
}

impl FromStr for Shape {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"sine" | "sin" => Ok(Shape::Sine),
			"square" => Ok(Shape::Square),
			"triangle" => Ok(Shape::Triangle),
			_ => Err(Error::UnknownShape(s.to_string()))
		}
	}
}
