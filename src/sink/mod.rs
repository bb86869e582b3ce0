//! PCM output sinks.
//!
//! A sink accepts mono, 16-bit signed little-endian PCM. Writes may be partial: a sink whose
//! buffer is smaller than one second of audio accepts what fits and returns the number of bytes
//! it took, and the caller writes the remainder later.

use crate::error::SinkError;

pub mod device;
pub mod wav;

pub use device::{DeviceOpener, DeviceSink};
pub use wav::{WavOpener, WavSink};

/// A destination for rendered PCM.
pub trait PcmSink {
	/// Write some prefix of `pcm`, returning the number of bytes accepted.
	///
	/// The count is always even. Returning `Ok(0)` means the sink is full right now and the
	/// caller should try again.
	///
	/// # Errors
	///
	/// Returns an error if the sink can no longer accept data.
	fn write(&mut self, pcm: &[u8]) -> Result<usize, SinkError>;
}

/// Opens sinks for playback sessions.
///
/// Sinks are opened on the playback thread, which is why the opener must be shareable while the
/// sink itself need not be [`Send`].
pub trait SinkOpener: Send + Sync {
	/// Open a sink for PCM at `sample_rate` Hz.
	///
	/// # Errors
	///
	/// Returns an error if the underlying device or file cannot be opened.
	fn open(&self, sample_rate: u32) -> Result<Box<dyn PcmSink>, SinkError>;
}

/// Split little-endian PCM bytes into samples, ignoring a trailing odd byte.
pub(crate) fn samples(pcm: &[u8]) -> impl Iterator<Item = i16> + '_ {
	pcm.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]]))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn samples_test() {
		let pcm = [0x01, 0x00, 0xff, 0x7f, 0x00, 0x80, 0x12];
		let s: Vec<i16> = samples(&pcm).collect();
		assert_eq!(s, vec![1, i16::MAX, i16::MIN]);
	}
}
