//! WAV file output.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use log::warn;
use crate::error::SinkError;
use super::{samples, PcmSink, SinkOpener};

/// Writes PCM to a mono 16-bit WAV file.
///
/// The file header is finalized when the sink is dropped.
pub struct WavSink {
	writer: Option<hound::WavWriter<BufWriter<File>>>
}

impl WavSink {
	/// Create (or truncate) the WAV file at `path`.
	///
	/// # Errors
	///
	/// Returns [`SinkError::Wav`] if the file cannot be created.
	pub fn create<P: AsRef<Path>>(path: P, sample_rate: u32) -> Result<WavSink, SinkError> {
		let spec = hound::WavSpec {
			channels: 1,
			sample_rate,
			bits_per_sample: 16,
			sample_format: hound::SampleFormat::Int
		};
		Ok(WavSink {
			writer: Some(hound::WavWriter::create(path, spec)?)
		})
	}

	/// Finalize the file, reporting any error.
	///
	/// # Errors
	///
	/// Returns [`SinkError::Wav`] if the header cannot be updated.
	pub fn finish(mut self) -> Result<(), SinkError> {
		match self.writer.take() {
			Some(w) => Ok(w.finalize()?),
			None => Ok(())
		}
	}
}

impl PcmSink for WavSink {
	fn write(&mut self, pcm: &[u8]) -> Result<usize, SinkError> {
		let writer = self.writer.as_mut().ok_or(SinkError::Stream(String::from("WAV file closed")))?;
		for s in samples(pcm) {
			writer.write_sample(s)?;
		}
		Ok(pcm.len() & !1)
	}
}

impl Drop for WavSink {
	fn drop(&mut self) {
		if let Some(w) = self.writer.take() {
			if let Err(e) = w.finalize() {
				warn!("failed to finalize WAV file: {}", e);
			}
		}
	}
}

/// Opens a [`WavSink`] at a fixed path for every session.
///
/// Each session truncates the file.
pub struct WavOpener {
	path: PathBuf
}

impl WavOpener {
	/// Create an opener that writes to `path`.
	pub fn new<P: Into<PathBuf>>(path: P) -> WavOpener {
		WavOpener { path: path.into() }
	}
}

impl SinkOpener for WavOpener {
	fn open(&self, sample_rate: u32) -> Result<Box<dyn PcmSink>, SinkError> {
		Ok(Box::new(WavSink::create(&self.path, sample_rate)?))
	}
}
