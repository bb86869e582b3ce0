//! Audio device output through cpal.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Sample;
use log::{error, info};
use parking_lot::{Condvar, Mutex};
use crate::error::SinkError;
use super::{samples, PcmSink, SinkOpener};

/// Longest time a single write blocks waiting for queue space.
const WRITE_WAIT: Duration = Duration::from_millis(20);

/// State shared between the writer and the audio callback.
struct Shared {
	queue: Mutex<VecDeque<i16>>,
	/// Signalled whenever the callback drains samples.
	space: Condvar,
	/// Set once the stream reports an error.
	failed: Mutex<Option<String>>
}

impl Shared {
	fn new(capacity: usize) -> Shared {
		Shared {
			queue: Mutex::new(VecDeque::with_capacity(capacity)),
			space: Condvar::new(),
			failed: Mutex::new(None)
		}
	}

	/// Fill `data` from the queue, padding with silence once it runs dry.
	fn fill(&self, data: &mut [f32]) {
		let mut queue = self.queue.lock();
		for v in data.iter_mut() {
			*v = match queue.pop_front() {
				Some(s) => s.to_sample::<f32>(),
				None => f32::EQUILIBRIUM
			};
		}
		drop(queue);
		self.space.notify_all();
	}

	/// Append as many whole samples of `pcm` as fit, waiting up to [`WRITE_WAIT`] for space.
	fn push(&self, pcm: &[u8], capacity: usize) -> Result<usize, SinkError> {
		if let Some(e) = self.failed.lock().as_ref() {
			return Err(SinkError::Stream(e.clone()));
		}

		let mut queue = self.queue.lock();
		if queue.len() >= capacity {
			self.space.wait_for(&mut queue, WRITE_WAIT);
		}
		let n = (pcm.len() / 2).min(capacity.saturating_sub(queue.len()));
		queue.extend(samples(&pcm[..n * 2]));
		Ok(n * 2)
	}

	fn fail(&self, reason: String) {
		*self.failed.lock() = Some(reason);
		self.space.notify_all();
	}
}

/// Plays PCM on the host's default output device.
///
/// Samples are queued in a bounded buffer drained by the audio callback. When the queue is full,
/// [`write`](PcmSink::write) blocks briefly and then accepts only what fits, so callers must loop
/// on partial writes. The callback outputs silence whenever the queue is empty.
///
/// The stream stops when the sink is dropped.
pub struct DeviceSink {
	shared: Arc<Shared>,
	capacity: usize,
	_stream: cpal::Stream
}

impl DeviceSink {
	/// Open a mono stream at `sample_rate` Hz with a queue holding `buffer` of audio.
	///
	/// # Errors
	///
	/// Returns [`SinkError::NoDevice`] if there is no default output device, or the cpal error if
	/// the stream cannot be built or started.
	pub fn open(sample_rate: u32, buffer: Duration) -> Result<DeviceSink, SinkError> {
		let host = cpal::default_host();
		let device = host.default_output_device().ok_or(SinkError::NoDevice)?;
		let config = cpal::StreamConfig {
			channels: 1,
			sample_rate: cpal::SampleRate(sample_rate),
			buffer_size: cpal::BufferSize::Fixed(1024)
		};

		let capacity = ((sample_rate as u128 * buffer.as_millis()) / 1000).max(1) as usize;
		let shared = Arc::new(Shared::new(capacity));
		let data = shared.clone();
		let errors = shared.clone();
		let stream = device.build_output_stream(
			&config,
			move |out: &mut [f32], _info: &cpal::OutputCallbackInfo| data.fill(out),
			move |e: cpal::StreamError| {
				error!("audio stream error: {}", e);
				errors.fail(e.to_string());
			},
			None)?;
		stream.play()?;

		info!("opened {} at {} Hz with {} ms queue",
			device.name().unwrap_or_else(|_| String::from("default output")),
			sample_rate,
			buffer.as_millis());
		Ok(DeviceSink { shared, capacity, _stream: stream })
	}
}

impl PcmSink for DeviceSink {
	fn write(&mut self, pcm: &[u8]) -> Result<usize, SinkError> {
		self.shared.push(pcm, self.capacity)
	}
}

/// Opens a [`DeviceSink`] with a fixed queue length.
pub struct DeviceOpener {
	buffer: Duration
}

impl DeviceOpener {
	/// Create an opener whose sinks queue up to `buffer` of audio.
	pub fn new(buffer: Duration) -> DeviceOpener {
		DeviceOpener { buffer }
	}
}

impl SinkOpener for DeviceOpener {
	fn open(&self, sample_rate: u32) -> Result<Box<dyn PcmSink>, SinkError> {
		Ok(Box::new(DeviceSink::open(sample_rate, self.buffer)?))
	}
}
