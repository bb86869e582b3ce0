//! The real-time playback loop.
//!
//! [`run`] renders one second of signal at a time and writes it to a sink, pacing itself on the
//! clock so that each write starts near the second boundary it encodes. The loop runs until its
//! cancellation token fires and never blocks for longer than one sink write or one sleep, both of
//! which are bounded and cancellable.

use std::time::Duration;
use chrono::{DateTime, TimeDelta, Timelike};
use chrono_tz::Tz;
use log::{debug, warn};
use signals::{MinuteFrame, Renderer};
use crate::cancel::CancellationToken;
use crate::clock::Clock;
use crate::error::{PlayerError, SinkError};
use crate::sink::PcmSink;

/// Counters for one playback session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
	/// Seconds rendered, including any whose write failed.
	pub seconds: u64,
	/// Minute frames built.
	pub frames: u64,
	/// Seconds abandoned because the sink failed.
	pub write_errors: u64
}

/// Minute key of `time`, `hour * 60 + minute`.
fn minute_key(time: &DateTime<Tz>) -> u32 {
	time.hour() * 60 + time.minute()
}

/// How long to sleep after a write that finished `elapsed_ms` into its second.
///
/// No sleep if the write finished within `margin` after a boundary; otherwise wake `margin`
/// before the next boundary.
pub fn sleep_duration(elapsed_ms: u32, margin: Duration) -> Duration {
	let margin_ms = margin.as_millis().min(1000) as u32;
	if elapsed_ms < margin_ms {
		Duration::ZERO
	} else {
		Duration::from_millis(1000u32.saturating_sub(elapsed_ms).saturating_sub(margin_ms) as u64)
	}
}

/// Write all of `pcm`, looping on partial writes.
///
/// Stops early if `token` is cancelled. Returns the number of bytes written.
///
/// # Errors
///
/// Returns the sink's error; bytes written before it are lost.
pub fn write_all(sink: &mut dyn PcmSink, pcm: &[u8], token: &CancellationToken)
	-> Result<usize, SinkError>
{
	let mut written = 0;
	while written < pcm.len() && !token.is_cancelled() {
		written += sink.write(&pcm[written..])?;
	}
	Ok(written)
}

/// Time left until `time` reaches the next whole second.
fn until_next_second(time: &DateTime<Tz>) -> Duration {
	let nanos = time.timestamp_subsec_nanos().min(999_999_999);
	Duration::from_nanos(1_000_000_000 - nanos as u64)
}

/// Play `renderer`'s protocol on `sink` until `token` is cancelled.
///
/// The second being played is the one that contains `clock.now() + margin`, the instant the next
/// write starts playing. Each second is rendered and written once; if the loop comes around
/// while the second being played is still the one it last wrote, it sleeps until `margin`
/// before the next boundary instead. Frames are keyed by the minute of the second being played
/// and encode the minute after it, so a frame built at `HH:MM:59.960` with a 50 ms margin plays
/// second 0 of `HH:(MM+1)` and carries `HH:(MM+2)`. A failed write is logged and the loop moves
/// on to the next second.
///
/// # Errors
///
/// Returns [`PlayerError::Signal`] if a frame cannot be built or rendered, which ends the
/// session. Cancellation is not an error.
pub fn run(renderer: &Renderer, clock: &dyn Clock, sink: &mut dyn PcmSink,
	token: &CancellationToken, margin: Duration) -> Result<SessionStats, PlayerError>
{
	let lead = TimeDelta::from_std(margin).unwrap_or(TimeDelta::zero());
	let protocol = renderer.protocol();
	let mut stats = SessionStats::default();
	let mut current: Option<(u32, MinuteFrame)> = None;
	let mut pcm = Vec::with_capacity(renderer.bytes_per_second());
	let mut last: Option<i64> = None;

	while !token.is_cancelled() {
		let target = clock.now() + lead;
		if last == Some(target.timestamp()) {
			if clock.sleep(until_next_second(&target), token) {
				break;
			}
			continue;
		}
		last = Some(target.timestamp());
		let key = minute_key(&target);

		let frame = match current {
			Some((k, frame)) if k == key => frame,
			_ => {
				let upcoming = target + TimeDelta::minutes(1);
				let frame = protocol.build_frame(&upcoming)?;
				debug!("minute {:02}:{:02}: {} frame for {}", key / 60, key % 60, protocol,
					upcoming.format("%Y-%m-%d %H:%M %Z"));
				stats.frames += 1;
				current = Some((key, frame));
				frame
			}
		};

		renderer.render_second_into(&frame, target.second(), &mut pcm)?;
		stats.seconds += 1;
		if let Err(e) = write_all(sink, &pcm, token) {
			warn!("dropped second {} of {}: {}", target.second(), protocol, e);
			stats.write_errors += 1;
		}

		let elapsed = clock.now().timestamp_subsec_millis();
		let pause = sleep_duration(elapsed, margin);
		if !pause.is_zero() && clock.sleep(pause, token) {
			break;
		}
	}

	Ok(stats)
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use chrono::{TimeZone, Utc};
	use chrono_tz::UTC;
	use parking_lot::Mutex;
	use signals::Protocol;
	use super::*;

	/// A clock that only moves when told to.
	struct FakeClock {
		now: Mutex<DateTime<Tz>>
	}

	impl FakeClock {
		fn new(now: DateTime<Tz>) -> Arc<FakeClock> {
			Arc::new(FakeClock { now: Mutex::new(now) })
		}

		fn advance(&self, d: Duration) {
			let mut now = self.now.lock();
			*now += TimeDelta::from_std(d).unwrap();
		}
	}

	impl Clock for FakeClock {
		fn now(&self) -> DateTime<Tz> {
			*self.now.lock()
		}

		fn sleep(&self, duration: Duration, token: &CancellationToken) -> bool {
			self.advance(duration);
			token.is_cancelled()
		}
	}

	/// A sink that plays back instantly, advancing the clock by `speed` times the audio
	/// duration it accepts, or by `cost` per write when set.
	struct PacedSink {
		clock: Arc<FakeClock>,
		rate: u32,
		speed: f64,
		cost: Option<Duration>,
		chunk: usize,
		data: Vec<u8>,
		limit: usize,
		fail_first: usize,
		token: CancellationToken
	}

	impl PacedSink {
		fn new(clock: Arc<FakeClock>, rate: u32, seconds: usize, token: CancellationToken) -> PacedSink {
			PacedSink {
				clock,
				rate,
				speed: 1.0,
				cost: None,
				chunk: 4096,
				data: Vec::new(),
				limit: seconds * rate as usize * 2,
				fail_first: 0,
				token
			}
		}
	}

	impl PcmSink for PacedSink {
		fn write(&mut self, pcm: &[u8]) -> Result<usize, SinkError> {
			if self.fail_first > 0 {
				self.fail_first -= 1;
				return Err(SinkError::Stream(String::from("buffer underrun")));
			}
			let n = pcm.len().min(self.chunk);
			self.data.extend_from_slice(&pcm[..n]);
			let nanos = n as f64 / 2.0 / self.rate as f64 * 1e9 * self.speed;
			self.clock.advance(self.cost.unwrap_or(Duration::from_nanos(nanos.round() as u64)));
			if self.data.len() >= self.limit {
				self.token.cancel();
			}
			Ok(n)
		}
	}

	fn expected(renderer: &Renderer, parts: &[(DateTime<Tz>, u32)]) -> Vec<u8> {
		parts.iter()
			.flat_map(|(minute, second)| {
				let frame = renderer.protocol().build_frame(minute).unwrap();
				renderer.render_second(&frame, *second).unwrap()
			})
			.collect()
	}

	#[test]
	fn until_next_second_test() {
		let t = UTC.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
		assert_eq!(until_next_second(&t), Duration::from_secs(1));
		assert_eq!(until_next_second(&(t + TimeDelta::milliseconds(998))), Duration::from_millis(2));
	}

	#[test]
	fn sleep_duration_test() {
		let margin = Duration::from_millis(50);
		assert_eq!(sleep_duration(0, margin), Duration::ZERO);
		assert_eq!(sleep_duration(49, margin), Duration::ZERO);
		assert_eq!(sleep_duration(50, margin), Duration::from_millis(900));
		assert_eq!(sleep_duration(700, margin), Duration::from_millis(250));
		assert_eq!(sleep_duration(960, margin), Duration::ZERO);
		assert_eq!(sleep_duration(999, margin), Duration::ZERO);
		assert_eq!(sleep_duration(300, Duration::ZERO), Duration::from_millis(700));
	}

	#[test]
	fn write_all_test() {
		let clock = FakeClock::new(UTC.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
		let token = CancellationToken::new();
		let mut sink = PacedSink::new(clock.clone(), 8000, 10, token.clone());
		sink.chunk = 3;

		let pcm = vec![7u8; 1000];
		assert_eq!(write_all(&mut sink, &pcm, &token).unwrap(), 1000);
		assert_eq!(sink.data, pcm);

		// Stops between partial writes once cancelled
		token.cancel();
		assert_eq!(write_all(&mut sink, &pcm, &token).unwrap(), 0);
	}

	#[test]
	fn minute_rollover_test() {
		let start = UTC.with_ymd_and_hms(2024, 12, 31, 23, 59, 58).unwrap();
		let clock = FakeClock::new(start);
		let token = CancellationToken::new();
		let renderer = Renderer::new(Protocol::Dcf77, 32000).unwrap();
		let mut sink = PacedSink::new(clock.clone(), 32000, 3, token.clone());

		let stats = run(&renderer, clock.as_ref(), &mut sink, &token, Duration::from_millis(50)).unwrap();
		assert_eq!(stats, SessionStats { seconds: 3, frames: 2, write_errors: 0 });

		// 23:59 carries 00:00 of the next day, 00:00 carries 00:01
		let midnight = UTC.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
		let next = UTC.with_ymd_and_hms(2025, 1, 1, 0, 1, 0).unwrap();
		assert_eq!(sink.data, expected(&renderer, &[(midnight, 58), (midnight, 59), (next, 0)]));
	}

	#[test]
	fn anticipation_test() {
		let start = Utc.with_ymd_and_hms(2024, 5, 26, 16, 57, 59).unwrap().with_timezone(&UTC);
		let clock = FakeClock::new(start);
		let token = CancellationToken::new();
		let renderer = Renderer::new(Protocol::Wwvb, 32000).unwrap();
		let mut sink = PacedSink::new(clock.clone(), 32000, 1, token.clone());

		run(&renderer, clock.as_ref(), &mut sink, &token, Duration::from_millis(50)).unwrap();

		// Built at 16:57:59, the frame carries 16:58
		let minute = Utc.with_ymd_and_hms(2024, 5, 26, 16, 58, 0).unwrap();
		let frame = Protocol::Wwvb.build_frame(&minute).unwrap();
		assert_eq!(frame.decode(2024).unwrap(), minute);
		assert_eq!(sink.data, renderer.render_second(&frame, 59).unwrap());
	}

	#[test]
	fn fast_sink_test() {
		// The sink consumes a second of audio in 700 ms, so the loop sleeps until 50 ms before
		// each boundary and must not repeat a second.
		let start = UTC.with_ymd_and_hms(2024, 3, 1, 8, 30, 10).unwrap();
		let clock = FakeClock::new(start);
		let token = CancellationToken::new();
		let renderer = Renderer::new(Protocol::Jjy, 32000).unwrap();
		let mut sink = PacedSink::new(clock.clone(), 32000, 3, token.clone());
		sink.speed = 0.7;

		let stats = run(&renderer, clock.as_ref(), &mut sink, &token, Duration::from_millis(50)).unwrap();
		assert_eq!(stats.seconds, 3);
		assert_eq!(stats.frames, 1);

		let minute = UTC.with_ymd_and_hms(2024, 3, 1, 8, 31, 0).unwrap();
		assert_eq!(sink.data, expected(&renderer, &[(minute, 10), (minute, 11), (minute, 12)]));
	}

	#[test]
	fn non_blocking_sink_test() {
		// Every write returns after 2 ms, like a WAV file or a long device queue
		let start = UTC.with_ymd_and_hms(2024, 3, 1, 8, 30, 10).unwrap();
		let clock = FakeClock::new(start);
		let token = CancellationToken::new();
		let renderer = Renderer::new(Protocol::Dcf77, 32000).unwrap();
		let mut sink = PacedSink::new(clock.clone(), 32000, 3, token.clone());
		sink.chunk = usize::MAX;
		sink.cost = Some(Duration::from_millis(2));

		let stats = run(&renderer, clock.as_ref(), &mut sink, &token, Duration::from_millis(50)).unwrap();
		assert_eq!(stats, SessionStats { seconds: 3, frames: 1, write_errors: 0 });

		// One buffer per second, each written 50 ms ahead of its boundary
		let minute = UTC.with_ymd_and_hms(2024, 3, 1, 8, 31, 0).unwrap();
		assert_eq!(sink.data, expected(&renderer, &[(minute, 10), (minute, 11), (minute, 12)]));
		let end = UTC.with_ymd_and_hms(2024, 3, 1, 8, 30, 11).unwrap() + TimeDelta::milliseconds(952);
		assert_eq!(clock.now(), end);
	}

	#[test]
	fn late_in_minute_test() {
		// At 16:57:59.960 the next write plays second 0 of 16:58, whose frame carries 16:59
		let start = UTC.with_ymd_and_hms(2024, 5, 26, 16, 57, 59).unwrap() + TimeDelta::milliseconds(960);
		let clock = FakeClock::new(start);
		let token = CancellationToken::new();
		let renderer = Renderer::new(Protocol::Wwvb, 32000).unwrap();
		let mut sink = PacedSink::new(clock.clone(), 32000, 1, token.clone());

		let stats = run(&renderer, clock.as_ref(), &mut sink, &token, Duration::from_millis(50)).unwrap();
		assert_eq!(stats.frames, 1);

		let minute = Utc.with_ymd_and_hms(2024, 5, 26, 16, 59, 0).unwrap();
		let frame = Protocol::Wwvb.build_frame(&minute).unwrap();
		assert_eq!(frame.decode(2024).unwrap(), minute);
		assert_eq!(sink.data, renderer.render_second(&frame, 0).unwrap());
	}

	#[test]
	fn write_error_test() {
		let start = UTC.with_ymd_and_hms(2024, 7, 4, 12, 0, 30).unwrap();
		let clock = FakeClock::new(start);
		let token = CancellationToken::new();
		let renderer = Renderer::new(Protocol::Bpc, 48000).unwrap();
		let mut sink = PacedSink::new(clock.clone(), 48000, 2, token.clone());
		sink.fail_first = 1;

		let stats = run(&renderer, clock.as_ref(), &mut sink, &token, Duration::from_millis(50)).unwrap();
		assert_eq!(stats, SessionStats { seconds: 3, frames: 1, write_errors: 1 });

		// The failed second is abandoned, not retried
		let minute = UTC.with_ymd_and_hms(2024, 7, 4, 12, 1, 0).unwrap();
		assert_eq!(sink.data, expected(&renderer, &[(minute, 31), (minute, 32)]));
	}

	#[test]
	fn cancelled_test() {
		let clock = FakeClock::new(UTC.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
		let token = CancellationToken::new();
		token.cancel();
		let renderer = Renderer::new(Protocol::Dcf77, 48000).unwrap();
		let mut sink = PacedSink::new(clock.clone(), 48000, 1, token.clone());

		let stats = run(&renderer, clock.as_ref(), &mut sink, &token, Duration::from_millis(50)).unwrap();
		assert_eq!(stats, SessionStats::default());
		assert!(sink.data.is_empty());
	}
}
