//! The playback state machine.
//!
//! A [`Player`] is either idle or running one playback session on a dedicated thread. Sessions
//! are started with [`Player::start`], stopped with [`Player::stop`] and replaced with
//! [`Player::switch`]. All three may be called from any thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::sync_channel;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use log::{error, info};
use parking_lot::Mutex;
use signals::{Protocol, Renderer, Shape};
use crate::cancel::CancellationToken;
use crate::clock::Clock;
use crate::error::PlayerError;
use crate::scheduler;
use crate::sink::SinkOpener;

/// Resolved playback settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerConfig {
	/// Output sample rate in Hz.
	pub sample_rate: u32,
	/// Waveform of the carrier.
	pub shape: Shape,
	/// Carrier override in Hz. `None` uses the protocol's default carrier.
	pub carrier: Option<f64>,
	/// Modulation depth override. `None` uses the protocol's depth.
	pub depth: Option<f64>,
	/// How far ahead of each second boundary the scheduler wakes.
	pub margin: Duration
}

impl Default for PlayerConfig {
	fn default() -> PlayerConfig {
		PlayerConfig {
			sample_rate: 48000,
			shape: Shape::Square,
			carrier: None,
			depth: None,
			margin: Duration::from_millis(50)
		}
	}
}

impl PlayerConfig {
	/// Build the renderer for `protocol` with these settings.
	///
	/// # Errors
	///
	/// Returns the renderer's validation error for an unusable carrier, depth or sample rate.
	pub fn renderer(&self, protocol: Protocol) -> Result<Renderer, signals::Error> {
		let mut renderer = Renderer::new(protocol, self.sample_rate)?.with_shape(self.shape);
		if let Some(hz) = self.carrier {
			renderer = renderer.with_carrier(hz)?;
		}
		if let Some(depth) = self.depth {
			renderer = renderer.with_depth(depth)?;
		}
		Ok(renderer)
	}
}

/// The thread and stop handle of a running session.
struct Session {
	protocol: Protocol,
	token: CancellationToken,
	handle: JoinHandle<()>
}

/// Clears the running flag when the playback thread exits, however it exits.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
	fn drop(&mut self) {
		self.0.store(false, Ordering::SeqCst);
	}
}

/// Plays time signals on a background thread.
///
/// At most one session runs at a time. A session ends when it is stopped, or on its own if
/// rendering fails or panics; [`is_running`](Player::is_running) reports either case.
///
/// Dropping the player stops any running session.
///
/// # Examples
/// ```ignore
/// let player = Player::new(PlayerConfig::default(),
/// 	Arc::new(SystemClock::new(chrono_tz::UTC)),
/// 	Arc::new(DeviceOpener::new(Duration::from_millis(250))));
/// player.start(Protocol::Dcf77)?;
/// thread::sleep(Duration::from_secs(120));
/// player.stop();
/// ```
pub struct Player {
	config: PlayerConfig,
	clock: Arc<dyn Clock>,
	opener: Arc<dyn SinkOpener>,
	running: Arc<AtomicBool>,
	session: Mutex<Option<Session>>
}

impl Player {
	/// Create an idle player that reads `clock` and plays through sinks from `opener`.
	pub fn new(config: PlayerConfig, clock: Arc<dyn Clock>, opener: Arc<dyn SinkOpener>) -> Player {
		Player {
			config,
			clock,
			opener,
			running: Arc::new(AtomicBool::new(false)),
			session: Mutex::new(None)
		}
	}

	/// Whether a session is playing.
	pub fn is_running(&self) -> bool {
		self.running.load(Ordering::SeqCst)
	}

	/// The protocol of the running session, if any.
	pub fn protocol(&self) -> Option<Protocol> {
		let session = self.session.lock();
		match session.as_ref() {
			Some(s) if self.is_running() => Some(s.protocol),
			_ => None
		}
	}

	/// Start playing `protocol`.
	///
	/// Returns `Ok(false)` without doing anything if a session is already running, and
	/// `Ok(true)` once the new session's output is open and playback has begun.
	///
	/// # Errors
	///
	/// Returns [`PlayerError::Signal`] if the settings are invalid for `protocol`,
	/// [`PlayerError::Sink`] if the output cannot be opened and [`PlayerError::Spawn`] if the
	/// thread cannot be created. The player stays idle on error.
	pub fn start(&self, protocol: Protocol) -> Result<bool, PlayerError> {
		let mut session = self.session.lock();
		if self.is_running() {
			return Ok(false);
		}
		// Reap a session that ended on its own
		if let Some(old) = session.take() {
			Self::join(old);
		}

		let renderer = self.config.renderer(protocol)?;
		let token = CancellationToken::new();
		let (tx, rx) = sync_channel(1);
		self.running.store(true, Ordering::SeqCst);

		let guard = RunningGuard(self.running.clone());
		let clock = self.clock.clone();
		let opener = self.opener.clone();
		let worker = token.clone();
		let margin = self.config.margin;
		let spawned = thread::Builder::new()
			.name(String::from("longwave-playback"))
			.spawn(move || {
				let _guard = guard;
				raise_priority();
				let mut sink = match opener.open(renderer.sample_rate()) {
					Ok(sink) => sink,
					Err(e) => {
						_ = tx.send(Err(e));
						return;
					}
				};
				_ = tx.send(Ok(()));

				let result = panic::catch_unwind(AssertUnwindSafe(|| {
					scheduler::run(&renderer, clock.as_ref(), sink.as_mut(), &worker, margin)
				}));
				match result {
					Ok(Ok(stats)) => info!("{} session ended after {} seconds, {} frames, {} dropped",
						protocol, stats.seconds, stats.frames, stats.write_errors),
					Ok(Err(e)) => error!("{} session failed: {}", protocol, e),
					Err(_) => error!("{} session panicked", protocol)
				}
			});

		let handle = match spawned {
			Ok(handle) => handle,
			Err(e) => {
				self.running.store(false, Ordering::SeqCst);
				return Err(PlayerError::Spawn(e));
			}
		};

		match rx.recv() {
			Ok(Ok(())) => {
				info!("playing {} ({}) at {:.0} Hz carrier, {} wave",
					protocol, protocol.profile().station, renderer.carrier(), renderer.shape());
				*session = Some(Session { protocol, token, handle });
				Ok(true)
			},
			Ok(Err(e)) => {
				Self::join(Session { protocol, token, handle });
				Err(PlayerError::Sink(e))
			},
			Err(_) => {
				Self::join(Session { protocol, token, handle });
				Err(PlayerError::Disconnected)
			}
		}
	}

	/// Stop the running session and wait for its thread to exit.
	///
	/// Returns `false` if the player was already idle.
	pub fn stop(&self) -> bool {
		let mut session = self.session.lock();
		let Some(s) = session.take() else {
			return false;
		};
		let was_running = self.is_running();
		s.token.cancel();
		let protocol = s.protocol;
		Self::join(s);
		if was_running {
			info!("stopped {}", protocol);
		}
		was_running
	}

	/// Stop any running session and start `protocol`.
	///
	/// # Errors
	///
	/// See [`Player::start`].
	pub fn switch(&self, protocol: Protocol) -> Result<bool, PlayerError> {
		self.stop();
		self.start(protocol)
	}

	fn join(session: Session) {
		if session.handle.join().is_err() {
			error!("{} playback thread panicked", session.protocol);
		}
	}
}

impl Drop for Player {
	fn drop(&mut self) {
		self.stop();
	}
}

/// Raise the calling thread's scheduling priority, if permitted.
#[cfg(target_os = "linux")]
fn raise_priority() {
	// On Linux the PRIO_PROCESS target 0 is the calling thread.
	let result = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, -10) };
	if result != 0 {
		log::debug!("could not raise playback priority: {}", std::io::Error::last_os_error());
	}
}

#[cfg(not(target_os = "linux"))]
fn raise_priority() {}
