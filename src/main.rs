//! Emulate longwave time signal transmitters using simple audio output.
//!
//! This crate generates the amplitude-modulated signals of public time transmitters ([DCF77],
//! [WWVB], [JJY40/60] and [BPC]) and plays them on the default audio output device, or writes
//! them to a WAV file. Radio-controlled clocks do not listen to audio; they pick up stray RF
//! emitted by the audio hardware, so the carrier is placed at an audio frequency whose harmonics
//! reach the clock's receiver.
//!
//! Playback follows the wall clock: each second of signal is rendered just before it is due, and
//! each minute's frame carries the following minute, exactly like the real transmitters.
//!
//! [DCF77]: https://en.wikipedia.org/wiki/DCF77
//! [WWVB]: https://en.wikipedia.org/wiki/WWVB
//! [JJY40/60]: https://en.wikipedia.org/wiki/JJY
//! [BPC]: https://en.wikipedia.org/wiki/BPC_(time_signal)
//!
//! # Command Line Arguments
//!
//! General form: `longwave [options...] signal`
//!
//! | Short form | Long form       | Argument          | Default          | Description                          |
//! | ---------- | --------------- | ----------------- | ---------------- | ------------------------------------ |
//! | `-s`       | `--shape`       | Waveform          | `square`         | `sine`, `square` or `triangle`       |
//! | `-f`       | `--carrier`     | Hz                | Signal-dependent | Audio carrier, below half the rate   |
//! | `-d`       | `--depth`       | 0 to 1            | Signal-dependent | Modulation depth                     |
//! | `-r`       | `--sample-rate` | Hz                | 48000            | Output sample rate                   |
//! | `-b`       | `--buffer-ms`   | Milliseconds      | 250              | Audio device queue length            |
//! | `-m`       | `--margin-ms`   | Milliseconds      | 50               | Wake-up margin before each second    |
//! | `-z`       | `--zone`        | IANA zone name    | `UTC`            | Time zone of the clock               |
//! | `-t`       | `--time`        | Date time string  | Current time     | The starting time to transmit        |
//! | `-n`       | `--minutes`     | Integer > 0       | Unlimited        | Stop after this many minutes         |
//! | `-o`       | `--wav`         | Path              | None             | Write a WAV file instead of playing  |
//! | `-v`, `-q` | `--verbose`     |                   | `info`           | Raise or lower log verbosity         |
//!
//! The default carriers are 15500 Hz for DCF77, 12000 Hz for WWVB, 13333 Hz for JJY and 13700 Hz
//! for BPC. Each signal converts the clock into its own civil time (Berlin, UTC, Tokyo and
//! Beijing respectively), so `--zone` only matters for reading `--time` values that have no UTC
//! offset.
//!
//! The last argument must be the signal to generate, one of:
//! - `dcf77`
//! - `wwvb`
//! - `jjy`
//! - `jjy40` (alias for `jjy`)
//! - `jjy60` (alias for `jjy`)
//! - `bpc`
//!
//! # Examples
//!
//! Transmit DCF77 until interrupted
//! ```sh
//! longwave dcf77
//! ```
//!
//! Transmit WWVB for 8 minutes using a sine carrier
//! ```sh
//! longwave -n 8 -s sine wwvb
//! ```
//!
//! Record two minutes of JJY starting just before a call sign minute
//! ```sh
//! longwave -z Asia/Tokyo -t "2024-04-12 10:13:50" -n 2 -o jjy.wav jjy
//! ```

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::time::{Duration, Instant};
use anyhow::{bail, Context};
use clap::Parser;
use log::{error, info};

use args::Arguments;
use clock::{Clock, ShiftedClock, SystemClock};
use player::Player;
use sink::{DeviceOpener, SinkOpener, WavOpener};

mod args;
mod cancel;
mod clock;
mod error;
mod player;
mod scheduler;
mod sink;

/// How often the main thread checks on the player.
const POLL: Duration = Duration::from_millis(200);

/// Play the signal selected by `args` until interrupted or the requested minutes have passed.
///
/// # Errors
///
/// Returns an error if the arguments are unusable, playback cannot start, or the session ends
/// on its own.
fn play(args: Arguments) -> anyhow::Result<()> {
	let clock: Arc<dyn Clock> = match args.start_time()? {
		Some(t) => {
			info!("starting clock at {}", t.to_rfc3339());
			Arc::new(ShiftedClock::starting_at(t))
		},
		None => Arc::new(SystemClock::new(args.zone))
	};
	let opener: Arc<dyn SinkOpener> = match &args.wav {
		Some(path) => {
			info!("writing {}", path.display());
			Arc::new(WavOpener::new(path))
		},
		None => Arc::new(DeviceOpener::new(args.buffer()))
	};

	let (tx, rx) = channel();
	ctrlc::set_handler(move || _ = tx.send(())).context("failed to install Ctrl-C handler")?;

	let player = Player::new(args.player_config(), clock, opener);
	player.start(args.signal).with_context(|| format!("failed to start {}", args.signal))?;

	let deadline = args.minutes.map(|n| Instant::now() + Duration::from_secs(n * 60));
	loop {
		match rx.recv_timeout(POLL) {
			Ok(()) | Err(RecvTimeoutError::Disconnected) => {
				info!("interrupted");
				break;
			},
			Err(RecvTimeoutError::Timeout) => ()
		}
		if !player.is_running() {
			bail!("{} playback stopped unexpectedly", args.signal);
		}
		if deadline.is_some_and(|d| Instant::now() >= d) {
			break;
		}
	}

	player.stop();
	Ok(())
}

/// Main program entry point.
///
/// Parses input arguments and plays time signal audio output. See [`crate`] documentation for
/// details.
fn main() -> ExitCode {
	let args = Arguments::parse();
	env_logger::Builder::new()
		.filter_level(args.verbose.log_level_filter())
		.parse_default_env()
		.init();

	match play(args) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			error!("{:#}", e);
			ExitCode::FAILURE
		}
	}
}
