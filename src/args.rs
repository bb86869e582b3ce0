//! Support for command line argument parsing.
//!
//! See [crate] documentation for details on command line arguments and examples.

use std::path::PathBuf;
use std::time::Duration;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use signals::{Protocol, Shape};
use thiserror::Error;
use crate::player::PlayerConfig;

/// The error type for parsing command line arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentsError {
	/// The zone is not an IANA time zone name. The supplied name is the payload.
	#[error("unknown time zone: {0}")]
	UnknownZone(String),
	/// The start time could not be parsed. The supplied text is the payload.
	#[error("invalid start time '{0}', expected RFC 3339 or YYYY-MM-DD HH:MM:SS[.f] [+HH:MM]")]
	InvalidTime(String),
	/// The start time has no offset and does not exist in the chosen zone, e.g. it falls in a
	/// daylight saving gap.
	#[error("start time {0} does not exist in {1}")]
	NonexistentTime(NaiveDateTime, Tz)
}

/// A start time as written on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartTime {
	/// A time with an explicit UTC offset.
	Fixed(DateTime<FixedOffset>),
	/// A wall clock time in the zone given by `--zone`.
	Local(NaiveDateTime)
}

/// Parse a start time.
///
/// Accepts RFC 3339 (`2024-05-26T18:58:00+02:00`), or the same with a space separator and
/// optional fractional seconds and offset (`2024-05-26 18:58:00.5 +02:00`,
/// `2024-05-26 18:58:00`).
///
/// # Errors
///
/// Returns [`ArgumentsError::InvalidTime`] if no format matches.
pub fn parse_time(s: &str) -> Result<StartTime, ArgumentsError> {
	let s = s.trim();
	if let Ok(t) = DateTime::parse_from_rfc3339(s) {
		return Ok(StartTime::Fixed(t));
	}
	if let Ok(t) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f %:z") {
		return Ok(StartTime::Fixed(t));
	}
	NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
		.map(StartTime::Local)
		.map_err(|_| ArgumentsError::InvalidTime(s.to_string()))
}

/// Parse an IANA zone name such as `Europe/Berlin` or `UTC`.
///
/// # Errors
///
/// Returns [`ArgumentsError::UnknownZone`] for names not in the zone database.
pub fn parse_zone(s: &str) -> Result<Tz, ArgumentsError> {
	s.parse::<Tz>().map_err(|_| ArgumentsError::UnknownZone(s.to_string()))
}

/// Emulate a longwave time signal transmitter through audio output.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Arguments {
	#[command(flatten)]
	pub verbose: Verbosity<InfoLevel>,

	/// Signal to transmit: dcf77, wwvb, jjy (or jjy40, jjy60), bpc
	pub signal: Protocol,

	/// Waveform of the carrier: sine, square, triangle
	#[arg(short, long, default_value_t = Shape::Square)]
	pub shape: Shape,

	/// Carrier frequency in Hz, below half the sample rate [default: protocol dependent]
	#[arg(short = 'f', long)]
	pub carrier: Option<f64>,

	/// Modulation depth between 0 and 1 [default: protocol dependent]
	#[arg(short, long)]
	pub depth: Option<f64>,

	/// Output sample rate in Hz
	#[arg(short = 'r', long, default_value_t = 48000, value_parser = clap::value_parser!(u32).range(8000..))]
	pub sample_rate: u32,

	/// Audio device queue length in milliseconds
	#[arg(short, long, default_value_t = 250, value_parser = clap::value_parser!(u64).range(1..))]
	pub buffer_ms: u64,

	/// How early to wake before each second boundary, in milliseconds
	#[arg(short, long, default_value_t = 50, value_parser = clap::value_parser!(u64).range(0..1000))]
	pub margin_ms: u64,

	/// IANA time zone of the clock
	#[arg(short, long, default_value = "UTC", value_parser = parse_zone)]
	pub zone: Tz,

	/// Start the clock at this time instead of now
	#[arg(short, long, value_parser = parse_time)]
	pub time: Option<StartTime>,

	/// Stop after this many minutes [default: run until interrupted]
	#[arg(short = 'n', long, value_parser = clap::value_parser!(u64).range(1..))]
	pub minutes: Option<u64>,

	/// Write audio to this WAV file instead of the audio device
	#[arg(short = 'o', long)]
	pub wav: Option<PathBuf>
}

impl Arguments {
	/// Playback settings from these arguments.
	pub fn player_config(&self) -> PlayerConfig {
		PlayerConfig {
			sample_rate: self.sample_rate,
			shape: self.shape,
			carrier: self.carrier,
			depth: self.depth,
			margin: Duration::from_millis(self.margin_ms)
		}
	}

	/// Device queue length.
	pub fn buffer(&self) -> Duration {
		Duration::from_millis(self.buffer_ms)
	}

	/// The requested start time in the clock's zone, or `None` to use the current time.
	///
	/// # Errors
	///
	/// Returns [`ArgumentsError::NonexistentTime`] if a time without offset is skipped by the
	/// zone's daylight saving rules. Ambiguous times resolve to the earlier instant.
	pub fn start_time(&self) -> Result<Option<DateTime<Tz>>, ArgumentsError> {
		match self.time {
			None => Ok(None),
			Some(StartTime::Fixed(t)) => Ok(Some(t.with_timezone(&self.zone))),
			Some(StartTime::Local(t)) => self.zone.from_local_datetime(&t)
				.earliest()
				.map(Some)
				.ok_or(ArgumentsError::NonexistentTime(t, self.zone))
		}
	}
}

#[cfg(test)]
mod tests {
	use clap::CommandFactory;
	use chrono::Utc;
	use chrono_tz::{America::New_York, Europe::Berlin, UTC};
	use super::*;

	fn parse(args: &[&str]) -> Result<Arguments, clap::Error> {
		Arguments::try_parse_from(std::iter::once("longwave").chain(args.iter().copied()))
	}

	#[test]
	fn command_test() {
		Arguments::command().debug_assert();
	}

	#[test]
	fn defaults_test() {
		let args = parse(&["dcf77"]).unwrap();
		assert_eq!(args.signal, Protocol::Dcf77);
		assert_eq!(args.shape, Shape::Square);
		assert_eq!(args.carrier, None);
		assert_eq!(args.depth, None);
		assert_eq!(args.sample_rate, 48000);
		assert_eq!(args.buffer(), Duration::from_millis(250));
		assert_eq!(args.zone, UTC);
		assert_eq!(args.time, None);
		assert_eq!(args.minutes, None);
		assert_eq!(args.wav, None);
		assert_eq!(args.start_time(), Ok(None));
		assert_eq!(args.verbose.log_level_filter(), log::LevelFilter::Info);
		assert_eq!(args.player_config(), PlayerConfig::default());
	}

	#[test]
	fn options_test() {
		let args = parse(&[
			"-s", "sine", "-f", "20000", "-d", "0.5", "-r", "96000", "-b", "100", "-m", "20",
			"-z", "Europe/Berlin", "-n", "3", "-o", "out.wav", "-vv", "JJY60"
		]).unwrap();
		assert_eq!(args.signal, Protocol::Jjy);
		assert_eq!(args.shape, Shape::Sine);
		assert_eq!(args.carrier, Some(20000.0));
		assert_eq!(args.depth, Some(0.5));
		assert_eq!(args.sample_rate, 96000);
		assert_eq!(args.buffer(), Duration::from_millis(100));
		assert_eq!(args.zone, Berlin);
		assert_eq!(args.minutes, Some(3));
		assert_eq!(args.wav, Some(PathBuf::from("out.wav")));
		assert_eq!(args.verbose.log_level_filter(), log::LevelFilter::Trace);

		let config = args.player_config();
		assert_eq!(config.margin, Duration::from_millis(20));
		assert_eq!(config.carrier, Some(20000.0));
	}

	#[test]
	fn invalid_test() {
		assert!(parse(&[]).is_err());
		assert!(parse(&["msf"]).is_err());
		assert!(parse(&["-s", "sawtooth", "dcf77"]).is_err());
		assert!(parse(&["-z", "Mars/Olympus", "dcf77"]).is_err());
		assert!(parse(&["-n", "0", "dcf77"]).is_err());
		assert!(parse(&["-m", "1000", "dcf77"]).is_err());
		assert!(parse(&["-r", "4000", "dcf77"]).is_err());
		assert!(parse(&["-t", "yesterday", "dcf77"]).is_err());
	}

	#[test]
	fn parse_time_test() {
		let fixed = DateTime::parse_from_rfc3339("2024-05-26T18:58:00+02:00").unwrap();
		assert_eq!(parse_time("2024-05-26T18:58:00+02:00"), Ok(StartTime::Fixed(fixed)));
		assert_eq!(parse_time("2024-05-26 18:58:00 +02:00"), Ok(StartTime::Fixed(fixed)));
		assert_eq!(parse_time(" 2024-05-26T16:58:00Z "), Ok(StartTime::Fixed(fixed)));

		let local = NaiveDateTime::parse_from_str("2024-05-26 18:58:00.250", "%Y-%m-%d %H:%M:%S%.f").unwrap();
		assert_eq!(parse_time("2024-05-26 18:58:00.250"), Ok(StartTime::Local(local)));

		assert_eq!(parse_time("2024-05-26"), Err(ArgumentsError::InvalidTime(String::from("2024-05-26"))));
		assert_eq!(parse_time("2024-13-01 00:00:00"), Err(ArgumentsError::InvalidTime(String::from("2024-13-01 00:00:00"))));
	}

	#[test]
	fn parse_zone_test() {
		assert_eq!(parse_zone("America/New_York"), Ok(New_York));
		assert_eq!(parse_zone("UTC"), Ok(UTC));
		assert_eq!(parse_zone("Nowhere"), Err(ArgumentsError::UnknownZone(String::from("Nowhere"))));
	}

	#[test]
	fn start_time_test() {
		let utc = Utc.with_ymd_and_hms(2024, 5, 26, 16, 58, 0).unwrap();

		let args = parse(&["-z", "Europe/Berlin", "-t", "2024-05-26T16:58:00Z", "bpc"]).unwrap();
		let start = args.start_time().unwrap().unwrap();
		assert_eq!(start, utc);
		assert_eq!(start.timezone(), Berlin);

		// Without offset, read in the clock's zone
		let args = parse(&["-z", "Europe/Berlin", "-t", "2024-05-26 18:58:00", "bpc"]).unwrap();
		assert_eq!(args.start_time().unwrap().unwrap(), utc);

		// Skipped by the spring forward
		let args = parse(&["-z", "Europe/Berlin", "-t", "2024-03-31 02:30:00", "bpc"]).unwrap();
		assert!(matches!(args.start_time(), Err(ArgumentsError::NonexistentTime(_, _))));

		// Repeated hour resolves to the first pass
		let args = parse(&["-z", "Europe/Berlin", "-t", "2024-10-27 02:30:00", "bpc"]).unwrap();
		let first = Utc.with_ymd_and_hms(2024, 10, 27, 0, 30, 0).unwrap();
		assert_eq!(args.start_time().unwrap().unwrap(), first);
	}
}
