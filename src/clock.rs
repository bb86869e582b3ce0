//! Wall clock sources.
//!
//! The scheduler reads the time through [`Clock`] so that tests can drive it with a synthetic
//! clock.

use std::time::Duration;
use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use crate::cancel::CancellationToken;

/// A source of the current date and time.
pub trait Clock: Send + Sync {
	/// The current time.
	fn now(&self) -> DateTime<Tz>;

	/// Sleep for `duration`, waking early if `token` is cancelled.
	///
	/// Returns `true` if cancelled.
	fn sleep(&self, duration: Duration, token: &CancellationToken) -> bool {
		token.wait_timeout(duration)
	}
}

/// The system clock, reported in a fixed time zone.
pub struct SystemClock {
	zone: Tz
}

impl SystemClock {
	/// Create a clock reporting the system time in `zone`.
	pub fn new(zone: Tz) -> SystemClock {
		SystemClock { zone }
	}
}

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Tz> {
		Utc::now().with_timezone(&self.zone)
	}
}

/// A clock that starts at a chosen instant and then runs at real-time speed.
pub struct ShiftedClock {
	offset: TimeDelta,
	zone: Tz
}

impl ShiftedClock {
	/// Create a clock that reads `start` now, in `start`'s time zone.
	pub fn starting_at(start: DateTime<Tz>) -> ShiftedClock {
		ShiftedClock {
			offset: start.with_timezone(&Utc) - Utc::now(),
			zone: start.timezone()
		}
	}
}

impl Clock for ShiftedClock {
	fn now(&self) -> DateTime<Tz> {
		(Utc::now() + self.offset).with_timezone(&self.zone)
	}
}

#[cfg(test)]
mod tests {
	use chrono::TimeZone;
	use chrono_tz::{Asia::Tokyo, UTC};
	use super::*;

	#[test]
	fn system_test() {
		let clock = SystemClock::new(Tokyo);
		let before = Utc::now();
		let now = clock.now();
		assert_eq!(now.timezone(), Tokyo);
		assert!(now.with_timezone(&Utc) >= before);
		assert!(now.with_timezone(&Utc) - before < TimeDelta::seconds(5));
	}

	#[test]
	fn shifted_test() {
		let start = UTC.with_ymd_and_hms(2000, 1, 1, 23, 59, 30).unwrap();
		let clock = ShiftedClock::starting_at(start);
		let now = clock.now();
		assert_eq!(now.timezone(), UTC);
		assert!(now >= start);
		assert!(now - start < TimeDelta::seconds(5));

		// Sleeping runs in real time
		let token = CancellationToken::new();
		assert!(!clock.sleep(Duration::from_millis(30), &token));
		assert!(clock.now() - now >= TimeDelta::milliseconds(30));

		token.cancel();
		assert!(clock.sleep(Duration::from_secs(10), &token));
	}
}
