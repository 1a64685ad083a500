use std::time::Duration;

use thiserror::Error;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long each side of a relay may wait on the network. Computed once at
/// startup and handed out by value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
	pub server_read: Duration,
	pub server_write: Duration,
	pub client_connect: Duration,
	pub client_read: Duration,
	pub client_write: Duration,
}

impl Timeouts {
	pub fn new(
		server_read: Duration,
		server_write: Duration,
		client_connect: Duration,
		client_read: Duration,
		client_write: Duration,
	) -> Result<Self, TimeoutError> {
		let named = [
			("server read", server_read),
			("server write", server_write),
			("client connect", client_connect),
			("client read", client_read),
			("client write", client_write),
		];

		for (name, duration) in named {
			if duration.is_zero() {
				return Err(TimeoutError::NotPositive(name));
			}
		}

		Ok(Self {
			server_read,
			server_write,
			client_connect,
			client_read,
			client_write,
		})
	}
}

impl Default for Timeouts {
	fn default() -> Self {
		Self {
			server_read: DEFAULT_TIMEOUT,
			server_write: DEFAULT_TIMEOUT,
			client_connect: DEFAULT_TIMEOUT,
			client_read: DEFAULT_TIMEOUT,
			client_write: DEFAULT_TIMEOUT,
		}
	}
}

/// Parses a human readable duration like `30s` or `1m 30s`. Zero is refused.
pub fn parse_timeout(name: &'static str, raw: &str) -> Result<Duration, TimeoutError> {
	let duration = humantime::parse_duration(raw.trim()).map_err(|err| TimeoutError::Invalid {
		name,
		raw: raw.to_owned(),
		source: err,
	})?;

	if duration.is_zero() {
		Err(TimeoutError::NotPositive(name))
	} else {
		Ok(duration)
	}
}

#[derive(Debug, Error)]
pub enum TimeoutError {
	#[error("the {0} timeout must be greater than zero")]
	NotPositive(&'static str),
	#[error("the {name} timeout '{raw}' is not a duration")]
	Invalid {
		name: &'static str,
		raw: String,
		source: humantime::DurationError,
	},
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn defaults_are_thirty_seconds() {
		let timeouts = Timeouts::default();

		assert_eq!(timeouts.server_read, Duration::from_secs(30));
		assert_eq!(timeouts.client_connect, Duration::from_secs(30));
		assert_eq!(timeouts.client_write, Duration::from_secs(30));
	}

	#[test]
	fn zero_is_refused() {
		let second = Duration::from_secs(1);

		assert!(matches!(
			Timeouts::new(second, second, Duration::ZERO, second, second),
			Err(TimeoutError::NotPositive("client connect"))
		));
		assert!(Timeouts::new(second, second, second, second, second).is_ok());
	}

	#[test]
	fn parse_human_durations() {
		assert_eq!(parse_timeout("read", "30s").unwrap(), Duration::from_secs(30));
		assert_eq!(parse_timeout("read", "1m 30s").unwrap(), Duration::from_secs(90));
		assert_eq!(parse_timeout("read", " 250ms ").unwrap(), Duration::from_millis(250));
	}

	#[test]
	fn parse_refuses_garbage_and_zero() {
		assert!(matches!(
			parse_timeout("read", "soon"),
			Err(TimeoutError::Invalid { .. })
		));
		assert!(matches!(
			parse_timeout("write", "0s"),
			Err(TimeoutError::NotPositive("write"))
		));
		assert!(parse_timeout("write", "-5s").is_err());
	}
}
