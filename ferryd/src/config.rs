use std::{
	net::{IpAddr, SocketAddr},
	time::Duration,
};

use confindent::{Confindent, Value};
use ferry::{
	config::{parse_timeout, TimeoutError, Timeouts},
	policy::{PolicyError, RelayPolicy},
	smtp::args::Domain,
};
use getopts::Options;
use thiserror::Error;
use tracing::warn;

const DEFAULT_CONFIG: &str = "/etc/ferry/ferry.conf";
const FALLBACK_CONFIG: &str = "ferry.conf";

pub struct Config {
	pub address: IpAddr,
	pub port: u16,
	pub hostname: String,
	pub policy: RelayPolicy,
	pub timeouts: Timeouts,
}

impl Config {
	fn print_usage<S: AsRef<str>>(prgm: S, opts: &Options) {
		let brief = format!("Usage: {} [options]", prgm.as_ref());
		println!("{}", opts.usage(&brief));
	}

	pub fn socket_address(&self) -> SocketAddr {
		SocketAddr::new(self.address, self.port)
	}

	/// Reads the command line and the config file it points at. `None` means
	/// there's nothing to run, like when help was asked for.
	pub fn get() -> Result<Option<Self>, ConfigError> {
		let args: Vec<String> = std::env::args().collect();

		let mut opts = Options::new();
		opts.optflag("h", "help", "Print this help message");
		opts.optopt(
			"l",
			"listen-address",
			"The IP address ferry will listen for incoming connections on\nDefault: 0.0.0.0",
			"IP_ADDR",
		);
		opts.optopt(
			"p",
			"port",
			"The port ferry will listen on\nDefault: 25",
			"PORT",
		);
		opts.optopt(
			"c",
			"config",
			"An alternate location to read the config from\nDefault: /etc/ferry/ferry.conf",
			"PATH",
		);

		let matches = opts.parse(args.get(1..).unwrap_or_default())?;

		if matches.opt_present("help") {
			Self::print_usage(args.first().map(String::as_str).unwrap_or("ferryd"), &opts);
			return Ok(None);
		}

		let config = match matches.opt_str("config") {
			Some(path) => read(&path)?,
			None => read(DEFAULT_CONFIG).or_else(|_| read(FALLBACK_CONFIG))?,
		};

		Self::load(
			&config,
			matches.opt_str("listen-address"),
			matches.opt_str("port"),
		)
		.map(Some)
	}

	/// Builds the config from a parsed file. Options given on the command
	/// line take priority over the file.
	pub fn load(
		config: &Confindent,
		listen_address: Option<String>,
		port: Option<String>,
	) -> Result<Self, ConfigError> {
		let find_value = |cli_value: Option<String>, conf_key: &str, default: &str| -> String {
			cli_value
				.or_else(|| config.child_owned(conf_key))
				.unwrap_or_else(|| default.into())
		};

		let address_string = find_value(listen_address, "ListenAddress", "0.0.0.0");
		let address = address_string
			.trim()
			.parse()
			.map_err(|_| ConfigError::InvalidAddress(address_string.clone()))?;

		let port_string = find_value(port, "ListenPort", "25");
		let port = port_string
			.trim()
			.parse()
			.map_err(|_| ConfigError::InvalidPort(port_string.clone()))?;

		let hostname = match config.child_owned("Hostname") {
			Some(hostname) => hostname,
			None => system_hostname(),
		};
		if hostname.parse::<Domain>().is_err() {
			return Err(ConfigError::InvalidHostname(hostname));
		}

		let forwards = config
			.children("Forward")
			.into_iter()
			.map(|forward| {
				let target = forward.value().ok_or(ConfigError::ForwardWithoutTarget)?;
				let sources: Vec<&str> = forward
					.children("Source")
					.into_iter()
					.filter_map(Value::value)
					.collect();

				Ok((target, sources))
			})
			.collect::<Result<Vec<_>, ConfigError>>()?;
		let policy = RelayPolicy::from_forwards(forwards)?;

		let timeouts = Self::timeouts(config)?;

		Ok(Self {
			address,
			port,
			hostname,
			policy,
			timeouts,
		})
	}

	fn timeouts(config: &Confindent) -> Result<Timeouts, ConfigError> {
		let defaults = Timeouts::default();
		let server = config.child("ServerTimeouts");
		let client = config.child("ClientTimeouts");

		Ok(Timeouts::new(
			section_timeout(server, "Read", "server read", defaults.server_read)?,
			section_timeout(server, "Write", "server write", defaults.server_write)?,
			section_timeout(client, "Connect", "client connect", defaults.client_connect)?,
			section_timeout(client, "Read", "client read", defaults.client_read)?,
			section_timeout(client, "Write", "client write", defaults.client_write)?,
		)?)
	}
}

fn read(path: &str) -> Result<Confindent, ConfigError> {
	Confindent::from_file(path).map_err(|err| ConfigError::Read {
		path: path.to_owned(),
		reason: err.to_string(),
	})
}

fn section_timeout(
	section: Option<&Value>,
	key: &str,
	name: &'static str,
	default: Duration,
) -> Result<Duration, TimeoutError> {
	match section.and_then(|section| section.child_value(key)) {
		Some(raw) => parse_timeout(name, raw),
		None => Ok(default),
	}
}

fn system_hostname() -> String {
	match gethostname::gethostname().into_string() {
		Ok(hostname) if !hostname.is_empty() => hostname,
		_ => {
			warn!("could not get the system hostname and none was configured, using localhost");
			String::from("localhost")
		}
	}
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("{0}")]
	Arguments(#[from] getopts::Fail),
	#[error("failed to read {path}: {reason}")]
	Read { path: String, reason: String },
	#[error("failed to parse '{0}' as an IP address")]
	InvalidAddress(String),
	#[error("failed to parse '{0}' as a port")]
	InvalidPort(String),
	#[error("'{0}' is not a usable hostname")]
	InvalidHostname(String),
	#[error("a Forward is missing its target address")]
	ForwardWithoutTarget,
	#[error("bad forward map: {0}")]
	Policy(#[from] PolicyError),
	#[error("bad timeout: {0}")]
	Timeout(#[from] TimeoutError),
}

#[cfg(test)]
mod test {
	use ferry::smtp::args::{ForwardPath, Path};

	use super::*;

	const FULL: &str = "Hostname relay.example.com\n\
		ListenAddress 127.0.0.1\n\
		ListenPort 2525\n\
		\n\
		Forward alice@example.net\n\
		\tSource alice@relay.example.com\n\
		\tSource a.smith@relay.example.com\n\
		\n\
		ServerTimeouts\n\
		\tRead 10s\n\
		\tWrite 1m 30s\n\
		\n\
		ClientTimeouts\n\
		\tConnect 5s\n";

	fn parse(raw: &str) -> Confindent {
		raw.parse().unwrap()
	}

	fn recipient(mailbox: &str) -> ForwardPath {
		ForwardPath::Regular(Path::from_mailbox(mailbox).unwrap())
	}

	#[test]
	fn full_file() {
		let config = Config::load(&parse(FULL), None, None).unwrap();

		assert_eq!(config.socket_address(), "127.0.0.1:2525".parse().unwrap());
		assert_eq!(config.hostname, "relay.example.com");

		assert_eq!(
			config
				.policy
				.lookup(&recipient("a.smith@relay.example.com"))
				.unwrap()
				.mailbox(),
			"alice@example.net"
		);

		assert_eq!(config.timeouts.server_read, Duration::from_secs(10));
		assert_eq!(config.timeouts.server_write, Duration::from_secs(90));
		assert_eq!(config.timeouts.client_connect, Duration::from_secs(5));
		assert_eq!(config.timeouts.client_read, Duration::from_secs(30));
	}

	#[test]
	fn command_line_wins() {
		let config =
			Config::load(&parse(FULL), Some("::1".into()), Some("25".into())).unwrap();

		assert_eq!(config.socket_address(), "[::1]:25".parse().unwrap());
	}

	#[test]
	fn defaults() {
		let config = Config::load(
			&parse("Hostname relay.local\nForward a@example.net\n\tSource a@relay.local\n"),
			None,
			None,
		)
		.unwrap();

		assert_eq!(config.socket_address(), "0.0.0.0:25".parse().unwrap());
		assert_eq!(config.timeouts, Timeouts::default());
	}

	#[test]
	fn startup_errors() {
		let forward = "Hostname relay.local\nForward a@example.net\n\tSource a@relay.local\n";

		assert!(matches!(
			Config::load(&parse("Hostname relay.local\n"), None, None),
			Err(ConfigError::Policy(PolicyError::NoForwards))
		));
		assert!(matches!(
			Config::load(&parse(forward), Some("localhost".into()), None),
			Err(ConfigError::InvalidAddress(_))
		));
		assert!(matches!(
			Config::load(&parse(forward), None, Some("65536".into())),
			Err(ConfigError::InvalidPort(_))
		));
		assert!(matches!(
			Config::load(&parse(&format!("{forward}ClientTimeouts\n\tRead 0s\n")), None, None),
			Err(ConfigError::Timeout(TimeoutError::NotPositive("client read")))
		));
		assert!(matches!(
			Config::load(&parse(&format!("{forward}ServerTimeouts\n\tWrite soon\n")), None, None),
			Err(ConfigError::Timeout(TimeoutError::Invalid { .. }))
		));
		assert!(matches!(
			Config::load(
				&parse("Hostname not_a_host\nForward a@example.net\n\tSource a@relay.local\n"),
				None,
				None
			),
			Err(ConfigError::InvalidHostname(_))
		));
	}
}
