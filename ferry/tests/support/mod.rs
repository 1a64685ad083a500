#![allow(dead_code)] // not every test uses every helper

use std::{
	collections::HashMap,
	io,
	net::IpAddr,
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};

use async_trait::async_trait;
use ferry::{
	config::Timeouts,
	net::{
		dns::{DnsError, Resolver},
		BoxedStream, Connection, ConnectionError, Connector,
	},
	policy::RelayPolicy,
	relay::Relay,
	smtp::{Peer, Response, Server},
};

/// Answers MX queries from a table and counts them.
#[derive(Default)]
pub struct FakeResolver {
	exchangers: HashMap<String, Vec<String>>,
	reverse: HashMap<IpAddr, String>,
	mx_queries: AtomicUsize,
}

impl FakeResolver {
	pub fn with_exchangers(mut self, domain: &str, hosts: &[&str]) -> Self {
		self.exchangers.insert(
			domain.to_owned(),
			hosts.iter().map(|host| host.to_string()).collect(),
		);
		self
	}

	pub fn with_reverse(mut self, ip: &str, name: &str) -> Self {
		self.reverse.insert(ip.parse().unwrap(), name.to_owned());
		self
	}

	pub fn mx_queries(&self) -> usize {
		self.mx_queries.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl Resolver for FakeResolver {
	async fn reverse_lookup(&self, ip: IpAddr) -> Result<String, DnsError> {
		self.reverse
			.get(&ip)
			.cloned()
			.ok_or(DnsError::NoReverseRecord(ip))
	}

	async fn mail_exchangers(&self, domain: &str) -> Result<Vec<String>, DnsError> {
		self.mx_queries.fetch_add(1, Ordering::SeqCst);

		self.exchangers
			.get(domain)
			.cloned()
			.ok_or_else(|| DnsError::ResolutionFailed {
				domain: domain.to_owned(),
				reason: String::from("NXDOMAIN"),
			})
	}
}

/// How a fake upstream answers the commands that can fail.
#[derive(Clone)]
pub struct Upstream {
	pub rcpt: &'static str,
	pub data: &'static str,
	pub end_of_data: &'static str,
	pub received: Arc<Mutex<Vec<String>>>,
}

impl Default for Upstream {
	fn default() -> Self {
		Self {
			rcpt: "250 ok\r\n",
			data: "354 go ahead\r\n",
			end_of_data: "250 queued as 1234\r\n",
			received: Default::default(),
		}
	}
}

impl Upstream {
	pub fn received(&self) -> Vec<String> {
		self.received.lock().unwrap().clone()
	}

	async fn serve(self, mut conn: Connection) {
		let mut in_data = false;

		conn.write_all(b"220 upstream.example ESMTP\r\n").await.unwrap();

		while let Ok(Some(line)) = conn.read_line().await {
			self.received.lock().unwrap().push(line.clone());

			if in_data {
				if line == ".\r\n" {
					in_data = false;
					conn.write_all(self.end_of_data.as_bytes()).await.unwrap();
				}
				continue;
			}

			let verb = line.get(..4).unwrap_or_default().to_ascii_uppercase();
			let reply = match verb.as_str() {
				"EHLO" => "250-upstream.example\r\n250-STARTTLS\r\n250 8BITMIME\r\n",
				"MAIL" => "250 ok\r\n",
				"RCPT" => self.rcpt,
				"DATA" => {
					in_data = self.data.starts_with("354");
					self.data
				}
				"QUIT" => {
					conn.write_all(b"221 bye\r\n").await.unwrap();
					return;
				}
				_ => "500 what\r\n",
			};

			conn.write_all(reply.as_bytes()).await.unwrap();
		}
	}
}

/// Hands out in-memory connections to the hosts it knows and refuses the
/// rest. Every attempt is recorded.
#[derive(Default)]
pub struct FakeConnector {
	upstreams: HashMap<String, Upstream>,
	attempts: Mutex<Vec<(String, u16)>>,
}

impl FakeConnector {
	pub fn with_upstream(mut self, host: &str, upstream: Upstream) -> Self {
		self.upstreams.insert(host.to_owned(), upstream);
		self
	}

	pub fn attempts(&self) -> Vec<String> {
		self.attempts
			.lock()
			.unwrap()
			.iter()
			.map(|(host, _)| host.clone())
			.collect()
	}

	pub fn ports(&self) -> Vec<u16> {
		self.attempts.lock().unwrap().iter().map(|(_, port)| *port).collect()
	}
}

#[async_trait]
impl Connector for FakeConnector {
	async fn connect(
		&self,
		host: &str,
		port: u16,
		_limit: Duration,
	) -> Result<BoxedStream, ConnectionError> {
		self.attempts.lock().unwrap().push((host.to_owned(), port));

		let upstream = self.upstreams.get(host).cloned().ok_or_else(|| {
			ConnectionError::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
		})?;

		let (ours, theirs) = tokio::io::duplex(4096);
		let limit = Duration::from_secs(5);
		let theirs = Connection::new(Box::new(theirs), limit, limit)?;
		tokio::spawn(upstream.serve(theirs));

		Ok(Box::new(ours))
	}
}

pub fn policy() -> RelayPolicy {
	RelayPolicy::from_forwards([
		("alice@example.net", vec!["alice@relay.local", "a.smith@relay.local"]),
		("bob@[192.0.2.7]", vec!["bob@relay.local"]),
	])
	.unwrap()
}

pub fn peer() -> Peer {
	Peer {
		remote: "203.0.113.5:51000".parse().unwrap(),
		local: "10.0.0.1:25".parse().unwrap(),
	}
}

pub fn relay(resolver: Arc<FakeResolver>, connector: Arc<FakeConnector>) -> Relay {
	let second = Duration::from_secs(5);
	let timeouts = Timeouts::new(second, second, second, second, second).unwrap();

	Relay::new("relay.local", policy(), timeouts, resolver, connector).unwrap()
}

/// A session that has greeted and given a sender, ready for RCPT.
pub async fn session(relay: Relay) -> Server {
	let (mut server, greeting) = Server::initiate(Arc::new(relay), peer()).await;
	assert_eq!(greeting.code.as_code(), 220);

	assert_eq!(say(&mut server, "EHLO client.example\r\n").await.code.as_code(), 250);
	assert_eq!(
		say(&mut server, "MAIL FROM:<sender@example.org>\r\n").await.code.as_code(),
		250
	);

	server
}

pub async fn say(server: &mut Server, line: &str) -> Response {
	server
		.push(line)
		.await
		.unwrap_or_else(|| panic!("no reply to {line:?}"))
}
