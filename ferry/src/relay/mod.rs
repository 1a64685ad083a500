use std::sync::Arc;

use async_trait::async_trait;
use time::UtcOffset;
use tracing::{info, warn};

use crate::{
	config::Timeouts,
	net::{dns::Resolver, Connector, SMTP_PORT},
	policy::RelayPolicy,
	smtp::{
		args::{Domain, ParseDomainError, ReversePath},
		Envelope, Handler, Peer, Response,
	},
};

mod envelope;
mod forward;
mod id;
pub mod pipe;
mod trace;

pub use envelope::RelayEnvelope;
pub use forward::{ForwardClient, ForwardError, Phase};
pub use id::MessageId;
pub use trace::TraceHeader;

/// Everything a relay needs, shared by every connection it serves.
#[derive(Clone)]
pub struct Relay {
	hostname: Arc<str>,
	helo: Domain,
	policy: Arc<RelayPolicy>,
	timeouts: Timeouts,
	resolver: Arc<dyn Resolver>,
	connector: Arc<dyn Connector>,
	port: u16,
	offset: UtcOffset,
}

impl Relay {
	/// `hostname` is what we call ourselves, both to clients and upstream,
	/// so it has to be a valid domain.
	pub fn new(
		hostname: &str,
		policy: RelayPolicy,
		timeouts: Timeouts,
		resolver: Arc<dyn Resolver>,
		connector: Arc<dyn Connector>,
	) -> Result<Self, ParseDomainError> {
		Ok(Self {
			hostname: Arc::from(hostname),
			helo: hostname.parse()?,
			policy: Arc::new(policy),
			timeouts,
			resolver,
			connector,
			port: SMTP_PORT,
			offset: UtcOffset::UTC,
		})
	}

	/// Connect upstream on `port` instead of 25
	pub fn with_port(mut self, port: u16) -> Self {
		self.port = port;
		self
	}

	/// Stamp trace headers at `offset` instead of UTC
	pub fn with_offset(mut self, offset: UtcOffset) -> Self {
		self.offset = offset;
		self
	}

	pub fn hostname(&self) -> &str {
		&self.hostname
	}
}

#[async_trait]
impl Handler for Relay {
	fn primary_host(&self) -> &str {
		&self.hostname
	}

	async fn on_new_connection(&self, peer: &Peer) -> Result<(), Response> {
		info!(local = %peer.local, remote = %peer.remote, "new connection");
		Ok(())
	}

	async fn on_new_mail(
		&self,
		peer: &Peer,
		reverse_path: ReversePath,
	) -> Result<Box<dyn Envelope>, Response> {
		let id = MessageId::generate();
		info!(%id, from = %reverse_path, "new mail");

		let client_hostname = match self.resolver.reverse_lookup(peer.remote.ip()).await {
			Ok(hostname) => hostname,
			Err(err) => {
				warn!(%id, "reverse lookup of {} failed: {err}", peer.remote.ip());
				String::from("unknown")
			}
		};
		info!(%id, client = %client_hostname, "client hostname");

		Ok(Box::new(RelayEnvelope::new(
			self.clone(),
			*peer,
			reverse_path,
			client_hostname,
			id,
		)))
	}
}
