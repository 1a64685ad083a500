use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
	net::{dns::DnsError, BoxedStream, Connection},
	smtp::{
		args::{Domain, ForwardPath, Path, ReversePath},
		Client, ClientError,
	},
};

use super::{pipe::PipeReader, MessageId, Relay};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
	Idle,
	Connecting,
	Connected,
	MailSent,
	RcptSent,
	DataOpen,
	DataClosed,
	Completed,
	Failed,
}

/// The upstream half of a relay: one SMTP session to whoever handles the
/// forward target's domain.
pub struct ForwardClient {
	id: MessageId,
	client: Option<Client>,
	from: ReversePath,
	target: Path,
	phase: Phase,
}

impl ForwardClient {
	pub fn new(id: MessageId, from: ReversePath, target: Path) -> Self {
		Self {
			id,
			client: None,
			from,
			target,
			phase: Phase::Idle,
		}
	}

	/// Finds the target's mail exchangers, connects to the first that
	/// answers and gets as far as an accepted RCPT.
	pub async fn start(&mut self, relay: &Relay) -> Result<(), ForwardError> {
		let result = self.establish(relay).await;

		if let Err(err) = &result {
			error!(id = %self.id, target = %self.target, "could not start the upstream session: {err}");
			self.set_phase(Phase::Failed);
		}

		result
	}

	pub fn phase(&self) -> Phase {
		self.phase
	}

	async fn establish(&mut self, relay: &Relay) -> Result<(), ForwardError> {
		let hosts = match &self.target.domain {
			Domain::Literal(ip) => vec![ip.to_string()],
			Domain::FQDN(name) => relay.resolver.mail_exchangers(name).await?,
		};
		debug!(id = %self.id, ?hosts, "resolved {}", self.target.domain);

		self.set_phase(Phase::Connecting);
		let stream = connect(relay, &self.id, &hosts)
			.await
			.ok_or_else(|| ForwardError::NoRoute(self.target.domain.to_string()))?;
		self.set_phase(Phase::Connected);

		let timeouts = relay.timeouts;
		let connection = Connection::new(stream, timeouts.client_read, timeouts.client_write)
			.map_err(|_| ForwardError::DeadlineUpdateFailed)?;

		let mut client = Client::initiate(connection, &relay.helo)
			.await
			.map_err(ForwardError::Session)?;

		if client.supports("STARTTLS") {
			debug!(id = %self.id, "upstream offers STARTTLS, continuing in plaintext");
		}

		refresh(&mut client)?;
		client
			.mail(&self.from)
			.await
			.map_err(ForwardError::EnvelopeRejected)?;
		self.set_phase(Phase::MailSent);

		refresh(&mut client)?;
		client
			.rcpt(&ForwardPath::Regular(self.target.clone()))
			.await
			.map_err(ForwardError::EnvelopeRejected)?;
		self.set_phase(Phase::RcptSent);

		self.client = Some(client);
		Ok(())
	}

	/// Opens DATA and copies lines from the pipe until the producer finishes,
	/// then ends the message and quits. Readiness and completion are
	/// signalled back through the pipe.
	pub async fn stream_data(&mut self, mut reader: PipeReader) -> Result<(), ForwardError> {
		let result = self.transfer(&mut reader).await;

		if let Err(err) = &result {
			error!(id = %self.id, target = %self.target, "relay failed: {err}");
			self.set_phase(Phase::Failed);

			// Only one of these is still being waited on
			reader.signal_ready(false);
			reader.signal_complete(false);
		}

		result
	}

	async fn transfer(&mut self, reader: &mut PipeReader) -> Result<(), ForwardError> {
		let mut client = self
			.client
			.take()
			.ok_or(ForwardError::Session(ClientError::ConnectionClosed))?;

		refresh(&mut client)?;
		let mut writer = client
			.data()
			.await
			.map_err(|err| ForwardError::DataTransferFailed(err.to_string()))?;

		reader.signal_ready(true);
		self.set_phase(Phase::DataOpen);

		while let Some(line) = reader
			.next_line()
			.await
			.map_err(|err| ForwardError::DataTransferFailed(err.to_string()))?
		{
			writer
				.refresh_deadlines()
				.map_err(|_| ForwardError::DeadlineUpdateFailed)?;

			if let Err(err) = writer.write(&line).await {
				warn!(id = %self.id, "failed to write a line upstream: {err}");
			}
		}

		self.set_phase(Phase::DataClosed);
		writer
			.refresh_deadlines()
			.map_err(|_| ForwardError::DeadlineUpdateFailed)?;

		let reply = writer
			.close()
			.await
			.map_err(|err| ForwardError::DataTransferFailed(err.to_string()))?;
		info!(id = %self.id, target = %self.target, "upstream accepted the message: {reply}");
		reader.signal_complete(true);

		refresh(&mut client)?;
		if let Err(err) = client.quit().await {
			warn!(id = %self.id, "QUIT failed: {err}");
		}

		self.set_phase(Phase::Completed);
		Ok(())
	}

	fn set_phase(&mut self, phase: Phase) {
		debug!(id = %self.id, "{:?} -> {:?}", self.phase, phase);
		self.phase = phase;
	}
}

/// Tries each host in order. The first to accept wins, the ones that failed
/// are not tried again.
async fn connect(relay: &Relay, id: &MessageId, hosts: &[String]) -> Option<BoxedStream> {
	for host in hosts {
		debug!(%id, host, port = relay.port, "connecting");

		match relay
			.connector
			.connect(host, relay.port, relay.timeouts.client_connect)
			.await
		{
			Ok(stream) => {
				info!(%id, host, "connected upstream");
				return Some(stream);
			}
			Err(err) => warn!(%id, host, "connection failed: {err}"),
		}
	}

	None
}

fn refresh(client: &mut Client) -> Result<(), ForwardError> {
	client
		.refresh_deadlines()
		.map_err(|_| ForwardError::DeadlineUpdateFailed)
}

#[derive(Debug, Error)]
pub enum ForwardError {
	#[error("could not resolve the destination: {0}")]
	Resolution(#[from] DnsError),
	#[error("no mail exchanger for {0} accepted a connection")]
	NoRoute(String),
	#[error("could not open the session: {0}")]
	Session(ClientError),
	#[error("the envelope was rejected: {0}")]
	EnvelopeRejected(ClientError),
	#[error("could not compute a new deadline")]
	DeadlineUpdateFailed,
	#[error("the data transfer failed: {0}")]
	DataTransferFailed(String),
}
