use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::smtp::{
	args::{ForwardPath, Path, ReversePath},
	BasicEnvelope, Envelope, Peer, Response, ResponseCode,
};

use super::{
	forward::ForwardClient,
	pipe::{self, Completion, DataPipe, Readiness},
	trace::{self, TraceHeader},
	MessageId, Relay,
};

/// One inbound message on its way upstream.
pub struct RelayEnvelope {
	relay: Relay,
	basic: BasicEnvelope,
	peer: Peer,
	client_hostname: String,
	id: MessageId,
	recipient: Option<Path>,
	forward: Option<ForwardClient>,
	pipe: Option<DataPipe>,
}

impl RelayEnvelope {
	pub fn new(
		relay: Relay,
		peer: Peer,
		reverse_path: ReversePath,
		client_hostname: String,
		id: MessageId,
	) -> Self {
		Self {
			relay,
			basic: BasicEnvelope::new(reverse_path),
			peer,
			client_hostname,
			id,
			recipient: None,
			forward: None,
			pipe: None,
		}
	}

	fn trace_header(&self, recipient: &Path) -> String {
		TraceHeader {
			client_hostname: &self.client_hostname,
			remote: self.peer.remote,
			server_hostname: self.relay.hostname(),
			local: self.peer.local.ip(),
			id: &self.id,
			recipient,
		}
		.render(trace::now(self.relay.offset))
	}

	fn relaying_denied() -> Response {
		Response::with_message(ResponseCode::ServiceNotAvailable, "Relaying denied")
	}

	fn temporarily_unavailable(message: &str) -> Response {
		Response::from_code(441, message)
			.unwrap_or_else(|| Response::with_message(ResponseCode::ServiceNotAvailable, message))
	}

	fn data_refused() -> Response {
		Response::with_message(
			ResponseCode::ServiceNotAvailable,
			"Remote server did not accept data",
		)
	}
}

#[async_trait]
impl Envelope for RelayEnvelope {
	async fn add_recipient(&mut self, recipient: ForwardPath) -> Result<(), Response> {
		if !self.basic.forward_paths.is_empty() {
			return Err(Response::with_message(
				ResponseCode::InsufficientStorage,
				"Too many recipients",
			));
		}

		let (path, target) = match (&recipient, self.relay.policy.lookup(&recipient)) {
			(ForwardPath::Regular(path), Some(target)) => (path.clone(), target.clone()),
			_ => {
				warn!(id = %self.id, %recipient, "relaying denied");
				return Err(Self::relaying_denied());
			}
		};

		info!(id = %self.id, recipient = %path, %target, "forwarding");

		let mut forward =
			ForwardClient::new(self.id.clone(), self.basic.reverse_path.clone(), target);

		match forward.start(&self.relay).await {
			Ok(()) => {
				self.forward = Some(forward);
				self.recipient = Some(path);
				self.basic.forward_paths.push(recipient);

				Ok(())
			}
			Err(_) => Err(Self::temporarily_unavailable(
				"remote server is currently unavailable. Try again later",
			)),
		}
	}

	async fn begin_data(&mut self) -> Result<(), Response> {
		let not_ready = || {
			Self::temporarily_unavailable(
				"Remote server did not accept data transmission. Try again later",
			)
		};

		let (Some(mut forward), Some(recipient)) = (self.forward.take(), self.recipient.clone()) else {
			return Err(not_ready());
		};

		let (mut pipe, reader) = pipe::channel();
		pipe.attach(tokio::spawn(async move {
			// Failures are logged where they happen and reported through the pipe
			let _ = forward.stream_data(reader).await;
		}));

		if pipe.ready().await != Readiness::Ready {
			warn!(id = %self.id, "upstream refused DATA");
			return Err(not_ready());
		}

		if pipe.push(self.trace_header(&recipient)).await.is_err() {
			return Err(not_ready());
		}

		debug!(id = %self.id, "receiving data");
		self.pipe = Some(pipe);
		Ok(())
	}

	async fn write(&mut self, line: &str) -> Result<(), Response> {
		let Some(pipe) = self.pipe.as_mut() else {
			return Err(Self::data_refused());
		};

		pipe.push(line.to_owned()).await.map_err(|err| {
			warn!(id = %self.id, "dropping data: {err}");
			Self::data_refused()
		})
	}

	async fn close(&mut self) -> Response {
		let Some(mut pipe) = self.pipe.take() else {
			return Self::data_refused();
		};

		// TODO: check the inbound connection is still open before ending the
		// upstream DATA. A client that left mid-transfer retries, and the
		// message is delivered twice.
		match pipe.finish().await {
			Completion::Succeeded => {
				info!(id = %self.id, "relayed");
				Response::with_message(
					ResponseCode::Okay,
					"Message relayed to remote server successfully",
				)
			}
			completion => {
				warn!(id = %self.id, ?completion, "relay did not complete");
				Self::data_refused()
			}
		}
	}
}
