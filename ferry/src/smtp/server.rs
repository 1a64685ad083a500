use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use tracing::debug;

use super::{
	args::{Domain, ForwardPath, ReversePath},
	command::ParseCommandError,
	Command, Envelope, Response, ResponseCode,
};

/// Both ends of an inbound connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Peer {
	pub remote: SocketAddr,
	pub local: SocketAddr,
}

/// What the server asks about as a session goes along. An `Err` is sent to
/// the client as is.
#[async_trait]
pub trait Handler: Send + Sync {
	/// The hostname the server presents itself as
	fn primary_host(&self) -> &str;

	async fn on_new_connection(&self, peer: &Peer) -> Result<(), Response>;

	async fn on_new_mail(
		&self,
		peer: &Peer,
		reverse_path: ReversePath,
	) -> Result<Box<dyn Envelope>, Response>;
}

pub struct Server {
	handler: Arc<dyn Handler>,
	peer: Peer,
	state: State,
	command: String,
	envelope: Option<Box<dyn Envelope>>,
	/// Set when the envelope refused a data line. The rest of the data is
	/// read and dropped, then this is the reply to the dot.
	data_error: Option<Response>,
}

impl Server {
	pub async fn initiate(handler: Arc<dyn Handler>, peer: Peer) -> (Self, Response) {
		let mut server = Self {
			handler,
			peer,
			state: State::default(),
			command: String::new(),
			envelope: None,
			data_error: None,
		};

		let greeting = match server.handler.on_new_connection(&peer).await {
			Ok(()) => Response::with_message(
				ResponseCode::ServiceReady,
				format!("{} (ferry) ready", server.handler.primary_host()),
			),
			Err(response) => {
				server.state = State::Exit;
				response
			}
		};

		(server, greeting)
	}

	/// Feeds the server some input. Once it has a whole line it returns the
	/// reply to send, if that line warrants one.
	pub async fn push(&mut self, input: &str) -> Option<Response> {
		self.command.push_str(input);

		// Return early if it's not a line
		if !self.command.ends_with('\n') {
			return None;
		}

		let line = std::mem::take(&mut self.command);

		if self.state == State::LoadingData {
			self.loading_data(&line).await
		} else {
			Some(self.run_command(line.trim_end()).await)
		}
	}

	pub fn should_exit(&self) -> bool {
		self.state == State::Exit
	}

	/// Ends the session from our side, dropping any transaction in progress.
	pub fn shutdown(&mut self) -> Response {
		self.reset_transaction();
		self.state = State::Exit;

		Response::with_message(
			ResponseCode::ServiceNotAvailable,
			format!(
				"{} Service not available, closing transmission channel",
				self.handler.primary_host()
			),
		)
	}

	async fn loading_data(&mut self, line: &str) -> Option<Response> {
		if line.trim_end_matches(['\r', '\n']) == "." {
			return Some(self.got_data().await);
		}

		if self.data_error.is_some() {
			return None;
		}

		let unstuffed = line.strip_prefix('.').unwrap_or(line);

		if let Some(envelope) = self.envelope.as_mut() {
			if let Err(response) = envelope.write(unstuffed).await {
				debug!("envelope refused a data line: {response}");
				self.data_error = Some(response);
			}
		}

		None
	}

	async fn got_data(&mut self) -> Response {
		let response = match (self.data_error.take(), self.envelope.as_mut()) {
			(Some(response), _) => response,
			(None, Some(envelope)) => envelope.close().await,
			(None, None) => Self::bad_command(),
		};

		self.reset_transaction();
		self.state = State::Greeted;

		response
	}

	async fn run_command(&mut self, line: &str) -> Response {
		match line.parse() {
			Ok(command) => match command {
				Command::Helo(client_domain) => self.helo(&client_domain),
				Command::Ehlo(client_domain) => self.ehlo(&client_domain),
				Command::Mail(reverse_path) => self.mail(reverse_path).await,
				Command::Rcpt(forward_path) => self.rcpt(forward_path).await,
				Command::Data => self.data().await,
				Command::Rset => self.rset(),
				Command::Vrfy(_) => Response::with_message(
					ResponseCode::CannotVrfyUser,
					"Cannot VRFY user, but will accept message and attempt delivery",
				),
				Command::Expn(_) => Self::not_implemented(),
				Command::Help(_) => {
					Response::with_message(ResponseCode::HelpMessage, "Please review RFC 5321")
				}
				Command::Noop => Response::with_message(ResponseCode::Okay, "Okay"),
				Command::Quit => self.quit(),
			},
			Err(err) => match err {
				ParseCommandError::InvalidCommand => Self::syntax_error(),
				ParseCommandError::InvalidPath(err) => Response::with_message(
					ResponseCode::InvalidParameters,
					format!("Bad path: {}", err),
				),
				ParseCommandError::InvalidDomain(err) => Response::with_message(
					ResponseCode::InvalidParameters,
					format!("Bad domain: {}", err),
				),
			},
		}
	}

	fn helo(&mut self, client_domain: &Domain) -> Response {
		// 4.1.4 does not say the same thing about HELO, so we check the state
		match self.state {
			State::Initiated => {
				self.state = State::Greeted;

				Response::with_message(
					ResponseCode::Okay,
					format!(
						"{} (ferry) greets {}",
						self.handler.primary_host(),
						client_domain
					),
				)
			}
			_ => Self::bad_command(),
		}
	}

	fn ehlo(&mut self, client_domain: &Domain) -> Response {
		// 4.1.4, EHLO may come again later in the session and acts like RSET
		self.reset_transaction();
		self.state = State::Greeted;

		let mut resp = Response::with_message(
			ResponseCode::Okay,
			format!(
				"{} (ferry) greets {}",
				self.handler.primary_host(),
				client_domain
			),
		);
		resp.push("HELP");
		resp
	}

	async fn mail(&mut self, reverse_path: ReversePath) -> Response {
		if self.state != State::Greeted {
			return Self::bad_command();
		}

		match self.handler.on_new_mail(&self.peer, reverse_path).await {
			Ok(envelope) => {
				self.envelope = Some(envelope);
				self.state = State::GotReversePath;

				Response::with_message(ResponseCode::Okay, "Okay")
			}
			Err(response) => response,
		}
	}

	async fn rcpt(&mut self, forward_path: ForwardPath) -> Response {
		if !matches!(self.state, State::GotReversePath | State::GotForwardPath) {
			return Self::bad_command();
		}

		let Some(envelope) = self.envelope.as_mut() else {
			return Self::bad_command();
		};

		match envelope.add_recipient(forward_path).await {
			Ok(()) => {
				self.state = State::GotForwardPath;
				Response::with_message(ResponseCode::Okay, "Okay")
			}
			Err(response) => response,
		}
	}

	async fn data(&mut self) -> Response {
		if self.state != State::GotForwardPath {
			return Self::bad_command();
		}

		let Some(envelope) = self.envelope.as_mut() else {
			return Self::bad_command();
		};

		match envelope.begin_data().await {
			Ok(()) => {
				self.state = State::LoadingData;
				Response::with_message(
					ResponseCode::StartMailInput,
					"Start mail input; end with <CRLF>.<CRLF>",
				)
			}
			Err(response) => {
				self.reset_transaction();
				self.state = State::Greeted;
				response
			}
		}
	}

	fn rset(&mut self) -> Response {
		self.reset_transaction();

		self.state = match self.state {
			State::Initiated => State::Initiated,
			_ => State::Greeted,
		};

		Response::with_message(ResponseCode::Okay, "Okay")
	}

	fn quit(&mut self) -> Response {
		self.reset_transaction();
		self.state = State::Exit;

		Response::with_message(
			ResponseCode::ServiceClosing,
			format!("{} Goodbye", self.handler.primary_host()),
		)
	}

	fn reset_transaction(&mut self) {
		self.envelope = None;
		self.data_error = None;
	}

	fn not_implemented() -> Response {
		Response::with_message(
			ResponseCode::CommandNotImplemented,
			"Command not implemented",
		)
	}

	fn bad_command() -> Response {
		Response::with_message(ResponseCode::BadCommandSequence, "bad sequence of commands")
	}

	fn syntax_error() -> Response {
		Response::with_message(ResponseCode::UnrecognizedCommand, "Syntax Error")
	}
}

#[derive(Debug, Default, PartialEq)]
enum State {
	#[default]
	Initiated,
	Greeted,
	GotReversePath,
	GotForwardPath,
	LoadingData,
	Exit,
}
