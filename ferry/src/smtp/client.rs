use thiserror::Error;
use tracing::{debug, trace};

use crate::net::{Connection, ConnectionError};

use super::{
	args::{Domain, ForwardPath, ReversePath},
	Command, ParseResponseError, Response, ResponseCode,
};

/// One outbound SMTP session. Every method sends a command and waits for the
/// whole reply, so a `Client` is always between commands when you hold it.
pub struct Client {
	connection: Connection,
	extensions: Vec<String>,
}

impl Client {
	/// Reads the greeting and introduces ourselves as `helo`. EHLO is tried
	/// first; servers that refuse it get HELO.
	pub async fn initiate(connection: Connection, helo: &Domain) -> Result<Self, ClientError> {
		let mut client = Self {
			connection,
			extensions: vec![],
		};

		let greeting = client.read_reply().await?;
		expect(greeting, |code| code == ResponseCode::ServiceReady)?;

		client.refresh_deadlines()?;
		let ehlo = client.send(Command::Ehlo(helo.clone())).await?;

		if ehlo.code.is_completion() {
			client.extensions = ehlo
				.messages()
				.iter()
				.skip(1)
				.filter_map(|line| line.split_whitespace().next())
				.map(|keyword| keyword.to_ascii_uppercase())
				.collect();
		} else {
			debug!("EHLO refused with '{ehlo}', trying HELO");

			client.refresh_deadlines()?;
			let helo = client.send(Command::Helo(helo.clone())).await?;
			expect(helo, |code| code.is_completion())?;
		}

		Ok(client)
	}

	/// Whether the server advertised the extension in its EHLO reply.
	pub fn supports(&self, extension: &str) -> bool {
		self.extensions
			.iter()
			.any(|advertised| advertised.eq_ignore_ascii_case(extension))
	}

	pub fn refresh_deadlines(&mut self) -> Result<(), ClientError> {
		Ok(self.connection.refresh_deadlines()?)
	}

	pub async fn mail(&mut self, from: &ReversePath) -> Result<Response, ClientError> {
		let reply = self.send(Command::Mail(from.clone())).await?;
		expect(reply, |code| code.is_completion())
	}

	pub async fn rcpt(&mut self, to: &ForwardPath) -> Result<Response, ClientError> {
		let reply = self.send(Command::Rcpt(to.clone())).await?;
		expect(reply, |code| code.is_completion())
	}

	/// Sends DATA. Once the server says go ahead, the message is written
	/// through the returned writer.
	pub async fn data(&mut self) -> Result<DataWriter<'_>, ClientError> {
		let reply = self.send(Command::Data).await?;
		expect(reply, |code| code == ResponseCode::StartMailInput)?;

		Ok(DataWriter {
			client: self,
			at_line_start: true,
			after_cr: false,
		})
	}

	pub async fn quit(mut self) -> Result<(), ClientError> {
		let reply = self.send(Command::Quit).await?;
		expect(reply, |code| code.is_completion())?;

		// The server hanging up first is fine
		let _ = self.connection.shutdown().await;
		Ok(())
	}

	async fn send(&mut self, command: Command) -> Result<Response, ClientError> {
		trace!("> {command}");

		self.connection
			.write_all(format!("{command}\r\n").as_bytes())
			.await?;
		self.read_reply().await
	}

	async fn read_reply(&mut self) -> Result<Response, ClientError> {
		let mut raw = String::new();

		loop {
			let line = self
				.connection
				.read_line()
				.await?
				.ok_or(ClientError::ConnectionClosed)?;
			let line = line.trim_end();

			trace!("< {line}");
			raw.push_str(line);
			raw.push_str("\r\n");

			if line.len() <= 3 || Response::is_last_line(line) {
				break;
			}
		}

		Ok(raw.parse()?)
	}
}

fn expect(reply: Response, accept: impl Fn(ResponseCode) -> bool) -> Result<Response, ClientError> {
	if accept(reply.code) {
		Ok(reply)
	} else {
		Err(ClientError::Rejected(reply))
	}
}

/// Writes the message body. Lines starting with a dot are stuffed and bare
/// LFs become CRLF, so the caller can hand over lines as it got them.
pub struct DataWriter<'a> {
	client: &'a mut Client,
	at_line_start: bool,
	after_cr: bool,
}

impl DataWriter<'_> {
	pub async fn write(&mut self, data: &str) -> Result<(), ClientError> {
		let framed = self.frame(data);
		self.client.connection.write_all(framed.as_bytes()).await?;
		Ok(())
	}

	pub fn refresh_deadlines(&mut self) -> Result<(), ClientError> {
		self.client.refresh_deadlines()
	}

	/// Ends the data with the lone dot and waits for the server to take the
	/// message. An unterminated last line is terminated first.
	pub async fn close(self) -> Result<Response, ClientError> {
		let terminator = if self.at_line_start {
			".\r\n"
		} else {
			"\r\n.\r\n"
		};

		self.client
			.connection
			.write_all(terminator.as_bytes())
			.await?;

		let reply = self.client.read_reply().await?;
		expect(reply, |code| code.is_completion())
	}

	fn frame(&mut self, data: &str) -> String {
		let mut framed = String::with_capacity(data.len() + 2);

		for c in data.chars() {
			if self.at_line_start && c == '.' {
				framed.push('.');
			}

			if c == '\n' && !self.after_cr {
				framed.push('\r');
			}

			framed.push(c);
			self.after_cr = c == '\r';
			self.at_line_start = c == '\n';
		}

		framed
	}
}

#[derive(Debug, Error)]
pub enum ClientError {
	#[error("connection failed: {0}")]
	Connection(#[from] ConnectionError),
	#[error("the server replied '{0}'")]
	Rejected(Response),
	#[error("the server sent a malformed reply: {0}")]
	MalformedReply(#[from] ParseResponseError),
	#[error("the server closed the connection")]
	ConnectionClosed,
}
