use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::{
	io::{self, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
	net::TcpStream,
	time::{timeout, timeout_at, Instant},
};

pub mod dns;

pub const SMTP_PORT: u16 = 25;

pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send + Sync {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send + Sync> AsyncStream for T {}

pub type BoxedStream = Box<dyn AsyncStream>;

/// Opens outbound streams. The relay only ever talks to this, so tests can
/// hand it something other than a socket.
#[async_trait]
pub trait Connector: Send + Sync {
	async fn connect(
		&self,
		host: &str,
		port: u16,
		limit: Duration,
	) -> Result<BoxedStream, ConnectionError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
	async fn connect(
		&self,
		host: &str,
		port: u16,
		limit: Duration,
	) -> Result<BoxedStream, ConnectionError> {
		let stream = timeout(limit, TcpStream::connect((host, port)))
			.await
			.map_err(|_| ConnectionError::TimedOut)??;

		stream.set_nodelay(true)?;
		Ok(Box::new(stream))
	}
}

/// A line oriented stream where every read and write has to finish before
/// a deadline. The deadlines are pushed forward with [Self::refresh_deadlines].
pub struct Connection {
	stream: BufReader<BoxedStream>,
	read_timeout: Duration,
	write_timeout: Duration,
	read_deadline: Instant,
	write_deadline: Instant,
}

impl Connection {
	pub fn new(
		stream: BoxedStream,
		read_timeout: Duration,
		write_timeout: Duration,
	) -> Result<Self, ConnectionError> {
		let now = Instant::now();

		Ok(Self {
			stream: BufReader::new(stream),
			read_timeout,
			write_timeout,
			read_deadline: deadline(now, read_timeout)?,
			write_deadline: deadline(now, write_timeout)?,
		})
	}

	pub fn refresh_deadlines(&mut self) -> Result<(), ConnectionError> {
		let now = Instant::now();

		self.read_deadline = deadline(now, self.read_timeout)?;
		self.write_deadline = deadline(now, self.write_timeout)?;
		Ok(())
	}

	/// Reads up to and including the next LF. `None` means the peer closed
	/// the stream. Invalid UTF-8 is replaced rather than refused.
	pub async fn read_line(&mut self) -> Result<Option<String>, ConnectionError> {
		let mut buf = vec![];

		let read = timeout_at(self.read_deadline, self.stream.read_until(b'\n', &mut buf))
			.await
			.map_err(|_| ConnectionError::TimedOut)??;

		if read == 0 {
			Ok(None)
		} else {
			Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
		}
	}

	pub async fn write_all(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
		let stream = &mut self.stream;

		timeout_at(self.write_deadline, async move {
			stream.write_all(bytes).await?;
			stream.flush().await
		})
		.await
		.map_err(|_| ConnectionError::TimedOut)??;

		Ok(())
	}

	pub async fn shutdown(&mut self) -> Result<(), ConnectionError> {
		timeout_at(self.write_deadline, self.stream.shutdown())
			.await
			.map_err(|_| ConnectionError::TimedOut)??;

		Ok(())
	}
}

fn deadline(now: Instant, after: Duration) -> Result<Instant, ConnectionError> {
	now.checked_add(after)
		.ok_or(ConnectionError::DeadlineUpdateFailed)
}

#[derive(Debug, Error)]
pub enum ConnectionError {
	#[error("i/o error: {0}")]
	Io(#[from] io::Error),
	#[error("the operation did not finish before its deadline")]
	TimedOut,
	#[error("could not compute a new deadline")]
	DeadlineUpdateFailed,
}
