use std::sync::Arc;

use ferry::{
	config::Timeouts,
	net::{Connection, ConnectionError},
	smtp::{Handler, Peer, Server},
};
use tokio::{
	net::{TcpListener, TcpStream},
	sync::watch,
	task::JoinSet,
};
use tracing::{debug, error, info, warn};

// Runs as long as the client remains connected, or until we're told to stop.
// Lines go to the server state machine and its replies come back out.
async fn serve(
	stream: TcpStream,
	peer: Peer,
	handler: Arc<dyn Handler>,
	timeouts: Timeouts,
	mut shutdown: watch::Receiver<bool>,
) -> Result<(), ConnectionError> {
	let mut connection = Connection::new(
		Box::new(stream),
		timeouts.server_read,
		timeouts.server_write,
	)?;

	let (mut server, greeting) = Server::initiate(handler, peer).await;
	connection.write_all(greeting.as_string().as_bytes()).await?;

	while !server.should_exit() {
		connection.refresh_deadlines()?;

		let read = tokio::select! {
			line = connection.read_line() => Some(line?),
			_ = shutdown.changed() => None,
		};

		let Some(read) = read else {
			let goodbye = server.shutdown();
			connection.write_all(goodbye.as_string().as_bytes()).await?;
			return Ok(());
		};

		// A zero sized read, this connection has died or been terminated by the client
		let Some(line) = read else {
			debug!(remote = %peer.remote, "connection closed by client");
			return Ok(());
		};

		if let Some(response) = server.push(&line).await {
			connection.refresh_deadlines()?;
			connection
				.write_all(response.as_string().as_bytes())
				.await?;
		}
	}

	Ok(())
}

// Waits for new connections and gives each its own task. Once shutdown is
// signalled, stops accepting and waits for the open sessions to say goodbye.
pub async fn listen(
	listener: TcpListener,
	handler: Arc<dyn Handler>,
	timeouts: Timeouts,
	mut shutdown: watch::Receiver<bool>,
) {
	let mut sessions = JoinSet::new();

	loop {
		let accepted = tokio::select! {
			_ = shutdown.changed() => break,
			Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
				if let Err(err) = finished {
					error!("a session task failed: {err}");
				}
				continue;
			}
			accepted = listener.accept() => accepted,
		};

		let (stream, remote) = match accepted {
			Ok(accepted) => accepted,
			Err(err) => {
				warn!("failed to accept a connection: {err}");
				continue;
			}
		};

		let local = match stream.local_addr() {
			Ok(local) => local,
			Err(err) => {
				warn!(%remote, "could not read the local address: {err}");
				continue;
			}
		};

		let handler = handler.clone();
		let shutdown = shutdown.clone();
		sessions.spawn(async move {
			let peer = Peer { remote, local };

			if let Err(err) = serve(stream, peer, handler, timeouts, shutdown).await {
				info!(%remote, "session ended: {err}");
			}
		});
	}

	while let Some(finished) = sessions.join_next().await {
		if let Err(err) = finished {
			error!("a session task failed: {err}");
		}
	}
}
