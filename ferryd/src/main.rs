mod config;
mod logging;
mod net;

use std::{process::ExitCode, sync::Arc};

use config::Config;
use ferry::{
	net::{dns::DnsResolver, TcpConnector},
	relay::Relay,
	smtp::Handler,
};
use time::UtcOffset;
use tokio::{
	io,
	net::TcpListener,
	signal::unix::{signal, SignalKind},
	sync::watch,
};
use tracing::{error, info, warn};

fn main() -> ExitCode {
	// Only sound while this is the only thread, so before the runtime starts
	let offset = UtcOffset::current_local_offset();

	logging::init();

	let offset = offset.unwrap_or_else(|err| {
		warn!("could not find the local time offset, trace headers will be in UTC: {err}");
		UtcOffset::UTC
	});

	run(offset)
}

#[tokio::main]
async fn run(offset: UtcOffset) -> ExitCode {
	let config = match Config::get() {
		Ok(Some(config)) => config,
		Ok(None) => return ExitCode::SUCCESS,
		Err(err) => {
			error!("{err}");
			return ExitCode::FAILURE;
		}
	};

	let address = config.socket_address();
	let timeouts = config.timeouts;
	let relay = match Relay::new(
		&config.hostname,
		config.policy,
		timeouts,
		Arc::new(DnsResolver::from_system_conf()),
		Arc::new(TcpConnector),
	) {
		Ok(relay) => relay.with_offset(offset),
		Err(err) => {
			error!("'{}' is not a usable hostname: {err}", config.hostname);
			return ExitCode::FAILURE;
		}
	};

	let listener = match TcpListener::bind(address).await {
		Ok(listener) => listener,
		Err(err) => {
			error!("failed to listen on {address}: {err}");
			return ExitCode::FAILURE;
		}
	};
	info!("listening on {address} as {}", relay.hostname());

	let (tx, rx) = watch::channel(false);
	let handler: Arc<dyn Handler> = Arc::new(relay);
	let listen_task = tokio::spawn(net::listen(listener, handler, timeouts, rx));

	if let Err(err) = shutdown_signal().await {
		error!("failed to listen for signals: {err}");
	}

	info!("received shutdown signal, beginning graceful shutdown");
	// The listener may already be gone; there's nobody left to tell then
	let _ = tx.send(true);

	if let Err(err) = listen_task.await {
		error!("the listener failed: {err}");
		return ExitCode::FAILURE;
	}

	ExitCode::SUCCESS
}

async fn shutdown_signal() -> io::Result<()> {
	let mut hangup = signal(SignalKind::hangup())?;
	let mut interrupt = signal(SignalKind::interrupt())?;
	let mut quit = signal(SignalKind::quit())?;
	let mut terminate = signal(SignalKind::terminate())?;

	tokio::select! {
		_ = hangup.recv() => (),
		_ = interrupt.recv() => (),
		_ = quit.recv() => (),
		_ = terminate.recv() => (),
	};

	Ok(())
}
