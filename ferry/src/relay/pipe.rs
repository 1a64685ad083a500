use thiserror::Error;
use tokio::{
	sync::{mpsc, watch},
	task::JoinHandle,
};
use tracing::warn;

/// How many lines may wait in the pipe before the inbound side has to.
pub const PIPE_CAPACITY: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
	NotReady,
	Ready,
	Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
	InProgress,
	Succeeded,
	Failed,
}

enum Item {
	Line(String),
	End,
}

/// Makes the two ends of a data pipe. The [DataPipe] stays with the inbound
/// envelope; the [PipeReader] goes to the task writing upstream.
pub fn channel() -> (DataPipe, PipeReader) {
	let (lines_tx, lines_rx) = mpsc::channel(PIPE_CAPACITY);
	let (readiness_tx, readiness_rx) = watch::channel(Readiness::NotReady);
	let (completion_tx, completion_rx) = watch::channel(Completion::InProgress);

	(
		DataPipe {
			lines: Some(lines_tx),
			readiness: readiness_rx,
			completion: completion_rx,
			worker: None,
		},
		PipeReader {
			lines: lines_rx,
			readiness: readiness_tx,
			completion: completion_tx,
		},
	)
}

/// The producing end. Dropping it before [DataPipe::finish] aborts the worker.
pub struct DataPipe {
	lines: Option<mpsc::Sender<Item>>,
	readiness: watch::Receiver<Readiness>,
	completion: watch::Receiver<Completion>,
	worker: Option<JoinHandle<()>>,
}

impl DataPipe {
	/// Hands over the task consuming this pipe, to be joined by `finish`.
	pub fn attach(&mut self, worker: JoinHandle<()>) {
		self.worker = Some(worker);
	}

	/// Waits until the consumer says whether it can take data. A consumer
	/// that goes away without saying is `Failed`.
	pub async fn ready(&mut self) -> Readiness {
		match self
			.readiness
			.wait_for(|readiness| *readiness != Readiness::NotReady)
			.await
		{
			Ok(readiness) => *readiness,
			Err(_) => Readiness::Failed,
		}
	}

	/// Queues a line, waiting for room if the pipe is full.
	pub async fn push(&mut self, line: String) -> Result<(), PipeError> {
		let lines = self.lines.as_ref().ok_or(PipeError::Finished)?;

		lines
			.send(Item::Line(line))
			.await
			.map_err(|_| PipeError::Closed)
	}

	/// Closes the pipe, then waits for the consumer's verdict and for the
	/// consumer itself to exit.
	pub async fn finish(&mut self) -> Completion {
		if let Some(lines) = self.lines.take() {
			// A consumer that's already gone reports itself below
			let _ = lines.send(Item::End).await;
		}

		let completion = match self
			.completion
			.wait_for(|completion| *completion != Completion::InProgress)
			.await
		{
			Ok(completion) => *completion,
			Err(_) => Completion::Failed,
		};

		if let Some(worker) = self.worker.take() {
			if let Err(err) = worker.await {
				warn!("the data worker did not exit cleanly: {err}");
				return Completion::Failed;
			}
		}

		completion
	}
}

impl Drop for DataPipe {
	fn drop(&mut self) {
		if let Some(worker) = self.worker.take() {
			worker.abort();
		}
	}
}

/// The consuming end.
pub struct PipeReader {
	lines: mpsc::Receiver<Item>,
	readiness: watch::Sender<Readiness>,
	completion: watch::Sender<Completion>,
}

impl PipeReader {
	pub fn signal_ready(&self, ready: bool) {
		self.readiness.send_replace(if ready {
			Readiness::Ready
		} else {
			Readiness::Failed
		});
	}

	/// The next line, or `None` once the producer has finished. A producer
	/// that went away without finishing is an error, the data is incomplete.
	pub async fn next_line(&mut self) -> Result<Option<String>, PipeError> {
		match self.lines.recv().await {
			Some(Item::Line(line)) => Ok(Some(line)),
			Some(Item::End) => Ok(None),
			None => Err(PipeError::Abandoned),
		}
	}

	pub fn signal_complete(&self, succeeded: bool) {
		self.completion.send_replace(if succeeded {
			Completion::Succeeded
		} else {
			Completion::Failed
		});
	}
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipeError {
	#[error("the pipe was already finished")]
	Finished,
	#[error("the consumer has gone away")]
	Closed,
	#[error("the producer went away before finishing")]
	Abandoned,
}

#[cfg(test)]
mod test {
	use std::time::Duration;

	use tokio::{sync::oneshot, time::timeout};

	use super::*;

	#[tokio::test]
	async fn lines_arrive_in_order() {
		let (mut pipe, mut reader) = channel();

		pipe.attach(tokio::spawn(async move {
			reader.signal_ready(true);

			let mut received = vec![];
			while let Ok(Some(line)) = reader.next_line().await {
				received.push(line);
			}

			let expected: Vec<String> = (0..25).map(|n| format!("line {n}\n")).collect();
			reader.signal_complete(received == expected);
		}));

		assert_eq!(pipe.ready().await, Readiness::Ready);

		for n in 0..25 {
			pipe.push(format!("line {n}\n")).await.unwrap();
		}

		assert_eq!(pipe.finish().await, Completion::Succeeded);
		assert_eq!(pipe.push("late".into()).await, Err(PipeError::Finished));
	}

	#[tokio::test]
	async fn full_pipe_blocks_the_producer() {
		let (mut pipe, _reader) = channel();

		for n in 0..PIPE_CAPACITY {
			pipe.push(format!("line {n}\n")).await.unwrap();
		}

		assert!(timeout(Duration::from_millis(50), pipe.push("one more\n".into()))
			.await
			.is_err());
	}

	#[tokio::test]
	async fn vanished_consumer_is_failed() {
		let (mut pipe, reader) = channel();
		drop(reader);

		assert_eq!(pipe.ready().await, Readiness::Failed);
		assert_eq!(pipe.push("line\n".into()).await, Err(PipeError::Closed));
		assert_eq!(pipe.finish().await, Completion::Failed);
	}

	#[tokio::test]
	async fn refusal_is_observed() {
		let (mut pipe, reader) = channel();

		pipe.attach(tokio::spawn(async move {
			reader.signal_ready(false);
		}));

		assert_eq!(pipe.ready().await, Readiness::Failed);
	}

	#[tokio::test]
	async fn abandoned_pipe_is_not_a_clean_end() {
		let (mut pipe, mut reader) = channel();

		pipe.push("partial\n".into()).await.unwrap();
		drop(pipe);

		assert_eq!(reader.next_line().await, Ok(Some("partial\n".into())));
		assert_eq!(reader.next_line().await, Err(PipeError::Abandoned));
	}

	#[tokio::test]
	async fn dropping_the_pipe_aborts_the_worker() {
		let (mut pipe, reader) = channel();
		let (held_tx, held_rx) = oneshot::channel::<()>();

		pipe.attach(tokio::spawn(async move {
			let _held = held_tx;
			let _reader = reader;
			std::future::pending::<()>().await;
		}));
		drop(pipe);

		// The sender only goes away if the task was torn down
		assert!(timeout(Duration::from_secs(5), held_rx).await.unwrap().is_err());
	}
}
