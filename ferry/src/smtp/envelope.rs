use async_trait::async_trait;

use super::{
	args::{ForwardPath, ReversePath},
	Response,
};

/// One mail transaction as the server sees it. The server calls these in
/// order: recipients, then `begin_data`, then `write` once per line, then
/// `close`. Whatever `close` returns is the reply to the final dot.
#[async_trait]
pub trait Envelope: Send {
	async fn add_recipient(&mut self, recipient: ForwardPath) -> Result<(), Response>;

	async fn begin_data(&mut self) -> Result<(), Response>;

	async fn write(&mut self, line: &str) -> Result<(), Response>;

	async fn close(&mut self) -> Response;
}

/// The part of a transaction every envelope has.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasicEnvelope {
	pub reverse_path: ReversePath,
	pub forward_paths: Vec<ForwardPath>,
}

impl BasicEnvelope {
	pub fn new(reverse_path: ReversePath) -> Self {
		Self {
			reverse_path,
			forward_paths: vec![],
		}
	}
}
