pub mod args;
mod client;
mod command;
mod envelope;
mod response;
mod server;

pub use client::{Client, ClientError, DataWriter};
pub use command::{Command, ParseCommandError};
pub use envelope::{BasicEnvelope, Envelope};
pub use response::{ParseResponseError, Response, ResponseCode};
pub use server::{Handler, Peer, Server};
