use std::{cmp::Ordering, fmt::Display, num::ParseIntError};

use thiserror::Error;

#[derive(Clone, Debug, PartialEq)]
pub struct Response {
	pub code: ResponseCode,
	messages: Vec<String>,
}

impl Response {
	pub fn new(code: ResponseCode) -> Self {
		Self {
			code,
			messages: vec![],
		}
	}

	pub fn with_message<S: Into<String>>(code: ResponseCode, message: S) -> Self {
		Self {
			code,
			messages: vec![message.into()],
		}
	}

	/// Builds a reply from a bare numeric code, for the codes that don't
	/// have a name of their own.
	pub fn from_code<S: Into<String>>(code: u16, message: S) -> Option<Self> {
		Some(Self::with_message(ResponseCode::from_code(code)?, message))
	}

	pub fn push(&mut self, message: &str) {
		self.messages.push(message.to_owned());
	}

	pub fn insert(&mut self, index: usize, message: &str) {
		self.messages.insert(index, message.to_owned());
	}

	pub fn code(&self) -> ResponseCode {
		self.code
	}

	pub fn messages(&self) -> &[String] {
		&self.messages
	}

	/// Whether a single reply line is the last line of its reply. Every line
	/// but the last has a hyphen after the code.
	pub fn is_last_line(line: &str) -> bool {
		let line = line.trim_end();
		line.len() == 3 || line.as_bytes().get(3) == Some(&b' ')
	}

	pub fn as_string(&self) -> String {
		let mut working = self.messages.clone();
		let mut ret = format!("{} ", self.code.as_code());

		if let Some(message) = working.pop() {
			ret.push_str(&message);
		}

		for message in working.into_iter().rev() {
			ret.insert_str(0, &format!("{}-{}\r\n", self.code.as_code(), message));
		}

		ret.push_str("\r\n");
		ret
	}
}

impl Display for Response {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_string().trim_end())
	}
}

impl std::str::FromStr for Response {
	type Err = ParseResponseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let mut lines = s.trim_end().rsplit("\r\n");

		let mut response = match lines.next() {
			Some(line) => match line.len().cmp(&3) {
				Ordering::Less => return Err(ParseResponseError::MalformedResponse),
				Ordering::Equal => Response::new(line.parse()?),
				Ordering::Greater => {
					let split = line
						.split_once(' ')
						.ok_or(ParseResponseError::MalformedResponse)?;
					let code: ResponseCode = split.0.parse()?;

					Response::with_message(code, split.1.trim())
				}
			},
			None => return Err(ParseResponseError::EmptyString),
		};

		for line in lines {
			if line.len() < 4 {
				return Err(ParseResponseError::MalformedResponse);
			}

			let split = line
				.split_once('-')
				.ok_or(ParseResponseError::MalformedResponse)?;
			let code: ResponseCode = split.0.parse()?;

			if response.code() != code {
				return Err(ParseResponseError::MixedResponseCode);
			}

			response.insert(0, split.1.trim());
		}

		Ok(response)
	}
}

#[derive(Error, Debug)]
pub enum ParseResponseError {
	#[error("multiline responses may not mix reply codes")]
	MixedResponseCode,
	#[error("the response was malformed")]
	MalformedResponse,
	#[error("the response code did not make sense")]
	MalformedResponseCode,
	#[error("the response code was invalid")]
	InvalidResponseCode(#[from] ParseIntError),
	#[error("the reply was empty")]
	EmptyString,
}

#[derive(Clone, Copy, Debug)]
pub enum ResponseCode {
	UnrecognizedCommand,   // 500
	InvalidParameters,     // 501
	CommandNotImplemented, // 502
	BadCommandSequence,    // 503

	SystemStatus,   // 211
	HelpMessage,    // 214
	ServiceReady,   // 220
	ServiceClosing, // 221

	ServiceNotAvailable, // 421 (Service not available, closing transmission channel)

	Okay,                    // 250
	UserNotLocalWillForward, // 251 (will forward to <forward-path>)
	CannotVrfyUser,          // 252 (but will attempt delivery)

	UnableToAcceptParameters,  // 455
	MailRcptParametersError,   // 555
	TemporaryMailFail,         // 450 (action not taken: mailbox unavailable)
	PermanentMailFail,         // 550
	ProcessingError,           // 451
	UserNotLocal,              // 551 (please try <forward-path>)
	InsufficientStorage,       // 452
	ExceededStorageAllocation, // 552
	MailboxNameNotAllowed,     // 553

	StartMailInput,  // 354
	TransactionFail, // 554

	UnknownPositiveCompletion(u16), // 2xx
	UnknownPositiveWaiting(u16),    // 3xx
	UnknownNegativeTemporary(u16),  // 4xx
	UnknownNegativePermanent(u16),  // 5xx
}

impl PartialEq for ResponseCode {
	fn eq(&self, other: &Self) -> bool {
		self.as_code() == other.as_code()
	}
}

impl ResponseCode {
	pub fn from_code(code: u16) -> Option<ResponseCode> {
		let response_code = match code {
			500 => ResponseCode::UnrecognizedCommand,
			501 => ResponseCode::InvalidParameters,
			502 => ResponseCode::CommandNotImplemented,
			503 => ResponseCode::BadCommandSequence,

			211 => ResponseCode::SystemStatus,
			214 => ResponseCode::HelpMessage,
			220 => ResponseCode::ServiceReady,
			221 => ResponseCode::ServiceClosing,

			421 => ResponseCode::ServiceNotAvailable,

			250 => ResponseCode::Okay,
			251 => ResponseCode::UserNotLocalWillForward,
			252 => ResponseCode::CannotVrfyUser,

			455 => ResponseCode::UnableToAcceptParameters,
			555 => ResponseCode::MailRcptParametersError,
			450 => ResponseCode::TemporaryMailFail,
			550 => ResponseCode::PermanentMailFail,
			451 => ResponseCode::ProcessingError,
			551 => ResponseCode::UserNotLocal,
			452 => ResponseCode::InsufficientStorage,
			552 => ResponseCode::ExceededStorageAllocation,
			553 => ResponseCode::MailboxNameNotAllowed,

			354 => ResponseCode::StartMailInput,
			554 => ResponseCode::TransactionFail,

			_ => match code / 100 {
				2 => ResponseCode::UnknownPositiveCompletion(code),
				3 => ResponseCode::UnknownPositiveWaiting(code),
				4 => ResponseCode::UnknownNegativeTemporary(code),
				5 => ResponseCode::UnknownNegativePermanent(code),
				_ => return None,
			},
		};

		Some(response_code)
	}

	pub fn as_code(self) -> u16 {
		match self {
			ResponseCode::UnrecognizedCommand => 500,
			ResponseCode::InvalidParameters => 501,
			ResponseCode::CommandNotImplemented => 502,
			ResponseCode::BadCommandSequence => 503,

			ResponseCode::SystemStatus => 211,
			ResponseCode::HelpMessage => 214,
			ResponseCode::ServiceReady => 220,
			ResponseCode::ServiceClosing => 221,

			ResponseCode::ServiceNotAvailable => 421,

			ResponseCode::Okay => 250,
			ResponseCode::UserNotLocalWillForward => 251,
			ResponseCode::CannotVrfyUser => 252,

			ResponseCode::UnableToAcceptParameters => 455,
			ResponseCode::MailRcptParametersError => 555,
			ResponseCode::TemporaryMailFail => 450,
			ResponseCode::PermanentMailFail => 550,
			ResponseCode::ProcessingError => 451,
			ResponseCode::UserNotLocal => 551,
			ResponseCode::InsufficientStorage => 452,
			ResponseCode::ExceededStorageAllocation => 552,
			ResponseCode::MailboxNameNotAllowed => 553,

			ResponseCode::StartMailInput => 354,
			ResponseCode::TransactionFail => 554,

			ResponseCode::UnknownPositiveCompletion(code)
			| ResponseCode::UnknownPositiveWaiting(code)
			| ResponseCode::UnknownNegativeTemporary(code)
			| ResponseCode::UnknownNegativePermanent(code) => code,
		}
	}

	pub fn is_negative(&self) -> bool {
		let first = self.as_code() / 100;

		first == 4 || first == 5
	}

	pub fn is_positive(&self) -> bool {
		let first = self.as_code() / 100;

		first == 2 || first == 3
	}

	/// 2xx, the command was carried out
	pub fn is_completion(&self) -> bool {
		self.as_code() / 100 == 2
	}
}

impl std::str::FromStr for ResponseCode {
	type Err = ParseResponseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.len() == 3 {
			ResponseCode::from_code(s.parse()?).ok_or(ParseResponseError::MalformedResponseCode)
		} else {
			Err(ParseResponseError::MalformedResponseCode)
		}
	}
}
