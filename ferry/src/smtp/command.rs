use super::args::{Domain, ForwardPath, ParseDomainError, ParsePathError, ReversePath};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
	Helo(Domain),
	Ehlo(Domain),
	Mail(ReversePath),
	Rcpt(ForwardPath),
	Data,
	Rset,
	Vrfy(String),
	Expn(String),
	Help(String),
	Noop,
	Quit,
}

impl std::fmt::Display for Command {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Command::Helo(domain) => write!(f, "HELO {}", domain),
			Command::Ehlo(domain) => write!(f, "EHLO {}", domain),
			Command::Mail(reverse_path) => write!(f, "MAIL FROM:{}", reverse_path),
			Command::Rcpt(forward_path) => write!(f, "RCPT TO:{}", forward_path),
			Command::Data => write!(f, "DATA"),
			Command::Rset => write!(f, "RSET"),
			Command::Vrfy(target) => write!(f, "VRFY {}", target),
			Command::Expn(list) => write!(f, "EXPN {}", list),
			Command::Help(command) if command.is_empty() => write!(f, "HELP"),
			Command::Help(command) => write!(f, "HELP {}", command),
			Command::Noop => write!(f, "NOOP"),
			Command::Quit => write!(f, "QUIT"),
		}
	}
}

impl Command {
	/// Splits `FROM:<path> PARAM=VALUE ...` into the path, checking the
	/// keyword. ESMTP parameters are accepted and ignored.
	fn path_argument<'a>(keyword: &str, argument: &'a str) -> Result<&'a str, ParseCommandError> {
		let (given, rest) = argument
			.split_once(':')
			.ok_or(ParseCommandError::InvalidCommand)?;

		if !given.trim().eq_ignore_ascii_case(keyword) {
			return Err(ParseCommandError::InvalidCommand);
		}

		let rest = rest.trim_start();
		Ok(rest.split_once(' ').map_or(rest, |(path, _parameters)| path))
	}
}

impl std::str::FromStr for Command {
	type Err = ParseCommandError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (verb, argument) = s.split_once(' ').unwrap_or((s, ""));

		match (verb.to_ascii_uppercase().as_str(), argument.trim()) {
			("HELO", client_domain) => Ok(Command::Helo(client_domain.parse()?)),
			("EHLO", client_domain) => Ok(Command::Ehlo(client_domain.parse()?)),
			("MAIL", argument) => Ok(Command::Mail(
				Self::path_argument("FROM", argument)?.parse()?,
			)),
			("RCPT", argument) => Ok(Command::Rcpt(
				Self::path_argument("TO", argument)?.parse()?,
			)),
			("DATA", "") => Ok(Command::Data),
			("RSET", "") => Ok(Command::Rset),
			("VRFY", target) => Ok(Command::Vrfy(target.to_owned())),
			("EXPN", list) => Ok(Command::Expn(list.to_owned())),
			("HELP", command) => Ok(Command::Help(command.to_owned())),
			("NOOP", _) => Ok(Command::Noop),
			("QUIT", "") => Ok(Command::Quit),
			_ => Err(ParseCommandError::InvalidCommand),
		}
	}
}

#[derive(Error, Debug)]
pub enum ParseCommandError {
	#[error("unknown command")]
	InvalidCommand,
	#[error("invalid path")]
	InvalidPath(#[from] ParsePathError),
	#[error("invalid domain")]
	InvalidDomain(#[from] ParseDomainError),
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::smtp::args::Path;

	#[test]
	fn parse_mail_with_parameters() {
		let command: Command = "mail from:<alice@example.org> SIZE=1024 BODY=8BITMIME"
			.parse()
			.unwrap();

		assert_eq!(
			command,
			Command::Mail(ReversePath::Regular(
				Path::from_mailbox("alice@example.org").unwrap()
			))
		);
	}

	#[test]
	fn parse_rcpt_with_space_after_colon() {
		let command: Command = "RCPT TO: <bob@example.org>".parse().unwrap();

		assert_eq!(
			command,
			Command::Rcpt(ForwardPath::Regular(
				Path::from_mailbox("bob@example.org").unwrap()
			))
		);
	}

	#[test]
	fn parse_rejects_wrong_keyword() {
		assert!("MAIL TO:<alice@example.org>".parse::<Command>().is_err());
		assert!("RCPT FROM:<alice@example.org>".parse::<Command>().is_err());
		assert!("DATA now".parse::<Command>().is_err());
		assert!("FROB".parse::<Command>().is_err());
	}

	#[test]
	fn display_round_trips_through_the_wire_form() {
		let mail = Command::Mail(ReversePath::Null);
		assert_eq!(mail.to_string(), "MAIL FROM:<>");

		let ehlo = Command::Ehlo("relay.example.com".parse().unwrap());
		assert_eq!(ehlo.to_string(), "EHLO relay.example.com");
		assert_eq!(Command::Help(String::new()).to_string(), "HELP");
	}
}
