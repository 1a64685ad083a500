use thiserror::Error;

use super::Validator;

/// The part of a mailbox before the `@`. Kept verbatim, since RFC 5321 says
/// only the destination host may interpret it (case included).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LocalPart(String);

impl LocalPart {
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl std::fmt::Display for LocalPart {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for LocalPart {
	type Err = InvalidLocalPart;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if Validator::validate_local_part(s) {
			Ok(Self(s.to_owned()))
		} else {
			Err(InvalidLocalPart::InvalidSyntax)
		}
	}
}

#[derive(Error, Debug)]
pub enum InvalidLocalPart {
	#[error("invalid local part syntax")]
	InvalidSyntax,
}
