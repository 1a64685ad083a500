use super::{
	localpart::{InvalidLocalPart, LocalPart},
	Domain, ParseDomainError, Validator,
};
use std::{
	fmt::{Display, Formatter},
	str::FromStr,
};
use thiserror::Error;

/// A mailbox, `local-part@domain`. Displays with angle brackets, the way it
/// appears in MAIL and RCPT.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Path {
	pub local_part: LocalPart,
	pub domain: Domain,
}

impl Path {
	pub fn new(local: LocalPart, domain: Domain) -> Self {
		Self {
			local_part: local,
			domain,
		}
	}

	/// Parses a mailbox without the angle brackets, e.g. `bob@example.org`.
	/// This is how addresses are written in the forward map.
	pub fn from_mailbox(naked: &str) -> Result<Self, ParsePathError> {
		if let Some((local_part, domain)) = naked.rsplit_once('@') {
			Ok(Self {
				local_part: local_part.parse()?,
				domain: domain.parse()?,
			})
		} else {
			Err(ParsePathError::NoAtSign)
		}
	}

	/// The bare `local-part@domain` form, without angle brackets.
	pub fn mailbox(&self) -> String {
		format!("{}@{}", self.local_part, self.domain)
	}

	/// The mailbox with its domain lowercased, suitable as a lookup key.
	pub fn canonical_mailbox(&self) -> String {
		format!("{}@{}", self.local_part, self.domain.canonical())
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ForwardPath {
	Postmaster,
	Regular(Path),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ReversePath {
	#[default]
	Null,
	Regular(Path),
}

impl Display for Path {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "<{}@{}>", self.local_part, self.domain)
	}
}

impl Display for ForwardPath {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Postmaster => write!(f, "<postmaster>"),
			Self::Regular(path) => write!(f, "{}", path),
		}
	}
}

impl Display for ReversePath {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Null => write!(f, "<>"),
			Self::Regular(path) => write!(f, "{}", path),
		}
	}
}

impl From<Path> for ForwardPath {
	fn from(path: Path) -> Self {
		Self::Regular(path)
	}
}

impl FromStr for Path {
	type Err = ParsePathError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let stripped = s
			.strip_prefix('<')
			.and_then(|s| s.strip_suffix('>'))
			.ok_or(ParsePathError::Brackets)?;

		match stripped.strip_prefix('@') {
			// A source route. Check it, then throw it away
			Some(_) => match stripped.split_once(':') {
				Some((adl, mailbox)) if Validator::validate_adl(adl) => Self::from_mailbox(mailbox),
				Some(_) => Err(ParsePathError::InvalidAdlSyntax),
				None => Err(ParsePathError::AdlWithoutColon),
			},
			None => Self::from_mailbox(stripped),
		}
	}
}

impl FromStr for ForwardPath {
	type Err = ParsePathError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.eq_ignore_ascii_case("<postmaster>") {
			Ok(Self::Postmaster)
		} else {
			Ok(Self::Regular(s.parse()?))
		}
	}
}

impl FromStr for ReversePath {
	type Err = ParsePathError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s == "<>" {
			Ok(Self::Null)
		} else {
			Ok(Self::Regular(s.parse()?))
		}
	}
}

#[derive(Error, Debug)]
pub enum ParsePathError {
	#[error("no enclosing angle brackets")]
	Brackets,
	#[error("no @")]
	NoAtSign,
	#[error("ADL syntax without colon")]
	AdlWithoutColon,
	#[error("Invalid ADL syntax")]
	InvalidAdlSyntax,
	#[error("invalid local part")]
	InvalidLocalPart(#[from] InvalidLocalPart),
	#[error("invalid domain")]
	InvalidDomain(#[from] ParseDomainError),
}
