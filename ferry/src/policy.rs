use std::collections::{hash_map::Entry, HashMap};

use thiserror::Error;

use crate::smtp::args::{ForwardPath, ParsePathError, Path};

/// The forward map, inverted. Every address we accept mail for points at the
/// address it gets relayed to. Anything not in here is denied.
#[derive(Clone, Debug)]
pub struct RelayPolicy {
	forwards: HashMap<String, Path>,
}

impl RelayPolicy {
	/// Builds the policy from `(target, sources)` pairs, the way they're
	/// written in the configuration file.
	pub fn from_forwards<'a, I, S>(forwards: I) -> Result<Self, PolicyError>
	where
		I: IntoIterator<Item = (&'a str, S)>,
		S: IntoIterator<Item = &'a str>,
	{
		let mut map = HashMap::new();

		for (target, sources) in forwards {
			let target_path = parse_address(target)?;

			for source in sources {
				let source_path = parse_address(source)?;

				match map.entry(source_path.canonical_mailbox()) {
					Entry::Occupied(_) => {
						return Err(PolicyError::DuplicateSource(source.to_owned()))
					}
					Entry::Vacant(vacant) => {
						vacant.insert(target_path.clone());
					}
				}
			}
		}

		if map.is_empty() {
			return Err(PolicyError::NoForwards);
		}

		Ok(Self { forwards: map })
	}

	/// Where mail for this recipient should go, if anywhere. Postmaster is
	/// never relayed.
	pub fn lookup(&self, recipient: &ForwardPath) -> Option<&Path> {
		match recipient {
			ForwardPath::Postmaster => None,
			ForwardPath::Regular(path) => self.forwards.get(&path.canonical_mailbox()),
		}
	}
}

fn parse_address(address: &str) -> Result<Path, PolicyError> {
	Path::from_mailbox(address.trim()).map_err(|source| PolicyError::InvalidAddress {
		address: address.to_owned(),
		source,
	})
}

#[derive(Debug, Error)]
pub enum PolicyError {
	#[error("the forward map has no entries")]
	NoForwards,
	#[error("'{address}' is not a valid address")]
	InvalidAddress {
		address: String,
		source: ParsePathError,
	},
	#[error("'{0}' is forwarded to more than one target")]
	DuplicateSource(String),
}

#[cfg(test)]
mod test {
	use super::*;

	fn recipient(mailbox: &str) -> ForwardPath {
		ForwardPath::Regular(Path::from_mailbox(mailbox).unwrap())
	}

	#[test]
	fn inverts_the_forward_map() {
		let policy = RelayPolicy::from_forwards([
			("alice@example.net", vec!["alice@relay.local", "a.smith@relay.local"]),
			("bob@example.org", vec!["bob@relay.local"]),
		])
		.unwrap();

		assert_eq!(
			policy.lookup(&recipient("alice@relay.local")).unwrap().mailbox(),
			"alice@example.net"
		);
		assert_eq!(
			policy.lookup(&recipient("a.smith@relay.local")).unwrap().mailbox(),
			"alice@example.net"
		);
		assert_eq!(
			policy.lookup(&recipient("bob@relay.local")).unwrap().mailbox(),
			"bob@example.org"
		);
	}

	#[test]
	fn absent_and_postmaster_are_denied() {
		let policy =
			RelayPolicy::from_forwards([("alice@example.net", ["alice@relay.local"])]).unwrap();

		assert!(policy.lookup(&recipient("mallory@relay.local")).is_none());
		assert!(policy.lookup(&ForwardPath::Postmaster).is_none());
	}

	#[test]
	fn domain_is_case_insensitive_local_part_is_not() {
		let policy =
			RelayPolicy::from_forwards([("alice@example.net", ["Alice@Relay.Local"])]).unwrap();

		assert!(policy.lookup(&recipient("Alice@relay.local")).is_some());
		assert!(policy.lookup(&recipient("alice@relay.local")).is_none());
	}

	#[test]
	fn load_errors() {
		let empty: [(&str, Vec<&str>); 0] = [];
		assert!(matches!(
			RelayPolicy::from_forwards(empty),
			Err(PolicyError::NoForwards)
		));

		assert!(matches!(
			RelayPolicy::from_forwards([("alice@example.net", Vec::<&str>::new())]),
			Err(PolicyError::NoForwards)
		));

		assert!(matches!(
			RelayPolicy::from_forwards([("not an address", ["alice@relay.local"])]),
			Err(PolicyError::InvalidAddress { .. })
		));

		assert!(matches!(
			RelayPolicy::from_forwards([
				("alice@example.net", vec!["shared@relay.local"]),
				("bob@example.org", vec!["SHARED@relay.local", "shared@RELAY.local"]),
			]),
			Err(PolicyError::DuplicateSource(source)) if source == "shared@RELAY.local"
		));
	}
}
