use std::{
	fmt::Display,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Names one relayed message in logs and in its trace header. Ids sort in
/// the order they were made.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub(super) String);

impl MessageId {
	pub fn generate() -> Self {
		let millis = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map(|since| since.as_millis() as u64)
			.unwrap_or_default();
		let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);

		Self(format!(
			"m{:012x}{:06x}{:08x}",
			millis & 0xffff_ffff_ffff,
			sequence & 0xff_ffff,
			rand::random::<u32>()
		))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Display for MessageId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

#[cfg(test)]
mod test {
	use std::collections::HashSet;

	use super::*;

	#[test]
	fn shape() {
		let id = MessageId::generate();

		assert_eq!(id.as_str().len(), 27);
		assert!(id.as_str().starts_with('m'));
		assert!(id.as_str()[1..].chars().all(|c| c.is_ascii_hexdigit()));
	}

	#[test]
	fn unique_and_sorted_by_creation() {
		let ids: Vec<MessageId> = (0..2000).map(|_| MessageId::generate()).collect();

		let unique: HashSet<&MessageId> = ids.iter().collect();
		assert_eq!(unique.len(), ids.len());

		let mut sorted = ids.clone();
		sorted.sort();
		assert_eq!(sorted, ids);
	}
}
