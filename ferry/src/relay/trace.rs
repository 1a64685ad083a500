use std::net::{IpAddr, SocketAddr};

use time::{macros::format_description, OffsetDateTime, UtcOffset};

use crate::smtp::args::Path;

use super::MessageId;

/// The `Received:` header put in front of every relayed message.
pub struct TraceHeader<'a> {
	pub client_hostname: &'a str,
	pub remote: SocketAddr,
	pub server_hostname: &'a str,
	pub local: IpAddr,
	pub id: &'a MessageId,
	pub recipient: &'a Path,
}

impl TraceHeader<'_> {
	pub fn render(&self, at: OffsetDateTime) -> String {
		format!(
			"Received: from {} [{}]\n        by {} [{}] id {}\n        for <{}>\n        {}\n",
			self.client_hostname,
			self.remote,
			self.server_hostname,
			self.local,
			self.id,
			self.recipient.mailbox(),
			timestamp(at),
		)
	}
}

/// The current time at `offset`
pub fn now(offset: UtcOffset) -> OffsetDateTime {
	OffsetDateTime::now_utc().to_offset(offset)
}

/// `Mon, 02 Jan 2006 15:04:05 -0700 (ZONE)`. Without a zone database the
/// zone name is only known for UTC, anything else repeats the offset.
fn timestamp(at: OffsetDateTime) -> String {
	let format = format_description!(
		"[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] [offset_hour sign:mandatory][offset_minute]"
	);
	let offset_format = format_description!("[offset_hour sign:mandatory][offset_minute]");

	let formatted = at.format(format).unwrap_or_default();
	let zone = if at.offset().is_utc() {
		String::from("UTC")
	} else {
		at.format(offset_format).unwrap_or_default()
	};

	format!("{} ({})", formatted, zone)
}

#[cfg(test)]
mod test {
	use time::{macros::datetime, UtcOffset};

	use super::*;

	#[test]
	fn renders_exactly() {
		let id = MessageId("m123".into());
		let recipient = Path::from_mailbox("bob@example.org").unwrap();

		let header = TraceHeader {
			client_hostname: "mail.example.com",
			remote: "203.0.113.5:51000".parse().unwrap(),
			server_hostname: "relay.local",
			local: "10.0.0.1".parse().unwrap(),
			id: &id,
			recipient: &recipient,
		};

		assert_eq!(
			header.render(datetime!(2023-03-07 09:05:01 UTC)),
			"Received: from mail.example.com [203.0.113.5:51000]\n        by relay.local [10.0.0.1] id m123\n        for <bob@example.org>\n        Tue, 07 Mar 2023 09:05:01 +0000 (UTC)\n"
		);
	}

	#[test]
	fn non_utc_offsets_repeat_the_offset() {
		let at = datetime!(2023-03-07 09:05:01 UTC)
			.to_offset(UtcOffset::from_hms(-5, -30, 0).unwrap());

		assert_eq!(timestamp(at), "Tue, 07 Mar 2023 03:35:01 -0530 (-0530)");
	}

	#[test]
	fn now_is_at_the_given_offset() {
		let offset = UtcOffset::from_hms(-5, -30, 0).unwrap();

		assert_eq!(now(offset).offset(), offset);
		assert!(now(UtcOffset::UTC).offset().is_utc());
	}

	#[test]
	fn ipv6_addresses() {
		let id = MessageId("m1".into());
		let recipient = Path::from_mailbox("bob@example.org").unwrap();

		let header = TraceHeader {
			client_hostname: "unknown",
			remote: "[2001:db8::5]:51000".parse().unwrap(),
			server_hostname: "relay.local",
			local: "2001:db8::1".parse().unwrap(),
			id: &id,
			recipient: &recipient,
		};

		assert!(header
			.render(datetime!(2023-03-07 09:05:01 UTC))
			.starts_with("Received: from unknown [[2001:db8::5]:51000]\n        by relay.local [2001:db8::1]"));
	}
}
