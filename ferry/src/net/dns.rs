use std::net::IpAddr;

use async_trait::async_trait;
use hickory_resolver::{
	config::{ResolverConfig, ResolverOpts},
	error::{ResolveError, ResolveErrorKind},
	proto::op::ResponseCode,
	TokioAsyncResolver,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Name lookups the relay needs: who is connecting to us, and where mail for
/// a domain should go.
#[async_trait]
pub trait Resolver: Send + Sync {
	/// The first PTR name for `ip`, without the trailing root dot.
	async fn reverse_lookup(&self, ip: IpAddr) -> Result<String, DnsError>;

	/// The hosts accepting mail for `domain`, most preferred first. Falls
	/// back to the domain's own addresses when it has no MX records. An
	/// empty list means there is nowhere to send it.
	async fn mail_exchangers(&self, domain: &str) -> Result<Vec<String>, DnsError>;
}

pub struct DnsResolver {
	resolver: TokioAsyncResolver,
}

impl DnsResolver {
	pub fn new(config: ResolverConfig, options: ResolverOpts) -> Self {
		Self {
			resolver: TokioAsyncResolver::tokio(config, options),
		}
	}

	/// Uses the system resolver configuration, or the library default if it
	/// can't be read.
	pub fn from_system_conf() -> Self {
		match TokioAsyncResolver::tokio_from_system_conf() {
			Ok(resolver) => Self { resolver },
			Err(err) => {
				warn!("failed to read the system resolver configuration, using the default: {err}");
				Self::new(ResolverConfig::default(), ResolverOpts::default())
			}
		}
	}

	async fn addresses(&self, domain: &str) -> Result<Vec<String>, DnsError> {
		match self.resolver.lookup_ip(absolute(domain)).await {
			Ok(lookup) => Ok(lookup.iter().map(|ip| ip.to_string()).collect()),
			Err(err) if is_empty_answer(&err) => Ok(vec![]),
			Err(err) => Err(DnsError::resolution(domain, &err)),
		}
	}
}

#[async_trait]
impl Resolver for DnsResolver {
	async fn reverse_lookup(&self, ip: IpAddr) -> Result<String, DnsError> {
		let lookup = self.resolver.reverse_lookup(ip).await.map_err(|err| {
			debug!(%ip, "reverse lookup failed: {err}");
			DnsError::NoReverseRecord(ip)
		})?;

		lookup
			.iter()
			.next()
			.map(|name| trim_root(&name.to_string()).to_owned())
			.ok_or(DnsError::NoReverseRecord(ip))
	}

	async fn mail_exchangers(&self, domain: &str) -> Result<Vec<String>, DnsError> {
		match self.resolver.mx_lookup(absolute(domain)).await {
			Ok(lookup) => {
				let exchangers = lookup
					.iter()
					.map(|mx| (mx.preference(), trim_root(&mx.exchange().to_string()).to_owned()))
					.collect();

				Ok(order_by_preference(exchangers))
			}
			// RFC 5321 5.1, the domain itself is the implicit MX
			Err(err) if is_empty_answer(&err) => {
				debug!(domain, "no MX records, falling back to address records");
				self.addresses(domain).await
			}
			Err(err) => Err(DnsError::resolution(domain, &err)),
		}
	}
}

/// The name exists but has no records of the asked for type. NXDOMAIN is a
/// real failure, not an empty answer.
fn is_empty_answer(err: &ResolveError) -> bool {
	matches!(
		err.kind(),
		ResolveErrorKind::NoRecordsFound { response_code, .. } if *response_code != ResponseCode::NXDomain
	)
}

/// Fully qualifies `domain` so the resolver's search list is never applied
fn absolute(domain: &str) -> String {
	if domain.ends_with('.') {
		domain.to_owned()
	} else {
		format!("{domain}.")
	}
}

fn trim_root(name: &str) -> &str {
	name.strip_suffix('.').unwrap_or(name)
}

/// Sorts by ascending preference. The sort is stable, so equal preferences
/// keep the order the resolver gave them in.
pub fn order_by_preference(mut exchangers: Vec<(u16, String)>) -> Vec<String> {
	exchangers.sort_by_key(|(preference, _)| *preference);
	exchangers.into_iter().map(|(_, host)| host).collect()
}

#[derive(Debug, Error)]
pub enum DnsError {
	#[error("no reverse record for {0}")]
	NoReverseRecord(IpAddr),
	#[error("failed to resolve {domain}: {reason}")]
	ResolutionFailed { domain: String, reason: String },
}

impl DnsError {
	fn resolution(domain: &str, err: &ResolveError) -> Self {
		Self::ResolutionFailed {
			domain: domain.to_owned(),
			reason: err.to_string(),
		}
	}
}
