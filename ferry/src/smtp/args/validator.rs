use pest::Parser;
use pest_derive::*;

#[derive(Parser)]
#[grammar = "smtp/args/smtp_grammar.pest"]
pub struct GrammarParser;

pub struct Validator;
impl Validator {
	pub fn validate_local_part(local: &str) -> bool {
		GrammarParser::parse(Rule::validate_local_part, local).is_ok()
	}

	pub fn validate_domain(domain: &str) -> bool {
		GrammarParser::parse(Rule::validate_domain, domain).is_ok()
	}

	/// Checks a source route like `@one.example,@two.example`. The route is
	/// only validated; RFC 5321 says relays must ignore it.
	pub fn validate_adl(adl: &str) -> bool {
		GrammarParser::parse(Rule::validate_adl, adl).is_ok()
	}
}
