// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Label selectors for `list`.
//!
//! Syntax is a comma-separated list of requirements, all of which must hold:
//!
//! | Form            | Matches when                               |
//! |-----------------|--------------------------------------------|
//! | `k=v`, `k==v`   | label `k` is present and equals `v`        |
//! | `k!=v`          | label `k` is absent or differs from `v`    |
//! | `k`             | label `k` is present                       |
//! | `!k`            | label `k` is absent                        |
//! | `k in (a,b)`    | label `k` is present and one of the values |
//! | `k notin (a,b)` | label `k` is absent or none of the values  |
//!
//! The empty selector matches every label set.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{SecretsError, SecretsResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operator {
	Equals(String),
	NotEquals(String),
	Exists,
	DoesNotExist,
	In(Vec<String>),
	NotIn(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Requirement {
	key: String,
	op: Operator,
}

impl Requirement {
	fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
		let current = labels.get(&self.key);
		match &self.op {
			Operator::Equals(v) => current == Some(v),
			Operator::NotEquals(v) => current != Some(v),
			Operator::Exists => current.is_some(),
			Operator::DoesNotExist => current.is_none(),
			Operator::In(values) => current.is_some_and(|c| values.contains(c)),
			Operator::NotIn(values) => !current.is_some_and(|c| values.contains(c)),
		}
	}
}

/// A parsed label selector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
	requirements: Vec<Requirement>,
}

impl LabelSelector {
	/// Selector that matches everything.
	pub fn everything() -> Self {
		Self::default()
	}

	pub fn parse(input: &str) -> SecretsResult<Self> {
		let input = input.trim();
		if input.is_empty() {
			return Ok(Self::everything());
		}

		let requirements = split_terms(input)?
			.into_iter()
			.map(parse_requirement)
			.collect::<SecretsResult<Vec<_>>>()?;

		Ok(Self { requirements })
	}

	pub fn is_everything(&self) -> bool {
		self.requirements.is_empty()
	}

	pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
		self.requirements.iter().all(|r| r.matches(labels))
	}
}

impl std::str::FromStr for LabelSelector {
	type Err = SecretsError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

impl fmt::Display for LabelSelector {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let terms: Vec<String> = self
			.requirements
			.iter()
			.map(|r| match &r.op {
				Operator::Equals(v) => format!("{}={}", r.key, v),
				Operator::NotEquals(v) => format!("{}!={}", r.key, v),
				Operator::Exists => r.key.clone(),
				Operator::DoesNotExist => format!("!{}", r.key),
				Operator::In(vs) => format!("{} in ({})", r.key, vs.join(",")),
				Operator::NotIn(vs) => format!("{} notin ({})", r.key, vs.join(",")),
			})
			.collect();
		f.write_str(&terms.join(","))
	}
}

fn invalid(input: &str, reason: &str) -> SecretsError {
	SecretsError::InvalidArgument(format!("invalid label selector '{input}': {reason}"))
}

/// Split on commas outside parentheses.
fn split_terms(input: &str) -> SecretsResult<Vec<&str>> {
	let mut terms = Vec::new();
	let mut depth = 0usize;
	let mut start = 0usize;

	for (i, c) in input.char_indices() {
		match c {
			'(' => {
				if depth > 0 {
					return Err(invalid(input, "nested parentheses"));
				}
				depth += 1;
			}
			')' => {
				if depth == 0 {
					return Err(invalid(input, "unbalanced parentheses"));
				}
				depth -= 1;
			}
			',' if depth == 0 => {
				terms.push(input[start..i].trim());
				start = i + 1;
			}
			_ => {}
		}
	}
	if depth != 0 {
		return Err(invalid(input, "unbalanced parentheses"));
	}
	terms.push(input[start..].trim());

	if terms.iter().any(|t| t.is_empty()) {
		return Err(invalid(input, "empty requirement"));
	}
	Ok(terms)
}

fn parse_requirement(term: &str) -> SecretsResult<Requirement> {
	if let Some(rest) = term.strip_prefix('!') {
		let key = rest.trim();
		validate_key(term, key)?;
		return Ok(Requirement {
			key: key.to_string(),
			op: Operator::DoesNotExist,
		});
	}

	let key_end = term
		.char_indices()
		.find(|(_, c)| !is_key_char(*c))
		.map(|(i, _)| i)
		.unwrap_or(term.len());
	let key = &term[..key_end];
	validate_key(term, key)?;
	let rest = term[key_end..].trim_start();

	let op = if rest.is_empty() {
		Operator::Exists
	} else if let Some(v) = rest.strip_prefix("!=") {
		Operator::NotEquals(parse_value(term, v)?)
	} else if let Some(v) = rest.strip_prefix("==") {
		Operator::Equals(parse_value(term, v)?)
	} else if let Some(v) = rest.strip_prefix('=') {
		Operator::Equals(parse_value(term, v)?)
	} else if let Some(v) = rest.strip_prefix("notin") {
		Operator::NotIn(parse_set(term, v)?)
	} else if let Some(v) = rest.strip_prefix("in") {
		Operator::In(parse_set(term, v)?)
	} else {
		return Err(invalid(term, "unknown operator"));
	};

	Ok(Requirement {
		key: key.to_string(),
		op,
	})
}

fn parse_value(term: &str, raw: &str) -> SecretsResult<String> {
	let value = raw.trim();
	if !value.chars().all(is_value_char) {
		return Err(invalid(term, "invalid value"));
	}
	Ok(value.to_string())
}

fn parse_set(term: &str, raw: &str) -> SecretsResult<Vec<String>> {
	let inner = raw
		.trim()
		.strip_prefix('(')
		.and_then(|s| s.strip_suffix(')'))
		.ok_or_else(|| invalid(term, "expected parenthesised value list"))?;

	let values = inner
		.split(',')
		.map(|v| {
			let v = v.trim();
			if v.is_empty() {
				Err(invalid(term, "empty value in list"))
			} else {
				parse_value(term, v)
			}
		})
		.collect::<SecretsResult<Vec<_>>>()?;

	Ok(values)
}

fn validate_key(term: &str, key: &str) -> SecretsResult<()> {
	if key.is_empty() {
		return Err(invalid(term, "missing key"));
	}
	if !key.chars().all(is_key_char) {
		return Err(invalid(term, "invalid key"));
	}
	Ok(())
}

fn is_key_char(c: char) -> bool {
	c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')
}

fn is_value_char(c: char) -> bool {
	c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}
