// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Command line definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use coffer_common_secret::SecretString;
use coffer_server_secrets::SecureValue;

/// coffer - administer the secure value store.
#[derive(Parser, Debug)]
#[command(name = "coffer", about = "Administer the coffer secure value store", version)]
pub struct Cli {
	/// TOML configuration file (default: /etc/coffer/server.toml)
	#[arg(long, global = true, env = "COFFER_CONFIG")]
	pub config: Option<PathBuf>,

	/// Identity the operation is performed as
	#[arg(long = "as", global = true, env = "COFFER_AS", default_value = "admin")]
	pub actor: String,

	/// Namespace of the secure value
	#[arg(long, short = 'n', global = true, default_value = "default")]
	pub namespace: String,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Apply the database schema and exit
	Migrate,

	/// Create a secure value
	Create(ValueArgs),

	/// Show a secure value (never includes the plaintext)
	Get { name: String },

	/// Replace the metadata of a secure value; the plaintext changes only when given
	Update(ValueArgs),

	/// List secure values in the namespace
	List {
		/// Label selector, e.g. `env=prod,tier in (db,cache)`
		#[arg(long, short = 'l', default_value = "")]
		selector: String,
	},

	/// Delete a secure value; its history is kept
	Delete { name: String },

	/// Print the plaintext of a secure value
	Decrypt { name: String },

	/// Show the audit history of a secure value
	History { name: String },
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ValueArgs {
	pub name: String,

	#[arg(long, default_value = "")]
	pub title: String,

	/// Plaintext value. Visible in the process list; prefer --value-stdin.
	#[arg(long, conflicts_with = "value_stdin")]
	pub value: Option<String>,

	/// Read the plaintext from stdin
	#[arg(long)]
	pub value_stdin: bool,

	/// API allowed to decrypt the value (repeatable)
	#[arg(long = "api")]
	pub apis: Vec<String>,

	/// Label as KEY=VALUE (repeatable)
	#[arg(long = "label", value_parser = parse_key_value)]
	pub labels: Vec<(String, String)>,

	/// Annotation as KEY=VALUE (repeatable)
	#[arg(long = "annotation", value_parser = parse_key_value)]
	pub annotations: Vec<(String, String)>,
}

impl ValueArgs {
	pub fn to_secure_value(&self, namespace: &str, plaintext: SecretString) -> SecureValue {
		let mut value = SecureValue::new(namespace, self.name.as_str())
			.with_title(self.title.as_str())
			.with_value(plaintext)
			.with_apis(self.apis.iter().cloned());
		for (key, val) in &self.labels {
			value = value.with_label(key.as_str(), val.as_str());
		}
		for (key, val) in &self.annotations {
			value = value.with_annotation(key.as_str(), val.as_str());
		}
		value
	}
}

pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
	let (key, value) = s
		.split_once('=')
		.ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
	if key.is_empty() {
		return Err(format!("empty key in '{s}'"));
	}
	Ok((key.to_string(), value.to_string()))
}

/// Strip the single trailing newline a shell pipe adds.
pub fn trim_stdin_value(mut raw: String) -> String {
	if raw.ends_with('\n') {
		raw.pop();
		if raw.ends_with('\r') {
			raw.pop();
		}
	}
	raw
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn create_parses_repeatable_flags() {
		let cli = Cli::try_parse_from([
			"coffer",
			"--as",
			"user:alice",
			"-n",
			"a",
			"create",
			"db-pass",
			"--title",
			"DB",
			"--value-stdin",
			"--api",
			"svc1",
			"--api",
			"svc2",
			"--label",
			"env=prod",
			"--annotation",
			"note=rotate=monthly",
		])
		.unwrap();

		assert_eq!(cli.actor, "user:alice");
		assert_eq!(cli.namespace, "a");
		let Command::Create(args) = cli.command else {
			panic!("expected create");
		};
		assert!(args.value_stdin);
		assert_eq!(args.apis, vec!["svc1", "svc2"]);
		assert_eq!(args.labels, vec![("env".to_string(), "prod".to_string())]);
		assert_eq!(
			args.annotations,
			vec![("note".to_string(), "rotate=monthly".to_string())]
		);

		let value = args.to_secure_value("a", SecretString::from("s3cr3t"));
		assert_eq!(value.metadata.labels["env"], "prod");
		assert_eq!(value.spec.value.expose(), "s3cr3t");
	}

	#[test]
	fn value_and_value_stdin_conflict() {
		let result = Cli::try_parse_from([
			"coffer",
			"create",
			"db-pass",
			"--value",
			"x",
			"--value-stdin",
		]);
		assert!(result.is_err());
	}

	#[test]
	fn global_flags_default() {
		let cli = Cli::try_parse_from(["coffer", "list"]).unwrap();
		assert_eq!(cli.namespace, "default");
		assert!(matches!(cli.command, Command::List { ref selector } if selector.is_empty()));
	}

	#[test]
	fn malformed_label_is_rejected() {
		assert!(parse_key_value("novalue").is_err());
		assert!(parse_key_value("=v").is_err());
		assert_eq!(parse_key_value("k=").unwrap(), ("k".to_string(), String::new()));
	}

	#[test]
	fn stdin_value_loses_one_newline() {
		assert_eq!(trim_stdin_value("s3cr3t\n".into()), "s3cr3t");
		assert_eq!(trim_stdin_value("s3cr3t\r\n".into()), "s3cr3t");
		assert_eq!(trim_stdin_value("s3cr3t\n\n".into()), "s3cr3t\n");
		assert_eq!(trim_stdin_value("s3cr3t".into()), "s3cr3t");
	}

	proptest! {
		#[test]
		fn key_value_splits_on_first_equals(key in "[a-z][a-z./-]{0,10}", value in "[a-z=]{0,10}") {
			let parsed = parse_key_value(&format!("{key}={value}")).unwrap();
			prop_assert_eq!(parsed, (key, value));
		}
	}
}
