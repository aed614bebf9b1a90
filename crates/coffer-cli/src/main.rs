// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `coffer` binary: wires configuration, storage, keepers and the
//! authorization gate into a [`SecureValueService`] and runs one command.

use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use coffer_common_secret::SecretString;
use coffer_server_auth::{AllowAllAuthorizer, Identity, RequestContext};
use coffer_server_config::{KeeperConfig, KeeperKind, ServerConfig};
use coffer_server_db::{create_pool, run_migrations, SecureValueRepository};
use coffer_server_secrets::{
	AesGcmKeeper, Keepers, PlaceholderKeeper, SecureValueService, SecureValueStore,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use cli::{trim_stdin_value, Cli, Command, ValueArgs};

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	let config = match &cli.config {
		Some(path) => coffer_server_config::load_config_with_file(path)?,
		None => coffer_server_config::load_config()?,
	};

	// stdout carries command output only.
	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| config.logging.level.clone().into()),
		)
		.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
		.init();

	tracing::debug!(
		database = %config.database.url,
		keeper = %config.keeper.kind,
		actor = %cli.actor,
		namespace = %cli.namespace,
		"starting coffer"
	);

	let pool = create_pool(&config.database.url, config.database.max_connections).await?;
	run_migrations(&pool).await?;

	if let Command::Migrate = cli.command {
		println!("migrations applied");
		return Ok(());
	}

	let store = SecureValueService::new(
		Arc::new(SecureValueRepository::new(pool)),
		build_keepers(&config.keeper)?,
		Arc::new(AllowAllAuthorizer),
	);
	let ctx = request_context(&cli.actor, &config)?;

	run(&store, &ctx, &cli.namespace, cli.command).await
}

async fn run(
	store: &dyn SecureValueStore,
	ctx: &RequestContext,
	namespace: &str,
	command: Command,
) -> Result<()> {
	match command {
		Command::Migrate => {}
		Command::Create(args) => {
			let plaintext = read_plaintext(&args)?;
			let created = store
				.create(ctx, args.to_secure_value(namespace, plaintext))
				.await?;
			print_json(&created)?;
		}
		Command::Get { name } => {
			print_json(&store.read(ctx, namespace, &name).await?)?;
		}
		Command::Update(args) => {
			let plaintext = read_plaintext(&args)?;
			let updated = store
				.update(ctx, args.to_secure_value(namespace, plaintext))
				.await?;
			print_json(&updated)?;
		}
		Command::List { selector } => {
			print_json(&store.list(ctx, namespace, &selector).await?)?;
		}
		Command::Delete { name } => {
			let deleted = store.delete(ctx, namespace, &name).await?;
			print_json(&serde_json::json!({ "deleted": deleted }))?;
		}
		Command::Decrypt { name } => {
			let revealed = store.decrypt(ctx, namespace, &name).await?;
			println!("{}", revealed.spec.value.expose());
		}
		Command::History { name } => {
			print_json(&store.history(ctx, namespace, &name, None).await?)?;
		}
	}
	Ok(())
}

/// Keepers for the configured kind. The placeholder keeper stays registered
/// so rows written before switching to AES-GCM still decrypt.
fn build_keepers(config: &KeeperConfig) -> Result<Keepers> {
	match config.kind {
		KeeperKind::Placeholder => {
			tracing::warn!("placeholder keeper in use; values are not encrypted");
			Ok(Keepers::new(Arc::new(PlaceholderKeeper)))
		}
		KeeperKind::AesGcm => {
			let key = config
				.master_key
				.as_ref()
				.context("aes-gcm keeper requires COFFER_SERVER_KEEPER_MASTER_KEY")?;
			let keeper = AesGcmKeeper::from_base64(key)?;
			Ok(Keepers::new(Arc::new(keeper)).with_keeper(Arc::new(PlaceholderKeeper)))
		}
	}
}

/// Context for one command: the acting identity, the configured deadline
/// and cancellation on Ctrl-C.
fn request_context(actor: &str, config: &ServerConfig) -> Result<RequestContext> {
	let token = CancellationToken::new();
	let on_interrupt = token.clone();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			on_interrupt.cancel();
		}
	});

	let identity = Identity::new(actor).context("invalid --as identity")?;
	let mut ctx = RequestContext::new(identity).with_cancellation(token);
	if let Some(timeout) = config.store.operation_timeout() {
		ctx = ctx.with_timeout(timeout);
	}
	Ok(ctx)
}

fn read_plaintext(args: &ValueArgs) -> Result<SecretString> {
	if args.value_stdin {
		let mut raw = String::new();
		std::io::stdin()
			.read_to_string(&mut raw)
			.context("failed to read value from stdin")?;
		return Ok(SecretString::new(trim_stdin_value(raw)));
	}
	Ok(args.value.clone().map(SecretString::new).unwrap_or_default())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}
