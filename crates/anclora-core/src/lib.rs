pub mod alerts;
pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod controller;
pub mod datastore;
pub mod datetime;
pub mod desktop;
pub mod dispatch;
pub mod error;
pub mod permission;
pub mod render;
pub mod scheduler;
pub mod worker;

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use error::NotifyError;

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting anclora CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.anclorarc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store =
    datastore::DataStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open datastore at \
         {}",
        data_dir.display()
      )
    })?;

  let timezone =
    datetime::project_timezone();
  let renderer =
    render::Renderer::new(&cfg, timezone)?;
  let command = cli
    .command
    .unwrap_or(cli::Command::Plan);

  let session = commands::Session {
    cfg,
    store: Arc::new(store),
    renderer,
    timezone,
    snapshot_file: cli.snapshot,
    user: cli.user
  };

  let runtime =
    tokio::runtime::Builder::new_multi_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async runtime"
      )?;
  runtime.block_on(commands::dispatch(
    session, command
  ))?;

  info!("done");
  Ok(())
}
