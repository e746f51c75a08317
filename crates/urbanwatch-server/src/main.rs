//! Urbanwatch server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered with
//! `URBANWATCH_*` environment variables, opens the SQLite store, and serves
//! the JSON API over HTTP.
//!
//! # Bootstrapping an administrator
//!
//! ```
//! cargo run -p urbanwatch-server -- --create-admin alice
//! ```
//!
//! prompts for a password on stdin, creates the account, and exits.

use std::{
  io::{self, BufRead, Write},
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use urbanwatch_core::{
  identity::{NewIdentity, Role},
  store::IncidentStore,
};
use urbanwatch_server::{AppState, ServerConfig, auth::hash_password};
use urbanwatch_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Urbanwatch incident reporting server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Create an administrator with this username (password read from
  /// stdin) and exit.
  #[arg(long, value_name = "USERNAME")]
  create_admin: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("URBANWATCH"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  if let Some(username) = cli.create_admin {
    return create_admin(&store, username).await;
  }

  let state = AppState {
    store:  Arc::new(store),
    config: Arc::new(server_cfg.clone()),
  };

  let app = urbanwatch_server::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

async fn create_admin(store: &SqliteStore, username: String) -> anyhow::Result<()> {
  if store.get_credentials(username.clone()).await?.is_some() {
    anyhow::bail!("user {username:?} already exists");
  }

  let password = read_password()?;
  anyhow::ensure!(!password.is_empty(), "password may not be empty");

  let identity = store
    .create_identity(NewIdentity {
      username,
      email: String::new(),
      first_name: String::new(),
      last_name: String::new(),
      role: Role::Administrator,
      password_hash: hash_password(&password)?,
    })
    .await
    .context("failed to create administrator")?;

  println!("created administrator {} ({})", identity.username, identity.id);
  Ok(())
}

/// Read a password line from stdin.
fn read_password() -> anyhow::Result<String> {
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(
    line
      .trim_end_matches('\n')
      .trim_end_matches('\r')
      .to_owned(),
  )
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
