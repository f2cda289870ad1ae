use childnews::api::Child;
use childnews::cache::ResourceKind;
use childnews::config::{ApiConfig, Config};
use childnews::logging;
use childnews::session::Session;
use childnews::store::Status;
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "childnews")]
#[command(about = "Fetch a child's news, serving the cached copy while revalidating")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/childnews/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Id of the child whose collection to fetch
  #[arg(long)]
  child: String,

  /// Which collection to fetch
  #[arg(short, long, value_enum, default_value_t = ResourceKind::News)]
  kind: ResourceKind,

  /// Use the simulated backend regardless of config
  #[arg(long)]
  fake: bool,

  /// Print every state transition as a JSON line
  #[arg(short, long)]
  watch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init()?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Override backend if specified on command line
  let config = if args.fake {
    Config {
      api: ApiConfig {
        fake: true,
        ..config.api
      },
      ..config
    }
  } else {
    config
  };

  let session = Session::from_config(&config)?;
  if !session.identity().is_authenticated() {
    return Err(eyre!(
      "Not logged in. Set CHILDNEWS_API_TOKEN or run with --fake."
    ));
  }

  let child = Child::new(args.child);
  let mut updates = session.subscribe(args.kind, &child);

  let settled = loop {
    let state = updates
      .recv()
      .await
      .ok_or_else(|| eyre!("Store closed before {} settled", args.kind))?;

    if args.watch {
      println!("{}", serde_json::to_string(&state)?);
    }
    if state.status.is_settled() {
      break state;
    }
  };

  if !args.watch {
    println!("{}", serde_json::to_string_pretty(&settled)?);
  }

  if settled.status == Status::Error {
    let reason = settled
      .error
      .as_ref()
      .map(|e| e.to_string())
      .unwrap_or_default();
    return Err(eyre!(
      "Giving up on {} for child {}: {}",
      args.kind,
      child.id,
      reason
    ));
  }

  Ok(())
}
