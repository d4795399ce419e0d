//! Keepmenu - dmenu/rofi frontend for KeePass databases
//!
//! The first invocation becomes a daemon holding the unlocked database.
//! Later invocations hand their request to it and exit.

mod config;
mod controller;
mod daemon;
mod edit;
mod editor;
mod groups;
mod ipc;
mod menu;
mod selector;
mod unlock;
mod view;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use config::Config;
use controller::{Controller, DefaultAction};
use daemon::{Daemon, Worker};
use ipc::{ClientOutcome, IpcError};
use menu::{Dmenu, Menu};

/// Keepmenu - KeePass front-end for dmenu and rofi
#[derive(Parser, Debug)]
#[command(name = "keepmenu")]
#[command(about = "Read and autotype KeePass entries through dmenu or rofi")]
struct Args {
    /// Type the password of the selected entry
    #[arg(short = 'a', long, group = "action")]
    type_password: bool,

    /// Type the username of the selected entry
    #[arg(short = 'u', long, group = "action")]
    type_username: bool,

    /// Autotype the selected entry
    #[arg(short = 't', long, group = "action")]
    type_entry: bool,

    /// Show the fields of the selected entry
    #[arg(short = 'v', long, group = "action")]
    view_entry: bool,

    /// Use this config file instead of the default one
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

impl Args {
    fn action(&self) -> DefaultAction {
        if self.type_password {
            DefaultAction::TypePassword
        } else if self.type_username {
            DefaultAction::TypeUsername
        } else if self.type_entry {
            DefaultAction::TypeEntry
        } else if self.view_entry {
            DefaultAction::ViewEntry
        } else {
            DefaultAction::None
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("keepmenu=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let action = args.action();

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            Dmenu::new(&Config::default()).error(&format!("Config file error: {err:#}"));
            return Err(err);
        }
    };
    tracing::debug!("Using config {}", config.path().display());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(run(config, action))
}

/// Hand `action` to a running daemon, or become the daemon.
async fn run(config: Config, action: DefaultAction) -> Result<()> {
    let auth_path = ipc::auth_path()?;

    let token = match ipc::hand_off(&auth_path, action).await {
        Ok(ClientOutcome::Delivered) => {
            tracing::info!("Request passed to running daemon");
            return Ok(());
        }
        Ok(ClientOutcome::NoDaemon(token)) => token,
        Err(IpcError::Closed) => {
            Dmenu::new(&config).error("Keepmenu daemon is shutting down. Please try again.");
            return Ok(());
        }
        Err(err @ (IpcError::Corrupt(_) | IpcError::Denied)) => {
            tracing::warn!("{}", err);
            ipc::self_heal(&auth_path);
            Dmenu::new(&config).error("Keepmenu daemon did not answer. Please try again.");
            return Ok(());
        }
        Err(err) => return Err(err).context("Failed to contact keepmenu daemon"),
    };

    if let Err(err) = config.check_type_library() {
        ipc::remove_auth_file(&auth_path);
        Dmenu::new(&config).error(&format!("{err:#}"));
        return Err(err);
    }

    let listener = match TcpListener::bind((Ipv4Addr::LOCALHOST, token.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            ipc::remove_auth_file(&auth_path);
            return Err(err).with_context(|| format!("Failed to listen on port {}", token.port));
        }
    };

    let period = Duration::from_secs(config.database.pw_cache_period_min.saturating_mul(60));
    tracing::info!(
        "Starting daemon, cache timeout {} min",
        config.database.pw_cache_period_min
    );
    Daemon::new(period)
        .run(listener, token, auth_path, action, move |worker| serve(config, worker))
        .await
}

/// Unlock a database and run menu cycles until the daemon stops.
fn serve(mut config: Config, worker: Worker) -> Result<()> {
    let menu = Dmenu::new(&config);
    let Some(session) = unlock::unlock(&mut config, &menu)? else {
        tracing::info!("No database unlocked, exiting");
        return Ok(());
    };

    let backend = config.database.type_library.backend();
    let controller = Controller::new(
        Arc::new(config),
        Box::new(menu),
        backend,
        session,
        worker.state(),
    );
    controller.run(worker);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_select_action() {
        let args = Args::parse_from(["keepmenu"]);
        assert_eq!(args.action(), DefaultAction::None);

        let args = Args::parse_from(["keepmenu", "--type-password"]);
        assert_eq!(args.action(), DefaultAction::TypePassword);

        let args = Args::parse_from(["keepmenu", "--view-entry", "-c", "/tmp/k.toml"]);
        assert_eq!(args.action(), DefaultAction::ViewEntry);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/k.toml")));
    }

    #[test]
    fn test_action_flags_are_exclusive() {
        assert!(Args::try_parse_from(["keepmenu", "--type-entry", "--type-username"]).is_err());
    }
}
