use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use keeper_core::persistence::StorageStats;
use keeper_core::{DataPaths, Store, StoreConfig};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;

const CONFIG_FILE_NAME: &str = "keeper.config.json";

/// Keeper store daemon
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Root directory (defaults to $KEEPER_HOME, then ~/.keeper)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Store config file (defaults to <root>/keeper.config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the write debounce window
    #[arg(long, global = true)]
    debounce_ms: Option<u64>,

    /// Override the periodic backup interval (0 disables)
    #[arg(long, global = true)]
    backup_interval_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Keep the store open until Ctrl+C or SIGTERM
    Run,
    /// Print storage statistics as JSON
    Stats,
    /// Take a manual backup
    Backup,
    /// Apply retention caps and write the result
    Compact,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let paths = DataPaths::resolve(cli.data_dir.as_deref())?;
    let config = load_config(&cli, &paths)?;
    log::debug!("Using data root {:?}", paths.root);

    match cli.command {
        Commands::Run => serve(&paths, config).await,
        Commands::Stats => {
            // Read-only: opening the store would add snapshots.
            let stats = StorageStats::inspect(&paths.data_dir, &paths.backup_dir, &config);
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Commands::Backup | Commands::Compact => maintain(cli.command, &paths, config).await,
    }
}

async fn serve(paths: &DataPaths, config: StoreConfig) -> Result<(), Box<dyn Error>> {
    let store = Store::open(paths, config).await;

    let mut status = store.status_bus().subscribe();
    let relay = tokio::spawn(async move {
        loop {
            match status.recv().await {
                Ok(event) => log::debug!("[{:?}] {}", event.kind, event.message),
                Err(RecvError::Lagged(n)) => log::debug!("Status relay skipped {} messages", n),
                Err(RecvError::Closed) => break,
            }
        }
    });
    log::info!("Store open at {:?}", store.primary_path());

    shutdown_signal().await;
    store.shutdown().await;
    relay.abort();
    Ok(())
}

/// One-shot commands open the store without startup/shutdown snapshots.
async fn maintain(
    command: Commands,
    paths: &DataPaths,
    config: StoreConfig,
) -> Result<(), Box<dyn Error>> {
    let store = Store::builder(&paths.data_dir, &paths.backup_dir)
        .config(config)
        .lifecycle_backups(false)
        .open()
        .await;

    let result: Result<(), Box<dyn Error>> = match command {
        Commands::Backup => match store.create_manual_backup().await {
            Some(path) => {
                println!("{}", path.display());
                Ok(())
            }
            None => Err("backup failed, see log for details".into()),
        },
        Commands::Compact => match store.compact_now().await {
            Ok(removed) => {
                println!("removed {removed} entries");
                Ok(())
            }
            Err(e) => Err(e.into()),
        },
        Commands::Run | Commands::Stats => Ok(()),
    };

    store.shutdown().await;
    result
}

/// Read the config file (if any) and apply command-line overrides.
fn load_config(cli: &Cli, paths: &DataPaths) -> Result<StoreConfig, Box<dyn Error>> {
    let path = config_path(cli.config.as_deref(), paths);
    let mut config = StoreConfig::load(&path)?;

    if let Some(ms) = cli.debounce_ms {
        config.debounce_ms = ms;
    }
    if let Some(secs) = cli.backup_interval_secs {
        config.backup_interval_secs = secs;
    }
    Ok(config)
}

fn config_path(explicit: Option<&Path>, paths: &DataPaths) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| paths.root.join(CONFIG_FILE_NAME))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => log::info!("Received SIGTERM, shutting down..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn subcommands_and_global_flags_parse() {
        let cli = Cli::try_parse_from([
            "keeper-daemon",
            "stats",
            "--data-dir",
            "/tmp/keeper",
            "--debounce-ms",
            "50",
        ])
        .unwrap();

        assert_eq!(cli.command, Commands::Stats);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/keeper")));
        assert_eq!(cli.debounce_ms, Some(50));
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempdir().unwrap();
        let paths = DataPaths::under(dir.path());
        std::fs::write(
            paths.root.join(CONFIG_FILE_NAME),
            r#"{ "debounceMs": 900, "backupKeep": 9 }"#,
        )
        .unwrap();

        let cli = Cli::try_parse_from(["keeper-daemon", "run", "--debounce-ms", "25"]).unwrap();
        let config = load_config(&cli, &paths).unwrap();

        assert_eq!(config.debounce_ms, 25);
        assert_eq!(config.backup_keep, 9);
    }

    #[tokio::test]
    async fn maintenance_commands_keep_existing_backups() {
        let dir = tempdir().unwrap();
        let paths = DataPaths::under(dir.path());
        let store = Store::open(&paths, StoreConfig::default()).await;
        store.set_setting("theme", "dark").unwrap();
        let manual = store.create_manual_backup().await.unwrap();
        store.shutdown().await;
        let before = store.backups().list_backups().unwrap();

        let root = dir.path().to_str().unwrap();
        for command in ["stats", "stats", "stats", "compact"] {
            let cli = Cli::try_parse_from(["keeper-daemon", command, "--data-dir", root]).unwrap();
            run(cli).await.unwrap();
        }
        assert!(manual.exists());
        assert_eq!(store.backups().list_backups().unwrap(), before);

        let cli = Cli::try_parse_from(["keeper-daemon", "backup", "--data-dir", root]).unwrap();
        run(cli).await.unwrap();
        assert_eq!(store.backups().backup_count(), before.len() + 1);
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = DataPaths::under(dir.path());
        let cli = Cli::try_parse_from(["keeper-daemon", "compact"]).unwrap();

        assert_eq!(load_config(&cli, &paths).unwrap(), StoreConfig::default());
    }
}
