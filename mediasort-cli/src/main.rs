use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info, warn};

mod config;
mod lock;
mod metrics;
mod telemetry;

use config::Config;
use lock::ProcessLock;
use metrics::RunMetrics;
use telemetry::Telemetry;

use mediasort::{
    ContentClassifier, MediaOrganizer, PathMapping, ProviderStatusLookup, RemoteCleanup,
    RemoteJobProbe, ShowStatusLookup, StaticStatusLookup, StatusCache, SyncApiProbe,
    TransferCompletionDecider,
};
use mediasort_api::{RuTorrentClient, SftpClient, SyncthingClientBuilder, TvdbClient};

#[derive(Parser)]
#[command(name = "mediasort")]
#[command(about = "Moves finished media downloads into a library")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (overrides the configured level)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Decide and route but do not move anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Stay silent unless there is stable work or a warning
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Delete each moved item from the seedbox over SFTP
    #[arg(long, global = true)]
    sftp_delete: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Process the download directory (default)
    Run,
    /// Show the stability verdict for every queued item without moving
    Check {
        /// Print the verdicts as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check connectivity to the configured integrations
    Health,
    /// Configuration helpers
    Config {
        #[command(subcommand)]
        action: ConfigActions,
    },
}

#[derive(Subcommand)]
enum ConfigActions {
    /// Print the effective configuration
    Show,
    /// Print warnings for the effective configuration
    Validate,
    /// Generate a default configuration file
    Generate {
        /// Output path for configuration
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let config = Config::load(cli.config.as_deref()).await?;
            let telemetry = Telemetry::init(&config.telemetry, cli.log_level.as_deref(), cli.quiet)?;
            run(config, &telemetry, cli.dry_run, cli.quiet, cli.sftp_delete).await
        }
        Commands::Check { json } => {
            let config = Config::load(cli.config.as_deref()).await?;
            let _telemetry = Telemetry::init(&config.telemetry, cli.log_level.as_deref(), false)?;
            check(config, json).await
        }
        Commands::Health => {
            let config = Config::load(cli.config.as_deref()).await?;
            let _telemetry = Telemetry::init(&config.telemetry, cli.log_level.as_deref(), false)?;
            health(&config).await
        }
        Commands::Config { action } => match action {
            ConfigActions::Show => {
                let config = Config::load(cli.config.as_deref()).await?;
                println!("{}", config.to_toml()?);
                Ok(ExitCode::SUCCESS)
            }
            ConfigActions::Validate => {
                let config = Config::load(cli.config.as_deref()).await?;
                let issues = config.validate();
                if issues.is_empty() {
                    println!("✓ Configuration is valid");
                } else {
                    for issue in &issues {
                        println!("! {}", issue);
                    }
                }
                Ok(ExitCode::SUCCESS)
            }
            ConfigActions::Generate { output } => generate_config(output).await,
        },
    }
}

async fn run(
    config: Config,
    telemetry: &Telemetry,
    dry_run: bool,
    quiet: bool,
    sftp_delete: bool,
) -> Result<ExitCode> {
    for issue in config.validate() {
        warn!("{}", issue);
    }

    let lock = ProcessLock::acquire(&config.lock.path, config.lock.timeout).await?;
    debug!("Holding lock {}", lock.path().display());

    let mut organizer = build_organizer(&config, dry_run, quiet)?.with_wake_hook(telemetry.wake_hook());
    if sftp_delete {
        if config.sftp.is_enabled() {
            info!(
                "SFTP deletion enabled for {}:{}{}",
                config.sftp.host, config.sftp.port, config.sftp.remote_dir
            );
            let client = SftpClient::new(config.sftp.settings());
            organizer = organizer.with_remote_cleanup(RemoteCleanup::new(Box::new(client), dry_run));
        } else {
            warn!("--sftp-delete given but SFTP host or credentials not set, remote deletion disabled");
        }
    }
    let report = organizer.run().await?;

    if let Some(path) = &config.telemetry.metrics_textfile {
        let metrics = RunMetrics::new()?;
        metrics.record(&report);
        if let Err(e) = metrics.write_textfile(path) {
            warn!("Failed to export metrics: {:#}", e);
        }
    }

    drop(lock);
    Ok(ExitCode::from(report.exit_code() as u8))
}

async fn check(config: Config, json: bool) -> Result<ExitCode> {
    let mut organizer = build_organizer(&config, true, false)?;
    let decision = organizer.check().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
        return Ok(ExitCode::SUCCESS);
    }

    if decision.verdicts.is_empty() {
        println!("No items queued in {}", config.paths.download_dir.display());
    }
    for v in &decision.verdicts {
        println!("{:<40} {}", v.verdict.to_string(), v.path.display());
    }
    Ok(ExitCode::SUCCESS)
}

async fn health(config: &Config) -> Result<ExitCode> {
    let mut healthy = true;

    if config.syncthing.is_enabled() {
        let client = SyncthingClientBuilder::new(&config.syncthing.url, &config.syncthing.api_key)
            .timeout(config.syncthing.timeout)
            .build()?;
        match client.ping().await {
            Ok(()) => match client.folders().await {
                Ok(folders) => {
                    println!("✓ Syncthing at {} ({} folders)", client.base_url(), folders.len());
                    for folder in &folders {
                        match client.folder_status(&folder.id).await {
                            Ok(status) => println!(
                                "    {} [{}] {} file(s) needed, {} pull error(s)",
                                folder.path, status.state, status.need_files, status.pull_errors
                            ),
                            Err(e) => println!("    {} status unavailable: {}", folder.path, e),
                        }
                    }
                }
                Err(e) => {
                    healthy = false;
                    println!("✗ Syncthing folder list failed: {}", e);
                }
            },
            Err(e) => {
                healthy = false;
                println!("✗ Syncthing at {} unreachable: {}", client.base_url(), e);
            }
        }
    } else {
        println!("- Syncthing disabled");
    }

    if config.rutorrent.is_enabled() {
        let client = rutorrent_client(config)?;
        match client.list_jobs().await {
            Ok(jobs) => println!("✓ ruTorrent at {} ({} jobs)", client.base_url(), jobs.len()),
            Err(e) => {
                healthy = false;
                println!("✗ ruTorrent at {} unreachable: {}", client.base_url(), e);
            }
        }
    } else {
        println!("- ruTorrent disabled");
    }

    if config.tvdb.is_enabled() {
        match TvdbClient::with_base_url(&config.tvdb.url, &config.tvdb.api_key, config.tvdb.timeout) {
            Ok(client) => match client.login().await {
                Ok(_) => println!("✓ TheTVDB at {} (cache {})", client.base_url(), config.tvdb.cache_dir.display()),
                Err(e) => {
                    healthy = false;
                    println!("✗ TheTVDB login failed: {}", e);
                }
            },
            Err(e) => {
                healthy = false;
                println!("✗ TheTVDB URL invalid: {}", e);
            }
        }
    } else {
        println!("- TheTVDB disabled");
    }

    if config.sftp.is_enabled() {
        let client = SftpClient::new(config.sftp.settings());
        match client.check_connection().await {
            Ok(()) => println!(
                "✓ SFTP at {}:{} ({})",
                config.sftp.host, config.sftp.port, config.sftp.remote_dir
            ),
            Err(e) => {
                healthy = false;
                println!("✗ SFTP at {}:{} unreachable: {}", config.sftp.host, config.sftp.port, e);
            }
        }
    } else {
        println!("- SFTP disabled");
    }

    Ok(if healthy { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn generate_config(output: Option<PathBuf>) -> Result<ExitCode> {
    let config = Config::default();
    match output {
        Some(path) => {
            config.save(&path).await?;
            println!("Configuration generated at {}", path.display());
        }
        None => println!("{}", config.to_toml()?),
    }
    Ok(ExitCode::SUCCESS)
}

fn build_organizer(config: &Config, dry_run: bool, quiet: bool) -> Result<MediaOrganizer> {
    let decider = build_decider(config)?;
    let classifier = ContentClassifier::new(config.library_dirs(), status_lookup(config));
    Ok(MediaOrganizer::new(
        config.organizer_options(dry_run, quiet),
        decider,
        classifier,
    )?)
}

/// Configured overrides first, then TheTVDB when a key is set
fn status_lookup(config: &Config) -> Box<dyn ShowStatusLookup> {
    let overrides = StaticStatusLookup::concluded(&config.classification.concluded_shows);
    if !config.tvdb.is_enabled() {
        return Box::new(overrides);
    }

    match TvdbClient::with_base_url(&config.tvdb.url, &config.tvdb.api_key, config.tvdb.timeout) {
        Ok(client) => {
            info!("Show status lookups enabled via {}", client.base_url());
            Box::new(
                ProviderStatusLookup::new(Box::new(client))
                    .with_cache(StatusCache::new(&config.tvdb.cache_dir, config.tvdb.cache_ttl))
                    .with_overrides(overrides),
            )
        }
        Err(e) => {
            warn!("TheTVDB disabled: {}", e);
            Box::new(overrides)
        }
    }
}

/// An integration whose client cannot be built is skipped with a warning
fn build_decider(config: &Config) -> Result<TransferCompletionDecider> {
    let mut decider = TransferCompletionDecider::new(config.decider_options())?;

    if config.rutorrent.is_enabled() {
        match rutorrent_client(config) {
            Ok(client) => {
                info!("Remote job checks enabled via {}", client.base_url());
                decider = decider.with_remote_jobs(RemoteJobProbe::new(
                    Box::new(client),
                    config.rutorrent.base_path.clone(),
                    config.rutorrent.subfolders.clone(),
                ));
            }
            Err(e) => warn!("ruTorrent disabled, cannot use '{}': {:#}", config.rutorrent.url, e),
        }
    }

    if config.syncthing.is_enabled() {
        let client = SyncthingClientBuilder::new(&config.syncthing.url, &config.syncthing.api_key)
            .timeout(config.syncthing.timeout)
            .build();
        match client {
            Ok(client) => {
                info!("Sync API checks enabled via {}", client.base_url());
                decider = decider.with_sync_api(SyncApiProbe::new(
                    Box::new(client),
                    PathMapping::parse(&config.syncthing.path_mapping),
                ));
            }
            Err(e) => warn!("Syncthing disabled, cannot use '{}': {}", config.syncthing.url, e),
        }
    }

    Ok(decider)
}

fn rutorrent_client(config: &Config) -> Result<RuTorrentClient> {
    Ok(RuTorrentClient::new(
        &config.rutorrent.url,
        &config.rutorrent.username,
        &config.rutorrent.password,
        config.rutorrent.auth_scheme,
        config.rutorrent.timeout,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediasort::ShowStatus;

    #[test]
    fn test_malformed_integration_urls_are_skipped() {
        let mut config = Config::default();
        config.syncthing.url = "not a url".to_string();
        config.syncthing.api_key = "key".to_string();
        config.rutorrent.url = "seedbox without scheme".to_string();
        config.rutorrent.username = "seed".to_string();
        config.rutorrent.password = "box".to_string();

        let decider = build_decider(&config).unwrap();
        assert!(!decider.has_sync_api());
        assert!(!decider.has_remote_jobs());
    }

    #[test]
    fn test_valid_integration_urls_are_used() {
        let mut config = Config::default();
        config.syncthing.api_key = "key".to_string();
        config.rutorrent.url = "https://seedbox.example/rutorrent".to_string();
        config.rutorrent.username = "seed".to_string();
        config.rutorrent.password = "box".to_string();

        let decider = build_decider(&config).unwrap();
        assert!(decider.has_sync_api());
        assert!(decider.has_remote_jobs());
    }

    #[tokio::test]
    async fn test_bad_tvdb_url_falls_back_to_overrides() {
        let mut config = Config::default();
        config.tvdb.api_key = "key".to_string();
        config.tvdb.url = "::nope::".to_string();
        config.classification.concluded_shows = vec!["Old Show".to_string()];

        let lookup = status_lookup(&config);
        assert_eq!(lookup.status("old show", None).await, ShowStatus::Concluded);
        // a provider lookup that cannot connect would answer Unknown
        assert_eq!(lookup.status("New Show", None).await, ShowStatus::Current);
    }
}
