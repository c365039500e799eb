use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use mediasort::probe::hash::{DEFAULT_FULL_HASH_THRESHOLD, DEFAULT_SAMPLE_SIZE, MAX_SAMPLE_SIZE};
use mediasort::probe::temp_file::DEFAULT_TEMP_PATTERNS;
use mediasort::scanner::DEFAULT_VIDEO_EXTENSIONS;
use mediasort::status::DEFAULT_CACHE_TTL;
use mediasort::{DeciderOptions, LibraryDirs, OrganizerOptions, ScanOptions};
use mediasort_api::api::tvdb::TVDB_API_BASE;
use mediasort_api::{AuthScheme, SftpSettings};

use crate::telemetry::TelemetryConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub stability: StabilityConfig,
    #[serde(default)]
    pub syncthing: SyncthingConfig,
    #[serde(default)]
    pub rutorrent: RuTorrentConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub tvdb: TvdbConfig,
    #[serde(default)]
    pub sftp: SftpConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    #[serde(default = "default_movie_dir")]
    pub movie_dir: PathBuf,
    #[serde(default = "default_tv_current_dir")]
    pub tv_current_dir: PathBuf,
    #[serde(default = "default_tv_concluded_dir")]
    pub tv_concluded_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_skip_dirs")]
    pub skip_dirs: Vec<String>,
    #[serde(default = "default_parent_dirs")]
    pub parent_dirs: Vec<String>,
    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_lock_file")]
    pub path: PathBuf,
    #[serde(default = "default_lock_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityConfig {
    #[serde(default = "default_stability_interval", with = "humantime_serde")]
    pub interval: Duration,
    #[serde(default = "default_stability_retries")]
    pub retries: u32,
    #[serde(default)]
    pub allow_zero_byte_files: bool,
    #[serde(default = "default_true")]
    pub hash_untracked: bool,
    #[serde(default = "default_full_hash_threshold")]
    pub full_hash_threshold: u64,
    #[serde(default = "default_hash_sample_size")]
    pub hash_sample_size: u64,
    #[serde(default = "default_temp_patterns")]
    pub temp_patterns: Vec<String>,
}

/// Syncthing is used only when enabled with both a URL and an API key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncthingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_syncthing_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// `remote:local,remote2:local2`
    #[serde(default)]
    pub path_mapping: String,
}

/// ruTorrent is used only when enabled with a URL, username and password
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuTorrentConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_rutorrent_base_path")]
    pub base_path: String,
    #[serde(default = "default_parent_dirs")]
    pub subfolders: Vec<String>,
    #[serde(default = "default_api_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default)]
    pub auth_scheme: AuthScheme,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationConfig {
    /// Shows routed to the concluded library, ahead of any TheTVDB lookup
    #[serde(default)]
    pub concluded_shows: Vec<String>,
}

/// TheTVDB status lookups are used only with an API key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TvdbConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_tvdb_url")]
    pub url: String,
    #[serde(default = "default_api_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub cache_ttl: Duration,
}

/// Seedbox cleanup after a move; needs a host, username and password
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SftpConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_sftp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_rutorrent_base_path")]
    pub remote_dir: String,
    #[serde(default = "default_sftp_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            movie_dir: default_movie_dir(),
            tv_current_dir: default_tv_current_dir(),
            tv_concluded_dir: default_tv_concluded_dir(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            skip_dirs: default_skip_dirs(),
            parent_dirs: default_parent_dirs(),
            video_extensions: default_video_extensions(),
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: default_fuzzy_threshold(),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            path: default_lock_file(),
            timeout: default_lock_timeout(),
        }
    }
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            interval: default_stability_interval(),
            retries: default_stability_retries(),
            allow_zero_byte_files: false,
            hash_untracked: true,
            full_hash_threshold: default_full_hash_threshold(),
            hash_sample_size: default_hash_sample_size(),
            temp_patterns: default_temp_patterns(),
        }
    }
}

impl Default for SyncthingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_syncthing_url(),
            api_key: String::new(),
            timeout: default_api_timeout(),
            path_mapping: String::new(),
        }
    }
}

impl Default for RuTorrentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: String::new(),
            username: String::new(),
            password: String::new(),
            base_path: default_rutorrent_base_path(),
            subfolders: default_parent_dirs(),
            timeout: default_api_timeout(),
            auth_scheme: AuthScheme::default(),
        }
    }
}

impl Default for TvdbConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            url: default_tvdb_url(),
            timeout: default_api_timeout(),
            cache_dir: default_cache_dir(),
            cache_ttl: default_cache_ttl(),
        }
    }
}

impl Default for SftpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_sftp_port(),
            username: String::new(),
            password: String::new(),
            remote_dir: default_rutorrent_base_path(),
            timeout: default_sftp_timeout(),
        }
    }
}

impl TvdbConfig {
    pub fn is_enabled(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl SftpConfig {
    pub fn is_enabled(&self) -> bool {
        !self.host.trim().is_empty() && !self.username.is_empty() && !self.password.is_empty()
    }

    pub fn settings(&self) -> SftpSettings {
        SftpSettings {
            host: self.host.trim().to_string(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            remote_dir: self.remote_dir.clone(),
            timeout: self.timeout,
        }
    }
}

impl SyncthingConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled && !self.url.trim().is_empty() && !self.api_key.trim().is_empty()
    }
}

impl RuTorrentConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled
            && !self.url.trim().is_empty()
            && !self.username.is_empty()
            && !self.password.is_empty()
    }
}

impl Config {
    /// Load from `path`, or the default location when it exists, then apply
    /// `.env` and environment overrides.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        // A missing .env is fine
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path).await?,
            None => match default_config_path() {
                Some(default) if default.exists() => Self::from_file(&default).await?,
                _ => Self::default(),
            },
        };

        config.apply_env_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.to_toml()?).await?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Override file values from `MEDIASORT_*`, `SYNCTHING_*`, `RUTORRENT_*`,
    /// `TVDB_*` and `SFTP_*` variables
    pub fn apply_env_from<F>(&mut self, get: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let set_path = |target: &mut PathBuf, key: &str| {
            if let Some(value) = get(key) {
                *target = PathBuf::from(value);
            }
        };
        set_path(&mut self.paths.download_dir, "MEDIASORT_DOWNLOAD_DIR");
        set_path(&mut self.paths.movie_dir, "MEDIASORT_MOVIE_DIR");
        set_path(&mut self.paths.tv_current_dir, "MEDIASORT_TV_CURRENT_DIR");
        set_path(&mut self.paths.tv_concluded_dir, "MEDIASORT_TV_CONCLUDED_DIR");
        set_path(&mut self.lock.path, "MEDIASORT_LOCK_FILE");

        if let Some(dir) = get("MEDIASORT_LOG_DIR") {
            self.telemetry.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(level) = get("MEDIASORT_LOG_LEVEL") {
            self.telemetry.log_level = level;
        }
        if let Some(value) = get("MEDIASORT_FUZZY_THRESHOLD") {
            self.matching.fuzzy_threshold = value
                .trim()
                .parse()
                .with_context(|| format!("MEDIASORT_FUZZY_THRESHOLD is not a number: {}", value))?;
        }
        if let Some(value) = get("MEDIASORT_STABILITY_INTERVAL") {
            self.stability.interval = humantime_serde::re::humantime::parse_duration(value.trim())
                .with_context(|| format!("MEDIASORT_STABILITY_INTERVAL is not a duration: {}", value))?;
        }
        if let Some(value) = get("MEDIASORT_STABILITY_RETRIES") {
            self.stability.retries = value
                .trim()
                .parse()
                .with_context(|| format!("MEDIASORT_STABILITY_RETRIES is not a number: {}", value))?;
        }
        if let Some(value) = get("MEDIASORT_ALLOW_ZERO_BYTE_FILES") {
            self.stability.allow_zero_byte_files = parse_bool(&value);
        }
        if let Some(value) = get("MEDIASORT_HASH_UNTRACKED") {
            self.stability.hash_untracked = parse_bool(&value);
        }

        if let Some(value) = get("SYNCTHING_ENABLED") {
            self.syncthing.enabled = parse_bool(&value);
        }
        if let Some(url) = get("SYNCTHING_URL") {
            self.syncthing.url = url;
        }
        if let Some(key) = get("SYNCTHING_API_KEY") {
            self.syncthing.api_key = key;
        }
        if let Some(mapping) = get("SYNCTHING_PATH_MAPPING") {
            self.syncthing.path_mapping = mapping;
        }

        if let Some(value) = get("RUTORRENT_ENABLED") {
            self.rutorrent.enabled = parse_bool(&value);
        }
        if let Some(url) = get("RUTORRENT_URL") {
            self.rutorrent.url = url;
        }
        if let Some(username) = get("RUTORRENT_USERNAME") {
            self.rutorrent.username = username;
        }
        if let Some(password) = get("RUTORRENT_PASSWORD") {
            self.rutorrent.password = password;
        }
        if let Some(base_path) = get("RUTORRENT_BASE_PATH") {
            self.rutorrent.base_path = base_path;
        }
        if let Some(subfolders) = get("RUTORRENT_SUBFOLDERS") {
            self.rutorrent.subfolders = subfolders
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(key) = get("TVDB_API_KEY") {
            self.tvdb.api_key = key;
        }
        if let Some(dir) = get("MEDIASORT_CACHE_DIR") {
            self.tvdb.cache_dir = PathBuf::from(dir);
        }

        if let Some(host) = get("SFTP_HOST") {
            self.sftp.host = host;
        }
        if let Some(value) = get("SFTP_PORT") {
            self.sftp.port = value
                .trim()
                .parse()
                .with_context(|| format!("SFTP_PORT is not a port number: {}", value))?;
        }
        if let Some(username) = get("SFTP_USER") {
            self.sftp.username = username;
        }
        if let Some(password) = get("SFTP_PASSWORD") {
            self.sftp.password = password;
        }
        if let Some(dir) = get("SFTP_REMOTE_DIR") {
            self.sftp.remote_dir = dir;
        }
        if let Some(value) = get("SFTP_TIMEOUT") {
            self.sftp.timeout = parse_seconds_or_duration(&value)
                .with_context(|| format!("SFTP_TIMEOUT is not a duration: {}", value))?;
        }

        Ok(())
    }

    /// Problems worth a warning; none of them stop a run
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if !self.paths.download_dir.exists() {
            issues.push(format!(
                "Download directory does not exist: {}",
                self.paths.download_dir.display()
            ));
        }
        for (name, dir) in [
            ("Movie", &self.paths.movie_dir),
            ("TV Current", &self.paths.tv_current_dir),
            ("TV Concluded", &self.paths.tv_concluded_dir),
        ] {
            if !dir.exists() {
                issues.push(format!("{} directory does not exist: {}", name, dir.display()));
            }
        }

        if self.matching.fuzzy_threshold > 100 {
            issues.push(format!(
                "Fuzzy threshold {} is above 100, no folder will ever match",
                self.matching.fuzzy_threshold
            ));
        }
        if self.stability.retries < 2 {
            issues.push(format!(
                "Stability retries {} raised to the minimum of 2",
                self.stability.retries
            ));
        }

        if self.syncthing.enabled && !self.syncthing.is_enabled() {
            issues.push("Syncthing URL or API key not set, sync API checks disabled".to_string());
        }
        if self.rutorrent.enabled && !self.rutorrent.is_enabled() {
            issues.push("ruTorrent URL or credentials not set, remote job checks disabled".to_string());
        }
        if self.stability.hash_sample_size > MAX_SAMPLE_SIZE {
            issues.push(format!(
                "Hash sample size {} clamped to {} bytes",
                self.stability.hash_sample_size, MAX_SAMPLE_SIZE
            ));
        }
        if !self.tvdb.is_enabled() {
            if self.classification.concluded_shows.is_empty() {
                issues.push("TheTVDB API key not set, all shows route to current".to_string());
            } else {
                issues.push("TheTVDB API key not set, only listed shows route to concluded".to_string());
            }
        }

        issues
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            skip_dirs: self.scan.skip_dirs.clone(),
            parent_dirs: self.scan.parent_dirs.clone(),
            video_extensions: self.scan.video_extensions.clone(),
        }
    }

    pub fn decider_options(&self) -> DeciderOptions {
        DeciderOptions {
            stability_interval: self.stability.interval,
            stability_retries: self.stability.retries,
            allow_zero_byte_files: self.stability.allow_zero_byte_files,
            hash_untracked: self.stability.hash_untracked,
            full_hash_threshold: self.stability.full_hash_threshold,
            hash_sample_size: self.stability.hash_sample_size,
            temp_patterns: self.stability.temp_patterns.clone(),
        }
    }

    pub fn library_dirs(&self) -> LibraryDirs {
        LibraryDirs {
            movies: self.paths.movie_dir.clone(),
            tv_current: self.paths.tv_current_dir.clone(),
            tv_concluded: self.paths.tv_concluded_dir.clone(),
        }
    }

    pub fn organizer_options(&self, dry_run: bool, quiet: bool) -> OrganizerOptions {
        OrganizerOptions {
            download_dir: self.paths.download_dir.clone(),
            scan_options: self.scan_options(),
            fuzzy_threshold: self.matching.fuzzy_threshold,
            dry_run,
            quiet,
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mediasort").join("config.toml"))
}

/// A bare number is seconds; anything else is a humantime duration
fn parse_seconds_or_duration(value: &str) -> Result<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    Ok(humantime_serde::re::humantime::parse_duration(value)?)
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

// Default value functions
fn default_download_dir() -> PathBuf { PathBuf::from("/mnt/media/TV_Downloads") }
fn default_movie_dir() -> PathBuf { PathBuf::from("/mnt/media/Movies") }
fn default_tv_current_dir() -> PathBuf { PathBuf::from("/mnt/media/TV_Shows/Current") }
fn default_tv_concluded_dir() -> PathBuf { PathBuf::from("/mnt/media/TV_Shows/Concluded") }

fn default_skip_dirs() -> Vec<String> { vec!["@eaDir".to_string()] }
fn default_parent_dirs() -> Vec<String> { vec!["TV_Shows".to_string(), "Movies".to_string()] }
fn default_video_extensions() -> Vec<String> {
    DEFAULT_VIDEO_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_fuzzy_threshold() -> u8 { 80 }

fn default_lock_file() -> PathBuf {
    std::env::temp_dir().join("mediasort.lock")
}
fn default_lock_timeout() -> Duration { Duration::from_secs(300) }

fn default_stability_interval() -> Duration { Duration::from_secs(5) }
fn default_stability_retries() -> u32 { 2 }
fn default_true() -> bool { true }
fn default_full_hash_threshold() -> u64 { DEFAULT_FULL_HASH_THRESHOLD }
fn default_hash_sample_size() -> u64 { DEFAULT_SAMPLE_SIZE }
fn default_temp_patterns() -> Vec<String> {
    DEFAULT_TEMP_PATTERNS.iter().map(|p| p.to_string()).collect()
}

fn default_syncthing_url() -> String { "http://127.0.0.1:8384".to_string() }
fn default_api_timeout() -> Duration { Duration::from_secs(10) }
fn default_rutorrent_base_path() -> String { "/downloads".to_string() }

fn default_tvdb_url() -> String { TVDB_API_BASE.to_string() }
fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("mediasort")
}
fn default_cache_ttl() -> Duration { DEFAULT_CACHE_TTL }

fn default_sftp_port() -> u16 { 22 }
fn default_sftp_timeout() -> Duration { Duration::from_secs(30) }
