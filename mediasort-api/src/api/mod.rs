//! Remote clients used around the transfer-completion checks
//!
//! - Syncthing's REST API (folder config, need lists, browse, status)
//! - ruTorrent's httprpc plugin (full job list, Basic or Digest auth)
//! - TheTVDB v4 (series search and broadcast status)
//! - SFTP cleanup of the seedbox copy once an item has been moved

pub mod auth;
pub mod error;
pub mod rutorrent;
pub mod sftp;
pub mod syncthing;
pub mod tvdb;
pub mod types;

pub use auth::AuthScheme;
pub use error::{ApiError, Result};
pub use rutorrent::RuTorrentClient;
pub use sftp::{SftpClient, SftpSettings};
pub use syncthing::{SyncthingClient, SyncthingClientBuilder};
pub use tvdb::{SeriesStatus, TvdbClient};
pub use types::*;
