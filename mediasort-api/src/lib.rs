//! Remote clients for mediasort
//!
//! This crate only talks to the outside world; deciding what a response
//! means for a candidate path is left to the `mediasort` crate.

pub mod api;

pub use api::{
    ApiError, AuthScheme, BrowseEntry, FolderStatus, NeedEntry, NeedResponse, RemoteJobRecord,
    RuTorrentClient, SeriesStatus, SftpClient, SftpSettings, SyncthingClient, SyncthingClientBuilder,
    SyncthingFolder, TvdbClient,
};
