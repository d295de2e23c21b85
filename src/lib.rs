//! Client library exposing a webHDFS/ADLS-compatible remote object store as
//! a POSIX-like file system, with a parallel chunked transfer engine on top.
//!
//! This crate is the core only: credential acquisition, configuration
//! loading, an interactive shell, and the account-management REST surface
//! are all left to the embedding application. The crate never installs a
//! `tracing` subscriber itself; callers wire one up the way `server/main.rs`
//! wires `tracing_subscriber` in the sibling example binary this crate grew
//! out of.

pub mod acl_walker;
pub mod config;
pub mod dircache;
pub mod error;
pub mod file;
pub mod filesystem;
pub mod path;
pub mod rest;
pub mod state;
pub mod token;
pub mod transfer;

pub use config::Config;
pub use error::{Error, Result};
pub use file::RemoteFile;
pub use filesystem::{FileSystem, FsAction, OpenMode};
pub use path::Path;
pub use rest::RestClient;
pub use token::{StaticToken, TokenProvider};
pub use transfer::downloader::Downloader;
pub use transfer::uploader::Uploader;

use std::sync::Arc;

/// Build a `FileSystem` against `store_name.url_suffix`, signing every
/// request with `token`.
pub fn connect(
    store_name: &str,
    url_suffix: &str,
    token: Arc<dyn TokenProvider>,
    config: Config,
) -> FileSystem {
    let rest = Arc::new(RestClient::new(store_name, url_suffix, token, config.clone()));
    FileSystem::new(rest, config)
}
