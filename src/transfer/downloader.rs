//! `Downloader`: remote-to-local orchestration atop `TransferClient`,
//! grounded on `ADLDownloader` in `multithread.py`. Chunks land in per-file
//! temporary local files and are concatenated locally once all chunks for a
//! file complete (there is no server-side merge on the way down).

use super::checkpoint::{checkpoint_name, default_checkpoint_dir, Checkpoint, CheckpointStore};
use super::{Chunk, FileTransfer, Merger, Progress, TransferClient, Transferer};
use crate::dircache::EntryKind;
use crate::error::{Error, Result};
use crate::filesystem::FileSystem;
use crate::path::Path;
use crate::rest::{CallParams, Op, RestClient};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

struct RemoteToLocal {
    rest: Arc<RestClient>,
}

#[async_trait]
impl Transferer for RemoteToLocal {
    async fn transfer_chunk(&self, chunk: &Chunk) -> Result<()> {
        let bytes = self
            .rest
            .call(
                Op::Open,
                chunk.src.trim().as_str(),
                CallParams::new()
                    .param("offset", chunk.offset as i64)
                    .param("length", chunk.length as i64)
                    .param("read", "true")
                    .stream(true),
            )
            .await?
            .into_bytes()?;
        let local_path = PathBuf::from(chunk.temporary_path.as_str());
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&local_path, &bytes).await?;
        Ok(())
    }
}

/// Concatenates a file's chunk parts, in offset order, into the final local
/// destination, then removes the scratch directory.
struct LocalConcatMerger;

#[async_trait]
impl Merger for LocalConcatMerger {
    async fn merge(&self, dst: &Path, parts: &[Path]) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        let dst_path = PathBuf::from(dst.as_str());
        if let Some(parent) = dst_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut out = tokio::fs::File::create(&dst_path).await?;
        for part in parts {
            let data = tokio::fs::read(part.as_str()).await?;
            out.write_all(&data).await?;
        }
        if let Some(first) = parts.first() {
            let scratch = first.parent();
            let _ = tokio::fs::remove_dir_all(scratch.as_str()).await;
        }
        Ok(())
    }
}

pub struct Downloader {
    transfer: TransferClient,
    checkpoint_store: CheckpointStore,
    chunksize: u64,
    read_blocksize: usize,
}

impl Downloader {
    pub fn new(rest: Arc<RestClient>, chunksize: u64, read_blocksize: usize, nthreads: usize) -> Self {
        let transferer = Arc::new(RemoteToLocal { rest });
        let merger = Arc::new(LocalConcatMerger);
        Self {
            transfer: TransferClient::new(transferer, Some(merger), chunksize, nthreads),
            checkpoint_store: CheckpointStore::new(default_checkpoint_dir(), String::new()),
            chunksize,
            read_blocksize,
        }
    }

    /// Expand `src` (a single remote file, a remote directory tree, or a
    /// shallow remote glob) into a source set, rebase multi-source paths
    /// against their longest common remote prefix, pair each with a
    /// destination under `dst`, and queue each pairing for download.
    /// Grounded on `ADLDownloader.__init__`'s source walk in
    /// `multithread.py`.
    pub async fn submit(&mut self, fs: &FileSystem, src: &Path, dst: &std::path::Path, overwrite: bool) -> Result<()> {
        let sources = expand_remote_source(fs, src).await?;
        if sources.is_empty() {
            return Err(Error::Validation(format!("no remote files matched {}", src)));
        }
        let rebase_root = common_remote_prefix(&sources);
        for remote in &sources {
            let dest = if sources.len() == 1 {
                dst.to_path_buf()
            } else {
                let rel = remote.relative_to(&rebase_root).unwrap_or_else(|| remote.clone());
                dst.join(rel.as_str())
            };
            let info = fs.info(remote).await?;
            self.submit_file(remote, &dest, info.length, overwrite)?;
        }
        Ok(())
    }

    pub fn submit_file(&mut self, src: &Path, dst: &std::path::Path, size: u64, overwrite: bool) -> Result<()> {
        if !overwrite && dst.exists() {
            return Err(Error::Validation(format!(
                "local destination already exists: {}",
                dst.display()
            )));
        }
        let name = checkpoint_name(
            src.trim().as_str(),
            &dst.to_string_lossy(),
            self.chunksize,
            self.read_blocksize,
        );
        self.checkpoint_store = CheckpointStore::new(default_checkpoint_dir(), name);
        let checkpoint = self.checkpoint_store.load();
        let dst_path = Path::new(dst.to_string_lossy().to_string());
        let done = checkpoint
            .done_chunks
            .get(dst_path.trim().as_str())
            .cloned()
            .unwrap_or_default();
        self.transfer.submit(
            FileTransfer {
                src: src.clone(),
                dst: dst_path,
                size,
            },
            &done,
        );
        Ok(())
    }

    pub async fn run(&self) -> Result<Progress> {
        let progress = self.transfer.run().await?;
        self.save_checkpoint()?;
        Ok(progress)
    }

    pub fn cancel(&self) {
        self.transfer.cancel();
    }

    pub fn progress(&self) -> Progress {
        self.transfer.progress()
    }

    fn save_checkpoint(&self) -> Result<()> {
        let done = self.transfer.done_offsets();
        self.checkpoint_store.save(&Checkpoint { done_chunks: done })
    }

    pub fn clear_saved(&self) -> Result<()> {
        self.checkpoint_store.clear()
    }
}

async fn expand_remote_source(fs: &FileSystem, src: &Path) -> Result<Vec<Path>> {
    if src.as_str().contains('*') || src.as_str().contains('?') {
        fs.glob(src).await
    } else {
        match fs.info(src).await {
            Ok(entry) if entry.kind == EntryKind::Directory => fs.walk(src).await,
            Ok(_) => Ok(vec![src.clone()]),
            Err(e) => Err(e),
        }
    }
}

/// Longest shared leading-segment prefix across `paths`, mirroring
/// `adlfs/utils.py::commonprefix` (`dirname(commonprefix(paths))`).
fn common_remote_prefix(paths: &[Path]) -> Path {
    if paths.len() <= 1 {
        return paths.first().map(|p| p.parent()).unwrap_or_else(|| Path::new(""));
    }
    let splits: Vec<Vec<&str>> = paths.iter().map(|p| p.trim().as_str().split('/').collect()).collect();
    let min_len = splits.iter().map(|s| s.len()).min().unwrap_or(0);
    let mut prefix_parts: Vec<&str> = Vec::new();
    for i in 0..min_len {
        let seg = splits[0][i];
        if splits.iter().all(|s| s[i] == seg) {
            prefix_parts.push(seg);
        } else {
            break;
        }
    }
    Path::new(prefix_parts.join("/"))
}
