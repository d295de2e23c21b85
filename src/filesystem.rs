//! POSIX-like filesystem surface over the REST call layer (§4.B "FileSystem"),
//! grounded on `AzureDLFileSystem` in `core.py`.

use crate::config::Config;
use crate::dircache::{DirCache, DirEntry, EntryKind};
use crate::error::{Error, Result};
use crate::file::RemoteFile;
use crate::path::Path;
use crate::rest::{CallParams, Op, RestClient};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsAction {
    Read,
    Write,
    Execute,
    ReadWrite,
}

impl FsAction {
    fn as_str(self) -> &'static str {
        match self {
            FsAction::Read => "r-x",
            FsAction::Write => "-wx",
            FsAction::Execute => "--x",
            FsAction::ReadWrite => "rwx",
        }
    }
}

/// One ACL spec entry as accepted by `SETACL`/`MODIFYACLENTRIES`/etc, e.g.
/// `"user:bob:rwx"`. The core passes these through uninterpreted.
pub type AclSpec = String;

pub struct FileSystem {
    rest: Arc<RestClient>,
    cache: Arc<DirCache>,
    config: Config,
}

impl FileSystem {
    pub fn new(rest: Arc<RestClient>, config: Config) -> Self {
        Self {
            rest,
            cache: Arc::new(DirCache::new()),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn rest(&self) -> &Arc<RestClient> {
        &self.rest
    }

    pub fn invalidate_cache(&self, path: Option<&Path>) {
        match path {
            Some(p) => self.cache.invalidate(p),
            None => self.cache.clear(),
        }
    }

    /// `GETFILESTATUS` for a single path.
    pub async fn info(&self, path: &Path) -> Result<DirEntry> {
        let resp = self
            .rest
            .call(Op::GetFileStatus, path.trim().as_str(), CallParams::new())
            .await?
            .into_json()?;
        let status = resp
            .get("FileStatus")
            .ok_or_else(|| Error::Validation("missing FileStatus in response".into()))?;
        parse_file_status(path.name(), status)
    }

    pub async fn exists(&self, path: &Path) -> Result<bool> {
        match self.info(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn ls_uncached(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let resp = self
            .rest
            .call(Op::ListStatus, path.trim().as_str(), CallParams::new())
            .await?
            .into_json()?;
        let entries = resp
            .get("FileStatuses")
            .and_then(|v| v.get("FileStatus"))
            .and_then(|v| v.as_array())
            .ok_or_else(|| Error::Validation("missing FileStatuses in response".into()))?;
        entries
            .iter()
            .map(|s| {
                let name = s
                    .get("pathSuffix")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                parse_file_status(name, s)
            })
            .collect()
    }

    /// List a directory's immediate children, using the cache when present.
    pub async fn ls(&self, path: &Path) -> Result<Vec<DirEntry>> {
        if let Some(cached) = self.cache.get(path) {
            return Ok(cached);
        }
        let entries = self.ls_uncached(path).await?;
        self.cache.put(path, entries.clone());
        Ok(entries)
    }

    /// Recursive depth-first walk, yielding every file (not directory) path
    /// under `path`.
    pub async fn walk(&self, path: &Path) -> Result<Vec<Path>> {
        let mut out = Vec::new();
        let mut stack = vec![path.clone()];
        while let Some(p) = stack.pop() {
            let entries = self.ls(&p).await?;
            for entry in entries {
                let child = p.join(&entry.name);
                match entry.kind {
                    EntryKind::Directory => stack.push(child),
                    EntryKind::File => out.push(child),
                }
            }
        }
        Ok(out)
    }

    /// Expand a shallow glob (no `**`) against the remote tree, anchored at
    /// the pattern's glob-free prefix.
    pub async fn glob(&self, pattern: &Path) -> Result<Vec<Path>> {
        if !pattern.as_str().contains('*') && !pattern.as_str().contains('?') {
            return if self.exists(pattern).await? {
                Ok(vec![pattern.clone()])
            } else {
                Ok(vec![])
            };
        }
        let prefix = pattern.globless_prefix();
        let mut candidates = self.walk(&prefix).await?;
        // Directories can also match (e.g. a pattern ending before a
        // wildcard directory segment); include the prefix tree's directories.
        let mut stack = vec![prefix.clone()];
        while let Some(p) = stack.pop() {
            for entry in self.ls(&p).await.unwrap_or_default() {
                if entry.kind == EntryKind::Directory {
                    let child = p.join(&entry.name);
                    candidates.push(child.clone());
                    stack.push(child);
                }
            }
        }
        candidates.retain(|c| c.matches(pattern));
        candidates.sort();
        candidates.dedup();
        Ok(candidates)
    }

    pub async fn mkdir(&self, path: &Path) -> Result<()> {
        self.rest
            .call(Op::Mkdirs, path.trim().as_str(), CallParams::new())
            .await?;
        self.cache.invalidate(path);
        Ok(())
    }

    pub async fn touch(&self, path: &Path) -> Result<()> {
        self.rest
            .call(
                Op::Create,
                path.trim().as_str(),
                CallParams::new().param("overwrite", false),
            )
            .await?;
        self.cache.invalidate(path);
        Ok(())
    }

    pub async fn rm(&self, path: &Path, recursive: bool) -> Result<()> {
        self.rest
            .call(
                Op::Delete,
                path.trim().as_str(),
                CallParams::new().param("recursive", recursive),
            )
            .await?;
        self.cache.invalidate_subtree(path);
        Ok(())
    }

    pub async fn rmdir(&self, path: &Path) -> Result<()> {
        self.rm(path, false).await
    }

    /// Rename/move. Invalidates both the source's and destination's parent
    /// listings (Open Question resolution: a `mv` invalidates both parents,
    /// since a single-parent invalidation would leave the other side stale).
    pub async fn mv(&self, src: &Path, dst: &Path) -> Result<()> {
        self.rest
            .call(
                Op::Rename,
                src.trim().as_str(),
                CallParams::new().param("destination", dst.trim().as_str()),
            )
            .await?;
        self.cache.invalidate_subtree(src);
        self.cache.invalidate(dst);
        Ok(())
    }

    /// Server-side merge of `sources` into `dst` via `MSCONCAT`: the source
    /// list travels in the request body (`sources=<comma-joined>`), not the
    /// query string, and `delete_source` maps to the `deleteSourceDirectory`
    /// query flag.
    pub async fn concat(&self, dst: &Path, sources: &[Path], delete_source: bool) -> Result<()> {
        let joined = sources
            .iter()
            .map(|s| s.trim().as_str().to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.rest
            .call(
                Op::MsConcat,
                dst.trim().as_str(),
                CallParams::new()
                    .param("deleteSourceDirectory", delete_source)
                    .data(format!("sources={}", joined)),
            )
            .await?;
        self.cache.invalidate(dst);
        for s in sources {
            self.cache.invalidate_subtree(s);
        }
        Ok(())
    }

    pub async fn chmod(&self, path: &Path, permission: &str) -> Result<()> {
        self.rest
            .call(
                Op::SetPermission,
                path.trim().as_str(),
                CallParams::new().param("permission", permission),
            )
            .await?;
        self.cache.invalidate(path);
        Ok(())
    }

    pub async fn chown(&self, path: &Path, owner: Option<&str>, group: Option<&str>) -> Result<()> {
        let mut params = CallParams::new();
        if let Some(o) = owner {
            params = params.param("owner", o);
        }
        if let Some(g) = group {
            params = params.param("group", g);
        }
        self.rest
            .call(Op::SetOwner, path.trim().as_str(), params)
            .await?;
        self.cache.invalidate(path);
        Ok(())
    }

    /// Set a file's expiry policy. `expiry_option` must be one of
    /// `NeverExpire`, `RelativeToNow`, `RelativeToCreationDate`, or
    /// `Absolute`; `expire_time` is required for all but `NeverExpire`.
    pub async fn set_expiry(&self, path: &Path, expiry_option: &str, expire_time: Option<i64>) -> Result<()> {
        const OPTIONS: [&str; 4] = [
            "NeverExpire",
            "RelativeToNow",
            "RelativeToCreationDate",
            "Absolute",
        ];
        if !OPTIONS.contains(&expiry_option) {
            return Err(Error::Validation(format!(
                "invalid expiryOption '{}': must be one of {:?}",
                expiry_option, OPTIONS
            )));
        }
        if expiry_option != "NeverExpire" && expire_time.is_none() {
            return Err(Error::Validation(format!(
                "expiryOption '{}' requires expire_time",
                expiry_option
            )));
        }
        let mut params = CallParams::new().param("expiryOption", expiry_option);
        if let Some(t) = expire_time {
            params = params.param("expireTime", t);
        }
        self.rest
            .call(Op::SetExpiry, path.trim().as_str(), params)
            .await?;
        Ok(())
    }

    pub async fn check_access(&self, path: &Path, action: FsAction) -> Result<()> {
        self.rest
            .call(
                Op::CheckAccess,
                path.trim().as_str(),
                CallParams::new().param("fsaction", action.as_str()),
            )
            .await?;
        Ok(())
    }

    pub async fn set_acl(&self, path: &Path, spec: &[AclSpec]) -> Result<()> {
        self.acl_call(Op::SetAcl, path, spec).await
    }

    pub async fn modify_acl_entries(&self, path: &Path, spec: &[AclSpec]) -> Result<()> {
        self.acl_call(Op::ModifyAclEntries, path, spec).await
    }

    pub async fn remove_acl_entries(&self, path: &Path, spec: &[AclSpec]) -> Result<()> {
        self.acl_call(Op::RemoveAclEntries, path, spec).await
    }

    async fn acl_call(&self, op: Op, path: &Path, spec: &[AclSpec]) -> Result<()> {
        self.rest
            .call(
                op,
                path.trim().as_str(),
                CallParams::new().param("aclSpec", spec.join(",")),
            )
            .await?;
        Ok(())
    }

    pub async fn remove_acl(&self, path: &Path) -> Result<()> {
        self.rest
            .call(Op::RemoveAcl, path.trim().as_str(), CallParams::new())
            .await?;
        Ok(())
    }

    pub async fn remove_default_acl(&self, path: &Path) -> Result<()> {
        self.rest
            .call(Op::RemoveDefaultAcl, path.trim().as_str(), CallParams::new())
            .await?;
        Ok(())
    }

    pub async fn get_acl_status(&self, path: &Path) -> Result<serde_json::Value> {
        self.rest
            .call(Op::MsGetAclStatus, path.trim().as_str(), CallParams::new())
            .await?
            .into_json()
    }

    /// Aggregate content size/count under `path`, via `GETCONTENTSUMMARY`.
    pub async fn du(&self, path: &Path) -> Result<u64> {
        let resp = self
            .rest
            .call(Op::GetContentSummary, path.trim().as_str(), CallParams::new())
            .await?
            .into_json()?;
        resp.get("ContentSummary")
            .and_then(|v| v.get("length"))
            .and_then(|v| v.as_u64())
            .ok_or_else(|| Error::Validation("missing ContentSummary.length".into()))
    }

    /// Disk-free is not meaningful for this object store; mirrors the
    /// original's behavior of reporting an effectively unbounded quota.
    pub async fn df(&self, _path: &Path) -> Result<u64> {
        Ok(u64::MAX)
    }

    pub async fn open(&self, path: &Path, mode: OpenMode) -> Result<RemoteFile> {
        RemoteFile::open(
            Arc::clone(&self.rest),
            Arc::clone(&self.cache),
            path.clone(),
            mode,
            self.config.clone(),
        )
        .await
    }

    /// Read the full contents of a remote file.
    pub async fn cat(&self, path: &Path) -> Result<Vec<u8>> {
        let mut file = self.open(path, OpenMode::Read).await?;
        file.read_all().await
    }

    pub async fn head(&self, path: &Path, size: usize) -> Result<Vec<u8>> {
        let mut file = self.open(path, OpenMode::Read).await?;
        file.read_n(size).await
    }

    pub async fn tail(&self, path: &Path, size: usize) -> Result<Vec<u8>> {
        let info = self.info(path).await?;
        let start = info.length.saturating_sub(size as u64);
        let mut file = self.open(path, OpenMode::Read).await?;
        file.seek(start)?;
        file.read_n(size).await
    }

    /// Write `data` to `path` as a single small file (CREATE then flush).
    /// Large transfers go through the transfer engine instead.
    pub async fn put(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut file = self.open(path, OpenMode::Write).await?;
        file.write(data)?;
        file.close().await
    }

    pub async fn get(&self, path: &Path) -> Result<Vec<u8>> {
        self.cat(path).await
    }

    /// Copy-on-server is not implemented by the reference service (Non-goal
    /// of the original client too); callers use the transfer engine instead.
    pub async fn cp(&self, _src: &Path, _dst: &Path) -> Result<()> {
        Err(Error::Validation(
            "server-side copy is not supported; use the transfer engine".into(),
        ))
    }

    pub async fn listdir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        self.ls(path).await
    }

    pub async fn access(&self, path: &Path, action: FsAction) -> Result<bool> {
        match self.check_access(path, action).await {
            Ok(()) => Ok(true),
            Err(e) if matches!(e, Error::Permission(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn rename(&self, src: &Path, dst: &Path) -> Result<()> {
        self.mv(src, dst).await
    }

    pub async fn stat(&self, path: &Path) -> Result<DirEntry> {
        self.info(path).await
    }

    pub async fn unlink(&self, path: &Path) -> Result<()> {
        self.rm(path, false).await
    }

    pub async fn remove(&self, path: &Path) -> Result<()> {
        self.rm(path, false).await
    }
}

fn parse_file_status(name: &str, status: &serde_json::Value) -> Result<DirEntry> {
    let kind = match status.get("type").and_then(|v| v.as_str()) {
        Some("DIRECTORY") => EntryKind::Directory,
        _ => EntryKind::File,
    };
    Ok(DirEntry {
        name: name.to_string(),
        kind,
        length: status.get("length").and_then(|v| v.as_u64()).unwrap_or(0),
        permission: status
            .get("permission")
            .and_then(|v| v.as_str())
            .unwrap_or("770")
            .to_string(),
        owner: status
            .get("owner")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        group: status
            .get("group")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        modification_time: status
            .get("modificationTime")
            .and_then(|v| v.as_i64())
            .unwrap_or(0),
        replication: status
            .get("replication")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32),
        block_size: status.get("blockSize").and_then(|v| v.as_u64()),
    })
}
