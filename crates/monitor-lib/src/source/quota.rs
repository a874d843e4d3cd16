//! Per-user disk usage computed from file ownership

use super::QuotaProvider;
use crate::error::SourceError;
use async_trait::async_trait;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Sums the sizes of regular files owned by a uid or gid
#[derive(Debug, Default)]
pub struct OwnedFilesQuota;

impl OwnedFilesQuota {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl QuotaProvider for OwnedFilesQuota {
    async fn user_fs_quota_usage(
        &self,
        path: &Path,
        uid: u32,
        gid: u32,
    ) -> Result<u64, SourceError> {
        let root = fs::symlink_metadata(path)
            .await
            .map_err(|e| SourceError::io(path, e))?;
        if !root.is_dir() {
            return Ok(owned_size(&root, uid, gid));
        }

        let mut total = 0u64;
        let mut pending: Vec<PathBuf> = vec![path.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                // entries can vanish between listing and descending
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(SourceError::io(&dir, e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| SourceError::io(&dir, e))?
            {
                let Ok(metadata) = fs::symlink_metadata(entry.path()).await else {
                    continue;
                };
                if metadata.is_dir() {
                    pending.push(entry.path());
                } else {
                    total += owned_size(&metadata, uid, gid);
                }
            }
        }

        Ok(total)
    }
}

fn owned_size(metadata: &std::fs::Metadata, uid: u32, gid: u32) -> u64 {
    if metadata.is_file() && (metadata.uid() == uid || metadata.gid() == gid) {
        metadata.len()
    } else {
        0
    }
}
