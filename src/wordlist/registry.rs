use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::WordlistError;

/// A wordlist resolved by a registry. Both names may be used as keys when
/// looking up a length bound.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostedWordlist {
    pub short_name: String,
    pub filename: String,
    pub location: PathBuf,
}

#[async_trait]
pub trait WordlistRegistry: Send + Sync {
    /// Resolves names to wordlists. Names pointing at the same backing
    /// wordlist yield a single entry.
    async fn get(&self, names: &[String]) -> Result<Vec<HostedWordlist>, WordlistError>;

    /// Raw content of a resolved wordlist.
    async fn read(&self, list: &HostedWordlist) -> Result<Vec<u8>, WordlistError>;
}

/// Registry over a local directory of `.txt` wordlists and `.kite` route files.
#[derive(Clone, Debug)]
pub struct DirectoryRegistry {
    root: PathBuf,
}

const CANDIDATE_SUFFIXES: [&str; 3] = ["", ".txt", ".kite"];

impl DirectoryRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn resolve(&self, name: &str) -> Option<PathBuf> {
        for suffix in CANDIDATE_SUFFIXES {
            let candidate = self.root.join(format!("{name}{suffix}"));
            if let Ok(meta) = tokio::fs::metadata(&candidate).await {
                if meta.is_file() {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

#[async_trait]
impl WordlistRegistry for DirectoryRegistry {
    async fn get(&self, names: &[String]) -> Result<Vec<HostedWordlist>, WordlistError> {
        let mut out = Vec::new();
        let mut seen: HashSet<PathBuf> = HashSet::new();
        for name in names {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let location =
                self.resolve(name)
                    .await
                    .ok_or_else(|| WordlistError::UnknownWordlist {
                        name: name.to_string(),
                        root: self.root.display().to_string(),
                    })?;
            if !seen.insert(location.clone()) {
                continue;
            }
            let short_name = location
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| name.to_string());
            let filename = location
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| name.to_string());
            out.push(HostedWordlist {
                short_name,
                filename,
                location,
            });
        }
        Ok(out)
    }

    async fn read(&self, list: &HostedWordlist) -> Result<Vec<u8>, WordlistError> {
        tokio::fs::read(&list.location)
            .await
            .map_err(|e| WordlistError::Read {
                path: list.location.display().to_string(),
                source: e,
            })
    }
}
