//! Categorised system-state snapshots.
//!
//! A [`Snapshot`] records the file tree, the environment and the hashes
//! of configuration files at one checkpoint of a run. The instrumentation
//! hook persists one record per checkpoint through a [`SnapshotStore`];
//! the comparator later loads the whole [`SnapshotSequence`] back.

use crate::result::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Value recorded for a config file that could not be read.
pub const UNREADABLE: &str = "unreadable";

/// Kind of state captured at a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureCategory {
    /// Directory structure below the tree root
    FileTree,
    /// Process environment
    EnvVariables,
    /// Digests of configuration files
    ConfigHashes,
}

impl CaptureCategory {
    /// Every category, in capture order
    pub const ALL: [Self; 3] = [Self::FileTree, Self::EnvVariables, Self::ConfigHashes];

    /// Configuration name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FileTree => "file_tree",
            Self::EnvVariables => "env_variables",
            Self::ConfigHashes => "config_hashes",
        }
    }
}

impl fmt::Display for CaptureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to capture and what to leave out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Categories recorded at every checkpoint
    pub categories: Vec<CaptureCategory>,
    /// Root of the file tree walk
    pub tree_root: PathBuf,
    /// Directory names skipped at any depth of the tree walk
    pub excluded_dirs: Vec<String>,
    /// Environment variables that differ between any two environments
    pub env_deny: Vec<String>,
    /// Root of the config hash walk
    pub config_root: PathBuf,
    /// Paths below `config_root` never hashed
    pub config_deny: Vec<String>,
    /// Suffix of lock files never hashed
    pub lock_suffix: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            categories: CaptureCategory::ALL.to_vec(),
            tree_root: PathBuf::from("/"),
            excluded_dirs: ["ansible", "proc", "sys", "tmp"]
                .map(String::from)
                .to_vec(),
            env_deny: ["SSH_CLIENT", "SSH_CONNECTION", "LANG", "LC_CTYPE"]
                .map(String::from)
                .to_vec(),
            config_root: PathBuf::from("/etc"),
            config_deny: ["hostname", "hosts", "mtab"].map(String::from).to_vec(),
            lock_suffix: ".lock".to_string(),
        }
    }
}

impl CaptureConfig {
    /// Restrict capture to `categories`
    #[must_use]
    pub fn with_categories(mut self, categories: &[CaptureCategory]) -> Self {
        self.categories = categories.to_vec();
        self
    }

    /// Walk the file tree from `root`
    #[must_use]
    pub fn with_tree_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.tree_root = root.into();
        self
    }

    /// Hash config files below `root`
    #[must_use]
    pub fn with_config_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config_root = root.into();
        self
    }

    /// Skip one more directory name in the tree walk
    #[must_use]
    pub fn with_excluded_dir(mut self, name: impl Into<String>) -> Self {
        self.excluded_dirs.push(name.into());
        self
    }

    /// Ignore one more environment variable
    #[must_use]
    pub fn with_env_deny(mut self, name: impl Into<String>) -> Self {
        self.env_deny.push(name.into());
        self
    }

    /// Whether `category` is captured
    #[must_use]
    pub fn captures(&self, category: CaptureCategory) -> bool {
        self.categories.contains(&category)
    }
}

/// Nested directory listing; files map to `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirTree(pub BTreeMap<String, Option<DirTree>>);

impl DirTree {
    /// Walk `root`, skipping directories named in `excluded`
    pub fn capture(root: &Path, excluded: &[String]) -> HarnessResult<Self> {
        let mut tree = BTreeMap::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
            if !is_dir {
                tree.insert(name, None);
            } else if !excluded.contains(&name) {
                // Unreadable subdirectories show up empty.
                let child = Self::capture(&entry.path(), excluded).unwrap_or_default();
                tree.insert(name, Some(child));
            }
        }
        Ok(Self(tree))
    }

    /// Number of entries at every depth
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.0
            .values()
            .map(|child| 1 + child.as_ref().map_or(0, Self::entry_count))
            .sum()
    }
}

/// Environment variables not in `deny`
pub fn capture_env<I>(vars: I, deny: &[String]) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    vars.into_iter()
        .filter(|(name, _)| !deny.contains(name))
        .collect()
}

/// SHA-256 digests of every file below `root`, keyed by full path
pub fn capture_config_hashes(
    root: &Path,
    deny: &[String],
    lock_suffix: &str,
) -> HarnessResult<BTreeMap<String, String>> {
    let denied: Vec<PathBuf> = deny.iter().map(|d| root.join(d)).collect();
    let mut hashes = BTreeMap::new();
    hash_below(root, &denied, lock_suffix, &mut hashes)?;
    Ok(hashes)
}

fn hash_below(
    dir: &Path,
    denied: &[PathBuf],
    lock_suffix: &str,
    hashes: &mut BTreeMap<String, String>,
) -> HarnessResult<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_ok_and(|t| t.is_dir()) {
            if hash_below(&path, denied, lock_suffix, hashes).is_err() {
                tracing::debug!(path = %path.display(), "skipping unreadable config directory");
            }
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if (!lock_suffix.is_empty() && name.ends_with(lock_suffix)) || denied.contains(&path) {
            continue;
        }
        let digest = fs::read(&path).map_or_else(
            |_| UNREADABLE.to_string(),
            |bytes| format!("{:x}", Sha256::digest(&bytes)),
        );
        hashes.insert(path.to_string_lossy().to_string(), digest);
    }
    Ok(())
}

/// State recorded at one checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Checkpoint id, from 0 in capture order
    pub checkpoint: u64,
    /// Directory structure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_tree: Option<DirTree>,
    /// Environment variables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_variables: Option<BTreeMap<String, String>>,
    /// Config file digests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hashes: Option<BTreeMap<String, String>>,
}

impl Snapshot {
    /// Empty snapshot for `checkpoint`
    #[must_use]
    pub fn new(checkpoint: u64) -> Self {
        Self {
            checkpoint,
            ..Self::default()
        }
    }

    /// Set the file tree
    #[must_use]
    pub fn with_file_tree(mut self, tree: DirTree) -> Self {
        self.file_tree = Some(tree);
        self
    }

    /// Set the environment
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env_variables = Some(env);
        self
    }

    /// Set the config digests
    #[must_use]
    pub fn with_config_hashes(mut self, hashes: BTreeMap<String, String>) -> Self {
        self.config_hashes = Some(hashes);
        self
    }

    /// Capture the current environment
    pub fn capture(config: &CaptureConfig, checkpoint: u64) -> HarnessResult<Self> {
        let env = std::env::vars_os().map(|(k, v)| {
            (
                k.to_string_lossy().to_string(),
                v.to_string_lossy().to_string(),
            )
        });
        Self::capture_with_env(config, checkpoint, env)
    }

    /// Capture with an explicit environment
    pub fn capture_with_env<I>(config: &CaptureConfig, checkpoint: u64, env: I) -> HarnessResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut snapshot = Self::new(checkpoint);
        let mut env = Some(env);
        for category in &config.categories {
            match category {
                CaptureCategory::FileTree => {
                    snapshot.file_tree =
                        Some(DirTree::capture(&config.tree_root, &config.excluded_dirs)?);
                }
                CaptureCategory::EnvVariables => {
                    if let Some(vars) = env.take() {
                        snapshot.env_variables = Some(capture_env(vars, &config.env_deny));
                    }
                }
                CaptureCategory::ConfigHashes => {
                    snapshot.config_hashes = Some(capture_config_hashes(
                        &config.config_root,
                        &config.config_deny,
                        &config.lock_suffix,
                    )?);
                }
            }
        }
        Ok(snapshot)
    }

    /// Categories present in this snapshot
    #[must_use]
    pub fn categories(&self) -> Vec<CaptureCategory> {
        let mut present = Vec::new();
        if self.file_tree.is_some() {
            present.push(CaptureCategory::FileTree);
        }
        if self.env_variables.is_some() {
            present.push(CaptureCategory::EnvVariables);
        }
        if self.config_hashes.is_some() {
            present.push(CaptureCategory::ConfigHashes);
        }
        present
    }

    /// Categories whose recorded state differs from `other`
    #[must_use]
    pub fn differing_categories(&self, other: &Self) -> Vec<CaptureCategory> {
        let mut differing = Vec::new();
        if self.file_tree != other.file_tree {
            differing.push(CaptureCategory::FileTree);
        }
        if self.env_variables != other.env_variables {
            differing.push(CaptureCategory::EnvVariables);
        }
        if self.config_hashes != other.config_hashes {
            differing.push(CaptureCategory::ConfigHashes);
        }
        differing
    }
}

/// All snapshots of one run, ordered by checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotSequence {
    snapshots: Vec<Snapshot>,
}

impl SnapshotSequence {
    /// Sequence from snapshots already in checkpoint order
    #[must_use]
    pub fn from_snapshots(snapshots: Vec<Snapshot>) -> Self {
        Self { snapshots }
    }

    /// Number of checkpoints
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether no checkpoint was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Snapshot at `checkpoint`
    #[must_use]
    pub fn get(&self, checkpoint: usize) -> Option<&Snapshot> {
        self.snapshots.get(checkpoint)
    }

    /// Snapshots in checkpoint order
    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter()
    }
}

/// Directory of numbered snapshot records.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Store backed by `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Backing directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `checkpoint`
    #[must_use]
    pub fn record_path(&self, checkpoint: u64) -> PathBuf {
        self.dir.join(format!("{checkpoint}.json"))
    }

    fn existing_ids(&self) -> HarnessResult<Vec<u64>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Highest existing id + 1, or 0 when the store is empty or absent
    pub fn next_id(&self) -> HarnessResult<u64> {
        if !self.dir.is_dir() {
            return Ok(0);
        }
        Ok(self.existing_ids()?.last().map_or(0, |id| id + 1))
    }

    /// Write `snapshot` as `<checkpoint>.json`
    pub fn write(&self, snapshot: &Snapshot) -> HarnessResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.record_path(snapshot.checkpoint);
        fs::write(&path, serde_json::to_string_pretty(snapshot)?)?;
        Ok(path)
    }

    /// Capture the current state under the next id and persist it
    pub fn capture_next(&self, config: &CaptureConfig) -> HarnessResult<Snapshot> {
        let checkpoint = self.next_id()?;
        let snapshot = Snapshot::capture(config, checkpoint)?;
        let path = self.write(&snapshot)?;
        tracing::info!(
            checkpoint,
            tree_entries = snapshot.file_tree.as_ref().map_or(0, DirTree::entry_count),
            path = %path.display(),
            "snapshot persisted"
        );
        Ok(snapshot)
    }

    /// Load every record; ids must run from 0 without gaps
    pub fn load_sequence(&self) -> HarnessResult<SnapshotSequence> {
        if !self.dir.is_dir() {
            return Err(HarnessError::MissingArtifacts {
                path: self.dir.clone(),
            });
        }
        let corrupt = |message: String| HarnessError::CorruptSequence {
            path: self.dir.clone(),
            message,
        };
        let mut snapshots = Vec::new();
        for (expected, id) in self.existing_ids()?.into_iter().enumerate() {
            if id != expected as u64 {
                return Err(corrupt(format!("missing checkpoint {expected}")));
            }
            let text = fs::read_to_string(self.record_path(id))?;
            let snapshot: Snapshot = serde_json::from_str(&text)
                .map_err(|e| corrupt(format!("checkpoint {id}: {e}")))?;
            if snapshot.checkpoint != id {
                return Err(corrupt(format!(
                    "record {id}.json holds checkpoint {}",
                    snapshot.checkpoint
                )));
            }
            snapshots.push(snapshot);
        }
        Ok(SnapshotSequence::from_snapshots(snapshots))
    }
}
