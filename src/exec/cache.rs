// src/exec/cache.rs

//! Content-hash artifact cache for the `ArtifactCheck` phase.
//!
//! An action's fingerprint is a blake3 hash over its command line and the
//! contents of its declared inputs. A lookup hits when the stored
//! fingerprint matches and every declared output exists. Fingerprints are
//! recorded after a successful compile and persisted to
//! `<root>/.actiongraph/fingerprints`.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::{debug, info, warn};

use crate::engine::{ActionResult, CancelToken, Completion, Job, Runner};
use crate::graph::Action;

/// Relative path (from the project root) to the fingerprints file.
pub const FINGERPRINT_FILE_PATH: &str = ".actiongraph/fingerprints";

fn fingerprint_file_path(root: &Path) -> PathBuf {
    root.join(FINGERPRINT_FILE_PATH)
}

/// Compute the hash of a single file.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file =
        File::open(path).with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Fingerprint of an action: command line plus input contents.
///
/// Inputs are hashed in sorted order; a missing input contributes a marker
/// so that creating it later changes the fingerprint.
pub fn compute_fingerprint(action: &Action, root: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    hasher.update(action.command.as_deref().unwrap_or("").as_bytes());
    hasher.update(b"\0");

    let mut inputs: Vec<PathBuf> = action.inputs.iter().map(|p| root.join(p)).collect();
    inputs.sort();

    for path in inputs {
        hasher.update(path.to_string_lossy().as_bytes());
        if path.is_file() {
            hasher.update(compute_file_hash(&path)?.as_bytes());
        } else {
            hasher.update(b"<missing>");
        }
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// Persistent map from action name to its last successful fingerprint.
#[derive(Debug)]
pub struct FingerprintStore {
    root: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FingerprintStore {
    /// Open the store under `root`, loading existing fingerprints if any.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let entries = load_all_fingerprints(&root)?;
        debug!(root = ?root, entries = entries.len(), "opened fingerprint store");
        Ok(Self {
            root,
            entries: Mutex::new(entries),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `action` can be completed from previously produced outputs.
    pub fn lookup(&self, action: &Action) -> Result<bool> {
        let stored = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&action.name)
            .cloned();
        let Some(stored) = stored else {
            return Ok(false);
        };

        if action.outputs.iter().any(|o| !self.root.join(o).exists()) {
            debug!(action = %action.name, "artifact outputs missing");
            return Ok(false);
        }

        let current = compute_fingerprint(action, &self.root)?;
        Ok(current == stored)
    }

    /// Remember the current fingerprint of a successfully compiled action.
    pub fn record(&self, action: &Action) -> Result<()> {
        let fingerprint = compute_fingerprint(action, &self.root)?;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(action.name.clone(), fingerprint);
        save_all_fingerprints(&self.root, &entries)?;
        debug!(action = %action.name, "stored action fingerprint");
        Ok(())
    }
}

/// Artifact-check runner backed by a [`FingerprintStore`].
///
/// A hit finishes the action; a miss requeues it for compilation; a lookup
/// error is reported as a failed check, which also falls through to
/// compilation.
pub struct CacheRunner {
    store: Arc<FingerprintStore>,
}

impl CacheRunner {
    pub fn new(store: Arc<FingerprintStore>) -> Self {
        Self { store }
    }
}

impl Runner for CacheRunner {
    fn try_run(&self, action: &Action, _cancel: &CancelToken) -> Option<Job> {
        let store = Arc::clone(&self.store);
        let action = action.clone();

        Some(Box::new(move |_cancel: &CancelToken| {
            match store.lookup(&action) {
                Ok(true) => {
                    info!(action = %action.name, "artifact cache hit");
                    Completion::Finished(ActionResult::success("artifact cache hit"))
                }
                Ok(false) => {
                    debug!(action = %action.name, "artifact cache miss");
                    Completion::Requeue
                }
                Err(err) => {
                    warn!(action = %action.name, error = %err, "artifact check failed");
                    Completion::Failed(ActionResult::failed(
                        None,
                        format!("artifact check failed: {err:#}"),
                    ))
                }
            }
        }))
    }
}

/// Load all stored fingerprints from `<root>/.actiongraph/fingerprints`.
fn load_all_fingerprints(root: &Path) -> Result<HashMap<String, String>> {
    let path = fingerprint_file_path(root);

    if !path.exists() {
        return Ok(HashMap::new());
    }

    let file =
        File::open(&path).with_context(|| format!("opening fingerprint file at {:?}", path))?;
    let reader = BufReader::new(file);

    let mut map = HashMap::new();

    for line_res in reader.lines() {
        let line = line_res?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some((name, hash)) = trimmed.rsplit_once(char::is_whitespace) {
            map.insert(name.trim().to_string(), hash.to_string());
        }
    }

    Ok(map)
}

/// Persist all fingerprints, sorted by action name.
fn save_all_fingerprints(root: &Path, map: &HashMap<String, String>) -> Result<()> {
    let path = fingerprint_file_path(root);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating fingerprint directory at {:?}", parent))?;
    }

    let file =
        File::create(&path).with_context(|| format!("creating fingerprint file at {:?}", path))?;
    let mut writer = BufWriter::new(file);

    let sorted: BTreeMap<&String, &String> = map.iter().collect();
    for (name, hash) in sorted {
        writeln!(writer, "{} {}", name, hash)?;
    }

    writer.flush()?;
    Ok(())
}
