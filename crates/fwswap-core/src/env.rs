//! Durable environment stores
//!
//! The active-slot pointers live in a durable key-value environment (on
//! real devices, the U-Boot environment). A store is opened once per
//! upgrade session; reads and writes go against an in-memory working copy,
//! and a single commit at the end persists all pointer flips as one batch.
//! The swap controller relies on that bracket: nothing becomes durable
//! unless every part flashed.

use std::collections::HashMap;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::EnvError;

/// A durable key-value store, opened once per upgrade session.
pub trait EnvStore {
    /// The session type produced by [`EnvStore::open`].
    type Session: EnvSession;

    /// Open a session. Failure here is fatal and touches nothing.
    ///
    /// # Errors
    ///
    /// [`EnvError::OpenFailed`] when the environment cannot be read.
    fn open(&self) -> Result<Self::Session, EnvError>;
}

/// One open environment session with an in-memory working copy.
pub trait EnvSession {
    /// Read a value, preferring uncommitted writes from this session.
    fn read(&self, key: &str) -> Option<String>;

    /// Record a value in the working copy. Not durable until commit.
    fn write(&mut self, key: &str, value: &str);

    /// Persist all writes from this session as one batch.
    ///
    /// # Errors
    ///
    /// [`EnvError::CommitFailed`] when the batch could not be persisted;
    /// the caller must treat storage content as ahead of the recorded
    /// pointers.
    fn commit(self) -> Result<(), EnvError>;
}

/// In-process environment store over a shared map.
///
/// Used by tests and dry runs; commit applies the session's working copy
/// to the shared map as a batch.
#[derive(Debug, Clone, Default)]
pub struct MemoryEnvStore {
    values: Arc<Mutex<HashMap<String, String>>>,
    fail_open: bool,
    fail_commit: bool,
}

impl MemoryEnvStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a key before any session opens.
    pub fn seed(&self, key: &str, value: &str) {
        self.values
            .lock()
            .insert(key.to_string(), value.to_string());
    }

    /// Read a committed value directly, bypassing any session.
    pub fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    /// Make [`EnvStore::open`] fail, for error-path testing.
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Make [`EnvSession::commit`] fail, for error-path testing.
    pub fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }
}

impl EnvStore for MemoryEnvStore {
    type Session = MemorySession;

    fn open(&self) -> Result<Self::Session, EnvError> {
        if self.fail_open {
            return Err(EnvError::OpenFailed("simulated open failure".to_string()));
        }
        Ok(MemorySession {
            values: Arc::clone(&self.values),
            pending: Vec::new(),
            fail_commit: self.fail_commit,
        })
    }
}

/// Session over a [`MemoryEnvStore`].
#[derive(Debug)]
pub struct MemorySession {
    values: Arc<Mutex<HashMap<String, String>>>,
    pending: Vec<(String, String)>,
    fail_commit: bool,
}

impl EnvSession for MemorySession {
    fn read(&self, key: &str) -> Option<String> {
        self.pending
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .or_else(|| self.values.lock().get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) {
        self.pending.push((key.to_string(), value.to_string()));
    }

    fn commit(self) -> Result<(), EnvError> {
        if self.fail_commit {
            return Err(EnvError::CommitFailed(
                "simulated commit failure".to_string(),
            ));
        }
        let mut values = self.values.lock();
        for (key, value) in self.pending {
            values.insert(key, value);
        }
        Ok(())
    }
}

/// Environment store backed by the U-Boot environment tools.
///
/// `open` snapshots the whole environment via `fw_printenv`; `commit`
/// streams `key value` lines to `fw_setenv -s -`, which rewrites the
/// environment in one pass.
#[derive(Debug, Clone)]
pub struct UBootEnvStore {
    printenv: String,
    setenv: String,
}

impl Default for UBootEnvStore {
    fn default() -> Self {
        Self {
            printenv: "fw_printenv".to_string(),
            setenv: "fw_setenv".to_string(),
        }
    }
}

impl UBootEnvStore {
    /// Store using the standard `fw_printenv`/`fw_setenv` tools.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store using alternative tool names (tests, PATH-less systems).
    pub fn with_programs(printenv: &str, setenv: &str) -> Self {
        Self {
            printenv: printenv.to_string(),
            setenv: setenv.to_string(),
        }
    }
}

impl EnvStore for UBootEnvStore {
    type Session = UBootSession;

    fn open(&self) -> Result<Self::Session, EnvError> {
        let output = Command::new(&self.printenv)
            .output()
            .map_err(|e| EnvError::OpenFailed(format!("{}: {e}", self.printenv)))?;
        if !output.status.success() {
            return Err(EnvError::OpenFailed(format!(
                "{} exited with {}",
                self.printenv, output.status
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let mut snapshot = HashMap::new();
        for line in text.lines() {
            if let Some((key, value)) = line.split_once('=') {
                snapshot.insert(key.to_string(), value.to_string());
            }
        }

        debug!(vars = snapshot.len(), "environment snapshot taken");
        Ok(UBootSession {
            snapshot,
            pending: Vec::new(),
            setenv: self.setenv.clone(),
        })
    }
}

/// Session over the U-Boot environment.
#[derive(Debug)]
pub struct UBootSession {
    snapshot: HashMap<String, String>,
    pending: Vec<(String, String)>,
    setenv: String,
}

impl EnvSession for UBootSession {
    fn read(&self, key: &str) -> Option<String> {
        self.pending
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .or_else(|| self.snapshot.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) {
        self.pending.push((key.to_string(), value.to_string()));
    }

    fn commit(self) -> Result<(), EnvError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut script = String::new();
        for (key, value) in &self.pending {
            script.push_str(key);
            script.push(' ');
            script.push_str(value);
            script.push('\n');
        }

        // Keep tool output off stdout; in CGI mode that is the HTTP response.
        let mut child = Command::new(&self.setenv)
            .arg("-s")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| EnvError::CommitFailed(format!("{}: {e}", self.setenv)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(script.as_bytes())
                .map_err(|e| EnvError::CommitFailed(format!("{}: {e}", self.setenv)))?;
        }

        let status = child
            .wait()
            .map_err(|e| EnvError::CommitFailed(format!("{}: {e}", self.setenv)))?;
        if !status.success() {
            return Err(EnvError::CommitFailed(format!(
                "{} exited with {status}",
                self.setenv
            )));
        }

        info!(vars = self.pending.len(), "environment rewritten");
        Ok(())
    }
}
