//! Store actor for control documents using sled
//!
//! Every committed change produces a `set_key` call. Writes are held in memory
//! per key and flushed once the debounce window has passed without new writes,
//! so a burst of edits on one control results in a single disk write (the last
//! value wins). A `None` value deletes the key.
//!
//! ```ignore
//! let store = StoreActor::spawn("./data/controls.sled", 500)?;
//! let docs = store.load_prefix("controls/").await?;
//! store.flush().await?;
//! store.shutdown();
//! ```

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::host::PersistenceStore;

/// Default debounce window in milliseconds
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

#[derive(Debug)]
pub enum StoreCommand {
    /// Queue a write (debounced); `None` deletes
    Set { key: String, value: Option<Value> },
    /// Flush pending writes, then read every key under a prefix
    LoadPrefix {
        prefix: String,
        response: oneshot::Sender<Vec<(String, Value)>>,
    },
    /// Force pending writes to disk
    Flush(oneshot::Sender<Result<()>>),
    Shutdown,
}

pub struct StoreActor {
    db: sled::Db,
    command_rx: mpsc::UnboundedReceiver<StoreCommand>,
    pending: BTreeMap<String, Option<Value>>,
    last_write: Instant,
    debounce: Duration,
    write_count: u64,
}

/// Cheap to clone, shared between the engine and the binary
#[derive(Clone)]
pub struct StoreHandle {
    cmd_tx: mpsc::UnboundedSender<StoreCommand>,
}

impl StoreActor {
    /// Open the database and spawn the actor
    ///
    /// A zero debounce writes through immediately.
    pub fn spawn(db_path: &str, debounce_ms: u64) -> Result<StoreHandle> {
        let db = sled::open(db_path)
            .with_context(|| format!("Failed to open sled database at: {}", db_path))?;
        info!("💾 Control store opened at: {}", db_path);

        let (cmd_tx, command_rx) = mpsc::unbounded_channel();
        let actor = StoreActor {
            db,
            command_rx,
            pending: BTreeMap::new(),
            last_write: Instant::now(),
            debounce: Duration::from_millis(debounce_ms),
            write_count: 0,
        };
        tokio::spawn(actor.run());

        Ok(StoreHandle { cmd_tx })
    }

    async fn run(mut self) {
        debug!("Store actor started (debounce: {:?})", self.debounce);
        let tick = if self.debounce.is_zero() {
            Duration::from_secs(1)
        } else {
            self.debounce
        };
        let mut ticker = tokio::time::interval(tick);

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        self.flush_or_log().await;
                        break;
                    };
                    match cmd {
                        StoreCommand::Set { key, value } => {
                            trace!("Queued write of {}", key);
                            self.pending.insert(key, value);
                            self.last_write = Instant::now();
                            if self.debounce.is_zero() {
                                self.flush_or_log().await;
                            }
                        }
                        StoreCommand::LoadPrefix { prefix, response } => {
                            self.flush_or_log().await;
                            let _ = response.send(self.load_prefix(&prefix));
                        }
                        StoreCommand::Flush(response) => {
                            let result = self.flush_pending().await;
                            let _ = response.send(result);
                        }
                        StoreCommand::Shutdown => {
                            info!("Store actor shutting down, flushing pending writes");
                            self.flush_or_log().await;
                            if !self.pending.is_empty() {
                                error!("Lost {} unwritten keys on shutdown", self.pending.len());
                            }
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    if !self.pending.is_empty() && self.last_write.elapsed() >= self.debounce {
                        trace!("Debounce window expired, flushing {} keys", self.pending.len());
                        self.flush_or_log().await;
                    }
                }
            }
        }
        info!("Store actor stopped (total writes: {})", self.write_count);
    }

    async fn flush_or_log(&mut self) {
        if let Err(e) = self.flush_pending().await {
            warn!("Flush failed, {} keys kept for retry: {:#}", self.pending.len(), e);
        }
    }

    /// Write every pending key in one batch
    ///
    /// On failure the keys stay pending and the next tick retries them.
    async fn flush_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut batch = sled::Batch::default();
        for (key, value) in &self.pending {
            match value {
                Some(value) => {
                    let bytes = serde_json::to_vec(value)
                        .with_context(|| format!("Failed to serialize {}", key))?;
                    batch.insert(key.as_bytes(), bytes);
                }
                None => batch.remove(key.as_bytes()),
            }
        }
        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();

        let db = self.db.clone();
        let result = tokio::task::spawn_blocking(move || {
            db.apply_batch(batch)?;
            db.flush()?;
            Ok::<_, sled::Error>(())
        })
        .await;

        match result {
            Ok(Ok(())) => {
                self.write_count += 1;
                trace!("Flushed {} keys (write #{})", count, self.write_count);
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Failed to write to sled: {}", e);
                self.restore_failed(pending);
                Err(e).context("Failed to write batch")
            }
            Err(e) => {
                error!("Spawn blocking task panicked: {}", e);
                self.restore_failed(pending);
                Err(e).context("Store writer panicked")
            }
        }
    }

    /// Put back writes from a failed batch, keeping anything queued since
    fn restore_failed(&mut self, failed: BTreeMap<String, Option<Value>>) {
        for (key, value) in failed {
            self.pending.entry(key).or_insert(value);
        }
    }

    fn load_prefix(&self, prefix: &str) -> Vec<(String, Value)> {
        let mut entries = Vec::new();
        for item in self.db.scan_prefix(prefix.as_bytes()) {
            let (key, bytes) = match item {
                Ok(kv) => kv,
                Err(e) => {
                    error!("Failed to read from sled: {}", e);
                    continue;
                }
            };
            let key = String::from_utf8_lossy(&key).into_owned();
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => entries.push((key, value)),
                Err(e) => warn!("Skipping unreadable entry {}: {}", key, e),
            }
        }
        debug!("Loaded {} entries under '{}'", entries.len(), prefix);
        entries
    }
}

impl StoreHandle {
    /// Read every stored entry under a prefix, pending writes included
    pub async fn load_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(StoreCommand::LoadPrefix {
                prefix: prefix.to_string(),
                response: tx,
            })
            .context("Failed to send load command: actor shut down")?;
        rx.await.context("Failed to receive load response")
    }

    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(StoreCommand::Flush(tx))
            .context("Failed to send flush command: actor shut down")?;
        rx.await.context("Failed to receive flush response")?
    }

    /// Fire-and-forget; pending writes are flushed before the actor stops
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(StoreCommand::Shutdown);
    }
}

impl PersistenceStore for StoreHandle {
    fn set_key(&self, path: &str, value: Option<Value>) {
        let cmd = StoreCommand::Set {
            key: path.to_string(),
            value,
        };
        if self.cmd_tx.send(cmd).is_err() {
            warn!("Store actor stopped, write of {} lost", path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn spawn(debounce_ms: u64) -> (tempfile::TempDir, StoreHandle) {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("test.sled");
        let handle = StoreActor::spawn(db_path.to_str().unwrap(), debounce_ms).unwrap();
        (temp, handle)
    }

    #[tokio::test]
    async fn test_writes_are_readable_by_prefix() {
        let (_temp, store) = spawn(0);
        store.set_key("controls/loc:1/0/0", Some(json!({ "type": "press" })));
        store.set_key("other/x", Some(json!(1)));

        let loaded = store.load_prefix("controls/").await.unwrap();
        assert_eq!(
            loaded,
            vec![("controls/loc:1/0/0".to_string(), json!({ "type": "press" }))]
        );
        store.shutdown();
    }

    #[tokio::test]
    async fn test_last_write_wins_and_none_deletes() {
        let (_temp, store) = spawn(10_000);
        store.set_key("controls/a", Some(json!(1)));
        store.set_key("controls/a", Some(json!(2)));
        store.set_key("controls/b", Some(json!(3)));
        store.set_key("controls/b", None);
        store.flush().await.unwrap();

        let loaded = store.load_prefix("controls/").await.unwrap();
        assert_eq!(loaded, vec![("controls/a".to_string(), json!(2))]);
        store.shutdown();
    }

    #[tokio::test]
    async fn test_debounced_writes_reach_disk() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("test.sled");
        {
            let store = StoreActor::spawn(db_path.to_str().unwrap(), 50).unwrap();
            store.set_key("controls/a", Some(json!("kept")));
            tokio::time::sleep(Duration::from_millis(200)).await;
            store.shutdown();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let db = sled::open(&db_path).unwrap();
        let raw = db.get("controls/a").unwrap().unwrap();
        assert_eq!(serde_json::from_slice::<Value>(&raw).unwrap(), json!("kept"));
    }

    #[tokio::test]
    async fn test_write_bursts_are_never_dropped() {
        let (_temp, store) = spawn(0);
        for i in 0..1500 {
            store.set_key(&format!("controls/{:04}", i), Some(json!(i)));
        }
        store.flush().await.unwrap();

        let loaded = store.load_prefix("controls/").await.unwrap();
        assert_eq!(loaded.len(), 1500);
        assert_eq!(loaded[1499], ("controls/1499".to_string(), json!(1499)));
        store.shutdown();
    }

    #[tokio::test]
    async fn test_failed_batch_is_restored_without_clobbering_newer_writes() {
        let temp = tempdir().unwrap();
        let (_tx, command_rx) = mpsc::unbounded_channel();
        let mut actor = StoreActor {
            db: sled::open(temp.path().join("test.sled")).unwrap(),
            command_rx,
            pending: BTreeMap::new(),
            last_write: Instant::now(),
            debounce: Duration::ZERO,
            write_count: 0,
        };
        actor.pending.insert("controls/b".to_string(), Some(json!("newer")));

        let mut failed = BTreeMap::new();
        failed.insert("controls/a".to_string(), Some(json!("old")));
        failed.insert("controls/b".to_string(), Some(json!("old")));
        failed.insert("controls/c".to_string(), None);
        actor.restore_failed(failed);

        assert_eq!(actor.pending.len(), 3);
        assert_eq!(actor.pending["controls/a"], Some(json!("old")));
        assert_eq!(actor.pending["controls/b"], Some(json!("newer")));
        assert_eq!(actor.pending["controls/c"], None);

        // The retry writes the restored keys
        actor.flush_pending().await.unwrap();
        assert!(actor.pending.is_empty());
        assert_eq!(actor.load_prefix("controls/").len(), 2);
    }
}
