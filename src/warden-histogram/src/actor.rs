//! The histogram actor and its client handle.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::snapshot::{Counters, SnapshotDocument};
use super::{HistogramError, Result};

/// Default interval between periodic flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Maximum number of queued messages before senders wait.
pub const MAILBOX_CAPACITY: usize = 100;

/// Configuration for a histogram actor.
#[derive(Debug, Clone)]
pub struct HistogramConfig {
    /// Snapshot file, read at startup and replaced on every flush.
    pub path: PathBuf,

    /// Interval of the periodic flush.
    pub flush_interval: Duration,

    /// Mailbox capacity.
    pub mailbox_capacity: usize,
}

impl HistogramConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            mailbox_capacity: MAILBOX_CAPACITY,
        }
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity.max(1);
        self
    }
}

type Reply = oneshot::Sender<Result<()>>;

/// Mailbox message. Every variant carries the slot its reply goes to.
#[derive(Debug)]
enum Message {
    RecordAccepted { name: String, reply: Reply },
    RecordBlocked { name: String, reply: Reply },
    FlushNow { reply: Reply },
    Shutdown { reply: Reply },
}

/// Client handle to a histogram actor.
///
/// Cloning is cheap. A disabled handle answers every call with `Ok(())`
/// immediately, so callers never need to check whether histogram logging is
/// configured.
#[derive(Debug, Clone)]
pub struct HistogramLogger {
    tx: Option<mpsc::Sender<Message>>,
}

impl HistogramLogger {
    /// Load the snapshot named by `config` and start the actor and its
    /// flush timer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(config: HistogramConfig) -> Self {
        let counters = Counters::load_or_default(&config.path);
        Self::spawn_with_counters(config, counters)
    }

    /// Start an actor seeded with `counters` instead of the snapshot file.
    pub fn spawn_with_counters(config: HistogramConfig, counters: Counters) -> Self {
        let (tx, rx) = mpsc::channel(config.mailbox_capacity.max(1));
        let timer = CancellationToken::new();

        let actor = HistogramActor {
            path: config.path,
            counters,
            dirty: 0,
            closed: false,
            last_write: None,
            timer: timer.clone(),
        };
        tokio::spawn(actor.run(rx));
        tokio::spawn(run_flush_timer(tx.downgrade(), config.flush_interval, timer));

        Self { tx: Some(tx) }
    }

    /// Start an actor when `path` is set, otherwise return a disabled handle.
    pub fn from_path(path: Option<&Path>, flush_interval: Duration) -> Self {
        match path {
            Some(path) if !path.as_os_str().is_empty() => {
                Self::spawn(HistogramConfig::new(path).with_flush_interval(flush_interval))
            }
            _ => Self::disabled(),
        }
    }

    /// A handle with no actor behind it.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Count one accepted connection to `name`.
    pub async fn record_accepted(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.request(|reply| Message::RecordAccepted { name, reply })
            .await
    }

    /// Count one blocked connection to `name`.
    pub async fn record_blocked(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.request(|reply| Message::RecordBlocked { name, reply })
            .await
    }

    /// Write a snapshot now if anything changed since the last one.
    ///
    /// Returns once the write has finished, with its error if it failed.
    pub async fn flush(&self) -> Result<()> {
        self.request(|reply| Message::FlushNow { reply }).await
    }

    /// Stop the flush timer, write the final snapshot and close the actor.
    ///
    /// A second call succeeds without doing anything.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Message::Shutdown { reply }).await
    }

    async fn request(&self, build: impl FnOnce(Reply) -> Message) -> Result<()> {
        let Some(tx) = &self.tx else {
            return Ok(());
        };

        let (reply, response) = oneshot::channel();
        tx.send(build(reply))
            .await
            .map_err(|_| HistogramError::Unavailable)?;
        response.await.map_err(|_| HistogramError::Unavailable)?
    }
}

/// Exclusive owner of the counters.
struct HistogramActor {
    path: PathBuf,
    counters: Counters,
    /// Mutations since the last snapshot write was started.
    dirty: u64,
    closed: bool,
    timer: CancellationToken,
    /// Most recently started write. Each write waits for the one before it.
    last_write: Option<JoinHandle<()>>,
}

impl HistogramActor {
    async fn run(mut self, mut rx: mpsc::Receiver<Message>) {
        while let Some(message) = rx.recv().await {
            self.handle(message);
        }
        self.timer.cancel();
        debug!("histogram actor stopped");
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::RecordAccepted { name, reply } => {
                let result = self.guard_open().map(|()| {
                    self.counters.record_accepted(name);
                    self.dirty += 1;
                });
                let _ = reply.send(result);
            }
            Message::RecordBlocked { name, reply } => {
                let result = self.guard_open().map(|()| {
                    self.counters.record_blocked(name);
                    self.dirty += 1;
                });
                let _ = reply.send(result);
            }
            Message::FlushNow { reply } => match self.guard_open() {
                Ok(()) => self.flush(reply),
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            Message::Shutdown { reply } => {
                if self.closed {
                    let _ = reply.send(Ok(()));
                    return;
                }
                self.timer.cancel();
                self.closed = true;
                if self.dirty == 0 {
                    self.drain(reply);
                } else {
                    self.flush(reply);
                }
            }
        }
    }

    fn guard_open(&self) -> Result<()> {
        if self.closed {
            Err(HistogramError::Closed)
        } else {
            Ok(())
        }
    }

    /// Snapshot the counters and hand the write to a separate task.
    ///
    /// The dirty count is cleared before the write runs; a failed write is
    /// not retried. Writes land in the order they were started, so the
    /// newest snapshot is always the one left on disk.
    fn flush(&mut self, reply: Reply) {
        if self.dirty == 0 {
            let _ = reply.send(Ok(()));
            return;
        }

        let counters = self.counters.clone();
        let flushed = std::mem::take(&mut self.dirty);
        let path = self.path.clone();
        let previous = self.last_write.take();

        self.last_write = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            let result = SnapshotDocument::from_counters(&counters)
                .persist(&path)
                .await;
            match &result {
                Ok(()) => debug!(flushed, path = %path.display(), "Histogram logger saved entries"),
                Err(e) => warn!(flushed, path = %path.display(), "Error writing histogram file: {}", e),
            }
            let _ = reply.send(result);
        }));
    }

    /// Reply once every started write has finished.
    fn drain(&mut self, reply: Reply) {
        match self.last_write.take() {
            Some(previous) => {
                tokio::spawn(async move {
                    let _ = previous.await;
                    let _ = reply.send(Ok(()));
                });
            }
            None => {
                let _ = reply.send(Ok(()));
            }
        }
    }
}

/// Enqueue a `FlushNow` every `interval` until cancelled or the actor is gone.
async fn run_flush_timer(
    tx: mpsc::WeakSender<Message>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(tx) = tx.upgrade() else {
            break;
        };
        let (reply, response) = oneshot::channel();
        if tx.send(Message::FlushNow { reply }).await.is_err() {
            break;
        }
        drop(tx);

        tokio::select! {
            _ = cancel.cancelled() => break,
            result = response => match result {
                Ok(Ok(())) => {}
                Ok(Err(HistogramError::Closed)) | Err(_) => break,
                Ok(Err(e)) => warn!("Error writing to histogram logger: {}", e),
            },
        }
    }

    debug!("histogram flush timer finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &tempfile::TempDir) -> HistogramConfig {
        HistogramConfig::new(dir.path().join("hist.yml"))
            .with_flush_interval(Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_disabled_logger_is_noop() {
        let logger = HistogramLogger::disabled();
        assert!(!logger.is_enabled());
        logger.record_accepted("a.example.com").await.unwrap();
        logger.record_blocked("b.example.com").await.unwrap();
        logger.flush().await.unwrap();
        logger.shutdown().await.unwrap();
        logger.record_accepted("a.example.com").await.unwrap();
    }

    #[tokio::test]
    async fn test_from_path_empty_is_disabled() {
        let logger = HistogramLogger::from_path(Some(Path::new("")), DEFAULT_FLUSH_INTERVAL);
        assert!(!logger.is_enabled());
        assert!(!HistogramLogger::from_path(None, DEFAULT_FLUSH_INTERVAL).is_enabled());
    }

    #[tokio::test]
    async fn test_flush_without_changes_skips_write() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let path = config.path.clone();
        let logger = HistogramLogger::spawn(config);

        logger.flush().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_closed_rejects_everything_but_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let logger = HistogramLogger::spawn(config(&dir));

        logger.shutdown().await.unwrap();

        assert!(matches!(
            logger.record_accepted("a.example.com").await,
            Err(HistogramError::Closed)
        ));
        assert!(matches!(
            logger.record_blocked("a.example.com").await,
            Err(HistogramError::Closed)
        ));
        assert!(matches!(logger.flush().await, Err(HistogramError::Closed)));
        logger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_error_message() {
        assert_eq!(HistogramError::Closed.to_string(), "logger closed");
    }

    #[tokio::test]
    async fn test_failed_write_drops_pending_counts() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let config = HistogramConfig::new(blocker.join("hist.yml"))
            .with_flush_interval(Duration::from_secs(3600));
        let logger = HistogramLogger::spawn(config);

        logger.record_blocked("ads.example.com").await.unwrap();
        assert!(logger.flush().await.is_err());

        // Dirty count was reset when the failed write started.
        logger.flush().await.unwrap();
    }
}
