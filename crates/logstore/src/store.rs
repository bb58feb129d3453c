//! The append-only log store (§4.4): in-memory-first append with a
//! background flusher owning the active segment file.

use crate::error::LogError;
use crate::observer::LogObserver;
use crate::segment::{list_segment_ids, scan_segment, ActiveSegment};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const FLUSH_THRESHOLD_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    Memory,
    Fsync,
}

#[derive(Debug, Clone)]
pub struct LogStoreConfig {
    pub dir: PathBuf,
    pub durability: Durability,
    pub max_segment_bytes: u64,
    pub max_buffered_bytes: usize,
    pub queue_capacity: usize,
}

impl LogStoreConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            durability: Durability::Fsync,
            max_segment_bytes: 64 * 1024 * 1024,
            max_buffered_bytes: 16 * 1024 * 1024,
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogStatsSnapshot {
    pub buffered_bytes: usize,
    pub written_bytes: u64,
    pub appended_records: u64,
    pub rejected_appends: u64,
}

#[derive(Debug, Clone)]
pub struct Record {
    pub offset: u64,
    pub data: Vec<u8>,
}

struct AppendJob {
    offset: u64,
    data: Vec<u8>,
    ack: oneshot::Sender<Result<(), LogError>>,
}

enum FlusherMsg {
    Append(AppendJob),
    Rotate(oneshot::Sender<std::io::Result<()>>),
    Sync(oneshot::Sender<std::io::Result<()>>),
}

#[derive(Default)]
struct Counters {
    buffered_bytes: AtomicUsize,
    written_bytes: AtomicU64,
    appended_records: AtomicU64,
    rejected_appends: AtomicU64,
}

struct Inner {
    dir: PathBuf,
    durability: Durability,
    max_buffered_bytes: usize,
    next_offset: AtomicU64,
    counters: Arc<Counters>,
    tx: Mutex<Option<mpsc::Sender<FlusherMsg>>>,
    flusher: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

/// An append-only, segmented log store.
#[derive(Clone)]
pub struct LogStore {
    inner: Arc<Inner>,
}

impl LogStore {
    /// Opens (recovering if necessary) the log store rooted at `config.dir`.
    pub async fn open(
        config: LogStoreConfig,
        observer: Option<Arc<dyn LogObserver>>,
    ) -> Result<Self, LogError> {
        std::fs::create_dir_all(&config.dir)?;
        let ids = list_segment_ids(&config.dir)?;

        let mut max_offset: Option<u64> = None;
        for &id in &ids {
            let (records, _) = scan_segment(&crate::segment::segment_path(&config.dir, id))?;
            if let Some(last) = records.last() {
                max_offset = Some(max_offset.map_or(last.offset, |m| m.max(last.offset)));
            }
        }
        let next_offset = max_offset.map_or(0, |m| m + 1);

        let active = match ids.last() {
            Some(&id) => {
                let (_records, valid_len) =
                    scan_segment(&crate::segment::segment_path(&config.dir, id))?;
                ActiveSegment::reopen_for_append(&config.dir, id, valid_len)?
            }
            None => ActiveSegment::create(&config.dir, 0)?,
        };

        if let Some(obs) = &observer {
            obs.on_recover(next_offset);
        }
        info!(next_offset, segments = ids.len(), "log store recovered");

        let counters = Arc::new(Counters::default());
        let (tx, rx) = mpsc::channel::<FlusherMsg>(config.queue_capacity);
        let flusher = tokio::spawn(flusher_loop(
            active,
            config.dir.clone(),
            config.durability,
            config.max_segment_bytes,
            rx,
            observer,
            Arc::clone(&counters),
        ));

        Ok(Self {
            inner: Arc::new(Inner {
                dir: config.dir,
                durability: config.durability,
                max_buffered_bytes: config.max_buffered_bytes,
                next_offset: AtomicU64::new(next_offset),
                counters,
                tx: Mutex::new(Some(tx)),
                flusher: Mutex::new(Some(flusher)),
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub async fn append(&self, data: Vec<u8>) -> Result<u64, LogError> {
        if data.is_empty() {
            return Err(LogError::InvalidData);
        }
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(LogError::Closed);
        }

        if !self.reserve(data.len()) {
            self.inner.counters.rejected_appends.fetch_add(1, Ordering::AcqRel);
            return Err(LogError::Backpressure("max_buffered_bytes exceeded"));
        }

        let offset = self.inner.next_offset.fetch_add(1, Ordering::AcqRel);
        let reserved_len = data.len();
        let (ack_tx, ack_rx) = oneshot::channel();
        let job = AppendJob {
            offset,
            data,
            ack: ack_tx,
        };

        let sent = {
            let guard = self.inner.tx.lock();
            match guard.as_ref() {
                Some(tx) => tx.try_send(FlusherMsg::Append(job)),
                None => {
                    self.release(reserved_len);
                    self.inner.counters.rejected_appends.fetch_add(1, Ordering::AcqRel);
                    return Err(LogError::Closed);
                }
            }
        };

        if let Err(err) = sent {
            self.release(reserved_len);
            self.inner.counters.rejected_appends.fetch_add(1, Ordering::AcqRel);
            return match err {
                mpsc::error::TrySendError::Full(_) => {
                    Err(LogError::Backpressure("append queue is full"))
                }
                mpsc::error::TrySendError::Closed(_) => Err(LogError::Closed),
            };
        }

        match self.inner.durability {
            Durability::Memory => Ok(offset),
            Durability::Fsync => {
                ack_rx
                    .await
                    .map_err(|_| LogError::Closed)?
                    .map(|()| offset)
            }
        }
    }

    fn reserve(&self, len: usize) -> bool {
        loop {
            let current = self.inner.counters.buffered_bytes.load(Ordering::Acquire);
            if current + len > self.inner.max_buffered_bytes {
                return false;
            }
            if self
                .inner
                .counters
                .buffered_bytes
                .compare_exchange(current, current + len, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn release(&self, len: usize) {
        self.inner.counters.buffered_bytes.fetch_sub(len, Ordering::AcqRel);
    }

    pub fn read(&self, from_offset: u64, limit: usize) -> Result<Vec<Record>, LogError> {
        let ids = list_segment_ids(&self.inner.dir)?;
        let mut out = Vec::new();
        for id in ids {
            if out.len() >= limit {
                break;
            }
            let (records, _) = scan_segment(&crate::segment::segment_path(&self.inner.dir, id))?;
            for rec in records {
                if rec.offset < from_offset {
                    continue;
                }
                out.push(Record {
                    offset: rec.offset,
                    data: rec.data,
                });
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    pub async fn rotate(&self) -> Result<(), LogError> {
        self.send_command(FlusherMsg::Rotate).await
    }

    pub async fn sync(&self) -> Result<(), LogError> {
        self.send_command(FlusherMsg::Sync).await
    }

    async fn send_command(
        &self,
        make_msg: impl FnOnce(oneshot::Sender<std::io::Result<()>>) -> FlusherMsg,
    ) -> Result<(), LogError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        let sent = {
            let guard = self.inner.tx.lock();
            match guard.as_ref() {
                Some(tx) => tx.try_send(make_msg(ack_tx)),
                None => return Err(LogError::Closed),
            }
        };
        sent.map_err(|_| LogError::Closed)?;
        ack_rx.await.map_err(|_| LogError::Closed)?.map_err(LogError::from)
    }

    /// Marks the store closed, drains the flusher, and syncs the active
    /// segment. Idempotent.
    pub async fn close(&self) -> Result<(), LogError> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let sender = self.inner.tx.lock().take();
        drop(sender);
        if let Some(handle) = self.inner.flusher.lock().take() {
            let _ = handle.await;
        }
        Ok(())
    }

    pub fn stats(&self) -> LogStatsSnapshot {
        LogStatsSnapshot {
            buffered_bytes: self.inner.counters.buffered_bytes.load(Ordering::Acquire),
            written_bytes: self.inner.counters.written_bytes.load(Ordering::Acquire),
            appended_records: self.inner.counters.appended_records.load(Ordering::Acquire),
            rejected_appends: self.inner.counters.rejected_appends.load(Ordering::Acquire),
        }
    }
}

async fn flusher_loop(
    mut active: ActiveSegment,
    dir: PathBuf,
    durability: Durability,
    max_segment_bytes: u64,
    mut rx: mpsc::Receiver<FlusherMsg>,
    observer: Option<Arc<dyn LogObserver>>,
    counters: Arc<Counters>,
) {
    while let Some(msg) = rx.recv().await {
        match msg {
            FlusherMsg::Append(job) => {
                let frame_len = crate::frame::FRAME_HEADER_LEN as u64 + job.data.len() as u64;
                if active.size > 0 && active.size + frame_len > max_segment_bytes {
                    if let Err(err) = rotate_segment(&mut active, &dir, durability, &observer) {
                        warn!(error = %err, "segment rotation failed");
                        counters.buffered_bytes.fetch_sub(job.data.len(), Ordering::AcqRel);
                        let _ = job.ack.send(Err(LogError::Io(err)));
                        continue;
                    }
                }

                let result = active.append(job.offset, &job.data).and_then(|written| {
                    if durability == Durability::Fsync {
                        active.sync()?;
                    } else if active.unflushed_bytes > FLUSH_THRESHOLD_BYTES {
                        active.flush()?;
                    }
                    Ok(written)
                });

                counters.buffered_bytes.fetch_sub(job.data.len(), Ordering::AcqRel);

                match result {
                    Ok(written) => {
                        counters.written_bytes.fetch_add(written, Ordering::AcqRel);
                        counters.appended_records.fetch_add(1, Ordering::AcqRel);
                        if let Some(obs) = &observer {
                            obs.on_append_persisted(job.offset);
                        }
                        let _ = job.ack.send(Ok(()));
                    }
                    Err(err) => {
                        counters.rejected_appends.fetch_add(1, Ordering::AcqRel);
                        warn!(error = %err, offset = job.offset, "append failed");
                        let _ = job.ack.send(Err(LogError::Io(err)));
                    }
                }
            }
            FlusherMsg::Rotate(ack) => {
                let result = rotate_segment(&mut active, &dir, durability, &observer);
                let _ = ack.send(result);
            }
            FlusherMsg::Sync(ack) => {
                let _ = ack.send(active.sync());
            }
        }
    }
    let _ = active.sync();
}

fn rotate_segment(
    active: &mut ActiveSegment,
    dir: &std::path::Path,
    durability: Durability,
    observer: &Option<Arc<dyn LogObserver>>,
) -> std::io::Result<()> {
    active.flush()?;
    if durability == Durability::Fsync {
        active.sync()?;
    }
    let next_id = active.id + 1;
    *active = ActiveSegment::create(dir, next_id)?;
    if let Some(obs) = observer {
        obs.on_rotate("max_segment_bytes");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn append_then_read_roundtrips() {
        let dir = tempdir().unwrap();
        let store = LogStore::open(LogStoreConfig::new(dir.path()), None)
            .await
            .unwrap();
        let o0 = store.append(b"hello".to_vec()).await.unwrap();
        let o1 = store.append(b"world".to_vec()).await.unwrap();
        assert_eq!(o0, 0);
        assert_eq!(o1, 1);

        let records = store.read(0, 10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].data, b"hello");
        assert_eq!(records[1].data, b"world");
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn rejects_empty_data() {
        let dir = tempdir().unwrap();
        let store = LogStore::open(LogStoreConfig::new(dir.path()), None)
            .await
            .unwrap();
        assert!(matches!(
            store.append(Vec::new()).await,
            Err(LogError::InvalidData)
        ));
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn recovers_offsets_across_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = LogStore::open(LogStoreConfig::new(dir.path()), None)
                .await
                .unwrap();
            store.append(b"one".to_vec()).await.unwrap();
            store.append(b"two".to_vec()).await.unwrap();
            store.close().await.unwrap();
        }
        let store = LogStore::open(LogStoreConfig::new(dir.path()), None)
            .await
            .unwrap();
        let next = store.append(b"three".to_vec()).await.unwrap();
        assert_eq!(next, 2);
        let records = store.read(0, 10).unwrap();
        assert_eq!(records.len(), 3);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn rotate_creates_a_new_segment() {
        let dir = tempdir().unwrap();
        let mut config = LogStoreConfig::new(dir.path());
        config.max_segment_bytes = 1; // force rotation on first append after this one
        let store = LogStore::open(config, None).await.unwrap();
        store.append(b"a".to_vec()).await.unwrap();
        store.append(b"b".to_vec()).await.unwrap();
        let ids = list_segment_ids(dir.path()).unwrap();
        assert!(ids.len() >= 2);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn backpressure_when_buffer_budget_exceeded() {
        let dir = tempdir().unwrap();
        let mut config = LogStoreConfig::new(dir.path());
        config.max_buffered_bytes = 2;
        let store = LogStore::open(config, None).await.unwrap();
        let result = store.append(b"way too big".to_vec()).await;
        assert!(matches!(result, Err(LogError::Backpressure(_))));
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = LogStore::open(LogStoreConfig::new(dir.path()), None)
            .await
            .unwrap();
        store.close().await.unwrap();
        store.close().await.unwrap();
    }
}
