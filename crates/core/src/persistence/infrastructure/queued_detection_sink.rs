use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Sender, TrySendError};

use crate::persistence::domain::detection_record::DetectionRecord;
use crate::persistence::domain::detection_sink::DetectionSink;
use crate::persistence::domain::detection_store::DetectionStore;

/// Totals reported by the writer thread when it exits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub written: u64,
    pub failed: u64,
}

/// Bounded queue in front of one dedicated writer thread.
///
/// `record` never waits: when the queue is full the incoming record is
/// dropped and counted. Store failures are logged and counted by the
/// writer and never reach the caller.
pub struct QueuedDetectionSink {
    tx: Option<Sender<DetectionRecord>>,
    writer: Option<JoinHandle<WriterStats>>,
    dropped: Arc<AtomicU64>,
}

impl QueuedDetectionSink {
    pub fn spawn(store: Box<dyn DetectionStore>, capacity: usize) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded::<DetectionRecord>(capacity.max(1));

        let writer = std::thread::Builder::new()
            .name("record-writer".into())
            .spawn(move || {
                let mut store = store;
                let mut stats = WriterStats::default();
                // Write whatever is queued, then flush once per burst.
                while let Ok(first) = rx.recv() {
                    write_one(&mut *store, &first, &mut stats);
                    while let Ok(next) = rx.try_recv() {
                        write_one(&mut *store, &next, &mut stats);
                    }
                    if let Err(e) = store.flush() {
                        log::debug!("Flushing detection store failed: {e}");
                    }
                }
                stats
            })?;

        Ok(Self {
            tx: Some(tx),
            writer: Some(writer),
            dropped: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Records discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Close the queue, let the writer drain it, and return its totals.
    pub fn shutdown(mut self) -> WriterStats {
        self.close()
    }

    fn close(&mut self) -> WriterStats {
        self.tx.take();
        match self.writer.take().map(JoinHandle::join) {
            Some(Ok(stats)) => stats,
            Some(Err(_)) => {
                log::error!("Detection writer thread panicked");
                WriterStats::default()
            }
            None => WriterStats::default(),
        }
    }
}

impl DetectionSink for QueuedDetectionSink {
    fn record(&self, record: DetectionRecord) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(r)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                log::debug!("Record queue full, dropped track {} ({total} so far)", r.track_id);
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl Drop for QueuedDetectionSink {
    fn drop(&mut self) {
        self.close();
    }
}

fn write_one(store: &mut dyn DetectionStore, record: &DetectionRecord, stats: &mut WriterStats) {
    match store.append(record) {
        Ok(()) => stats.written += 1,
        Err(e) => {
            stats.failed += 1;
            log::debug!("Persisting track {} failed: {e}", record.track_id);
        }
    }
}
