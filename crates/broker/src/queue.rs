//! In-memory job queue with FIFO order and at-most-once delivery.
//! The transfer of bytes is the acknowledgment; a job handed to a
//! poller is gone. Re-capture is idempotent and cheap, so a consumer
//! crash loses nothing of value.

use scene::Error;
use scene::envelope::{ChunkAssembler, ChunkMessage, CompressedEnvelope, decompress};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Lifecycle of a job. QUEUED until a long-poll matches, then the job
/// is removed; DELIVERED exists only in responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Queued,
    Delivered,
}

/// One queued capture payload, opaque to the broker.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub state: JobState,
    pub payload: String,
}

/// Liveness counters; advisory only, never affect delivery.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    /// Epoch milliseconds of the last capture-agent ping.
    pub last_extension_ping: Option<i64>,
    /// Epoch milliseconds of the last importer poll.
    pub last_plugin_poll: Option<i64>,
    /// Epoch milliseconds of the last delivery.
    pub last_delivery: Option<i64>,
    /// Id of the last delivered job.
    pub last_delivered_job: Option<Uuid>,
    pub queue_length: usize,
}

/// Which peer pinged `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingSource {
    Extension,
    Plugin,
}

/// Outcome of one `POST /jobs` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A full payload (or final chunk) was enqueued.
    Queued { id: Uuid, queue_length: usize },
    /// A chunk was accepted; more are expected.
    ChunkAccepted { received: usize, total: usize },
}

/// Why a submission was refused. Each variant carries the underlying
/// typed error and maps to a distinct HTTP status on the surface.
#[derive(Debug)]
pub enum SubmitRejection {
    /// Body or reassembled payload over the configured limit.
    TooLarge(Error),
    /// Malformed chunk sequence or envelope.
    BadChunk(Error),
    /// The in-flight chunked transfer went quiet past the inactivity
    /// timeout and was aborted.
    TimedOut(Error),
}

impl SubmitRejection {
    /// The underlying typed error.
    #[inline]
    #[must_use]
    pub const fn error(&self) -> &Error {
        match self {
            Self::TooLarge(error) | Self::BadChunk(error) | Self::TimedOut(error) => error,
        }
    }
}

impl std::fmt::Display for SubmitRejection {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self.error(), formatter)
    }
}

/// A chunked transfer in flight. One slot: the loopback protocol has
/// a single submitting agent.
#[derive(Debug)]
struct PendingTransfer {
    assembler: ChunkAssembler,
    received: usize,
    total: usize,
    last_activity: Instant,
}

/// Broker queue state. Single-writer by submission, single-reader by
/// long-poll; every mutation happens under one lock.
#[derive(Debug)]
pub struct JobQueue {
    jobs: VecDeque<Job>,
    transfer: Option<PendingTransfer>,
    telemetry: Telemetry,
    max_payload_bytes: usize,
    chunk_timeout: Duration,
}

impl JobQueue {
    #[must_use]
    pub fn new(max_payload_bytes: usize, chunk_timeout: Duration) -> Self {
        Self {
            jobs: VecDeque::new(),
            transfer: None,
            telemetry: Telemetry::default(),
            max_payload_bytes,
            chunk_timeout,
        }
    }

    #[inline]
    #[must_use]
    pub fn queue_length(&self) -> usize {
        self.jobs.len()
    }

    #[must_use]
    pub fn telemetry(&self) -> Telemetry {
        Telemetry {
            queue_length: self.jobs.len(),
            ..self.telemetry.clone()
        }
    }

    pub fn record_ping(&mut self, source: PingSource) {
        let now = chrono::Utc::now().timestamp_millis();
        match source {
            PingSource::Extension => self.telemetry.last_extension_ping = Some(now),
            PingSource::Plugin => self.telemetry.last_plugin_poll = Some(now),
        }
    }

    /// Accept one submission body: full JSON, a chunk message, or a
    /// compressed wrapper.
    ///
    /// # Errors
    /// - `TooLarge` over the configured limit.
    /// - `BadChunk` for malformed chunk sequences or envelopes.
    /// - `TimedOut` when the in-flight chunked transfer exceeded the
    ///   inactivity timeout; the transfer is aborted and the caller
    ///   sees `IncompleteTransfer`.
    pub fn submit(&mut self, body: &str, now: Instant) -> Result<SubmitOutcome, SubmitRejection> {
        if self.reap_stale_transfer(now) {
            return Err(SubmitRejection::TimedOut(Error::IncompleteTransfer(
                format!(
                    "chunked transfer aborted after {} ms of inactivity",
                    self.chunk_timeout.as_millis()
                ),
            )));
        }
        self.check_size(body.len())
            .map_err(SubmitRejection::TooLarge)?;

        if let Ok(chunk) = serde_json::from_str::<ChunkMessage>(body) {
            return self.submit_chunk(chunk, now);
        }
        // A compressed wrapper is validated here and decompressed at
        // delivery; the broker never interprets schema fields.
        if let Ok(envelope) = serde_json::from_str::<CompressedEnvelope>(body)
            && envelope.compressed
        {
            decompress(&envelope).map_err(SubmitRejection::BadChunk)?;
        }
        Ok(self.enqueue(body.to_owned()))
    }

    fn submit_chunk(
        &mut self,
        chunk: ChunkMessage,
        now: Instant,
    ) -> Result<SubmitOutcome, SubmitRejection> {
        let total = chunk.total_chunks;
        let transfer = self.transfer.get_or_insert_with(|| PendingTransfer {
            assembler: ChunkAssembler::new(),
            received: 0,
            total,
            last_activity: now,
        });
        transfer.last_activity = now;
        let accepted = transfer.assembler.accept(chunk);
        let progress = match &accepted {
            Ok(None) => {
                transfer.received += 1;
                Some((transfer.received, transfer.total))
            }
            Ok(Some(_)) | Err(_) => None,
        };

        match accepted {
            Ok(Some(payload)) => {
                self.transfer = None;
                self.check_size(payload.len())
                    .map_err(SubmitRejection::TooLarge)?;
                Ok(self.enqueue(payload))
            }
            Ok(None) => {
                let (received, total) = progress.unwrap_or((0, total));
                Ok(SubmitOutcome::ChunkAccepted { received, total })
            }
            Err(error) => {
                self.transfer = None;
                Err(SubmitRejection::BadChunk(error))
            }
        }
    }

    fn enqueue(&mut self, payload: String) -> SubmitOutcome {
        let job = Job {
            id: Uuid::new_v4(),
            created_at: chrono::Utc::now(),
            state: JobState::Queued,
            payload,
        };
        let id = job.id;
        self.jobs.push_back(job);
        SubmitOutcome::Queued {
            id,
            queue_length: self.jobs.len(),
        }
    }

    /// Pop the oldest job, decompressing a compressed submission on
    /// serve. The job is gone once returned: at-most-once.
    ///
    /// # Errors
    /// `IncompleteTransfer` if a stored compressed payload fails to
    /// decompress (corrupt submission).
    pub fn take_next(&mut self) -> Result<Option<Job>, Error> {
        let Some(mut job) = self.jobs.pop_front() else {
            return Ok(None);
        };
        if let Ok(envelope) = serde_json::from_str::<CompressedEnvelope>(&job.payload)
            && envelope.compressed
        {
            job.payload = decompress(&envelope)?;
        }
        job.state = JobState::Delivered;
        self.telemetry.last_delivery = Some(chrono::Utc::now().timestamp_millis());
        self.telemetry.last_delivered_job = Some(job.id);
        Ok(Some(job))
    }

    /// Abort a chunked transfer that has gone quiet. `submit` turns a
    /// firing into a `TimedOut` rejection for its caller; the health
    /// and poll paths call this for lazy cleanup only.
    pub fn reap_stale_transfer(&mut self, now: Instant) -> bool {
        let stale = self
            .transfer
            .as_ref()
            .is_some_and(|transfer| now.duration_since(transfer.last_activity) >= self.chunk_timeout);
        if stale {
            log::warn!("chunked transfer aborted after inactivity");
            self.transfer = None;
        }
        stale
    }

    fn check_size(&self, size: usize) -> Result<(), Error> {
        if size > self.max_payload_bytes {
            return Err(Error::PayloadTooLarge {
                size,
                limit: self.max_payload_bytes,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene::envelope::{compress, split_into_chunks};

    fn queue() -> JobQueue {
        JobQueue::new(1024, Duration::from_secs(60))
    }

    #[test]
    fn fifo_order_is_preserved() {
        let mut jobs = queue();
        let now = Instant::now();
        jobs.submit("{\"a\":1}", now).unwrap();
        jobs.submit("{\"b\":2}", now).unwrap();
        jobs.submit("{\"c\":3}", now).unwrap();
        assert_eq!(jobs.take_next().unwrap().unwrap().payload, "{\"a\":1}");
        assert_eq!(jobs.take_next().unwrap().unwrap().payload, "{\"b\":2}");
        assert_eq!(jobs.take_next().unwrap().unwrap().payload, "{\"c\":3}");
        assert!(jobs.take_next().unwrap().is_none());
    }

    #[test]
    fn payload_limit_is_exact() {
        let mut jobs = queue();
        let now = Instant::now();
        let at_limit = "x".repeat(1024);
        assert!(jobs.submit(&at_limit, now).is_ok());
        let over = "x".repeat(1025);
        let err = jobs.submit(&over, now).unwrap_err();
        assert!(matches!(err, SubmitRejection::TooLarge(_)));
        assert_eq!(err.error().kind(), "PayloadTooLarge");
    }

    #[test]
    fn out_of_order_chunks_reassemble_byte_for_byte() {
        let mut jobs = queue();
        let now = Instant::now();
        let payload = format!("{{\"data\":\"{}\"}}", "y".repeat(200));
        let chunks = split_into_chunks(&payload, 10);
        let mut order: Vec<usize> = (0..10).collect();
        order.reverse();
        order.swap(2, 7);

        let mut queued = None;
        for index in order {
            let body = serde_json::to_string(&chunks[index]).unwrap();
            match jobs.submit(&body, now).unwrap() {
                SubmitOutcome::Queued { id, .. } => queued = Some(id),
                SubmitOutcome::ChunkAccepted { .. } => {}
            }
        }
        assert!(queued.is_some());
        let job = jobs.take_next().unwrap().unwrap();
        assert_eq!(job.payload, payload);
    }

    #[test]
    fn stale_transfer_surfaces_timeout_to_the_next_submission() {
        let mut jobs = JobQueue::new(1024, Duration::from_millis(10));
        let start = Instant::now();
        let chunks = split_into_chunks("{\"halves\":true}", 2);
        jobs.submit(&serde_json::to_string(&chunks[0]).unwrap(), start)
            .unwrap();

        // The second half arrives past the inactivity timeout: the
        // transfer is aborted and the caller sees IncompleteTransfer.
        let late = start + Duration::from_millis(50);
        let err = jobs
            .submit(&serde_json::to_string(&chunks[1]).unwrap(), late)
            .unwrap_err();
        assert!(matches!(err, SubmitRejection::TimedOut(_)));
        assert_eq!(err.error().kind(), "IncompleteTransfer");
        assert_eq!(jobs.queue_length(), 0);

        // The slot is clear again: a fresh submission goes through.
        assert!(jobs.submit("{\"fresh\":true}", late).is_ok());
        assert_eq!(jobs.queue_length(), 1);
    }

    #[test]
    fn stale_transfers_are_reaped_lazily() {
        let mut jobs = JobQueue::new(1024, Duration::from_millis(10));
        let start = Instant::now();
        let chunk = ChunkMessage {
            chunk_index: 0,
            total_chunks: 2,
            data: "partial".to_owned(),
        };
        jobs.submit(&serde_json::to_string(&chunk).unwrap(), start)
            .unwrap();
        assert!(jobs.reap_stale_transfer(start + Duration::from_millis(50)));
        assert!(!jobs.reap_stale_transfer(start + Duration::from_millis(60)));
        assert_eq!(jobs.queue_length(), 0);
    }

    #[test]
    fn compressed_payloads_decompress_on_serve() {
        let mut jobs = queue();
        let payload = "{\"root\":{\"id\":\"n1\"}}";
        let envelope = compress(payload).unwrap();
        let body = serde_json::to_string(&envelope).unwrap();
        jobs.submit(&body, Instant::now()).unwrap();
        let job = jobs.take_next().unwrap().unwrap();
        assert_eq!(job.payload, payload);
    }

    #[test]
    fn telemetry_tracks_pings_and_delivery() {
        let mut jobs = queue();
        jobs.record_ping(PingSource::Extension);
        jobs.record_ping(PingSource::Plugin);
        jobs.submit("{}", Instant::now()).unwrap();
        let before = jobs.telemetry();
        assert!(before.last_extension_ping.is_some());
        assert!(before.last_plugin_poll.is_some());
        assert_eq!(before.queue_length, 1);
        assert!(before.last_delivery.is_none());
        jobs.take_next().unwrap().unwrap();
        let after = jobs.telemetry();
        assert!(after.last_delivery.is_some());
        assert_eq!(after.queue_length, 0);
    }
}
