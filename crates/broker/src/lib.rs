//! Handoff broker: a single-process, loopback-only job queue between
//! the capture agent and the importer. Jobs are opaque JSON payloads;
//! the broker only chunks/unchunks, decompresses on serve, and tracks
//! advisory liveness telemetry.

pub mod client;
pub mod config;
pub mod http;
pub mod queue;

pub use client::{BrokerClient, DeliveredJob};
pub use config::{BrokerConfig, DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_PORT};
pub use http::{BrokerHandle, spawn};
pub use queue::{Job, JobQueue, JobState, PingSource, SubmitOutcome, SubmitRejection, Telemetry};
