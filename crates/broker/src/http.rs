//! Loopback HTTP surface: `GET /health`, `POST /jobs`,
//! `GET /jobs/next`. One connection task per accepted stream; all
//! queue mutation happens under a single lock, and long-polls park on
//! a notifier that submissions trip.

use crate::config::BrokerConfig;
use crate::queue::{JobQueue, PingSource, SubmitOutcome, SubmitRejection};
use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use log::{info, warn};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::{Notify, oneshot};
use tracing::debug_span;

/// Shared broker state behind the HTTP surface.
struct Shared {
    queue: Mutex<JobQueue>,
    wakeup: Notify,
    config: BrokerConfig,
}

/// A running broker bound to a loopback port.
pub struct BrokerHandle {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl BrokerHandle {
    /// Stop accepting connections and wind the server down.
    pub async fn shutdown(mut self) {
        if let Some(sender) = self.shutdown.take() {
            drop(sender.send(()));
        }
        drop((&mut self.task).await);
    }
}

/// Bind the configured loopback port and serve until shut down.
///
/// # Errors
/// Fails when the port cannot be bound.
pub async fn spawn(config: BrokerConfig) -> anyhow::Result<BrokerHandle> {
    let listener = TcpListener::bind((config.bind_host(), config.port)).await?;
    let addr = listener.local_addr()?;
    info!("broker listening on {addr}");

    let shared = Arc::new(Shared {
        queue: Mutex::new(JobQueue::new(
            config.max_payload_bytes,
            config.chunk_timeout(),
        )),
        wakeup: Notify::new(),
        config,
    });

    let (shutdown_sender, mut shutdown_receiver) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        loop {
            let stream = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => stream,
                    Err(error) => {
                        warn!("accept failed: {error}");
                        continue;
                    }
                },
                _ = &mut shutdown_receiver => break,
            };
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                let service = service_fn(move |request: Request<Incoming>| {
                    let shared = Arc::clone(&shared);
                    async move { handle(shared, request).await }
                });
                let connection = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service);
                if let Err(error) = connection.await {
                    warn!("connection error: {error}");
                }
            });
        }
    });

    Ok(BrokerHandle {
        addr,
        shutdown: Some(shutdown_sender),
        task,
    })
}

async fn handle(
    shared: Arc<Shared>,
    request: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let span = debug_span!("broker-request", path = %request.uri().path());
    let _guard = span.enter();

    // API key gate: both submission and polling must present it; a
    // mismatch is a generic 4xx.
    if let Some(expected) = &shared.config.api_key {
        let presented = request
            .headers()
            .get("x-api-key")
            .and_then(|value| value.to_str().ok());
        if presented != Some(expected.as_str()) {
            return Ok(error_response(StatusCode::UNAUTHORIZED, "Unauthorized"));
        }
    }

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let query = request.uri().query().unwrap_or("").to_owned();
    match (method, path.as_str()) {
        (Method::GET, "/health") => Ok(health(&shared, &query)),
        (Method::POST, "/jobs") => submit(&shared, request).await,
        (Method::GET, "/jobs/next") => Ok(poll_next(&shared).await),
        _ => Ok(error_response(StatusCode::NOT_FOUND, "NotFound")),
    }
}

fn health(shared: &Shared, query: &str) -> Response<Full<Bytes>> {
    let source = query
        .split('&')
        .find_map(|pair| pair.strip_prefix("source="));
    let (queue_length, telemetry) = match shared.queue.lock() {
        Ok(mut queue) => {
            match source {
                Some("extension") => queue.record_ping(PingSource::Extension),
                Some("plugin") => queue.record_ping(PingSource::Plugin),
                _ => {}
            }
            queue.reap_stale_transfer(Instant::now());
            (queue.queue_length(), queue.telemetry())
        }
        Err(_) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, "StatePoisoned"),
    };
    let telemetry_json =
        serde_json::to_string(&telemetry).unwrap_or_else(|_| "{}".to_owned());
    json_response(
        StatusCode::OK,
        format!("{{\"ok\":true,\"queueLength\":{queue_length},\"telemetry\":{telemetry_json}}}"),
    )
}

async fn submit(
    shared: &Arc<Shared>,
    request: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let limit = shared.config.max_payload_bytes;
    let body = request.into_body().collect().await?.to_bytes();
    if body.is_empty() {
        return Ok(error_response(StatusCode::BAD_REQUEST, "MissingBody"));
    }
    if body.len() > limit {
        return Ok(error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            "PayloadTooLarge",
        ));
    }
    let Ok(text) = std::str::from_utf8(&body) else {
        return Ok(error_response(StatusCode::BAD_REQUEST, "MissingBody"));
    };
    // Bodies must at least be JSON; the broker never interprets
    // schema fields beyond that.
    if serde_json::from_str::<serde::de::IgnoredAny>(text).is_err() {
        return Ok(error_response(StatusCode::BAD_REQUEST, "MissingBody"));
    }

    let outcome = match shared.queue.lock() {
        Ok(mut queue) => queue.submit(text, Instant::now()),
        Err(_) => {
            return Ok(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "StatePoisoned",
            ));
        }
    };
    Ok(match outcome {
        Ok(SubmitOutcome::Queued { id, queue_length }) => {
            // notify_one stores a permit when no poller is parked, so
            // an enqueue between queue check and park is never lost.
            shared.wakeup.notify_one();
            json_response(
                StatusCode::OK,
                format!("{{\"ok\":true,\"id\":\"{id}\",\"queueLength\":{queue_length}}}"),
            )
        }
        Ok(SubmitOutcome::ChunkAccepted { received, total }) => json_response(
            StatusCode::OK,
            format!(
                "{{\"ok\":true,\"chunk\":{{\"received\":{received},\"totalChunks\":{total}}}}}"
            ),
        ),
        Err(rejection @ SubmitRejection::TooLarge(_)) => {
            warn!("{rejection}");
            error_response(StatusCode::PAYLOAD_TOO_LARGE, rejection.error().kind())
        }
        Err(rejection @ SubmitRejection::TimedOut(_)) => {
            warn!("{rejection}");
            error_response(StatusCode::REQUEST_TIMEOUT, rejection.error().kind())
        }
        Err(rejection @ SubmitRejection::BadChunk(_)) => {
            warn!("submission rejected: {rejection}");
            error_response(StatusCode::BAD_REQUEST, "BadChunk")
        }
    })
}

/// Long-poll: respond immediately when a job is queued, otherwise
/// park until a submission arrives or the window expires.
async fn poll_next(shared: &Arc<Shared>) -> Response<Full<Bytes>> {
    let deadline = Instant::now() + shared.config.long_poll();
    if let Ok(mut queue) = shared.queue.lock() {
        queue.record_ping(PingSource::Plugin);
    }

    loop {
        // Register for wakeup before checking so an enqueue between
        // check and park is not lost.
        let notified = shared.wakeup.notified();

        match take_job(shared) {
            TakeOutcome::Job(response) | TakeOutcome::Error(response) => return response,
            TakeOutcome::Empty => {}
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return empty_poll_response(shared);
        }
        tokio::select! {
            () = notified => {}
            () = tokio::time::sleep(remaining) => return empty_poll_response(shared),
        }
    }
}

enum TakeOutcome {
    Job(Response<Full<Bytes>>),
    Empty,
    Error(Response<Full<Bytes>>),
}

fn take_job(shared: &Arc<Shared>) -> TakeOutcome {
    let Ok(mut queue) = shared.queue.lock() else {
        return TakeOutcome::Error(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "StatePoisoned",
        ));
    };
    queue.reap_stale_transfer(Instant::now());
    match queue.take_next() {
        Ok(Some(job)) => {
            let telemetry_json =
                serde_json::to_string(&queue.telemetry()).unwrap_or_else(|_| "{}".to_owned());
            // The payload is embedded verbatim: it is already JSON and
            // re-encoding it would not be byte-faithful.
            let body = format!(
                "{{\"job\":{{\"id\":\"{}\",\"createdAt\":\"{}\",\"state\":\"DELIVERED\",\"payload\":{}}},\"telemetry\":{telemetry_json}}}",
                job.id,
                job.created_at.to_rfc3339(),
                job.payload
            );
            TakeOutcome::Job(json_response(StatusCode::OK, body))
        }
        Ok(None) => TakeOutcome::Empty,
        Err(error) => {
            warn!("stored payload unusable: {error}");
            TakeOutcome::Error(error_response(StatusCode::REQUEST_TIMEOUT, error.kind()))
        }
    }
}

fn empty_poll_response(shared: &Arc<Shared>) -> Response<Full<Bytes>> {
    let telemetry_json = shared
        .queue
        .lock()
        .ok()
        .and_then(|queue| serde_json::to_string(&queue.telemetry()).ok())
        .unwrap_or_else(|| "{}".to_owned());
    json_response(
        StatusCode::OK,
        format!("{{\"job\":null,\"telemetry\":{telemetry_json}}}"),
    )
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

fn error_response(status: StatusCode, kind: &str) -> Response<Full<Bytes>> {
    json_response(status, format!("{{\"ok\":false,\"error\":\"{kind}\"}}"))
}
