//! Pagelift command line: run the handoff broker, drive a headless
//! capture, or import a delivered payload into a recorded document
//! dump.

use anyhow::{Context as _, anyhow};
use broker::{BrokerClient, BrokerConfig};
use capture::{CancelFlag, CaptureConfig, CaptureOptions};
use headless::HeadlessPage;
use importer::RecordingHost;
use log::{error, info};
use std::env;
use std::path::PathBuf;
use std::process::exit;

fn main() {
    env_logger::init();

    let arguments: Vec<String> = env::args().skip(1).collect();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Failed to start runtime: {err}");
            exit(1);
        }
    };

    let outcome = match arguments.first().map(String::as_str) {
        Some("broker") => runtime.block_on(run_broker()),
        Some("capture") => runtime.block_on(run_capture(&arguments[1..])),
        Some("import") => runtime.block_on(run_import(&arguments[1..])),
        Some("poll") => runtime.block_on(run_poll()),
        _ => {
            error!(
                "usage: pagelift <broker | capture <url> [--out <file>] | import <file> | poll>"
            );
            exit(2);
        }
    };

    if let Err(err) = outcome {
        error!("{err:#}");
        exit(1);
    }
}

/// Serve the handoff queue until interrupted.
async fn run_broker() -> anyhow::Result<()> {
    let config = BrokerConfig::from_env();
    let handle = broker::spawn(config).await?;
    info!("broker ready on {}", handle.addr);
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    handle.shutdown().await;
    Ok(())
}

/// Capture a URL headlessly and submit (or write) the payload.
async fn run_capture(arguments: &[String]) -> anyhow::Result<()> {
    let url = arguments
        .first()
        .ok_or_else(|| anyhow!("capture requires a URL"))?;
    let out_path = flag_value(arguments, "--out").map(PathBuf::from);

    let options = CaptureOptions::default();
    let config = CaptureConfig::from_env();
    let cancel = CancelFlag::new();

    info!("launching headless capture of {url}");
    let page = HeadlessPage::launch(url, 1440, 900).await?;
    let schemas = capture::capture_all(&page, &options, &config, &cancel, &mut |event| {
        info!("[{}] {} ({}%)", event.phase, event.message, event.percent);
    })
    .await?;
    info!("captured {} viewport(s)", schemas.len());

    let payload = capture::submission_json(schemas)?;
    match out_path {
        Some(path) => {
            std::fs::write(&path, &payload)
                .with_context(|| format!("writing {}", path.display()))?;
            info!("wrote {} bytes to {}", payload.len(), path.display());
        }
        None => {
            let client = BrokerClient::new(&BrokerConfig::from_env())?;
            let id = client.submit(payload).await?;
            info!("submitted capture as job {}", id.unwrap_or_default());
        }
    }
    Ok(())
}

/// Import a payload file into a recorded document dump next to it.
/// With `--enhance <context.json>` the payload is run through the
/// post-capture enhancer first.
async fn run_import(arguments: &[String]) -> anyhow::Result<()> {
    let input = arguments
        .first()
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("import requires a payload file"))?;
    let mut payload = std::fs::read_to_string(&input)
        .with_context(|| format!("reading {}", input.display()))?;

    if let Some(context_path) = flag_value(arguments, "--enhance") {
        let context_json = std::fs::read_to_string(context_path)
            .with_context(|| format!("reading {context_path}"))?;
        let context: enhancer::AiContext = serde_json::from_str(&context_json)?;
        let schemas = scene::envelope::parse_delivered(&payload)?;
        let enhanced: Vec<scene::SceneSchema> = schemas
            .into_iter()
            .map(|schema| enhancer::enhance(schema, &context))
            .collect();
        payload = capture::submission_json(enhanced)?;
        info!("enhancer applied from {context_path}");
    }

    let mut host = RecordingHost::new();
    let report = importer::import_payload(&payload, &mut host).await?;
    info!(
        "imported {}: {}/{} nodes, {} rasterized, {} failed",
        report.page_id,
        report.stats.created_nodes,
        report.stats.total_nodes,
        report.stats.rasterized_nodes,
        report.stats.failed_nodes.len()
    );

    let dump_path = input.with_extension("import.json");
    let dump = serde_json::to_string_pretty(&serde_json::json!({
        "report": report,
        "document": host.document_json(),
    }))?;
    std::fs::write(&dump_path, dump)
        .with_context(|| format!("writing {}", dump_path.display()))?;
    info!("document dump written to {}", dump_path.display());
    Ok(())
}

/// Long-poll the broker and import every delivered job.
async fn run_poll() -> anyhow::Result<()> {
    let config = BrokerConfig::from_env();
    let client = BrokerClient::new(&config)?;
    info!("polling {} for jobs", config.base_url());
    loop {
        let job = client.wait_for_job().await?;
        info!("received job {} ({} bytes)", job.id, job.payload.len());
        let mut host = RecordingHost::new();
        match importer::import_payload(&job.payload, &mut host).await {
            Ok(report) => info!(
                "imported job {}: {}/{} nodes",
                job.id, report.stats.created_nodes, report.stats.total_nodes
            ),
            Err(err) => error!("import of job {} failed: {err}", job.id),
        }
    }
}

/// Value following a `--flag` argument.
fn flag_value<'args>(arguments: &'args [String], flag: &str) -> Option<&'args str> {
    arguments
        .iter()
        .position(|argument| argument == flag)
        .and_then(|index| arguments.get(index + 1))
        .map(String::as_str)
}
