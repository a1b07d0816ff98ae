//! Command implementations.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use tracing::info;

use link_engine::store::{ArtifactQueue, JsonFileStore};
use link_engine::{
    EngineConfig, EngineEvent, MockTransport, NullRecorder, SyncEngine,
};
use link_types::{DateReply, Locator, Message};

/// Print every queue record, pending and delivered.
pub fn queue_list(config: &EngineConfig) -> Result<()> {
    let queue = open_queue(config)?;
    let records = queue.records();
    if records.is_empty() {
        println!("queue is empty");
        return Ok(());
    }

    println!("{:<12} {:<12} {:<10} locator", "state", "created_at", "origin");
    for record in records {
        let state = if record.delivered { "delivered" } else { "pending" };
        println!(
            "{:<12} {:<12} {:<10} {}",
            state, record.created_at, record.origin, record.locator
        );
    }
    println!(
        "\n{} record(s), {} pending",
        records.len(),
        queue.pending_count()
    );
    Ok(())
}

/// Enqueue an artifact by hand.
pub fn queue_add(
    config: &EngineConfig,
    locator: &str,
    created_at: Option<u64>,
    origin: &str,
) -> Result<()> {
    let mut queue = open_queue(config)?;
    let created_at = created_at.unwrap_or_else(unix_now);
    let inserted = queue
        .enqueue(Locator::from(locator), created_at, origin.to_string())
        .context("persisting the queue")?;
    if inserted {
        println!("enqueued {locator}");
    } else {
        println!("{locator} is already tracked, nothing to do");
    }
    Ok(())
}

/// Retire a queue record.
pub fn queue_mark_delivered(config: &EngineConfig, locator: &str) -> Result<()> {
    let mut queue = open_queue(config)?;
    let changed = queue
        .mark_delivered(&Locator::from(locator))
        .context("persisting the queue")?;
    if changed {
        println!("marked {locator} delivered");
    } else {
        bail!("no pending record for {locator}");
    }
    Ok(())
}

/// Print the effective configuration.
pub fn config_show(path: &std::path::Path, config: &EngineConfig) {
    if path.exists() {
        println!("# {}", path.display());
    } else {
        println!("# {} not found, showing defaults", path.display());
    }
    println!("device_name      = {:?}", config.device_name);
    println!("queue_path       = {:?}", config.queue_path);
    println!("received_dir     = {:?}", config.received_dir);
    println!("content_ext      = {:?}", config.content_ext);
    println!("settle_delay_ms  = {}", config.settle_delay_ms);
    println!("command_ttl_secs = {}", config.command_ttl_secs);
}

/// Run the full offline-queue pipeline in a sandbox directory: capture
/// an artifact while the link is down, bring the link up, and watch the
/// drain deliver it over a loopback transport.
pub async fn demo() -> Result<()> {
    let dir = tempfile::tempdir().context("creating demo sandbox")?;
    let config = EngineConfig {
        device_name: "demo".into(),
        queue_path: dir.path().join("queue.json"),
        received_dir: dir.path().join("received"),
        settle_delay_ms: 300,
        ..EngineConfig::default()
    };

    let transport = MockTransport::new().with_auto_complete();
    let store = Box::new(JsonFileStore::new(&config.queue_path));
    let engine = SyncEngine::new(
        config,
        Arc::new(transport.clone()),
        store,
        Box::new(NullRecorder),
    )?;
    engine.start().await;

    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                EngineEvent::StateChanged(state) => println!("  state     -> {state:?}"),
                EngineEvent::StatusAnnounced(text) => println!("  status    -> {text}"),
                EngineEvent::ArtifactDelivered { locator } => {
                    println!("  delivered -> {locator}")
                }
                other => println!("  event     -> {other:?}"),
            }
        }
    });

    // Capture while the link is down.
    let artifact = dir.path().join("demo-recording.m4a");
    tokio::fs::write(&artifact, b"demo audio content").await?;
    let locator = artifact
        .to_str()
        .map(Locator::from)
        .context("sandbox path is not valid UTF-8")?;

    println!("link down, capturing {locator}");
    engine
        .send_artifact(locator, unix_now(), "demo".into())
        .await?;
    println!("pending after capture: {}", engine.pending_count().await);

    // Bring the link up; the loopback peer answers the date handshake.
    transport.queue_reply(
        Message::DateReply(DateReply { date: unix_now() })
            .to_bytes()
            .context("encoding handshake reply")?,
    );
    println!("link coming up, waiting for the drain");
    transport.set_reachable(true);

    for _ in 0..100 {
        if engine.pending_count().await == 0 {
            info!("drain finished");
            println!("pending after drain: 0");
            println!("demo complete");
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    bail!("drain did not finish in time");
}

fn open_queue(config: &EngineConfig) -> Result<ArtifactQueue> {
    ArtifactQueue::load(Box::new(JsonFileStore::new(&config.queue_path)))
        .with_context(|| format!("loading queue {}", config.queue_path.display()))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
