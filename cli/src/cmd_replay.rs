//! `rttprof replay`: run captured info/data streams through the stream engine.

use anyhow::{bail, Context, Result};
use rttprof_core::{Event, EventTypeRegistry, ProfilerConfig};
use rttprof_observability::log_session_summary;
use rttprof_stream::{
    consumer_channel, JsonFileWriter, MemoryChannel, StreamController, StreamMessage,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub struct ReplayArgs {
    pub info: PathBuf,
    pub data: PathBuf,
    pub duration: Option<Duration>,
    pub chunk: Option<usize>,
    /// `(events, types)` JSON output paths
    pub output: Option<(PathBuf, PathBuf)>,
    pub print: bool,
}

/// Negative seconds mean "until stopped".
pub fn logging_period(secs: f64) -> Result<Option<Duration>> {
    if secs.is_nan() {
        bail!("duration must be a number");
    }
    if secs < 0.0 {
        return Ok(None);
    }
    Duration::try_from_secs_f64(secs)
        .map(Some)
        .context("duration is too large")
}

pub async fn run(config: ProfilerConfig, args: ReplayArgs) -> Result<()> {
    let info_bytes = std::fs::read(&args.info)
        .with_context(|| format!("cannot read info capture '{}'", args.info.display()))?;
    let data_bytes = std::fs::read(&args.data)
        .with_context(|| format!("cannot read data capture '{}'", args.data.display()))?;

    let channel = MemoryChannel::new();
    channel.push_info(info_bytes);
    channel.push_data_chunked(&data_bytes, args.chunk.unwrap_or(config.read_chunk_size));
    info!(
        "Replaying {} data bytes from {}",
        data_bytes.len(),
        args.data.display()
    );

    let (handle, rx) = consumer_channel(config.consumer_capacity);
    let mut controller = StreamController::new(channel, config).with_consumer(handle);
    if let Some((events, types)) = args.output {
        controller = controller.with_writer(JsonFileWriter::new(events, types));
    }

    let stop = controller.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping");
            stop.trigger();
        }
    });

    let printer = tokio::spawn(print_events(rx, args.print));
    let result = controller.run(args.duration).await;
    let printed = printer.await.context("event printer task failed")?;

    let report = result.context("replay ended with a protocol error")?;
    log_session_summary(&report);
    if printed != report.log.len() {
        warn!(
            "Consumer saw {} events but the log holds {}",
            printed,
            report.log.len()
        );
    }
    Ok(())
}

/// Consume the stream until the end marker; returns the number of events seen.
async fn print_events(mut rx: mpsc::Receiver<StreamMessage>, print: bool) -> usize {
    let mut registry = Arc::new(EventTypeRegistry::new());
    let mut seen = 0;
    while let Some(msg) = rx.recv().await {
        match msg {
            StreamMessage::Registry(r) => registry = r,
            StreamMessage::Event(event) => {
                seen += 1;
                if print {
                    println!("{}", format_event(&registry, &event));
                }
            }
            StreamMessage::EndOfStream => break,
        }
    }
    seen
}

pub fn format_event(registry: &EventTypeRegistry, event: &Event) -> String {
    let Some(event_type) = registry.get(event.type_id) else {
        return format!("{:>14.6}  <unknown id {}>", event.timestamp_ms, event.type_id);
    };
    let mut line = format!("{:>14.6}  {}", event.timestamp_ms, event_type.name);
    for (label, value) in event_type.field_labels.iter().zip(&event.fields) {
        line.push_str(&format!("  {label}={value}"));
    }
    line
}
