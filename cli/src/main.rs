//! rttprof CLI: host side of the RTT event profiler.
//!
//! # Commands
//! ```text
//! rttprof replay  --info <info.bin> --data <data.bin> [--duration <secs>]
//! rttprof schema  --info <info.bin> [--json]
//! rttprof capture --info <info.bin> --events <events.json> --out <data.bin>
//! rttprof config
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use rttprof_observability::{init_tracing, LogConfig};
use std::path::PathBuf;

mod cmd_capture;
mod cmd_replay;
mod cmd_schema;
mod host_config;

use host_config::HostConfig;

#[derive(Parser)]
#[command(
    name = "rttprof",
    about = "Host tool for the RTT event profiler",
    long_about = "
Host tool for the RTT event profiler.

The device announces its event types on the info channel and then streams
binary event records on the data channel. `replay` runs a captured pair of
those streams through the same engine used against a live probe.

ENVIRONMENT VARIABLES:
  RUST_LOG    Overrides the log filter (e.g. rttprof_stream=debug)
",
    version
)]
struct Cli {
    /// Enable debug logging for the stream engine
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// YAML or JSON host configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay captured info/data streams through the stream engine
    Replay {
        /// Raw bytes received on the info channel
        #[arg(long)]
        info: PathBuf,
        /// Raw bytes received on the data channel
        #[arg(long)]
        data: PathBuf,
        /// Logging period in seconds; negative logs until Ctrl-C
        #[arg(long, default_value_t = 2.0, allow_negative_numbers = true)]
        duration: f64,
        /// Feed the data stream in chunks of this size (default: read_chunk_size)
        #[arg(long)]
        chunk: Option<usize>,
        /// Write the decoded events here as JSON
        #[arg(long, requires = "types_out")]
        events_out: Option<PathBuf>,
        /// Write the event type table here as JSON
        #[arg(long, requires = "events_out")]
        types_out: Option<PathBuf>,
        /// Print every event as it is decoded
        #[arg(long)]
        print: bool,
    },

    /// Parse event descriptions and print the type table
    Schema {
        /// Raw bytes received on the info channel
        #[arg(long)]
        info: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Encode events from JSON into a data-channel capture
    Capture {
        /// Event descriptions the events refer to
        #[arg(long)]
        info: PathBuf,
        /// JSON array of `{"type_id", "tick", "fields"}` objects
        #[arg(long)]
        events: PathBuf,
        /// Output file for the binary capture
        #[arg(long)]
        out: PathBuf,
    },

    /// Print the effective configuration as YAML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = HostConfig::load(cli.config.as_deref())?;
    init_tracing(&log_config(&config.log, cli.verbose, cli.json_logs));

    match cli.command {
        Commands::Replay {
            info,
            data,
            duration,
            chunk,
            events_out,
            types_out,
            print,
        } => {
            let output = events_out.zip(types_out);
            cmd_replay::run(
                config.profiler,
                cmd_replay::ReplayArgs {
                    info,
                    data,
                    duration: cmd_replay::logging_period(duration)?,
                    chunk,
                    output,
                    print,
                },
            )
            .await
        }

        Commands::Schema { info, json } => cmd_schema::run(&info, json),

        Commands::Capture { info, events, out } => {
            cmd_capture::run(&info, &events, &out, config.profiler.byte_order)
        }

        Commands::Config => {
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
    }
}

fn log_config(base: &LogConfig, verbose: bool, json: bool) -> LogConfig {
    let mut log = base.clone();
    if verbose {
        log = log.with_component("rttprof_stream", "debug");
    }
    log.json |= json;
    log
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn negative_duration_parses() {
        let cli = Cli::try_parse_from([
            "rttprof", "replay", "--info", "i.bin", "--data", "d.bin", "--duration", "-1",
        ])
        .unwrap();
        match cli.command {
            Commands::Replay { duration, .. } => assert_eq!(duration, -1.0),
            _ => panic!("expected replay"),
        }
    }

    #[test]
    fn output_paths_come_in_pairs() {
        assert!(Cli::try_parse_from([
            "rttprof", "replay", "--info", "i", "--data", "d", "--events-out", "e.json",
        ])
        .is_err());
    }

    #[test]
    fn verbose_raises_the_engine_level() {
        let log = log_config(&LogConfig::default(), true, true);
        assert!(log.json);
        assert_eq!(log.directives(), "info,rttprof_stream=debug");
    }
}
