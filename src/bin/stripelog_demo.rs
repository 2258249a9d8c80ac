//! stripelog-demo - exercises the striping and view-management core against
//! an in-memory backend: bootstrap a log, append a few entries, force a
//! stripe expansion, then hand sequencing off to a second instance.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stripelog::config::StriperConfig;
use stripelog::log_handle::LogHandle;
use stripelog::striper::Striper;
use stripelog::testkit::InMemoryBackend;
use stripelog::view::View;

/// stripelog-demo - append-and-expand walkthrough over an in-memory backend
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Name of the log to create
    #[arg(long, env = "STRIPELOG_NAME", default_value = "demo-log")]
    name: String,

    /// Number of entries to append before exiting
    #[arg(long, env = "STRIPELOG_APPEND_COUNT", default_value_t = 30)]
    append_count: u64,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> stripelog::Result<()> {
    let args = Args::parse();
    init_logging(&args);

    info!(name = %args.name, append_count = args.append_count, "starting stripelog demo");

    let backend = Arc::new(InMemoryBackend::new());
    let (hoid, prefix) = backend.create_log(&args.name, View::create_initial()).await?;

    let config = StriperConfig::default();
    let striper = Striper::new(
        Arc::clone(&backend),
        hoid.clone(),
        prefix.clone(),
        "demo-secret".into(),
        config.clone(),
    )
    .await?;
    let _workers = striper.spawn_workers();

    striper.propose_sequencer("demo-secret".into()).await?;
    info!(epoch = striper.view().epoch(), "this instance is now the sequencer");

    let log = LogHandle::new(Arc::clone(&striper));
    for i in 0..args.append_count {
        let position = log
            .append(bytes::Bytes::from(format!("entry-{i}")))
            .await?;
        info!(position, "appended entry");
    }

    let view = striper.view();
    info!(
        epoch = view.epoch(),
        stripes = view.object_map.stripes().len(),
        max_position = ?view.object_map.max_position(),
        "final view after appends"
    );

    // Hand sequencing off to a second instance sharing the same backend and
    // head object, demonstrating the multi-writer handoff protocol.
    let handoff_striper = Striper::new(
        backend,
        hoid,
        prefix,
        "handoff-secret".into(),
        config,
    )
    .await?;
    handoff_striper.propose_sequencer("handoff-secret".into()).await?;
    info!(
        epoch = handoff_striper.view().epoch(),
        "sequencing handed off to a second instance"
    );

    striper.shutdown();
    handoff_striper.shutdown();
    // Give the workers a moment to observe the shutdown signal and exit.
    tokio::time::sleep(Duration::from_millis(10)).await;

    Ok(())
}

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
