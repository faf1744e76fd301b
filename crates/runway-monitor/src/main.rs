use anyhow::Context;
use clap::Parser;
use runway_core::FileStore;
use runway_monitor::config::{
    env_flag, resolve_base_url, resolve_session_id, resolve_state_dir, MonitorConfig,
};
use runway_monitor::render::{summary_line, SUMMARY_WIDTH};
use runway_monitor::{Monitor, MonitorView};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "runway-monitor")]
struct Args {
    #[arg(long, default_value = "")]
    base_url: String,
    #[arg(long, default_value = "")]
    session: String,
    #[arg(long, default_value = "")]
    state_dir: String,
    #[arg(long, default_value_t = false)]
    json: bool,
    #[arg(long, default_value_t = false)]
    once: bool,
    #[arg(long, default_value_t = 10)]
    heartbeat_interval: u64,
    #[arg(long, default_value_t = 2)]
    poll_interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    let base_url = resolve_base_url(&args.base_url).context("resolve base url")?;
    let session_id = resolve_session_id(&args.session);
    let state_dir = resolve_state_dir(&args.state_dir);
    let store = FileStore::for_session(&state_dir, &session_id);
    info!(
        "runway_session: id={session_id} store={}",
        store.dir().display()
    );

    let mut config = MonitorConfig::new(base_url);
    config.heartbeat_interval = Duration::from_secs(args.heartbeat_interval.max(1));
    config.poll_interval = Duration::from_secs(args.poll_interval.max(1));

    let handle = Monitor::start(config, Arc::new(store)).context("start monitor")?;
    let mut views = handle.subscribe();
    let first = views.borrow_and_update().clone();
    emit(&first, args.json)?;
    let mut done = args.once && !first.snapshot.is_empty();

    while !done {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                emit(&view, args.json)?;
                done = args.once && !view.snapshot.is_empty();
            }
        }
    }

    handle.stop().await;
    Ok(())
}

fn emit(view: &MonitorView, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(view).context("encode view")?);
    } else {
        println!("{}", summary_line(view, SUMMARY_WIDTH));
    }
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if env_flag("RUNWAY_LOG_STDERR") {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::sink)
            .try_init();
    }
}
