//! Soil moisture node simulator, main entry point.
//!
//! Runs the node's coordination logic against the simulated mesh stack
//! and board on the host:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Adapters (outer ring)                    │
//! │                                                              │
//! │  SimMeshStack      NvsAdapter     LcdBuffer    LogEventSink  │
//! │  (stack, timers)   (StoragePort)  (display)    (EventSink)   │
//! │  HardwareAdapter (lamp, buttons, soil probe on SimPins)      │
//! │                                                              │
//! │  ──────────────── Port Trait Boundary ─────────────────      │
//! │                                                              │
//! │  ┌──────────────────────────────────────────────────────┐    │
//! │  │            NodeService (pure logic)                  │    │
//! │  │  Connectivity · Moisture · Friendship                │    │
//! │  └──────────────────────────────────────────────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `moisture-node-sim [config.json] [seconds]`.  The config file may
//! override any subset of [`NodeConfig`] fields.  Log verbosity follows
//! `RUST_LOG`.

#![deny(unused_must_use)]

use anyhow::{Context, Result};
use log::{info, warn};

use moisture_node::adapters::log_sink::LogEventSink;
use moisture_node::adapters::sim::{AutoProvision, SimBoard};
use moisture_node::app::ports::DisplayRow;
use moisture_node::app::service::NodeService;
use moisture_node::config::NodeConfig;
use moisture_node::events::StackEvent;

const DEFAULT_RUN_SECS: u64 = 60;
const SIM_NUMERIC_CODE: u16 = 4711;
const SIM_MOISTURE: u16 = 0x0D80;

const ROWS: [DisplayRow; DisplayRow::COUNT] = [
    DisplayRow::BtAddr1,
    DisplayRow::BtAddr2,
    DisplayRow::ClientAddr,
    DisplayRow::Passkey,
    DisplayRow::Connection,
    DisplayRow::Action,
    DisplayRow::Reading,
];

fn init_logging() {
    #[cfg(feature = "espidf")]
    esp_idf_svc::log::EspLogger::initialize_default();

    #[cfg(not(target_os = "espidf"))]
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn load_config(path: Option<&str>) -> Result<NodeConfig> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path))?;
            serde_json::from_str::<NodeConfig>(&text)
                .with_context(|| format!("parsing config {}", path))?
        }
        None => NodeConfig::default(),
    };
    config.validate().context("invalid node config")?;
    Ok(config)
}

fn main() -> Result<()> {
    init_logging();

    info!("╔══════════════════════════════════════╗");
    info!("║  Soil moisture node sim v{}       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = load_config(args.first().map(String::as_str))?;
    let run_secs = match args.get(1) {
        Some(s) => s.parse::<u64>().context("run length must be whole seconds")?,
        None => DEFAULT_RUN_SECS,
    };

    // ── Board ─────────────────────────────────────────────────
    let mut board = SimBoard::new(&config)
        .map_err(|e| anyhow::anyhow!("flash init failed: {}", e))?;
    board.stack.set_auto_provision(Some(AutoProvision::Numeric(SIM_NUMERIC_CODE)));
    board.stack.set_horizon(run_secs * 1000);
    board.set_moisture(Some(SIM_MOISTURE));

    // ── Service ───────────────────────────────────────────────
    let mut service = NodeService::new(config);
    let mut sink = LogEventSink::new();
    service.start(&mut board);

    board.stack.push_event(StackEvent::Boot);

    match service.run(&mut board, &mut sink) {
        Ok(handled) => info!("Simulation finished: {} events handled", handled),
        Err(fatal) => warn!("Simulation stopped on fatal error: {}", fatal),
    }

    // ── Summary ───────────────────────────────────────────────
    info!(
        "t={} ms | lifecycle={:?} | friendship={:?} | threshold=0x{:04X} | events={}",
        board.stack.now_ms(),
        service.lifecycle(),
        service.friendship().state(),
        service.moisture().alarm_threshold(),
        sink.emitted(),
    );
    for row in ROWS {
        info!("LCD {:<10} | {}", format!("{:?}", row), board.display(row));
    }
    for entry in service.fatal_log().read_all(&board) {
        warn!(
            "fatal #{}: {} kind={} param={}",
            entry.sequence, entry.op, entry.kind, entry.param
        );
    }

    Ok(())
}
