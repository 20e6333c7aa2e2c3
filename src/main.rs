//! ticc-mux daemon
//!
//! Exit codes: `0` after Ctrl-C, `1` on a configuration error, a port that
//! cannot be opened or bound, or a serial fault while running.

use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use ticc_mux::cli::Args;
use ticc_mux::ingest::serial_fault;
use ticc_mux::reset::reset_instruments;
use ticc_mux::transport::SerialTransport;
use ticc_mux::{Config, Error, Pipeline, Result, Shutdown};

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            init_logging("info");
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.logging.level);

    match run(&config) {
        Ok(()) => {
            log::info!("ticc-mux stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(&args.config)?;
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn run(config: &Config) -> Result<()> {
    log::info!("ticc-mux v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!(
        "  Instruments: {} @ {} baud",
        config.serial.ports.join(", "),
        config.serial.baud_rate
    );
    log::info!("  Channels: {}", config.channels.names.join(", "));
    log::info!(
        "  Ports: {}:{} onwards",
        config.network.bind_host,
        config.network.base_port
    );

    let shutdown = Shutdown::new();
    let signal = shutdown.clone();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        signal.trigger();
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    if config.reset.enabled {
        reset_instruments(&config.reset, &shutdown);
    }
    if shutdown.is_triggered() {
        log::info!("Shutdown requested during startup");
        return Ok(());
    }

    let read_timeout = Duration::from_millis(config.serial.read_timeout_ms);
    let mut sources = Vec::with_capacity(config.serial.ports.len());
    for port in &config.serial.ports {
        let transport = SerialTransport::open(port, config.serial.baud_rate, read_timeout)
            .map_err(|e| serial_fault(port, &e))?;
        sources.push((port.clone(), transport));
    }

    let pipeline = Pipeline::bind(config, shutdown)?;
    let handles = pipeline.start(sources)?;
    log::info!("ticc-mux running. Press Ctrl-C to stop.");

    match handles.wait() {
        None => Ok(()),
        Some(reason) => Err(Error::Other(format!("Terminated by fault: {}", reason))),
    }
}
