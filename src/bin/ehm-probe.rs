//! EHM Probe Binary
//!
//! Runs one named scenario against the engine. Scenarios whose outcome is
//! process termination are driven from the integration tests through this binary.

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use ehm::config::{ConfigLoader, EhmConfig};
use ehm::event::{Event, FAILURE, INTERRUPT};
use ehm::logging::{init_logging, LoggingConfig};
use ehm::{Handler, HandlerFrame, Runtime, Uncaught};
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ehm-probe")]
#[command(about = "Exercise the exception engine's termination paths")]
struct Cli {
    /// Scenario to run
    #[arg(value_enum)]
    scenario: Scenario,

    /// Configuration file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replace the fallbacks with handlers that print a JSON report and exit with this code
    #[arg(long)]
    exit_code: Option<i32>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    log_format: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scenario {
    /// Throw with no catch clause installed
    UnmatchedThrow,
    /// Resume with no handler installed
    UnmatchedResume,
    /// Throw from a cleanup while a throw unwinds through it
    FinallyDuringUnwind,
    /// Throw from a cleanup on normal scope exit, caught outside
    FinallyAfterUnwind,
    /// Throw caught by a matching clause
    Handled,
    /// Close a mask scope before the one opened inside it
    MaskOutOfOrder,
    /// Close a handler scope before the one installed inside it
    HandlerOutOfOrder,
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{:#}", e);
            process::exit(1);
        }
    };

    if let Err(e) = init_logging(Some(&build_logging_config(&cli, &config))) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!(scenario = ?cli.scenario, "Probe starting");
    match run(&cli, &config) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            error!("Scenario failed: {:#}", e);
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<EhmConfig> {
    ConfigLoader::load(cli.config.as_deref()).context("Failed to load configuration")
}

/// CLI flags override the loaded configuration.
fn build_logging_config(cli: &Cli, config: &EhmConfig) -> LoggingConfig {
    let mut logging = config.logging.clone();
    if let Some(ref level) = cli.log_level {
        logging.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        logging.format = format.clone();
    }
    logging
}

fn reporting_fallback(code: i32) -> impl Fn(&Uncaught) + Send + Sync + 'static {
    move |report: &Uncaught| {
        match serde_json::to_string(report) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", report),
        }
        process::exit(code)
    }
}

fn run(cli: &Cli, config: &EhmConfig) -> anyhow::Result<String> {
    let rt = Runtime::from_config(config).context("Invalid engine configuration")?;
    if let Some(code) = cli.exit_code {
        rt.set_terminate_handler(reporting_fallback(code));
        rt.set_unexpected_handler(reporting_fallback(code));
    }
    let ctx = rt.context("probe");

    let output = match cli.scenario {
        Scenario::UnmatchedThrow => ctx.throw(Event::new(&FAILURE, "nobody catches this")),
        Scenario::UnmatchedResume => {
            ctx.resume(Event::new(&INTERRUPT, "nobody handles this"));
            "resumed".to_string()
        }
        Scenario::FinallyDuringUnwind => ctx
            .try_block(|| {
                let _cleanup =
                    ctx.finally(|| ctx.throw(Event::new(&FAILURE, "raised in cleanup")));
                ctx.throw(Event::new(&FAILURE, "propagating"))
            })
            .catch(&FAILURE, |e| format!("caught: {}", e.message()))
            .run(),
        Scenario::FinallyAfterUnwind => ctx
            .try_block(|| {
                let _cleanup =
                    ctx.finally(|| ctx.throw(Event::new(&FAILURE, "raised in cleanup")));
                String::from("body finished")
            })
            .catch(&FAILURE, |e| format!("caught: {}", e.message()))
            .run(),
        Scenario::Handled => ctx
            .try_block(|| ctx.throw(Event::new(&FAILURE, "expected")))
            .catch(&FAILURE, |e| format!("caught: {} from {}", e.message(), e.source_name()))
            .run(),
        Scenario::MaskOutOfOrder => {
            let outer = ctx.disable(&[&INTERRUPT]);
            let inner = ctx.enable(&[&FAILURE]);
            drop(outer);
            drop(inner);
            "scopes closed".to_string()
        }
        Scenario::HandlerOutOfOrder => {
            let outer = ctx.install_handlers(HandlerFrame::new().with(Handler::any(|_, _| {})));
            let inner = ctx.install_handlers(HandlerFrame::new().with(Handler::any(|_, _| {})));
            drop(outer);
            drop(inner);
            "scopes closed".to_string()
        }
    };
    Ok(output)
}
