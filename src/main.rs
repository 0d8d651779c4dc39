//! webstack CLI: plan and apply a webserver stack from one stack.yaml.

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// `WEBSTACK_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("WEBSTACK_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("webstack={}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = webstack::cli::Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = webstack::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        for detail in e.details() {
            eprintln!("  - {}", detail);
        }
        std::process::exit(1);
    }
}
