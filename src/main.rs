use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use ispdesk::cli::{Console, ConsoleNotifier};
use ispdesk::config::{Config, SETTINGS};
use ispdesk::context::AppContext;

fn print_usage() {
    println!("Usage: ispdesk [options]\n\nOptions (each may also be set by its environment variable):");
    for (flag, var) in SETTINGS {
        println!("  {:<20} {}", format!("{flag} <value>"), var);
    }
    println!("  {:<20} show this help", "--help");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    // Logs go to stderr so they do not interleave with tables on stdout
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("warn"))?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cfg = Config::from_env_and_args(&args)?;
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(target: "ispdesk", "ispdesk starting: RUST_LOG='{}', {}", rust_log, cfg.redacted_summary());

    let ctx = AppContext::from_config(&cfg, Arc::new(ConsoleNotifier))?;
    Console::new(ctx)?.run().await?;
    Ok(())
}
