use butterfly_contract::cli::Cli;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).compact().init();
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    if let Err(e) = cli.run() {
        eprintln!("❌ Error: {e:#}");
        std::process::exit(1);
    }
}
