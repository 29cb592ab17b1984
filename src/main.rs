use brrtstack::cli::{run, Cli};
use brrtstack::logging::{init_logging, LogConfig};
use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(&LogConfig::from_env())?;
    run(cli)
}
