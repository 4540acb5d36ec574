use anyhow::Result;
use clap::Parser;
use signal_observatory_cli::{init_logging, load_dotenv, run_cli, Cli};

fn main() -> Result<()> {
    let dotenv_path = load_dotenv()?;
    let cli = Cli::parse();
    init_logging(cli.log_level(), cli.log_format())?;
    if let Some(path) = dotenv_path {
        tracing::debug!(path = %path.display(), "loaded .env");
    }
    run_cli(cli)
}
