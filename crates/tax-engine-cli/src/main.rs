use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = tax_engine_cli::Cli::parse();
    tax_engine_cli::run_cli(cli)
}
