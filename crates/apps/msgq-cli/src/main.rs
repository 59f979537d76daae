use clap::Parser;
use msgq_cli::{commands, Cli};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    commands::run(Cli::parse())
}
