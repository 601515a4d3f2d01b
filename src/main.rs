use clap::Parser;
use dotenvy::dotenv;

mod auth;
mod cli;
mod commands;
mod config;
mod countdown;
mod error;
mod handoff;
mod lifecycle;
mod logger;
mod model;
mod obs;
mod resolver;
mod sun;
mod tasks;
mod youtube;

use cli::{Cli, Command, StreamCommand};
use error::LauncherError;
use resolver::TimeSpec;

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), LauncherError> {
    dotenv().ok();

    let cli = Cli::parse();

    let mut config = config::load()?;
    if let Some(dir) = cli.credentials_dir {
        config.credentials_dir = Some(dir);
    }
    let _guard = logger::init(&config)?;

    match cli.command {
        Command::Sunrise(args) => commands::sun::run(&config, TimeSpec::Sunrise, &args).await,
        Command::Sunset(args) => commands::sun::run(&config, TimeSpec::Sunset, &args).await,
        Command::Stream { command } => match command {
            StreamCommand::Schedule(args) => commands::stream::schedule(&config, &args).await,
            StreamCommand::Start(args) => commands::stream::start(&config, &args).await,
            StreamCommand::End(args) => commands::stream::end(&config, &args).await,
        },
        Command::Update => commands::update::run(&config).await,
    }
}
