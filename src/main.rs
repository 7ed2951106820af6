use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use fansly_live::{
    api::FanslyClient,
    config::{Cli, Config, ConfigError},
    ffmpeg::Ffmpeg,
    shutdown, worker,
};
use log::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "info,fansly_live=debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    // Resolve flags, env file and environment once
    let config = match Config::from_cli(cli) {
        Ok(config) => config,
        Err(e) => {
            if matches!(e, ConfigError::MissingCreator) {
                let _ = Cli::command().print_help();
            }
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let client = match FanslyClient::new(&config) {
        Ok(client) => client,
        Err(e) => {
            error!("Could not create HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // One Ctrl-C listener for the whole process, a second Ctrl-C exits at once
    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        warn!("Ctrl-C detected, stopping...");
        trigger.trigger();

        if tokio::signal::ctrl_c().await.is_ok() {
            error!("Ctrl-C detected again, exiting without cleanup");
            std::process::exit(130);
        }
    });

    let recorder = Ffmpeg {
        program: config.ffmpeg.clone(),
        max_duration: config.max_duration,
        shutdown: shutdown.clone(),
    };

    match worker::run(&client, &recorder, &config, &shutdown).await {
        Ok(recording) => {
            info!("Done: {}", recording.video.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
