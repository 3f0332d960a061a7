use clap::Parser;
use facility_scout::app::App;
use facility_scout::cli::{Args, Command};
use facility_scout::config::Config;
use facility_scout::logging::setup_logging;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Logging depends on the config, so a config error can only go to stderr.
    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:?}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_SHORT"),
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        "starting facility-scout"
    );

    let app = App::new(config);
    let result = match args.command {
        Command::Fetch(fetch) => app.fetch(fetch).await,
        Command::Notify { dry_run } => app.notify(dry_run).await.map(|_| ()),
        Command::Watch { interval, dry_run } => app.watch(interval, dry_run).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "facility-scout failed");
            ExitCode::FAILURE
        }
    }
}
