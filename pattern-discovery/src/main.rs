use clap::Parser;
use pattern_discovery::app::{exit_code, App, EXIT_CANCELLED};
use pattern_discovery::cli::Args;
use pattern_discovery::config::ENV_LOG;
use pattern_discovery_sdk::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    // .env must be loaded before clap reads env-backed flags
    dotenv::dotenv().ok();

    let args = Args::parse();
    init_logging(args.verbose);

    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code(&e)
        }
    };

    std::process::exit(code);
}

async fn run(args: Args) -> anyhow::Result<i32> {
    let app = App::new(args)?;

    let cancel = CancellationToken::new();
    if app.is_interactive() {
        // Ctrl-C belongs to the session's own UI; only keep it from killing us
        tokio::spawn(async {
            while tokio::signal::ctrl_c().await.is_ok() {
                tracing::debug!("Ctrl-C left to the interactive session");
            }
        });
    } else {
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupted, stopping...");
                on_interrupt.cancel();
            }
        });
    }

    let status = app.run(cancel.clone()).await?;

    if cancel.is_cancelled() {
        return Ok(EXIT_CANCELLED);
    }
    Ok(status.exit_code())
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "pattern_discovery=debug,pattern_discovery_sdk=debug"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| default.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .without_time()
                .with_target(false),
        )
        .init();
}
