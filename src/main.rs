use std::net::Ipv4Addr;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use aiforimpact_portal::config::AppConfig;
use aiforimpact_portal::http::{api_router, AppState};
use aiforimpact_portal::mail::{DeliveryWorker, MailConfig};
use aiforimpact_portal::{doctor, serve, EnvConfig};

#[derive(Debug, Parser)]
#[command(name = "aiforimpact-portal")]
#[command(about = "Registration, subscription, and contact backend for aiforimpact.net")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the portal HTTP server
    Serve {
        /// Override the configured listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Check the SMTP configuration, optionally sending a test email
    Doctor {
        /// Send a live test email to this address
        #[arg(long)]
        send_to: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => {
            run_server(port).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Doctor { send_to } => {
            let mail = MailConfig::from_env()?;
            let healthy = doctor::run(&mail, send_to.as_deref()).await?;
            Ok(if healthy {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

async fn run_server(port_override: Option<u16>) -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    let mail = MailConfig::from_env()?;
    let port = port_override.unwrap_or(config.port);

    let state = AppState::new(config, mail)?;
    DeliveryWorker::new(
        state.outbox.clone(),
        state.mailer.clone(),
        state.mail.clone(),
    )
    .start();

    let routes = api_router(state);
    serve::serve((Ipv4Addr::UNSPECIFIED, port), routes).await?;
    Ok(())
}
