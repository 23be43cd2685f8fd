use std::{sync::Arc, time::Duration};

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    wagate_gateway::auth::ResolvedAuth,
    wagate_protocol::{CredentialStore, loopback::LoopbackAdapter},
};

#[derive(Parser)]
#[command(name = "wagate", about = "wagate — multi-session messaging gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server.
    Gateway {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the resolved configuration.
    Config,
    /// List persisted sessions eligible for recovery.
    Sessions,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let mut config = wagate_config::discover_and_load();
    wagate_config::apply_env_overrides(&mut config);

    match cli.command {
        Commands::Gateway { bind, port } => {
            if let Some(bind) = bind {
                config.gateway.bind = bind;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }

            let token = std::env::var("WAGATE_API_KEY")
                .map_err(|_| anyhow::anyhow!("WAGATE_API_KEY is required"))?;

            let store = CredentialStore::new(config.credentials_dir());
            let adapter = Arc::new(
                LoopbackAdapter::new(store.clone()).with_pair_delay(Duration::from_secs(
                    config.loopback.pair_delay_seconds,
                )),
            );

            wagate_gateway::server::start(&config, ResolvedAuth { token }, store, adapter).await
        },
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        },
        Commands::Sessions => {
            let store = CredentialStore::new(config.credentials_dir());
            let keys = store.scan();
            if keys.is_empty() {
                info!("no persisted sessions found");
            }
            for key in keys {
                println!("{key}");
            }
            Ok(())
        },
    }
}
