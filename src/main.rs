use clap::{Parser, Subcommand};
use redirector::cache::ResponseCache;
use redirector::config::Config;
use redirector::generate::{generate_ingress, GenerateOptions};
use redirector::metrics::Metrics;
use redirector::rules::compile_rules;
use redirector::server::{AppState, MetricsServer, RedirectServer, ServerSettings};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "redirector",
    about = "Declarative, hot-reloadable HTTP redirect service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the redirect service; reads the config path from CONFIG_PATH
    Server,
    /// Generate a Kubernetes Ingress manifest covering all rule hosts
    Generate {
        /// Where to write the Ingress manifest
        #[arg(long, default_value = "./redirector-ingress.yml")]
        out: PathBuf,
        /// Kubernetes namespace where redirector is deployed
        #[arg(long, default_value = "redirector")]
        namespace: String,
        /// Kubernetes service name to send traffic to
        #[arg(long, default_value = "redirector")]
        service_name: String,
        /// Name of the generated Ingress object
        #[arg(long, default_value = "redirector")]
        ingress_name: String,
        /// Kubernetes ingress class set as ingressClassName
        #[arg(long, default_value = "nginx")]
        ingress_class: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging()?;

    match cli.command {
        Commands::Server => server().await,
        Commands::Generate {
            out,
            namespace,
            service_name,
            ingress_name,
            ingress_class,
        } => {
            let config = Config::load(config_path()?)?;
            let options = GenerateOptions {
                out,
                namespace,
                service_name,
                ingress_name,
                ingress_class,
            };
            generate_ingress(&config, &options)?;
            println!("Ingress manifest written to {:?}", options.out);
            Ok(())
        }
    }
}

fn config_path() -> anyhow::Result<String> {
    std::env::var("CONFIG_PATH")
        .map_err(|_| anyhow::anyhow!("CONFIG_PATH environment variable is not set"))
}

async fn server() -> anyhow::Result<()> {
    let config_path = config_path()?;
    let config = Config::load(&config_path)?;

    let table = compile_rules(&config.rules, &config.rule_defaults());
    info!(
        hosts = table.host_count(),
        rules = table.rule_count(),
        "loaded config"
    );

    let metrics = Arc::new(Metrics::new()?);
    let state = Arc::new(AppState {
        settings: ServerSettings {
            location_on_miss: config.location_on_miss.clone(),
            status_on_miss: config.status_on_miss,
            cache_control_max_age: config.cache_control_max_age,
        },
        table: Arc::new(arc_swap::ArcSwap::from_pointee(table)),
        cache: ResponseCache::new(
            config.cache.ttl,
            config.cache.cleanup_interval,
            Arc::clone(&metrics),
        ),
    });

    let cancel_token = CancellationToken::new();

    // graceful shutdown on ctrl-c
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        info!("Received Ctrl+C, initiating graceful shutdown...");
        shutdown_token.cancel();
    });

    // background cache eviction
    let eviction_state = Arc::clone(&state);
    let eviction_token = cancel_token.clone();
    tokio::spawn(async move {
        eviction_state.cache.run_eviction(eviction_token).await;
    });

    // background config reloader
    tokio::spawn(redirector::config::watch_rules(
        PathBuf::from(&config_path),
        Arc::clone(&state.table),
        cancel_token.clone(),
    ));

    let metrics_server = MetricsServer::new(metrics);
    let redirect_server = RedirectServer::new(state);

    // failure to bind either listener is fatal
    tokio::try_join!(
        redirect_server.run(&config.listen_address, cancel_token.clone()),
        metrics_server.run(&config.metrics_server_listen_address, cancel_token.clone()),
    )?;

    info!("redirector stopped");
    Ok(())
}

fn setup_logging() -> anyhow::Result<()> {
    // DEBUG_LOGS switches on debug-level logging with source attribution
    let debug_logs = std::env::var("DEBUG_LOGS").map(|v| !v.is_empty()).unwrap_or(false);
    let level = if debug_logs { Level::DEBUG } else { Level::INFO };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .with_file(debug_logs)
                .with_line_number(debug_logs),
        )
        .init();

    Ok(())
}
