use clap::Parser;
use kafka_http_gateway::{Config, Result};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "kafka-http-gateway")]
#[command(about = "Publishes HTTP request bodies to a Kafka topic", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", env = "CONFIG_FILE")]
    config: Option<PathBuf>,

    #[arg(short, long, env = "PROFILE", default_value = "local", help = "Selects conf-<profile>.yaml when no config file is given")]
    profile: String,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,
}

impl Args {
    fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(|| {
            PathBuf::from(format!("conf-{}.yaml", self.profile.to_lowercase()))
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    match start(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn start(args: &Args) -> Result<()> {
    let path = args.config_path();
    info!("Starting kafka-http-gateway");
    info!("Loading configuration from {:?}", path);

    let config = Config::load(&path)?;
    info!("Configuration loaded successfully");

    info!(
        kafka_brokers = ?config.kafka.brokers,
        kafka_topic = %config.kafka.topic,
        tls_enabled = config.kafka.auth.tls.enabled,
        scram = config.kafka.auth.scram,
        listen_addr = %config.server.listen_addr,
        max_body_bytes = config.server.max_body_bytes,
        "Configuration summary"
    );

    kafka_http_gateway::run(config).await
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("kafka_http_gateway=debug,librdkafka=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("kafka_http_gateway=info,librdkafka=warn,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
