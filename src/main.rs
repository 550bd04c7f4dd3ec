use clap::Parser;
use shortlink_load_test::cli::{resolve_config, run_compare, Cli};
use shortlink_load_test::error::LoadTestError;
use shortlink_load_test::orchestrator::Orchestrator;
use shortlink_load_test::reporter;
use shortlink_load_test::transport::{HttpTransport, ReqwestTransport};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("shortlink_load_test=info")),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli {
        Cli::Run {
            config,
            base_url,
            vus,
            settle_ms,
            output,
        } => run_accuracy_test(config, base_url, vus, settle_ms, output.as_deref()).await,
        Cli::Compare { current, previous } => run_compare(&current, &previous).map(|_| 0),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_accuracy_test(
    config_path: Option<PathBuf>,
    base_url: Option<String>,
    vus: Option<u64>,
    settle_ms: Option<u64>,
    output: Option<&Path>,
) -> Result<i32, LoadTestError> {
    let cfg = resolve_config(config_path.as_deref(), base_url, vus, settle_ms, |key| {
        std::env::var(key).ok()
    })?;

    let transport = ReqwestTransport::new(&cfg.base_url, cfg.request_timeout())?;
    let transport: Arc<dyn HttpTransport> = Arc::new(transport);

    let orchestrator = Orchestrator::new(cfg, transport);
    let report = orchestrator.run().await?;

    println!("{}", reporter::render_summary(&report));

    if let Some(output_path) = output {
        reporter::write_json_result(&report, output_path).map_err(|e| {
            LoadTestError::ResultFile(format!(
                "Failed to write result to '{}': {}",
                output_path.display(),
                e
            ))
        })?;
        eprintln!("Result written to {}", output_path.display());
    }

    Ok(report.outcome.exit_code())
}
