use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use secrecy::ExposeSecret;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use ocr_sheets::channels::{LineChannel, WebhookState, webhook_routes};
use ocr_sheets::config::{self, AppConfig, GeminiConfig, SheetsConfig};
use ocr_sheets::extraction::GeminiExtractor;
use ocr_sheets::ledger::JsonFileLedger;
use ocr_sheets::pipeline::{ImageProcessor, ProcessorDeps, scan_file};
use ocr_sheets::sheets::{GoogleSheetsSink, SheetTarget};

const USAGE: &str = "usage: ocr-sheets [serve | scan <image-path>]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // A missing .env is fine; the environment may already be populated.
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("serve") => serve().await,
        Some("scan") => {
            let Some(path) = args.get(1) else {
                bail!("{USAGE}");
            };
            let _guard = init_tracing(None)?;
            scan(Path::new(path)).await
        }
        Some(other) => bail!("unknown command '{other}'\n{USAGE}"),
    }
}

/// Console logging, plus a daily-rolling file when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "ocr-sheets.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .try_init()
        .context("Failed to initialise logging")?;

    Ok(guard)
}

async fn serve() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let _guard = init_tracing(config.server.log_dir.as_deref())?;

    eprintln!("📷 ocr-sheets v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   LINE token: {}",
        config::preview(config.line.channel_access_token.expose_secret())
    );
    eprintln!("   Model: {}", config.gemini.model);
    eprintln!(
        "   Sheet: {} ({})",
        config.sheets.spreadsheet_id, config.sheets.range
    );
    eprintln!("   Ledger: {}", config.server.ledger_path.display());
    if let Some(dir) = &config.server.image_dir {
        eprintln!("   Image archive: {}", dir.display());
    }

    // ── Collaborators ───────────────────────────────────────────────────
    let line = Arc::new(LineChannel::new(&config.line)?);
    let extractor = Arc::new(GeminiExtractor::new(&config.gemini)?);
    let sink = Arc::new(GoogleSheetsSink::from_config(&config.sheets).await?);
    let ledger = Arc::new(JsonFileLedger::new(config.server.ledger_path.clone()));

    match ledger.entries().await {
        Ok(entries) => tracing::info!(processed = entries.len(), "Delivery ledger loaded"),
        Err(e) => tracing::warn!(error = %e, "Delivery ledger unreadable"),
    }

    let processor = ImageProcessor::new(
        ProcessorDeps {
            media: line.clone(),
            replies: line,
            extractor,
            sink,
            ledger,
        },
        SheetTarget::from(&config.sheets),
    )
    .with_image_archive(config.server.image_dir.clone());

    // ── Server ──────────────────────────────────────────────────────────
    let app = webhook_routes(WebhookState {
        processor: Arc::new(processor),
        channel_secret: config.line.channel_secret.clone(),
    });

    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    eprintln!("   Webhook: http://{addr}/callback\n");
    tracing::info!(%addr, "Webhook server started");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn scan(path: &Path) -> anyhow::Result<()> {
    let gemini = GeminiConfig::from_lookup(&config::env_lookup)?;
    let sheets = SheetsConfig::from_lookup(&config::env_lookup)?;

    let extractor = GeminiExtractor::new(&gemini)?;
    let sink = GoogleSheetsSink::from_config(&sheets).await?;

    let report = scan_file(path, &extractor, &sink, &SheetTarget::from(&sheets)).await?;
    let Some(text) = report.text else {
        bail!("No text extracted from {}", path.display());
    };

    println!("{text}");
    println!("Appended {} rows to {}", report.rows, sheets.spreadsheet_id);
    Ok(())
}
