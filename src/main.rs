use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tracing::{info, warn};

use mailmerge::config::{self, JobSpec, RunOptions};
use mailmerge::error::ConfigError;
use mailmerge::merge::{MergeDriver, TemplateEngine};
use mailmerge::store::{DataSource, GristClient, LibSqlSource};
use mailmerge::transport::SendmailTransport;

#[derive(Parser, Debug)]
#[command(name = "mailmerge", about = "Email merge for Grist", version)]
struct Args {
    /// Job description.
    #[arg(value_name = "FILENAME.YML")]
    filename: PathBuf,

    /// Values for the job's declared parameters, in order.
    #[arg(value_name = "PAR")]
    parameters: Vec<String>,

    /// Render and preview every message; send nothing, write nothing back.
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Skip sending but write back as if every message was sent.
    #[arg(long)]
    no_email: bool,

    /// Print a preview of every message.
    #[arg(short, long)]
    verbose: bool,

    /// File holding the Grist API key. Defaults to ~/.grist-api-key.
    #[arg(long, value_name = "FILENAME")]
    api_key: Option<PathBuf>,

    /// sendmail-compatible program used for delivery.
    #[arg(long, value_name = "PATH", default_value = SendmailTransport::DEFAULT_PATH)]
    sendmail: PathBuf,

    /// Use a local SQLite database instead of the Grist document.
    #[arg(long, value_name = "PATH")]
    sqlite: Option<PathBuf>,
}

async fn open_source(args: &Args, job: &JobSpec) -> anyhow::Result<Arc<dyn DataSource>> {
    if let Some(path) = &args.sqlite {
        return Ok(Arc::new(LibSqlSource::new_local(path).await?));
    }

    let missing = |key: &str| ConfigError::MissingRequired {
        key: key.to_string(),
        hint: "Set it in the job file or pass --sqlite".to_string(),
    };
    let root_url = job
        .grist_root_url
        .as_deref()
        .ok_or_else(|| missing("grist_root_url"))?;
    let doc_id = job
        .grist_doc_id
        .as_deref()
        .ok_or_else(|| missing("grist_doc_id"))?;

    let key_path = args.api_key.clone().unwrap_or_else(config::default_api_key_path);
    let api_key = config::load_api_key(&key_path)?;
    Ok(Arc::new(GristClient::new(root_url, api_key, doc_id)?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; previews own stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let job = JobSpec::load(&args.filename)
        .with_context(|| format!("Loading job {}", args.filename.display()))?;

    let timezone = job.timezone()?;
    if timezone.is_none() {
        warn!("'timezone' key not specified, timestamps will be local");
    }

    let source = open_source(&args, &job).await?;
    let transport = Arc::new(SendmailTransport::new(&args.sendmail));
    let options = RunOptions {
        dry_run: args.dry_run,
        no_email: args.no_email,
        verbose: args.verbose,
    };

    let mut driver = MergeDriver::new(
        job,
        options,
        source,
        transport,
        TemplateEngine::new(timezone),
    )?;
    let report = driver.run(&args.parameters).await?;

    info!(
        rows = report.rows,
        sent = report.sent,
        send_failures = report.send_failures,
        updated_rows = report.updated_rows,
        inserted = report.inserted.values().sum::<usize>(),
        "Done"
    );
    if report.send_failures > 0 {
        warn!(count = report.send_failures, "Some messages could not be sent");
    }
    Ok(())
}
