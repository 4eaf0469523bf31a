use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::Parser;
use client_core::{CandidateFile, FileSource, GenerateOutcome, HttpBackend, Session};
use shared::domain::{AspectRatio, ModelId};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod share;
mod terminal;

use config::{load_settings, Settings};
use share::ClipboardShare;
use terminal::{finish_event_printer, spawn_event_printer, Terminal};

/// How long to wait at exit for the event printer to flush.
const PRINTER_GRACE: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(name = "monkee", about = "Generate images from a prompt and reference photos")]
struct Args {
    /// Base URL of the generation server.
    #[arg(long)]
    server_url: Option<String>,
    /// Where downloaded results are written.
    #[arg(long)]
    download_dir: Option<PathBuf>,
    /// Generate once with this prompt and exit.
    #[arg(long)]
    prompt: Option<String>,
    /// Reference image to attach; repeatable.
    #[arg(long = "image", value_name = "PATH")]
    images: Vec<PathBuf>,
    #[arg(long, default_value_t = AspectRatio::Square)]
    aspect_ratio: AspectRatio,
    #[arg(long)]
    model: Option<ModelId>,
    /// Save the generated image into the download directory.
    #[arg(long)]
    save: bool,
}

impl Args {
    fn apply_to(&self, settings: &mut Settings) {
        if let Some(url) = &self.server_url {
            settings.server_url = url.clone();
        }
        if let Some(dir) = &self.download_dir {
            settings.download_dir = dir.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    args.apply_to(&mut settings);
    settings.validate()?;
    info!(
        server_url = %settings.server_url,
        download_dir = %settings.download_dir.display(),
        "starting monkee"
    );

    let backend = HttpBackend::new(&settings.server_url, settings.request_timeout())?;
    let session = Session::new(Arc::new(backend));
    let printer = spawn_event_printer(&session);

    if let Err(err) = session.check_health().await {
        warn!(error = %format!("{err:#}"), "server unreachable; generation may fail");
    }

    let result = match args.prompt.clone() {
        Some(prompt) => run_once(&session, &args, &settings, prompt).await,
        None => {
            Terminal::new(Arc::clone(&session), settings, ClipboardShare::detect())
                .run()
                .await
        }
    };
    finish_event_printer(session, printer, PRINTER_GRACE).await;
    result
}

async fn run_once(
    session: &Arc<Session>,
    args: &Args,
    settings: &Settings,
    prompt: String,
) -> Result<()> {
    session.set_aspect_ratio(args.aspect_ratio).await;
    session.set_model(args.model).await;

    let mut files = Vec::with_capacity(args.images.len());
    for path in &args.images {
        let file = CandidateFile::read(path)
            .await
            .with_context(|| format!("failed to read image '{}'", path.display()))?;
        files.push(file);
    }
    session.add_files(files, FileSource::Picker).await;
    session.set_prompt(prompt).await;

    match session.generate().await {
        GenerateOutcome::Succeeded(_) => {}
        GenerateOutcome::Rejected(message) | GenerateOutcome::Failed(message) => bail!(message),
        GenerateOutcome::Ignored | GenerateOutcome::Discarded => {
            bail!("generation did not complete")
        }
    }

    if args.save {
        let file = session
            .download_offer()
            .await?
            .context("generated image is no longer available")?;
        let path = file.save_into(&settings.download_dir).await?;
        println!("saved {}", path.display());
    }
    Ok(())
}
