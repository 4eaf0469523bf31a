//! Line-oriented surface over a [`Session`]: commands on stdin, events on stdout.

use std::{io::Write as _, path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use anyhow::Result;
use client_core::{
    CandidateFile, FileSource, GenerationState, ImageFile, NoticeKind, PreviewGrid, Session,
    SessionEvent, SessionSnapshot, ShareOutcome, ShareTarget, ThumbnailState, TileControl,
    ViewerImage, ViewerInput, ViewerKey,
};
use image::GenericImageView;
use shared::domain::{AspectRatio, ModelId, MAX_ATTACHMENTS};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    task::JoinHandle,
};
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    StreamExt,
};
use tracing::{debug, warn};

use crate::config::Settings;

const HELP: &str = "\
commands:
  prompt <text>          set the prompt
  ratio <W:H>            1:1, 16:9, 9:16, 4:3 or 3:4
  model <id>|default     pick a model or let the server decide
  add <path>...          attach images
  drop <path>...         attach dropped files (non-images are skipped)
  remove <i>             remove attachment i
  clear                  remove all attachments
  list                   show attachments
  view result|<i>        open the result or attachment i in the viewer
  close                  close the viewer
  generate               send the prompt and attachments
  download               save the result into the download directory
  share                  copy the result to the clipboard
  reset                  start over
  status                 show the session state
  help                   show this help
  quit                   exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Prompt(String),
    Ratio(AspectRatio),
    Model(Option<ModelId>),
    Add(Vec<PathBuf>),
    Drop(Vec<PathBuf>),
    Remove(usize),
    Clear,
    List,
    View(ViewTarget),
    Close,
    Generate,
    Download,
    Share,
    Reset,
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewTarget {
    Result,
    Attachment(usize),
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map(|(word, rest)| (word, rest.trim()))
            .unwrap_or((line, ""));

        let command = match word.to_ascii_lowercase().as_str() {
            "prompt" | "p" => Command::Prompt(rest.to_string()),
            "ratio" | "aspect" => Command::Ratio(rest.parse().map_err(|err| format!("{err}"))?),
            "model" => match rest {
                "" | "default" | "auto" => Command::Model(None),
                id => Command::Model(Some(id.parse().map_err(|err| format!("{err}"))?)),
            },
            "add" => Command::Add(paths(rest)?),
            "drop" => Command::Drop(paths(rest)?),
            "remove" | "rm" => Command::Remove(index(rest)?),
            "clear" => Command::Clear,
            "list" | "ls" => Command::List,
            "view" => match rest {
                "" | "result" => Command::View(ViewTarget::Result),
                i => Command::View(ViewTarget::Attachment(index(i)?)),
            },
            "close" | "esc" => Command::Close,
            "generate" | "gen" | "g" => Command::Generate,
            "download" | "save" => Command::Download,
            "share" => Command::Share,
            "reset" => Command::Reset,
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(format!("unknown command '{other}'; type 'help'")),
        };
        Ok(command)
    }
}

fn paths(rest: &str) -> Result<Vec<PathBuf>, String> {
    let paths: Vec<PathBuf> = rest.split_whitespace().map(PathBuf::from).collect();
    if paths.is_empty() {
        return Err("expected at least one path".to_string());
    }
    Ok(paths)
}

fn index(raw: &str) -> Result<usize, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("expected an attachment index, got '{raw}'"))
}

/// Prints session events as they arrive until the session goes away.
pub fn spawn_event_printer(session: &Session) -> JoinHandle<()> {
    spawn_event_sink(session, |line| println!("{line}"))
}

fn spawn_event_sink(
    session: &Session,
    mut sink: impl FnMut(String) + Send + 'static,
) -> JoinHandle<()> {
    let mut events = BroadcastStream::new(session.subscribe_events());
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    if let Some(line) = describe_event(&event) {
                        sink(line);
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "event printer fell behind");
                }
            }
        }
    })
}

/// Drops this handle to the session and waits for the printer to drain. The
/// event stream ends with the last handle, so `grace` bounds the wait on
/// background tasks that still hold one.
pub async fn finish_event_printer(session: Arc<Session>, printer: JoinHandle<()>, grace: Duration) {
    drop(session);
    if tokio::time::timeout(grace, printer).await.is_err() {
        debug!("event printer still running at exit");
    }
}

pub fn describe_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::NoticeShown(notice) => {
            let tag = match notice.kind {
                NoticeKind::Validation | NoticeKind::Capacity => "!",
                NoticeKind::Configuration => "config",
                NoticeKind::Generation => "error",
                NoticeKind::ShareUnsupported | NoticeKind::ShareFailed => "share",
                NoticeKind::DownloadFailed => "download",
            };
            Some(format!("[{tag}] {}", notice.message))
        }
        SessionEvent::GenerationStarted => Some("generating...".to_string()),
        SessionEvent::GenerationSucceeded(result) => {
            let mut line = format!("image ready ({})", result.mime_type());
            if let Some(model) = &result.model_used {
                line.push_str(&format!(" via {model}"));
            }
            if let Some(message) = &result.message {
                line.push_str(&format!(": {message}"));
            }
            Some(line)
        }
        SessionEvent::ThumbnailFailed { reason, .. } => {
            Some(format!("preview unavailable: {reason}"))
        }
        SessionEvent::ViewerOpened(ViewerImage::Result) => Some("viewing result".to_string()),
        SessionEvent::ViewerOpened(ViewerImage::Attachment(_)) => {
            Some("viewing attachment".to_string())
        }
        SessionEvent::ViewerClosed => Some("viewer closed".to_string()),
        SessionEvent::Reset => Some("session reset".to_string()),
        other => {
            debug!(event = ?other, "session event");
            None
        }
    }
}

pub fn describe_grid(grid: &PreviewGrid) -> String {
    if grid.is_empty() {
        return format!("no attachments (0/{MAX_ATTACHMENTS})");
    }
    let mut out = format!("attachments ({}/{MAX_ATTACHMENTS}):", grid.len());
    for tile in &grid.tiles {
        let preview = match &tile.thumbnail {
            ThumbnailState::Pending => "loading".to_string(),
            ThumbnailState::Ready(thumb) => format!("{}x{}", thumb.width, thumb.height),
            ThumbnailState::Failed(_) => "no preview".to_string(),
        };
        out.push_str(&format!("\n  [{}] {} ({preview})", tile.index, tile.file_name));
    }
    out
}

pub fn describe_snapshot(snapshot: &SessionSnapshot) -> String {
    let generation = match &snapshot.generation {
        GenerationState::Idle => "idle".to_string(),
        GenerationState::InFlight => "generating".to_string(),
        GenerationState::Succeeded(_) => "done".to_string(),
        GenerationState::Failed(message) => format!("failed: {message}"),
    };
    let model = snapshot
        .model
        .map(|model| model.display_name().to_string())
        .unwrap_or_else(|| "server default".to_string());
    let backend = match snapshot.backend_configured {
        Some(true) => "ready",
        Some(false) => "not configured",
        None => "unknown",
    };
    let mut out = format!(
        "prompt: {:?} ({} chars)\nratio: {}\nmodel: {model}\nimages: {}/{MAX_ATTACHMENTS}\n\
         generation: {generation}\ngenerate: {}\nbackend: {backend}",
        snapshot.prompt,
        snapshot.prompt_length,
        snapshot.aspect_ratio,
        snapshot.attachment_count(),
        if snapshot.trigger.enabled { "enabled" } else { "disabled" },
    );
    if snapshot.result.is_some() {
        out.push_str("\nresult: shown");
    }
    if let Some(notice) = &snapshot.error {
        out.push_str(&format!("\nnotice: {}", notice.message));
    }
    out
}

async fn read_candidates(paths: &[PathBuf]) -> Vec<CandidateFile> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        match CandidateFile::read(path).await {
            Ok(file) => files.push(file),
            Err(err) => println!("could not read {}: {err}", path.display()),
        }
    }
    files
}

fn describe_image_file(file: &ImageFile) -> String {
    match image::load_from_memory(&file.bytes) {
        Ok(decoded) => {
            let (width, height) = decoded.dimensions();
            format!("{} {width}x{height} {} bytes", file.file_name, file.bytes.len())
        }
        Err(_) => format!("{} {} bytes", file.file_name, file.bytes.len()),
    }
}

pub struct Terminal {
    session: Arc<Session>,
    settings: Settings,
    share: Arc<dyn ShareTarget>,
}

impl Terminal {
    pub fn new(session: Arc<Session>, settings: Settings, share: Arc<dyn ShareTarget>) -> Self {
        Self {
            session,
            settings,
            share,
        }
    }

    pub async fn run(&self) -> Result<()> {
        println!("{HELP}");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            std::io::stdout().flush()?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(Command::Quit) => break,
                Ok(command) => {
                    if let Err(err) = self.execute(command).await {
                        println!("error: {err:#}");
                    }
                }
                Err(err) => println!("{err}"),
            }
        }
        Ok(())
    }

    pub async fn execute(&self, command: Command) -> Result<()> {
        let session = &self.session;
        match command {
            Command::Prompt(text) => session.set_prompt(text).await,
            Command::Ratio(ratio) => session.set_aspect_ratio(ratio).await,
            Command::Model(model) => session.set_model(model).await,
            Command::Add(paths) => self.add(&paths, FileSource::Picker).await,
            Command::Drop(paths) => self.add(&paths, FileSource::DragDrop).await,
            Command::Remove(index) => {
                if !session.activate_tile(index, TileControl::Remove).await {
                    println!("no attachment at {index}");
                }
            }
            Command::Clear => session.clear_attachments().await,
            Command::List => println!("{}", describe_grid(&session.preview_grid().await)),
            Command::View(target) => {
                let opened = match target {
                    ViewTarget::Result => session.open_viewer(ViewerImage::Result).await,
                    ViewTarget::Attachment(index) => {
                        session.activate_tile(index, TileControl::Enlarge).await
                    }
                };
                if !opened {
                    println!("nothing to view");
                } else if let Some(file) = session.viewer_file().await? {
                    println!("{}", describe_image_file(&file));
                }
            }
            Command::Close => {
                session.viewer_input(ViewerInput::Key(ViewerKey::Escape)).await;
            }
            Command::Generate => {
                // Runs in the background so the prompt stays responsive.
                let session = Arc::clone(session);
                tokio::spawn(async move {
                    let outcome = session.generate().await;
                    debug!(?outcome, "generate finished");
                });
            }
            Command::Download => match session.download_offer().await? {
                Some(file) => {
                    let path = file.save_into(&self.settings.download_dir).await?;
                    println!("saved {}", path.display());
                }
                None => println!("no result to download"),
            },
            Command::Share => match session.share(self.share.as_ref()).await {
                ShareOutcome::Shared => println!("result copied to clipboard"),
                ShareOutcome::NothingToShare => println!("no result to share"),
                _ => {}
            },
            Command::Reset => session.reset().await,
            Command::Status => println!("{}", describe_snapshot(&session.snapshot().await)),
            Command::Help => println!("{HELP}"),
            Command::Quit => {}
        }
        Ok(())
    }

    async fn add(&self, paths: &[PathBuf], source: FileSource) {
        let files = read_candidates(paths).await;
        let outcome = self.session.add_files(files, source).await;
        if outcome.filtered > 0 {
            println!("skipped {} non-image file(s)", outcome.filtered);
        }
        println!("{}", describe_grid(&self.session.preview_grid().await));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prompt_keeping_inner_spacing() {
        assert_eq!(
            "prompt  a monkey  in space ".parse::<Command>(),
            Ok(Command::Prompt("a monkey  in space".to_string()))
        );
        assert_eq!("prompt".parse::<Command>(), Ok(Command::Prompt(String::new())));
    }

    #[test]
    fn parses_ratio_and_model() {
        assert_eq!(
            "ratio 16:9".parse::<Command>(),
            Ok(Command::Ratio(AspectRatio::Landscape))
        );
        assert!("ratio 2:1".parse::<Command>().is_err());
        assert_eq!("model default".parse::<Command>(), Ok(Command::Model(None)));
        assert_eq!(
            "model imagen-3.0-generate-002".parse::<Command>(),
            Ok(Command::Model(Some(ModelId::Imagen3)))
        );
    }

    #[test]
    fn parses_paths_and_indices() {
        assert_eq!(
            "add a.png b.jpg".parse::<Command>(),
            Ok(Command::Add(vec![PathBuf::from("a.png"), PathBuf::from("b.jpg")]))
        );
        assert!("drop".parse::<Command>().is_err());
        assert_eq!("remove 2".parse::<Command>(), Ok(Command::Remove(2)));
        assert!("remove two".parse::<Command>().is_err());
        assert_eq!(
            "view".parse::<Command>(),
            Ok(Command::View(ViewTarget::Result))
        );
        assert_eq!(
            "view 0".parse::<Command>(),
            Ok(Command::View(ViewTarget::Attachment(0)))
        );
    }

    #[test]
    fn rejects_unknown_commands() {
        let err = "fly".parse::<Command>().expect_err("unknown");
        assert!(err.contains("fly"));
        assert_eq!("QUIT".parse::<Command>(), Ok(Command::Quit));
    }

    #[test]
    fn empty_grid_reports_capacity() {
        assert_eq!(
            describe_grid(&PreviewGrid::default()),
            format!("no attachments (0/{MAX_ATTACHMENTS})")
        );
    }

    #[tokio::test]
    async fn queued_events_are_printed_before_exit() {
        let backend = client_core::HttpBackend::new("http://127.0.0.1:9", Duration::from_secs(1))
            .expect("backend");
        let session = Session::new(Arc::new(backend));
        let lines = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink_lines = Arc::clone(&lines);
        let printer = spawn_event_sink(&session, move |line| {
            sink_lines.lock().expect("lines").push(line);
        });

        let outcome = session.generate().await;
        assert!(matches!(outcome, client_core::GenerateOutcome::Rejected(_)));
        finish_event_printer(session, printer, Duration::from_secs(5)).await;

        let lines = lines.lock().expect("lines");
        assert!(lines.iter().any(|line| line.starts_with("[!] ")), "{lines:?}");
    }

    #[test]
    fn notices_are_printed_with_their_kind() {
        let event = SessionEvent::NoticeShown(client_core::Notice {
            id: shared::domain::NoticeId(1),
            kind: NoticeKind::Generation,
            message: "quota exceeded".to_string(),
        });
        assert_eq!(describe_event(&event).as_deref(), Some("[error] quota exceeded"));
        assert_eq!(describe_event(&SessionEvent::FocusPrompt), None);
    }
}
