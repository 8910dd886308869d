use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result, WrapErr, miette};
use recurate_core::transcript::{
    TranscriptResponse, find_active_session, find_project_dir, read_recent,
};
use recurate_core::{
    Annotation, FeedbackFormatter, Fragment, PanelMessage, RenderStrategy, ResponseExtracted,
    ResponseSession, render,
};

mod config;
mod markdown;
mod replay;

use config::CliConfig;
use markdown::render_markdown;

#[derive(Parser)]
#[command(version, about = "Recurate - annotate assistant responses and turn them into feedback", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to config file
    #[arg(long, global = true, env = "RECURATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the latest response of a transcript as a panel message
    Latest {
        /// Transcript file (JSONL). Defaults to the active session of the workspace
        transcript: Option<PathBuf>,

        /// Emit the N most recent responses as RESPONSE_HISTORY
        #[arg(long)]
        history: Option<usize>,

        /// Workspace used to locate the transcript
        #[arg(long)]
        workspace: Option<PathBuf>,
    },
    /// Print the feedback block for a JSON array of annotations
    Feedback {
        annotations: PathBuf,

        /// Max chars quoted per annotation
        #[arg(long)]
        max_quote_chars: Option<usize>,
    },
    /// Print a response's markup with overlays applied
    Render {
        /// JSON object with html, text and messageId
        response: PathBuf,

        /// JSON array of annotations
        #[arg(long)]
        annotations: Option<PathBuf>,

        #[arg(long, value_enum)]
        strategy: Option<Strategy>,
    },
    /// Run a JSONL command script through a session
    Replay { script: PathBuf },
    /// Print the transcript directory for a workspace
    FindProject {
        /// Defaults to the current directory
        workspace: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    DomOverlay,
    TextRebuild,
}

impl From<Strategy> for RenderStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::DomOverlay => RenderStrategy::DomOverlay,
            Strategy::TextRebuild => RenderStrategy::TextRebuild,
        }
    }
}

fn main() -> Result<()> {
    init_miette();
    init_tracing();

    let cli = Cli::parse();
    let config = CliConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Latest {
            transcript,
            history,
            workspace,
        } => {
            let transcript = match transcript {
                Some(path) => path,
                None => locate_transcript(&config, workspace)?,
            };
            let message = latest_message(&transcript, history)?;
            println!("{}", message.to_json().into_diagnostic()?);
        }
        Commands::Feedback {
            annotations,
            max_quote_chars,
        } => {
            let mut annotations = read_annotations(&annotations)?;
            annotations.sort_by_key(|a| (a.start_offset, a.created_at));
            let formatter = FeedbackFormatter::new(
                max_quote_chars.unwrap_or(config.session.max_quote_chars),
            );
            println!("{}", formatter.format(&annotations));
        }
        Commands::Render {
            response,
            annotations,
            strategy,
        } => {
            let response: ResponseExtracted = read_json(&response)?;
            let annotations = match annotations {
                Some(path) => read_annotations(&path)?,
                None => Vec::new(),
            };
            let strategy = strategy.map(Into::into).unwrap_or(config.session.strategy);
            println!("{}", render_response(strategy, &response, annotations)?);
        }
        Commands::Replay { script } => {
            let script = fs::read_to_string(&script)
                .into_diagnostic()
                .wrap_err_with(|| format!("reading {}", script.display()))?;
            let mut session = ResponseSession::new(config.session.clone());
            let changed = replay::run_script(&mut session, &script)?;
            tracing::info!(changed, responses = session.history_len(), "replay finished");

            println!("{}", session.current_overlay_markup());
            let feedback = session.feedback_text();
            if !feedback.is_empty() {
                println!();
                println!("{}", feedback);
            }
        }
        Commands::FindProject { workspace } => {
            let dir = project_dir(&config, workspace)?;
            println!("{}", dir.display());
        }
    }

    Ok(())
}

fn init_tracing() {
    let default_level = if cfg!(debug_assertions) { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents)
        .into_diagnostic()
        .wrap_err_with(|| format!("parsing {}", path.display()))
}

fn read_annotations(path: &Path) -> Result<Vec<Annotation>> {
    read_json(path)
}

/// Pair transcript markdown with its rendered markup.
///
/// `text` is the text content of the markup so offsets line up with what a
/// panel would select.
fn extract(response: TranscriptResponse) -> ResponseExtracted {
    let html = render_markdown(&response.text);
    let text = Fragment::parse(&html).text_content();
    ResponseExtracted {
        html,
        text,
        message_id: response.message_id,
    }
}

fn latest_message(transcript: &Path, history: Option<usize>) -> Result<PanelMessage> {
    let limit = history.unwrap_or(1).max(1);
    let responses = read_recent(transcript, limit).into_diagnostic()?;
    tracing::debug!(count = responses.len(), transcript = %transcript.display(), "read responses");

    if history.is_some() {
        return Ok(PanelMessage::ResponseHistory {
            responses: responses.into_iter().map(extract).collect(),
        });
    }
    let latest = responses
        .into_iter()
        .next()
        .map(extract)
        .ok_or_else(|| miette!("no assistant responses in {}", transcript.display()))?;
    Ok(PanelMessage::ResponseReady {
        html: latest.html,
        text: latest.text,
        message_id: latest.message_id,
    })
}

fn render_response(
    strategy: RenderStrategy,
    response: &ResponseExtracted,
    mut annotations: Vec<Annotation>,
) -> Result<String> {
    let text = match strategy {
        RenderStrategy::DomOverlay => Fragment::parse(&response.html).text_content(),
        RenderStrategy::TextRebuild => response.text.clone(),
    };
    let len = text.chars().count();
    for annotation in &annotations {
        annotation
            .validate(len)
            .into_diagnostic()
            .wrap_err_with(|| format!("annotation {}", annotation.id))?;
    }
    annotations.sort_by_key(|a| (a.start_offset, a.created_at));
    if let Some(pair) = annotations
        .windows(2)
        .find(|pair| pair[0].end_offset > pair[1].start_offset)
    {
        return Err(miette!(
            "annotations {} and {} overlap",
            pair[0].id,
            pair[1].id
        ));
    }
    Ok(render(strategy, &response.html, &text, &annotations))
}

fn project_dir(config: &CliConfig, workspace: Option<PathBuf>) -> Result<PathBuf> {
    let workspace = match workspace {
        Some(dir) => dir,
        None => std::env::current_dir().into_diagnostic()?,
    };
    let workspace = workspace.canonicalize().unwrap_or(workspace);
    let root = config
        .projects_dir()
        .ok_or_else(|| miette!("could not determine the transcript directory"))?;
    find_project_dir(&root, &workspace).ok_or_else(|| {
        miette!(
            "no transcripts for {} under {}",
            workspace.display(),
            root.display()
        )
    })
}

fn locate_transcript(config: &CliConfig, workspace: Option<PathBuf>) -> Result<PathBuf> {
    let dir = project_dir(config, workspace)?;
    find_active_session(&dir)
        .ok_or_else(|| miette!("no session transcripts in {}", dir.display()))
}

fn init_miette() {
    let hook = miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }));
    if hook.is_err() {
        eprintln!("couldn't set the miette hook");
    }
    miette::set_panic_hook();
}
