use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use evidence_engine::{
    config::{Config, LogFormat},
    error::EngineError,
    evidence::{EvidenceChunk, EvidenceFilter, EvidenceType, Session},
    langbase::LangbaseClient,
    modes::{EvidenceEngine, ModeCore, PipelineOutput, UNATTRIBUTED_SOURCE},
    services::LangbaseServices,
    storage::{SessionStore, SqliteStorage},
};

/// Evidence-backed product discovery from the command line.
#[derive(Debug, Parser)]
#[command(name = "evidence-engine", version, about)]
struct Cli {
    /// Session to work in; created if it does not exist.
    #[arg(long, global = true)]
    session: Option<String>,

    /// Render results as markdown instead of JSON.
    #[arg(long, global = true)]
    markdown: bool,

    /// Do not create or update the Langbase pipes before running.
    #[arg(long, global = true)]
    skip_setup: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Route a free-form utterance to the right mode.
    Ask {
        #[arg(required = true, num_args = 1..)]
        utterance: Vec<String>,
    },
    /// Extract evidence from text, a file, or stdin.
    Extract {
        /// Where the text came from, e.g. "Interview with Dana".
        #[arg(long)]
        source: Option<String>,
        /// Read the text from this file.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Store the text as one chunk without calling the extraction service.
        #[arg(long)]
        raw: bool,
        /// Evidence type used with --raw.
        #[arg(long = "type", default_value = "user_quote")]
        evidence_type: String,
        text: Vec<String>,
    },
    /// Test a hypothesis against the session's evidence.
    Test {
        #[arg(required = true, num_args = 1..)]
        statement: Vec<String>,
    },
    /// Test the negation of an assumption.
    Challenge {
        #[arg(required = true, num_args = 1..)]
        statement: Vec<String>,
    },
    /// Score a claim without recording a verdict.
    Confidence {
        #[arg(required = true, num_args = 1..)]
        statement: Vec<String>,
    },
    /// Cluster evidence into themes and report gaps.
    Patterns {
        /// Only consider chunks of this type.
        #[arg(long = "type")]
        evidence_type: Option<String>,
    },
    /// Stakeholder report on the latest verdict, or on patterns.
    Report,
    /// List stored sessions.
    Sessions,
    /// Print a stored session.
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Evidence engine starting..."
    );

    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    match &cli.command {
        Command::Sessions => {
            let sessions = storage.list_sessions().await?;
            if cli.markdown {
                for s in &sessions {
                    println!(
                        "- {} {} ({} chunk(s), {} verdict(s), updated {})",
                        s.id,
                        s.title.as_deref().unwrap_or(""),
                        s.chunk_count,
                        s.verdict_count,
                        s.updated_at.to_rfc3339()
                    );
                }
            } else {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
            }
            return Ok(());
        }
        Command::Show => {
            let id = cli.session.as_deref().context("--session is required for show")?;
            let session = storage
                .get_session(id)
                .await?
                .with_context(|| format!("Session not found: {}", id))?;
            if cli.markdown {
                println!("# Session {}\n", session.id);
                println!("{}\n", session.context_summary().describe());
                for chunk in session.evidence.current() {
                    println!("- [{}] {} ({})", chunk.evidence_type, chunk.text, chunk.id);
                }
                for verdict in session.verdicts() {
                    let statement = session
                        .hypothesis(&verdict.hypothesis_id)
                        .map(|h| h.statement.as_str())
                        .unwrap_or("?");
                    println!(
                        "\n**{}**: {} ({:.2})",
                        statement, verdict.verdict_kind, verdict.confidence
                    );
                }
            } else {
                println!("{}", serde_json::to_string_pretty(&session)?);
            }
            return Ok(());
        }
        _ => {}
    }

    let (mut session, is_new) = load_session(&storage, cli.session.as_deref()).await?;

    let langbase = match LangbaseClient::new(&config.langbase, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %config.langbase.base_url, "Langbase client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize Langbase client");
            return Err(e.into());
        }
    };
    let services = LangbaseServices::from_config(langbase, &config);

    if !cli.skip_setup {
        info!("Ensuring required Langbase pipes exist...");
        if let Err(e) = services.ensure_pipes().await {
            error!(error = %e, "Failed to ensure pipes exist");
            return Err(e.into());
        }
    }

    let engine = EvidenceEngine::new(ModeCore::from_langbase(services), config.engine.clone());
    session
        .evidence
        .set_duplicate_similarity(config.engine.duplicate_similarity);

    let output = match &cli.command {
        Command::Ask { utterance } => {
            let run = engine.run(&session, &utterance.join(" ")).await?;
            session = run.session;
            run.output
        }
        Command::Extract {
            source,
            file,
            raw,
            evidence_type,
            text,
        } => {
            let text = read_input(file.as_ref(), text)?;
            if *raw {
                let evidence_type: EvidenceType = evidence_type.parse().map_err(anyhow::Error::msg)?;
                let chunk = EvidenceChunk::new(
                    text,
                    evidence_type,
                    source.clone().unwrap_or_else(|| UNATTRIBUTED_SOURCE.to_string()),
                )?;
                let stored = session.evidence.add(chunk)?.clone();
                println!("Stored {} as {}", stored.id, stored.evidence_type);
                save_session(&storage, &mut session, is_new).await?;
                return Ok(());
            }
            match engine.extract(&mut session, &text, source.as_deref()).await {
                Ok(result) => PipelineOutput::Extraction(result),
                Err(e @ EngineError::ExtractionParse { .. }) => {
                    eprintln!("{}", e);
                    eprintln!("Re-run with --raw to store the text as a single unclassified chunk.");
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Test { statement } => {
            PipelineOutput::HypothesisTest(engine.test_hypothesis(&mut session, &statement.join(" ")).await?)
        }
        Command::Challenge { statement } => PipelineOutput::AssumptionChallenge(
            engine
                .challenge_assumption(&mut session, &statement.join(" "))
                .await?,
        ),
        Command::Confidence { statement } => {
            PipelineOutput::ConfidenceAssessment(engine.assess_confidence(&session, &statement.join(" ")).await?)
        }
        Command::Patterns { evidence_type } => {
            let mut filter = EvidenceFilter::new();
            if let Some(t) = evidence_type {
                filter = filter.of_type(t.parse().map_err(anyhow::Error::msg)?);
            }
            PipelineOutput::Patterns(engine.find_patterns(&session, filter).await)
        }
        Command::Report => PipelineOutput::Report(engine.report(&session).await),
        Command::Sessions | Command::Show => return Ok(()),
    };

    if let Some(intent) = output.intent() {
        session.last_intent = Some(intent);
    }
    save_session(&storage, &mut session, is_new).await?;

    if cli.markdown {
        print!("{}", output.to_markdown());
    } else {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    info!(session_id = %session.id, "Done");
    Ok(())
}

/// Load the named session, or start a new one.
async fn load_session(storage: &SqliteStorage, id: Option<&str>) -> anyhow::Result<(Session, bool)> {
    if let Some(id) = id {
        if let Some(session) = storage.get_session(id).await? {
            return Ok((session, false));
        }
        let mut session = Session::new();
        session.id = id.to_string();
        return Ok((session, true));
    }
    let session = Session::new();
    warn!(session_id = %session.id, "No --session given, starting a new session");
    eprintln!("Session: {}", session.id);
    Ok((session, true))
}

async fn save_session(storage: &SqliteStorage, session: &mut Session, is_new: bool) -> anyhow::Result<()> {
    session.touch();
    if is_new {
        storage.create_session(session).await?;
    } else {
        storage.save_session(session).await?;
    }
    Ok(())
}

fn read_input(file: Option<&PathBuf>, words: &[String]) -> anyhow::Result<String> {
    if let Some(path) = file {
        return std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()));
    }
    if !words.is_empty() {
        return Ok(words.join(" "));
    }
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read stdin")?;
    Ok(buffer)
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
