use docent::chunking::Chunker;
use docent::cli::{Cli, Commands, ConfigAction, QueryArgs};
use docent::config::Config;
use docent::error::{DocentError, Result};
use docent::retrieval::RetrievalScope;
use docent::session::{
    AnswerStatus, AskOptions, Capabilities, Document, IngestProgress, QueryOutcome, Session,
    SessionPipeline, RECENT_HISTORY,
};
use docent::vision::ImageInput;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            if let Some(provider) = e.provider_error() {
                eprintln!("  {}", provider.remediation());
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "docent=debug" } else { "docent=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ask {
            document,
            question,
            query,
            json,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_ask(config, &document, &question, &query, json)
        }
        Commands::Chat { document, query } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_chat(config, &document, &query)
        }
        Commands::Chunk { document, json } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_chunk(&config, &document, json)
        }
        Commands::Config { action } => cmd_config(cli.config, cli.profile, action),
    }
}

fn build_pipeline(config: Config) -> Result<SessionPipeline> {
    let capabilities = Capabilities::from_config(&config)?;
    SessionPipeline::new(config, capabilities)
}

fn ingest(
    pipeline: &SessionPipeline,
    session: &mut Session,
    document: &Path,
    image: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    let document = Document::from_path(document)?;
    let image = image.map(ImageInput::from_path).transpose()?;

    let report = pipeline.ingest(session, &document, image.as_ref(), |stage: IngestProgress| {
        if !quiet {
            eprintln!("[{:>3}%] {}", stage.percent(), stage);
        }
    })?;

    for warning in &report.warnings {
        eprintln!("⚠ {}", warning);
    }
    if !quiet && !report.reused {
        eprintln!(
            "✓ {} ready: {} chunks ({} from image), {}D, {}ms",
            document.name,
            report.chunks,
            report.image_chunks,
            report.dimension,
            report.duration.as_millis()
        );
    }

    Ok(())
}

fn ask_options(query: &QueryArgs, scope: Option<RetrievalScope>) -> AskOptions {
    AskOptions {
        model: query.model.clone(),
        scope: scope.or(query.scope),
        top_k: query.top_k,
    }
}

fn cmd_ask(config: Config, document: &Path, question: &str, query: &QueryArgs, json: bool) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let mut session = Session::new();

    ingest(&pipeline, &mut session, document, query.image.as_deref(), json)?;

    let outcome = pipeline.ask(&mut session, question, &ask_options(query, None))?;

    if json {
        let json = serde_json::to_string_pretty(&outcome).map_err(|e| DocentError::Json {
            source: e,
            context: "Failed to serialize answer".to_string(),
        })?;
        println!("{}", json);
    } else {
        print_outcome(&outcome, query.show_context);
    }

    Ok(())
}

fn print_outcome(outcome: &QueryOutcome, show_context: bool) {
    for warning in &outcome.warnings {
        eprintln!("⚠ {}", warning);
    }

    if show_context {
        println!("--- context ({} chunks, {:?} order) ---", outcome.context.units, outcome.ranking);
        println!("{}", outcome.context.text);
        println!("---");
    }

    println!("{}", outcome.answer);

    let marker = match outcome.status {
        AnswerStatus::Answered => "✓",
        AnswerStatus::Fallback => "✗",
    };
    eprintln!(
        "{} {} · {} · {}ms",
        marker,
        outcome.model,
        outcome.scope,
        outcome.latency.as_millis()
    );
}

fn cmd_chat(config: Config, document: &Path, query: &QueryArgs) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let mut session = Session::new();
    let mut scope = query.scope;

    ingest(&pipeline, &mut session, document, query.image.as_deref(), false)?;
    println!("Ask a question, or :help for commands.");

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next() else {
            break;
        };
        let line = line.map_err(|e| DocentError::Io {
            source: e,
            context: "Failed to read input".to_string(),
        })?;
        let line = line.trim();

        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix(':') {
            let (name, arg) = command
                .split_once(char::is_whitespace)
                .map(|(n, a)| (n, a.trim()))
                .unwrap_or((command, ""));

            match name {
                "q" | "quit" | "exit" => break,
                "help" => print_chat_help(),
                "history" => print_history(&session),
                "scope" => match arg.parse::<RetrievalScope>() {
                    Ok(s) => {
                        scope = Some(s);
                        println!("Scope set to {}", s);
                    }
                    Err(e) => eprintln!("{}", e),
                },
                "load" if !arg.is_empty() => {
                    let path = PathBuf::from(arg);
                    if let Err(e) = ingest(&pipeline, &mut session, &path, None, false) {
                        eprintln!("Error: {}", e);
                    }
                }
                _ => eprintln!("Unknown command :{} (try :help)", command),
            }
            continue;
        }

        match pipeline.ask(&mut session, line, &ask_options(query, scope)) {
            Ok(outcome) => print_outcome(&outcome, query.show_context),
            Err(e) => {
                eprintln!("Error: {}", e);
                if !session.is_ready() {
                    eprintln!("  The index was discarded; use :load <path> to index a document.");
                }
            }
        }
    }

    Ok(())
}

fn print_chat_help() {
    println!(":history          show the last {} exchanges", RECENT_HISTORY);
    println!(":load <path>      index another document");
    println!(":scope <s>        retrieve from all, text or image chunks");
    println!(":quit             leave");
}

fn print_history(session: &Session) {
    let recent = session.recent_history(RECENT_HISTORY);
    if recent.is_empty() {
        println!("No questions yet.");
        return;
    }

    for entry in recent {
        println!("[{}] Q: {}", entry.asked_at.format("%H:%M:%S"), entry.question);
        println!("           A: {}", entry.answer);
    }
}

fn cmd_chunk(config: &Config, document: &Path, json: bool) -> Result<()> {
    let document = Document::from_path(document)?;
    let chunker = Chunker::new(config.chunking.max_unit_size, config.chunking.overlap)?;
    let chunks = chunker.chunk(&document.text);

    if json {
        let json = serde_json::to_string_pretty(&chunks).map_err(|e| DocentError::Json {
            source: e,
            context: "Failed to serialize chunks".to_string(),
        })?;
        println!("{}", json);
        return Ok(());
    }

    for chunk in &chunks {
        println!(
            "#{} ({} chars, {} overlap)",
            chunk.index,
            chunk.char_len(),
            chunk.overlap
        );
        println!("{}\n", chunk.text);
    }
    eprintln!("✓ {} chunks from {}", chunks.len(), document.name);

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, profile: Option<String>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, profile)?;
            let content = toml::to_string_pretty(&config)?;
            println!("{}", content);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
            println!("  Profiles: {}", config.profiles.len());
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    let mut config = Config::load_or_default(&path)?;
    if let Some(profile) = profile {
        config.apply_profile(&profile)?;
        tracing::debug!("Applied profile {}", profile);
    }

    Ok(config)
}
