use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use flags::ModeFlag;
use reelqa_protocol::serialize_json;
use reelqa_search::{
    CaseReport, EvalCase, EvalSummary, IntentClassifier, Pipeline, QueryRewriter,
};
use runtime::RuntimePaths;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod doctor;
mod flags;
mod http_api;
mod llm;
mod report;
mod runtime;
mod server_security;

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "reelqa")]
#[command(about = "Grounded question answering over film articles", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// Override embedding backend in this process
    #[arg(long, global = true, value_enum)]
    embed_mode: Option<ModeFlag>,

    /// Override embedding model id
    #[arg(long, global = true)]
    embed_model: Option<String>,

    /// Override judge (cross-encoder) backend in this process
    #[arg(long, global = true, value_enum)]
    judge_mode: Option<ModeFlag>,

    /// Override judge model id
    #[arg(long, global = true)]
    judge_model: Option<String>,

    /// Model directory (overrides REELQA_MODEL_DIR)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Pipeline profile JSON (overrides REELQA_PROFILE)
    #[arg(long, global = true)]
    profile: Option<PathBuf>,

    /// Vector index artifact (overrides REELQA_INDEX_PATH)
    #[arg(long, global = true)]
    index: Option<PathBuf>,

    /// Chunk metadata artifact (overrides REELQA_METADATA_PATH)
    #[arg(long, global = true)]
    metadata: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question end to end
    Ask(AskArgs),

    /// Run retrieval only and show every stage
    Retrieve(RetrieveArgs),

    /// Show the intent and rewritten query for a question
    Classify(ClassifyArgs),

    /// Serve the query API over HTTP (POST /query, GET /health)
    ServeHttp(ServeArgs),

    /// Score the pipeline against a labelled dataset
    Eval(EvalArgs),

    /// Check models, profile and artifacts
    Doctor(DoctorArgs),

    /// Print the JSON Schemas of the HTTP payloads
    Schema,
}

#[derive(Args)]
struct AskArgs {
    /// Question about a film
    query: String,

    /// Print the full JSON response
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct RetrieveArgs {
    query: String,

    /// Print the full retrieval trace as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ClassifyArgs {
    query: String,
}

#[derive(Args)]
struct ServeArgs {
    /// Bind address
    #[arg(long, default_value = "127.0.0.1:8000")]
    bind: String,

    /// Allow binding to non-loopback addresses
    #[arg(long)]
    public: bool,

    /// Bearer token required on every request (or REELQA_AUTH_TOKEN)
    #[arg(long)]
    auth_token: Option<String>,
}

#[derive(Args)]
struct EvalArgs {
    /// Dataset JSON: {"name", "cases": [...]} or a bare list of cases
    dataset: PathBuf,

    /// Write the full run as JSON
    #[arg(long)]
    out_json: Option<PathBuf>,

    /// Write a markdown report
    #[arg(long)]
    out_md: Option<PathBuf>,

    /// Print the full run as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct DoctorArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct EvalDataset {
    #[serde(default = "default_schema_version")]
    schema_version: u32,
    name: Option<String>,
    cases: Vec<EvalCase>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DatasetFile {
    Wrapped(EvalDataset),
    Bare(Vec<EvalCase>),
}

const fn default_schema_version() -> u32 {
    1
}

#[derive(Serialize)]
struct EvalOutput {
    dataset: String,
    profile: String,
    summary: EvalSummary,
    skipped: usize,
    cases: Vec<CaseReport>,
}

#[derive(Serialize)]
struct ClassifyOutput<'a> {
    query: &'a str,
    intent: reelqa_search::Intent,
    rewritten_query: String,
}

pub async fn main_entry() -> Result<()> {
    let mut cli = Cli::parse();

    if let Some(model) = &cli.embed_model {
        env::set_var("REELQA_EMBEDDING_MODEL", model);
    }
    if let Some(mode) = cli.embed_mode {
        env::set_var("REELQA_EMBEDDING_MODE", mode.as_str());
    }
    if let Some(model) = &cli.judge_model {
        env::set_var("REELQA_JUDGE_MODEL", model);
    }
    if let Some(mode) = cli.judge_mode {
        env::set_var("REELQA_JUDGE_MODE", mode.as_str());
    }
    if let Some(dir) = &cli.model_dir {
        env::set_var("REELQA_MODEL_DIR", dir);
    }

    // Keep stdout clean for JSON consumers.
    let json_output = match &cli.command {
        Commands::Ask(args) => args.json,
        Commands::Retrieve(args) => args.json,
        Commands::Classify(_) => true,
        Commands::Eval(args) => args.json,
        Commands::Doctor(args) => args.json,
        Commands::Schema => true,
        Commands::ServeHttp(_) => false,
    };
    if json_output {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    // ORT is extremely noisy
    if !cli.verbose {
        builder.filter_module("ort", log::LevelFilter::Off);
    }
    builder.target(env_logger::Target::Stderr).init();

    let paths = RuntimePaths::resolve(cli.index, cli.metadata, cli.profile);

    match cli.command {
        Commands::Ask(args) => run_ask(args, &paths).await?,
        Commands::Retrieve(args) => run_retrieve(args, &paths).await?,
        Commands::Classify(args) => run_classify(&args)?,
        Commands::ServeHttp(args) => serve_http(args, &paths).await?,
        Commands::Eval(args) => run_eval(args, &paths).await?,
        Commands::Doctor(args) => run_doctor(&args, &paths)?,
        Commands::Schema => {
            print_stdout(&serde_json::to_string_pretty(&reelqa_protocol::api_schemas()?)?)?
        }
    }

    Ok(())
}

async fn run_ask(args: AskArgs, paths: &RuntimePaths) -> Result<()> {
    let context = runtime::build_context(paths)?;
    let generator = llm::ChatCompletionsGenerator::from_env()?;
    let outcome = Pipeline::new(&context)
        .process(&args.query, &generator)
        .await?;
    let response = outcome.to_response();

    if args.json {
        print_stdout(&serialize_json(&response)?)?;
        return Ok(());
    }

    print_stdout(&response.answer)?;
    eprintln!(
        "intent={} movie={} grounding={:.3} confidence={:.3} latency_ms={:.0}",
        outcome.intent,
        outcome.movie,
        response.hallucination_score,
        response.confidence,
        response.latency_ms
    );
    if response.is_hallucinated {
        eprintln!("Warning: the answer is not well supported by the retrieved passages");
    }
    for source in &response.sources {
        eprintln!(
            "  [{:.3}] {} / {} ({})",
            source.score, source.title, source.section, source.id
        );
    }
    Ok(())
}

async fn run_retrieve(args: RetrieveArgs, paths: &RuntimePaths) -> Result<()> {
    let context = runtime::build_context(paths)?;
    let trace = Pipeline::new(&context).retrieve(&args.query).await?;

    if args.json {
        print_stdout(&serialize_json(&trace)?)?;
        return Ok(());
    }

    eprintln!(
        "intent={} candidates={} filtered={} reranked={} evidence={}",
        trace.intent,
        trace.candidates.len(),
        trace.filtered.len(),
        trace.reranked.len(),
        trace.evidence.len()
    );
    eprintln!("rewritten: {}", trace.rewritten_query);
    for fused in &trace.fused {
        let chunk = fused.reranked.chunk();
        print_stdout(&format!(
            "{:.3}\t{}\t{}\t{}",
            fused.final_score, chunk.chunk_id, chunk.title, chunk.section
        ))?;
    }
    Ok(())
}

fn run_classify(args: &ClassifyArgs) -> Result<()> {
    let intent = IntentClassifier::classify(&args.query);
    let output = ClassifyOutput {
        query: &args.query,
        intent,
        rewritten_query: QueryRewriter::rewrite(&args.query, intent),
    };
    print_stdout(&serialize_json(&output)?)
}

async fn run_eval(args: EvalArgs, paths: &RuntimePaths) -> Result<()> {
    let (name, cases) = load_dataset(&args.dataset)?;
    let context = runtime::build_context(paths)?;
    let generator = llm::ChatCompletionsGenerator::from_env()?;
    let pipeline = Pipeline::new(&context);

    let mut reports = Vec::with_capacity(cases.len());
    let mut skipped = 0;
    for (idx, case) in cases.iter().enumerate() {
        match pipeline.evaluate(case, &generator).await {
            Ok(report) => {
                log::info!(
                    "[{}/{}] {} -> grounding={:.3} exact={}",
                    idx + 1,
                    cases.len(),
                    case.query,
                    report.hallucination_score,
                    report.exact_match.exact_match
                );
                reports.push(report);
            }
            Err(err) => {
                log::warn!("Skipping case '{}' ({}): {err}", case.query, err.code());
                skipped += 1;
            }
        }
    }

    let summary = EvalSummary::from_reports(&reports);
    let output = EvalOutput {
        dataset: name,
        profile: context.profile().name.clone(),
        summary,
        skipped,
        cases: reports,
    };

    if let Some(path) = &args.out_json {
        write_file(path, &serde_json::to_string_pretty(&output)?)?;
    }
    if let Some(path) = &args.out_md {
        let md =
            report::render_eval_report(&output.dataset, &output.profile, &output.cases, &summary);
        write_file(path, &md)?;
    }

    if args.json {
        print_stdout(&serde_json::to_string_pretty(&output)?)?;
    } else {
        eprintln!(
            "cases={} skipped={} precision@k={:.3} recall@k={:.3} hallucination={:.3} exact_match={:.3}",
            summary.cases,
            skipped,
            summary.mean_precision_at_k,
            summary.mean_recall_at_k,
            summary.mean_hallucination_score,
            summary.exact_match_rate
        );
    }
    Ok(())
}

fn load_dataset(path: &Path) -> Result<(String, Vec<EvalCase>)> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset {}", path.display()))?;
    let file: DatasetFile = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid dataset {}", path.display()))?;
    let fallback_name = || {
        path.file_stem()
            .map_or_else(|| "dataset".to_string(), |s| s.to_string_lossy().into_owned())
    };
    match file {
        DatasetFile::Wrapped(dataset) => {
            if dataset.schema_version != 1 {
                anyhow::bail!(
                    "Unsupported dataset schema_version {} (expected 1)",
                    dataset.schema_version
                );
            }
            Ok((dataset.name.unwrap_or_else(fallback_name), dataset.cases))
        }
        DatasetFile::Bare(cases) => Ok((fallback_name(), cases)),
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}

fn run_doctor(args: &DoctorArgs, paths: &RuntimePaths) -> Result<()> {
    let report = doctor::doctor(paths)?;
    let ok = report.ok();

    if args.json {
        print_stdout(&serde_json::to_string_pretty(&report)?)?;
    } else {
        eprintln!("Model dir: {}", report.model_dir);
        match &report.profile_error {
            None => eprintln!("Profile: {}", report.profile),
            Some(err) => eprintln!("Profile: error ({err})"),
        }
        for (label, item) in [("Embedding", &report.embedding), ("Judge", &report.judge)] {
            eprintln!("{label} mode/model: {} / {}", item.mode, item.model);
            if let Some(err) = &item.error {
                eprintln!("  - error: {err}");
            }
            for miss in &item.missing_assets {
                eprintln!("  - missing: {miss}");
            }
        }
        for (label, artifact) in [("Index", &report.index), ("Metadata", &report.metadata)] {
            let state = if artifact.exists { "ok" } else { "missing" };
            eprintln!("{label}: {} ({state})", artifact.path);
        }
        eprintln!(
            "LLM: {} via {} (api key {})",
            report.llm_model,
            report.llm_endpoint,
            if report.llm_api_key_set { "set" } else { "not set" }
        );
    }

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn serve_http(args: ServeArgs, paths: &RuntimePaths) -> Result<()> {
    let plan =
        server_security::plan_serve(&args.bind, args.public, args.auth_token.as_deref()).await?;

    let context = Arc::new(runtime::build_context(paths)?);
    if let Err(err) = context.warm_up() {
        log::warn!("Warm-up incomplete, queries will retry loading: {err}");
    }
    let generator = Arc::new(llm::ChatCompletionsGenerator::from_env()?);
    let auth_enabled = plan.auth_token.is_some();
    let app = http_api::router(http_api::HttpState {
        context,
        generator,
        auth_token: plan.auth_token,
    });

    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    let local_addr = listener.local_addr()?;
    let base_url = format!("http://{local_addr}");

    print_stdout(&format!("Serving query API: {base_url}/query"))?;
    print_stdout(&format!("Health endpoint: {base_url}/health"))?;
    if auth_enabled {
        print_stdout(&format!(
            "Auth enabled: add header 'Authorization: Bearer ${}'",
            server_security::AUTH_TOKEN_ENV
        ))?;
    }
    if args.public {
        let addrs = plan
            .addrs
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        print_stdout(&format!(
            "Public bind enabled (--public). Resolved addresses: {addrs}"
        ))?;
    }
    print_stdout(&format!(
        "Try: curl -X POST {base_url}/query -H 'Content-Type: application/json' -d '{{\"query\": \"Who directed Heat?\"}}'"
    ))?;

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn dataset_accepts_wrapped_and_bare_forms() {
        let temp = TempDir::new().unwrap();
        let wrapped = temp.path().join("films.json");
        fs::write(
            &wrapped,
            r#"{"schema_version": 1, "name": "films", "cases": [
                {"query": "Who directed Heat?", "relevant": ["michael mann"], "ground_truth": "Michael Mann"}
            ]}"#,
        )
        .unwrap();
        let (name, cases) = load_dataset(&wrapped).unwrap();
        assert_eq!(name, "films");
        assert_eq!(cases[0].relevant, vec!["michael mann".to_string()]);

        let bare = temp.path().join("golden.json");
        fs::write(
            &bare,
            r#"[{"query": "How does Heat end?", "relevant_chunks": ["runway"], "ground_truth": "McCauley dies."}]"#,
        )
        .unwrap();
        let (name, cases) = load_dataset(&bare).unwrap();
        assert_eq!(name, "golden");
        assert_eq!(cases[0].relevant, vec!["runway".to_string()]);
    }

    #[test]
    fn dataset_rejects_future_schema() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("v2.json");
        fs::write(&path, r#"{"schema_version": 2, "cases": []}"#).unwrap();
        let err = load_dataset(&path).unwrap_err();
        assert!(format!("{err:#}").contains("schema_version 2"));
    }
}
