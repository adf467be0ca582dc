use std::fs;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use gbif_nl_search::app::{App, PageTurn, Pager, ProgressSink, SearchOptions};
use gbif_nl_search::config::{ConfigLoader, Settings};
use gbif_nl_search::domain::EntityKind;
use gbif_nl_search::error::SearchError;
use gbif_nl_search::fetch::{HttpTransport, RetryingFetcher};
use gbif_nl_search::output::{JsonOutput, OutputMode, TextOutput};
use gbif_nl_search::retry::ThreadSleeper;
use gbif_nl_search::search::SearchRequest;
use gbif_nl_search::translate::ChatCompletionsOracle;

#[derive(Parser)]
#[command(name = "gbif-nl")]
#[command(about = "Search GBIF preserved specimens in natural language")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Interpret a query and fetch one page of specimens")]
    Search(SearchArgs),
    #[command(about = "Fetch another page of an earlier search without interpreting it again")]
    Page(PageArgs),
    #[command(about = "Show the parameters a query is interpreted as")]
    Translate(TextArgs),
    #[command(about = "Print the GBIF search URL for a query without fetching it")]
    Url(SearchArgs),
    #[command(about = "Look up the GUID of an institution or collection")]
    Resolve(ResolveArgs),
}

#[derive(Args, Clone)]
struct TextArgs {
    query: String,
}

#[derive(Args, Clone)]
struct SearchArgs {
    query: String,

    #[arg(long, default_value_t = 0)]
    offset: u32,

    #[arg(long)]
    institution_code: Option<String>,

    #[arg(long)]
    collection_code: Option<String>,

    #[arg(long)]
    minimal: bool,

    #[arg(long, help = "Write the built request to this file for `gbif-nl page`")]
    save_request: Option<String>,
}

#[derive(Args, Clone)]
struct PageArgs {
    #[arg(long, help = "Stored request: a file path or the JSON itself")]
    request: String,

    #[arg(long, conflicts_with = "previous")]
    next: bool,

    #[arg(long)]
    previous: bool,

    #[arg(long)]
    minimal: bool,

    #[arg(long, help = "Write the request of the fetched page to this file")]
    save_request: Option<String>,
}

#[derive(Args, Clone)]
struct ResolveArgs {
    kind: EntityKind,
    name: String,
}

type HttpApp = App<ChatCompletionsOracle, RetryingFetcher<HttpTransport, ThreadSleeper>>;

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<SearchError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SearchError) -> u8 {
    if error.is_client_input() {
        2
    } else if error.is_retryable_later() {
        3
    } else {
        1
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    let settings = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Search(args) => run_search(args, &settings, output_mode),
        Commands::Page(args) => run_page(args, &settings, output_mode),
        Commands::Translate(args) => run_translate(args, &settings, output_mode),
        Commands::Url(args) => run_url(args, &settings, output_mode),
        Commands::Resolve(args) => run_resolve(args, &settings, output_mode),
    }
}

fn build_app(settings: &Settings) -> Result<HttpApp, SearchError> {
    let oracle = ChatCompletionsOracle::new(
        settings.oracle_url.as_str(),
        settings.require_api_key()?,
        settings.model.as_str(),
        settings.timeout,
    )?;
    let fetcher = RetryingFetcher::http(settings.retry)?;
    Ok(App::new(
        oracle,
        fetcher,
        &settings.gbif_api_base,
        settings.institution_key.clone(),
        settings.timeout,
    ))
}

fn sink(output_mode: OutputMode) -> &'static dyn ProgressSink {
    match output_mode {
        OutputMode::Interactive => &TextOutput,
        OutputMode::NonInteractive => &JsonOutput,
    }
}

fn options(args: &SearchArgs) -> SearchOptions {
    SearchOptions {
        institution_code: args.institution_code.clone(),
        collection_code: args.collection_code.clone(),
        offset: args.offset,
    }
}

/// Reads a stored request given inline as JSON or as a file path.
fn load_request(value: &str) -> Result<SearchRequest, SearchError> {
    if value.trim_start().starts_with('{') {
        return SearchRequest::from_json(value);
    }
    let content = fs::read_to_string(value)
        .map_err(|err| SearchError::InvalidRequest(format!("cannot read {value}: {err}")))?;
    SearchRequest::from_json(&content)
}

/// Saves the request when asked to and returns how to refer to it on the
/// command line.
fn request_ref(request: &SearchRequest, save_to: Option<&str>) -> miette::Result<String> {
    let json = request.to_json()?;
    match save_to {
        Some(path) => {
            fs::write(path, &json).into_diagnostic()?;
            Ok(path.to_string())
        }
        None => Ok(format!("'{}'", json.replace('\'', "'\\''"))),
    }
}

fn run_search(args: SearchArgs, settings: &Settings, output_mode: OutputMode) -> miette::Result<()> {
    let app = build_app(settings)?;
    let outcome = app.search(&args.query, &options(&args), sink(output_mode))?;
    let request_ref = request_ref(&outcome.request, args.save_request.as_deref())?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_search(&outcome, args.minimal).into_diagnostic(),
        OutputMode::Interactive => {
            TextOutput::print_search(&outcome, args.minimal, &request_ref);
            Ok(())
        }
    }
}

fn run_page(args: PageArgs, settings: &Settings, output_mode: OutputMode) -> miette::Result<()> {
    let request = load_request(&args.request)?;
    let turn = if args.next {
        PageTurn::Next
    } else if args.previous {
        PageTurn::Previous
    } else {
        PageTurn::Stay
    };
    let fetcher = RetryingFetcher::http(settings.retry)?;
    let pager = Pager::new(fetcher, settings.gbif_api_base.as_str(), settings.timeout);
    let outcome = pager.turn(&request, turn, sink(output_mode))?;
    let request_ref = request_ref(&outcome.request, args.save_request.as_deref())?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_page(&outcome, args.minimal).into_diagnostic(),
        OutputMode::Interactive => {
            TextOutput::print_page(&outcome, args.minimal, &request_ref);
            Ok(())
        }
    }
}

fn run_translate(args: TextArgs, settings: &Settings, output_mode: OutputMode) -> miette::Result<()> {
    let app = build_app(settings)?;
    let fields = app.translate(&args.query, sink(output_mode))?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_json(&fields).into_diagnostic(),
        OutputMode::Interactive => {
            TextOutput::print_fields(&fields);
            Ok(())
        }
    }
}

fn run_url(args: SearchArgs, settings: &Settings, output_mode: OutputMode) -> miette::Result<()> {
    let app = build_app(settings)?;
    let fields = app.translate(&args.query, sink(output_mode))?;
    let request = app.prepare(&fields, &options(&args), sink(output_mode))?;
    let url = app.url(&request);
    if let Some(path) = args.save_request.as_deref() {
        request_ref(&request, Some(path))?;
    }
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_json(&serde_json::json!({
            "fields": fields,
            "request": request,
            "url": url,
        }))
        .into_diagnostic(),
        OutputMode::Interactive => {
            println!("{url}");
            Ok(())
        }
    }
}

fn run_resolve(args: ResolveArgs, settings: &Settings, output_mode: OutputMode) -> miette::Result<()> {
    let fetcher = RetryingFetcher::http(settings.retry)?;
    let resolver = gbif_nl_search::resolve::EntityResolver::new(
        fetcher,
        settings.gbif_api_base.as_str(),
        settings.timeout,
    );
    let key = resolver.resolve(args.kind, &args.name);
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_json(&serde_json::json!({
            "kind": args.kind,
            "name": args.name,
            "key": key,
        }))
        .into_diagnostic(),
        OutputMode::Interactive => {
            match key {
                Some(key) => println!("{key}"),
                None => println!("no {} found for \"{}\"", args.kind, args.name),
            }
            Ok(())
        }
    }
}
