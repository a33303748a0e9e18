mod cli;

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use nexa_sync::config::{ENV_CONFIG_FILE, ENV_PROFILE, config_file_path, env_lookup, load_file_config};
use nexa_sync::connection::ConnectionState;
use nexa_sync::document::{Page, clean_document, footnotes, paginate_with_budget};
use nexa_sync::events::SyncEvent;
use nexa_sync::stream::http::{ResearchRequest, open_research_stream, stream_client};
use nexa_sync::stream::{self, CancelFlag, StreamOutcome};
use nexa_sync::{
    CanvasStore, ChatMessage, EventSink, ProjectView, ResearchSession, SnapshotClient, SyncConfig, SyncHub,
    WsTransport,
};

use crate::cli::{Cli, Command};

const PUMP_INTERVAL: Duration = Duration::from_millis(250);
const CONNECT_WAIT: Duration = Duration::from_secs(15);

fn init_tracing() {
    let filter = EnvFilter::try_from_env("NEXA_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<SyncConfig, Box<dyn std::error::Error>> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => match env_lookup(ENV_CONFIG_FILE) {
            Some(path) => PathBuf::from(path),
            None => config_file_path(&std::env::current_dir()?),
        },
    };
    let file = load_file_config(&path)?;
    if file.is_some() {
        tracing::debug!(path = %path.display(), "loaded config file");
    }

    let profile = cli.profile.clone();
    let mut config = SyncConfig::resolve(file.as_ref(), |name| {
        if name == ENV_PROFILE && profile.is_some() {
            return profile.clone();
        }
        env_lookup(name)
    })?;
    if let Some(url) = &cli.backend {
        config.set_backend_url(url)?;
    }
    if let Some(url) = &cli.ws_url {
        config.ws_url = url::Url::parse(url)?;
    }
    Ok(config)
}

fn describe(event: &SyncEvent) -> String {
    match event {
        SyncEvent::ConnectionStatus(data) => {
            if data.connected { "connected".into() } else { "disconnected".into() }
        }
        SyncEvent::ProjectThinking(data) => data.status.clone(),
        SyncEvent::ProjectToken(data) => format!("{:?}", data.token),
        SyncEvent::ProjectCanvas(data) => {
            let ids: Vec<&str> = data.canvas_updates.iter().map(|u| u.id.as_str()).collect();
            format!("sections: {}", ids.join(", "))
        }
        SyncEvent::ProjectError(data) => data.error.clone(),
        SyncEvent::PipelineProgress(data) | SyncEvent::ResearchPipeline(data) => {
            format!("current: {}", data.current_agent.as_deref().unwrap_or("-"))
        }
        SyncEvent::AgentMessage(data) | SyncEvent::ResearchAgentMessage(data) => {
            format!("{} ({}): {}", data.agent_name, data.message_type, data.message)
        }
        SyncEvent::StepUpdate(step) => format!("step {} {}", step.step_number, step.kind),
        SyncEvent::ChainError(error) => error.clone(),
        SyncEvent::MetricsUpdate(data) => format!(
            "{} in={} out={} {:.0}ms",
            data.agent_id, data.input_tokens, data.output_tokens, data.latency_ms
        ),
        SyncEvent::RagContent(data) => format!("{}: {}", data.action, data.content),
        _ => String::new(),
    }
}

fn print_pages(pages: &[Page]) {
    let total = pages.len();
    for (index, page) in pages.iter().enumerate() {
        if index > 0 {
            println!();
        }
        println!("{}", page.render(total));
    }
}

fn run_watch(config: &SyncConfig, seconds: Option<u64>, as_json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let hub = SyncHub::new(config, WsTransport::new());
    let store = CanvasStore::new();
    let _canvas = store.attach(&hub);
    let _printer = hub.subscribe(move |event| {
        if as_json {
            println!("{}", event.to_frame());
        } else {
            println!("[{}] {}", event.kind(), describe(event));
        }
    });

    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs(s));
    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        hub.pump(PUMP_INTERVAL);
        let status = hub.status();
        if status.exhausted {
            eprintln!("Giving up after {} reconnect attempts.", status.retry_count);
            break;
        }
    }
    hub.disconnect();

    let summary = store.canvas().summary();
    eprintln!(
        "Canvas: {}/{} sections ({}%) after {} update batches",
        summary.completion.completed,
        summary.completion.total,
        summary.completion.percentage,
        store.batches_applied()
    );
    Ok(())
}

fn run_research(
    config: &SyncConfig,
    message: String,
    data: Option<PathBuf>,
    resume: bool,
    timeout_secs: Option<u64>,
    budget: usize,
    as_json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = match data {
        Some(path) => ResearchSession::from_text(fs::read_to_string(path)?),
        None if resume => ResearchSession::from_text(SnapshotClient::new(config).fetch_research_data()?),
        None => ResearchSession::new(),
    };

    let client = stream_client(timeout_secs.map(Duration::from_secs))?;
    let request = ResearchRequest::new(message, session.research_data());
    let response = open_research_stream(&client, config, &request)?;

    let cancel = CancelFlag::new();
    let mut shown = 0;
    let mut stderr = io::stderr();
    let (outcome, document) = stream::assemble(response, &cancel, session.begin_pass(), |doc| {
        let preview = doc.preview();
        if preview.len() > shown && preview.is_char_boundary(shown) {
            let _ = write!(stderr, "{}", &preview[shown..]);
            let _ = stderr.flush();
            shown = preview.len();
        }
    })?;
    eprintln!();

    match outcome {
        StreamOutcome::Completed => {}
        StreamOutcome::Ended => tracing::warn!("stream ended without a done record; using the preview"),
        StreamOutcome::Cancelled => {
            eprintln!("Research cancelled.");
            return Ok(());
        }
    }
    let text = document.visible_text();
    let pages = paginate_with_budget(&text, document.footnotes(), budget);
    session.complete_pass(&document);

    if as_json {
        let out = json!({
            "outcome": outcome,
            "footnotes": document.footnotes(),
            "fact_check_failures": document.fact_check_failures(),
            "pages": pages,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_pages(&pages);
    }
    Ok(())
}

fn run_project(config: &SyncConfig, message: String, seconds: u64) -> Result<(), Box<dyn std::error::Error>> {
    let snapshots = SnapshotClient::new(config);
    let hub = SyncHub::new(config, WsTransport::new());
    let store = CanvasStore::new();
    let view = ProjectView::new();
    let _canvas = store.attach(&hub);
    let _view = view.attach(&hub);
    let _tokens = hub.subscribe(|event| match event {
        SyncEvent::ProjectToken(data) => {
            print!("{}", data.token);
            let _ = io::stdout().flush();
        }
        SyncEvent::AgentMessage(data) => eprintln!("\n[{}] {}", data.agent_name, data.message),
        _ => {}
    });

    match snapshots.fetch_canvas() {
        Ok(canvas) => store.reconcile(canvas),
        Err(err) => tracing::warn!(%err, "canvas snapshot unavailable; starting empty"),
    }

    if !hub.pump_until(CONNECT_WAIT, || hub.status().state == ConnectionState::Open) {
        return Err(format!("socket did not open within {}s", CONNECT_WAIT.as_secs()).into());
    }

    view.begin_turn();
    snapshots.post_project_message(&[ChatMessage::user(message)], &store.canvas().to_updates())?;
    let finished = hub.pump_until(Duration::from_secs(seconds), || view.state().is_finished());
    hub.disconnect();
    println!();

    let state = view.state();
    if let Some(error) = &state.error {
        return Err(format!("project turn failed: {error}").into());
    }
    if !finished {
        eprintln!("Timed out after {seconds}s; showing partial state.");
    }
    println!("{}", state.display_text());
    println!();
    println!("{}", store.canvas().export_for_prompt());
    Ok(())
}

fn run_canvas(config: &SyncConfig, as_json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let canvas = SnapshotClient::new(config).fetch_canvas()?;
    if as_json {
        let out = json!({ "canvas": canvas, "summary": canvas.summary() });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }
    println!("{}", canvas.export_for_prompt());
    let completion = canvas.completion();
    println!();
    println!(
        "Completion: {}/{} ({}%)",
        completion.completed, completion.total, completion.percentage
    );
    if let Some(research) = &canvas.researcher.content {
        println!("Research: {} queries, {} sources", research.queries.len(), research.sources.len());
    }
    Ok(())
}

fn run_paginate(
    file: PathBuf,
    fact_check: Option<PathBuf>,
    budget: usize,
    as_json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = clean_document(&fs::read_to_string(&file)?);
    let mut notes = Vec::new();
    if let Some(path) = fact_check {
        footnotes::append_batch(&mut notes, footnotes::extract_footnotes(&fs::read_to_string(path)?));
    }
    let pages = paginate_with_budget(&text, &notes, budget);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&pages)?);
    } else {
        print_pages(&pages);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    if let Command::Paginate {
        file,
        fact_check,
        budget,
        json,
    } = cli.command
    {
        return run_paginate(file, fact_check, budget, json);
    }

    let config = load_config(&cli)?;
    tracing::debug!(profile = ?config.profile, backend = %config.backend_url, ws = %config.ws_url, "resolved config");

    match cli.command {
        Command::Watch { seconds, json } => run_watch(&config, seconds, json),
        Command::Research {
            message,
            data,
            resume,
            timeout_secs,
            budget,
            json,
        } => run_research(&config, message, data, resume, timeout_secs, budget, json),
        Command::Project { message, seconds } => run_project(&config, message, seconds),
        Command::Canvas { json } => run_canvas(&config, json),
        Command::Paginate { .. } => Ok(()),
    }
}
