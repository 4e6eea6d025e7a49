use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use anompa_rs::view::{self, normalize_text};
use anompa_rs::{
    Client, ClientConfig, Controller, HistoryEntry, HistoryStore, SearchResultEntry, SearchScope,
    SearchSnapshot,
};
use atty::Stream;
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "anompa", about = "Search and browse Chickasaw vocabulary", version)]
pub struct Cli {
    /// Emit JSON instead of human-readable tables.
    #[arg(long, global = true)]
    json: bool,

    /// Base URL of the content API.
    #[arg(long, global = true, env = "ANOMPA_API_BASE")]
    api_base: Option<String>,

    /// Host that relative media paths are resolved against.
    #[arg(long, global = true, env = "ANOMPA_MEDIA_HOST")]
    media_host: Option<String>,

    /// File holding the persisted search history.
    #[arg(long, global = true, env = "ANOMPA_HISTORY_FILE")]
    history_file: Option<PathBuf>,

    /// Request timeout in seconds.
    #[arg(long, global = true, env = "ANOMPA_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Start with an empty history instead of the default shortcuts.
    #[arg(long, global = true)]
    no_seed: bool,

    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search words and categories.
    Search {
        /// Text to search for.
        query: String,
        /// Select the Nth result (1-based) and record it in history.
        #[arg(long)]
        pick: Option<usize>,
        /// Restrict results to words or categories.
        #[arg(long, default_value = "all")]
        scope: SearchScope,
    },
    /// List all categories.
    Categories,
    /// List the words in a category.
    Words {
        /// Category identifier.
        category_id: String,
    },
    /// Show the detail for a word.
    Word {
        /// Word to look up.
        name: String,
        /// Prefer a match from this category.
        #[arg(long)]
        category: Option<String>,
    },
    /// Show recent searches.
    History {
        /// Forget all recent searches.
        #[arg(long)]
        clear: bool,
    },
    /// Interactive search: each line updates the query.
    Browse,
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = client_config(&cli);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(dispatch(cli, config))
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "anompa_rs=debug,anompa=debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| fallback.into());
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn client_config(cli: &Cli) -> ClientConfig {
    let mut config = ClientConfig::default();
    if let Some(base) = &cli.api_base {
        config.api.base_url = base.clone();
    }
    if let Some(secs) = cli.timeout_secs {
        config.api.timeout_ms = secs.max(1) * 1_000;
    }
    if let Some(host) = &cli.media_host {
        config.media_host = host.clone();
    }
    if let Some(path) = &cli.history_file {
        config.history.path = path.clone();
    }
    config.history.seed_defaults = !cli.no_seed;
    if let Command::Search { scope, .. } = &cli.command {
        config.search.scope = *scope;
    }
    config
}

async fn dispatch(cli: Cli, config: ClientConfig) -> Result<(), Box<dyn Error>> {
    let client = Client::new(config)?;
    debug!(base = %client.api.base_url(), "client ready");
    match cli.command {
        Command::Search { query, pick, .. } => handle_search(&client, query, pick, cli.json).await,
        Command::Categories => handle_categories(&client, cli.json).await,
        Command::Words { category_id } => handle_words(&client, &category_id, cli.json).await,
        Command::Word { name, category } => {
            handle_word(&client, &name, category.as_deref(), cli.json).await
        }
        Command::History { clear } => handle_history(&client, clear, cli.json),
        Command::Browse => handle_browse(&client, cli.json).await,
    }
}

async fn handle_search(
    client: &Client,
    query: String,
    pick: Option<usize>,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    if query.trim().is_empty() {
        return Err("Search query cannot be empty".into());
    }
    let controller = client.search_controller();
    controller.on_query_changed(query.as_str());
    let snapshot = controller.settled().await;

    let picked = match pick {
        Some(index) => {
            let entry = index
                .checked_sub(1)
                .and_then(|position| snapshot.results.get(position))
                .ok_or_else(|| {
                    format!("No result #{index}; the search returned {}", snapshot.results.len())
                })?;
            Some((entry.clone(), controller.on_result_selected(entry)))
        }
        None => None,
    };
    controller.dispose();

    if as_json {
        let payload = json!({
            "query": query,
            "results": snapshot.results.iter().map(|entry| entry_to_json(client, entry)).collect::<Vec<_>>(),
            "selected": picked.as_ref().map(|(entry, intent)| json!({
                "id": entry.id,
                "navigation": intent,
                "route": intent.route(),
            })),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_results(client, &snapshot);
        if let Some((_, intent)) = picked {
            println!("\nSelected {intent}");
            println!("Route: {}", intent.route());
        }
    }
    Ok(())
}

async fn handle_categories(client: &Client, as_json: bool) -> Result<(), Box<dyn Error>> {
    let categories = client.catalog.categories().await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&*categories)?);
        return Ok(());
    }
    if categories.is_empty() {
        println!("No categories available.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = categories
        .iter()
        .map(|category| {
            vec![
                category.id.clone(),
                normalize_text(&category.name),
                category.word_count.to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "WORDS"], &rows);
    Ok(())
}

async fn handle_words(client: &Client, category_id: &str, as_json: bool) -> Result<(), Box<dyn Error>> {
    let words = client.catalog.category_words(category_id).await?;
    if as_json {
        let payload: Vec<_> = words
            .iter()
            .map(|word| {
                json!({
                    "id": word.id,
                    "name": normalize_text(&word.name),
                    "analytical_text": word.analytical_text.as_deref().map(normalize_text),
                    "secondary_text": word.secondary_text,
                    "media_url": word.media_url.as_deref().map(|url| client.media_url(url)),
                    "media_kind": word.media_kind,
                    "route": word.navigation().route(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    if words.is_empty() {
        println!("No words in category \"{category_id}\".");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = words
        .iter()
        .map(|word| {
            vec![
                normalize_text(&word.name),
                word.analytical_text.as_deref().map(normalize_text).unwrap_or_default(),
                word.media_url
                    .as_deref()
                    .map(|url| client.media_url(url))
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    print_table(&["WORD", "CHICKASAW", "MEDIA"], &rows);
    Ok(())
}

async fn handle_word(
    client: &Client,
    name: &str,
    category: Option<&str>,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let detail = client.catalog.lookup_word(name, category).await;
    if as_json {
        let payload = json!({
            "name": detail.name,
            "entry": detail.entry.as_ref().map(|entry| entry_to_json(client, entry)),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    let Some(entry) = detail.entry else {
        println!("Word: {}", normalize_text(&detail.name));
        println!("No further detail available.");
        return Ok(());
    };
    println!("Word: {} ({})", normalize_text(&entry.display_name), entry.kind);
    if let Some(text) = &entry.analytical_text {
        println!("Chickasaw: {}", normalize_text(text));
    }
    if let Some(text) = &entry.secondary_text {
        println!("Language: {}", normalize_text(text));
    }
    if let Some(category) = &entry.category_ref {
        println!("Category: {} ({})", category.name, category.id);
    }
    if let Some(url) = &entry.media_url {
        println!("Media ({:?}): {}", entry.media_kind, client.media_url(url));
    }
    Ok(())
}

fn handle_history(client: &Client, clear: bool, as_json: bool) -> Result<(), Box<dyn Error>> {
    if clear {
        client.history.clear();
        if as_json {
            println!("{}", json!({ "cleared": true }));
        } else {
            println!("Search history cleared.");
        }
        return Ok(());
    }
    print_history(&client.history.load(), as_json)
}

async fn handle_browse(client: &Client, as_json: bool) -> Result<(), Box<dyn Error>> {
    let controller = client.search_controller();
    let interactive = atty::is(Stream::Stdin) && atty::is(Stream::Stdout);
    if interactive {
        println!("Type to search. Commands: :pick N, :clear, :history, :quit");
    }
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        if interactive {
            stdout.write_all(b"> ").await?;
            stdout.flush().await?;
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match BrowseInput::parse(&line) {
            BrowseInput::Quit => break,
            BrowseInput::Clear => {
                controller.on_clear();
                println!("Cleared.");
            }
            BrowseInput::History => print_history(&controller.history(), as_json)?,
            BrowseInput::Pick(index) => pick_result(&controller, index, as_json)?,
            BrowseInput::Invalid(reason) => eprintln!("{reason}"),
            BrowseInput::Query(text) => {
                controller.on_focus();
                controller.on_query_changed(text);
                let snapshot = controller.settled().await;
                if as_json {
                    let payload = json!({
                        "query": snapshot.query_text,
                        "results": snapshot.results.iter().map(|entry| entry_to_json(client, entry)).collect::<Vec<_>>(),
                    });
                    println!("{payload}");
                } else {
                    print_results(client, &snapshot);
                }
            }
        }
    }
    controller.dispose();
    Ok(())
}

fn pick_result(controller: &Arc<Controller>, index: usize, as_json: bool) -> Result<(), Box<dyn Error>> {
    let snapshot = controller.snapshot();
    let Some(entry) = index
        .checked_sub(1)
        .and_then(|position| snapshot.results.get(position))
    else {
        eprintln!("No result #{index}.");
        return Ok(());
    };
    let intent = controller.on_result_selected(entry);
    if as_json {
        println!("{}", json!({ "navigation": intent, "route": intent.route() }));
    } else {
        println!("Selected {intent}");
        println!("Route: {}", intent.route());
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum BrowseInput {
    Query(String),
    Pick(usize),
    Clear,
    History,
    Quit,
    Invalid(String),
}

impl BrowseInput {
    fn parse(line: &str) -> Self {
        let Some(command) = line.trim().strip_prefix(':') else {
            return BrowseInput::Query(line.trim_end_matches(['\r', '\n']).to_string());
        };
        let mut parts = command.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("quit" | "q"), _) => BrowseInput::Quit,
            (Some("clear"), _) => BrowseInput::Clear,
            (Some("history"), _) => BrowseInput::History,
            (Some("pick"), Some(index)) => index
                .parse()
                .map(BrowseInput::Pick)
                .unwrap_or_else(|_| BrowseInput::Invalid(format!("Not a result number: {index:?}"))),
            (Some("pick"), None) => BrowseInput::Invalid("Usage: :pick N".to_string()),
            _ => BrowseInput::Invalid(format!("Unknown command :{command}")),
        }
    }
}

fn entry_to_json(client: &Client, entry: &SearchResultEntry) -> serde_json::Value {
    json!({
        "id": entry.id,
        "name": normalize_text(&entry.display_name),
        "type": entry.kind,
        "analytical_text": entry.analytical_text.as_deref().map(normalize_text),
        "secondary_text": entry.secondary_text.as_deref().map(normalize_text),
        "media_url": entry.media_url.as_deref().map(|url| client.media_url(url)),
        "media_kind": entry.media_kind,
        "category": entry.category_ref,
        "route": entry.navigation().route(),
    })
}

fn print_results(client: &Client, snapshot: &SearchSnapshot) {
    if snapshot.results.is_empty() {
        let message = snapshot
            .empty_message()
            .unwrap_or_else(|| view::empty_results_message(&snapshot.query_text));
        println!("{message}");
        return;
    }
    let rows: Vec<Vec<String>> = snapshot
        .results
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            vec![
                (index + 1).to_string(),
                normalize_text(&entry.display_name),
                entry.kind.to_string(),
                entry
                    .analytical_text
                    .as_deref()
                    .map(normalize_text)
                    .unwrap_or_default(),
                entry
                    .media_url
                    .as_deref()
                    .map(|url| client.media_url(url))
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    println!("Results for \"{}\":", snapshot.query_text);
    print_table(&["#", "NAME", "TYPE", "CHICKASAW", "MEDIA"], &rows);
}

fn print_history(entries: &[HistoryEntry], as_json: bool) -> Result<(), Box<dyn Error>> {
    if as_json {
        let payload: Vec<_> = entries
            .iter()
            .map(|entry| {
                json!({
                    "id": entry.id,
                    "name": normalize_text(&entry.display_name),
                    "type": entry.kind(),
                    "selected_at": entry.selected_at,
                    "route": entry.navigation().route(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No recent searches.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|entry| {
            vec![
                normalize_text(&entry.display_name),
                entry.kind().to_string(),
                entry.navigation().route(),
            ]
        })
        .collect();
    print_table(&["NAME", "TYPE", "ROUTE"], &rows);
    Ok(())
}

fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(column, header)| {
            rows.iter()
                .filter_map(|row| row.get(column))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0)
                .max(header.len())
        })
        .collect();
    let render = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };
    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    println!("{}", render(headers.to_vec()));
    println!("{}", render(rule.iter().map(String::as_str).collect()));
    for row in rows {
        println!("{}", render(row.iter().map(String::as_str).collect()));
    }
}
