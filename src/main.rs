//! Binary entry point that puts the crime store behind a small command-line
//! interface: open the database, run one command against it, and exit (or
//! keep printing snapshots for `watch`).
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use criminal_intent::{Crime, CrimeEditor, CrimeList, CrimeStore};
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "criminal-intent", version, about = "Keep track of office crimes")]
struct Cli {
    /// SQLite database to use instead of ~/.criminal-intent/crimes.sqlite.
    #[arg(long, global = true, env = "CRIMINAL_INTENT_DB")]
    database: Option<PathBuf>,

    /// Log level, overridden by RUST_LOG.
    #[arg(long, global = true, env = "CRIMINAL_INTENT_LOG", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print every crime.
    List,
    /// Record a new crime and print its id.
    New {
        #[arg(long)]
        title: Option<String>,
    },
    /// Print one crime.
    Show { id: Uuid },
    /// Change the title.
    Title { id: Uuid, title: String },
    /// Mark a crime as solved (or unsolved).
    Solve {
        id: Uuid,
        #[arg(long)]
        unsolved: bool,
    },
    /// Set the suspect's name; an empty string clears it.
    Suspect { id: Uuid, name: String },
    /// Set date and time, e.g. 2024-03-09T21:30:00Z.
    Date { id: Uuid, date: DateTime<Utc> },
    /// Set the time of day, HH:MM, keeping the date.
    Time {
        id: Uuid,
        #[arg(value_parser = parse_time)]
        time: NaiveTime,
    },
    /// Delete a crime.
    Delete { id: Uuid },
    /// Print the crime list every time it changes, until Ctrl-C.
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let store = match &cli.database {
        Some(path) => CrimeStore::open(path),
        None => CrimeStore::open_default(),
    }
    .context("failed to open crime database")?;

    run(&store, cli.command).await
}

async fn run(store: &CrimeStore, command: Command) -> Result<()> {
    match command {
        Command::List => {
            let crimes = store.snapshot();
            if crimes.is_empty() {
                println!("No crimes yet. Record one with `criminal-intent new`.");
            }
            for crime in crimes.iter() {
                println!("{}", format_row(crime));
            }
        }
        Command::New { title } => {
            let crime = CrimeList::new(store)
                .add_crime()
                .await
                .context("failed to record crime")?;
            if let Some(title) = title {
                store
                    .modify(crime.id, move |crime| Crime { title, ..crime })
                    .await
                    .context("failed to title crime")?;
            }
            println!("{}", crime.id);
        }
        Command::Show { id } => {
            let crime = store.get(id).await.context("failed to load crime")?;
            println!("{}", format_row(&crime));
        }
        Command::Title { id, title } => {
            edit(store, id, |editor| async move { editor.set_title(title).await }).await?;
        }
        Command::Solve { id, unsolved } => {
            edit(store, id, |editor| async move {
                editor.set_solved(!unsolved).await
            })
            .await?;
        }
        Command::Suspect { id, name } => {
            edit(store, id, |editor| async move { editor.set_suspect(name).await }).await?;
        }
        Command::Date { id, date } => {
            edit(store, id, |editor| async move { editor.set_date(date).await }).await?;
        }
        Command::Time { id, time } => {
            edit(store, id, |editor| async move {
                editor.set_time_of_day(time).await
            })
            .await?;
        }
        Command::Delete { id } => {
            let editor = CrimeEditor::open(store, id);
            if !editor.delete_crime().await.context("failed to delete crime")? {
                println!("Crime {id} was already gone.");
            }
        }
        Command::Watch => watch(store).await?,
    }
    Ok(())
}

/// Open an editor on `id`, wait for it to load and run `apply` on it, then
/// print the stored result.
async fn edit<F, Fut>(store: &CrimeStore, id: Uuid, apply: F) -> Result<()>
where
    F: FnOnce(Arc<CrimeEditor>) -> Fut,
    Fut: Future<Output = criminal_intent::Result<Option<Crime>>>,
{
    let editor = Arc::new(CrimeEditor::open(store, id));
    if editor.ready().await.is_none() {
        return Err(anyhow!("crime {id} not found"));
    }

    let updated = apply(editor)
        .await
        .context("failed to update crime")?
        .ok_or_else(|| anyhow!("crime {id} disappeared while editing"))?;
    println!("{}", format_row(&updated));
    Ok(())
}

async fn watch(store: &CrimeStore) -> Result<()> {
    let mut crimes = store.get_all();
    loop {
        tokio::select! {
            snapshot = crimes.next() => {
                let Some(snapshot) = snapshot else { break };
                println!("── {} crime(s) ──", snapshot.len());
                for crime in snapshot.iter() {
                    println!("{}", format_row(crime));
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                break;
            }
        }
    }
    Ok(())
}

fn format_row(crime: &Crime) -> String {
    let solved = if crime.is_solved { "x" } else { " " };
    let mut row = format!(
        "{}  [{solved}]  {}  {crime}",
        crime.id,
        crime.date.format("%Y-%m-%d %H:%M")
    );
    if crime.has_suspect() {
        row.push_str(&format!("  (suspect: {})", crime.suspect));
    }
    row
}

/// `HH:MM` on a 24-hour clock. Out-of-range hours or minutes are rejected
/// here, before any edit reaches the store.
fn parse_time(value: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(value, "%H:%M")
}

/// Install the tracing subscriber. `RUST_LOG` wins over `--log-level`; logs go
/// to stderr so command output stays clean.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
