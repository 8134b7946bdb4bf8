//! cmdbar - interactive command bar harness.
//!
//! The dispatch layer around the library core: load configuration, open the
//! alias store, restore history, then read lines from stdin. Lines whose
//! first token starts with `$` manage the store in place; anything else is
//! submitted through the input session and resolved against the store the
//! way a launcher would, reporting the target instead of spawning it.
//!
//! ```bash
//! cargo run -- --data-dir /tmp/cmdbar-demo
//! ```

use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::Receiver;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};

use cmdbar::aliases::{AliasEvent, AliasStore};
use cmdbar::cmdline;
use cmdbar::config;
use cmdbar::history::History;
use cmdbar::input::{InputSession, Submit};
use cmdbar::logging;

#[derive(Parser)]
#[command(name = "cmdbar")]
#[command(about = "Quick-launch command bar: aliases, completion, history")]
#[command(version)]
struct Cli {
    /// Data directory holding aliases.json, history.txt, and logs
    #[arg(long)]
    data_dir: Option<String>,

    /// Debounce window for external alias file edits, in milliseconds
    #[arg(long)]
    debounce_ms: Option<u64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _logging_guard = logging::init();

    let mut config = config::load_config();
    if cli.data_dir.is_some() {
        config.data_dir = cli.data_dir;
    }
    if let Some(debounce_ms) = cli.debounce_ms {
        config.debounce_ms = debounce_ms;
    }
    info!(
        data_dir = %config.get_data_dir().display(),
        debounce_ms = config.debounce_ms,
        "Starting cmdbar"
    );

    let (store, events) =
        AliasStore::open_with_debounce(config.alias_path(), config.get_debounce());

    let mut history = History::with_limit(config.history_path(), config.history_limit);
    if let Err(e) = history.load() {
        warn!(error = ?e, "Could not load history, starting empty");
    }
    let mut session = InputSession::new(history);

    run_repl(&store, &events, &mut session)?;

    if let Err(e) = session.history().save() {
        warn!(error = ?e, "Could not save history");
    }
    Ok(())
}

fn run_repl(
    store: &AliasStore,
    events: &Receiver<AliasEvent>,
    session: &mut InputSession,
) -> Result<()> {
    let mut vocabulary: BTreeSet<String> = BTreeSet::new();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    println!(
        "cmdbar: {} aliases loaded ($ls to list, $quit to exit)",
        store.len()
    );

    loop {
        refresh_vocabulary(events, &mut vocabulary, session);

        print!("> ");
        io::stdout().flush().context("flushing prompt")?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("reading stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        session.set_text(line);
        let submitted = match session.confirm() {
            Submit::Line(text) => text,
            Submit::TailAccepted => continue,
        };

        let tokens = cmdline::tokenize(&submitted);
        let Some(first) = tokens.first() else {
            continue;
        };

        if first.starts_with('$') {
            if !run_builtin(&tokens, store) {
                break;
            }
        } else {
            resolve_and_report(&tokens, store);
        }
        session.set_text("");
    }
    Ok(())
}

/// Drain pending store notifications and hand the session a fresh
/// vocabulary when anything changed.
fn refresh_vocabulary(
    events: &Receiver<AliasEvent>,
    vocabulary: &mut BTreeSet<String>,
    session: &mut InputSession,
) {
    let mut changed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            AliasEvent::Loaded { snapshot } => {
                *vocabulary = snapshot.into_keys().collect();
            }
            AliasEvent::Added { name, .. } | AliasEvent::Updated { name, .. } => {
                vocabulary.insert(name);
            }
            AliasEvent::Removed { name } => {
                vocabulary.remove(&name);
            }
        }
        changed = true;
    }
    if changed {
        session.set_vocabulary(vocabulary.iter().cloned().collect());
        debug!(
            vocabulary_len = vocabulary.len(),
            "Session vocabulary refreshed"
        );
    }
}

/// Handle a `$`-prefixed builtin. Returns false when the loop should exit.
fn run_builtin(tokens: &[String], store: &AliasStore) -> bool {
    match tokens[0].to_lowercase().as_str() {
        "$add" => match tokens {
            [_, name, target] => {
                store.add(name, target);
                println!("added {} -> {}", name, target);
            }
            _ => println!("usage: $add <name> <target>"),
        },
        "$rm" => match tokens {
            [_, name] => {
                if store.remove(name) {
                    println!("removed {}", name);
                } else {
                    println!("no alias named '{}'", name);
                }
            }
            _ => println!("usage: $rm <name>"),
        },
        "$ls" => {
            for (name, target) in store.snapshot() {
                println!("{:<16} {}", name, target);
            }
        }
        "$quit" | "$q" => return false,
        other => println!("unknown builtin '{}' ($add, $rm, $ls, $quit)", other),
    }
    true
}

/// Resolve the first token against the store and report what a launcher
/// would start. Spawning the target is the host's job, not ours.
fn resolve_and_report(tokens: &[String], store: &AliasStore) {
    let name = &tokens[0];
    match store.resolve(name) {
        Some(target) => {
            info!(alias = %name, target = %target, "Alias resolved");
            if tokens.len() > 1 {
                println!("{} -> {} [{}]", name, target, tokens[1..].join(" "));
            } else {
                println!("{} -> {}", name, target);
            }
        }
        None => println!(
            "no alias named '{}' (try $ls or $add <name> <target>)",
            name
        ),
    }
}
