//! Interactive shell mode
//!
//! A REPL with command history and tab completion. All product commands in a
//! session share one `ProductStore`, so fetched products, the current product
//! and the status carry over between commands.

use anyhow::Result;
use clap::Parser;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Config, Editor, Helper};

use super::commands;
use super::output::print_error;
use super::{Cli, Commands};
use crate::state::{select_status, ProductStore, Status, StateEvent};

const COMMANDS: &[(&str, &[&str])] = &[
    ("product", &["get", "list", "search", "remove", "state"]),
    ("config", &["show", "set", "path"]),
    ("help", &[]),
    ("exit", &[]),
    ("quit", &[]),
];

/// Command completer for the shell
struct ShellCompleter;

fn pairs<'a>(words: impl Iterator<Item = &'a str>) -> Vec<Pair> {
    words
        .map(|word| Pair {
            display: word.to_string(),
            replacement: word.to_string(),
        })
        .collect()
}

impl Completer for ShellCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];
        let words: Vec<&str> = line.split_whitespace().collect();
        let start = line.rfind(' ').map(|i| i + 1).unwrap_or(0);
        let typing = !line.ends_with(' ');

        let candidates = match (words.as_slice(), typing) {
            ([], _) => pairs(COMMANDS.iter().map(|(cmd, _)| *cmd)),
            ([prefix], true) => pairs(
                COMMANDS
                    .iter()
                    .map(|(cmd, _)| *cmd)
                    .filter(|cmd| cmd.starts_with(*prefix)),
            ),
            ([cmd], false) => subcommands(cmd).map(|subs| pairs(subs.iter().copied())).unwrap_or_default(),
            ([cmd, prefix], true) => subcommands(cmd)
                .map(|subs| pairs(subs.iter().copied().filter(|sub| sub.starts_with(*prefix))))
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        Ok((start, candidates))
    }
}

fn subcommands(cmd: &str) -> Option<&'static [&'static str]> {
    COMMANDS.iter().find(|(c, _)| *c == cmd).map(|(_, subs)| *subs)
}

impl Hinter for ShellCompleter {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        None
    }
}

impl Highlighter for ShellCompleter {}
impl Validator for ShellCompleter {}
impl Helper for ShellCompleter {}

/// Split a command line into arguments, honouring single and double quotes
fn parse_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match (c, quote) {
            ('"' | '\'', None) => quote = Some(c),
            (c, Some(q)) if c == q => quote = None,
            (c, None) if c.is_whitespace() => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            (c, _) => current.push(c),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Run a single command in the shell.
/// Returns Ok(true) to continue, Ok(false) to exit.
async fn run_command(args: Vec<String>, store: &mut ProductStore) -> Result<bool> {
    let Some(cmd) = args.first() else {
        return Ok(true);
    };

    match cmd.as_str() {
        "help" => {
            print_help();
            return Ok(true);
        }
        "exit" | "quit" => return Ok(false),
        _ => {}
    }

    let argv = std::iter::once("storefront".to_string()).chain(args);
    let cli = match Cli::try_parse_from(argv) {
        Ok(cli) => cli,
        Err(e) => {
            println!("{}", e);
            return Ok(true);
        }
    };

    if cli.base_url.is_some() {
        println!("--base-url is fixed for the shell session; ignoring it.");
    }

    let format = cli.output.format();
    let quiet = cli.output.quiet;

    match cli.command {
        Commands::Product { command } => commands::product::run(command, store, format, quiet).await?,
        Commands::Config { command } => commands::config::run(command, format, quiet).await?,
        Commands::Shell => println!("Already in shell mode."),
    }

    Ok(true)
}

/// Prompt carrying the store status, so `--no-wait` results show up as they land
fn prompt(store: &ProductStore) -> &'static str {
    match select_status(store.state()) {
        Status::Idle => "storefront> ",
        Status::Loading => "storefront (loading)> ",
        Status::Failed => "storefront (failed)> ",
    }
}

fn print_help() {
    println!(
        r#"Storefront Interactive Shell

Commands:
  product get <id>         Fetch one product and make it current
  product list             Fetch all products
  product search <query>   Search products
                           (add --no-wait to return before the call settles)
  product remove           Clear the current product
  product state            Show status, current product and product count

  config show              Show current configuration
  config set <key> <value> Set a configuration value
  config path              Show config file path

  help                     Show this help
  exit, quit               Exit the shell

Flags (can be added to any command):
  --json                   Output in JSON format
  --quiet, -q              Suppress non-essential output
"#
    );
}

/// Get the history file path
fn history_path() -> Option<std::path::PathBuf> {
    directories::ProjectDirs::from("com", "storefront", "Storefront")
        .map(|dirs| dirs.data_dir().join("shell_history"))
}

/// Run the interactive shell
pub async fn run(mut store: ProductStore) -> Result<()> {
    println!("Storefront Interactive Shell v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'help' for available commands, 'exit' to quit.\n");

    let config = Config::builder()
        .history_ignore_space(true)
        .completion_type(rustyline::CompletionType::List)
        .build();

    let mut rl = Editor::with_config(config)?;
    rl.set_helper(Some(ShellCompleter));

    if let Some(path) = history_path() {
        let _ = rl.load_history(&path);
    }

    loop {
        for event in store.poll() {
            if let StateEvent::Rejected { call, thunk, error } = event {
                print_error(&format!("{} {} failed: {}", thunk, call, error));
            }
        }

        match rl.readline(prompt(&store)) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match run_command(parse_args(line), &mut store).await {
                    Ok(true) => continue,
                    Ok(false) => break,
                    Err(e) => print_error(&format!("{:#}", e)),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("exit");
                break;
            }
            Err(err) => {
                print_error(&format!("{:?}", err));
                break;
            }
        }
    }

    if let Some(path) = history_path() {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = rl.save_history(&path);
    }

    Ok(())
}
