//! `rdbg`, the interactive routine debugger console.

mod format;

use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use log::LevelFilter;
use rdbg_engine::{COMMANDS, DebugSession, SessionConfig};
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Context, Editor, Helper, Highlighter, Hinter, Validator};
use simple_logger::SimpleLogger;

const PROMPT: &str = "(rdbg) ";
const HISTORY_FILE: &str = ".rdbg_history";

#[derive(Debug, Parser)]
#[command(author, version, about = "Interactive routine debugger", name = "rdbg")]
struct Opt {
    /// Backend endpoint, `host:port`.
    #[arg(long, default_value = "127.0.0.1:8787")]
    endpoint: String,

    /// Give up on a started target if it does not publish its proxy
    /// endpoint within this many seconds. Waits indefinitely when unset.
    #[arg(long, value_name = "SECONDS")]
    startup_timeout: Option<u64>,

    /// Verbose engine logging.
    #[arg(long, short)]
    debug: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let opt = Opt::parse();

    SimpleLogger::new()
        .with_level(if opt.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init()?;

    let mut session = DebugSession::connect(
        SessionConfig {
            endpoint: opt.endpoint,
            startup_timeout: opt.startup_timeout.map(Duration::from_secs),
        },
        &COMMANDS,
    )?;
    repl(&mut session)
}

fn repl(session: &mut DebugSession) -> Result<()> {
    let mut editor: Editor<CommandHelper, DefaultHistory> = Editor::new()?;
    editor.set_helper(Some(CommandHelper::new()));
    let _ = editor.load_history(HISTORY_FILE);

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                editor.add_history_entry(&line)?;

                let leaving = matches!(line.split_whitespace().next(), Some("exit" | "quit"));
                let result = session.dispatch(&line);
                format::render(session.commands(), result);
                if leaving {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("Type `exit` to leave the debugger");
            }
            Err(ReadlineError::Eof) => {
                // Same teardown path as `exit`.
                session.dispatch("stop");
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }

    editor.save_history(HISTORY_FILE)?;
    Ok(())
}

/// Completes command names at the start of the line; everything after the
/// command is backend syntax the console does not second-guess.
#[derive(Helper, Highlighter, Hinter, Validator)]
struct CommandHelper {
    commands: Vec<&'static str>,
}

impl CommandHelper {
    fn new() -> Self {
        let mut commands: Vec<&'static str> = COMMANDS.keys().copied().collect();
        commands.sort_unstable();
        Self { commands }
    }
}

impl Completer for CommandHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        let head = &line[..pos];
        if head.contains(char::is_whitespace) {
            return Ok((pos, Vec::new()));
        }
        let matches = self
            .commands
            .iter()
            .filter(|name| name.starts_with(head))
            .map(|name| (*name).to_string())
            .collect();
        Ok((0, matches))
    }
}
