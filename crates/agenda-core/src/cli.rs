use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::item::Priority;
use crate::query::{RangeFilter, SortKey, StatusFilter, ViewState};

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "agenda",
    version,
    about = "Agenda: a plain JSON todo list with day and week views",
    infer_subcommands = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    /// Config file to read instead of ~/.agendarc
    #[arg(long = "agendarc", global = true)]
    pub agendarc: Option<PathBuf>,

    /// List file to use instead of data.location/data.file
    #[arg(short = 'f', long = "file", global = true)]
    pub file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Append a new item
    Add(AddArgs),
    /// Replace an item's text and deadline
    Edit(EditArgs),
    /// Delete an item (undo brings it back)
    #[command(visible_alias = "rm")]
    Delete(PositionArg),
    /// Restore the last deleted item
    Undo,
    /// Toggle an item between open and done
    #[command(visible_alias = "toggle")]
    Done(PositionArg),
    /// Move an item one place up
    Up(MoveArgs),
    /// Move an item one place down
    Down(MoveArgs),
    /// Show the list (the default command)
    List(ViewArgs),
    /// Show items due on one day
    Day(DateArg),
    /// Show items due in the Monday-to-Sunday week containing a day
    Week(DateArg),
    /// Show how many items are done
    Stats,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1..)]
    pub text: Vec<String>,

    /// 0|1|2 or low|normal|high
    #[arg(short = 'p', long = "priority", default_value = "1")]
    pub priority: Priority,

    /// Deadline as "YYYY-MM-DD HH:MM" (24h)
    #[arg(short = 'd', long = "due")]
    pub due: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Position as shown by `list`
    pub position: usize,

    #[arg(required = true, num_args = 1..)]
    pub text: Vec<String>,

    /// New deadline; omit to clear it
    #[arg(short = 'd', long = "due")]
    pub due: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct PositionArg {
    /// Position as shown by `list`
    pub position: usize,
}

#[derive(Args, Debug, Clone)]
pub struct MoveArgs {
    /// Position as shown by `list`
    pub position: usize,

    #[command(flatten)]
    pub view: ViewArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ViewArgs {
    /// all|todo|done
    #[arg(long = "status")]
    pub status: Option<StatusFilter>,

    /// all|today|week
    #[arg(long = "range")]
    pub range: Option<RangeFilter>,

    /// Case-insensitive text to look for
    #[arg(short = 's', long = "search")]
    pub search: Option<String>,

    /// default|due_dt|priority|created_at
    #[arg(long = "sort")]
    pub sort: Option<SortKey>,
}

impl ViewArgs {
    /// Layers the flags that were given over `base`.
    pub fn apply(&self, base: ViewState) -> ViewState {
        ViewState {
            status: self.status.unwrap_or(base.status),
            range: self.range.unwrap_or(base.range),
            query: self.search.clone().unwrap_or(base.query),
            sort: self.sort.unwrap_or(base.sort),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct DateArg {
    /// YYYY-MM-DD, today when omitted
    pub date: Option<String>,
}

/// Converts a 1-based command-line position to a list index.
pub fn position_to_index(position: usize) -> anyhow::Result<usize> {
    position
        .checked_sub(1)
        .ok_or_else(|| anyhow!("positions start at 1"))
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Commands whose positional words are item text.
const TEXT_COMMANDS: [&str; 2] = ["add", "edit"];

/// Global flags that consume the next word as their value.
const VALUED_FLAGS: [&str; 4] = ["--rc", "--agendarc", "-f", "--file"];

/// Pulls `rc.key=value` / `rc.key:value` words out of the argument list so
/// they can appear anywhere on the command line, except after `add`/`edit`
/// where every following word is left alone as item text.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> PreprocessedArgs {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    let mut seen_command = false;
    let mut takes_text = false;
    let mut flag_value = false;

    for arg in iter {
        if takes_text {
            cleaned.push(arg);
            continue;
        }

        let s = arg.to_string_lossy().into_owned();
        if let Some((k, v)) = rc_override(&s) {
            debug!(key = %k, value = %v, "captured positional rc override");
            overrides.push((k, v));
            continue;
        }

        if flag_value {
            flag_value = false;
        } else if VALUED_FLAGS.contains(&s.as_str()) {
            flag_value = true;
        } else if !seen_command && !s.is_empty() && !s.starts_with('-') {
            seen_command = true;
            takes_text = TEXT_COMMANDS.iter().any(|cmd| cmd.starts_with(s.as_str()));
        }

        cleaned.push(arg);
    }

    PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    }
}

fn rc_override(word: &str) -> Option<(String, String)> {
    let rest = word.strip_prefix("rc.")?;
    rest.split_once('=')
        .or_else(|| rest.split_once(':'))
        .map(|(k, v)| (format!("rc.{k}"), v.to_string()))
}
