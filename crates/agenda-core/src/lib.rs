pub mod cli;
pub mod config;
pub mod datetime;
pub mod item;
pub mod query;
pub mod render;
pub mod session;
pub mod store;

use std::ffi::OsString;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use tracing::{debug, info};

use crate::cli::{Command, MoveArgs, ViewArgs};
use crate::query::ViewState;
use crate::render::Renderer;
use crate::session::{Change, Session, SkipReason};

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let pre = cli::preprocess_args(&raw_args);
    let cli = cli::GlobalCli::parse_from(pre.cleaned_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(
        verbose = cli.verbose,
        quiet = cli.quiet,
        "starting agenda"
    );
    debug!(?pre.rc_overrides, "preprocessed rc overrides");

    let mut cfg = config::Config::load(cli.agendarc.as_deref())?;
    cfg.apply_overrides(
        pre.rc_overrides
            .into_iter()
            .chain(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value))),
    );

    let data_file = config::resolve_data_file(&cfg, cli.file.as_deref())
        .context("failed to resolve data file")?;

    let mut session = Session::open(store::Store::new(&data_file), datetime::now_local());
    if let Some(warning) = session.load_warning() {
        eprintln!("warning: {warning}");
    }

    let renderer = Renderer::new(&cfg)?;
    let base_view = cfg.default_view()?;
    let command = cli
        .command
        .unwrap_or_else(|| Command::List(ViewArgs::default()));

    dispatch(&mut session, &renderer, base_view, command)?;

    info!("done");
    Ok(())
}

#[tracing::instrument(skip(session, renderer, base_view))]
fn dispatch(
    session: &mut Session,
    renderer: &Renderer,
    base_view: ViewState,
    command: Command,
) -> anyhow::Result<()> {
    let now = datetime::now_local();
    let today = now.date();

    match command {
        Command::Add(args) => {
            let due = datetime::parse_optional_due(args.due.as_deref())?;
            let change = session.add(&args.text.join(" "), args.priority, due, now)?;
            report(change, || format!("Added item {}.", session.items().len()));
        }
        Command::Edit(args) => {
            let index = cli::position_to_index(args.position)?;
            let due = datetime::parse_optional_due(args.due.as_deref())?;
            let change = session.edit(index, &args.text.join(" "), due)?;
            report(change, || format!("Edited item {}.", args.position));
        }
        Command::Delete(args) => {
            let index = cli::position_to_index(args.position)?;
            let change = session.delete(index)?;
            report(change, || {
                format!("Deleted item {}; `agenda undo` restores it.", args.position)
            });
        }
        Command::Undo => {
            let change = session.undo()?;
            report(change, || "Restored the deleted item.".to_string());
        }
        Command::Done(args) => {
            let index = cli::position_to_index(args.position)?;
            let change = session.toggle_done(index, now)?;
            let state = match session.items().get(index) {
                Some(item) if item.done => "done",
                _ => "open",
            };
            report(change, || format!("Item {} is now {state}.", args.position));
        }
        Command::Up(args) => run_move(session, base_view, &args, today, true)?,
        Command::Down(args) => run_move(session, base_view, &args, today, false)?,
        Command::List(args) => {
            session.set_view(args.apply(base_view));
            let indices = session.visible(today);
            renderer.print_list(session.items(), &indices, session.stats(), today)?;
        }
        Command::Day(args) => {
            let date = resolve_date(args.date.as_deref(), today)?;
            renderer.print_day(date, &session.day(date))?;
        }
        Command::Week(args) => {
            let anchor = resolve_date(args.date.as_deref(), today)?;
            renderer.print_week(anchor, &session.week(anchor))?;
        }
        Command::Stats => renderer.print_stats(session.stats())?,
    }

    Ok(())
}

fn run_move(
    session: &mut Session,
    base_view: ViewState,
    args: &MoveArgs,
    today: NaiveDate,
    up: bool,
) -> anyhow::Result<()> {
    session.set_view(args.view.apply(base_view));
    let index = cli::position_to_index(args.position)?;
    let change = if up {
        session.move_up(index)?
    } else {
        session.move_down(index)?
    };

    report(change, || {
        let shown = match change {
            Change::Moved(to) => query::view_position(&session.visible(today), to),
            _ => None,
        };
        match shown {
            Some(row) => format!("Moved item {} to {}.", args.position, row + 1),
            None => format!("Moved item {}.", args.position),
        }
    });
    Ok(())
}

fn resolve_date(raw: Option<&str>, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    match raw {
        Some(raw) => Ok(datetime::parse_date(raw)?),
        None => Ok(today),
    }
}

fn report<F>(change: Change, applied: F)
where
    F: FnOnce() -> String,
{
    match change {
        Change::Applied | Change::Moved(_) => println!("{}", applied()),
        Change::Skipped(reason) => {
            debug!(?reason, "nothing changed");
            println!("{}", skip_message(reason));
        }
    }
}

fn skip_message(reason: SkipReason) -> String {
    match reason {
        SkipReason::EmptyText => "Nothing changed: the text is empty.".to_string(),
        SkipReason::OutOfRange(index) => format!("Nothing changed: no item {}.", index + 1),
        SkipReason::AtBoundary => "Nothing changed: the item is already at the edge.".to_string(),
        SkipReason::NothingToUndo => "Nothing to undo.".to_string(),
    }
}
