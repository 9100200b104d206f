mod version;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{CommandFactory, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use century_core::config::{resolve_settings, Settings};
use century_core::doctor::validate_log;
use century_core::habit::HabitStore;
use century_core::{history, trend, window_count, HabitId, TrendPeriod, WindowSize};
use century_render::{
    render_habit_list, render_history_csv, render_history_grid, render_stats_table,
    render_trend_csv, render_trend_text,
};

const GRID_COLUMNS: usize = 10;
const TREND_COLUMNS: usize = 60;

#[derive(Parser)]
#[command(name = "century", version = version::LABEL, about = "Century habit tracker")]
struct Cli {
    /// Project root holding `.century.toml` (defaults to the current directory)
    #[arg(long, global = true, env = "CENTURY_ROOT")]
    root: Option<PathBuf>,
    /// Account acting on the habits (defaults to the configured owner)
    #[arg(long, global = true, env = "CENTURY_USER")]
    user: Option<String>,
    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Create, list and retire habits
    Habit {
        #[command(subcommand)]
        command: HabitCommand,
    },
    /// Mark a habit complete for a day
    Mark {
        habit: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Mark a habit incomplete for a day
    Unmark {
        habit: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Flip a habit's completion for a day
    Toggle {
        habit: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Show whether a habit is complete on a day
    Status {
        habit: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Count completed days in the window ending at --end
    Count {
        habit: String,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long)]
        window: Option<WindowSize>,
    },
    /// Per-day completion for the window, newest first
    History {
        habit: String,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long)]
        window: Option<WindowSize>,
        #[arg(long)]
        csv: bool,
    },
    /// Completion series with chart labels
    Trend {
        habit: String,
        #[arg(long)]
        end: Option<NaiveDate>,
        /// One of 100, 200, 300, 365, 400, 500; anything else means 100
        #[arg(long)]
        period: Option<String>,
        #[arg(long)]
        csv: bool,
    },
    /// Window counts for every habit
    Stats {
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long)]
        window: Option<WindowSize>,
    },
    /// Dump a habit's raw events in log order
    Events { habit: String },
    /// Validate the event log
    Doctor,
    /// Print version information
    Version,
}

#[derive(Subcommand)]
enum HabitCommand {
    Add {
        name: String,
        #[arg(long)]
        order: Option<u32>,
    },
    List,
    Rename {
        habit: String,
        name: String,
    },
    /// Set display order; list every habit id in the desired order
    Reorder {
        #[arg(required = true)]
        habits: Vec<String>,
    },
    Delete {
        habit: String,
    },
}

struct AppContext {
    settings: Settings,
    owner: String,
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir().context("resolve current directory")?,
    };
    let settings = resolve_settings(&root)
        .with_context(|| format!("load settings for {}", root.display()))?;
    let owner = cli
        .user
        .map(|user| user.trim().to_string())
        .filter(|user| !user.is_empty())
        .unwrap_or_else(|| settings.owner.clone());
    let ctx = AppContext {
        settings,
        owner,
        json: cli.json,
    };
    run(&ctx, command)
}

impl AppContext {
    fn store(&self) -> Result<HabitStore> {
        HabitStore::open(&self.settings.data_dir)
            .with_context(|| format!("open data dir {}", self.settings.data_dir.display()))
    }
}

fn run(ctx: &AppContext, command: Command) -> Result<()> {
    let owner = ctx.owner.as_str();

    match command {
        Command::Habit { command } => run_habit(ctx, &ctx.store()?, command),
        Command::Mark { habit, date } => {
            let store = ctx.store()?;
            let outcome =
                store.mark_complete(owner, &HabitId::from(habit.as_str()), day_or_today(date))?;
            emit(ctx, &outcome, || {
                format!("{} complete on {}", outcome.habit_id, outcome.log_date)
            })
        }
        Command::Unmark { habit, date } => {
            let store = ctx.store()?;
            let outcome =
                store.mark_incomplete(owner, &HabitId::from(habit.as_str()), day_or_today(date))?;
            emit(ctx, &outcome, || {
                format!("{} incomplete on {}", outcome.habit_id, outcome.log_date)
            })
        }
        Command::Toggle { habit, date } => {
            let store = ctx.store()?;
            let outcome =
                store.toggle(owner, &HabitId::from(habit.as_str()), day_or_today(date))?;
            emit(ctx, &outcome, || {
                let state = if outcome.completed { "complete" } else { "incomplete" };
                format!("{} {} on {}", outcome.habit_id, state, outcome.log_date)
            })
        }
        Command::Status { habit, date } => {
            let store = ctx.store()?;
            let habit_id = HabitId::from(habit.as_str());
            let date = day_or_today(date);
            let completed = store.status(owner, &habit_id, date)?;
            let payload = json!({ "habit_id": habit_id, "date": date, "completed": completed });
            let state = if completed { "complete" } else { "incomplete" };
            emit(ctx, &payload, || state.to_string())
        }
        Command::Count { habit, end, window } => {
            let store = ctx.store()?;
            let habit = store.get_habit(owner, &HabitId::from(habit.as_str()))?;
            let end = day_or_today(end);
            let window = window.unwrap_or(ctx.settings.window);
            let count = window_count(store.log(), &habit.id, end, window)?;
            let payload = json!({
                "habit_id": habit.id,
                "end_date": end,
                "window": window,
                "count": count,
            });
            emit(ctx, &payload, || format!("{}/{}", count, window))
        }
        Command::History {
            habit,
            end,
            window,
            csv,
        } => {
            let store = ctx.store()?;
            let habit = store.get_habit(owner, &HabitId::from(habit.as_str()))?;
            let end = day_or_today(end);
            let window = window.unwrap_or(ctx.settings.window);
            let days = history(store.log(), &habit.id, end, window)?;
            if csv {
                print!("{}", render_history_csv(end, &days)?);
                return Ok(());
            }
            let payload = json!({
                "habit_id": habit.id,
                "end_date": end,
                "window": window,
                "history": days,
            });
            emit(ctx, &payload, || render_history_grid(&days, GRID_COLUMNS))
        }
        Command::Trend {
            habit,
            end,
            period,
            csv,
        } => {
            let store = ctx.store()?;
            let habit = store.get_habit(owner, &HabitId::from(habit.as_str()))?;
            let period = period
                .as_deref()
                .map(TrendPeriod::parse_lenient)
                .unwrap_or(ctx.settings.trend_period);
            let result = trend(
                store.log(),
                &habit.id,
                day_or_today(end),
                period,
                ctx.settings.trend_layout,
            )?;
            if csv {
                print!("{}", render_trend_csv(&result)?);
                return Ok(());
            }
            emit(ctx, &result, || render_trend_text(&result, TREND_COLUMNS))
        }
        Command::Stats { end, window } => {
            let store = ctx.store()?;
            let window = window.unwrap_or(ctx.settings.window);
            let stats = store.habit_stats(owner, day_or_today(end), window)?;
            emit(ctx, &stats, || render_stats_table(&stats))
        }
        Command::Events { habit } => {
            let store = ctx.store()?;
            let events = store.habit_events(owner, &HabitId::from(habit.as_str()))?;
            emit(ctx, &events, || {
                events
                    .iter()
                    .map(|event| {
                        let date = event
                            .log_date
                            .map(|date| date.to_string())
                            .unwrap_or_else(|| "-".to_string());
                        format!("{:>6}  {:<10}  {}", event.event_id, date, event.kind)
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Command::Doctor => {
            let store = ctx.store()?;
            let report = validate_log(store.log().path())?;
            let ok = report.ok;
            emit(ctx, &report, || {
                let mut lines = vec![
                    format!("events: {} ({})", report.event_count, report.events_path),
                    format!("status: {}", if report.ok { "ok" } else { "problems found" }),
                ];
                for problem in report
                    .malformed_events
                    .iter()
                    .chain(&report.order_violations)
                    .chain(&report.undated_completions)
                    .chain(&report.dated_lifecycle_events)
                {
                    lines.push(format!("- {}", problem));
                }
                lines.join("\n")
            })?;
            if !ok {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Version => emit(ctx, &version::info(), || format!("century {}", version::LABEL)),
    }
}

fn run_habit(ctx: &AppContext, store: &HabitStore, command: HabitCommand) -> Result<()> {
    let owner = ctx.owner.as_str();
    match command {
        HabitCommand::Add { name, order } => {
            let habit = store.create_habit(owner, &name, order)?;
            emit(ctx, &habit, || format!("{}  {}", habit.id, habit.name))
        }
        HabitCommand::List => {
            let habits = store.list_habits(owner)?;
            emit(ctx, &habits, || render_habit_list(&habits))
        }
        HabitCommand::Rename { habit, name } => {
            let habit = store.rename_habit(owner, &HabitId::from(habit.as_str()), &name)?;
            emit(ctx, &habit, || format!("{}  {}", habit.id, habit.name))
        }
        HabitCommand::Reorder { habits } => {
            let ordered: Vec<HabitId> = habits
                .iter()
                .map(|id| HabitId::from(id.as_str()))
                .collect();
            let habits = store.reorder_habits(owner, &ordered)?;
            emit(ctx, &habits, || render_habit_list(&habits))
        }
        HabitCommand::Delete { habit } => {
            let habit = store.delete_habit(owner, &HabitId::from(habit.as_str()))?;
            emit(ctx, &habit, || format!("deleted {}", habit.id))
        }
    }
}

fn emit<T: Serialize>(
    ctx: &AppContext,
    value: &T,
    text: impl FnOnce() -> String,
) -> Result<()> {
    if ctx.json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}

fn day_or_today(date: Option<NaiveDate>) -> NaiveDate {
    date.unwrap_or_else(|| Local::now().date_naive())
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env("CENTURY_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
