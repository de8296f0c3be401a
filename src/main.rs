//! swamp - command-line client for SwampScheduler
//!
//! Signs in against the SwampScheduler API, manages tasks and shared boards,
//! and runs Pomodoro focus sessions with XP and achievement notifications.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use swamp_client::application::boards::columns;
use swamp_client::application::commands::{
    AppState, TaskEdit, TaskOrder, achievements_impl, add_board_task_impl, answer_invite_impl,
    board_members_impl, board_tasks_impl, complete_task_impl, create_board_impl,
    create_task_impl, delete_board_impl, delete_task_impl, health_impl, invite_member_impl,
    list_boards_impl, list_invites_impl, list_tasks_impl, login_impl, logout_impl,
    move_board_task_impl, register_impl, remove_member_impl, set_work_duration_impl,
    start_focus_impl, stats_impl, update_profile_impl, update_task_impl, weekly_stats_impl,
    xp_impl,
};
use swamp_client::domain::boards::BoardTask;
use swamp_client::domain::models::{NotificationEvent, Task};
use swamp_client::{
    InfraError, NotificationQueue, NotificationSink, RunState, SessionOutcome, run_display,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How long a finished focus session may take to be recorded at exit.
const REPORT_GRACE: Duration = Duration::from_secs(15);

const FOCUS_HELP: &str = "keys: p + Enter pause/resume, d + Enter dismiss, s + Enter stop";

#[derive(Parser)]
#[command(name = "swamp")]
#[command(about = "SwampScheduler client: tasks, XP and Pomodoro focus sessions")]
#[command(version)]
struct Cli {
    /// Workspace directory holding config/, state/ and logs/
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the workspace layout and default config files
    Init,

    /// Check that the API is reachable
    Health,

    /// Create an account
    Register {
        #[arg(short, long)]
        email: String,

        /// Password (falls back to SWAMP_PASSWORD)
        #[arg(short, long)]
        password: Option<String>,

        #[arg(short, long)]
        username: Option<String>,
    },

    /// Sign in and store the access token in the system keyring
    Login {
        #[arg(short, long)]
        email: String,

        /// Password (falls back to SWAMP_PASSWORD)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Sign out and forget cached data
    Logout,

    /// Manage tasks
    Tasks {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Show level and XP progress
    Xp,

    /// List earned achievements
    Achievements,

    /// Completed task count for a date range (defaults to today)
    Stats {
        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,
    },

    /// Completed tasks per day over the last week
    Week,

    /// Edit academic details on your profile
    Profile {
        #[arg(long)]
        major: Option<String>,

        #[arg(long)]
        year: Option<String>,
    },

    /// Shared boards
    Boards {
        #[command(subcommand)]
        command: BoardCommands,
    },

    /// Pending board invites
    Invites {
        #[command(subcommand)]
        command: InviteCommands,
    },

    /// Persist the default focus length in seconds
    Duration { seconds: u32 },

    /// Run one focus session until it completes or Ctrl-C
    Focus {
        /// Override the configured work duration for this session
        #[arg(short, long)]
        seconds: Option<u32>,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// List tasks
    List {
        #[arg(short, long, value_enum, default_value_t = SortArg::Server)]
        sort: SortArg,
    },

    /// Create a task
    Add {
        title: String,

        #[arg(short, long)]
        description: Option<String>,

        /// Due date as YYYY-MM-DD
        #[arg(long)]
        due: Option<String>,

        /// Low, Medium or High
        #[arg(short, long)]
        priority: Option<String>,
    },

    /// Toggle completion of a task
    Done { id: String },

    /// Change fields of a task
    Edit {
        id: String,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long)]
        due: Option<String>,

        #[arg(short, long)]
        priority: Option<String>,
    },

    /// Delete a task
    Rm { id: String },
}

#[derive(Subcommand)]
enum BoardCommands {
    /// List boards you belong to
    List,

    /// Create a board you own
    Create {
        name: String,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Delete a board (owner or admin)
    Rm { board: String },

    /// Show a board's tasks by column
    Tasks { board: String },

    /// Add a task to a board's To Do column
    AddTask {
        board: String,

        title: String,

        #[arg(short, long)]
        description: Option<String>,

        /// Due date as YYYY-MM-DD
        #[arg(long)]
        due: Option<String>,

        /// Low, Medium or High
        #[arg(short, long)]
        priority: Option<String>,

        /// Username the task is assigned to
        #[arg(short, long)]
        assign: Option<String>,
    },

    /// Move a board task to todo, in_progress or done
    Move {
        board: String,
        task: String,
        status: String,
    },

    /// Invite a user by username (owner or admin)
    Invite { board: String, username: String },

    /// List a board's members
    Members { board: String },

    /// Remove a member by id or username (owner only)
    Kick { board: String, member: String },
}

#[derive(Subcommand)]
enum InviteCommands {
    /// List pending invites
    List,

    /// Join the board an invite is for
    Accept { id: String },

    /// Decline an invite
    Decline { id: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Server,
    Priority,
    Deadline,
}

impl From<SortArg> for TaskOrder {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Server => Self::Server,
            SortArg::Priority => Self::Priority,
            SortArg::Deadline => Self::Deadline,
        }
    }
}

struct StdoutSink;

impl NotificationSink for StdoutSink {
    fn show(&self, event: &NotificationEvent) {
        println!("\n{}", describe_event(event));
    }

    fn hide(&self, _event: &NotificationEvent) {}
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("swamp_client=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let root = match cli.root {
        Some(path) => path,
        None => std::env::current_dir().context("failed to resolve current directory")?,
    };
    let state = AppState::new(root.clone())
        .with_context(|| format!("failed to initialize workspace at {}", root.display()))?;

    match cli.command {
        Commands::Init => {
            println!("Workspace ready at {}", root.display());
            println!("  config:   {}", state.config_dir().display());
            println!("  database: {}", state.database_path().display());
            println!("  api:      {}", state.config().api_base_url);
        }

        Commands::Health => {
            let status = health_impl(&state)
                .await
                .map_err(|error| fail(&state, "health", error))?;
            println!("API {}: {status}", state.config().api_base_url);
        }

        Commands::Register {
            email,
            password,
            username,
        } => {
            let password = resolve_password(password)?;
            let message = register_impl(&state, email, password, username)
                .await
                .map_err(|error| fail(&state, "register", error))?;
            println!("{message}");
        }

        Commands::Login { email, password } => {
            let password = resolve_password(password)?;
            let token = login_impl(&state, email, password)
                .await
                .map_err(|error| fail(&state, "login", error))?;
            let name = token
                .user
                .as_ref()
                .and_then(|user| user.username.clone().or_else(|| user.email.clone()))
                .unwrap_or_else(|| token.account_key());
            println!("Signed in as {name}");
        }

        Commands::Logout => {
            let was_signed_in = logout_impl(&state)
                .await
                .map_err(|error| fail(&state, "logout", error))?;
            if was_signed_in {
                println!("Signed out");
            } else {
                println!("Not signed in");
            }
        }

        Commands::Tasks { command } => run_task_command(&state, command).await?,

        Commands::Xp => {
            let xp = xp_impl(&state).await.map_err(|error| fail(&state, "xp", error))?;
            println!("Level {} - {}", xp.level, xp.level_name);
            if xp.is_max_level() {
                println!("{} XP (max level)", xp.total_xp);
            } else {
                println!(
                    "{} XP | {}/{} this level ({}%) | {} to next level",
                    xp.total_xp,
                    xp.xp_in_level(),
                    xp.xp_needed_for_level(),
                    xp.progress_percent,
                    xp.xp_to_next_level
                );
            }
        }

        Commands::Achievements => {
            let achievements = achievements_impl(&state)
                .await
                .map_err(|error| fail(&state, "achievements", error))?;
            if achievements.is_empty() {
                println!("No achievements yet");
            }
            for achievement in achievements {
                println!(
                    "{} {} (+{} XP) - {}",
                    achievement.icon, achievement.name, achievement.xp_reward, achievement.description
                );
            }
        }

        Commands::Stats { start, end } => {
            let stats = stats_impl(&state, start, end)
                .await
                .map_err(|error| fail(&state, "stats", error))?;
            println!(
                "{} tasks completed between {} and {}",
                stats.total_completed, stats.start_date, stats.end_date
            );
        }

        Commands::Week => {
            let week = weekly_stats_impl(&state)
                .await
                .map_err(|error| fail(&state, "week", error))?;
            let widest = week.days().map(|(_, count)| count).max().unwrap_or(0).max(1);
            for (label, count) in week.days() {
                let bar = "#".repeat((count * 20 / widest) as usize);
                println!("{label:>10} {count:>3} {bar}");
            }
            match week.busiest_day() {
                Some((label, count)) => {
                    println!("{} tasks this week; busiest day {label} ({count})", week.total())
                }
                None => println!("No tasks completed this week"),
            }
        }

        Commands::Profile { major, year } => {
            let user = update_profile_impl(&state, major, year)
                .await
                .map_err(|error| fail(&state, "profile", error))?;
            println!(
                "Profile saved: major {}, year {}",
                user.major.as_deref().unwrap_or("-"),
                user.year.as_deref().unwrap_or("-")
            );
        }

        Commands::Boards { command } => run_board_command(&state, command).await?,

        Commands::Invites { command } => run_invite_command(&state, command).await?,

        Commands::Duration { seconds } => {
            let snapshot = set_work_duration_impl(&state, seconds)
                .map_err(|error| fail(&state, "duration", error))?;
            println!("Focus length set to {}", snapshot.format_remaining());
        }

        Commands::Focus { seconds } => run_focus(&state, seconds).await?,
    }

    Ok(())
}

async fn run_task_command(state: &AppState, command: TaskCommands) -> Result<()> {
    match command {
        TaskCommands::List { sort } => {
            let listing = list_tasks_impl(state, sort.into())
                .await
                .map_err(|error| fail(state, "tasks list", error))?;
            if listing.from_cache {
                println!("(offline: showing cached tasks)");
            }
            if listing.tasks.is_empty() {
                println!("No tasks");
            }
            for task in &listing.tasks {
                println!("{}", describe_task(task));
            }
        }

        TaskCommands::Add {
            title,
            description,
            due,
            priority,
        } => {
            let task = create_task_impl(state, title, description, due, priority)
                .await
                .map_err(|error| fail(state, "tasks add", error))?;
            println!("Created {}", describe_task(&task));
        }

        TaskCommands::Done { id } => {
            let cancel = CancellationToken::new();
            let interrupt = {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        cancel.cancel();
                    }
                })
            };
            let result = complete_task_impl(state, id, cancel).await;
            interrupt.abort();
            let outcome = result.map_err(|error| fail(state, "tasks done", error))?;

            println!("{}", describe_task(&outcome.task));
            let events = state
                .notifications()
                .take_all()
                .map_err(|error| fail(state, "tasks done", error))?;
            for event in events {
                println!("{}", describe_event(&event));
            }
        }

        TaskCommands::Edit {
            id,
            title,
            description,
            due,
            priority,
        } => {
            let edit = TaskEdit {
                title,
                description,
                due_date: due,
                priority,
            };
            let task = update_task_impl(state, id, edit)
                .await
                .map_err(|error| fail(state, "tasks edit", error))?;
            println!("Updated {}", describe_task(&task));
        }

        TaskCommands::Rm { id } => {
            delete_task_impl(state, id.clone())
                .await
                .map_err(|error| fail(state, "tasks rm", error))?;
            println!("Deleted task {id}");
        }
    }
    Ok(())
}

async fn run_board_command(state: &AppState, command: BoardCommands) -> Result<()> {
    match command {
        BoardCommands::List => {
            let boards = list_boards_impl(state)
                .await
                .map_err(|error| fail(state, "boards list", error))?;
            if boards.is_empty() {
                println!("No boards");
            }
            for board in boards {
                let description = board
                    .description
                    .map(|text| format!(" - {text}"))
                    .unwrap_or_default();
                println!("{:>4}  {} [{}]{description}", board.id, board.name, board.role.as_str());
            }
        }

        BoardCommands::Create { name, description } => {
            let board = create_board_impl(state, name, description)
                .await
                .map_err(|error| fail(state, "boards create", error))?;
            println!("Created board {} ({})", board.name, board.id);
        }

        BoardCommands::Rm { board } => {
            let board = delete_board_impl(state, board)
                .await
                .map_err(|error| fail(state, "boards rm", error))?;
            println!("Deleted board {}", board.name);
        }

        BoardCommands::Tasks { board } => {
            let tasks = board_tasks_impl(state, board)
                .await
                .map_err(|error| fail(state, "boards tasks", error))?;
            for (status, column) in columns(&tasks) {
                println!("{} ({})", status.title(), column.len());
                for task in column {
                    println!("  {}", describe_board_task(task));
                }
            }
        }

        BoardCommands::AddTask {
            board,
            title,
            description,
            due,
            priority,
            assign,
        } => {
            let task = add_board_task_impl(state, board, title, description, due, priority, assign)
                .await
                .map_err(|error| fail(state, "boards add-task", error))?;
            println!("Added {}", describe_board_task(&task));
        }

        BoardCommands::Move {
            board,
            task,
            status,
        } => {
            let status = move_board_task_impl(state, board, task.clone(), status)
                .await
                .map_err(|error| fail(state, "boards move", error))?;
            println!("Moved task {task} to {}", status.title());
        }

        BoardCommands::Invite { board, username } => {
            let message = invite_member_impl(state, board, username)
                .await
                .map_err(|error| fail(state, "boards invite", error))?;
            println!("{message}");
        }

        BoardCommands::Members { board } => {
            let members = board_members_impl(state, board)
                .await
                .map_err(|error| fail(state, "boards members", error))?;
            for member in &members.members {
                println!("{:>4}  {} ({})", member.id, member.display_name(), member.role.as_str());
            }
            if members.is_owner {
                println!("You own this board");
            }
        }

        BoardCommands::Kick { board, member } => {
            let removed = remove_member_impl(state, board, member)
                .await
                .map_err(|error| fail(state, "boards kick", error))?;
            println!("{} has been removed from the board", removed.display_name());
        }
    }
    Ok(())
}

async fn run_invite_command(state: &AppState, command: InviteCommands) -> Result<()> {
    match command {
        InviteCommands::List => {
            let invites = list_invites_impl(state)
                .await
                .map_err(|error| fail(state, "invites list", error))?;
            if invites.is_empty() {
                println!("No pending invites");
            }
            for invite in invites {
                let from = invite
                    .invited_by
                    .map(|name| format!(" from {name}"))
                    .unwrap_or_default();
                println!("{:>4}  {}{from}", invite.id, invite.board_name);
                if let Some(message) = invite.message {
                    println!("      \"{message}\"");
                }
            }
        }

        InviteCommands::Accept { id } => {
            answer_invite_impl(state, id.clone(), true)
                .await
                .map_err(|error| fail(state, "invites accept", error))?;
            println!("Joined board from invite {id}");
        }

        InviteCommands::Decline { id } => {
            answer_invite_impl(state, id.clone(), false)
                .await
                .map_err(|error| fail(state, "invites decline", error))?;
            println!("Declined invite {id}");
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FocusKey {
    PauseResume,
    Dismiss,
    Stop,
    Help,
}

enum FocusEvent {
    Stop,
    Key(FocusKey),
    InputClosed,
    Finished(Option<SessionOutcome>),
    Tick,
}

fn parse_focus_key(line: &str) -> Option<FocusKey> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" => None,
        "p" | "pause" | "resume" => Some(FocusKey::PauseResume),
        "d" | "dismiss" => Some(FocusKey::Dismiss),
        "s" | "stop" | "q" => Some(FocusKey::Stop),
        _ => Some(FocusKey::Help),
    }
}

/// Reads keys on a plain thread: a blocking stdin read inside the runtime
/// would keep it from shutting down.
fn spawn_key_reader() -> mpsc::UnboundedReceiver<FocusKey> {
    let (keys, receiver) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if let Some(key) = parse_focus_key(&line) {
                if keys.send(key).is_err() {
                    break;
                }
            }
        }
    });
    receiver
}

fn dismiss_notification(notifications: &NotificationQueue) {
    match notifications.dismiss() {
        Ok(Some(_)) => println!("\n(dismissed)"),
        Ok(None) => {}
        Err(error) => tracing::warn!(%error, "failed to dismiss notification"),
    }
}

async fn run_focus(state: &AppState, seconds: Option<u32>) -> Result<()> {
    let pomodoro = state.pomodoro();
    let notifications = state.notifications();
    let mut outcomes = pomodoro.subscribe();

    let snapshot = start_focus_impl(state, seconds)
        .await
        .map_err(|error| fail(state, "focus", error))?;
    println!("Focus session started ({})", snapshot.format_remaining());
    println!("{FOCUS_HELP}");

    let cancel = CancellationToken::new();
    let mut ticker = {
        let pomodoro = Arc::clone(&pomodoro);
        let cancel = cancel.clone();
        tokio::spawn(async move { pomodoro.run_ticker(cancel).await })
    };
    let display = tokio::spawn(run_display(
        Arc::clone(&notifications),
        Arc::new(StdoutSink),
        cancel.clone(),
    ));

    let mut keys = spawn_key_reader();
    let mut keys_open = true;
    let mut waiting_for_report = false;
    let mut quit_early = false;
    let mut clock = tokio::time::interval(Duration::from_secs(1));
    let finished = loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => FocusEvent::Stop,
            key = keys.recv(), if keys_open => key.map_or(FocusEvent::InputClosed, FocusEvent::Key),
            changed = outcomes.changed() => {
                changed.context("pomodoro service dropped")?;
                FocusEvent::Finished(outcomes.borrow().clone())
            }
            _ = clock.tick() => FocusEvent::Tick,
        };

        match event {
            FocusEvent::Finished(outcome) => break outcome,
            FocusEvent::InputClosed => keys_open = false,
            FocusEvent::Tick => {
                let snapshot = pomodoro.snapshot().map_err(|error| fail(state, "focus", error))?;
                let paused = if snapshot.run_state == RunState::Paused { " (paused)" } else { "" };
                print!("\r{}{paused}   ", snapshot.format_remaining());
                std::io::stdout().flush().ok();
            }
            FocusEvent::Key(FocusKey::PauseResume) => {
                let snapshot = pomodoro.toggle_pause().map_err(|error| fail(state, "focus", error))?;
                match snapshot.run_state {
                    RunState::Paused => println!("\nPaused at {}", snapshot.format_remaining()),
                    RunState::Running => println!("\nResumed"),
                    RunState::Stopped => {}
                }
            }
            FocusEvent::Key(FocusKey::Dismiss) => dismiss_notification(&notifications),
            FocusEvent::Key(FocusKey::Help) => println!("\n{FOCUS_HELP}"),
            FocusEvent::Stop | FocusEvent::Key(FocusKey::Stop) => {
                if waiting_for_report {
                    println!("\nQuitting before the server confirmed the session");
                    quit_early = true;
                    break None;
                }
                // An expired countdown has already handed its session off for
                // reporting; there is nothing left to stop.
                let discarded = pomodoro.abandon().map_err(|error| fail(state, "focus", error))?;
                if discarded.is_some() {
                    println!("\nSession stopped; no XP awarded");
                    break None;
                }
                waiting_for_report = true;
                println!("\nTime is up; recording the session (stop again to quit without waiting)");
            }
        }
    };

    match finished {
        Some(SessionOutcome::Completed { award, .. }) => {
            println!("\nSession complete!");
            if award.xp_awarded == 0 && award.achievements_earned.is_empty() {
                println!("No XP this time");
            }
            while !notifications.is_idle().unwrap_or(true) {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    key = keys.recv(), if keys_open => match key {
                        Some(FocusKey::Dismiss) => dismiss_notification(&notifications),
                        Some(FocusKey::Stop) => break,
                        Some(_) => {}
                        None => keys_open = false,
                    },
                    _ = tokio::time::sleep(Duration::from_millis(250)) => {}
                }
            }
        }
        Some(SessionOutcome::Abandoned { error, .. }) => {
            println!("\nSession finished but could not be reported: {error}");
        }
        None => {}
    }

    cancel.cancel();
    if quit_early {
        ticker.abort();
    } else {
        match tokio::time::timeout(REPORT_GRACE, &mut ticker).await {
            Ok(joined) => joined.context("ticker task panicked")??,
            Err(_) => {
                tracing::warn!("session report still pending at exit; giving up");
                ticker.abort();
            }
        }
    }
    display.await.context("display task panicked")??;
    Ok(())
}

fn resolve_password(password: Option<String>) -> Result<String> {
    password
        .or_else(|| std::env::var("SWAMP_PASSWORD").ok())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("password required: pass --password or set SWAMP_PASSWORD"))
}

fn fail(state: &AppState, command: &str, error: InfraError) -> anyhow::Error {
    anyhow!(state.command_error(command, &error))
}

fn describe_task(task: &Task) -> String {
    let mark = if task.completed { "x" } else { " " };
    let due = task
        .due_date
        .map(|date| format!(" due {date}"))
        .unwrap_or_default();
    format!(
        "[{mark}] {:>4}  {} ({}){due}",
        task.id,
        task.title,
        task.priority.as_str()
    )
}

fn describe_board_task(task: &BoardTask) -> String {
    let assignee = task
        .assigned_to
        .as_deref()
        .map(|name| format!(" @{name}"))
        .unwrap_or_default();
    let due = task
        .due_date
        .map(|date| format!(" due {date}"))
        .unwrap_or_default();
    format!(
        "{:>4}  {} ({}){assignee}{due}",
        task.id,
        task.title,
        task.priority.as_str()
    )
}

fn describe_event(event: &NotificationEvent) -> String {
    match event {
        NotificationEvent::Xp { xp_amount, reason } => match reason {
            Some(reason) => format!("+{xp_amount} XP  {reason}"),
            None => format!("+{xp_amount} XP"),
        },
        NotificationEvent::Achievement(achievement) => format!(
            "{} Achievement unlocked: {} - {}",
            achievement.icon, achievement.name, achievement.description
        ),
        NotificationEvent::LevelUp { level, level_name } => {
            format!("Level up! You are now level {level}: {level_name}")
        }
    }
}
