//! Interactive timer session.
//!
//! Runs the session coordinator on a tokio event loop: a 100 ms interval
//! drives the timer, and commands read from stdin arrive over a channel
//! together with the result of the startup update check. Every event is
//! printed to stdout as one JSON line; the session ends once stdout is gone.
//! Settings are re-read before each start and on `reload`, so edits made
//! with other `focuswall` commands reach the running session.

use std::io::{self, Write};
use std::time::Duration;

use clap::Subcommand;
use focuswall_core::filter::{CommandProxy, OsLauncher};
use focuswall_core::storage::{data_dir, Database};
use focuswall_core::{
    Config, Event, FilterProcessManager, NoticeLevel, SessionCoordinator, TaskType,
    UpdateChecker, UpdateError, UpdateStatus, TICK_RESOLUTION_MS,
};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::update::VERSION;
use super::SELECTED_TASK_KEY;

const INPUT_CAPACITY: usize = 32;

const HELP: &str = "commands: start | pause | skip | stop | status | reload | \
                    select <task-id> | current [<task-id>] | done | workspace <id> | help | quit";

#[derive(Subcommand)]
pub enum SessionAction {
    /// Run a session, reading commands from stdin (end of input quits)
    Run {
        /// Start the first work duration right away
        #[arg(long)]
        start: bool,
        /// Do not check for a newer release
        #[arg(long)]
        no_update_check: bool,
    },
}

enum Input {
    Line(String),
    Closed,
    Update(Result<UpdateStatus, UpdateError>),
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Start,
    Pause,
    Skip,
    Stop,
    Status,
    Reload,
    Select(String),
    Current(Option<String>),
    Done,
    Workspace(String),
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let command = match (words.next(), words.next()) {
        (Some("start"), None) => Command::Start,
        (Some("pause"), None) => Command::Pause,
        (Some("skip"), None) => Command::Skip,
        (Some("stop"), None) => Command::Stop,
        (Some("status"), None) => Command::Status,
        (Some("reload"), None) => Command::Reload,
        (Some("select"), Some(id)) => Command::Select(id.to_string()),
        (Some("current"), id) => Command::Current(id.map(str::to_string)),
        (Some("done"), None) => Command::Done,
        (Some("workspace"), Some(id)) => Command::Workspace(id.to_string()),
        (Some("help"), None) => Command::Help,
        (Some("quit" | "exit"), None) => Command::Quit,
        _ => return Err(format!("unknown command '{}'; {HELP}", line.trim())),
    };
    if words.next().is_some() {
        return Err(format!("too many arguments in '{}'", line.trim()));
    }
    Ok(command)
}

/// Countdown lines are printed once per second.
fn should_print(event: &Event) -> bool {
    match event {
        Event::Countdown { remaining_ms } => remaining_ms % 1000 == 0,
        _ => true,
    }
}

fn write_events(out: &mut impl Write, events: &[Event]) -> io::Result<()> {
    for event in events.iter().filter(|e| should_print(e)) {
        match serde_json::to_string(event) {
            Ok(line) => writeln!(out, "{line}")?,
            Err(e) => warn!(error = %e, kind = event.kind(), "failed to serialize event"),
        }
    }
    out.flush()
}

fn emit(events: Vec<Event>) -> io::Result<()> {
    write_events(&mut io::stdout().lock(), &events)
}

fn error_notice(e: impl std::fmt::Display) -> Vec<Event> {
    vec![Event::notice(NoticeLevel::Error, e.to_string())]
}

fn update_events(result: Result<UpdateStatus, UpdateError>) -> Vec<Event> {
    match result {
        Ok(status) => status.into_event(VERSION).into_iter().collect(),
        Err(UpdateError::NetworkUnreachable(message)) => {
            debug!(%message, "update check skipped");
            vec![Event::notice(
                NoticeLevel::Info,
                "Could not check for updates: network unreachable",
            )]
        }
        Err(e) => vec![Event::notice(NoticeLevel::Warning, e.to_string())],
    }
}

struct Session {
    coordinator: SessionCoordinator,
    tasks: Database,
}

impl Session {
    fn open(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let manager = FilterProcessManager::new(
            Box::new(OsLauncher),
            Box::new(CommandProxy::new(
                config.filter.proxy_service.clone(),
                config.filter.command_timeout(),
            )),
            data_dir()?,
            config.filter.grace_period(),
        )?;
        let mut coordinator =
            SessionCoordinator::new(Box::new(Database::open()?), Box::new(manager), config)?;
        let tasks = Database::open()?;

        let selected = tasks.kv_get(SELECTED_TASK_KEY)?.filter(|id| !id.is_empty());
        if let Some(id) = selected {
            if let Err(e) = coordinator.select_task(Some(&id)) {
                debug!(task = %id, error = %e, "stored selection no longer applies");
            }
        }
        Ok(Self { coordinator, tasks })
    }

    /// Re-read the config file and the active workspace.
    fn refresh(&mut self) -> Vec<Event> {
        match Config::load() {
            Ok(config) => self
                .coordinator
                .refresh_settings(&config)
                .unwrap_or_else(error_notice),
            Err(e) => {
                warn!(error = %e, "failed to reload config");
                error_notice(e)
            }
        }
    }

    /// `Ok(false)` when the session should end.
    fn handle(&mut self, line: &str) -> io::Result<bool> {
        let command = match parse_command(line) {
            Ok(command) => command,
            Err(message) => {
                emit(error_notice(message))?;
                return Ok(true);
            }
        };
        debug!(?command, "session command");
        let events = match command {
            Command::Quit => return Ok(false),
            Command::Start => {
                let mut events = if self.coordinator.engine().is_ticking() {
                    Vec::new()
                } else {
                    self.refresh()
                };
                events.extend(self.coordinator.start());
                events
            }
            Command::Reload => self.refresh(),
            Command::Pause => self.coordinator.pause(),
            Command::Skip => self.coordinator.skip().unwrap_or_else(error_notice),
            Command::Stop => self.coordinator.stop(),
            Command::Status => self.coordinator.status(),
            Command::Select(id) => self
                .coordinator
                .select_task(Some(&id))
                .unwrap_or_else(error_notice),
            Command::Current(id) => self
                .coordinator
                .set_current_task(id.as_deref())
                .unwrap_or_else(error_notice),
            Command::Done => self.complete_current(),
            Command::Workspace(id) => self
                .coordinator
                .switch_workspace(&id)
                .unwrap_or_else(error_notice),
            Command::Help => vec![Event::notice(NoticeLevel::Info, HELP)],
        };
        emit(events)?;
        Ok(true)
    }

    fn complete_current(&mut self) -> Vec<Event> {
        let Some(id) = self.coordinator.current_task().map(|t| t.id.clone()) else {
            return error_notice("no current task");
        };
        let mut events = self.coordinator.task_completed(&id);
        if let Err(e) = self.tasks.set_task_type(&id, TaskType::Completed) {
            warn!(task = %id, error = %e, "failed to complete task");
            events.extend(error_notice(e));
        }
        events
    }
}

async fn read_stdin(tx: mpsc::Sender<Input>) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => {
                if tx.send(Input::Line(line)).await.is_err() {
                    return;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "failed to read stdin");
                break;
            }
        }
    }
    let _ = tx.send(Input::Closed).await;
}

async fn event_loop(session: &mut Session, start: bool, checker: Option<UpdateChecker>) {
    match drive(session, start, checker).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => debug!("stdout closed"),
        Err(e) => warn!(error = %e, "failed to write events"),
    }
}

/// Runs until quit, end of input, Ctrl-C, or a failed write to stdout.
async fn drive(
    session: &mut Session,
    start: bool,
    checker: Option<UpdateChecker>,
) -> io::Result<()> {
    let (tx, mut rx) = mpsc::channel(INPUT_CAPACITY);

    if let Some(checker) = checker {
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = checker.check(VERSION).await;
            let _ = tx.send(Input::Update(result)).await;
        });
    }
    tokio::spawn(read_stdin(tx));

    emit(vec![session.coordinator.snapshot()])?;
    if start {
        emit(session.coordinator.start())?;
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(TICK_RESOLUTION_MS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => emit(session.coordinator.tick())?,
            input = rx.recv() => match input {
                Some(Input::Line(line)) => {
                    if !session.handle(&line)? {
                        return Ok(());
                    }
                }
                Some(Input::Update(result)) => emit(update_events(result))?,
                Some(Input::Closed) | None => {
                    debug!("end of input");
                    return Ok(());
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                return Ok(());
            }
        }
    }
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SessionAction::Run {
            start,
            no_update_check,
        } => {
            let config = Config::load()?;
            let mut session = Session::open(&config)?;
            let checker = if config.update.check_on_startup && !no_update_check {
                match UpdateChecker::from_config(&config.update) {
                    Ok(checker) => Some(checker),
                    Err(e) => {
                        emit(update_events(Err(e)))?;
                        None
                    }
                }
            } else {
                None
            };

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(event_loop(&mut session, start, checker));
            // Dropping the runtime detaches the blocked stdin reader.
            runtime.shutdown_background();

            let events = session.coordinator.shutdown();
            if let Err(e) = emit(events) {
                debug!(error = %e, "shutdown events not written");
            }
        }
    }
    Ok(())
}
