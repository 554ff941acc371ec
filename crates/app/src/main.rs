use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use services::{AppServices, Clock, StudyConfig, StudyController, SyncEvent};
use study_core::aggregate::{Completion, TestReport};
use study_core::grading::SubmitOutcome;
use study_core::model::{TestId, UserId};
use study_core::timer::{self, TickOutcome};
use tracing_subscriber::EnvFilter;

#[derive(Debug, PartialEq, Eq)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArgument { what: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidNumber { what: &'static str, raw: String },
    InvalidDate { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArgument { what } => write!(f, "missing {what}"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ArgsError::InvalidNumber { what, raw } => write!(f, "invalid {what}: {raw}"),
            ArgsError::InvalidDate { raw } => write!(f, "invalid date (want YYYY-MM-DD): {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

/// A command named a test, section or question that does not exist.
#[derive(Debug)]
enum LookupError {
    Test(TestId),
    Section(String),
    Question(usize),
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::Test(id) => write!(f, "no test with id {id}"),
            LookupError::Section(name) => write!(f, "no section named `{name}`"),
            LookupError::Question(n) => write!(f, "no question #{n} in that section"),
        }
    }
}

impl std::error::Error for LookupError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage: study [--db <sqlite_url>] [--config <file>] [--user <uid> [--email <addr>]] <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  list [--search <term>]");
    eprintln!("  import-key <file> [--title <t>] [--subject <s>]");
    eprintln!("  submit <test-id> <section> <question#> <answer>");
    eprintln!("  submit-all <test-id> <section>");
    eprintln!("  report <test-id>");
    eprintln!("  export [<test-id>]");
    eprintln!("  export-key <test-id>");
    eprintln!("  import <file>");
    eprintln!("  delete <test-id>");
    eprintln!("  timer <test-id> <minutes> [goal]       # 0 minutes counts up");
    eprintln!("  timer-run <test-id> <seconds>");
    eprintln!("  todo add <text> [--due YYYY-MM-DD] | done <n> | rm <n> | clear | list");
    eprintln!("  link add <name> <url> | rm <n> | list");
    eprintln!("  theme [toggle]");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  STUDY_DB_URL, STUDY_DEBOUNCE_MS, STUDY_LOG, RUST_LOG");
}

#[derive(Debug, PartialEq, Eq)]
enum TodoCommand {
    Add { text: String, due: Option<NaiveDate> },
    Done(usize),
    Remove(usize),
    Clear,
    List,
}

#[derive(Debug, PartialEq, Eq)]
enum LinkCommand {
    Add { name: String, url: String },
    Remove(usize),
    List,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    List { search: String },
    ImportKey { file: PathBuf, title: String, subject: String },
    Submit { test: TestId, section: String, question: usize, answer: String },
    SubmitAll { test: TestId, section: String },
    Report { test: TestId },
    Export { test: Option<TestId> },
    ExportKey { test: TestId },
    Import { file: PathBuf },
    Delete { test: TestId },
    Timer { test: TestId, minutes: i64, goal: u32 },
    TimerRun { test: TestId, seconds: u64 },
    Todo(TodoCommand),
    Link(LinkCommand),
    Theme { toggle: bool },
}

impl Command {
    fn mutates_library(&self) -> bool {
        matches!(
            self,
            Command::ImportKey { .. }
                | Command::Submit { .. }
                | Command::SubmitAll { .. }
                | Command::Import { .. }
                | Command::Delete { .. }
                | Command::Timer { .. }
                | Command::TimerRun { .. }
        )
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Args {
    db_url: Option<String>,
    config: Option<PathBuf>,
    user: Option<UserId>,
    email: Option<String>,
    command: Command,
}

/// Flags accepted anywhere on the line; positionals are collected in order.
#[derive(Default)]
struct Flags {
    db_url: Option<String>,
    config: Option<PathBuf>,
    user: Option<String>,
    email: Option<String>,
    search: Option<String>,
    title: Option<String>,
    subject: Option<String>,
    due: Option<String>,
}

fn parse_number<T: std::str::FromStr>(what: &'static str, raw: &str) -> Result<T, ArgsError> {
    raw.trim().parse().map_err(|_| ArgsError::InvalidNumber {
        what,
        raw: raw.to_owned(),
    })
}

/// 1-based position on the command line to a 0-based index.
fn parse_position(what: &'static str, raw: &str) -> Result<usize, ArgsError> {
    match parse_number::<usize>(what, raw)? {
        0 => Err(ArgsError::InvalidNumber {
            what,
            raw: raw.to_owned(),
        }),
        n => Ok(n - 1),
    }
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, ArgsError> {
        let mut flags = Flags::default();
        let mut positionals: Vec<String> = Vec::new();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    flags.db_url = Some(normalize_sqlite_url(value));
                }
                "--config" => flags.config = Some(require_value(&mut args, "--config")?.into()),
                "--user" => flags.user = Some(require_value(&mut args, "--user")?),
                "--email" => flags.email = Some(require_value(&mut args, "--email")?),
                "--search" => flags.search = Some(require_value(&mut args, "--search")?),
                "--title" => flags.title = Some(require_value(&mut args, "--title")?),
                "--subject" => flags.subject = Some(require_value(&mut args, "--subject")?),
                "--due" => flags.due = Some(require_value(&mut args, "--due")?),
                flag if flag.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => positionals.push(arg),
            }
        }

        let command = parse_command(positionals, &mut flags)?;
        Ok(Self {
            db_url: flags.db_url,
            config: flags.config,
            user: flags.user.filter(|u| !u.trim().is_empty()).map(UserId::new),
            email: flags.email,
            command,
        })
    }
}

fn parse_command(positionals: Vec<String>, flags: &mut Flags) -> Result<Command, ArgsError> {
    let mut pos = positionals.into_iter();
    let mut next = |what: &'static str| -> Result<String, ArgsError> {
        pos.next().ok_or(ArgsError::MissingArgument { what })
    };

    let name = next("command")?;
    let command = match name.as_str() {
        "list" => Command::List {
            search: flags.search.take().unwrap_or_default(),
        },
        "import-key" => Command::ImportKey {
            file: next("key file")?.into(),
            title: flags.title.take().unwrap_or_default(),
            subject: flags.subject.take().unwrap_or_default(),
        },
        "submit" => Command::Submit {
            test: TestId::new(next("test id")?),
            section: next("section")?,
            question: parse_position("question number", &next("question number")?)?,
            answer: next("answer")?,
        },
        "submit-all" => Command::SubmitAll {
            test: TestId::new(next("test id")?),
            section: next("section")?,
        },
        "report" => Command::Report {
            test: TestId::new(next("test id")?),
        },
        "export" => Command::Export {
            test: next("test id").ok().map(TestId::new),
        },
        "export-key" => Command::ExportKey {
            test: TestId::new(next("test id")?),
        },
        "import" => Command::Import {
            file: next("backup file")?.into(),
        },
        "delete" => Command::Delete {
            test: TestId::new(next("test id")?),
        },
        "timer" => Command::Timer {
            test: TestId::new(next("test id")?),
            minutes: parse_number("minutes", &next("minutes")?)?,
            goal: next("goal")
                .ok()
                .map(|raw| parse_number("goal", &raw))
                .transpose()?
                .unwrap_or(0),
        },
        "timer-run" => Command::TimerRun {
            test: TestId::new(next("test id")?),
            seconds: parse_number("seconds", &next("seconds")?)?,
        },
        "todo" => Command::Todo(match next("todo action")?.as_str() {
            "add" => TodoCommand::Add {
                text: next("task text")?,
                due: flags
                    .due
                    .take()
                    .map(|raw| {
                        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                            .map_err(|_| ArgsError::InvalidDate { raw })
                    })
                    .transpose()?,
            },
            "done" => TodoCommand::Done(parse_position("task number", &next("task number")?)?),
            "rm" => TodoCommand::Remove(parse_position("task number", &next("task number")?)?),
            "clear" => TodoCommand::Clear,
            "list" => TodoCommand::List,
            other => return Err(ArgsError::UnknownCommand(format!("todo {other}"))),
        }),
        "link" => Command::Link(match next("link action")?.as_str() {
            "add" => LinkCommand::Add {
                name: next("link name")?,
                url: next("link url")?,
            },
            "rm" => LinkCommand::Remove(parse_position("link number", &next("link number")?)?),
            "list" => LinkCommand::List,
            other => return Err(ArgsError::UnknownCommand(format!("link {other}"))),
        }),
        "theme" => match next("theme action").ok().as_deref() {
            None => Command::Theme { toggle: false },
            Some("toggle") => Command::Theme { toggle: true },
            Some(other) => return Err(ArgsError::UnknownCommand(format!("theme {other}"))),
        },
        _ => return Err(ArgsError::UnknownCommand(name)),
    };

    if let Some(extra) = pos.next() {
        return Err(ArgsError::UnknownArg(extra));
    }
    Ok(command)
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

//
// ─── COMMANDS ──────────────────────────────────────────────────────────────────
//

fn open(ctl: &mut StudyController, test: &TestId) -> Result<(), LookupError> {
    if ctl.open_test(test) {
        Ok(())
    } else {
        Err(LookupError::Test(test.clone()))
    }
}

fn print_report(report: &TestReport, time_spent: i64) {
    for section in &report.sections {
        println!(
            "{:<20} {:>3}/{:<3} correct {:>3}  partial {:>3}  incorrect {:>3}",
            section.name,
            section.attempted,
            section.total,
            section.correct,
            section.partial,
            section.incorrect
        );
    }
    println!(
        "total: {}/{} attempted, score {}%, time {}",
        report.attempted,
        report.total,
        report.score_pct,
        timer::format_time(time_spent)
    );
    if report.session_goal > 0 {
        let state = if report.goal_reached() { "reached" } else { "open" };
        println!("session goal: {} questions ({state})", report.session_goal);
    }
}

async fn run_library_command(
    ctl: &mut StudyController,
    command: Command,
    tick_interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::List { search } => {
            ctl.set_search(&search);
            for test in ctl.search_results() {
                let completion = Completion::of_test(test);
                println!(
                    "{}\t{}\t{}\t{}% done",
                    test.id(),
                    test.title,
                    test.subject,
                    completion.completed_pct()
                );
            }
        }
        Command::ImportKey {
            file,
            title,
            subject,
        } => {
            let json = std::fs::read_to_string(&file)?;
            let file_name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let id = ctl.create_test_from_key(&file_name, &json, &title, &subject)?;
            println!("{id}");
        }
        Command::Submit {
            test,
            section,
            question,
            answer,
        } => {
            open(ctl, &test)?;
            if !ctl.select_section(&section) {
                return Err(LookupError::Section(section).into());
            }
            if !ctl.set_draft(&section, question, &answer) {
                let already = ctl
                    .active_test()
                    .and_then(|t| t.question(&section, question))
                    .is_some_and(|q| q.submitted);
                if !already {
                    return Err(LookupError::Question(question + 1).into());
                }
            }
            match ctl.submit_question(&section, question)? {
                Some(SubmitOutcome::Graded(verdict)) if verdict.correct => println!("correct"),
                Some(SubmitOutcome::Graded(verdict)) => {
                    let expected = ctl
                        .active_test()
                        .and_then(|t| t.section(&section))
                        .and_then(|s| s.answer(question))
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    let label = if verdict.partial { "partially correct" } else { "incorrect" };
                    println!("{label}; answer: {expected}");
                }
                Some(SubmitOutcome::TryAgain { partial: true }) => {
                    println!("partially right; one more try");
                }
                Some(SubmitOutcome::TryAgain { partial: false }) => {
                    println!("incorrect; one more try");
                }
                None => return Err(LookupError::Question(question + 1).into()),
            }
        }
        Command::SubmitAll { test, section } => {
            open(ctl, &test)?;
            let bulk = ctl
                .submit_all_attempted(&section)
                .ok_or(LookupError::Section(section))?;
            if bulk.is_empty() {
                println!("no new answers to submit");
            } else {
                println!("graded {}, awaiting retry {}", bulk.graded, bulk.try_again);
            }
        }
        Command::Report { test } => {
            let report = ctl.report(&test).ok_or(LookupError::Test(test.clone()))?;
            let time_spent = ctl.library().get(&test).map_or(0, |t| t.time_spent);
            print_report(&report, time_spent);
        }
        Command::Export { test: None } => println!("{}", ctl.export_library()?),
        Command::Export { test: Some(test) } => {
            let json = ctl.export_test(&test)?.ok_or(LookupError::Test(test))?;
            println!("{json}");
        }
        Command::ExportKey { test } => {
            let json = ctl.export_key(&test)?.ok_or(LookupError::Test(test))?;
            println!("{json}");
        }
        Command::Import { file } => {
            let json = std::fs::read_to_string(&file)?;
            let count = ctl.import_library(&json)?;
            println!("imported {count} test(s)");
        }
        Command::Delete { test } => {
            if !ctl.delete_test(&test) {
                return Err(LookupError::Test(test).into());
            }
        }
        Command::Timer {
            test,
            minutes,
            goal,
        } => {
            open(ctl, &test)?;
            ctl.configure_timer(minutes, goal)?;
            if minutes > 0 {
                println!("countdown {minutes} min, goal {goal}");
            } else {
                println!("count-up timer, goal {goal}");
            }
        }
        Command::TimerRun { test, seconds } => {
            open(ctl, &test)?;
            ctl.start_timer();
            let outcome = ctl
                .run_timer_until(
                    tick_interval,
                    tokio::time::sleep(Duration::from_secs(seconds)),
                )
                .await;
            if matches!(outcome, TickOutcome::Expired { .. }) {
                println!("time is up");
            }
            let shown = ctl.active_test().map_or(0, timer::display_seconds);
            println!("{}", timer::format_time(shown));
            ctl.go_home().await;
        }
        Command::Todo(_) | Command::Link(_) | Command::Theme { .. } => {}
    }
    Ok(())
}

async fn run_workspace_command(
    services: &AppServices,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>> {
    let workspace = services.workspace();
    match command {
        Command::Todo(TodoCommand::Add { text, due }) => {
            workspace.add_todo(&text, due).await?;
        }
        Command::Todo(TodoCommand::Done(index)) => {
            let done = workspace.toggle_todo(index).await?;
            println!("{}", if done { "done" } else { "reopened" });
        }
        Command::Todo(TodoCommand::Remove(index)) => {
            workspace.remove_todo(index).await?;
        }
        Command::Todo(TodoCommand::Clear) => {
            let removed = workspace.clear_completed().await?;
            println!("cleared {removed}");
        }
        Command::Todo(TodoCommand::List) => {
            for (n, item) in workspace.todos().await?.items().iter().enumerate() {
                let mark = if item.completed { "x" } else { " " };
                let due = item.due.map(|d| format!(" (due {d})")).unwrap_or_default();
                println!("{:>3}. [{mark}] {}{due}", n + 1, item.text);
            }
        }
        Command::Link(LinkCommand::Add { name, url }) => {
            let link = workspace.add_link(&name, &url).await?;
            println!("{} -> {}", link.name, link.url);
        }
        Command::Link(LinkCommand::Remove(index)) => {
            workspace.remove_link(index).await?;
        }
        Command::Link(LinkCommand::List) => {
            for (n, link) in workspace.links().await?.items().iter().enumerate() {
                println!("{:>3}. {}\t{}", n + 1, link.name, link.url);
            }
        }
        Command::Theme { toggle } => {
            let theme = if toggle {
                workspace.toggle_theme().await?
            } else {
                workspace.theme().await?
            };
            println!("{}", theme.as_str());
        }
        _ => {}
    }
    Ok(())
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    if argv.is_empty() || argv.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let args = Args::parse(argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let mut config = StudyConfig::load(args.config.as_deref())?;
    if let Some(db_url) = args.db_url {
        config.db_url = db_url;
    }
    config.db_url = normalize_sqlite_url(config.db_url);
    init_tracing(&config.log_filter);

    prepare_sqlite_file(&config.db_url)?;
    tracing::debug!(db_url = %config.db_url, debounce_ms = config.debounce_ms, "opening store");
    let services = AppServices::new_sqlite(&config, Clock::system()).await?;

    if matches!(
        args.command,
        Command::Todo(_) | Command::Link(_) | Command::Theme { .. }
    ) {
        return run_workspace_command(&services, args.command).await;
    }

    let mut ctl = services.controller().await;
    if let Some(user) = args.user {
        if !ctl.sign_in(user, args.email).await {
            return Err("could not load the remote library".into());
        }
    }

    let mutates = args.command.mutates_library();
    run_library_command(&mut ctl, args.command, config.tick_interval()).await?;

    if mutates {
        if let SyncEvent::Failed(message) = ctl.flush().await {
            eprintln!("warning: changes not saved: {message}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Args, ArgsError> {
        Args::parse(line.split_whitespace().map(str::to_owned))
    }

    #[test]
    fn submit_takes_one_based_question_numbers() {
        let args = parse("submit test_1 Physics 3 B").unwrap();
        assert_eq!(
            args.command,
            Command::Submit {
                test: TestId::new("test_1"),
                section: "Physics".into(),
                question: 2,
                answer: "B".into(),
            }
        );
        assert!(matches!(
            parse("submit test_1 Physics 0 B"),
            Err(ArgsError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn global_flags_can_follow_the_command() {
        let args = parse("list --search chem --user u1 --email a@b.c").unwrap();
        assert_eq!(args.command, Command::List { search: "chem".into() });
        assert_eq!(args.user, Some(UserId::new("u1")));
        assert_eq!(args.email.as_deref(), Some("a@b.c"));
    }

    #[test]
    fn timer_goal_is_optional() {
        let args = parse("timer test_1 45").unwrap();
        assert_eq!(
            args.command,
            Command::Timer {
                test: TestId::new("test_1"),
                minutes: 45,
                goal: 0
            }
        );
    }

    #[test]
    fn todo_due_dates_are_validated() {
        let args = parse("todo add revise --due 2026-11-02").unwrap();
        assert_eq!(
            args.command,
            Command::Todo(TodoCommand::Add {
                text: "revise".into(),
                due: NaiveDate::from_ymd_opt(2026, 11, 2),
            })
        );
        assert!(matches!(
            parse("todo add revise --due tomorrow"),
            Err(ArgsError::InvalidDate { .. })
        ));
    }

    #[test]
    fn rejects_unknown_and_extra_arguments() {
        assert_eq!(
            parse("frobnicate").unwrap_err(),
            ArgsError::UnknownCommand("frobnicate".into())
        );
        assert_eq!(parse("report a b").unwrap_err(), ArgsError::UnknownArg("b".into()));
        assert_eq!(parse("list --verbose").unwrap_err(), ArgsError::UnknownArg("--verbose".into()));
        assert_eq!(
            parse("--db").unwrap_err(),
            ArgsError::MissingValue { flag: "--db" }
        );
    }

    #[test]
    fn sqlite_urls_are_made_absolute() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), "sqlite::memory:");
        assert!(normalize_sqlite_url("data/study.db".into()).starts_with("sqlite:///"));
    }
}
