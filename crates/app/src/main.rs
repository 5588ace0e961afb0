use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use exam_core::model::{
    ChoiceLabel, ExamId, QuestionId, QuestionSet, ScoreBand, SessionState, SubmissionResult,
    SubmitReason,
};
use services::{
    Clock, ExamApiConfig, ExamLoopService, ExamSession, HttpExamApi, SessionConfig, SubmitOutcome,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingExamId,
    UnknownArg(String),
    InvalidExamId { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingExamId => write!(f, "--exam-id is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidExamId { raw } => write!(f, "invalid --exam-id value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  exam run --exam-id <id> [--base-url <url>] [--token <token>]");
    eprintln!();
    eprintln!("While the exam runs:");
    eprintln!("  <question-id> <A-D>   answer a question");
    eprintln!("  status                show progress and time left");
    eprintln!("  submit                hand in the exam");
    eprintln!("  quit                  abandon the exam");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_ID, EXAM_API_BASE_URL, EXAM_API_TOKEN,");
    eprintln!("  EXAM_API_LOAD_TIMEOUT_SECS, EXAM_API_SUBMIT_TIMEOUT_SECS, EXAM_TICK_MS, RUST_LOG");
}

struct Args {
    exam_id: ExamId,
    base_url: Option<String>,
    token: Option<String>,
}

impl Args {
    fn parse_run(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut exam_id = std::env::var("EXAM_ID")
            .ok()
            .and_then(|value| value.parse::<ExamId>().ok());
        let mut base_url = None;
        let mut token = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--exam-id" => {
                    let value = require_value(args, "--exam-id")?;
                    let parsed = value
                        .parse::<ExamId>()
                        .map_err(|_| ArgsError::InvalidExamId { raw: value.clone() })?;
                    exam_id = Some(parsed);
                }
                "--base-url" => base_url = Some(require_value(args, "--base-url")?),
                "--token" => token = Some(require_value(args, "--token")?),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            exam_id: exam_id.ok_or(ArgsError::MissingExamId)?,
            base_url,
            token,
        })
    }
}

enum Input {
    Answer(QuestionId, ChoiceLabel),
    Status,
    Submit,
    Quit,
    Help,
    Invalid(String),
}

fn parse_input(line: &str) -> Input {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (None, _, _) => Input::Help,
        (Some("status"), None, _) => Input::Status,
        (Some("submit"), None, _) => Input::Submit,
        (Some("quit" | "exit"), None, _) => Input::Quit,
        (Some("help" | "?"), None, _) => Input::Help,
        (Some(id), Some(label), None) => match (id.parse::<QuestionId>(), ChoiceLabel::parse(label)) {
            (Ok(id), Ok(label)) => Input::Answer(id, label),
            (Err(err), _) => Input::Invalid(err.to_string()),
            (_, Err(err)) => Input::Invalid(err.to_string()),
        },
        _ => Input::Invalid(format!("unrecognized input: {line}")),
    }
}

fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

fn print_questions(set: &QuestionSet) {
    println!(
        "{} ({} questions, {} min)",
        set.exam_name(),
        set.total_questions(),
        set.duration_seconds() / 60
    );
    for question in set.questions() {
        println!();
        println!("[{}] {}", question.id(), question.text());
        for choice in question.choices() {
            println!("    {}. {}", choice.label, choice.text);
        }
    }
    println!();
}

fn print_status(session: &ExamSession) {
    let progress = session.progress();
    let remaining = session.remaining().unwrap_or_default();
    println!(
        "answered {}/{}, {} left",
        progress.answered,
        progress.total,
        format_remaining(remaining)
    );
}

fn print_result(result: &SubmissionResult) {
    let verdict = match result.band() {
        ScoreBand::Excellent => "Excellent!",
        ScoreBand::Passed => "Passed.",
        ScoreBand::NotPassed => "Not passed. Better luck next time.",
    };
    println!("{}: score {} ({verdict})", result.exam_name, result.score);
    println!(
        "correct answers: {}/{} ({}%)",
        result.total_correct,
        result.total_questions,
        result.percentage()
    );
}

async fn drive(session: &ExamSession) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut states = session.subscribe_state();
    let mut remaining = session.subscribe_remaining();
    let mut announced_minutes = None;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    session.abandon();
                    return Ok(());
                };
                match parse_input(&line) {
                    Input::Answer(id, label) => match session.record_choice(id, label) {
                        Ok(()) => println!("question {id}: {label}"),
                        Err(err) => println!("{err}"),
                    },
                    Input::Status => print_status(session),
                    Input::Submit => {
                        let progress = session.progress();
                        if progress.unanswered > 0 {
                            println!("submitting with {} unanswered question(s)", progress.unanswered);
                        }
                        let outcome = session.request_submit().await;
                        // Already reported here; keep the state branch quiet.
                        let _ = states.borrow_and_update();
                        match outcome {
                            Ok(SubmitOutcome::Submitted(result)) => {
                                print_result(&result);
                                return Ok(());
                            }
                            Ok(SubmitOutcome::Skipped(state)) => println!("already {state}"),
                            Err(err) => println!("{err}; type `submit` to try again"),
                        }
                    }
                    Input::Quit => {
                        session.abandon();
                        println!("exam abandoned");
                        return Ok(());
                    }
                    Input::Help => print_usage(),
                    Input::Invalid(msg) => println!("{msg}"),
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let state = *states.borrow_and_update();
                debug!(%state, "session state changed");
                match state {
                    SessionState::Submitting(SubmitReason::Timeout) => {
                        println!("time is up, submitting...");
                    }
                    SessionState::Completed => {
                        if let Some(result) = session.submission_result() {
                            print_result(&result);
                        }
                        return Ok(());
                    }
                    SessionState::Failed => {
                        let reason = session.last_error().unwrap_or_default();
                        println!("submission failed: {reason}; type `submit` to try again");
                    }
                    _ => {}
                }
            }
            changed = remaining.changed() => {
                if changed.is_err() {
                    continue;
                }
                let left = *remaining.borrow_and_update();
                let minutes = left.as_secs().div_ceil(60);
                if announced_minutes != Some(minutes) {
                    announced_minutes = Some(minutes);
                    println!("{} left", format_remaining(left));
                }
            }
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let mut iter = argv.into_iter().peekable();

    match iter.peek().map(String::as_str) {
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some("run") => {
            iter.next();
        }
        Some(first) if !first.starts_with("--") => {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            return Err(Box::new(ArgsError::UnknownArg(first.to_string())));
        }
        _ => {}
    }

    let parsed = Args::parse_run(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let mut api_config = ExamApiConfig::from_env()?;
    if let Some(base_url) = parsed.base_url.as_deref() {
        api_config = api_config.with_base_url(base_url)?;
    }
    if let Some(token) = parsed.token {
        api_config = api_config.with_access_token(token);
    }
    let api = Arc::new(HttpExamApi::new(api_config));

    let exams = ExamLoopService::new(Clock::default_clock(), api.clone(), api)
        .with_config(SessionConfig::from_env()?);
    let session = exams.start_exam(parsed.exam_id).await?;

    if let Some(set) = session.question_set() {
        print_questions(&set);
    }
    drive(&session).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
