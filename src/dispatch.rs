//! Backend selection.
//!
//! One line is read from the input, its first token picks the backend and
//! the injected [`Runner`] plays the demo against it.

use std::fmt;
use std::io::{BufRead, Write};
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use log::{error, info};
use thiserror::Error;

use polystore_domain::{ErrorKind, StoreError};

pub const PROMPT: &str = "Enter the database you want to play with: mysql | mongodb | dynamodb";
pub const INVALID_INPUT: &str = "Invalid input given";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    MySql,
    MongoDb,
    DynamoDb,
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::MySql => "mysql",
            Backend::MongoDb => "mongodb",
            Backend::DynamoDb => "dynamodb",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown backend `{0}`")]
pub struct UnknownBackend(pub String);

impl FromStr for Backend {
    type Err = UnknownBackend;

    /// Exact, case sensitive names
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mysql" => Ok(Backend::MySql),
            "mongodb" => Ok(Backend::MongoDb),
            "dynamodb" => Ok(Backend::DynamoDb),
            other => Err(UnknownBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    AwaitingSelection,
    Running(Backend),
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed(Backend),
    /// The demo stopped at its first failed operation. `kind` is set when
    /// the failure came from a store.
    Failed {
        backend: Backend,
        kind: Option<ErrorKind>,
        message: String,
    },
    /// The token that did not name a backend
    InvalidInput(String),
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Failed { .. } => 1,
            _ => 0,
        }
    }
}

/// Plays the demo for one backend, writing its report to `out`
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, backend: Backend, out: &mut (dyn Write + Send)) -> Result<()>;
}

pub struct Dispatcher<R> {
    runner: R,
    state: State,
    transitions: Vec<State>,
}

impl<R: Runner> Dispatcher<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            state: State::AwaitingSelection,
            transitions: vec![State::AwaitingSelection],
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Every state entered so far, in order
    pub fn transitions(&self) -> &[State] {
        &self.transitions
    }

    fn enter(&mut self, state: State) {
        self.state = state;
        self.transitions.push(state);
    }

    /// Prompt, read the selection and run the demo. Only I/O on `input` or
    /// `out` fails this call, store failures end up in the outcome.
    pub async fn dispatch<I, O>(&mut self, input: &mut I, out: &mut O) -> Result<Outcome>
    where
        I: BufRead,
        O: Write + Send,
    {
        writeln!(out, "{}", PROMPT)?;
        out.flush()?;

        // Undecodable bytes still yield a token, just not a valid one
        let mut bytes = Vec::new();
        input.read_until(b'\n', &mut bytes)?;
        let line = String::from_utf8_lossy(&bytes);
        let token = line.split_whitespace().next().unwrap_or_default();

        let backend = match token.parse::<Backend>() {
            Ok(backend) => backend,
            Err(err) => {
                info!("{}", err);
                writeln!(out, "{}", INVALID_INPUT)?;
                self.enter(State::Done);
                return Ok(Outcome::InvalidInput(token.to_string()));
            }
        };

        self.enter(State::Running(backend));
        info!("running the {} demo", backend);
        let outcome = match self.runner.run(backend, out).await {
            Ok(()) => Outcome::Completed(backend),
            Err(err) => {
                let kind = err.downcast_ref::<StoreError>().map(StoreError::kind);
                let message = format!("{:#}", err);
                error!("{} demo failed: {}", backend, message);
                match kind {
                    Some(kind) => writeln!(out, "{} failed ({}): {}", backend, kind, message)?,
                    None => writeln!(out, "{} failed: {}", backend, message)?,
                }
                Outcome::Failed {
                    backend,
                    kind,
                    message,
                }
            }
        };
        self.enter(State::Done);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Mutex;

    use anyhow::Context;

    use super::*;

    /// Records the backends it was asked to run
    #[derive(Default)]
    struct FakeRunner {
        calls: Mutex<Vec<Backend>>,
        fail_with: Option<StoreError>,
    }

    #[async_trait]
    impl Runner for FakeRunner {
        async fn run(&self, backend: Backend, out: &mut (dyn Write + Send)) -> Result<()> {
            self.calls.lock().unwrap().push(backend);
            writeln!(out, "ran {}", backend)?;
            match &self.fail_with {
                Some(err) => Err(err.clone()).context("inserting tags"),
                None => Ok(()),
            }
        }
    }

    async fn dispatch(runner: FakeRunner, input: &str) -> (Dispatcher<FakeRunner>, Outcome, String) {
        let mut dispatcher = Dispatcher::new(runner);
        let mut out = Vec::new();
        let outcome = dispatcher
            .dispatch(&mut Cursor::new(input), &mut out)
            .await
            .unwrap();
        (dispatcher, outcome, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_parse_backend() {
        assert_eq!("dynamodb".parse::<Backend>(), Ok(Backend::DynamoDb));
        assert_eq!(
            "MySQL".parse::<Backend>(),
            Err(UnknownBackend("MySQL".to_string()))
        );
    }

    #[tokio::test]
    async fn test_mysql_runs_relational() {
        let (dispatcher, outcome, out) = dispatch(FakeRunner::default(), "mysql extra\n").await;

        assert_eq!(outcome, Outcome::Completed(Backend::MySql));
        assert_eq!(
            dispatcher.transitions(),
            &[
                State::AwaitingSelection,
                State::Running(Backend::MySql),
                State::Done
            ]
        );
        assert_eq!(*dispatcher.runner.calls.lock().unwrap(), vec![Backend::MySql]);
        assert!(out.starts_with(PROMPT));
        assert!(out.contains("ran mysql"));
        assert_eq!(outcome.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_unknown_backend_is_invalid() {
        let (dispatcher, outcome, out) = dispatch(FakeRunner::default(), "postgres\n").await;

        assert_eq!(outcome, Outcome::InvalidInput("postgres".to_string()));
        assert_eq!(
            dispatcher.transitions(),
            &[State::AwaitingSelection, State::Done]
        );
        assert!(dispatcher.runner.calls.lock().unwrap().is_empty());
        assert!(out.contains(INVALID_INPUT));
        assert_eq!(outcome.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_empty_input_is_invalid() {
        for input in ["", "\n", "   \n"] {
            let (dispatcher, outcome, out) = dispatch(FakeRunner::default(), input).await;
            assert_eq!(outcome, Outcome::InvalidInput(String::new()));
            assert_eq!(dispatcher.state(), State::Done);
            assert!(dispatcher.runner.calls.lock().unwrap().is_empty());
            assert!(out.contains(INVALID_INPUT));
        }
    }

    #[tokio::test]
    async fn test_non_utf8_input_is_invalid() {
        let mut dispatcher = Dispatcher::new(FakeRunner::default());
        let mut out = Vec::new();
        let outcome = dispatcher
            .dispatch(&mut Cursor::new(vec![0xff, 0xfe, b'\n']), &mut out)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::InvalidInput("\u{fffd}\u{fffd}".to_string()));
        assert_eq!(
            dispatcher.transitions(),
            &[State::AwaitingSelection, State::Done]
        );
        assert!(dispatcher.runner.calls.lock().unwrap().is_empty());
        assert!(String::from_utf8(out).unwrap().contains(INVALID_INPUT));
    }

    #[tokio::test]
    async fn test_failed_demo_reports_kind() {
        let runner = FakeRunner {
            fail_with: Some(StoreError::write("duplicate key")),
            ..Default::default()
        };
        let (dispatcher, outcome, out) = dispatch(runner, "mongodb\n").await;

        assert_eq!(
            outcome,
            Outcome::Failed {
                backend: Backend::MongoDb,
                kind: Some(ErrorKind::Write),
                message: "inserting tags: write error: duplicate key".to_string(),
            }
        );
        assert_eq!(dispatcher.state(), State::Done);
        assert!(out.contains("mongodb failed (write)"));
        assert_eq!(outcome.exit_code(), 1);
    }
}
