//! The human in the loop.
//!
//! The correction workflow asks the operator to pick between matches and to
//! confirm automatic changes. It does so through [`Operator`] so tests can
//! script the answers; [`ConsoleOperator`] is the terminal implementation.

use crate::error::EnvelopeError;
use std::io::{self, BufRead, ErrorKind, Write};

/// Shows messages to and reads answers from the operator.
pub trait Operator {
    /// Display an informational line.
    fn show(&mut self, message: &str) -> Result<(), EnvelopeError>;

    /// Display `prompt` and return the operator's answer, trimmed.
    fn ask(&mut self, prompt: &str) -> Result<String, EnvelopeError>;
}

/// An [`Operator`] over a line-based reader and a writer.
pub struct ConsoleOperator<R, W> {
    input: R,
    output: W,
}

impl ConsoleOperator<io::StdinLock<'static>, io::Stdout> {
    /// Talk to the operator on stdin/stdout.
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleOperator<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> Operator for ConsoleOperator<R, W> {
    fn show(&mut self, message: &str) -> Result<(), EnvelopeError> {
        writeln!(self.output, "{}", message).map_err(EnvelopeError::OperatorInput)
    }

    fn ask(&mut self, prompt: &str) -> Result<String, EnvelopeError> {
        write!(self.output, "{}\n> ", prompt)
            .and_then(|_| self.output.flush())
            .map_err(EnvelopeError::OperatorInput)?;

        let mut line = String::new();
        let n = self
            .input
            .read_line(&mut line)
            .map_err(EnvelopeError::OperatorInput)?;
        if n == 0 {
            return Err(EnvelopeError::OperatorInput(io::Error::new(
                ErrorKind::UnexpectedEof,
                "input closed while waiting for an answer",
            )));
        }
        Ok(line.trim().to_string())
    }
}
