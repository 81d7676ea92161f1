//! Operator interaction boundary
//!
//! Sessions talk to the human through [`Operator`]. Every prompt is blocking
//! and may end in [`OperatorError::Cancelled`] when the operator interrupts
//! it.

mod scripted;
mod terminal;

pub use scripted::{Reply, ScriptedOperator};
pub use terminal::TerminalOperator;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("cancelled by operator")]
    Cancelled,

    #[error("terminal I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OperatorError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OperatorError::Cancelled)
    }
}

pub type PromptResult<T> = Result<T, OperatorError>;

pub trait Operator {
    /// Print one line of output.
    fn display(&mut self, line: &str);

    /// Replace the single in-place progress line.
    fn progress(&mut self, line: &str);

    /// Clear the progress line, if one is shown.
    fn finish_progress(&mut self);

    /// Yes/no question; an empty answer picks `default`.
    fn confirm(&mut self, question: &str, default: bool) -> PromptResult<bool>;

    /// Ask for a finite number, re-prompting on unparsable input.
    fn read_number(&mut self, prompt: &str) -> PromptResult<f64>;
}

impl<O: Operator + ?Sized> Operator for &mut O {
    fn display(&mut self, line: &str) {
        (**self).display(line)
    }

    fn progress(&mut self, line: &str) {
        (**self).progress(line)
    }

    fn finish_progress(&mut self) {
        (**self).finish_progress()
    }

    fn confirm(&mut self, question: &str, default: bool) -> PromptResult<bool> {
        (**self).confirm(question, default)
    }

    fn read_number(&mut self, prompt: &str) -> PromptResult<f64> {
        (**self).read_number(prompt)
    }
}
