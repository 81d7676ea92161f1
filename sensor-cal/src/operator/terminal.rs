use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use super::{Operator, OperatorError, PromptResult};

/// Interactive terminal operator backed by `rustyline`.
///
/// Ctrl-C or Ctrl-D inside a prompt cancels that prompt.
pub struct TerminalOperator {
    editor: DefaultEditor,
    spinner: Option<ProgressBar>,
}

impl TerminalOperator {
    pub fn new() -> PromptResult<Self> {
        let editor = DefaultEditor::new().map_err(readline_error)?;
        Ok(Self {
            editor,
            spinner: None,
        })
    }

    fn readline(&mut self, prompt: &str) -> PromptResult<String> {
        self.finish_progress();
        let line = self.editor.readline(prompt).map_err(readline_error)?;
        if !line.trim().is_empty() {
            let _ = self.editor.add_history_entry(line.as_str());
        }
        Ok(line)
    }
}

fn readline_error(err: ReadlineError) -> OperatorError {
    match err {
        ReadlineError::Interrupted | ReadlineError::Eof => OperatorError::Cancelled,
        ReadlineError::Io(e) => OperatorError::Io(e),
        other => OperatorError::Io(std::io::Error::other(other.to_string())),
    }
}

/// `None` for input that is neither yes nor no.
fn parse_yes_no(input: &str, default: bool) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "" => Some(default),
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

fn parse_number(input: &str) -> Option<f64> {
    input
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

impl Operator for TerminalOperator {
    fn display(&mut self, line: &str) {
        match &self.spinner {
            Some(spinner) => spinner.println(line),
            None => println!("{line}"),
        }
    }

    fn progress(&mut self, line: &str) {
        let spinner = self.spinner.get_or_insert_with(|| {
            let spinner = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
                spinner.set_style(style);
            }
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner
        });
        spinner.set_message(line.to_string());
    }

    fn finish_progress(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    fn confirm(&mut self, question: &str, default: bool) -> PromptResult<bool> {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        let prompt = format!("{question} {hint} ");
        loop {
            let answer = self.readline(&prompt)?;
            match parse_yes_no(&answer, default) {
                Some(value) => return Ok(value),
                None => println!("Please answer 'y' or 'n'."),
            }
        }
    }

    fn read_number(&mut self, prompt: &str) -> PromptResult<f64> {
        let prompt = format!("{prompt}: ");
        loop {
            let answer = self.readline(&prompt)?;
            match parse_number(&answer) {
                Some(value) => return Ok(value),
                None => println!("'{}' is not a number, try again.", answer.trim()),
            }
        }
    }
}
