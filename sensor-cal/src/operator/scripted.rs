use std::collections::VecDeque;
use std::io;

use super::{Operator, OperatorError, PromptResult};
use crate::CancelToken;

/// One scripted operator answer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reply {
    Yes,
    No,
    /// Empty input; the prompt's default applies.
    Default,
    Number(f64),
    Cancel,
}

/// Operator that answers prompts from a fixed script and records output.
///
/// Running out of replies or a reply of the wrong kind is reported as an I/O
/// error so a test with a short script fails instead of looping.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    replies: VecDeque<Reply>,
    lines: Vec<String>,
    prompts: Vec<String>,
    progress_updates: usize,
    /// Token cancelled while a matching prompt is open
    interrupt: Option<(String, CancelToken)>,
}

impl ScriptedOperator {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: replies.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Cancel `token` while any prompt containing `needle` is open, as a
    /// Ctrl-C reaching the signal handler instead of the line editor would.
    /// The scripted reply is still returned.
    pub fn interrupt_at(mut self, needle: &str, token: CancelToken) -> Self {
        self.interrupt = Some((needle.to_string(), token));
        self
    }

    /// Lines passed to [`Operator::display`], in order.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Questions asked, in order.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    pub fn progress_updates(&self) -> usize {
        self.progress_updates
    }

    /// Replies not consumed yet.
    pub fn remaining(&self) -> usize {
        self.replies.len()
    }

    pub fn displayed(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }

    fn next_reply(&mut self, prompt: &str) -> PromptResult<Reply> {
        self.prompts.push(prompt.to_string());
        if let Some((needle, token)) = &self.interrupt {
            if prompt.contains(needle.as_str()) {
                token.cancel();
            }
        }
        self.replies.pop_front().ok_or_else(|| {
            OperatorError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("script exhausted at prompt {prompt:?}"),
            ))
        })
    }

    fn unexpected(prompt: &str, reply: Reply) -> OperatorError {
        OperatorError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("scripted reply {reply:?} does not answer {prompt:?}"),
        ))
    }
}

impl Operator for ScriptedOperator {
    fn display(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    fn progress(&mut self, _line: &str) {
        self.progress_updates += 1;
    }

    fn finish_progress(&mut self) {}

    fn confirm(&mut self, question: &str, default: bool) -> PromptResult<bool> {
        match self.next_reply(question)? {
            Reply::Yes => Ok(true),
            Reply::No => Ok(false),
            Reply::Default => Ok(default),
            Reply::Cancel => Err(OperatorError::Cancelled),
            reply => Err(Self::unexpected(question, reply)),
        }
    }

    fn read_number(&mut self, prompt: &str) -> PromptResult<f64> {
        match self.next_reply(prompt)? {
            Reply::Number(value) => Ok(value),
            Reply::Cancel => Err(OperatorError::Cancelled),
            reply => Err(Self::unexpected(prompt, reply)),
        }
    }
}
