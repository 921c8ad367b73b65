//! Operator prompts.

use std::io::{self, BufRead, IsTerminal, Write};

use crate::error::{GuardError, Result};

/// Source of operator answers.
pub trait Prompter {
    /// Asks `question` and returns the trimmed answer, or `None` when no
    /// answer can be obtained (end of input or no terminal).
    fn ask(&mut self, question: &str) -> Result<Option<String>>;
}

/// Prompts on stdout and reads answers from a line reader.
pub struct TerminalPrompter<R: BufRead> {
    reader: R,
    interactive: bool,
}

impl TerminalPrompter<io::StdinLock<'static>> {
    /// Prompter over the process's stdin; refuses to ask when stdin is not a terminal.
    pub fn stdin() -> Self {
        let stdin = io::stdin();
        let interactive = stdin.is_terminal();
        Self {
            reader: stdin.lock(),
            interactive,
        }
    }
}

impl<R: BufRead> TerminalPrompter<R> {
    /// Prompter over an arbitrary reader, treated as interactive.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            interactive: true,
        }
    }
}

impl<R: BufRead> Prompter for TerminalPrompter<R> {
    fn ask(&mut self, question: &str) -> Result<Option<String>> {
        if !self.interactive {
            return Ok(None);
        }
        print!("{question} ");
        io::stdout().flush()?;

        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

/// Asks a yes/no question; an empty answer takes `default`.
///
/// A missing answer aborts: destructive steps never proceed unconfirmed.
pub fn confirm(prompter: &mut dyn Prompter, question: &str, default: bool) -> Result<bool> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    let Some(answer) = prompter.ask(&format!("{question} {hint}"))? else {
        return Err(GuardError::UnsafeOperationAborted(
            "confirmation required but no interactive input is available".to_string(),
        ));
    };
    Ok(match answer.to_lowercase().as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Prompter that replays canned answers.
    pub(crate) struct ScriptedPrompter {
        pub answers: Vec<Option<String>>,
        pub questions: Vec<String>,
    }

    impl ScriptedPrompter {
        pub(crate) fn new(answers: &[Option<&str>]) -> Self {
            Self {
                answers: answers.iter().rev().map(|a| a.map(String::from)).collect(),
                questions: Vec::new(),
            }
        }
    }

    impl Prompter for ScriptedPrompter {
        fn ask(&mut self, question: &str) -> Result<Option<String>> {
            self.questions.push(question.to_string());
            Ok(self.answers.pop().flatten())
        }
    }
}
