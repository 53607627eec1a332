//! Async line input for the chat loop.
//!
//! Reads stdin line by line and reports Ctrl+C at the prompt instead of
//! letting it terminate the process.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// Events produced by the input handler.
#[derive(Debug, PartialEq)]
pub enum InputEvent {
    /// User submitted a line (trimmed).
    Message(String),
    /// End of input (Ctrl+D).
    Eof,
    /// Ctrl+C at the prompt.
    Interrupted,
}

pub struct ChatInput {
    lines: Lines<BufReader<Stdin>>,
    prompt: String,
}

impl ChatInput {
    pub fn new(prompt: String) -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            prompt,
        }
    }

    /// Print the prompt and wait for a line.
    pub async fn read_line(&mut self) -> InputEvent {
        print!("{}", self.prompt);
        let _ = std::io::stdout().flush();

        tokio::select! {
            line = self.lines.next_line() => match line {
                Ok(Some(line)) => InputEvent::Message(line.trim().to_string()),
                Ok(None) | Err(_) => InputEvent::Eof,
            },
            _ = tokio::signal::ctrl_c() => InputEvent::Interrupted,
        }
    }
}
