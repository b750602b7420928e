//! Line-oriented terminal prompts.

use std::fmt::Display;
use std::io::{self, BufRead, Write};

use tutor_core::TutorError;

/// Reads answers from any line source and writes prompts to stdout.
pub struct Console<R> {
    input: R,
}

impl<R: BufRead> Console<R> {
    /// Wraps an input source.
    pub const fn new(input: R) -> Self {
        Self { input }
    }

    /// Prints `prompt` and reads one line without its line ending.
    ///
    /// Returns `None` at end of input.
    pub fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        print!("{prompt}");
        io::stdout().flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    /// Reads lines until a blank line or end of input.
    ///
    /// Returns `None` if input ended before anything was typed.
    pub fn read_block(&mut self, prompt: &str) -> io::Result<Option<String>> {
        println!("{prompt}");
        let mut lines = Vec::new();
        loop {
            match self.read_line("> ")? {
                Some(line) if line.trim().is_empty() => break,
                Some(line) => lines.push(line),
                None if lines.is_empty() => return Ok(None),
                None => break,
            }
        }
        Ok(Some(lines.join("\n")))
    }

    /// Reads a line, falling back to `default` when it is blank.
    pub fn ask(&mut self, prompt: &str, default: &str) -> io::Result<String> {
        let label = if default.is_empty() {
            format!("{prompt}: ")
        } else {
            format!("{prompt} [{default}]: ")
        };
        let answer = self.read_line(&label)?.unwrap_or_default();
        let answer = answer.trim();
        Ok(if answer.is_empty() {
            default.to_string()
        } else {
            answer.to_string()
        })
    }

    /// Asks a yes/no question.
    pub fn confirm(&mut self, prompt: &str, default: bool) -> io::Result<bool> {
        let hint = if default { "Y/n" } else { "y/N" };
        let Some(answer) = self.read_line(&format!("{prompt} [{hint}] "))? else {
            return Ok(default);
        };
        Ok(match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => true,
            "n" | "no" => false,
            _ => default,
        })
    }

    /// Lets the user pick one option by number.
    pub fn choose<T>(&mut self, prompt: &str, options: &[T], current: T) -> io::Result<T>
    where
        T: Copy + Display + PartialEq,
    {
        println!("{prompt}");
        for (i, option) in options.iter().enumerate() {
            let marker = if *option == current { " (current)" } else { "" };
            println!("  {}. {option}{marker}", i + 1);
        }

        let answer = self.read_line("Choice: ")?.unwrap_or_default();
        Ok(answer
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| options.get(i).copied())
            .unwrap_or(current))
    }
}

/// Reports an engine error and asks whether to retry it.
///
/// Only transport failures that are not fatal are offered a retry.
pub fn offer_retry<R: BufRead>(console: &mut Console<R>, error: &TutorError) -> io::Result<bool> {
    eprintln!("\n{error}\n");
    if !error.is_transport() || error.is_fatal() {
        return Ok(false);
    }
    console.confirm("Retry?", true)
}
