use anyhow::{Context, Result};
use std::io::{self, BufRead, IsTerminal, Write};

/// Interactive questions asked during a command
pub trait Prompter {
    /// Yes/no question; an empty answer or closed input gives `default`
    fn confirm(&mut self, question: &str, default: bool) -> Result<bool>;

    /// Free-text value; an empty answer gives `default` when one is shown
    fn ask(&mut self, label: &str, default: Option<&str>) -> Result<String>;

    /// Value that must not be echoed
    fn ask_secret(&mut self, label: &str) -> Result<String>;
}

/// Reads answers from the controlling terminal
pub struct TerminalPrompter;

impl TerminalPrompter {
    fn read_line(&self) -> Result<Option<String>> {
        let mut line = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut line)
            .context("Failed to read user input")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

impl Prompter for TerminalPrompter {
    fn confirm(&mut self, question: &str, default: bool) -> Result<bool> {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        print!("{} {} ", question, hint);
        io::stdout().flush().ok();

        let Some(answer) = self.read_line()? else {
            println!();
            return Ok(default);
        };
        Ok(parse_yes_no(&answer).unwrap_or(default))
    }

    fn ask(&mut self, label: &str, default: Option<&str>) -> Result<String> {
        match default {
            Some(d) if !d.is_empty() => print!("{} [{}]: ", label, d),
            _ => print!("{}: ", label),
        }
        io::stdout().flush().ok();

        let answer = self.read_line()?.unwrap_or_default();
        let answer = answer.trim();
        if answer.is_empty() {
            Ok(default.unwrap_or_default().to_string())
        } else {
            Ok(answer.to_string())
        }
    }

    fn ask_secret(&mut self, label: &str) -> Result<String> {
        print!("{}: ", label);
        io::stdout().flush().ok();

        if !io::stdin().is_terminal() {
            return Ok(self.read_line()?.unwrap_or_default().trim().to_string());
        }
        read_hidden_line()
    }
}

/// Reads one line in raw mode so the characters are not echoed
fn read_hidden_line() -> Result<String> {
    use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
    use crossterm::terminal;

    terminal::enable_raw_mode().context("Failed to switch the terminal to raw mode")?;
    let read = (|| -> Result<String> {
        let mut secret = String::new();
        loop {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Enter => return Ok(secret),
                KeyCode::Backspace => {
                    secret.pop();
                }
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    anyhow::bail!("Input cancelled");
                }
                KeyCode::Char(c) => secret.push(c),
                _ => {}
            }
        }
    })();
    terminal::disable_raw_mode().context("Failed to restore the terminal")?;
    println!();

    Ok(read?.trim().to_string())
}

fn parse_yes_no(answer: &str) -> Option<bool> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;

    /// Answers questions from a fixed script, in order
    #[derive(Default)]
    pub struct ScriptedPrompter {
        pub answers: VecDeque<String>,
        pub asked: Vec<String>,
    }

    impl ScriptedPrompter {
        pub fn new(answers: &[&str]) -> Self {
            Self {
                answers: answers.iter().map(|a| a.to_string()).collect(),
                asked: Vec::new(),
            }
        }

        fn next(&mut self, label: &str) -> String {
            self.asked.push(label.to_string());
            self.answers.pop_front().unwrap_or_default()
        }
    }

    impl Prompter for ScriptedPrompter {
        fn confirm(&mut self, question: &str, default: bool) -> Result<bool> {
            let answer = self.next(question);
            Ok(parse_yes_no(&answer).unwrap_or(default))
        }

        fn ask(&mut self, label: &str, default: Option<&str>) -> Result<String> {
            let answer = self.next(label);
            if answer.is_empty() {
                Ok(default.unwrap_or_default().to_string())
            } else {
                Ok(answer)
            }
        }

        fn ask_secret(&mut self, label: &str) -> Result<String> {
            Ok(self.next(label))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yes_no() {
        assert_eq!(parse_yes_no("y"), Some(true));
        assert_eq!(parse_yes_no(" YES "), Some(true));
        assert_eq!(parse_yes_no("n"), Some(false));
        assert_eq!(parse_yes_no(""), None);
        assert_eq!(parse_yes_no("maybe"), None);
    }
}
