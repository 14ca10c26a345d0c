use hubmigrate_core::gate::Operator;
use hubmigrate_core::{MigrateError, Result};
use std::io::{BufRead, Write};

/// Operator at a terminal. Prompts are answered one line at a time from
/// `input`; end of input is a fatal error, never a silent "yes".
///
/// With `json` set every message goes to stderr so stdout carries only the
/// final JSON document.
pub struct ConsoleOperator<R> {
    input: R,
    json: bool,
}

impl<R: BufRead> ConsoleOperator<R> {
    pub fn new(input: R, json: bool) -> Self {
        Self { input, json }
    }

    fn say(&self, text: &str) {
        if self.json {
            eprintln!("{text}");
        } else {
            println!("{text}");
        }
    }

    fn ask(&mut self, prompt: &str) -> Result<String> {
        if self.json {
            eprint!("{prompt} ");
            std::io::stderr().flush()?;
        } else {
            print!("{prompt} ");
            std::io::stdout().flush()?;
        }
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(MigrateError::OperatorInputClosed(prompt.to_string()));
        }
        Ok(line.trim().to_string())
    }
}

impl<R: BufRead> Operator for ConsoleOperator<R> {
    fn echo(&mut self, source: Option<&str>, line: &str) {
        match source {
            Some(source) => self.say(&format!("  [{source}] {line}")),
            None => self.say(&format!("  {line}")),
        }
    }

    fn notify(&mut self, message: &str) {
        self.say(message);
    }

    fn warn(&mut self, message: &str) {
        eprintln!("warning: {message}");
    }

    fn report_error(&mut self, message: &str) {
        eprintln!("error: {message}");
    }

    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        let answer = self.ask(&format!("{prompt} [y/N]"))?;
        Ok(is_yes(&answer))
    }

    fn acknowledge(&mut self, prompt: &str) -> Result<()> {
        self.ask(prompt).map(|_| ())
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes")
}
