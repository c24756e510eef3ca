//! Colored terminal console

use owo_colors::OwoColorize;
use sqwatch_core::{Console, Line, Tone};
use std::io::{self, Write};

/// Writes lines to stdout, errors to stderr
#[derive(Debug, Default)]
pub struct TermConsole;

impl TermConsole {
    pub fn new() -> Self {
        Self
    }
}

impl Console for TermConsole {
    fn emit(&mut self, line: Line) {
        // A closed pipe must not take the watcher down
        let _ = match line.tone {
            Tone::Error => writeln!(io::stderr().lock(), "{}", line.text.red()),
            tone => writeln!(io::stdout().lock(), "{}", render(tone, &line.text)),
        };
    }
}

fn render(tone: Tone, text: &str) -> String {
    match tone {
        Tone::Notice | Tone::Added => text.green().to_string(),
        Tone::Muted => text.bright_black().to_string(),
        Tone::Trigger => text.cyan().to_string(),
        Tone::Removed | Tone::Error => text.red().to_string(),
        Tone::Context => text.to_string(),
    }
}
