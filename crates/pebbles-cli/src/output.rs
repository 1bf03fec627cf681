//! Display helpers shared by command handlers.

use std::io::{self, Write};

use crate::client::CliResult;

const BANG: &str = " !    ";

/// Prefix every line of `message` with the error bang.
#[must_use]
pub(crate) fn format_with_bang(message: &str) -> String {
    if message.trim().is_empty() {
        return String::new();
    }
    message
        .split('\n')
        .map(|line| format!("{BANG}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[must_use]
pub(crate) fn format_bytes(amount: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    match amount {
        0 => "(empty)".to_string(),
        n if n < KB => n.to_string(),
        n if n < MB => format!("{}k", n / KB),
        n if n < GB => format!("{}M", n / MB),
        n => format!("{}G", n / GB),
    }
}

/// Standard output and error streams for one command.
pub(crate) struct Output {
    out: Box<dyn Write>,
    err: Box<dyn Write>,
    action_pending: bool,
}

impl Output {
    pub(crate) fn new(out: Box<dyn Write>, err: Box<dyn Write>) -> Self {
        Self {
            out,
            err,
            action_pending: false,
        }
    }

    pub(crate) fn stdio() -> Self {
        Self::new(Box::new(io::stdout()), Box::new(io::stderr()))
    }

    pub(crate) fn display(&mut self, message: &str) -> CliResult<()> {
        writeln!(self.out, "{message}")?;
        self.out.flush()?;
        Ok(())
    }

    pub(crate) fn display_inline(&mut self, message: &str) -> CliResult<()> {
        write!(self.out, "{message}")?;
        self.out.flush()?;
        Ok(())
    }

    pub(crate) fn styled_header(&mut self, header: &str) -> CliResult<()> {
        self.display(&format!("=== {header}"))
    }

    /// Aligned `key: value` lines, sorted by key.
    pub(crate) fn styled_hash(&mut self, pairs: &[(String, String)]) -> CliResult<()> {
        let width = pairs.iter().map(|(key, _)| key.len()).max().unwrap_or(0) + 2;
        let mut sorted: Vec<&(String, String)> = pairs.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, value) in sorted {
            let label = format!("{key}: ");
            self.display(&format!("{label:<width$}{value}"))?;
        }
        Ok(())
    }

    /// Sorted lines followed by a blank line.
    pub(crate) fn styled_array(&mut self, items: &[String]) -> CliResult<()> {
        let mut sorted = items.to_vec();
        sorted.sort();
        for item in &sorted {
            self.display(item.trim_end())?;
        }
        self.display("")
    }

    /// Print `message... ` and leave the line open for the outcome.
    pub(crate) fn begin_action(&mut self, message: &str) -> CliResult<()> {
        self.display_inline(&format!("{message}... "))?;
        self.action_pending = true;
        Ok(())
    }

    pub(crate) fn finish_action(&mut self, status: Option<&str>) -> CliResult<()> {
        self.action_pending = false;
        match status {
            Some(status) => self.display(&format!("done, {status}")),
            None => self.display("done"),
        }
    }

    /// Close an open action line with `failed`. No-op without an open action.
    pub(crate) fn fail_action(&mut self) -> CliResult<()> {
        if self.action_pending {
            self.action_pending = false;
            self.display("failed")?;
        }
        Ok(())
    }

    /// Bang-prefixed message on standard error.
    pub(crate) fn error(&mut self, message: &str) -> CliResult<()> {
        let formatted = format_with_bang(message);
        if !formatted.is_empty() {
            writeln!(self.err, "{formatted}")?;
        }
        self.err.flush()?;
        Ok(())
    }

    /// Plain line on standard error.
    pub(crate) fn warn(&mut self, message: &str) -> CliResult<()> {
        writeln!(self.err, "{message}")?;
        self.err.flush()?;
        Ok(())
    }
}
