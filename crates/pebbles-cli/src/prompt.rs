//! Terminal prompts and interrupt handling.

use std::io::{self, BufRead, Write};

use crate::client::CliResult;

pub(crate) const CANCELLED_MESSAGE: &str = " !    Command cancelled.";

/// Interactive input used by the login flow and confirmations.
pub(crate) trait Prompt {
    /// Print `message` without a newline and read one trimmed line.
    fn ask(&mut self, message: &str) -> CliResult<String>;
    /// Like [`Prompt::ask`] with terminal echo suppressed.
    fn ask_secret(&mut self, message: &str) -> CliResult<String>;
    /// Informational line for the user.
    fn notify(&mut self, message: &str);
    /// Warning line for the user.
    fn warn(&mut self, message: &str);
}

/// Prompts backed by the process's standard streams.
#[derive(Debug, Default)]
pub(crate) struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn ask(&mut self, message: &str) -> CliResult<String> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(message.as_bytes())?;
        stdout.flush()?;
        drop(stdout);

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }

    fn ask_secret(&mut self, message: &str) -> CliResult<String> {
        // rpassword restores echo before returning, on success and on error
        let secret = rpassword::prompt_password(message)?;
        Ok(secret.trim().to_string())
    }

    fn notify(&mut self, message: &str) {
        println!("{message}");
    }

    fn warn(&mut self, message: &str) {
        eprintln!("{message}");
    }
}

/// Restore the saved terminal mode and exit 1 on Ctrl-C.
pub(crate) fn install_interrupt_handler() {
    let saved = terminal::save();
    if let Err(err) = ctrlc::set_handler(move || {
        terminal::restore(saved.as_ref());
        eprintln!();
        eprintln!("{CANCELLED_MESSAGE}");
        std::process::exit(1);
    }) {
        tracing::debug!(error = %err, "failed to install interrupt handler");
    }
}

#[cfg(unix)]
mod terminal {
    use nix::sys::termios::{self, SetArg, Termios};

    pub(super) fn save() -> Option<Termios> {
        termios::tcgetattr(std::io::stdin()).ok()
    }

    pub(super) fn restore(saved: Option<&Termios>) {
        if let Some(mode) = saved
            && let Err(err) = termios::tcsetattr(std::io::stdin(), SetArg::TCSANOW, mode)
        {
            tracing::debug!(error = %err, "failed to restore terminal mode");
        }
    }
}

#[cfg(not(unix))]
mod terminal {
    pub(super) const fn save() -> Option<()> {
        None
    }

    pub(super) const fn restore(_saved: Option<&()>) {}
}
