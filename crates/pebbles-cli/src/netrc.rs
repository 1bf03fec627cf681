//! Netrc-format credential store.
//!
//! Entries are kept in file order so that rewriting the store preserves
//! machines, `default` and `macdef` blocks written by other tools. Comments on
//! their own line survive a rewrite; trailing comments do not.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::auth::Credential;

const ENCRYPTED_SUFFIX: &str = ".gpg";

/// Errors raised while reading or writing the credential store.
#[derive(Debug, Error)]
pub(crate) enum StoreError {
    /// The file is readable by group or other.
    #[error(
        "Permission bits for '{path}' should be 0600, but are {mode:o}.\nYou should run `chmod 0600 {path}` so that your credentials are NOT accessible by others."
    )]
    Permissions {
        /// Store location.
        path: String,
        /// Observed permission bits.
        mode: u32,
    },
    /// Reading or writing failed.
    #[error("Error reading {path}\n{source}\nMake sure this user can read/write this file.")]
    Io {
        /// Store location.
        path: String,
        /// Underlying failure.
        source: io::Error,
    },
    /// The file is not valid netrc.
    #[error(
        "Error reading {path}\n{message}\nYou may need to delete this file and run `pebbles login` to recreate it."
    )]
    Parse {
        /// Store location.
        path: String,
        /// Parser diagnostic.
        message: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Machine {
    pub(crate) login: Option<String>,
    pub(crate) password: Option<String>,
    pub(crate) account: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Comment(String),
    Machine { name: String, entry: Machine },
    Default(Machine),
    Macdef { name: String, body: Vec<String> },
}

/// Parsed netrc document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Netrc {
    items: Vec<Item>,
}

impl Netrc {
    pub(crate) fn parse(text: &str) -> Result<Self, String> {
        let mut items = Vec::new();
        let mut current: Option<Item> = None;
        let mut lines = text.lines();

        while let Some(line) = lines.next() {
            let trimmed = line.trim();
            if trimmed.starts_with('#') {
                flush(&mut items, &mut current);
                items.push(Item::Comment(line.to_string()));
                continue;
            }

            let content = line.split_once('#').map_or(line, |(before, _)| before);
            let mut tokens = content.split_whitespace();
            while let Some(token) = tokens.next() {
                match token {
                    "machine" => {
                        flush(&mut items, &mut current);
                        let name = tokens.next().ok_or("`machine` is missing a name")?;
                        current = Some(Item::Machine {
                            name: name.to_string(),
                            entry: Machine::default(),
                        });
                    }
                    "default" => {
                        flush(&mut items, &mut current);
                        current = Some(Item::Default(Machine::default()));
                    }
                    "macdef" => {
                        flush(&mut items, &mut current);
                        let name = tokens.next().ok_or("`macdef` is missing a name")?;
                        let body = lines
                            .by_ref()
                            .take_while(|line| !line.trim().is_empty())
                            .map(str::to_string)
                            .collect();
                        items.push(Item::Macdef {
                            name: name.to_string(),
                            body,
                        });
                        break;
                    }
                    "login" | "password" | "account" => {
                        let value = tokens
                            .next()
                            .ok_or_else(|| format!("`{token}` is missing a value"))?;
                        let entry = match current.as_mut() {
                            Some(Item::Machine { entry, .. } | Item::Default(entry)) => entry,
                            _ => return Err(format!("`{token}` appears outside a machine entry")),
                        };
                        let slot = match token {
                            "login" => &mut entry.login,
                            "password" => &mut entry.password,
                            _ => &mut entry.account,
                        };
                        *slot = Some(value.to_string());
                    }
                    other => return Err(format!("unexpected token `{other}`")),
                }
            }
        }
        flush(&mut items, &mut current);
        Ok(Self { items })
    }

    /// Credential for `machine`. An entry without a password is ignored.
    pub(crate) fn get(&self, machine: &str) -> Option<Credential> {
        self.items.iter().find_map(|item| match item {
            Item::Machine { name, entry } if name == machine => {
                entry.password.as_ref().map(|password| Credential {
                    user: entry.login.clone().unwrap_or_default(),
                    api_key: password.clone(),
                })
            }
            _ => None,
        })
    }

    pub(crate) fn contains(&self, machine: &str) -> bool {
        self.get(machine).is_some()
    }

    /// Insert or replace the login and password for `machine`.
    pub(crate) fn set(&mut self, machine: &str, credential: &Credential) {
        for item in &mut self.items {
            if let Item::Machine { name, entry } = item
                && name == machine
            {
                entry.login = Some(credential.user.clone());
                entry.password = Some(credential.api_key.clone());
                return;
            }
        }

        // machines must precede `default`
        let position = self
            .items
            .iter()
            .position(|item| matches!(item, Item::Default(_)))
            .unwrap_or(self.items.len());
        self.items.insert(
            position,
            Item::Machine {
                name: machine.to_string(),
                entry: Machine {
                    login: Some(credential.user.clone()),
                    password: Some(credential.api_key.clone()),
                    account: None,
                },
            },
        );
    }

    /// Returns whether an entry was removed.
    pub(crate) fn remove(&mut self, machine: &str) -> bool {
        let before = self.items.len();
        self.items
            .retain(|item| !matches!(item, Item::Machine { name, .. } if name == machine));
        before != self.items.len()
    }

    pub(crate) fn render(&self) -> String {
        let mut out = String::new();
        for item in &self.items {
            match item {
                Item::Comment(line) => {
                    out.push_str(line);
                    out.push('\n');
                }
                Item::Machine { name, entry } => {
                    out.push_str(&format!("machine {name}\n"));
                    render_entry(&mut out, entry);
                }
                Item::Default(entry) => {
                    out.push_str("default\n");
                    render_entry(&mut out, entry);
                }
                Item::Macdef { name, body } => {
                    out.push_str(&format!("macdef {name}\n"));
                    for line in body {
                        out.push_str(line);
                        out.push('\n');
                    }
                    out.push('\n');
                }
            }
        }
        out
    }
}

fn flush(items: &mut Vec<Item>, current: &mut Option<Item>) {
    if let Some(item) = current.take() {
        items.push(item);
    }
}

fn render_entry(out: &mut String, entry: &Machine) {
    for (key, value) in [
        ("login", &entry.login),
        ("password", &entry.password),
        ("account", &entry.account),
    ] {
        if let Some(value) = value.as_deref().filter(|value| !value.is_empty()) {
            out.push_str(&format!("  {key} {value}\n"));
        }
    }
}

/// The on-disk credential file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.netrc`, or `~/_netrc` on Windows.
    pub(crate) fn default_path() -> Option<PathBuf> {
        let name = if cfg!(windows) { "_netrc" } else { ".netrc" };
        let path = dirs::home_dir()?.join(name);
        let encrypted = with_suffix(&path, ENCRYPTED_SUFFIX);
        if encrypted.exists() {
            tracing::warn!(
                path = %encrypted.display(),
                "encrypted credential stores are not supported; using the plain store"
            );
        }
        Some(path)
    }

    /// Parse the store. A missing file reads as `None`.
    pub(crate) fn read(&self) -> Result<Option<Netrc>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        self.check_permissions()?;
        let text = fs::read_to_string(&self.path).map_err(|source| self.io_error(source))?;
        tracing::debug!(path = %self.path.display(), "reading credential store");
        Netrc::parse(&text)
            .map(Some)
            .map_err(|message| StoreError::Parse {
                path: self.display(),
                message,
            })
    }

    pub(crate) fn load(&self, machine: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self.read()?.and_then(|netrc| netrc.get(machine)))
    }

    /// Write `credential` under every name in `machines`, creating the file
    /// owner-only when missing.
    pub(crate) fn save(&self, machines: &[String], credential: &Credential) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }
        self.touch()?;
        set_file_permissions(&self.path).map_err(|source| self.io_error(source))?;

        let mut netrc = self.read()?.unwrap_or_default();
        for machine in machines {
            netrc.set(machine, credential);
        }
        self.write(&netrc)
    }

    /// Remove every name in `machines`. A missing file is not an error.
    pub(crate) fn remove(&self, machines: &[String]) -> Result<(), StoreError> {
        let Some(mut netrc) = self.read()? else {
            return Ok(());
        };
        let mut changed = false;
        for machine in machines {
            changed |= netrc.remove(machine);
        }
        if changed {
            self.write(&netrc)?;
        }
        Ok(())
    }

    fn write(&self, netrc: &Netrc) -> Result<(), StoreError> {
        fs::write(&self.path, netrc.render()).map_err(|source| self.io_error(source))
    }

    fn touch(&self) -> Result<(), StoreError> {
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        options
            .open(&self.path)
            .map(drop)
            .map_err(|source| self.io_error(source))
    }

    #[cfg(unix)]
    fn check_permissions(&self) -> Result<(), StoreError> {
        use std::os::unix::fs::PermissionsExt;
        let metadata = fs::metadata(&self.path).map_err(|source| self.io_error(source))?;
        let mode = metadata.permissions().mode() & 0o777;
        if mode & 0o077 != 0 {
            return Err(StoreError::Permissions {
                path: self.display(),
                mode,
            });
        }
        Ok(())
    }

    #[cfg(not(unix))]
    #[allow(clippy::unnecessary_wraps, clippy::unused_self)]
    fn check_permissions(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.display(),
            source,
        }
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Set restrictive file permissions (0600 on Unix).
fn set_file_permissions(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
