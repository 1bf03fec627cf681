#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::redundant_pub_crate)]

//! Command-line client for managing apps, config vars and credentials on the
//! Pebblescape platform.
//!
//! Layout:
//! - `cli.rs`: process entry, top-level error rendering
//! - `config.rs`: environment overrides and resolved settings
//! - `help.rs`: help block parsing (banner, summary, options)
//! - `registry.rs`: namespace/command/alias tables
//! - `dispatch.rs`: command resolution, flag parsing, argument validation
//! - `client.rs`: API request pipeline, error taxonomy
//! - `endpoints.rs`: typed wrappers for individual API routes
//! - `netrc.rs`: credential store
//! - `auth.rs`: credential resolution and the login state machine
//! - `prompt.rs`: terminal prompts and interrupt handling
//! - `session.rs`: per-process context threaded through handlers
//! - `output.rs`: display helpers
//! - `commands/`: command handlers grouped by namespace
//! - `main.rs`: thin entrypoint delegating to `run()`

pub(crate) mod auth;
pub(crate) mod cli;
pub(crate) mod client;
pub(crate) mod commands;
pub(crate) mod config;
pub(crate) mod dispatch;
pub(crate) mod endpoints;
pub(crate) mod help;
pub(crate) mod netrc;
pub(crate) mod output;
pub(crate) mod prompt;
pub(crate) mod registry;
pub(crate) mod session;

pub use cli::run;
