//! CLI module for graphgate
//!
//! Provides command-line interface for:
//! - check-config: validate a cluster config
//! - run: boot an in-process cluster and serve JSON requests on stdin

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check_config, handle_line, run, run_command, serve};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_requests, write_error, write_response};
