//! graphgate CLI entry point
//!
//! Parses arguments, runs the command, prints a failure to stderr and
//! exits non-zero. Everything else lives in the CLI module.

use graphgate::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
