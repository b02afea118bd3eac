// CLI subcommand dispatch.

use clap::Subcommand;

pub mod apply;
pub mod diff;
pub mod hash;
pub mod scan;
pub mod session;
pub mod status;

#[derive(Subcommand)]
pub enum Command {
    /// List the files a share of the project would upload
    Scan(scan::ScanArgs),
    /// Produce the wire patch between two files
    Diff(diff::DiffArgs),
    /// Apply a wire patch to a file
    Apply(apply::ApplyArgs),
    /// Print content fingerprints as the server computes them
    Hash(hash::HashArgs),
    /// Show the workspace marker and effective settings
    Status(status::StatusArgs),
    /// Run a sync session over stdin/stdout
    Session(session::SessionArgs),
}

pub fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Scan(args) => scan::run(args),
        Command::Diff(args) => diff::run(args),
        Command::Apply(args) => apply::run(args),
        Command::Hash(args) => hash::run(args),
        Command::Status(args) => status::run(args),
        Command::Session(args) => session::run(args),
    }
}
