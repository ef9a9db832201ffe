use clap::{Parser, Subcommand, ValueEnum};

/// Synchronize student marks from a Google Sheet into the BRS portal.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log formatter to use
    #[arg(long, value_enum, global = true, default_value_t = TracingFormat::Pretty)]
    pub tracing: TracingFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Reconcile a sheet with the portal and (optionally) write the differences
    Run {
        /// Spreadsheet id from the sheet's URL
        #[arg(long)]
        spreadsheet: String,
        /// A1 range holding the header, parameters and student rows
        #[arg(long)]
        range: String,
        /// Write changes to the portal; without this flag the run is a dry run
        #[arg(long)]
        save: bool,
        /// Print reports as JSON instead of colored text
        #[arg(long)]
        json: bool,
    },
    /// List the disciplines visible to the session
    Disciplines {
        /// Academic year start, e.g. 2024 for 2024/2025
        #[arg(long)]
        year: i32,
        /// Term within the year (1 or 2)
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
        term: u8,
        /// Course number
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=6))]
        course: u8,
        /// List module disciplines instead of regular ones
        #[arg(long)]
        module: bool,
        /// Ignore cached results
        #[arg(long)]
        refresh: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable colored output
    Pretty,
    /// One JSON object per event
    Json,
}
