//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Bulk image downloader.
///
/// Pages through image search results for a keyword (or a file of keywords)
/// and saves every distinct image once, remembering what was fetched so an
/// interrupted run can be resumed.
#[derive(Parser, Debug)]
#[command(name = "imgbulk")]
#[command(author, version, about)]
pub struct Args {
    /// Search words, joined into one keyword (or the keyword file with -f)
    #[arg(required = true, num_args = 1..)]
    pub search: Vec<String>,

    /// Treat the positional argument as a file with one keyword per line
    #[arg(short = 'f', long)]
    pub search_file: bool,

    /// Output root; each keyword saves into its own subdirectory [default: ./bing]
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Disable the search engine's adult content filter
    #[arg(short = 'a', long)]
    pub adult_filter_off: bool,

    /// Only search for animated GIFs
    #[arg(short = 'g', long)]
    pub animated_gif: bool,

    /// Extra query filters appended verbatim, e.g. +filterui:license-L1
    #[arg(long)]
    pub filters: Option<String>,

    /// Stop once the download history holds this many URLs
    #[arg(long)]
    pub limit: Option<usize>,

    /// Concurrent fetch workers (1-100) [default: 20]
    #[arg(short = 't', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub threads: Option<u8>,

    /// Config file to use instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Log level requested on the command line.
    #[must_use]
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}
