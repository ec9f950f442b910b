use clap::Parser;
use mtmcoach::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
