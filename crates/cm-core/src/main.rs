#![forbid(unsafe_code)]

use std::process::ExitCode as ProcessExitCode;

use clap::Parser;

use cm_core::cli::{run, Cli};
use cm_core::logging::init_logging;

fn main() -> ProcessExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format);
    let code = run(&cli);
    ProcessExitCode::from(code.as_i32() as u8)
}
