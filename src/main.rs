//! Entry point: parses the config-file path, installs the `log` subscriber,
//! and hands stdin/stdout to the console REPL.

use clap::Parser;
use csopesy_core::console::Console;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "csopesy", about = "Educational multi-core scheduler + demand-paging emulator")]
struct Args {
    /// Path to the configuration file read by the `initialize` command.
    #[arg(long, default_value = "config.txt")]
    config: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let console = Console::new(args.config);
    let stdin = io::stdin();
    let code = console.run(stdin.lock(), io::stdout());
    ExitCode::from(code as u8)
}
