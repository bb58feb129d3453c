// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! `verge` - a thin CLI over the runtime facade: run and disassemble VM
//! modules, or boot the whole runtime as a long-lived process.

mod commands;
mod exit_error;

use clap::{Parser, Subcommand};
use commands::{disasm, run, serve};
use exit_error::ExitError;

#[derive(Parser)]
#[command(name = "verge", version, about = "verge runtime CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a compiled module and invoke one of its methods.
    Run(run::RunArgs),
    /// Dump a compiled module's instructions.
    Disasm(disasm::DisasmArgs),
    /// Boot the runtime facade and block until interrupted.
    Serve(serve::ServeArgs),
}

#[tokio::main]
async fn main() {
    verge_runtime::init_logging("info");

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run(args) => run::run(args).await,
        Command::Disasm(args) => disasm::run(args),
        Command::Serve(args) => serve::run(args).await,
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(exit_code(&err));
    }
}

fn exit_code(err: &ExitError) -> i32 {
    err.code
}
