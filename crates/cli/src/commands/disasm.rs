//! `verge disasm` - dump a module file's instructions in human-readable form.

use crate::exit_error::ExitError;
use clap::Args;
use std::path::PathBuf;
use verge_vm::{disassemble, Module};

#[derive(Args)]
pub struct DisasmArgs {
    /// Path to a compiled module file.
    pub module: PathBuf,
}

pub fn run(args: DisasmArgs) -> Result<(), ExitError> {
    let bytes = std::fs::read(&args.module)
        .map_err(|e| ExitError::new(1, format!("reading {}: {e}", args.module.display())))?;
    let module = Module::decode(&bytes).map_err(|e| ExitError::new(1, format!("decoding module: {e}")))?;
    print!("{}", disassemble(&module));
    Ok(())
}
