//! `verge run` - load a compiled module and invoke one of its methods.

use crate::exit_error::ExitError;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use verge_vm::{Module, Value, Vm, VmConfig};

#[derive(Args)]
pub struct RunArgs {
    /// Path to a compiled module file.
    pub module: PathBuf,

    /// Method to invoke within the module.
    #[arg(long, default_value = "main")]
    pub method: String,

    /// Arguments passed as initial locals. Parsed as `i64` where possible,
    /// otherwise kept as a string.
    #[arg(long = "arg", value_name = "VALUE")]
    pub args: Vec<String>,
}

pub async fn run(args: RunArgs) -> Result<(), ExitError> {
    let bytes = std::fs::read(&args.module)
        .map_err(|e| ExitError::new(1, format!("reading {}: {e}", args.module.display())))?;
    let module = Module::decode(&bytes).map_err(|e| ExitError::new(1, format!("decoding module: {e}")))?;
    let module_name = module.name.clone();

    let vm = Vm::new(VmConfig::default());
    vm.load_module(module).map_err(|e| ExitError::new(1, format!("loading module: {e}")))?;

    let locals: Vec<Value> = args.args.iter().map(|raw| parse_arg(raw)).collect();
    let cancel = CancellationToken::new();
    let result = vm
        .run(&module_name, &args.method, locals, &cancel)
        .await
        .map_err(|e| ExitError::new(1, format!("running {}::{}: {e}", module_name, args.method)))?;
    println!("{result}");
    Ok(())
}

fn parse_arg(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        Value::Float(f)
    } else {
        Value::Str(Arc::from(raw))
    }
}
