//! Invocation of the external C toolchain.
//!
//! The `c → s → o → so` pipeline steps shell out to the system C compiler.
//! The Lua sources (for the internal headers the generated code includes)
//! are expected under `lua/src`, overridable with `TITAN_LUA_DIR`.
//! Toolchain failures are surfaced verbatim.

use crate::diagnostic::CompileError;
use itertools::Itertools;
use log::info;
use owo_colors::OwoColorize;
use std::path::Path;
use std::process::Command;

pub const CC: &str = "cc";
const CFLAGS: [&str; 4] = ["-std=c99", "-O2", "-Wall", "-fPIC"];

fn lua_include_dir() -> String {
    std::env::var("TITAN_LUA_DIR").unwrap_or_else(|_| "lua/src".to_string())
}

pub fn compile_c_to_asm(input: &Path, output: &Path) -> Result<(), CompileError> {
    let mut args: Vec<String> = CFLAGS.iter().map(|s| s.to_string()).collect();
    args.push(format!("-I{}", lua_include_dir()));
    args.push("-S".to_string());
    push_io(&mut args, input, output);
    run_cc(&args)
}

pub fn compile_asm_to_obj(input: &Path, output: &Path) -> Result<(), CompileError> {
    let mut args = vec!["-c".to_string()];
    push_io(&mut args, input, output);
    run_cc(&args)
}

pub fn compile_obj_to_shared(input: &Path, output: &Path) -> Result<(), CompileError> {
    let mut args = vec!["-shared".to_string()];
    push_io(&mut args, input, output);
    run_cc(&args)
}

fn push_io(args: &mut Vec<String>, input: &Path, output: &Path) {
    args.push("-o".to_string());
    args.push(output.display().to_string());
    args.push(input.display().to_string());
}

fn run_cc(args: &[String]) -> Result<(), CompileError> {
    info!(
        "     {} {CC} {}",
        "Running".green().bold(),
        args.iter().format(" ")
    );
    let output = Command::new(CC).args(args).output()?;
    if output.status.success() {
        Ok(())
    } else {
        Err(CompileError::Toolchain(
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }
}
