//! Pipeline driver.
//!
//! A compilation is the fixed chain of file extensions
//! `pln → c → s → o → so`. The first step is the in-process compiler; the
//! rest invoke the external C toolchain. Whatever happens, every
//! intermediate artifact except the final output and the original input is
//! removed; when a step fails, the final output is removed too, so a failed
//! build never leaves stale files behind.

use crate::ast::Program;
use crate::diagnostic::CompileError;
use crate::{c_compiler, checker, coder, emit_lua, parser, pretty, scope_analysis};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

pub const STEPS: [&str; 5] = ["pln", "c", "s", "o", "so"];

fn step_index(ext: &str) -> Option<usize> {
    STEPS.iter().position(|e| *e == ext)
}

/// Runs the pipeline from `input_ext` to `output_ext` on `input_filename`.
/// Returns the path of the final artifact.
pub fn compile(
    input_ext: &str,
    output_ext: &str,
    input_filename: &str,
) -> Result<PathBuf, CompileError> {
    let from = step_index(input_ext)
        .ok_or_else(|| CompileError::Usage(format!("unknown extension '{input_ext}'")))?;
    let to = step_index(output_ext)
        .ok_or_else(|| CompileError::Usage(format!("unknown extension '{output_ext}'")))?;
    if to <= from {
        return Err(CompileError::Usage(format!(
            "cannot compile a .{input_ext} file into a .{output_ext} file"
        )));
    }
    let stem = validate_stem(input_filename, input_ext)?;
    let modname = stem.replace('/', "_");
    let paths: Vec<PathBuf> = (from..=to)
        .map(|k| PathBuf::from(format!("{stem}.{}", STEPS[k])))
        .collect();

    let result = run_steps(&paths, from, to, &modname);

    for (k, p) in paths.iter().enumerate() {
        if k == 0 {
            continue; // the original input always survives
        }
        if k == paths.len() - 1 && result.is_ok() {
            continue; // the final output survives a successful run
        }
        remove_quiet(p);
    }
    result.map(|()| paths.last().cloned().unwrap_or_default())
}

fn run_steps(paths: &[PathBuf], from: usize, to: usize, modname: &str) -> Result<(), CompileError> {
    for (off, k) in (from..to).enumerate() {
        let input = &paths[off];
        let output = &paths[off + 1];
        debug!("{} -> {}", input.display(), output.display());
        match (STEPS[k], STEPS[k + 1]) {
            ("pln", "c") => compile_titan_to_c(input, output, modname)?,
            ("c", "s") => c_compiler::compile_c_to_asm(input, output)?,
            ("s", "o") => c_compiler::compile_asm_to_obj(input, output)?,
            ("o", "so") => c_compiler::compile_obj_to_shared(input, output)?,
            _ => return Err(CompileError::Usage("broken pipeline chain".to_string())),
        }
    }
    Ok(())
}

fn validate_stem(input_filename: &str, ext: &str) -> Result<String, CompileError> {
    let suffix = format!(".{ext}");
    let stem = input_filename.strip_suffix(&suffix).ok_or_else(|| {
        CompileError::Usage(format!(
            "input file '{input_filename}' does not end in '.{ext}'"
        ))
    })?;
    if stem.is_empty()
        || !stem
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '/')
    {
        return Err(CompileError::Usage(format!(
            "module path '{stem}' may only contain letters, digits, '_' and '/'"
        )));
    }
    Ok(stem.to_string())
}

fn remove_quiet(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("could not remove {}: {e}", path.display());
        }
    }
}

/// Parses, scope-analyzes and checks one module, aggregating the front-end
/// diagnostics in source order.
fn front_end(input: &Path) -> Result<Program, CompileError> {
    let filename = input.display().to_string();
    let src = fs::read_to_string(input)?;
    let toplevels = parser::parse(&filename, &src).map_err(CompileError::from_diagnostics)?;
    let mut prog = Program::new(filename, toplevels);
    let mut diags = scope_analysis::analyze(&mut prog);
    diags.extend(checker::check(&mut prog));
    if !diags.is_empty() {
        return Err(CompileError::from_diagnostics(diags));
    }
    Ok(prog)
}

fn compile_titan_to_c(input: &Path, output: &Path, modname: &str) -> Result<(), CompileError> {
    let mut prog = front_end(input)?;
    let code =
        coder::generate(&mut prog, modname).map_err(CompileError::from_diagnostics)?;
    fs::write(output, pretty::reindent(&code))?;
    Ok(())
}

/// `--emit-lua`: type-check the module, then write it back out as plain Lua
/// with every typing construct erased.
pub fn translate(input_filename: &str) -> Result<PathBuf, CompileError> {
    let stem = validate_stem(input_filename, "pln")?;
    let prog = front_end(Path::new(input_filename))?;
    let out = PathBuf::from(format!("{stem}.lua"));
    fs::write(&out, emit_lua::emit_lua(&prog))?;
    Ok(out)
}

/// `--print-ast`: dump the raw tree, before any phase runs.
pub fn print_ast(input_filename: &str) -> Result<(), CompileError> {
    let src = fs::read_to_string(input_filename)?;
    let toplevels =
        parser::parse(input_filename, &src).map_err(CompileError::from_diagnostics)?;
    println!("{toplevels:#?}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = PathBuf::from("target/driver_tests");
        fs::create_dir_all(&dir).expect("scratch dir");
        dir.join(name)
    }

    #[test]
    fn step_ordering_is_enforced_before_any_work() {
        let err = compile("c", "pln", "does_not_exist.c").unwrap_err();
        assert!(matches!(err, CompileError::Usage(_)), "{err}");
        let err = compile("pln", "pln", "does_not_exist.pln").unwrap_err();
        assert!(matches!(err, CompileError::Usage(_)));
    }

    #[test]
    fn unknown_extensions_are_usage_errors() {
        assert!(matches!(
            compile("titan", "so", "m.titan").unwrap_err(),
            CompileError::Usage(_)
        ));
        assert!(matches!(
            compile("pln", "exe", "m.pln").unwrap_err(),
            CompileError::Usage(_)
        ));
    }

    #[test]
    fn filename_must_match_input_extension() {
        assert!(matches!(
            compile("pln", "c", "m.txt").unwrap_err(),
            CompileError::Usage(_)
        ));
    }

    #[test]
    fn stem_characters_are_restricted() {
        assert!(matches!(
            compile("pln", "c", "bad-name.pln").unwrap_err(),
            CompileError::Usage(_)
        ));
        assert!(matches!(
            compile("pln", "c", "with space.pln").unwrap_err(),
            CompileError::Usage(_)
        ));
    }

    #[test]
    fn pln_to_c_writes_c_and_keeps_the_input() {
        let input = scratch("ok1.pln");
        fs::write(
            &input,
            "local function add(x: integer, y: integer): integer return x + y end",
        )
        .unwrap();
        let out = compile("pln", "c", input.to_str().unwrap()).unwrap();
        assert_eq!(out, scratch("ok1.c"));
        let c = fs::read_to_string(&out).unwrap();
        assert!(c.contains("luaopen_target_driver_tests_ok1"));
        assert!(c.contains("function_add_titan"));
        assert!(input.exists());
        fs::remove_file(out).unwrap();
        fs::remove_file(input).unwrap();
    }

    #[test]
    fn failed_compile_leaves_no_intermediates() {
        let input = scratch("bad1.pln");
        fs::write(&input, "local function h(): integer end").unwrap();
        let err = compile("pln", "so", input.to_str().unwrap()).unwrap_err();
        let CompileError::Source(diags) = err else {
            panic!("expected source diagnostics")
        };
        assert_eq!(diags.len(), 1);
        assert!(diags[0]
            .message
            .contains("function can return nil but return type is not nil"));
        for ext in ["c", "s", "o", "so"] {
            assert!(
                !scratch(&format!("bad1.{ext}")).exists(),
                ".{ext} left behind"
            );
        }
        assert!(input.exists());
        fs::remove_file(input).unwrap();
    }

    #[test]
    fn diagnostics_come_out_in_source_order() {
        let input = scratch("order1.pln");
        fs::write(
            &input,
            "local function a(): integer end\nlocal b: integer = 1.5\nlocal c: integer = true",
        )
        .unwrap();
        let err = compile("pln", "c", input.to_str().unwrap()).unwrap_err();
        let CompileError::Source(diags) = err else { panic!() };
        let lines: Vec<u32> = diags.iter().map(|d| d.loc.line).collect();
        let mut sorted = lines.clone();
        sorted.sort();
        assert_eq!(lines, sorted);
        fs::remove_file(input).unwrap();
    }

    #[test]
    fn translate_writes_a_lua_file() {
        let input = scratch("tr1.pln");
        fs::write(
            &input,
            "function double(x: integer): integer return x * 2 end",
        )
        .unwrap();
        let out = translate(input.to_str().unwrap()).unwrap();
        assert_eq!(out, scratch("tr1.lua"));
        let lua = fs::read_to_string(&out).unwrap();
        assert!(lua.contains("local function double(x)"));
        assert!(lua.contains("return { double = double }"));
        fs::remove_file(out).unwrap();
        fs::remove_file(input).unwrap();
    }

    #[test]
    fn missing_input_is_an_io_error() {
        let err = compile("pln", "c", "target/driver_tests/nope_missing.pln").unwrap_err();
        assert!(matches!(err, CompileError::Io(_)));
    }
}
