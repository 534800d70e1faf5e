use assert_cmd::prelude::{CommandCargoExt, OutputAssertExt};
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;

fn titanc(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap();
    cmd.current_dir(dir);
    cmd
}

fn write_module(dir: &Path, name: &str, src: &str) {
    fs::write(dir.join(name), src).unwrap();
}

#[test]
fn empty_module_compiles_to_c() {
    let dir = tempfile::tempdir().unwrap();
    write_module(dir.path(), "m.pln", "");
    titanc(dir.path())
        .args(["m.pln", "--emit-c", "-q"])
        .assert()
        .success();
    let c = fs::read_to_string(dir.path().join("m.c")).unwrap();
    assert!(c.contains("int luaopen_m(lua_State *L)"));
    assert!(c.contains("luaH_resize(L, _mod, 0, 0);"));
}

#[test]
fn integer_add_module_emits_entry_points_and_tag_checks() {
    let dir = tempfile::tempdir().unwrap();
    write_module(
        dir.path(),
        "m.pln",
        "local function add(x: integer, y: integer): integer return x + y end",
    );
    titanc(dir.path())
        .args(["m.pln", "--emit-c", "-q"])
        .assert()
        .success();
    let c = fs::read_to_string(dir.path().join("m.c")).unwrap();
    assert!(c.contains("function_add_titan"));
    assert!(c.contains("function_add_lua"));
    assert!(c.contains("intop(+, local_x, local_y)"));
    assert!(c.contains(
        "\"wrong type for argument %s at line %d, expected %s\", \"x\", 1, \"integer\""
    ));
}

#[test]
fn float_and_integer_do_not_mix_silently() {
    let dir = tempfile::tempdir().unwrap();
    write_module(
        dir.path(),
        "ok.pln",
        "local function f(): float return 1 + 2.0 end",
    );
    titanc(dir.path())
        .args(["ok.pln", "--emit-c", "-q"])
        .assert()
        .success();

    write_module(
        dir.path(),
        "bad.pln",
        "local function g(): integer return 1 + 2.0 end",
    );
    titanc(dir.path())
        .args(["bad.pln", "--emit-c", "-q"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected integer but found float"));
}

#[test]
fn duplicate_toplevel_fails_with_one_positioned_error() {
    let dir = tempfile::tempdir().unwrap();
    write_module(
        dir.path(),
        "m.pln",
        "local function foo() end\nlocal function foo() end",
    );
    let out = titanc(dir.path())
        .args(["m.pln", "--emit-c", "-q"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "duplicate function or variable declaration for foo",
        ))
        .get_output()
        .clone();
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert_eq!(
        stderr
            .lines()
            .filter(|l| l.contains("duplicate"))
            .count(),
        1
    );
    assert!(stderr.contains("m.pln:2:"), "location missing: {stderr}");
}

#[test]
fn missing_return_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_module(dir.path(), "m.pln", "local function h(): integer end");
    titanc(dir.path())
        .args(["m.pln", "--emit-c", "-q"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "function can return nil but return type is not nil",
        ));
}

#[test]
fn diagnostics_are_one_per_line_with_file_line_col() {
    let dir = tempfile::tempdir().unwrap();
    write_module(
        dir.path(),
        "m.pln",
        "local a: integer = 1.5\nlocal b: integer = true",
    );
    let out = titanc(dir.path())
        .args(["m.pln", "--emit-c", "-q"])
        .assert()
        .failure()
        .get_output()
        .clone();
    let stderr = String::from_utf8_lossy(&out.stderr);
    let lines: Vec<&str> = stderr.lines().collect();
    assert_eq!(lines.len(), 2, "{stderr}");
    assert!(lines[0].starts_with("m.pln:1:"));
    assert!(lines[1].starts_with("m.pln:2:"));
}

#[test]
fn emit_lua_strips_annotations() {
    let dir = tempfile::tempdir().unwrap();
    write_module(
        dir.path(),
        "m.pln",
        "function double(x: integer): integer return x * 2 end",
    );
    titanc(dir.path())
        .args(["m.pln", "--emit-lua", "-q"])
        .assert()
        .success();
    let lua = fs::read_to_string(dir.path().join("m.lua")).unwrap();
    assert!(lua.contains("local function double(x)"));
    assert!(lua.contains("return { double = double }"));
    assert!(!lua.contains("integer"));
}

#[test]
fn print_ast_dumps_the_tree() {
    let dir = tempfile::tempdir().unwrap();
    write_module(dir.path(), "m.pln", "local x: integer = 1");
    titanc(dir.path())
        .args(["m.pln", "--print-ast", "-q"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Var"));
}

#[test]
fn wrong_extension_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    write_module(dir.path(), "m.txt", "");
    titanc(dir.path())
        .args(["m.txt", "--emit-c", "-q"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not end in '.pln'"));
}

#[test]
fn syntax_errors_are_positioned() {
    let dir = tempfile::tempdir().unwrap();
    write_module(dir.path(), "m.pln", "local function f(\n");
    titanc(dir.path())
        .args(["m.pln", "--emit-c", "-q"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("m.pln:"))
        .stderr(predicate::str::contains("syntax error"));
}

#[test]
fn binsearch_benchmark_module_compiles() {
    let dir = tempfile::tempdir().unwrap();
    let src = fs::read_to_string(
        Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata/binsearch.pln"),
    )
    .unwrap();
    write_module(dir.path(), "binsearch.pln", &src);
    titanc(dir.path())
        .args(["binsearch.pln", "--emit-c", "-q"])
        .assert()
        .success();
    let c = fs::read_to_string(dir.path().join("binsearch.c")).unwrap();
    assert!(c.contains("function_binsearch_titan"));
    assert!(c.contains("function_test_titan"));
    // the midpoint uses the VM's floor division helper
    assert!(c.contains("luaV_div(L, "));
    // only `test` is exported
    assert!(c.contains("lua_pushstring(L, \"test\");"));
    assert!(!c.contains("lua_pushstring(L, \"binsearch\");"));
}

#[test]
fn emit_lua_of_binsearch_matches_reference_semantics() {
    let dir = tempfile::tempdir().unwrap();
    let src = fs::read_to_string(
        Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata/binsearch.pln"),
    )
    .unwrap();
    write_module(dir.path(), "binsearch.pln", &src);
    titanc(dir.path())
        .args(["binsearch.pln", "--emit-lua", "-q"])
        .assert()
        .success();
    let lua = fs::read_to_string(dir.path().join("binsearch.lua")).unwrap();
    assert!(lua.contains("local function binsearch(t, x)"));
    assert!(lua.contains("return { test = test }"));
}
