//! Black-box tests driving the `mj2c` binary.

use std::{fs, path::Path, process::Command};

fn mj2c() -> Command {
    Command::new(env!("CARGO_BIN_EXE_mj2c"))
}

fn write_source(dir: &Path, contents: &str) -> std::path::PathBuf {
    let source = dir.join("input.java");
    fs::write(&source, contents).unwrap();
    source
}

#[test]
fn compiles_hello_world_into_the_output_directory() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(
        dir.path(),
        "class Main { public static void main() { System.out.println(42); } }",
    );
    let out = dir.path().join("compile");

    let status = mj2c().arg("-o").arg(&out).arg(&source).status().unwrap();
    assert!(status.success());

    let main_c = fs::read_to_string(out.join("Main.c")).unwrap();
    assert!(main_c.contains("int main() {"));
    assert!(main_c.contains("printf(\"%d\\n\", 42);"));

    assert!(out.join("Main.h").exists());
    assert!(out.join("__int_array.h").exists());
    assert!(out.join("__int_array.c").exists());
    assert!(out.join("CMakeLists.txt").exists());
}

#[test]
fn semantic_errors_abort_with_a_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), "class A extends B {} class B extends A {}");
    let out = dir.path().join("compile");

    let output = mj2c().arg("-o").arg(&out).arg(&source).output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Cyclic inheritance detected"));
    assert!(!out.join("A.c").exists());
}

#[test]
fn syntax_errors_name_the_offending_token() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(
        dir.path(),
        "class A { public void run() { int 5x; } }",
    );

    let output = mj2c().arg(&source).output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error:"));
}

#[test]
fn lextest_dumps_significant_tokens() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), "class Main { }");

    let output = mj2c().arg("--lextest").arg(&source).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("'class'"));
    assert!(stdout.contains("identifier `Main`"));
    assert!(stdout.contains("`{`"));
    assert!(stdout.contains("`}`"));
}

#[test]
fn echo_round_trips_the_input() {
    let dir = tempfile::tempdir().unwrap();
    let contents = "class Echoed { }\n";
    let source = write_source(dir.path(), contents);

    let output = mj2c().arg("--echo").arg(&source).output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), contents);
}

#[test]
fn check_stops_before_emitting_files() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(
        dir.path(),
        "class A { public int one() { return 1; } }",
    );
    let out = dir.path().join("compile");

    let status = mj2c()
        .arg("--check")
        .arg("-o")
        .arg(&out)
        .arg(&source)
        .status()
        .unwrap();
    assert!(status.success());
    assert!(!out.exists());
}

#[test]
fn print_ast_renders_resolved_types() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(
        dir.path(),
        "class A { public int one() { return 1; } }",
    );

    let output = mj2c().arg("--print-ast").arg(&source).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Class A"));
    assert!(stdout.contains("Method int one()"));
    assert!(stdout.contains("Number 1"));
}
