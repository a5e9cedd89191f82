use std::fs;
use std::process::{Command, Output};

use tempfile::TempDir;

fn milky(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_milky"))
        .env_remove("MILKY_CATALOG")
        .env_remove("MILKY_SESSION_CONFIG")
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("failed to run milky")
}

fn stdout(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).unwrap()
}

#[test]
fn list_prints_builtin_entries_in_order() {
    let output = milky(&["list"]);
    assert!(output.status.success());
    let ids: Vec<String> = stdout(&output)
        .lines()
        .filter_map(|line| line.split_whitespace().next().map(str::to_string))
        .collect();
    assert_eq!(
        ids,
        [
            "milky-orb",
            "milky-stars",
            "milky-shower",
            "milky-cosmic",
            "milky-ring",
            "milky-wave"
        ]
    );
}

#[test]
fn search_is_case_insensitive() {
    let output = milky(&["search", "RING"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("milky-ring"));
    assert!(!text.contains("milky-wave"));
}

#[test]
fn search_json_is_an_array_of_entries() {
    let output = milky(&["--json", "search", "milky"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.trim_start().starts_with('['));
    assert!(text.contains("\"id\": \"milky-orb\""));
}

#[test]
fn show_prints_metadata() {
    let output = milky(&["show", "milky-shower"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Milky Shower"));
    assert!(text.contains("milky-shower.glsl"));
    assert!(text.contains("t (time)"));
}

#[test]
fn source_is_printed_verbatim() {
    let output = milky(&["source", "milky-orb"]);
    assert!(output.status.success());
    let expected = include_str!("../../catalog/shaders/milky-orb.glsl");
    assert_eq!(stdout(&output), expected);
}

#[test]
fn export_writes_named_file() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().to_str().unwrap();
    let output = milky(&["export", "milky-wave", "--dir", target]);
    assert!(output.status.success());
    let written = fs::read_to_string(dir.path().join("milky-wave.glsl")).unwrap();
    let expected = include_str!("../../catalog/shaders/milky-wave.glsl");
    assert_eq!(written, expected);
}

#[test]
fn unknown_id_exits_with_not_found() {
    for command in ["show", "source", "export", "check"] {
        let output = milky(&[command, "milky-nope"]);
        assert!(!output.status.success(), "{command} succeeded");
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("not found"), "{command}: {stderr}");
    }
}

#[test]
fn catalog_directory_replaces_builtins() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("catalog.toml"),
        r#"
[[entry]]
id = "flat"
name = "Flat Colour"
tags = ["solid"]
source = "flat.glsl"
"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("flat.glsl"),
        "void main() { gl_FragColor = vec4(1.0); }\n",
    )
    .unwrap();

    let catalog = dir.path().to_str().unwrap();
    let output = milky(&["--catalog", catalog, "tags"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "solid");
}

#[test]
fn check_reports_untranslatable_shaders() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("catalog.toml"),
        r#"
[[entry]]
id = "textured"
name = "Textured"
source = "textured.glsl"
"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("textured.glsl"),
        "uniform sampler2D tex;\nvoid main() { gl_FragColor = vec4(1.0); }\n",
    )
    .unwrap();

    let catalog = dir.path().to_str().unwrap();
    let output = milky(&["--catalog", catalog, "check"]);
    assert!(!output.status.success());
    assert!(stdout(&output).contains("fail  textured"));
}
