// CLI integration tests for zonediff
// Runs the built binary against files in a temp directory

mod helpers;

use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn zonediff() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_zonediff"));
    // Keep the developer's own config out of the tests
    command.env("XDG_CONFIG_HOME", std::env::temp_dir().join("zonediff-cli-tests"));
    command
}

#[test]
fn test_help_lists_subcommands() {
    let output = zonediff().arg("--help").output().expect("Failed to execute command");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Help should exit with success");
    for subcommand in ["apply", "diff", "config"] {
        assert!(
            stdout.contains(subcommand),
            "Help should list {}. Got: {}",
            subcommand,
            stdout
        );
    }
}

#[test]
fn test_apply_rewrites_file() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("main.rs");
    let patch = dir.path().join("change.patch");
    fs::write(&file, "fn main() {\n    println!(\"old\");\n}\n").unwrap();
    fs::write(
        &patch,
        helpers::block("    println!(\"old\");", "    println!(\"new\");"),
    )
    .unwrap();

    let output = zonediff().arg("apply").arg(&file).arg(&patch).output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        fs::read_to_string(&file).unwrap(),
        "fn main() {\n    println!(\"new\");\n}\n"
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("+    println!(\"new\");"));
}

#[test]
fn test_apply_dry_run_leaves_file_untouched() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("notes.txt");
    let patch = dir.path().join("change.patch");
    fs::write(&file, "alpha\nbeta\n").unwrap();
    fs::write(&patch, helpers::block("beta", "gamma")).unwrap();

    let output = zonediff()
        .args(["apply", "--dry-run"])
        .arg(&file)
        .arg(&patch)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(fs::read_to_string(&file).unwrap(), "alpha\nbeta\n");
    assert!(String::from_utf8_lossy(&output.stdout).contains("+gamma"));
}

#[test]
fn test_apply_missing_search_exits_with_error() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("notes.txt");
    let patch = dir.path().join("change.patch");
    fs::write(&file, "alpha\n").unwrap();
    fs::write(&patch, helpers::block("omega", "x")).unwrap();

    let output = zonediff().arg("apply").arg(&file).arg(&patch).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("omega"), "stderr: {}", stderr);
    assert_eq!(fs::read_to_string(&file).unwrap(), "alpha\n");
}

#[test]
fn test_apply_exact_disables_whitespace_fallback() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("code.py");
    let patch = dir.path().join("change.patch");
    fs::write(&file, "def f():\n    return 1\n").unwrap();
    fs::write(&patch, helpers::block("return  1", "    return 2")).unwrap();

    let strict = zonediff()
        .args(["apply", "--exact"])
        .arg(&file)
        .arg(&patch)
        .output()
        .unwrap();
    assert!(!strict.status.success());

    let loose = zonediff().arg("apply").arg(&file).arg(&patch).output().unwrap();
    assert!(loose.status.success());
    assert_eq!(
        fs::read_to_string(&file).unwrap(),
        "def f():\n    return 2\n"
    );
}

#[test]
fn test_diff_json_output() {
    let dir = TempDir::new().unwrap();
    let original = dir.path().join("a.txt");
    let modified = dir.path().join("b.txt");
    fs::write(&original, "a\nb\nc").unwrap();
    fs::write(&modified, "a\nb\nb2\nc").unwrap();

    let output = zonediff()
        .arg("diff")
        .arg(&original)
        .arg(&modified)
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());
    let hunks: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(hunks.as_array().unwrap().len(), 1);
    assert_eq!(hunks[0]["kind"], "insertion");
    assert_eq!(hunks[0]["start_line"], 3);
    assert_eq!(hunks[0]["code"], "b2");
}

#[test]
fn test_config_prints_project_overrides() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("zonediff.toml"),
        "[patch]\nmax_retries = 9\n",
    )
    .unwrap();

    let output = zonediff()
        .arg("config")
        .arg("--root")
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let settings: toml::Table = toml::from_str(&String::from_utf8_lossy(&output.stdout)).unwrap();
    assert_eq!(settings["patch"]["max_retries"].as_integer(), Some(9));
    assert_eq!(settings["patch"]["min_search_chars"].as_integer(), Some(20));
    assert_eq!(settings["stream"]["strip_code_fences"].as_bool(), Some(true));
}
