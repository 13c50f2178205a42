use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn claudit(home: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("claudit");
    cmd.current_dir(home)
        .env("CLAUDIT_HOME", home)
        .env_remove("GEMINI_API_KEY")
        .env_remove("CLAUDIT_LOG");
    cmd
}

#[test]
fn projects_lists_estimates_and_writes_cache() {
    let tmp = tempdir().expect("tempdir");
    let projects = tmp.path().join("projects");
    let demo = projects.join("-tmp-expts-demo-app");
    let odd = projects.join("-tmp-expts--hidden");
    fs::create_dir_all(&demo).expect("mkdir demo");
    fs::create_dir_all(&odd).expect("mkdir odd");
    fs::write(demo.join("a.jsonl"), "x".repeat(4000)).expect("write log");
    let out_dir = tmp.path().join("reports");

    let output = claudit(tmp.path())
        .env("CLAUDE_PROJECTS_DIR", &projects)
        .arg("projects")
        .arg("--out-dir")
        .arg(&out_dir)
        .arg("--json")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).expect("json report");
    assert_eq!(report["command"], "projects");
    assert_eq!(report["ok"], true);
    let details: Vec<String> = report["details"]
        .as_array()
        .expect("details")
        .iter()
        .filter_map(|d| d.as_str().map(str::to_string))
        .collect();
    assert!(details.iter().any(|d| d == "count=2"));
    let demo_line = details
        .iter()
        .find(|d| d.contains("Demo App"))
        .expect("demo listed");
    assert!(demo_line.contains("tokens=1.0k tokens"));
    assert!(details.iter().any(|d| d.contains("ambiguous=true")));

    let cache = fs::read_to_string(out_dir.join("projects_cache.json")).expect("cache file");
    assert!(cache.contains("-tmp-expts-demo-app"));
    assert!(cache.contains("<!-- Cache updated: "));
}

#[test]
fn projects_reports_missing_directory() {
    let tmp = tempdir().expect("tempdir");
    claudit(tmp.path())
        .env("CLAUDE_PROJECTS_DIR", tmp.path().join("missing"))
        .arg("projects")
        .arg("--out-dir")
        .arg(tmp.path().join("reports"))
        .assert()
        .failure()
        .stdout(predicates::str::contains("projects dir not found"));
}

#[test]
fn status_flags_missing_backend() {
    let tmp = tempdir().expect("tempdir");
    fs::create_dir_all(tmp.path().join("projects")).expect("mkdir");
    claudit(tmp.path())
        .env("CLAUDE_PROJECTS_DIR", tmp.path().join("projects"))
        .env("CLAUDIT_TOOL_BIN", tmp.path().join("no-such-tool"))
        .env("CLAUDIT_CONFIG_PATH", tmp.path().join("none.toml"))
        .arg("status")
        .assert()
        .failure()
        .stdout(predicates::str::contains("api_key_present=false"))
        .stdout(predicates::str::contains("env_override=CLAUDIT_TOOL_BIN"))
        .stdout(predicates::str::contains("no analysis backend"));
}

#[test]
fn status_is_ok_with_api_key() {
    let tmp = tempdir().expect("tempdir");
    fs::create_dir_all(tmp.path().join("projects")).expect("mkdir");
    claudit(tmp.path())
        .env("CLAUDE_PROJECTS_DIR", tmp.path().join("projects"))
        .env("CLAUDIT_TOOL_BIN", tmp.path().join("no-such-tool"))
        .env("CLAUDIT_CONFIG_PATH", tmp.path().join("none.toml"))
        .env("GEMINI_API_KEY", "test-key")
        .arg("status")
        .assert()
        .success()
        .stdout(predicates::str::contains("status: ok"))
        .stdout(predicates::str::contains("api_key_present=true"));
}
