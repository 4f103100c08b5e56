use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn store_dir(&self) -> PathBuf {
        self.xdg_data.join("complaintbox/complaints")
    }

    fn write_config(&self, contents: &str) {
        let dir = self.xdg_config.join("complaintbox");
        fs::create_dir_all(&dir).expect("failed to create config dir");
        fs::write(dir.join("config.toml"), contents).expect("failed to write config");
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(assert_cmd::cargo::cargo_bin!("complaintbox"))
            .args(args)
            .env("HOME", &self.home)
            .env("XDG_DATA_HOME", &self.xdg_data)
            .env("XDG_CONFIG_HOME", &self.xdg_config)
            .env("XDG_STATE_HOME", &self.xdg_state)
            .env_remove("RUST_LOG")
            .output()
            .unwrap_or_else(|e| panic!("failed to execute complaintbox: {e}"))
    }

    fn run_ok(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert_success(args, &output);
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    fn run_json(&self, args: &[&str]) -> serde_json::Value {
        let mut with_json = vec!["--json"];
        with_json.extend_from_slice(args);
        let stdout = self.run_ok(&with_json);
        serde_json::from_str(&stdout)
            .unwrap_or_else(|e| panic!("invalid JSON from {with_json:?}: {e}\n{stdout}"))
    }

    fn file(&self, agent: &str, task: &str, severity: &str) -> String {
        let json = self.run_json(&["file", "--agent", agent, "--task", task, "--severity", severity]);
        json["id"].as_str().expect("file should print an id").to_string()
    }
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "complaintbox {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

#[test]
fn file_show_and_list_round_trip() {
    let env = CliTestEnv::new();

    let id = env.file("AI-Assistant", "Fix login bug", "high");
    assert!(env.store_dir().join(format!("{id}.json")).exists());

    let shown = env.run_ok(&["show", &id]);
    assert!(shown.contains("# Complaint: Fix login bug"), "got:\n{shown}");
    assert!(shown.contains("- **Severity:** high"));

    let listed = env.run_ok(&["list"]);
    assert!(listed.contains(&id[..8]));
    assert!(listed.contains("Fix login bug"));

    let json = env.run_json(&["list", "--limit", "5"]);
    let records = json.as_array().expect("list --json should print an array");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["agent_id"], "AI-Assistant");
    assert_eq!(records[0]["resolution_state"], "open");
}

#[test]
fn filters_search_and_resolve() {
    let env = CliTestEnv::new();

    let jwt = env.file("agent-1", "Set up JWT refresh", "critical");
    env.file("agent-2", "Write docs", "low");

    let hits = env.run_json(&["search", "jwt"]);
    assert_eq!(hits.as_array().unwrap().len(), 1);
    assert_eq!(hits[0]["id"], jwt.as_str());

    let critical = env.run_json(&["severity", "CRITICAL"]);
    assert_eq!(critical.as_array().unwrap().len(), 1);

    let by_agent = env.run_json(&["agent", "agent-2"]);
    assert_eq!(by_agent[0]["task_description"], "Write docs");

    let resolved = env.run_json(&["resolve", &jwt, "--by", "reviewer"]);
    assert_eq!(resolved["resolution_state"], "resolved");
    assert_eq!(resolved["resolved_by"], "reviewer");

    // Same resolver again is a no-op, a different one is refused
    env.run_ok(&["resolve", &jwt, "--by", "reviewer"]);
    let conflict = env.run(&["resolve", &jwt, "--by", "someone-else"]);
    assert!(!conflict.status.success());
    assert!(String::from_utf8_lossy(&conflict.stderr).contains("already resolved"));

    let open = env.run_json(&["unresolved"]);
    assert_eq!(open.as_array().unwrap().len(), 1);
    assert_eq!(open[0]["agent_id"], "agent-2");
}

#[test]
fn delete_and_stats() {
    let env = CliTestEnv::new();

    let first = env.file("agent-1", "First", "medium");
    env.file("agent-1", "Second", "high");
    env.run_ok(&["delete", &first]);

    let missing = env.run(&["show", &first]);
    assert!(!missing.status.success());
    assert!(String::from_utf8_lossy(&missing.stderr).contains("not found"));

    let stats = env.run_json(&["stats"]);
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["open"], 1);
    assert_eq!(stats["by_severity"]["high"], 1);
    assert_eq!(stats["by_severity"]["medium"], 0);
    assert_eq!(stats["cache"]["size"], 1);

    let text = env.run_ok(&["stats"]);
    assert!(text.contains("Total:           1"));
}

#[test]
fn rejects_invalid_input() {
    let env = CliTestEnv::new();

    let bad_severity = env.run(&["file", "--agent", "a", "--task", "t", "--severity", "urgent"]);
    assert!(!bad_severity.status.success());

    let bad_agent = env.run(&["file", "--agent", "a/b", "--task", "t"]);
    assert!(!bad_agent.status.success());

    let bad_id = env.run(&["show", "not-a-uuid"]);
    assert!(!bad_id.status.success());
    assert!(String::from_utf8_lossy(&bad_id.stderr).contains("not a complaint ID"));

    let bad_limit = env.run(&["list", "--limit", "0"]);
    assert!(!bad_limit.status.success());

    assert!(!env.store_dir().exists() || fs::read_dir(env.store_dir()).unwrap().count() == 0);
}

#[test]
fn config_controls_storage_and_mirrors() {
    let env = CliTestEnv::new();
    let base = env.home.join("complaints");
    let docs = env.home.join("docs");
    env.write_config(&format!(
        "[storage]\nbase_dir = {:?}\ndocs_dir = {:?}\n",
        base.to_string_lossy(),
        docs.to_string_lossy()
    ));

    let paths = env.run_json(&["paths"]);
    assert_eq!(paths["base_dir"], &*base.to_string_lossy());

    let id = env.file("agent", "Mirrored", "low");
    assert!(base.join(format!("{id}.json")).exists());
    let mirrored: Vec<_> = fs::read_dir(&docs).unwrap().collect();
    assert_eq!(mirrored.len(), 1);

    env.write_config("[cache]\nmax_size = 0\n");
    let invalid = env.run(&["list"]);
    assert!(!invalid.status.success());
    assert!(String::from_utf8_lossy(&invalid.stderr).contains("max_size"));
}
