#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

pub const SAMPLE_CATALOG: &str = r#"
[[datasets]]
name = "IBMUSER.CNTL"
organization = "PO"
members = ["COMPILE", "ALLOC"]

[[datasets]]
name = "IBMUSER.DATA"
organization = "PS"

[[datasets]]
name = "IBMUSER.PROCLIB"
organization = "PO"
members = ["ASMCL", "LINK"]

[[datasets]]
name = "SYS1.MACLIB"
organization = "PO"
members = ["IEZBITS"]
"#;

/// Temp directory holding a catalog and a config that points at it. The
/// debounce is long enough that no refresh fires during a test.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub catalog: PathBuf,
    pub config: PathBuf,
    pub log: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config_extra("")
    }

    /// `extra` is appended to the generated config file.
    pub fn with_config_extra(extra: &str) -> Self {
        let dir = tempfile::tempdir().expect("create fixture dir");
        let catalog = dir.path().join("catalog.toml");
        let config = dir.path().join("config.toml");
        let log = dir.path().join("activity.jsonl");
        fs::write(&catalog, SAMPLE_CATALOG).expect("write catalog");
        let body = format!(
            "[controller]\ndebounce_ms = 30000\n\n\
             [session]\nusername = \"ibmuser\"\n\n\
             [catalog]\nfile = {catalog:?}\n\n\
             [logging]\nenabled = true\njsonl_log = {log:?}\n{extra}",
            catalog = catalog.display().to_string(),
            log = log.display().to_string(),
        );
        fs::write(&config, body).expect("write config");
        Self {
            dir,
            catalog,
            config,
            log,
        }
    }

    pub fn config_arg(&self) -> &str {
        self.config.to_str().expect("utf-8 temp path")
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_dstree") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "dstree.exe" } else { "dstree" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve dstree binary path for integration test"),
    }
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    run_cli_case_with(case_name, args, &[], None)
}

/// Run the binary with extra env vars and optional stdin text.
pub fn run_cli_case_with(
    case_name: &str,
    args: &[&str],
    envs: &[(&str, &str)],
    stdin: Option<&str>,
) -> CmdResult {
    let root = std::env::temp_dir().join("dstree-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let mut command = Command::new(&bin_path);
    command
        .args(args)
        .env("RUST_BACKTRACE", "1")
        .env_remove("DSTREE_OUTPUT_FORMAT")
        .env_remove("DSTREE_USERNAME")
        .env_remove("DSTREE_DEFAULT_PATH")
        .env_remove("DSTREE_DEBOUNCE_MS")
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (name, value) in envs {
        command.env(name, value);
    }

    let mut child = command.spawn().expect("execute dstree command");
    if let Some(text) = stdin {
        let mut pipe = child.stdin.take().expect("stdin pipe");
        pipe.write_all(text.as_bytes()).expect("write stdin");
    }
    let output = child.wait_with_output().expect("wait for dstree");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}
