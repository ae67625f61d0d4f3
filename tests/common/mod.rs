#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        Self::spawn_with_env(&[])
    }

    pub fn spawn_with_env(env: &[(&str, &str)]) -> Self {
        let exe = env!("CARGO_BIN_EXE_coursetrackd");
        let mut cmd = Command::new(exe);
        cmd.env_remove("COURSETRACK_WORKSPACE")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        for (k, v) in env {
            cmd.env(k, v);
        }
        let mut child = cmd.spawn().expect("spawn coursetrackd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    pub fn send_raw(&mut self, line: &str) -> Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    /// Full response envelope.
    pub fn call(&mut self, token: Option<&str>, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let mut payload = json!({ "id": id, "method": method, "params": params });
        if let Some(t) = token {
            payload["token"] = json!(t);
        }
        let resp = self.send_raw(&payload.to_string());
        assert_eq!(resp.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        resp
    }

    /// `result` of a call that must succeed.
    pub fn ok(&mut self, token: Option<&str>, method: &str, params: Value) -> Value {
        let resp = self.call(token, method, params);
        assert_eq!(resp["ok"], json!(true), "{} failed: {}", method, resp);
        resp["result"].clone()
    }

    /// `error.code` of a call that must fail.
    pub fn err_code(&mut self, token: Option<&str>, method: &str, params: Value) -> String {
        let resp = self.call(token, method, params);
        assert_eq!(resp["ok"], json!(false), "{} unexpectedly ok: {}", method, resp);
        resp["error"]["code"]
            .as_str()
            .expect("error code")
            .to_string()
    }

    pub fn select_workspace(&mut self, workspace: &std::path::Path) {
        self.ok(
            None,
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
    }

    /// Signs up `username` and returns a fresh session token.
    pub fn sign_in(&mut self, username: &str) -> String {
        let creds = json!({ "username": username, "password": "hunter2" });
        self.ok(None, "auth.signup", creds.clone());
        let login = self.ok(None, "auth.login", creds);
        login["token"].as_str().expect("token").to_string()
    }

    pub fn create_course(&mut self, token: &str, name: &str) -> String {
        let created = self.ok(Some(token), "courses.create", json!({ "name": name }));
        created["courseId"].as_str().expect("courseId").to_string()
    }

    pub fn create_assignment(&mut self, token: &str, params: Value) -> String {
        let created = self.ok(Some(token), "assignments.create", params);
        created["assignmentId"]
            .as_str()
            .expect("assignmentId")
            .to_string()
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn names(items: &Value) -> Vec<String> {
    items
        .as_array()
        .expect("array")
        .iter()
        .map(|v| v["name"].as_str().expect("name").to_string())
        .collect()
}
