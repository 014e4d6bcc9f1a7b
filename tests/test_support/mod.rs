#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub const ADMIN_EMAIL: &str = "admin@college.com";
pub const ADMIN_PASSWORD: &str = "admin123";

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

pub fn spawn_sidecar() -> Sidecar {
    spawn_sidecar_with_env(&[])
}

pub fn spawn_sidecar_with_env(env: &[(&str, &str)]) -> Sidecar {
    let exe = env!("CARGO_BIN_EXE_colleged");
    let mut cmd = Command::new(exe);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .env_remove("COLLEGED_WORKSPACE")
        .env_remove("COLLEGED_DEFAULT_FEE")
        .env_remove("COLLEGED_ID_PREFIX")
        .env_remove("COLLEGED_ADMIN_EMAIL")
        .env_remove("COLLEGED_ADMIN_PASSWORD")
        .env_remove("COLLEGED_PAGE_LIMIT_MAX");
    for (k, v) in env {
        cmd.env(k, v);
    }
    let mut child = cmd.spawn().expect("spawn colleged");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    Sidecar {
        child,
        stdin,
        reader: BufReader::new(stdout),
        next_id: 0,
    }
}

impl Sidecar {
    pub fn write_raw(&mut self, line: &str) -> Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        self.read_response()
    }

    fn read_response(&mut self) -> Value {
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response");
        serde_json::from_str(line.trim()).expect("parse response json")
    }

    /// Sends one request and returns the full envelope.
    pub fn request(&mut self, method: &str, params: Value, caller: Option<&Value>) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let mut payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        if let Some(c) = caller {
            payload["caller"] = c.clone();
        }
        let value = self.write_raw(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn ok(&mut self, method: &str, params: Value, caller: Option<&Value>) -> Value {
        let value = self.request(method, params, caller);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or(Value::Null)
    }

    /// Expects an error envelope and returns its code.
    pub fn err(&mut self, method: &str, params: Value, caller: Option<&Value>) -> String {
        let value = self.request(method, params, caller);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value
            .pointer("/error/code")
            .and_then(|v| v.as_str())
            .expect("error code")
            .to_string()
    }

    pub fn open(&mut self, workspace: &PathBuf) {
        self.ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
            None,
        );
    }

    pub fn login(&mut self, email: &str, password: &str) -> Value {
        let res = self.ok(
            "auth.login",
            json!({ "email": email, "password": password }),
            None,
        );
        res.get("caller").cloned().expect("caller")
    }

    pub fn login_admin(&mut self) -> Value {
        self.login(ADMIN_EMAIL, ADMIN_PASSWORD)
    }

    /// Registers a student and returns `(caller, studentId)`.
    pub fn register_student(&mut self, name: &str, email: &str, course: &str) -> (Value, String) {
        let reg = self.ok(
            "auth.register",
            json!({
                "name": name,
                "email": email,
                "password": "password1",
                "course": course
            }),
            None,
        );
        let code = reg["studentId"].as_str().expect("studentId").to_string();
        let caller = json!({ "id": reg["id"], "role": "student" });
        (caller, code)
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn decode_base64(v: &Value) -> Vec<u8> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(v.as_str().expect("contentBase64"))
        .expect("valid base64")
}
