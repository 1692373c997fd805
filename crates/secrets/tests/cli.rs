//! End-to-end tests for the `container-secrets` binary.
//!
//! Each test gets its own store root and a fake `systemd-creds` script, so
//! tests are independent and run real processes against a real lock file.

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// "encrypt" emits name-prefixed, line-wrapped base64; "decrypt" checks the name
const FAKE_CREDS: &str = r#"#!/bin/sh
verb="$1"
name="${2#--name=}"
case "$verb" in
  encrypt)
    printf '%s:' "$name"
    base64
    ;;
  decrypt)
    input=$(cat)
    case "$input" in
      "$name":*) printf '%s' "${input#*:}" | base64 -d ;;
      *) echo "name mismatch for $name" >&2; exit 1 ;;
    esac
    ;;
esac
"#;

struct Harness {
    tmp: TempDir,
    config: PathBuf,
}

impl Harness {
    fn new() -> Self {
        Self::with_oracle(FAKE_CREDS)
    }

    fn with_oracle(script: &str) -> Self {
        let tmp = TempDir::new().unwrap();
        let oracle = tmp.path().join("fake-systemd-creds");
        fs::write(&oracle, script).unwrap();
        fs::set_permissions(&oracle, fs::Permissions::from_mode(0o755)).unwrap();

        let config = tmp.path().join("config.json");
        let body = serde_json::json!({
            "store_root": tmp.path().join("store/encrypted"),
            "lock_timeout_secs": 30,
            "oracle_program": oracle,
        });
        fs::write(&config, body.to_string()).unwrap();

        Self { tmp, config }
    }

    fn root(&self) -> PathBuf {
        self.tmp.path().join("store/encrypted")
    }

    fn data_file(&self) -> PathBuf {
        self.root().join("secretsdata.json")
    }

    fn command(&self, args: &[&str], secret_id: Option<&str>) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_container-secrets"));
        cmd.args(args)
            .env("CONTAINER_SECRETS_CONFIG", &self.config)
            .env_remove("RUST_LOG")
            .env_remove("SECRET_ID")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(id) = secret_id {
            cmd.env("SECRET_ID", id);
        }
        cmd
    }

    fn run(&self, args: &[&str], secret_id: Option<&str>, stdin: &[u8]) -> Output {
        let mut child = self.command(args, secret_id).spawn().unwrap();
        // The child may exit before reading stdin (e.g. missing SECRET_ID)
        let _ = child.stdin.take().unwrap().write_all(stdin);
        child.wait_with_output().unwrap()
    }

    fn store(&self, id: &str, value: &[u8]) -> Output {
        self.run(&["store"], Some(id), value)
    }

    fn lookup(&self, id: &str) -> Output {
        self.run(&["lookup"], Some(id), b"")
    }
}

fn mode(path: &Path) -> u32 {
    fs::metadata(path).unwrap().permissions().mode() & 0o777
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_store_then_lookup_prints_exact_value() {
    let h = Harness::new();

    let out = h.store("db_password", b"s3cr3t");
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(
        String::from_utf8_lossy(&out.stdout),
        "Secret 'db_password' created successfully\n"
    );

    let out = h.lookup("db_password");
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(out.stdout, b"s3cr3t");
}

#[test]
fn test_binary_and_empty_round_trip() {
    let h = Harness::new();
    let binary: Vec<u8> = (0..=255u8).cycle().take(4096).collect();

    assert!(h.store("blob", &binary).status.success());
    assert!(h.store("empty", b"").status.success());

    assert_eq!(h.lookup("blob").stdout, binary);
    let out = h.lookup("empty");
    assert!(out.status.success());
    assert!(out.stdout.is_empty());
}

#[test]
fn test_store_overwrites_silently() {
    let h = Harness::new();

    assert!(h.store("token", b"old").status.success());
    let out = h.store("token", b"new");
    assert!(out.status.success());
    assert!(out.stderr.is_empty());

    assert_eq!(h.lookup("token").stdout, b"new");
}

#[test]
fn test_lookup_missing_fails_with_no_stdout() {
    let h = Harness::new();

    let out = h.lookup("never_stored");
    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty());
    assert!(stderr(&out).contains("error: Secret not found: never_stored"));
}

#[test]
fn test_delete_existing_and_missing() {
    let h = Harness::new();
    assert!(h.store("gone", b"x").status.success());

    let out = h.run(&["delete"], Some("gone"), b"");
    assert!(out.status.success());
    assert_eq!(
        String::from_utf8_lossy(&out.stdout),
        "Secret 'gone' deleted successfully\n"
    );

    let before = fs::read(h.data_file()).unwrap();
    let out = h.run(&["delete"], Some("gone"), b"");
    assert_eq!(out.status.code(), Some(0));
    assert!(out.stdout.is_empty());
    assert!(stderr(&out).contains("Secret 'gone' not found"));
    assert_eq!(fs::read(h.data_file()).unwrap(), before);
}

#[test]
fn test_list_prints_plaintexts_in_store_order() {
    let h = Harness::new();
    assert!(h.store("b_second", b"two").status.success());
    assert!(h.store("a_first", b"one").status.success());

    let out = h.run(&["list"], None, b"");
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "two\none\n");
}

#[test]
fn test_missing_secret_id() {
    let h = Harness::new();

    for command in ["store", "lookup", "delete"] {
        let out = h.run(&[command], None, b"value");
        assert_eq!(out.status.code(), Some(1), "{}", command);
        assert!(stderr(&out).contains("SECRET_ID environment variable is not set"));
    }

    let out = h.run(&["store"], Some(""), b"value");
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn test_non_utf8_secret_id_is_reported() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let h = Harness::new();
    let out = h
        .command(&["lookup"], None)
        .env("SECRET_ID", OsStr::from_bytes(b"db\xff"))
        .output()
        .unwrap();

    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty());
    assert!(stderr(&out).contains("SECRET_ID environment variable is not valid UTF-8"));
}

#[test]
fn test_unknown_and_missing_command() {
    let h = Harness::new();

    let out = h.run(&["frobnicate"], Some("x"), b"");
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("Unknown command frobnicate"));

    let out = h.run(&[], None, b"");
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("Usage"));
}

#[test]
fn test_bootstrap_permissions_and_no_reset() {
    let h = Harness::new();
    assert!(!h.root().exists());

    let out = h.run(&["list"], None, b"");
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(mode(&h.root()), 0o700);
    assert_eq!(mode(&h.data_file()), 0o600);
    assert_eq!(fs::read_to_string(h.data_file()).unwrap(), "{}");

    assert!(h.store("kept", b"value").status.success());
    assert!(h.run(&["list"], None, b"").status.success());
    assert_eq!(h.lookup("kept").stdout, b"value");
}

#[test]
fn test_store_root_argument_overrides_config() {
    let h = Harness::new();
    let other = h.tmp.path().join("other-root");
    let other_arg = other.to_str().unwrap();

    assert!(h.run(&["store", other_arg], Some("elsewhere"), b"v").status.success());
    assert!(other.join("secretsdata.json").exists());
    assert!(!h.data_file().exists());

    assert_eq!(h.run(&["lookup", other_arg], Some("elsewhere"), b"").stdout, b"v");
}

#[test]
fn test_corrupt_store_is_fatal() {
    let h = Harness::new();
    assert!(h.run(&["list"], None, b"").status.success());
    fs::write(h.data_file(), "[]").unwrap();

    let out = h.lookup("any");
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("Corrupt secrets store"));
}

#[test]
fn test_oracle_failure_surfaces_diagnostics() {
    let h = Harness::with_oracle("#!/bin/sh\necho 'TPM2 not available' >&2\nexit 1\n");

    let out = h.store("x", b"payload");
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("TPM2 not available"));
    assert!(err.contains("error: Failed to transform secret 'x'"));
    assert_eq!(fs::read_to_string(h.data_file()).unwrap(), "{}");
}

#[test]
fn test_concurrent_processes_keep_every_entry() {
    const WRITERS: usize = 12;
    let h = Harness::new();

    let children: Vec<_> = (0..WRITERS)
        .map(|i| {
            let mut child = h
                .command(&["store"], Some(&format!("secret_{}", i)))
                .spawn()
                .unwrap();
            child
                .stdin
                .take()
                .unwrap()
                .write_all(format!("value_{}", i).as_bytes())
                .unwrap();
            child
        })
        .collect();

    for child in children {
        let out = child.wait_with_output().unwrap();
        assert!(out.status.success(), "{}", stderr(&out));
    }

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(h.data_file()).unwrap()).unwrap();
    assert_eq!(raw.as_object().unwrap().len(), WRITERS);

    for i in 0..WRITERS {
        assert_eq!(
            h.lookup(&format!("secret_{}", i)).stdout,
            format!("value_{}", i).into_bytes()
        );
    }
}
