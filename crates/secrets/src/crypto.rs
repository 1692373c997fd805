//! Crypto - The encryption boundary
//!
//! The store only ever sees ciphertext. Encryption is delegated to a
//! [`CryptoOracle`] that binds each ciphertext to the secret's name; the
//! production oracle shells out to `systemd-creds`.

use std::io::Write;
use std::process::{Command, Output, Stdio};
use std::thread;

use crate::error::{Result, VaultError};

/// Name-bound encrypt/decrypt capability
pub trait CryptoOracle {
    /// Encrypt `plaintext` for `name`. The result may span multiple lines.
    fn encrypt(&self, name: &str, plaintext: &[u8]) -> Result<String>;

    /// Decrypt `ciphertext`; fails if it was not encrypted for `name`
    fn decrypt(&self, name: &str, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Oracle backed by the `systemd-creds` CLI
#[derive(Debug, Clone)]
pub struct SystemdCreds {
    /// The command to run
    program: String,
}

impl Default for SystemdCreds {
    fn default() -> Self {
        Self::new("systemd-creds")
    }
}

impl SystemdCreds {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run `<program> <verb> --name=<name> - -` with `input` on stdin
    fn run(&self, verb: &str, name: &str, input: &[u8]) -> Result<Vec<u8>> {
        tracing::debug!(program = %self.program, verb, name, "invoking crypto oracle");

        let failure = |reason: String, diagnostics: String| VaultError::CryptoFailure {
            name: name.to_string(),
            reason,
            diagnostics,
        };

        let mut child = Command::new(&self.program)
            .arg(verb)
            .arg(format!("--name={}", name))
            .args(["-", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| failure(format!("failed to run {}: {}", self.program, e), String::new()))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| failure("oracle stdin unavailable".to_string(), String::new()))?;

        // Feed stdin from a separate thread so a large payload cannot
        // deadlock against the child filling its stdout pipe.
        let output: std::io::Result<Output> = thread::scope(|scope| {
            scope.spawn(move || {
                // A child that exits early closes the pipe; its exit status reports why
                let _ = stdin.write_all(input);
            });
            child.wait_with_output()
        });
        let output = output?;

        if !output.status.success() {
            let diagnostics = join_diagnostics(&output.stdout, &output.stderr);
            return Err(failure(
                format!("{} {} exited with {}", self.program, verb, output.status),
                diagnostics,
            ));
        }

        Ok(output.stdout)
    }
}

/// Oracle stdout and stderr, each on its own lines
fn join_diagnostics(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);

    match (stdout.is_empty(), stderr.is_empty()) {
        (false, false) if stdout.ends_with('\n') => format!("{}{}", stdout, stderr),
        (false, false) => format!("{}\n{}", stdout, stderr),
        (false, true) => stdout.into_owned(),
        _ => stderr.into_owned(),
    }
}

impl CryptoOracle for SystemdCreds {
    fn encrypt(&self, name: &str, plaintext: &[u8]) -> Result<String> {
        let ciphertext = self.run("encrypt", name, plaintext)?;

        String::from_utf8(ciphertext).map_err(|_| VaultError::CryptoFailure {
            name: name.to_string(),
            reason: format!("{} encrypt produced non-UTF-8 output", self.program),
            diagnostics: String::new(),
        })
    }

    fn decrypt(&self, name: &str, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.run("decrypt", name, ciphertext)
    }
}
