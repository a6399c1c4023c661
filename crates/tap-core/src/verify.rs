//! Post-install verification.
//!
//! Each `test` step runs in a fresh scratch directory (`{testpath}`) that is
//! removed afterwards. `PATH` holds only system directories, so installed
//! executables must be named by absolute path, e.g. `{bin}/jackpot`.

use std::process::{Command, Stdio};

use tap_schema::PackageDescriptor;
use thiserror::Error;
use tracing::{debug, info};

use crate::builder::InstalledSet;
use crate::expand::Vars;
use crate::host::search_path;
use crate::Host;

/// Errors raised by the verification procedure.
#[derive(Error, Debug)]
pub enum VerificationError {
    /// The descriptor declares no test steps.
    #[error("No verification steps declared")]
    Empty,

    /// A step names an installed executable without an absolute path.
    #[error("Test step {step} runs '{command}' by name; use {{bin}}/{command} instead")]
    NotAbsolute {
        /// One-based index of the offending step.
        step: usize,
        /// The bare command.
        command: String,
    },

    /// The test directory could not be created.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The command could not be started.
    #[error("Failed to execute '{command}': {source}")]
    Spawn {
        /// Program that failed to start.
        command: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A step exited with a non-zero status.
    #[error("Test step {step} ('{command}') failed with exit code {code:?}")]
    Failed {
        /// One-based index of the failing step.
        step: usize,
        /// Expanded program of the failing step.
        command: String,
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// A step succeeded but its output lacked the expected text.
    #[error("Test step {step} ('{command}') output did not contain '{expected}'")]
    OutputMismatch {
        /// One-based index of the failing step.
        step: usize,
        /// Expanded program of the failing step.
        command: String,
        /// The text that was required.
        expected: String,
    },
}

/// Run the descriptor's verification procedure against `installed`.
///
/// # Errors
///
/// Returns the first failing step as [`VerificationError::Failed`] or
/// [`VerificationError::OutputMismatch`]; [`VerificationError::Empty`] when
/// there is nothing to run.
pub fn verify(
    host: &Host,
    descriptor: &PackageDescriptor,
    installed: &InstalledSet,
) -> Result<(), VerificationError> {
    let name = &descriptor.package.name;
    let version = &descriptor.package.version;

    if descriptor.test.is_empty() {
        host.reporter.failed(name, version, "no tests");
        return Err(VerificationError::Empty);
    }

    host.reporter.section("Testing");
    info!(package = %name, %version, steps = descriptor.test.len(), "running verification");

    let path_var = search_path(&[]);

    for (i, step) in descriptor.test.iter().enumerate() {
        let step_no = i + 1;
        let testpath = host.scratch_dir(&format!("tap-test-{name}-"))?;
        let vars = Vars::default()
            .set_path("prefix", installed.prefix())
            .set_path("bin", &installed.bin())
            .set("name", name)
            .set("version", version)
            .set_path("testpath", testpath.path());

        let command = vars.expand(&step.command);
        if !command.contains('/') && installed.provides(&command) {
            host.reporter.failed(name, version, "test relies on PATH");
            return Err(VerificationError::NotAbsolute {
                step: step_no,
                command,
            });
        }
        let args: Vec<String> = step.args.iter().map(|a| vars.expand(a)).collect();

        host.reporter.verifying(name, version, step_no, &command);
        debug!(step = step_no, %command, ?args, "test step");

        let output = Command::new(&command)
            .env_clear()
            .args(&args)
            .current_dir(testpath.path())
            .env("PATH", &path_var)
            .env("HOME", testpath.path())
            .env("TMPDIR", testpath.path())
            .env("TERM", "dumb")
            .env("LANG", "en_US.UTF-8")
            .stdin(Stdio::null())
            .output()
            .map_err(|source| VerificationError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            host.reporter.failed(name, version, "test failed");
            return Err(VerificationError::Failed {
                step: step_no,
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if let Some(expected) = &step.expect_output {
            let expected = vars.expand(expected);
            if !String::from_utf8_lossy(&output.stdout).contains(&expected) {
                host.reporter.failed(name, version, "unexpected output");
                return Err(VerificationError::OutputMismatch {
                    step: step_no,
                    command,
                    expected,
                });
            }
        }
    }

    host.reporter.done(name, version, "tests passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Layout;
    use std::path::Path;
    use tap_schema::VerifyStep;
    use tempfile::tempdir;

    /// A prefix holding one `hello` script that prints its arguments.
    fn installed(root: &Path) -> InstalledSet {
        use std::os::unix::fs::PermissionsExt;
        let bin = root.join("prefix/bin");
        std::fs::create_dir_all(&bin).unwrap();
        let script = bin.join("hello");
        std::fs::write(&script, "#!/bin/sh\necho \"hello $*\"\npwd > \"$HOME/../last-cwd\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        InstalledSet::discover(&root.join("prefix")).unwrap()
    }

    fn descriptor(steps: Vec<VerifyStep>) -> PackageDescriptor {
        let mut d = PackageDescriptor::parse(&format!(
            "[package]\nname = \"hello\"\nversion = \"1.0\"\n[source]\nurl = \"file:///dev/null\"\nsha256 = \"{}\"\n[[install]]\ncommand = \"true\"\n",
            "0".repeat(64)
        ))
        .unwrap();
        d.test = steps;
        d
    }

    fn step(command: &str, args: &[&str], expect: Option<&str>) -> VerifyStep {
        VerifyStep {
            command: command.to_string(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
            expect_output: expect.map(str::to_string),
        }
    }

    fn host(root: &Path) -> Host {
        Host::new(&Layout::new(root.join("home")), root.join("prefix"))
    }

    #[test]
    fn placeholder_false_always_fails() {
        let tmp = tempdir().unwrap();
        let set = installed(tmp.path());
        let host = host(tmp.path());
        let d = descriptor(vec![step("false", &[], None)]);

        for _ in 0..5 {
            let err = verify(&host, &d, &set).unwrap_err();
            assert!(matches!(err, VerificationError::Failed { step: 1, .. }));
        }
    }

    #[test]
    fn absolute_bin_reference_passes() {
        let tmp = tempdir().unwrap();
        let set = installed(tmp.path());
        let d = descriptor(vec![step("{bin}/hello", &["{name}"], Some("hello hello"))]);
        verify(&host(tmp.path()), &d, &set).unwrap();
    }

    #[test]
    fn bare_installed_name_is_rejected() {
        let tmp = tempdir().unwrap();
        let set = installed(tmp.path());
        let d = descriptor(vec![step("hello", &[], None)]);
        assert!(matches!(
            verify(&host(tmp.path()), &d, &set),
            Err(VerificationError::NotAbsolute { .. })
        ));
    }

    #[test]
    fn output_mismatch_is_reported() {
        let tmp = tempdir().unwrap();
        let set = installed(tmp.path());
        let d = descriptor(vec![step("{bin}/hello", &[], Some("goodbye"))]);
        assert!(matches!(
            verify(&host(tmp.path()), &d, &set),
            Err(VerificationError::OutputMismatch { .. })
        ));
    }

    #[test]
    fn no_steps_is_an_error() {
        let tmp = tempdir().unwrap();
        let set = installed(tmp.path());
        let d = descriptor(Vec::new());
        assert!(matches!(
            verify(&host(tmp.path()), &d, &set),
            Err(VerificationError::Empty)
        ));
    }

    #[test]
    fn test_directory_is_removed_afterwards() {
        let tmp = tempdir().unwrap();
        let set = installed(tmp.path());
        let host = host(tmp.path());
        let d = descriptor(vec![step("{bin}/hello", &[], None)]);
        verify(&host, &d, &set).unwrap();

        let cwd = std::fs::read_to_string(host.build_root.join("last-cwd")).unwrap();
        assert!(cwd.contains("tap-test-hello-"));
        assert!(!Path::new(cwd.trim()).exists());
    }
}
