//! Build orchestration for the descriptor's install procedure.
//!
//! Every step runs with a cleared environment: host variables are dropped
//! and only the set below is injected, so a build sees the same inputs on
//! every machine.
//!
//! ## Environment contract
//!
//! | Variable | Value |
//! |---|---|
//! | `PATH` | Resolved build-dependency dirs, then `/usr/bin:/bin:/usr/sbin:/sbin` |
//! | `HOME` | `<build>/home` (prevents reading host dotfiles) |
//! | `TMPDIR` | `<build>/tmp` |
//! | `TERM` | `dumb` |
//! | `LANG` | `en_US.UTF-8` |
//! | `PREFIX` | Install prefix |
//! | `JOBS` | Logical CPU count |
//! | `SOURCE_DATE_EPOCH` | `0` |
//! | `GOPATH`, `GOCACHE`, `GOMODCACHE` | Directories under `<build>/go` |
//! | `http_proxy`, `https_proxy`, `no_proxy`, `SSL_CERT_FILE` | Passed through when set |

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::SystemTime;

use tap_schema::{InstallStep, PackageDescriptor};
use thiserror::Error;
use tracing::{debug, info};

use crate::Host;
use crate::expand::Vars;
use crate::host::search_path;
use crate::io::download::FetchedSource;
use crate::io::extract::{self, ExtractError};

/// Fixed epoch for `SOURCE_DATE_EPOCH`, so embedded timestamps do not depend
/// on when the build ran.
const SOURCE_DATE_EPOCH: &str = "0";

/// Host variables forwarded into the build when present.
const PASSTHROUGH_ENV: &[&str] = &[
    "http_proxy",
    "https_proxy",
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "no_proxy",
    "NO_PROXY",
    "SSL_CERT_FILE",
];

/// Lines of build log surfaced when a step fails.
const FAILURE_TAIL_LINES: usize = 20;

/// Errors raised by the install procedure.
#[derive(Error, Debug)]
pub enum BuildError {
    /// A declared build dependency could not be located.
    #[error("Build dependency not found: {0}")]
    MissingDependency(String),

    /// The verified artifact could not be unpacked.
    #[error("Failed to stage source: {0}")]
    Stage(#[from] ExtractError),

    /// Filesystem failure while preparing the build.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The toolchain could not be started.
    #[error("Failed to execute '{command}': {source}")]
    Spawn {
        /// Program that failed to start.
        command: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A step exited with a non-zero status.
    #[error("Install step {step} ('{command}') failed with exit code {code:?}{}", log_hint(.log.as_deref()))]
    Failed {
        /// One-based index of the failing step.
        step: usize,
        /// Program of the failing step.
        command: String,
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
        /// Build log for the run; `None` when output was streamed instead.
        log: Option<PathBuf>,
    },

    /// The procedure succeeded but left nothing executable in `<prefix>/bin`.
    #[error("No executables were installed into {}", .0.display())]
    NoExecutables(PathBuf),
}

fn log_hint(log: Option<&Path>) -> String {
    log.map(|p| format!("; log: {}", p.display())).unwrap_or_default()
}

/// The executables placed into the install prefix.
///
/// Produced by [`install`], or by [`InstalledSet::discover`] for a prefix an
/// earlier install populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledSet {
    prefix: PathBuf,
    executables: Vec<PathBuf>,
}

impl InstalledSet {
    /// Scan `<prefix>/bin` for executables.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::NoExecutables`] if none are found.
    pub fn discover(prefix: &Path) -> Result<Self, BuildError> {
        let bin = prefix.join("bin");
        let executables: Vec<PathBuf> = executables_in(&bin)
            .into_iter()
            .map(|(path, _)| path)
            .collect();

        if executables.is_empty() {
            return Err(BuildError::NoExecutables(bin));
        }
        Ok(Self {
            prefix: prefix.to_path_buf(),
            executables,
        })
    }

    /// Install prefix.
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// `<prefix>/bin`
    pub fn bin(&self) -> PathBuf {
        self.prefix.join("bin")
    }

    /// Absolute paths of the installed executables, sorted.
    pub fn executables(&self) -> &[PathBuf] {
        &self.executables
    }

    /// Whether `name` is the file name of one of the installed executables.
    pub fn provides(&self, name: &str) -> bool {
        self.executables
            .iter()
            .any(|p| p.file_name().is_some_and(|f| f == name))
    }
}

/// Executables directly inside `bin`, sorted, with their modification times.
fn executables_in(bin: &Path) -> Vec<(PathBuf, Option<SystemTime>)> {
    let mut found: Vec<(PathBuf, Option<SystemTime>)> = walkdir::WalkDir::new(bin)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| is_executable(e.path()))
        .map(|e| {
            let modified = std::fs::metadata(e.path()).and_then(|m| m.modified()).ok();
            (e.into_path(), modified)
        })
        .collect();
    found.sort();
    found
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Run the install procedure against a verified source artifact.
///
/// 1. Resolves each build dependency through the host's resolver.
/// 2. Stages the artifact into a fresh build directory.
/// 3. Runs each step with cwd = source tree (see module docs for the env).
/// 4. Collects the executables left in `<prefix>/bin`.
///
/// # Errors
///
/// Returns [`BuildError::MissingDependency`] before any step runs if a tool is
/// missing, [`BuildError::Failed`] on the first non-zero exit, and
/// [`BuildError::NoExecutables`] if nothing was installed.
pub fn install(
    host: &Host,
    descriptor: &PackageDescriptor,
    fetched: &FetchedSource,
) -> Result<InstalledSet, BuildError> {
    let name = &descriptor.package.name;
    let version = &descriptor.package.version;

    let mut toolchain: Vec<(String, PathBuf)> = Vec::new();
    for dep in &descriptor.dependencies.build {
        let path = host
            .resolver
            .resolve(dep)
            .ok_or_else(|| BuildError::MissingDependency(dep.clone()))?;
        debug!(tool = %dep, path = %path.display(), "resolved build dependency");
        toolchain.push((dep.clone(), path));
    }

    let build_dir = host.scratch_dir(&format!("tap-build-{name}-"))?;
    let build_path = build_dir.path().canonicalize()?;
    let source_root = extract::stage(fetched, &build_path.join("src"))?;

    let home = build_path.join("home");
    let tmp = build_path.join("tmp");
    let go_root = build_path.join("go");
    for dir in [&home, &tmp, &go_root] {
        std::fs::create_dir_all(dir)?;
    }

    let bin = host.bin_dir();
    std::fs::create_dir_all(&bin)?;
    let prefix = host.prefix.canonicalize()?;
    let bin = prefix.join("bin");

    std::fs::create_dir_all(&host.log_dir)?;
    let log_path = crate::paths::build_log_path(&host.log_dir, name, version);

    let tool_dirs: Vec<&Path> = toolchain.iter().filter_map(|(_, p)| p.parent()).collect();
    let path_var = search_path(&tool_dirs);

    let before: HashMap<PathBuf, Option<SystemTime>> =
        executables_in(&bin).into_iter().collect();

    let vars = Vars::default()
        .set_path("prefix", &prefix)
        .set_path("bin", &bin)
        .set("name", name)
        .set("version", version)
        .set_path("buildpath", &source_root);

    host.reporter.section("Installing");
    info!(package = %name, %version, steps = descriptor.install.len(), "running install procedure");

    for (i, step) in descriptor.install.iter().enumerate() {
        let step_no = i + 1;
        let program = resolve_program(&vars.expand(&step.command), &toolchain);
        let args = step_args(step, &vars, &bin, name);

        host.reporter.building(name, version, step_no, &step.command);
        debug!(step = step_no, program = %program.display(), ?args, "install step");

        let mut cmd = Command::new(&program);
        cmd.env_clear()
            .args(&args)
            .current_dir(&source_root)
            .env("PATH", &path_var)
            .env("HOME", &home)
            .env("TMPDIR", &tmp)
            .env("TERM", "dumb")
            .env("LANG", "en_US.UTF-8")
            .env("PREFIX", &prefix)
            .env("JOBS", num_cpus::get().to_string())
            .env("SOURCE_DATE_EPOCH", SOURCE_DATE_EPOCH)
            .env("GOPATH", &go_root)
            .env("GOCACHE", go_root.join("cache"))
            .env("GOMODCACHE", go_root.join("pkg/mod"));

        for key in PASSTHROUGH_ENV {
            if let Some(value) = std::env::var_os(key) {
                cmd.env(key, value);
            }
        }

        let status = if host.verbose {
            cmd.status()
        } else {
            let log_file = File::options()
                .create(true)
                .append(true)
                .open(&log_path)?;
            cmd.stdout(Stdio::from(log_file.try_clone()?))
                .stderr(Stdio::from(log_file))
                .status()
        }
        .map_err(|source| BuildError::Spawn {
            command: program.display().to_string(),
            source,
        })?;

        if !status.success() {
            if !host.verbose {
                if let Ok(tail) = read_last_lines(&log_path, FAILURE_TAIL_LINES) {
                    host.reporter
                        .error(&format!("Build failed. Last {FAILURE_TAIL_LINES} lines:\n{tail}"));
                }
            }
            host.reporter.failed(name, version, "build failed");
            return Err(BuildError::Failed {
                step: step_no,
                command: step.command.clone(),
                code: status.code(),
                log: (!host.verbose).then_some(log_path),
            });
        }
    }

    // Executables an earlier install left behind do not count unless this
    // run rewrote them.
    let produced = executables_in(&bin)
        .into_iter()
        .any(|(path, modified)| before.get(&path) != Some(&modified));
    if !produced {
        host.reporter.failed(name, version, "nothing installed");
        return Err(BuildError::NoExecutables(bin));
    }

    let installed = InstalledSet::discover(&prefix)?;
    host.reporter.done(
        name,
        version,
        &format!("{} executable(s) in {}", installed.executables().len(), bin.display()),
    );
    Ok(installed)
}

/// Use the resolved toolchain path when a step names a build dependency.
fn resolve_program(command: &str, toolchain: &[(String, PathBuf)]) -> PathBuf {
    toolchain
        .iter()
        .find(|(tool, _)| tool == command)
        .map_or_else(|| PathBuf::from(command), |(_, path)| path.clone())
}

/// Expanded arguments, followed by the standard Go flags when requested.
fn step_args(step: &InstallStep, vars: &Vars, bin: &Path, name: &str) -> Vec<String> {
    let mut args: Vec<String> = step.args.iter().map(|a| vars.expand(a)).collect();
    if let Some(go) = &step.std_go_args {
        let output = go.output.as_deref().unwrap_or(name);
        args.push("-trimpath".to_string());
        args.push(format!("-o={}", bin.join(vars.expand(output)).display()));
        if let Some(ldflags) = &go.ldflags {
            args.push(format!("-ldflags={}", vars.expand(ldflags)));
        }
    }
    args
}

/// Last `n` lines of a build log, decoded lossily.
///
/// Only the final 16 KiB is read.
fn read_last_lines(path: &Path, n: usize) -> std::io::Result<String> {
    const TAIL_SIZE: u64 = 16 * 1024;

    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();

    let seek_pos = file_len.saturating_sub(TAIL_SIZE);
    file.seek(SeekFrom::Start(seek_pos))?;

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    // A mid-file seek can land inside a line, or inside a multibyte
    // character; drop everything up to the first newline before decoding.
    let tail = if seek_pos > 0 {
        bytes
            .iter()
            .position(|&b| b == b'\n')
            .map_or(&bytes[..], |idx| &bytes[idx + 1..])
    } else {
        &bytes[..]
    };
    let content = String::from_utf8_lossy(tail);

    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::extract::tests::fetched;
    use crate::{Layout, StaticResolver};
    use std::sync::Arc;
    use tap_schema::StdGoArgs;
    use tempfile::tempdir;

    fn descriptor(build: &[&str], steps: &[(&str, &[&str])]) -> PackageDescriptor {
        let mut d = PackageDescriptor::parse(&format!(
            "[package]\nname = \"hello\"\nversion = \"1.0\"\n[source]\nurl = \"file:///dev/null\"\nsha256 = \"{}\"\n",
            "0".repeat(64)
        ))
        .unwrap();
        d.dependencies.build = build.iter().map(|s| (*s).to_string()).collect();
        d.install = steps
            .iter()
            .map(|(cmd, args)| InstallStep {
                command: (*cmd).to_string(),
                args: args.iter().map(|a| (*a).to_string()).collect(),
                std_go_args: None,
            })
            .collect();
        d
    }

    fn host(root: &Path) -> Host {
        let resolver = StaticResolver::new().with("sh", "/bin/sh");
        Host::new(&Layout::new(root.join("home")), root.join("prefix"))
            .with_resolver(Arc::new(resolver))
    }

    const WRITE_HELLO: &str = "printf '#!/bin/sh\\necho hello\\n' > {bin}/hello && chmod +x {bin}/hello";

    #[tokio::test]
    async fn install_runs_steps_and_collects_executables() {
        let tmp = tempdir().unwrap();
        let src = fetched(tmp.path(), "hello.txt", b"source").await;
        let host = host(tmp.path());
        let d = descriptor(&["sh"], &[("sh", &["-c", WRITE_HELLO])]);

        let installed = install(&host, &d, &src).unwrap();
        assert_eq!(installed.executables().len(), 1);
        assert!(installed.executables()[0].is_absolute());
        assert!(installed.provides("hello"));
    }

    #[tokio::test]
    async fn install_sees_the_staged_source_and_clean_env() {
        let tmp = tempdir().unwrap();
        let src = fetched(tmp.path(), "hello.txt", b"source").await;
        let host = host(tmp.path());
        let script = "test -f hello.txt && test -z \"$CARGO_HOME$USER\" && test -n \"$PREFIX\" \
                      && ln -s /bin/sh {bin}/sh-link";
        let d = descriptor(&["sh"], &[("sh", &["-c", script])]);

        let installed = install(&host, &d, &src).unwrap();
        assert!(installed.provides("sh-link"));
    }

    #[tokio::test]
    async fn missing_dependency_fails_before_any_step() {
        let tmp = tempdir().unwrap();
        let src = fetched(tmp.path(), "hello.txt", b"source").await;
        let host = host(tmp.path());
        let d = descriptor(&["go"], &[("sh", &["-c", WRITE_HELLO])]);

        let err = install(&host, &d, &src).unwrap_err();
        assert!(matches!(err, BuildError::MissingDependency(ref t) if t == "go"));
        assert!(!host.bin_dir().join("hello").exists());
    }

    #[tokio::test]
    async fn failing_step_stops_the_procedure() {
        let tmp = tempdir().unwrap();
        let src = fetched(tmp.path(), "hello.txt", b"source").await;
        let host = host(tmp.path());
        let d = descriptor(
            &["sh"],
            &[("sh", &["-c", "echo boom; exit 3"]), ("sh", &["-c", WRITE_HELLO])],
        );

        let err = install(&host, &d, &src).unwrap_err();
        match err {
            BuildError::Failed { step, code, log, .. } => {
                assert_eq!(step, 1);
                assert_eq!(code, Some(3));
                let log = log.expect("log is written when not verbose");
                assert!(std::fs::read_to_string(log).unwrap().contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!host.bin_dir().join("hello").exists());
    }

    #[tokio::test]
    async fn empty_bin_is_an_error() {
        let tmp = tempdir().unwrap();
        let src = fetched(tmp.path(), "hello.txt", b"source").await;
        let host = host(tmp.path());
        let d = descriptor(&["sh"], &[("sh", &["-c", "true"])]);

        assert!(matches!(
            install(&host, &d, &src),
            Err(BuildError::NoExecutables(_))
        ));
    }

    #[tokio::test]
    async fn leftover_executables_do_not_satisfy_install() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempdir().unwrap();
        let src = fetched(tmp.path(), "hello.txt", b"source").await;
        let host = host(tmp.path());
        std::fs::create_dir_all(host.bin_dir()).unwrap();
        let stale = host.bin_dir().join("old");
        std::fs::write(&stale, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&stale, std::fs::Permissions::from_mode(0o755)).unwrap();

        let d = descriptor(&["sh"], &[("sh", &["-c", "true"])]);
        assert!(matches!(
            install(&host, &d, &src),
            Err(BuildError::NoExecutables(_))
        ));
    }

    #[tokio::test]
    async fn reinstall_over_existing_prefix_succeeds() {
        let tmp = tempdir().unwrap();
        let src = fetched(tmp.path(), "hello.txt", b"source").await;
        let host = host(tmp.path());
        let d = descriptor(&["sh"], &[("sh", &["-c", WRITE_HELLO])]);

        install(&host, &d, &src).unwrap();
        let again = install(&host, &d, &src).unwrap();
        assert!(again.provides("hello"));
    }

    #[tokio::test]
    async fn verbose_failure_has_no_log() {
        let tmp = tempdir().unwrap();
        let src = fetched(tmp.path(), "hello.txt", b"source").await;
        let host = host(tmp.path()).with_verbose(true);
        let d = descriptor(&["sh"], &[("sh", &["-c", "exit 2"])]);

        let err = install(&host, &d, &src).unwrap_err();
        assert!(matches!(err, BuildError::Failed { log: None, .. }));
        assert!(!err.to_string().contains("log:"));
        assert_eq!(std::fs::read_dir(&host.log_dir).unwrap().count(), 0);
    }

    #[test]
    fn std_go_args_expand_after_user_args() {
        let step = InstallStep {
            command: "go".into(),
            args: vec!["build".into()],
            std_go_args: Some(StdGoArgs {
                output: None,
                ldflags: Some("-s -w".into()),
            }),
        };
        let args = step_args(&step, &Vars::default(), Path::new("/p/bin"), "jackpot");
        assert_eq!(
            args,
            vec!["build", "-trimpath", "-o=/p/bin/jackpot", "-ldflags=-s -w"]
        );
    }

    #[test]
    fn resolve_program_prefers_toolchain_path() {
        let toolchain = vec![("go".to_string(), PathBuf::from("/opt/go/bin/go"))];
        assert_eq!(resolve_program("go", &toolchain), PathBuf::from("/opt/go/bin/go"));
        assert_eq!(resolve_program("make", &toolchain), PathBuf::from("make"));
    }

    #[test]
    fn read_last_lines_returns_tail() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("log");
        let body: String = (1..=50).map(|i| format!("line {i}\n")).collect();
        std::fs::write(&path, body).unwrap();
        let tail = read_last_lines(&path, 3).unwrap();
        assert_eq!(tail, "line 48\nline 49\nline 50");
    }

    #[test]
    fn read_last_lines_survives_a_split_multibyte_character() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("log");
        // One leading byte shifts every two-byte 'é' so the 16 KiB cut point
        // falls in the middle of one.
        let mut body = String::from("x");
        for _ in 0..10_000 {
            body.push_str("éé\n");
        }
        body.push_str("error: ünresolved import\n");
        std::fs::write(&path, body).unwrap();

        let tail = read_last_lines(&path, 2).unwrap();
        assert_eq!(tail, "éé\nerror: ünresolved import");
    }

    #[test]
    fn read_last_lines_replaces_invalid_bytes() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("log");
        std::fs::write(&path, b"ok\n\xff\xfe broken\n").unwrap();
        let tail = read_last_lines(&path, 1).unwrap();
        assert!(tail.ends_with(" broken"));
    }
}
