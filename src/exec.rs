use std::borrow::Cow;
use std::collections::HashMap;
use std::env as stdenv;
use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How often the invoker re-checks a running child against its deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Exit code reported for a child that was killed on deadline expiry.
///
/// On Unix this is the conventional `128 + SIGKILL`; elsewhere the invoker
/// falls back to the generic failure code. [`RunStatus::TimedOut`] is the
/// portable signal, the code is secondary.
#[cfg(unix)]
pub const TIMEOUT_EXIT_CODE: i32 = 137;
#[cfg(not(unix))]
pub const TIMEOUT_EXIT_CODE: i32 = 1;

/// Exit code reported when waiting on the child failed invoker-side.
///
/// The child is killed when this happens, and the invocation is still
/// reported as [`RunStatus::Completed`] — the state machine has no separate
/// terminal state for it — so this sentinel is how callers tell a wait
/// failure apart from a real child exit.
pub const WAIT_FAILED_EXIT_CODE: i32 = -1;

/// Working-directory and environment context for one invocation.
///
/// The context fully defines the child's environment: variables not present
/// in `vars` are not inherited. [`RunContext::new`] captures the calling
/// process's variables and working directory as a starting point.
///
/// Note: fields are public for simplicity; the struct is a plain value with
/// no invariants to protect.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Key-value store of environment variables passed to the child.
    pub vars: HashMap<String, String>,
    /// The working directory the child is started in.
    pub current_dir: PathBuf,
}

impl RunContext {
    /// Capture the current process state into a new context.
    pub fn new() -> Self {
        let mut vars = HashMap::new();
        for (k, v) in stdenv::vars() {
            vars.insert(k, v);
        }
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self { vars, current_dir }
    }

    /// Get the value of an environment variable in this context.
    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Set or override an environment variable in this context.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Resolve `program` against this context's `PATH` variable.
    ///
    /// Convenience over [`find_program`] for callers that hold a bare program
    /// name rather than a concrete path.
    pub fn resolve<'a>(&self, program: &'a Path) -> Option<Cow<'a, Path>> {
        let search_paths = self.get_var("PATH")?;
        find_program(OsStr::new(search_paths), program)
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal state of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The child ran to completion on its own; the exit code is the child's,
    /// except for [`WAIT_FAILED_EXIT_CODE`], which marks an invoker-side
    /// failure while waiting on the child.
    Completed,
    /// The deadline expired and the child was killed. The exit code is
    /// [`TIMEOUT_EXIT_CODE`].
    TimedOut,
    /// The child could never be started (missing binary, permission denied).
    /// The exit code follows shell conventions: 127 for not found, 126 for
    /// permission denied on Unix, 1 elsewhere.
    LaunchFailed,
}

/// Captured result of one invocation.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub status: RunStatus,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.status == RunStatus::Completed && self.exit_code == 0
    }

    fn launch_failed(error: std::io::Error, started: Instant) -> Self {
        Self {
            status: RunStatus::LaunchFailed,
            exit_code: launch_failure_code(&error),
            stdout: String::new(),
            stderr: error.to_string(),
            duration: started.elapsed(),
        }
    }
}

/// Run `program` with exactly `args` as its argument vector, blocking until
/// it exits or `timeout` elapses.
///
/// The child receives no shell interpretation: each element of `args` arrives
/// as one argv entry. Its environment and working directory come from `ctx`.
/// Stdout and stderr are captured in full.
///
/// Failures are reported through the returned status and exit code rather
/// than as errors: a binary that cannot be launched yields
/// [`RunStatus::LaunchFailed`], and a child still running at the deadline is
/// killed together with any processes it spawned, reaped, and reported as
/// [`RunStatus::TimedOut`]. No retries are
/// performed; retry policy belongs to the caller.
pub fn run(program: &Path, args: &[String], ctx: &RunContext, timeout: Duration) -> RunOutput {
    let started = Instant::now();
    let deadline = started.checked_add(timeout);

    let mut cmd = Command::new(program);
    cmd.args(args)
        .env_clear()
        .envs(&ctx.vars)
        .current_dir(&ctx.current_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // Place the child in its own process group so a deadline kill also
    // reaches any further processes it spawned. Those inherit our pipe write
    // ends; leaving one alive would keep the reader threads blocked long
    // after the child itself is dead.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!(program = %program.display(), args = args.len(), "spawning child process");
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(program = %program.display(), error = %e, "failed to launch child process");
            return RunOutput::launch_failed(e, started);
        }
    };

    // Drain both pipes on background threads so a chatty child can never fill
    // a pipe buffer and stall behind our wait loop.
    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let mut timed_out = false;
    let mut wait_failed = false;
    let exit_status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    warn!(
                        program = %program.display(),
                        timeout_ms = timeout.as_millis() as u64,
                        "deadline expired, killing child process group"
                    );
                    timed_out = true;
                    kill_child_tree(&mut child);
                    break child.wait().ok();
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                warn!(program = %program.display(), error = %e, "wait on child process failed");
                wait_failed = true;
                kill_child_tree(&mut child);
                break child.wait().ok();
            }
        }
    };

    // The kill addressed the whole process group, so every inherited pipe
    // write end is gone and both readers finish.
    let stdout = join_reader(stdout_reader);
    let stderr = join_reader(stderr_reader);

    let (status, exit_code) = if timed_out {
        (RunStatus::TimedOut, TIMEOUT_EXIT_CODE)
    } else if wait_failed {
        (RunStatus::Completed, WAIT_FAILED_EXIT_CODE)
    } else {
        let code = match exit_status {
            Some(s) => s.code().unwrap_or_else(|| terminated_by_signal(s)),
            None => WAIT_FAILED_EXIT_CODE,
        };
        (RunStatus::Completed, code)
    };

    RunOutput {
        status,
        exit_code,
        stdout,
        stderr,
        duration: started.elapsed(),
    }
}

/// Kill the child and everything it spawned.
///
/// The child was started as the leader of its own process group, so the
/// negative pid addresses the whole group, including descendants still
/// holding inherited pipe ends. The direct `kill` afterwards covers the
/// moment before `exec` where the group might not exist yet.
#[cfg(unix)]
fn kill_child_tree(child: &mut Child) {
    let pid = child.id() as i32;
    unsafe {
        libc::kill(-pid, libc::SIGKILL);
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_child_tree(child: &mut Child) {
    let _ = child.kill();
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut r| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = r.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_reader(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

#[cfg(unix)]
fn launch_failure_code(error: &std::io::Error) -> i32 {
    use std::io::ErrorKind;
    match error.kind() {
        ErrorKind::NotFound => 127,
        ErrorKind::PermissionDenied => 126,
        _ => 1,
    }
}

#[cfg(not(unix))]
fn launch_failure_code(_error: &std::io::Error) -> i32 {
    1
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a program path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returned as-is if it exists.
/// - Relative path with multiple components (e.g. `bin/convert`): returned if
///   it exists relative to the current directory.
/// - `./foo` on Unix, or any path on platforms without Unix PATH semantics:
///   returned if it exists in the current directory.
/// - Single component (no separators): each directory in `search_paths` is
///   tried in order and the first existing match wins.
/// - Empty path: `None`.
///
/// Returns a borrowed path where possible and an owned one when the result
/// was discovered via the PATH search.
pub fn find_program<'a>(search_paths: &OsStr, program: &'a Path) -> Option<Cow<'a, Path>> {
    if program.is_absolute() {
        return existing(program).map(Cow::Borrowed);
    }

    let search_in_current_dir = cfg!(not(unix)) || program.starts_with("./");
    if search_in_current_dir && program.exists() {
        return Some(Cow::Borrowed(program));
    }

    let mut components = program.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        (None, None) => None,
        (Some(name), None) => find_in_search_paths(search_paths, name.as_os_str()).map(Cow::Owned),
        _ => existing(program).map(Cow::Borrowed),
    }
}

fn find_in_search_paths(search_paths: &OsStr, name: &OsStr) -> Option<PathBuf> {
    for dir in stdenv::split_paths(search_paths) {
        let candidate = dir.join(name);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

fn existing(path: &Path) -> Option<&Path> {
    if path.exists() { Some(path) } else { None }
}
