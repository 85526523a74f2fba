use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::SubprocessSpec;
use crate::error::TransportError;
use crate::transport::{Invocation, TransportOutcome, STORAGE_ROOT_ENV};

/// Line prefix a child executor prints to report its response file.
pub const RESPONSE_PATH_PREFIX: &str = "response_file_path=";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs a stage by launching a separate OS process.
///
/// The process gets the request file path through its arguments (usually
/// `${SYS_CONTROLLER_REQ_FILE_PATH}`), must exit with status 0 and must print
/// a `response_file_path=<logical path>` line on stdout.
pub struct SubprocessTransport {
    spec: SubprocessSpec,
}

impl SubprocessTransport {
    pub fn new(spec: SubprocessSpec) -> Self {
        Self { spec }
    }

    pub fn invoke(&self, invocation: &Invocation<'_>) -> Result<TransportOutcome, TransportError> {
        let vars = invocation.variables();
        let program = vars.substitute(&self.spec.command);
        let args: Vec<String> = self.spec.args.iter().map(|a| vars.substitute(a)).collect();

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .env(STORAGE_ROOT_ENV, invocation.storage_root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &self.spec.env {
            cmd.env(key, vars.substitute(value));
        }
        if let Some(dir) = &self.spec.working_dir {
            cmd.current_dir(vars.substitute(dir));
        }

        debug!("Launching {} {:?}", program, args);
        let mut child = cmd
            .spawn()
            .map_err(|e| TransportError::Launch(format!("failed to spawn '{}': {}", program, e)))?;

        let stdout = capture(child.stdout.take());
        let stderr = capture(child.stderr.take());

        let status = wait_with_deadline(&mut child, self.spec.timeout())?;
        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if !status.success() {
            return Err(TransportError::ExitStatus {
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        if !stderr.trim().is_empty() {
            debug!("Executor stderr: {}", stderr.trim());
        }

        let response_file_path = parse_response_path(&stdout).ok_or_else(|| {
            TransportError::Launch(format!(
                "'{}' exited without printing {}<path>",
                program, RESPONSE_PATH_PREFIX
            ))
        })?;

        let response = invocation
            .store
            .read_response(&response_file_path)
            .map_err(|e| TransportError::Response(e.to_string()))?;

        Ok(TransportOutcome {
            response,
            response_file_path,
        })
    }
}

fn capture<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut output = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut output);
        }
        output
    })
}

fn wait_with_deadline(
    child: &mut Child,
    timeout: Option<Duration>,
) -> Result<ExitStatus, TransportError> {
    let Some(timeout) = timeout else {
        return child
            .wait()
            .map_err(|e| TransportError::Launch(format!("failed to wait for executor: {}", e)));
    };

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {}
            Err(e) => {
                return Err(TransportError::Launch(format!(
                    "failed to wait for executor: {}",
                    e
                )))
            }
        }
        if Instant::now() >= deadline {
            warn!("Executor exceeded {:?}, killing it", timeout);
            let _ = child.kill();
            let _ = child.wait();
            return Err(TransportError::Timeout(timeout));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Last `response_file_path=` line of the executor's stdout.
pub fn parse_response_path(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix(RESPONSE_PATH_PREFIX))
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .last()
        .map(str::to_string)
}
