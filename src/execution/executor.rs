use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::types::ExecutionError;

/// Maximum size kept from the merged stdout/stderr stream
const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Linux `ETXTBSY`: the script is still open for writing somewhere
const TEXT_FILE_BUSY: i32 = 26;

/// Attempts made when the script is momentarily busy
const SPAWN_ATTEMPTS: u32 = 5;

/// Result of one completed run of the deployment script
#[derive(Debug, Clone)]
pub struct DeployOutcome {
    /// Exit status; `None` when the process was ended by a signal
    pub exit_code: Option<i32>,
    /// Standard output and standard error, interleaved line by line
    pub output: String,
    pub duration: Duration,
}

impl DeployOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Whether the runner had to repair the script's permission bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptCheck {
    Ready,
    MadeExecutable,
}

/// Runs the configured deployment script with a bounded run time
#[derive(Debug, Clone)]
pub struct DeploymentRunner {
    script: PathBuf,
    working_dir: PathBuf,
    timeout: Duration,
}

impl DeploymentRunner {
    pub fn new<P: AsRef<Path>, W: AsRef<Path>>(script: P, working_dir: W, timeout: Duration) -> Self {
        Self {
            script: script.as_ref().to_path_buf(),
            working_dir: working_dir.as_ref().to_path_buf(),
            timeout,
        }
    }

    fn script_display(&self) -> String {
        self.script.display().to_string()
    }

    /// Check that the script exists and set its executable bits if missing
    pub async fn prepare(&self) -> Result<ScriptCheck, ExecutionError> {
        let metadata = match tokio::fs::metadata(&self.script).await {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => {
                return Err(ExecutionError::ScriptNotFound {
                    path: self.script_display(),
                })
            }
        };

        let mode = metadata.permissions().mode();
        if mode & 0o111 != 0 {
            return Ok(ScriptCheck::Ready);
        }

        let fixed = std::fs::Permissions::from_mode(mode | 0o755);
        tokio::fs::set_permissions(&self.script, fixed)
            .await
            .map_err(|source| ExecutionError::PermissionFix {
                path: self.script_display(),
                source,
            })?;

        info!(
            script = %self.script.display(),
            previous_mode = format!("{:o}", mode & 0o7777),
            "Deployment script was not executable, permissions fixed"
        );

        Ok(ScriptCheck::MadeExecutable)
    }

    /// Run the script with no arguments and no stdin, capturing merged output
    ///
    /// On timeout the process is killed and whatever it printed so far is
    /// returned inside the error.
    pub async fn run(&self) -> Result<DeployOutcome, ExecutionError> {
        debug!(
            script = %self.script.display(),
            working_dir = %self.working_dir.display(),
            timeout_secs = self.timeout.as_secs(),
            "Executing deployment script"
        );

        let start_time = Instant::now();

        let mut cmd = Command::new(&self.script);
        cmd.current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let mut child = self.spawn(&mut cmd).await?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (Some(stdout), Some(stderr)) = (stdout, stderr) else {
            return Err(ExecutionError::StartFailed {
                path: self.script_display(),
                source: std::io::Error::other("child output pipes unavailable"),
            });
        };

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        // One byte over the output cap so an overlong line still marks the capture truncated
        let mut out_lines = CappedLines::new(stdout, MAX_OUTPUT_SIZE + 1);
        let mut err_lines = CappedLines::new(stderr, MAX_OUTPUT_SIZE + 1);
        let mut output = MergedOutput::default();
        let (mut out_done, mut err_done) = (false, false);

        while !(out_done && err_done) {
            tokio::select! {
                segment = out_lines.next_line(), if !out_done => match segment {
                    Ok(Some(line)) => output.push(&line),
                    Ok(None) => out_done = true,
                    Err(e) => {
                        warn!(error = %e, "Failed to read deployment stdout");
                        out_done = true;
                    }
                },
                segment = err_lines.next_line(), if !err_done => match segment {
                    Ok(Some(line)) => output.push(&line),
                    Ok(None) => err_done = true,
                    Err(e) => {
                        warn!(error = %e, "Failed to read deployment stderr");
                        err_done = true;
                    }
                },
                _ = &mut deadline => return Err(self.kill_on_timeout(&mut child, output).await),
            }
        }

        let status = tokio::select! {
            status = child.wait() => status.map_err(|source| ExecutionError::WaitFailed {
                path: self.script_display(),
                source,
            })?,
            _ = &mut deadline => return Err(self.kill_on_timeout(&mut child, output).await),
        };

        let duration = start_time.elapsed();
        let exit_code = status.code();

        debug!(
            script = %self.script.display(),
            exit_code = ?exit_code,
            duration_ms = duration.as_millis() as u64,
            output_len = output.len(),
            "Deployment script completed"
        );

        Ok(DeployOutcome {
            exit_code,
            output: output.into_string(),
            duration,
        })
    }

    async fn spawn(&self, cmd: &mut Command) -> Result<Child, ExecutionError> {
        let mut attempt = 1;
        loop {
            match cmd.spawn() {
                Ok(child) => return Ok(child),
                Err(e) if e.raw_os_error() == Some(TEXT_FILE_BUSY) && attempt < SPAWN_ATTEMPTS => {
                    debug!(attempt, "Deployment script busy, retrying spawn");
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(20 * attempt as u64)).await;
                }
                Err(source) => {
                    return Err(ExecutionError::StartFailed {
                        path: self.script_display(),
                        source,
                    })
                }
            }
        }
    }

    async fn kill_on_timeout(&self, child: &mut Child, output: MergedOutput) -> ExecutionError {
        warn!(
            script = %self.script.display(),
            timeout_secs = self.timeout.as_secs(),
            "Deployment script timed out, killing it"
        );
        // The script leads its own process group; anything it started goes too
        if let Some(pid) = child.id() {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                warn!(error = %e, pid, "Failed to signal deployment process group");
            }
        }
        if let Err(e) = child.kill().await {
            warn!(error = %e, "Failed to kill timed out deployment script");
        }
        ExecutionError::Timeout {
            path: self.script_display(),
            timeout: self.timeout,
            output: output.into_string(),
        }
    }
}

/// Newline-delimited reader that keeps at most `max_len` bytes of each line
///
/// Partial lines stay buffered in `self`, so `next_line` can be raced in
/// `select!` without losing data.
struct CappedLines<R> {
    reader: BufReader<R>,
    line: Vec<u8>,
    max_len: usize,
}

impl<R: AsyncRead + Unpin> CappedLines<R> {
    fn new(inner: R, max_len: usize) -> Self {
        Self {
            reader: BufReader::new(inner),
            line: Vec::new(),
            max_len,
        }
    }

    async fn next_line(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if self.line.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.line)));
            }

            let newline = available.iter().position(|&b| b == b'\n');
            let chunk = &available[..newline.unwrap_or(available.len())];
            let room = self.max_len.saturating_sub(self.line.len());
            self.line.extend_from_slice(&chunk[..chunk.len().min(room)]);

            let consumed = newline.map_or(available.len(), |i| i + 1);
            self.reader.consume(consumed);
            if newline.is_some() {
                return Ok(Some(std::mem::take(&mut self.line)));
            }
        }
    }
}

/// Line-ordered capture of both output streams with a size cap
#[derive(Default)]
struct MergedOutput {
    lines: Vec<String>,
    bytes: usize,
    truncated: bool,
}

impl MergedOutput {
    fn push(&mut self, line: &[u8]) {
        if self.truncated {
            return;
        }
        if self.bytes + line.len() > MAX_OUTPUT_SIZE {
            self.truncated = true;
            return;
        }
        self.bytes += line.len() + 1;
        let line = String::from_utf8_lossy(line);
        self.lines.push(line.trim_end_matches('\r').to_string());
    }

    fn len(&self) -> usize {
        self.bytes
    }

    fn into_string(self) -> String {
        let mut text = self.lines.join("\n");
        if self.truncated {
            text.push_str(&format!("\n... [truncated at {} bytes]", MAX_OUTPUT_SIZE));
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn write_script(dir: &TempDir, name: &str, body: &str, mode: u32) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    fn runner(dir: &TempDir, script: &Path, timeout: Duration) -> DeploymentRunner {
        DeploymentRunner::new(script, dir.path(), timeout)
    }

    #[tokio::test]
    async fn test_successful_script() {
        let dir = tempdir().unwrap();
        let script = write_script(&dir, "deploy.sh", "echo OK", 0o755);
        let runner = runner(&dir, &script, Duration::from_secs(10));

        assert_eq!(runner.prepare().await.unwrap(), ScriptCheck::Ready);
        let outcome = runner.run().await.unwrap();

        assert!(outcome.succeeded());
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.output, "OK");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_an_outcome_not_an_error() {
        let dir = tempdir().unwrap();
        let script = write_script(&dir, "deploy.sh", "echo 'pulling'\necho 'merge conflict' >&2\nexit 3", 0o755);
        let outcome = runner(&dir, &script, Duration::from_secs(10)).run().await.unwrap();

        assert!(!outcome.succeeded());
        assert_eq!(outcome.exit_code, Some(3));
        assert!(outcome.output.contains("pulling"));
        assert!(outcome.output.contains("merge conflict"));
    }

    #[tokio::test]
    async fn test_stderr_is_merged_into_output() {
        let dir = tempdir().unwrap();
        let script = write_script(&dir, "deploy.sh", "echo only-on-stderr >&2", 0o755);
        let outcome = runner(&dir, &script, Duration::from_secs(10)).run().await.unwrap();
        assert_eq!(outcome.output, "only-on-stderr");
    }

    #[tokio::test]
    async fn test_missing_script() {
        let dir = tempdir().unwrap();
        let runner = runner(&dir, &dir.path().join("missing.sh"), Duration::from_secs(10));

        assert!(matches!(
            runner.prepare().await,
            Err(ExecutionError::ScriptNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_directory_is_not_a_script() {
        let dir = tempdir().unwrap();
        let runner = runner(&dir, dir.path(), Duration::from_secs(10));

        assert!(matches!(
            runner.prepare().await,
            Err(ExecutionError::ScriptNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_non_executable_script_is_fixed() {
        let dir = tempdir().unwrap();
        let script = write_script(&dir, "deploy.sh", "echo fixed", 0o644);
        let runner = runner(&dir, &script, Duration::from_secs(10));

        assert_eq!(runner.prepare().await.unwrap(), ScriptCheck::MadeExecutable);
        let mode = std::fs::metadata(&script).unwrap().permissions().mode();
        assert_eq!(mode & 0o755, 0o755);

        let outcome = runner.run().await.unwrap();
        assert!(outcome.succeeded());
        assert_eq!(outcome.output, "fixed");
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let dir = tempdir().unwrap();
        let script = write_script(&dir, "deploy.sh", "pwd", 0o755);
        let outcome = runner(&dir, &script, Duration::from_secs(10)).run().await.unwrap();

        let expected = dir.path().canonicalize().unwrap();
        let actual = Path::new(outcome.output.trim()).canonicalize().unwrap();
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn test_no_stdin() {
        let dir = tempdir().unwrap();
        let script = write_script(&dir, "deploy.sh", "cat; echo done", 0o755);
        let outcome = runner(&dir, &script, Duration::from_secs(10)).run().await.unwrap();
        assert_eq!(outcome.output, "done");
    }

    #[tokio::test]
    async fn test_timeout_kills_script() {
        let dir = tempdir().unwrap();
        let script = write_script(&dir, "deploy.sh", "echo started\nsleep 5\necho never", 0o755);
        let runner = runner(&dir, &script, Duration::from_millis(300));

        let started = Instant::now();
        let result = runner.run().await;
        assert!(started.elapsed() < Duration::from_secs(4));

        match result {
            Err(ExecutionError::Timeout { output, timeout, .. }) => {
                assert_eq!(timeout, Duration::from_millis(300));
                assert!(output.contains("started"));
                assert!(!output.contains("never"));
            }
            other => panic!("Expected Timeout error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_background_children() {
        let dir = tempdir().unwrap();
        let script = write_script(
            &dir,
            "deploy.sh",
            "(sleep 1; echo survived >> survived) &\nsleep 5",
            0o755,
        );
        let result = runner(&dir, &script, Duration::from_millis(300)).run().await;
        assert!(matches!(result, Err(ExecutionError::Timeout { .. })));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!dir.path().join("survived").exists());
    }

    #[tokio::test]
    async fn test_single_huge_line_is_capped() {
        let dir = tempdir().unwrap();
        let script = write_script(
            &dir,
            "deploy.sh",
            "head -c 3000000 /dev/zero | tr '\\0' x\necho\necho after",
            0o755,
        );
        let outcome = runner(&dir, &script, Duration::from_secs(10)).run().await.unwrap();

        assert!(outcome.succeeded());
        assert!(outcome.output.len() <= MAX_OUTPUT_SIZE + 64);
        assert!(outcome.output.ends_with(&format!("[truncated at {} bytes]", MAX_OUTPUT_SIZE)));
        assert!(!outcome.output.contains("after"));
    }

    #[tokio::test]
    async fn test_capped_lines_reader() {
        let input: &[u8] = b"abcdefgh\n\nxy\ntail";
        let mut lines = CappedLines::new(input, 4);

        assert_eq!(lines.next_line().await.unwrap(), Some(b"abcd".to_vec()));
        assert_eq!(lines.next_line().await.unwrap(), Some(Vec::new()));
        assert_eq!(lines.next_line().await.unwrap(), Some(b"xy".to_vec()));
        assert_eq!(lines.next_line().await.unwrap(), Some(b"tail".to_vec()));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_start_failure() {
        let dir = tempdir().unwrap();
        // Executable bit set but no valid interpreter line or binary format
        let path = dir.path().join("broken.sh");
        std::fs::write(&path, "#!/nonexistent/interpreter\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let result = runner(&dir, &path, Duration::from_secs(10)).run().await;
        assert!(matches!(result, Err(ExecutionError::StartFailed { .. })));
    }

    #[test]
    fn test_merged_output_truncation() {
        let mut output = MergedOutput::default();
        let chunk = vec![b'x'; 1024];
        for _ in 0..(MAX_OUTPUT_SIZE / 1024 + 10) {
            output.push(&chunk);
        }
        let text = output.into_string();
        assert!(text.ends_with(&format!("[truncated at {} bytes]", MAX_OUTPUT_SIZE)));
        assert!(text.len() <= MAX_OUTPUT_SIZE + 64);
    }

    #[test]
    fn test_merged_output_handles_invalid_utf8_and_crlf() {
        let mut output = MergedOutput::default();
        output.push(b"windows line\r");
        output.push(&[0x66, 0x6f, 0xff, 0x6f]);
        let text = output.into_string();
        assert!(text.starts_with("windows line\n"));
        assert!(text.contains('\u{FFFD}'));
    }
}
