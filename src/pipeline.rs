//! # Process Execution
//!
//! Thin wrappers over `tokio::process` used by every codec:
//! - `run_tool`: one process, stderr captured, configurable accepted exit codes
//! - `pipe`: two processes, producer stdout wired to consumer stdin through
//!   an OS pipe, each stderr captured separately
//!
//! No timeouts and no cancellation: a spawned tool always runs to exit.

use crate::error::CompressionError;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// One side of a two-process pipe
#[derive(Debug, Clone, Copy)]
pub struct Stage<'a> {
    /// Human readable name used in error messages, e.g. "decode stage (djpeg)"
    pub label: &'a str,
    pub program: &'a Path,
    pub args: &'a [String],
}

impl<'a> Stage<'a> {
    pub fn new(label: &'a str, program: &'a Path, args: &'a [String]) -> Self {
        Self { label, program, args }
    }
}

/// Run a single tool to completion.
///
/// Exit code 0 is always success; `extra_ok_codes` lists additional codes
/// treated as success. Any other exit reports the captured stderr.
pub async fn run_tool(
    program: &Path,
    args: &[String],
    extra_ok_codes: &[i32],
) -> Result<(), CompressionError> {
    let label = tool_label(program);
    debug!("Running {} {:?}", program.display(), args);

    let start_time = std::time::Instant::now();
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| launch_failure(&label, program, e))?;
    let elapsed = start_time.elapsed();

    match output.status.code() {
        Some(0) => {
            debug!("{} completed in {:?}", label, elapsed);
            Ok(())
        }
        Some(code) if extra_ok_codes.contains(&code) => {
            debug!("{} exited with accepted code {} in {:?}", label, code, elapsed);
            Ok(())
        }
        code => {
            warn!("{} failed with {:?} after {:?}", label, code, elapsed);
            Err(CompressionError::process_failed(&label, code, &output.stderr))
        }
    }
}

/// Run `producer | consumer`.
///
/// The producer starts first; if it cannot launch the consumer is never
/// started. If the consumer cannot launch the producer is killed before the
/// error is returned. Both processes are awaited; success needs both to exit
/// 0, and a producer failure is reported ahead of a consumer failure.
pub async fn pipe(producer: Stage<'_>, consumer: Stage<'_>) -> Result<(), CompressionError> {
    debug!(
        "Piping {} {:?} | {} {:?}",
        producer.program.display(),
        producer.args,
        consumer.program.display(),
        consumer.args
    );

    let mut producer_child = Command::new(producer.program)
        .args(producer.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| launch_failure(producer.label, producer.program, e))?;

    let producer_stdout = match producer_child.stdout.take() {
        Some(stdout) => stdout,
        None => {
            terminate(&mut producer_child, producer.label).await;
            return Err(CompressionError::ProcessFailed {
                message: format!("{}: stdout was not captured", producer.label),
                exit_code: None,
            });
        }
    };

    let consumer_stdin: Stdio = match producer_stdout.try_into() {
        Ok(stdio) => stdio,
        Err(e) => {
            terminate(&mut producer_child, producer.label).await;
            return Err(CompressionError::ProcessFailed {
                message: format!("{}: cannot hand stdout to {}: {}", producer.label, consumer.label, e),
                exit_code: None,
            });
        }
    };

    // The Command is dropped right after spawn so the parent keeps no copy
    // of the pipe's read end.
    let spawned = Command::new(consumer.program)
        .args(consumer.args)
        .stdin(consumer_stdin)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn();

    let consumer_child = match spawned {
        Ok(child) => child,
        Err(e) => {
            terminate(&mut producer_child, producer.label).await;
            return Err(launch_failure(consumer.label, consumer.program, e));
        }
    };

    let (producer_output, consumer_output) = tokio::join!(
        producer_child.wait_with_output(),
        consumer_child.wait_with_output()
    );
    let producer_output = producer_output?;
    let consumer_output = consumer_output?;

    if !producer_output.status.success() {
        warn!("{} exited with {:?}", producer.label, producer_output.status.code());
        return Err(CompressionError::process_failed(
            producer.label,
            producer_output.status.code(),
            &producer_output.stderr,
        ));
    }

    if !consumer_output.status.success() {
        warn!("{} exited with {:?}", consumer.label, consumer_output.status.code());
        return Err(CompressionError::process_failed(
            consumer.label,
            consumer_output.status.code(),
            &consumer_output.stderr,
        ));
    }

    Ok(())
}

async fn terminate(child: &mut tokio::process::Child, label: &str) {
    if let Err(e) = child.kill().await {
        warn!("Failed to terminate {}: {}", label, e);
    } else {
        debug!("Terminated {}", label);
    }
}

fn launch_failure(label: &str, program: &Path, e: std::io::Error) -> CompressionError {
    CompressionError::ProcessFailed {
        message: format!("{} failed to launch ({}): {}", label, program.display(), e),
        exit_code: None,
    }
}

fn tool_label(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::args;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn sh() -> PathBuf {
        PathBuf::from("/bin/sh")
    }

    fn script(body: &str) -> Vec<String> {
        args!["-c", body]
    }

    #[tokio::test]
    async fn test_run_tool_accepts_listed_exit_codes() {
        let args = script("exit 99");
        assert!(run_tool(&sh(), &args, &[99]).await.is_ok());

        match run_tool(&sh(), &args, &[]).await {
            Err(CompressionError::ProcessFailed { exit_code, .. }) => assert_eq!(exit_code, Some(99)),
            other => panic!("expected ProcessFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_tool_reports_stderr() {
        let args = script("echo 'cannot decode' >&2; exit 1");
        let err = run_tool(&sh(), &args, &[]).await.unwrap_err();
        assert!(err.to_string().contains("cannot decode"));
    }

    #[tokio::test]
    async fn test_pipe_wires_stdout_to_stdin() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out.txt");
        let producer_args = script("printf 'pixels'");
        let consumer_args = script(&format!("cat > '{}'", out.display()));
        let shell = sh();

        pipe(
            Stage::new("decode stage", &shell, &producer_args),
            Stage::new("encode stage", &shell, &consumer_args),
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read_to_string(&out).unwrap(), "pixels");
    }

    #[tokio::test]
    async fn test_producer_launch_failure_never_starts_consumer() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("consumer-ran");
        let missing = temp.path().join("no-such-djpeg");
        let producer_args = args!["in.jpg"];
        let consumer_args = script(&format!("touch '{}'", marker.display()));
        let shell = sh();

        let err = pipe(
            Stage::new("decode stage (djpeg)", &missing, &producer_args),
            Stage::new("encode stage (cjpeg)", &shell, &consumer_args),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("decode stage"));
        assert!(err.to_string().contains("failed to launch"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_consumer_launch_failure_terminates_producer() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("producer-survived");
        let missing = temp.path().join("no-such-cjpeg");
        let producer_args = script(&format!("sleep 1; touch '{}'", marker.display()));
        let consumer_args = args!["-quality", 75];
        let shell = sh();

        let started = Instant::now();
        let err = pipe(
            Stage::new("decode stage (djpeg)", &shell, &producer_args),
            Stage::new("encode stage (cjpeg)", &missing, &consumer_args),
        )
        .await
        .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(err.to_string().contains("encode stage"));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists(), "producer kept running after consumer launch failure");
    }

    #[tokio::test]
    async fn test_producer_error_takes_priority() {
        let producer_args = script("echo 'bad huffman table' >&2; exit 3");
        let consumer_args = script("cat > /dev/null; echo 'empty input' >&2; exit 4");
        let shell = sh();

        let err = pipe(
            Stage::new("decode stage", &shell, &producer_args),
            Stage::new("encode stage", &shell, &consumer_args),
        )
        .await
        .unwrap_err();

        match err {
            CompressionError::ProcessFailed { message, exit_code } => {
                assert_eq!(exit_code, Some(3));
                assert!(message.contains("decode stage"));
                assert!(message.contains("bad huffman table"));
            }
            other => panic!("expected ProcessFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_consumer_error_reported_when_producer_succeeds() {
        let producer_args = script("printf 'data'");
        let consumer_args = script("cat > /dev/null; echo 'write error' >&2; exit 5");
        let shell = sh();

        let err = pipe(
            Stage::new("decode stage", &shell, &producer_args),
            Stage::new("encode stage", &shell, &consumer_args),
        )
        .await
        .unwrap_err();

        match err {
            CompressionError::ProcessFailed { message, exit_code } => {
                assert_eq!(exit_code, Some(5));
                assert!(message.contains("write error"));
            }
            other => panic!("expected ProcessFailed, got {:?}", other),
        }
    }
}
