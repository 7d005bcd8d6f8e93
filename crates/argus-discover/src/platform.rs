//! OS family detection and bounded child-process execution.
//!
//! Ping, neighbour-table and NetBIOS utilities take different arguments on
//! each OS family. The family is picked once at startup and handed to the
//! probes that need it.

use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    /// macOS and the BSDs share ping/arp syntax.
    Bsd,
    Windows,
}

impl Platform {
    /// The family of the running OS. Unrecognized Unixes use BSD syntax.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(any(target_os = "linux", target_os = "android")) {
            Platform::Linux
        } else {
            Platform::Bsd
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Platform::Windows)
    }
}

/// Run a command to completion, giving up after `limit`.
///
/// Returns `None` if the program cannot be spawned or does not finish in
/// time; the child is killed when abandoned.
pub async fn run_with_timeout(program: &str, args: &[String], limit: Duration) -> Option<Output> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    match tokio::time::timeout(limit, cmd.output()).await {
        Ok(Ok(output)) => Some(output),
        Ok(Err(e)) => {
            tracing::debug!(program, error = %e, "Failed to run command");
            None
        }
        Err(_) => {
            tracing::debug!(program, timeout_ms = limit.as_millis() as u64, "Command timed out");
            None
        }
    }
}

/// Share of `remaining` for the next of `steps_left` sequential attempts.
///
/// Splits one lookup budget evenly so a hung first attempt cannot use up the
/// time a later fallback needs. The last step gets everything left.
pub fn time_share(remaining: Duration, steps_left: usize) -> Duration {
    match steps_left {
        0 | 1 => remaining,
        n => remaining / n as u32,
    }
}

/// Like [`run_with_timeout`] but only returns stdout of successful runs.
pub async fn stdout_of(program: &str, args: &[String], limit: Duration) -> Option<String> {
    let output = run_with_timeout(program, args, limit).await?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_platform_matches_target() {
        let platform = Platform::current();
        if cfg!(target_os = "windows") {
            assert!(platform.is_windows());
        } else if cfg!(target_os = "linux") {
            assert_eq!(platform, Platform::Linux);
        } else {
            assert_eq!(platform, Platform::Bsd);
        }
    }

    #[test]
    fn time_share_splits_evenly_and_gives_last_step_the_rest() {
        let budget = Duration::from_secs(5);
        assert_eq!(time_share(budget, 2), Duration::from_millis(2500));
        assert_eq!(time_share(budget, 1), budget);
        assert_eq!(time_share(budget, 0), budget);
        assert_eq!(time_share(Duration::ZERO, 3), Duration::ZERO);
    }

    #[tokio::test]
    async fn missing_program_is_none() {
        let out = run_with_timeout(
            "argus-definitely-not-a-real-binary",
            &[],
            Duration::from_secs(1),
        )
        .await;
        assert!(out.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_program_times_out() {
        let out = run_with_timeout("sleep", &["5".to_string()], Duration::from_millis(100)).await;
        assert!(out.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdout_requires_success() {
        let ok = stdout_of("echo", &["hello".to_string()], Duration::from_secs(2)).await;
        assert_eq!(ok.as_deref().map(str::trim), Some("hello"));

        let failed = stdout_of("false", &[], Duration::from_secs(2)).await;
        assert!(failed.is_none());
    }
}
