//! Bounded waiting for artifacts produced across an async boundary

use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};

/// Fixed-interval polling with an explicit deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(50),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Poll `check` until it reports ready or the policy's timeout elapses.
///
/// The check runs at least once, even with a zero timeout. Returns the number
/// of attempts on success, `None` on timeout.
pub async fn poll_until<F, Fut>(policy: WaitPolicy, mut check: F) -> Option<usize>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;
        if check().await {
            return Some(attempts);
        }
        if start.elapsed() >= policy.timeout {
            return None;
        }
        sleep(policy.interval).await;
    }
}

/// Wait until `path` exists on disk.
pub async fn wait_for_file(path: &Path, policy: WaitPolicy) -> HarnessResult<()> {
    let found = poll_until(policy, move || async move {
        tokio::fs::metadata(path).await.is_ok()
    })
    .await;

    match found {
        Some(attempts) => {
            debug!("Artifact {} ready after {} poll(s)", path.display(), attempts);
            Ok(())
        }
        None => Err(HarnessError::TimeoutWaitingForArtifact {
            path: path.to_path_buf(),
            timeout: policy.timeout,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> WaitPolicy {
        WaitPolicy {
            interval: Duration::from_millis(5),
            timeout: Duration::from_millis(60),
        }
    }

    #[tokio::test]
    async fn existing_file_resolves_on_first_poll() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mount.js");
        std::fs::write(&path, "export {}").unwrap();

        wait_for_file(&path, quick()).await.unwrap();
    }

    #[tokio::test]
    async fn file_written_later_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.js");

        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            sleep(Duration::from_millis(15)).await;
            tokio::fs::write(&writer_path, "late").await.unwrap();
        });

        let policy = WaitPolicy {
            interval: Duration::from_millis(5),
            timeout: Duration::from_secs(2),
        };
        wait_for_file(&path, policy).await.unwrap();
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn missing_file_times_out_with_typed_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.js");

        let err = wait_for_file(&path, quick()).await.unwrap_err();
        match err {
            HarnessError::TimeoutWaitingForArtifact { path: p, timeout } => {
                assert_eq!(p, path);
                assert_eq!(timeout, Duration::from_millis(60));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn zero_timeout_still_checks_once() {
        let policy = WaitPolicy {
            interval: Duration::from_millis(1),
            timeout: Duration::ZERO,
        };
        assert_eq!(poll_until(policy, || async { true }).await, Some(1));
        assert_eq!(poll_until(policy, || async { false }).await, None);
    }
}
