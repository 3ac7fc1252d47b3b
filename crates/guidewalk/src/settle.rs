//! The one await-with-timeout primitive.
//!
//! Every wait in the engine is "poll a control until its options look right".
//! Screens, dependent selects and freshly loaded pages all go through here.

use crate::error::SurfaceResult;
use crate::surface::WizardSurface;
use crate::types::UiOption;
use std::time::Duration;
use tokio::time::Instant;

/// Polling cadence and deadline for a settle wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            interval: Duration::from_millis(300),
        }
    }
}

/// Wait until control `slot` offers options satisfying `ready`.
///
/// The control is read at least once. `Ok(None)` means the deadline passed;
/// surface errors abort the wait immediately.
pub async fn await_options<P>(
    surface: &mut dyn WizardSurface,
    slot: usize,
    policy: SettlePolicy,
    ready: P,
) -> SurfaceResult<Option<Vec<UiOption>>>
where
    P: Fn(&[UiOption]) -> bool,
{
    let deadline = Instant::now() + policy.timeout;
    loop {
        let options = surface.read_options(slot).await?;
        if ready(&options) {
            return Ok(Some(options));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(policy.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SurfaceError;
    use crate::types::Domain;
    use async_trait::async_trait;

    /// Control 0 becomes populated after `ready_after` reads.
    struct SlowSelect {
        reads: u32,
        ready_after: u32,
        broken: bool,
    }

    #[async_trait]
    impl WizardSurface for SlowSelect {
        async fn open_guide(&mut self, _domain: Domain) -> SurfaceResult<()> {
            Ok(())
        }

        async fn read_options(&mut self, _slot: usize) -> SurfaceResult<Vec<UiOption>> {
            if self.broken {
                return Err(SurfaceError::Disconnected("target closed".into()));
            }
            self.reads += 1;
            if self.reads >= self.ready_after {
                Ok(vec![UiOption::new("東日本")])
            } else {
                Ok(Vec::new())
            }
        }

        async fn select_option(&mut self, _slot: usize, _value: &str) -> SurfaceResult<bool> {
            Ok(true)
        }

        async fn trigger(&mut self, _label: &str) -> SurfaceResult<bool> {
            Ok(true)
        }

        async fn close_guide(&mut self) -> SurfaceResult<()> {
            Ok(())
        }

        async fn close(self: Box<Self>) {}
    }

    fn non_empty(options: &[UiOption]) -> bool {
        !options.is_empty()
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_once_ready() {
        let mut surface = SlowSelect { reads: 0, ready_after: 3, broken: false };
        let got = await_options(&mut surface, 0, SettlePolicy::default(), non_empty)
            .await
            .unwrap();
        assert_eq!(got.unwrap().len(), 1);
        assert_eq!(surface.reads, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let policy = SettlePolicy {
            timeout: Duration::from_secs(1),
            interval: Duration::from_millis(300),
        };
        let mut surface = SlowSelect { reads: 0, ready_after: u32::MAX, broken: false };
        let start = Instant::now();
        let got = await_options(&mut surface, 0, policy, non_empty).await.unwrap();
        assert!(got.is_none());
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_aborts_wait() {
        let mut surface = SlowSelect { reads: 0, ready_after: 1, broken: true };
        let err = await_options(&mut surface, 0, SettlePolicy::default(), non_empty)
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
