// Every blocking wait carries a deadline (spec §5). `DISCOVER` and `SYNC`
// use hard deadlines that fail the session; `DRAIN` uses a soft one that
// forces `STOP` with diagnostics instead.

use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    pub fn after(duration: Duration) -> Self {
        Deadline {
            expires_at: Instant::now() + duration,
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::after(Duration::from_millis(ms))
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn zero_duration_is_immediately_expired() {
        let d = Deadline::from_millis(0);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(d.is_expired());
    }

    #[test]
    fn future_deadline_is_not_expired() {
        let d = Deadline::after(Duration::from_secs(60));
        assert!(!d.is_expired());
    }
}
