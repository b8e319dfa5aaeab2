use tokio::time::Instant;

/// Display countdown anchored at the last server value. Never authoritative.
#[derive(Debug, Clone, Copy)]
pub struct Countdown {
    remaining_at_sync: i64,
    synced_at: Instant,
}

impl Countdown {
    pub fn new(remaining_seconds: i64) -> Self {
        Self { remaining_at_sync: remaining_seconds.max(0), synced_at: Instant::now() }
    }

    pub fn sync(&mut self, remaining_seconds: i64) {
        self.remaining_at_sync = remaining_seconds.max(0);
        self.synced_at = Instant::now();
    }

    pub fn remaining(&self) -> i64 {
        self.remaining_at(Instant::now())
    }

    pub fn remaining_at(&self, now: Instant) -> i64 {
        let elapsed = now.saturating_duration_since(self.synced_at).as_secs();
        let elapsed = i64::try_from(elapsed).unwrap_or(i64::MAX);
        self.remaining_at_sync.saturating_sub(elapsed).max(0)
    }

    pub fn is_expired(&self) -> bool {
        self.remaining() == 0
    }
}

/// `m:ss` below an hour, `h:mm:ss` above.
pub fn format_clock(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn counts_down_from_last_sync_and_stops_at_zero() {
        let mut countdown = Countdown::new(5);
        tokio::time::advance(Duration::from_millis(2_500)).await;
        assert_eq!(countdown.remaining(), 3);

        countdown.sync(10);
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(countdown.remaining(), 6);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(countdown.remaining(), 0);
        assert!(countdown.is_expired());
    }

    #[test]
    fn negative_server_values_clamp() {
        assert_eq!(Countdown::new(-4).remaining_at(Instant::now()), 0);
    }

    #[test]
    fn clock_format() {
        assert_eq!(format_clock(0), "0:00");
        assert_eq!(format_clock(59), "0:59");
        assert_eq!(format_clock(600), "10:00");
        assert_eq!(format_clock(3_725), "1:02:05");
    }
}
