use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::time::{interval_at, Instant};

/// Cadence of the remaining-time reports.
const REPORT_PERIOD: Duration = Duration::from_secs(30);

/// Sleeps until `target`, printing the remaining time every thirty seconds.
///
/// A target at or before now returns immediately: a machine that woke up
/// late should start the stream, not wait for tomorrow.
pub async fn wait_until(target: DateTime<Local>) {
    let Some(total) = remaining(target, Local::now()) else {
        tracing::info!(%target, "target time already passed, continuing immediately");
        return;
    };

    println!("Waiting until {} ({})...", target.format("%H:%M:%S"), human(total));

    let sleep = tokio::time::sleep(total);
    tokio::pin!(sleep);
    // first report comes after a full period, not right away
    let mut reports = interval_at(Instant::now() + REPORT_PERIOD, REPORT_PERIOD);

    loop {
        tokio::select! {
            () = &mut sleep => break,
            _ = reports.tick() => {
                if let Some(left) = remaining(target, Local::now()) {
                    println!("Time remaining: {}", human(left));
                }
            }
        }
    }
}

/// Time still to wait, or `None` when the target is not in the future.
fn remaining(target: DateTime<Local>, now: DateTime<Local>) -> Option<Duration> {
    target
        .signed_duration_since(now)
        .to_std()
        .ok()
        .filter(|left| !left.is_zero())
}

/// Rounds to whole seconds so reports read like `29m 30s`, not nanoseconds.
fn human(duration: Duration) -> String {
    humantime::format_duration(Duration::from_secs(duration.as_secs())).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn past_and_present_targets_have_nothing_remaining() {
        let now = Local::now();

        assert_eq!(remaining(now - chrono::Duration::seconds(5), now), None);
        assert_eq!(remaining(now, now), None);
    }

    #[test]
    fn future_targets_report_the_full_wait() {
        let now = Local::now();

        let left = remaining(now + chrono::Duration::seconds(90), now).unwrap();

        assert_eq!(left, Duration::from_secs(90));
    }

    #[test]
    fn reports_read_in_round_seconds() {
        assert_eq!(human(Duration::from_millis(90_499)), "1m 30s");
        assert_eq!(human(Duration::from_secs(3600)), "1h");
        assert_eq!(human(Duration::from_secs(0)), "0s");
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_for_a_future_target_completes() {
        wait_until(Local::now() + chrono::Duration::minutes(2)).await;
    }

    #[tokio::test]
    async fn waiting_for_a_past_target_returns_immediately() {
        wait_until(Local::now() - chrono::Duration::minutes(2)).await;
    }
}
