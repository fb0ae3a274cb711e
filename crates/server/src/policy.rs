use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};

const ESCALATION_LIMIT: usize = 3;
const ESCALATION_WINDOW_SECS: i64 = 10 * 60;

/// Sliding-window limiter for escalation requests (a user asking staff to
/// join their conversation). Tracked per user across rooms; timestamps
/// older than the window are pruned on every check.
#[derive(Clone, Default)]
pub struct EscalationRateLimiter {
    attempts: Arc<Mutex<HashMap<i64, Vec<i64>>>>,
}

impl EscalationRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an attempt if the user is under the limit, otherwise report
    /// how many seconds until their oldest attempt ages out.
    pub fn check(&self, user_id: i64) -> Result<(), i64> {
        self.check_at(user_id, unix_now())
    }

    fn check_at(&self, user_id: i64, now: i64) -> Result<(), i64> {
        let mut attempts = self.attempts.lock().expect("rate limiter lock poisoned");
        let window = attempts.entry(user_id).or_default();
        window.retain(|at| now - at < ESCALATION_WINDOW_SECS);

        if window.len() >= ESCALATION_LIMIT {
            let oldest = window.iter().copied().min().unwrap_or(now);
            return Err((oldest + ESCALATION_WINDOW_SECS - now).max(1));
        }

        window.push(now);
        Ok(())
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .unwrap_or(0)
}
