use crate::ai::AiClient;
use crate::store::UserStore;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const RATE_WINDOW: Duration = Duration::from_secs(60);
/// Table size past which expired windows are swept before counting.
const RATE_TABLE_SWEEP_AT: usize = 1024;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub ai_client: Arc<dyn AiClient>,
    rate_limits: Arc<DashMap<String, (u32, Instant)>>,
}

impl AppState {
    pub fn new(store: Arc<dyn UserStore>, ai_client: Arc<dyn AiClient>) -> Self {
        Self {
            store,
            ai_client,
            rate_limits: Arc::new(DashMap::new()),
        }
    }

    /// Fixed one-minute window per `scope:key`. Returns false once the window
    /// has seen `limit_per_minute` calls.
    pub fn check_rate_limit(&self, scope: &str, key: &str, limit_per_minute: u32) -> bool {
        let now = Instant::now();
        if self.rate_limits.len() >= RATE_TABLE_SWEEP_AT {
            self.rate_limits
                .retain(|_, (_, started)| now.duration_since(*started) <= RATE_WINDOW);
        }
        let full_key = format!("{scope}:{key}");
        let mut entry = self.rate_limits.entry(full_key).or_insert((0, now));
        if now.duration_since(entry.1) > RATE_WINDOW {
            *entry = (1, now);
            true
        } else if entry.0 >= limit_per_minute {
            false
        } else {
            entry.0 += 1;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockAiClient;
    use crate::store::InMemoryStore;

    #[test]
    fn rate_limit_per_scope_and_key() {
        let state = AppState::new(Arc::new(InMemoryStore::new(None)), Arc::new(MockAiClient));
        assert!(state.check_rate_limit("quiz", "10.0.0.1", 2));
        assert!(state.check_rate_limit("quiz", "10.0.0.1", 2));
        assert!(!state.check_rate_limit("quiz", "10.0.0.1", 2));
        assert!(state.check_rate_limit("quiz", "10.0.0.2", 2));
        assert!(state.check_rate_limit("chat", "10.0.0.1", 2));
    }

    #[test]
    fn expired_windows_are_swept_once_table_is_large() {
        let state = AppState::new(Arc::new(InMemoryStore::new(None)), Arc::new(MockAiClient));
        let stale = Instant::now()
            .checked_sub(RATE_WINDOW * 2)
            .unwrap_or_else(Instant::now);
        for i in 0..RATE_TABLE_SWEEP_AT {
            state.rate_limits.insert(format!("quiz:spoofed-{i}"), (1, stale));
        }
        state.rate_limits.insert("quiz:live".to_string(), (1, Instant::now()));

        assert!(state.check_rate_limit("quiz", "fresh", 2));
        assert_eq!(state.rate_limits.len(), 2);
        assert!(state.rate_limits.contains_key("quiz:live"));
        assert!(state.rate_limits.contains_key("quiz:fresh"));
    }

    #[test]
    fn small_table_keeps_entries() {
        let state = AppState::new(Arc::new(InMemoryStore::new(None)), Arc::new(MockAiClient));
        for i in 0..10 {
            assert!(state.check_rate_limit("chat", &format!("10.0.0.{i}"), 1));
        }
        assert_eq!(state.rate_limits.len(), 10);
    }
}
