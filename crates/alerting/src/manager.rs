//! Alert Manager Implementation

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use focus_engine::DistractionCause;

use crate::sink::{AlertSink, Notification};

const HOUR: Duration = Duration::from_secs(3600);

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Cooldown between alerts of the same cause (seconds)
    pub cooldown_seconds: u64,
    /// Maximum alerts per hour before throttling
    pub max_alerts_per_hour: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 30,
            max_alerts_per_hour: 60,
        }
    }
}

/// Delivery history of one cause
#[derive(Debug, Clone)]
struct AlertState {
    last_fired: Instant,
    fire_count: usize,
}

/// Deduplicates and throttles distraction alerts
pub struct AlertManager {
    config: AlertConfig,
    states: HashMap<DistractionCause, AlertState>,
    hourly_count: usize,
    hour_start: Option<Instant>,
}

impl AlertManager {
    pub fn new(config: AlertConfig) -> Self {
        info!("Creating alert manager with config: {:?}", config);
        Self {
            config,
            states: HashMap::new(),
            hourly_count: 0,
            hour_start: None,
        }
    }

    /// Check whether an alert for `cause` may fire at `now`
    pub fn should_fire(&mut self, cause: DistractionCause, now: Instant) -> bool {
        self.roll_hour(now);

        if self.hourly_count >= self.config.max_alerts_per_hour {
            warn!("Alert throttled: max alerts per hour reached");
            return false;
        }

        if let Some(state) = self.states.get(&cause) {
            let cooldown = Duration::from_secs(self.config.cooldown_seconds);
            if now.saturating_duration_since(state.last_fired) < cooldown {
                debug!("Alert {} suppressed: in cooldown period", cause);
                return false;
            }
        }

        true
    }

    /// Record that an alert was fired
    pub fn record_fire(&mut self, cause: DistractionCause, now: Instant) {
        self.roll_hour(now);
        self.hourly_count += 1;

        let state = self.states.entry(cause).or_insert(AlertState {
            last_fired: now,
            fire_count: 0,
        });
        state.last_fired = now;
        state.fire_count += 1;

        info!("Alert recorded: {} (count: {})", cause, state.fire_count);
    }

    /// Fire through `sink` if allowed; returns whether it was delivered
    pub fn dispatch(
        &mut self,
        cause: DistractionCause,
        now: Instant,
        sink: &dyn AlertSink,
    ) -> bool {
        if !self.should_fire(cause, now) {
            return false;
        }
        self.record_fire(cause, now);
        sink.notify(&Notification::from(cause));
        true
    }

    fn roll_hour(&mut self, now: Instant) {
        let start = *self.hour_start.get_or_insert(now);
        if now.saturating_duration_since(start) > HOUR {
            self.hourly_count = 0;
            self.hour_start = Some(now);
        }
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    #[test]
    fn test_first_alert_fires() {
        let mut manager = AlertManager::default();
        assert!(manager.should_fire(DistractionCause::Drowsy, Instant::now()));
    }

    #[test]
    fn test_cooldown_per_cause() {
        let mut manager = AlertManager::default();
        let t0 = Instant::now();
        let t10 = t0 + Duration::from_secs(10);

        manager.record_fire(DistractionCause::MobileDetected, t0);
        assert!(!manager.should_fire(DistractionCause::MobileDetected, t10));
        // Other causes are independent
        assert!(manager.should_fire(DistractionCause::Drowsy, t10));
        assert!(manager.should_fire(
            DistractionCause::MobileDetected,
            t0 + Duration::from_secs(30)
        ));
    }

    #[test]
    fn test_hourly_throttle_and_rollover() {
        let config = AlertConfig {
            cooldown_seconds: 0,
            max_alerts_per_hour: 2,
        };
        let mut manager = AlertManager::new(config);
        let t0 = Instant::now();

        manager.record_fire(DistractionCause::Drowsy, t0);
        manager.record_fire(DistractionCause::Inactivity, t0);
        assert!(!manager.should_fire(DistractionCause::MobileDetected, t0));

        let next_hour = t0 + Duration::from_secs(3601);
        assert!(manager.should_fire(DistractionCause::MobileDetected, next_hour));
        manager.record_fire(DistractionCause::MobileDetected, next_hour);
        assert!(manager.should_fire(DistractionCause::Drowsy, next_hour));
    }

    #[test]
    fn test_dispatch_delivers_once_per_cooldown() {
        let mut manager = AlertManager::default();
        let sink = MemorySink::new();
        let t0 = Instant::now();

        assert!(manager.dispatch(DistractionCause::MobileDetected, t0, &sink));
        for i in 1..20 {
            manager.dispatch(
                DistractionCause::MobileDetected,
                t0 + Duration::from_millis(100 * i),
                &sink,
            );
        }

        let delivered = sink.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].title, "Distraction Alert");
    }
}
