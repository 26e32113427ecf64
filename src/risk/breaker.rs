use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::audit::{AuditEventType, AuditLogger, AuditSeverity};
use crate::capability::{Action, Authorizable, Pausable};
use crate::config::RiskConfig;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub window_start: DateTime<Utc>,
    pub volume_in_window: u128,
    pub paused: bool,
    pub tripped_at: Option<DateTime<Utc>>,
    pub max_hourly_volume: u128,
}

impl CircuitBreakerState {
    pub fn remaining(&self) -> u128 {
        self.max_hourly_volume.saturating_sub(self.volume_in_window)
    }
}

/// Volume breaker guarding credit intake
pub struct RiskController {
    config: RiskConfig,
    state: Mutex<CircuitBreakerState>,
    audit: Arc<AuditLogger>,
    authorizer: Arc<dyn Authorizable>,
}

impl RiskController {
    pub fn new(
        config: RiskConfig,
        audit: Arc<AuditLogger>,
        authorizer: Arc<dyn Authorizable>,
        now: DateTime<Utc>,
    ) -> Self {
        let state = CircuitBreakerState {
            window_start: now,
            volume_in_window: 0,
            paused: false,
            tripped_at: None,
            max_hourly_volume: config.max_hourly_volume,
        };
        Self {
            config,
            state: Mutex::new(state),
            audit,
            authorizer,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircuitBreakerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reset the window if it has expired
    fn roll(&self, state: &mut CircuitBreakerState, now: DateTime<Utc>) {
        if now - state.window_start >= self.config.window() {
            state.window_start = now;
            state.volume_in_window = 0;
        }
    }

    pub fn state(&self, now: DateTime<Utc>) -> CircuitBreakerState {
        let mut state = self.lock();
        self.roll(&mut state, now);
        state.clone()
    }

    /// Count `amount` against the window
    ///
    /// If it would push the window over the cap the breaker trips, the volume
    /// is not recorded, and the call fails.
    pub fn record_volume(&self, amount: u128, now: DateTime<Utc>) -> EngineResult<()> {
        let mut state = self.lock();
        if state.paused {
            return Err(EngineError::CircuitBreakerTripped);
        }
        self.roll(&mut state, now);

        let attempted = state
            .volume_in_window
            .checked_add(amount)
            .ok_or(EngineError::Overflow("volume window"))?;

        if attempted > self.config.max_hourly_volume {
            state.paused = true;
            state.tripped_at = Some(now);

            error!(
                volume_in_window = %state.volume_in_window,
                attempted = %amount,
                cap = %self.config.max_hourly_volume,
                "Circuit breaker tripped, credit intake paused"
            );
            self.audit.record(
                AuditEventType::CircuitBreakerTripped {
                    volume_in_window: state.volume_in_window,
                    attempted: amount,
                    cap: self.config.max_hourly_volume,
                },
                AuditSeverity::Critical,
                now,
            );
            return Err(EngineError::CircuitBreakerTripped);
        }

        state.volume_in_window = attempted;
        Ok(())
    }

    /// Give back volume recorded for an operation that later failed
    pub fn release_volume(&self, amount: u128, window_start: DateTime<Utc>) {
        let mut state = self.lock();
        if state.window_start == window_start {
            state.volume_in_window = state.volume_in_window.saturating_sub(amount);
        }
    }

    /// Start of the current window, for pairing with [`release_volume`](Self::release_volume)
    pub fn window_start(&self) -> DateTime<Utc> {
        self.lock().window_start
    }

    /// Clear a trip. Operator only; restarts the window.
    pub fn resume(&self, operator: &str, now: DateTime<Utc>) -> EngineResult<CircuitBreakerState> {
        if let Err(e) = self.authorizer.authorize(operator, Action::ResumeBreaker) {
            self.audit.record(
                AuditEventType::UnauthorizedAttempt {
                    actor: operator.to_string(),
                    action: Action::ResumeBreaker.as_str().to_string(),
                },
                AuditSeverity::Warning,
                now,
            );
            return Err(e);
        }

        let mut state = self.lock();
        if !state.paused {
            return Err(EngineError::BreakerNotTripped);
        }
        state.paused = false;
        state.tripped_at = None;
        state.window_start = now;
        state.volume_in_window = 0;

        info!(operator = %operator, "Circuit breaker resumed");
        self.audit.record(
            AuditEventType::CircuitBreakerResumed {
                operator: operator.to_string(),
            },
            AuditSeverity::Warning,
            now,
        );
        Ok(state.clone())
    }

    /// Emergency halt of credit intake
    pub fn pause(&self, operator: &str, now: DateTime<Utc>) -> EngineResult<CircuitBreakerState> {
        self.authorizer.authorize(operator, Action::PauseIntake)?;

        let mut state = self.lock();
        if !state.paused {
            state.paused = true;
            state.tripped_at = Some(now);
            warn!(operator = %operator, "Credit intake paused by operator");
            self.audit.record(
                AuditEventType::IntakePaused {
                    component: self.component().to_string(),
                    operator: operator.to_string(),
                },
                AuditSeverity::Warning,
                now,
            );
        }
        Ok(state.clone())
    }
}

impl Pausable for RiskController {
    fn is_paused(&self) -> bool {
        self.lock().paused
    }

    fn component(&self) -> &str {
        "credit intake"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::OperatorRegistry;
    use chrono::Duration;

    fn controller(cap: u128, now: DateTime<Utc>) -> (RiskController, Arc<AuditLogger>) {
        let audit = Arc::new(AuditLogger::new());
        let config = RiskConfig {
            max_hourly_volume: cap,
            window_secs: 3600,
        };
        let controller = RiskController::new(
            config,
            audit.clone(),
            Arc::new(OperatorRegistry::new(["ops"])),
            now,
        );
        (controller, audit)
    }

    #[test]
    fn test_trip_at_cap() {
        let now = Utc::now();
        let (risk, audit) = controller(100, now);

        risk.record_volume(60, now).unwrap();
        risk.record_volume(40, now).unwrap();
        assert_eq!(risk.state(now).volume_in_window, 100);

        assert_eq!(risk.record_volume(1, now), Err(EngineError::CircuitBreakerTripped));
        let state = risk.state(now);
        assert!(state.paused);
        assert_eq!(state.volume_in_window, 100);
        assert_eq!(audit.get_by_severity(AuditSeverity::Critical).len(), 1);
    }

    #[test]
    fn test_window_rolls_but_trip_does_not_clear() {
        let now = Utc::now();
        let (risk, _) = controller(100, now);

        risk.record_volume(90, now).unwrap();
        let next_hour = now + Duration::hours(1);
        risk.record_volume(90, next_hour).unwrap();

        assert!(risk.record_volume(20, next_hour).is_err());
        // No automatic recovery
        assert!(risk.record_volume(1, next_hour + Duration::hours(5)).is_err());
        assert!(risk.is_paused());
    }

    #[test]
    fn test_resume_requires_operator() {
        let now = Utc::now();
        let (risk, audit) = controller(10, now);

        assert_eq!(risk.resume("ops", now), Err(EngineError::BreakerNotTripped));

        let _ = risk.record_volume(11, now);
        assert!(matches!(
            risk.resume("mallory", now),
            Err(EngineError::Unauthorized { .. })
        ));
        assert!(risk.is_paused());
        assert_eq!(audit.get_for_subject("mallory").len(), 1);

        let state = risk.resume("ops", now).unwrap();
        assert!(!state.paused);
        assert_eq!(state.volume_in_window, 0);
        assert!(risk.record_volume(10, now).is_ok());
    }

    #[test]
    fn test_release_volume_same_window_only() {
        let now = Utc::now();
        let (risk, _) = controller(100, now);

        risk.record_volume(50, now).unwrap();
        let window = risk.window_start();
        risk.release_volume(20, window);
        assert_eq!(risk.state(now).volume_in_window, 30);

        risk.release_volume(30, window - Duration::hours(1));
        assert_eq!(risk.state(now).volume_in_window, 30);
    }

    #[test]
    fn test_operator_pause() {
        let now = Utc::now();
        let (risk, _) = controller(100, now);
        assert!(risk.pause("mallory", now).is_err());
        risk.pause("ops", now).unwrap();
        assert_eq!(
            risk.ensure_not_paused(),
            Err(EngineError::ComponentPaused("credit intake".into()))
        );
    }
}
