use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use sg_core::{CorrectionConfig, SceneGuardError, UnitId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSnapshot {
    pub session_max: u32,
    pub session_used: u32,
    pub per_unit_max: u32,
    pub per_unit_used: BTreeMap<String, u32>,
}

/// Process-wide correction allowance. Clones share one counter set; counters
/// only grow until [`CorrectionBudget::reset_session`].
#[derive(Debug, Clone)]
pub struct CorrectionBudget {
    state: Arc<Mutex<BudgetSnapshot>>,
}

impl CorrectionBudget {
    pub fn new(session_max: u32, per_unit_max: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(BudgetSnapshot {
                session_max,
                session_used: 0,
                per_unit_max,
                per_unit_used: BTreeMap::new(),
            })),
        }
    }

    pub fn from_config(config: &CorrectionConfig) -> Self {
        Self::new(config.session_max, config.per_unit_max)
    }

    /// Checks both limits and consumes one attempt under the same lock.
    pub fn try_consume(&self, unit_id: &UnitId) -> Result<(), SceneGuardError> {
        let mut state = self.lock();
        let unit_used = state
            .per_unit_used
            .get(unit_id.as_str())
            .copied()
            .unwrap_or(0);
        if unit_used >= state.per_unit_max {
            return Err(SceneGuardError::new(
                "CORRECTION_BUDGET_EXHAUSTED",
                format!(
                    "Correction budget exhausted for unit \"{}\" ({}/{} attempts used).",
                    unit_id, unit_used, state.per_unit_max
                ),
            ));
        }
        if state.session_used >= state.session_max {
            return Err(SceneGuardError::new(
                "CORRECTION_BUDGET_EXHAUSTED",
                format!(
                    "Session correction budget exhausted ({}/{} attempts used).",
                    state.session_used, state.session_max
                ),
            ));
        }
        state.session_used += 1;
        *state
            .per_unit_used
            .entry(unit_id.as_str().to_string())
            .or_insert(0) += 1;
        log::info!(
            "correction budget consumed by {} (session {}/{})",
            unit_id,
            state.session_used,
            state.session_max
        );
        Ok(())
    }

    pub fn remaining_for(&self, unit_id: &UnitId) -> u32 {
        let state = self.lock();
        let unit_used = state
            .per_unit_used
            .get(unit_id.as_str())
            .copied()
            .unwrap_or(0);
        let unit_left = state.per_unit_max.saturating_sub(unit_used);
        let session_left = state.session_max.saturating_sub(state.session_used);
        unit_left.min(session_left)
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        self.lock().clone()
    }

    /// Starts a new learning session.
    pub fn reset_session(&self) {
        let mut state = self.lock();
        state.session_used = 0;
        state.per_unit_used.clear();
    }

    fn lock(&self) -> MutexGuard<'_, BudgetSnapshot> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod budget_tests {
    use super::*;
    use std::thread;

    #[test]
    fn per_unit_limit_is_checked_before_session_limit() {
        let budget = CorrectionBudget::new(3, 1);
        let unit = UnitId::new("orbit");
        budget.try_consume(&unit).expect("first attempt allowed");
        let error = budget
            .try_consume(&unit)
            .expect_err("second attempt should be refused");
        assert_eq!(error.code, "CORRECTION_BUDGET_EXHAUSTED");
        assert!(error.message.contains("\"orbit\" (1/1"));
        assert_eq!(budget.snapshot().session_used, 1);
        assert_eq!(budget.remaining_for(&unit), 0);
    }

    #[test]
    fn session_limit_spans_units_and_reset_starts_over() {
        let budget = CorrectionBudget::new(2, 5);
        budget.try_consume(&UnitId::new("a")).expect("a");
        budget.try_consume(&UnitId::new("b")).expect("b");
        let error = budget
            .try_consume(&UnitId::new("c"))
            .expect_err("session exhausted");
        assert!(error.message.starts_with("Session correction budget exhausted (2/2"));
        assert_eq!(budget.snapshot().per_unit_used.get("c"), None);

        budget.reset_session();
        assert_eq!(budget.remaining_for(&UnitId::new("c")), 2);
    }

    #[test]
    fn clones_share_counters_across_threads() {
        let budget = CorrectionBudget::new(5, 100);
        let handles: Vec<_> = (0..8)
            .map(|index| {
                let budget = budget.clone();
                thread::spawn(move || budget.try_consume(&UnitId::new(format!("unit-{}", index))).is_ok())
            })
            .collect();
        let granted = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread should finish"))
            .filter(|granted| *granted)
            .count();
        assert_eq!(granted, 5);
        assert_eq!(budget.snapshot().session_used, 5);
    }
}
