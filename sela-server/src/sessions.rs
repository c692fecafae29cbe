//! In-memory session registry.
//!
//! Participant id, trial type and per-concept attempt counters live in an
//! explicit registry keyed by the session id the client received from
//! `/session/trial` and sends back with every call. No cookie state.

use std::collections::HashMap;
use std::sync::Mutex;

use sela_core::models::TrialType;

/// The concept currently under discussion for a session.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveConcept {
    pub name: String,
    pub golden_answer: String,
}

#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub participant_id: String,
    pub trial_type: TrialType,
    pub interaction_id: String,
    pub concept: Option<ActiveConcept>,
    /// 0-based attempt counts, per concept name.
    attempts: HashMap<String, u32>,
}

impl SessionContext {
    pub fn new(
        session_id: String,
        participant_id: String,
        trial_type: TrialType,
        interaction_id: String,
    ) -> Self {
        Self {
            session_id,
            participant_id,
            trial_type,
            interaction_id,
            concept: None,
            attempts: HashMap::new(),
        }
    }

    pub fn attempt_count(&self, concept: &str) -> u32 {
        self.attempts.get(concept).copied().unwrap_or(0)
    }

    /// Returns the 0-based count for this submission and increments the
    /// stored counter. Counters only ever go up within a session.
    pub fn begin_attempt(&mut self, concept: &str) -> u32 {
        let counter = self.attempts.entry(concept.to_string()).or_insert(0);
        let current = *counter;
        *counter += 1;
        current
    }

    /// Explicit concept change resets that concept's counter.
    pub fn set_concept(&mut self, concept: ActiveConcept) {
        self.attempts.insert(concept.name.clone(), 0);
        self.concept = Some(concept);
    }
}

/// Map of live sessions behind one mutex. Low-traffic research tool; a
/// single lock is plenty.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    inner: Mutex<HashMap<String, SessionContext>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a session. A fresh trial setup starts with
    /// zeroed counters even for a returning participant.
    pub fn insert(&self, ctx: SessionContext) {
        self.inner
            .lock()
            .expect("session registry lock")
            .insert(ctx.session_id.clone(), ctx);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("session registry lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self, session_id: &str) -> Option<SessionContext> {
        self.inner
            .lock()
            .expect("session registry lock")
            .get(session_id)
            .cloned()
    }

    /// Runs `f` against the live context, returning `None` for unknown ids.
    pub fn with_session<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut SessionContext) -> R,
    ) -> Option<R> {
        self.inner
            .lock()
            .expect("session registry lock")
            .get_mut(session_id)
            .map(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(id: &str) -> SessionContext {
        SessionContext::new(
            id.to_string(),
            "P01".to_string(),
            TrialType::Trial1,
            "P01_20250101000000".to_string(),
        )
    }

    #[test]
    fn test_attempts_increment_monotonically_per_concept() {
        let reg = SessionRegistry::new();
        reg.insert(ctx("s1"));

        for expected in 0..4 {
            let n = reg.with_session("s1", |c| c.begin_attempt("Correlation")).unwrap();
            assert_eq!(n, expected);
        }
        // Independent counter per concept.
        let n = reg.with_session("s1", |c| c.begin_attempt("Moderators")).unwrap();
        assert_eq!(n, 0);
        assert_eq!(reg.snapshot("s1").unwrap().attempt_count("Correlation"), 4);
    }

    #[test]
    fn test_concept_change_resets_only_that_counter() {
        let reg = SessionRegistry::new();
        reg.insert(ctx("s1"));
        reg.with_session("s1", |c| {
            c.begin_attempt("Correlation");
            c.begin_attempt("Correlation");
            c.begin_attempt("Confounders");
        });

        reg.with_session("s1", |c| {
            c.set_concept(ActiveConcept {
                name: "Correlation".to_string(),
                golden_answer: "g".to_string(),
            })
        });

        let snap = reg.snapshot("s1").unwrap();
        assert_eq!(snap.attempt_count("Correlation"), 0);
        assert_eq!(snap.attempt_count("Confounders"), 1);
        assert_eq!(snap.concept.as_ref().unwrap().name, "Correlation");
    }

    #[test]
    fn test_unknown_session_yields_none() {
        let reg = SessionRegistry::new();
        assert!(reg.snapshot("nope").is_none());
        assert!(reg.with_session("nope", |_| ()).is_none());
    }

    #[test]
    fn test_reinsert_replaces_counters() {
        let reg = SessionRegistry::new();
        reg.insert(ctx("s1"));
        reg.with_session("s1", |c| c.begin_attempt("Correlation"));
        reg.insert(ctx("s1"));
        assert_eq!(reg.snapshot("s1").unwrap().attempt_count("Correlation"), 0);
    }
}
