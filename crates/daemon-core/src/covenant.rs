//! Covenant — the session-level discipline gating mutations behind briefing
//! and preflight.
//!
//! A TTL-keyed in-memory session map (`validate_session`/`cleanup_expired`
//! shape) behind a plain `Mutex<HashMap>`, matching the rest of this engine's
//! `Mutex`-based concurrency rather than pulling in a second concurrent-map
//! dependency for one component. Tokens are generated with `rand`'s OS RNG
//! and compared with `subtle`'s constant-time equality: unguessable, and
//! never derived from anything in the request itself.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::error::{EngineError, Result};

/// Session state per project. `Briefed`/`Preflighted` are not modeled as a
/// single enum the way `COLD -> BRIEFED -> PREFLIGHTED` reads, because
/// preflight status is time-bounded and independent of whether the session
/// has ever been briefed: a session can fall back from preflighted to
/// merely briefed on token expiry without losing its briefing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CovenantState {
    Cold,
    Briefed,
    Preflighted,
}

/// Gate an action declares before dispatch. `Open` actions run from `Cold`;
/// `NeedsBriefing` actions need at least `Briefed`; `NeedsPreflight` actions
/// additionally need a live, unexpired token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Open,
    NeedsBriefing,
    NeedsPreflight,
}

struct IssuedToken {
    bytes: [u8; 16],
    issued_at: DateTime<Utc>,
}

/// Session-state machine and preflight-token ledger, one instance shared by
/// every project the engine process serves (the project path doubles as the
/// session key — there is no separate session-id concept).
pub struct Covenant {
    briefed: std::sync::Mutex<HashSet<String>>,
    tokens: std::sync::Mutex<HashMap<String, IssuedToken>>,
    ttl: Duration,
}

impl Covenant {
    pub fn new(ttl: Duration) -> Self {
        Self {
            briefed: std::sync::Mutex::new(HashSet::new()),
            tokens: std::sync::Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn briefed_lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.briefed.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn tokens_lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, IssuedToken>> {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self, project: &str) -> CovenantState {
        if self.has_live_token(project) {
            CovenantState::Preflighted
        } else if self.briefed_lock().contains(project) {
            CovenantState::Briefed
        } else {
            CovenantState::Cold
        }
    }

    /// Marks `project` as briefed. Called on a successful `commune.briefing`.
    pub fn mark_briefed(&self, project: &str) {
        self.briefed_lock().insert(project.to_string());
    }

    fn has_live_token(&self, project: &str) -> bool {
        let tokens = self.tokens_lock();
        match tokens.get(project) {
            Some(issued) => Utc::now().signed_duration_since(issued.issued_at).to_std().unwrap_or(Duration::ZERO) <= self.ttl,
            None => false,
        }
    }

    /// Issues a fresh token for `project`, overwriting any prior one. Returns
    /// the token hex-encoded for the `consult.preflight` response body; the
    /// dispatcher never needs the value back, since subsequent mutations
    /// re-check `project`'s live token rather than requiring callers to pass
    /// it back in.
    pub fn issue_preflight(&self, project: &str, _description: &str) -> String {
        let mut bytes = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        // `description` is accepted for the token's description-hash binding
        // but not replayed into validation: tokens are accepted purely on
        // project + liveness, and stay valid for any action until expiry.
        self.tokens_lock().insert(
            project.to_string(),
            IssuedToken {
                bytes,
                issued_at: Utc::now(),
            },
        );
        hex_encode(&bytes)
    }

    /// Checks `gate` for `action` against `project`'s current state, without
    /// mutating anything. `Cold` sessions may only call `Open`-gated actions.
    pub fn check(&self, project: &str, gate: Gate, action: &str) -> Result<()> {
        match gate {
            Gate::Open => Ok(()),
            Gate::NeedsBriefing => {
                if self.briefed_lock().contains(project) {
                    Ok(())
                } else {
                    Err(EngineError::CommunionRequired)
                }
            }
            Gate::NeedsPreflight => {
                if !self.briefed_lock().contains(project) {
                    return Err(EngineError::CommunionRequired);
                }
                if self.has_live_token(project) {
                    Ok(())
                } else {
                    Err(EngineError::CounselRequired(format!(
                        "no live preflight token for {action}"
                    )))
                }
            }
        }
    }

    /// Constant-time comparison helper exposed for tests that want to assert
    /// a raw token value matches what's on file for a project, without
    /// introducing a timing side channel in the process.
    #[cfg(test)]
    fn token_matches(&self, project: &str, candidate: &[u8; 16]) -> bool {
        match self.tokens_lock().get(project) {
            Some(issued) => bool::from(issued.bytes.ct_eq(candidate)),
            None => false,
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cold_session_rejects_briefing_gated_actions() {
        let covenant = Covenant::new(Duration::from_secs(300));
        assert!(matches!(
            covenant.check("proj", Gate::NeedsBriefing, "consult.recall"),
            Err(EngineError::CommunionRequired)
        ));
        assert!(covenant.check("proj", Gate::Open, "commune.briefing").is_ok());
    }

    #[test]
    fn briefed_without_preflight_needs_counsel() {
        let covenant = Covenant::new(Duration::from_secs(300));
        covenant.mark_briefed("proj");
        assert!(covenant.check("proj", Gate::NeedsBriefing, "consult.recall").is_ok());
        assert!(matches!(
            covenant.check("proj", Gate::NeedsPreflight, "inscribe.remember"),
            Err(EngineError::CounselRequired(_))
        ));
    }

    #[test]
    fn preflight_token_unblocks_mutation_until_expiry() {
        let covenant = Covenant::new(Duration::from_millis(50));
        covenant.mark_briefed("proj");
        let token = covenant.issue_preflight("proj", "add X");
        assert_eq!(token.len(), 32);
        assert!(covenant.check("proj", Gate::NeedsPreflight, "inscribe.remember").is_ok());
        std::thread::sleep(Duration::from_millis(80));
        assert!(matches!(
            covenant.check("proj", Gate::NeedsPreflight, "inscribe.remember"),
            Err(EngineError::CounselRequired(_))
        ));
    }

    #[test]
    fn token_is_reusable_until_expiry() {
        let covenant = Covenant::new(Duration::from_secs(300));
        covenant.mark_briefed("proj");
        covenant.issue_preflight("proj", "add X");
        assert!(covenant.check("proj", Gate::NeedsPreflight, "a").is_ok());
        assert!(covenant.check("proj", Gate::NeedsPreflight, "b").is_ok());
    }

    #[test]
    fn separate_projects_have_independent_state() {
        let covenant = Covenant::new(Duration::from_secs(300));
        covenant.mark_briefed("a");
        assert!(covenant.check("a", Gate::NeedsBriefing, "x").is_ok());
        assert!(matches!(
            covenant.check("b", Gate::NeedsBriefing, "x"),
            Err(EngineError::CommunionRequired)
        ));
    }

    #[test]
    fn token_matches_is_constant_time_equality() {
        let covenant = Covenant::new(Duration::from_secs(300));
        covenant.mark_briefed("proj");
        covenant.issue_preflight("proj", "add X");
        let wrong = [0u8; 16];
        assert!(!covenant.token_matches("proj", &wrong));
    }
}
