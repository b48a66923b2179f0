//! S1 — fresh project: mutating before briefing is refused, briefing alone
//! still isn't enough for a mutation, and a live preflight token unblocks it
//! until it expires.

#[path = "support/mod.rs"]
mod support;

use std::time::Duration;

use daemon_core::{Covenant, EngineError, Gate};
use support::{draft, open_engine};

#[test]
fn briefing_and_preflight_gate_mutations_in_order() {
    let (engine, _dir) = open_engine();
    let project = "proj";

    assert!(matches!(
        engine.covenant().check(project, Gate::NeedsPreflight, "inscribe.remember"),
        Err(EngineError::CommunionRequired)
    ));

    engine.briefing(project).unwrap();

    assert!(matches!(
        engine.covenant().check(project, Gate::NeedsPreflight, "inscribe.remember"),
        Err(EngineError::CounselRequired(_))
    ));

    engine.covenant().issue_preflight(project, "add X");
    engine.covenant().check(project, Gate::NeedsPreflight, "inscribe.remember").unwrap();

    let id = engine.remember(draft("decision", "X")).unwrap();
    assert_eq!(id, 1);
}

#[test]
fn preflight_token_expires_after_its_ttl() {
    let covenant = Covenant::new(Duration::from_millis(50));
    covenant.mark_briefed("proj");
    covenant.issue_preflight("proj", "add X");
    covenant.check("proj", Gate::NeedsPreflight, "inscribe.remember").unwrap();

    std::thread::sleep(Duration::from_millis(120));

    assert!(matches!(
        covenant.check("proj", Gate::NeedsPreflight, "inscribe.remember"),
        Err(EngineError::CounselRequired(_))
    ));
}
