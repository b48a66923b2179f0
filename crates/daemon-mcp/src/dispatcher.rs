//! Tool-call dispatch: names a tool and an action, resolves the covenant
//! gate the pair declares, checks it, then hands off to the tool module.
//!
//! One enum per tool rather than a bare string match on `action` — an
//! unrecognized action fails to parse up front and returns `InvalidArgument`,
//! instead of falling through to a late "field not found" once execution is
//! already underway.

use serde_json::Value;

use daemon_core::covenant::Gate;

use crate::error::{DaemonError, DaemonResult};
use crate::registry::ProjectRegistry;
use crate::tools::util::{action, project_path};
use crate::tools::{
    commune, consult, debate_internal, evolve_rule, explore, govern, inscribe, maintain, reflect, simulate_decision,
    understand,
};

macro_rules! tool_action {
    ($name:ident { $($variant:ident => $action:expr, $gate:expr;)+ }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub(crate) enum $name {
            $($variant),+
        }

        impl $name {
            fn parse(action: &str) -> Option<Self> {
                match action {
                    $($action => Some(Self::$variant),)+
                    _ => None,
                }
            }

            fn gate(self) -> Gate {
                match self {
                    $(Self::$variant => $gate),+
                }
            }
        }
    };
}

tool_action!(CommuneAction {
    Briefing => "briefing", Gate::Open;
    Health => "health", Gate::Open;
});

tool_action!(ConsultAction {
    Preflight => "preflight", Gate::Open;
    Recall => "recall", Gate::NeedsBriefing;
});

tool_action!(InscribeAction {
    Remember => "remember", Gate::NeedsPreflight;
    RememberBatch => "remember_batch", Gate::NeedsPreflight;
    Link => "link", Gate::NeedsPreflight;
    Unlink => "unlink", Gate::NeedsPreflight;
    Pin => "pin", Gate::NeedsPreflight;
    Unpin => "unpin", Gate::NeedsPreflight;
    ActiveContext => "active_context", Gate::NeedsBriefing;
});

tool_action!(ReflectAction {
    Outcome => "outcome", Gate::NeedsPreflight;
});

tool_action!(UnderstandAction {
    Get => "get", Gate::NeedsBriefing;
    Rules => "rules", Gate::NeedsBriefing;
    Triggers => "triggers", Gate::NeedsBriefing;
});

tool_action!(GovernAction {
    AddRule => "add_rule", Gate::NeedsPreflight;
    UpdateRule => "update_rule", Gate::NeedsPreflight;
    AddTrigger => "add_trigger", Gate::NeedsPreflight;
    ListTriggers => "list_triggers", Gate::NeedsBriefing;
});

tool_action!(ExploreAction {
    Versions => "versions", Gate::NeedsBriefing;
    AtTime => "at_time", Gate::NeedsBriefing;
    Neighbors => "neighbors", Gate::NeedsBriefing;
    Chain => "chain", Gate::NeedsBriefing;
    Subgraph => "subgraph", Gate::NeedsBriefing;
    Evolution => "evolution", Gate::NeedsBriefing;
    Communities => "communities", Gate::NeedsBriefing;
    RebuildCommunities => "rebuild_communities", Gate::NeedsBriefing;
    Fact => "fact", Gate::NeedsBriefing;
});

tool_action!(MaintainAction {
    Archive => "archive", Gate::NeedsPreflight;
    Prune => "prune", Gate::NeedsPreflight;
    Cleanup => "cleanup", Gate::NeedsPreflight;
    Compact => "compact", Gate::NeedsPreflight;
});

/// Resolves `(tool, action)` to a gate, checks it against `engine`'s
/// covenant for `project`, then runs the tool. `simulate_decision`,
/// `evolve_rule` and `debate_internal` take no `action` field — each is one
/// operation, gated `NeedsBriefing` as read-only synthesis over existing
/// memories.
pub async fn dispatch(registry: &ProjectRegistry, tool: &str, arguments: Option<Value>) -> DaemonResult<Value> {
    let args = arguments.unwrap_or(Value::Null);
    let raw_path = project_path(&args)?;
    let (engine, project) = registry.get_or_open(&raw_path)?;

    macro_rules! gated {
        ($enum_ty:ty, $module:ident) => {{
            let name = action(&args)?;
            let act = <$enum_ty>::parse(&name).ok_or_else(|| DaemonError::UnknownAction(format!("{tool}.{name}")))?;
            engine.covenant().check(&project, act.gate(), &format!("{tool}.{name}"))?;
            $module::execute(&engine, &project, act, &args)
        }};
    }

    match tool {
        "commune" => gated!(CommuneAction, commune),
        "consult" => gated!(ConsultAction, consult),
        "inscribe" => gated!(InscribeAction, inscribe),
        "reflect" => gated!(ReflectAction, reflect),
        "understand" => gated!(UnderstandAction, understand),
        "govern" => gated!(GovernAction, govern),
        "explore" => gated!(ExploreAction, explore),
        "maintain" => gated!(MaintainAction, maintain),
        "simulate_decision" => {
            engine.covenant().check(&project, Gate::NeedsBriefing, "simulate_decision")?;
            simulate_decision::execute(&engine, &args)
        }
        "evolve_rule" => {
            engine.covenant().check(&project, Gate::NeedsBriefing, "evolve_rule")?;
            evolve_rule::execute(&engine, &args)
        }
        "debate_internal" => {
            engine.covenant().check(&project, Gate::NeedsBriefing, "debate_internal")?;
            debate_internal::execute(&engine, &args)
        }
        other => Err(DaemonError::UnknownTool(other.to_string())),
    }
}
