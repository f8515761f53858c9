//! Trigger gate - decides whether an event activates a workflow

use crate::core::{Condition, Event};
use tracing::debug;

pub struct TriggerGate;

impl TriggerGate {
    /// True iff the event's kind is accepted and its target branch passes the
    /// rule's branch filters. Unmatched events are ignored, never errors.
    pub fn admit(event: &Event, condition: &Condition) -> bool {
        if !event.kind.is_known() {
            debug!(kind = %event.kind, "unsupported event kind");
            return false;
        }

        match condition.rule_for(&event.kind) {
            Some(rule) => {
                let accepted = rule.accepts_branch(&event.target_branch);
                debug!(
                    kind = %event.kind,
                    branch = %event.target_branch,
                    accepted,
                    "evaluated branch filters"
                );
                accepted
            }
            None => {
                debug!(kind = %event.kind, "event kind not accepted by workflow");
                false
            }
        }
    }
}
