use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three condition types carried by [`ServiceInstance`](crate::instance::ServiceInstance)
/// and [`ServiceBinding`](crate::binding::ServiceBinding) status objects. These strings are part of
/// the public contract (§7 of the design) and must not drift once published.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
pub enum ConditionType {
    Ready,
    Failed,
    OrphanMitigation,
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionType::Ready => write!(f, "Ready"),
            ConditionType::Failed => write!(f, "Failed"),
            ConditionType::OrphanMitigation => write!(f, "OrphanMitigation"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A single status condition. `lastTransitionTime` only changes when `status` flips; setting the
/// same `status` again with a new reason/message leaves the transition time untouched.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: String,
}

/// Ordered list of conditions plus the `lastConditionState` derived field (§3: "the first True
/// condition for display").
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct Conditions(pub Vec<Condition>);

impl Conditions {
    pub fn get(&self, type_: ConditionType) -> Option<&Condition> {
        self.0.iter().find(|c| c.type_ == type_)
    }

    pub fn is_true(&self, type_: ConditionType) -> bool {
        matches!(self.get(type_), Some(c) if c.status == ConditionStatus::True)
    }

    /// Sets or updates a condition. Returns `true` if the condition's `status` changed (and thus
    /// `lastTransitionTime` was bumped), `false` if only `reason`/`message` changed or nothing did.
    pub fn set(
        &mut self,
        type_: ConditionType,
        status: ConditionStatus,
        reason: &str,
        message: &str,
        now: &str,
    ) -> bool {
        match self.0.iter_mut().find(|c| c.type_ == type_) {
            Some(existing) => {
                let changed = existing.status != status;
                existing.status = status;
                existing.reason = reason.to_owned();
                existing.message = message.to_owned();
                if changed {
                    existing.last_transition_time = now.to_owned();
                }
                changed
            }
            None => {
                self.0.push(Condition {
                    type_,
                    status,
                    reason: reason.to_owned(),
                    message: message.to_owned(),
                    last_transition_time: now.to_owned(),
                });
                true
            }
        }
    }

    /// The first `True` condition's type, for the `lastConditionState` printer column.
    pub fn last_condition_state(&self) -> Option<String> {
        self.0
            .iter()
            .find(|c| c.status == ConditionStatus::True)
            .map(|c| c.type_.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_same_status_does_not_bump_transition_time() {
        let mut conditions = Conditions::default();
        conditions.set(ConditionType::Ready, ConditionStatus::False, "Provisioning", "msg1", "t0");
        let changed =
            conditions.set(ConditionType::Ready, ConditionStatus::False, "Provisioning", "msg2", "t1");
        assert!(!changed);
        let c = conditions.get(ConditionType::Ready).unwrap();
        assert_eq!(c.last_transition_time, "t0");
        assert_eq!(c.message, "msg2");
    }

    #[test]
    fn flipping_status_bumps_transition_time() {
        let mut conditions = Conditions::default();
        conditions.set(ConditionType::Ready, ConditionStatus::False, "Provisioning", "msg", "t0");
        let changed =
            conditions.set(ConditionType::Ready, ConditionStatus::True, "ProvisionedSuccessfully", "ok", "t1");
        assert!(changed);
        assert_eq!(conditions.get(ConditionType::Ready).unwrap().last_transition_time, "t1");
    }

    #[test]
    fn last_condition_state_reports_first_true() {
        let mut conditions = Conditions::default();
        conditions.set(ConditionType::Ready, ConditionStatus::True, "ProvisionedSuccessfully", "ok", "t0");
        assert_eq!(conditions.last_condition_state(), Some("Ready".to_owned()));
    }
}
