//! Plan-driven limits policy
//!
//! ```json
//! {
//!   "defaults": {
//!     "global":  { "rpm": 120, "concurrency": 8 },
//!     "actions": { "mutate": { "rpm": 30, "concurrency": 2 } },
//!     "quotas":  { "daily": { "Free": 200, "Pro": 5000 } }
//!   },
//!   "plans": {
//!     "Pro": { "actions": { "mutate": { "rpm": 120 } } }
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Plan used when the billing lookup has no answer
pub const FREE_PLAN: &str = "Free";

/// Effective rate for a limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSpec {
    pub rpm: u32,
    pub concurrency: usize,
}

/// Partial rate that overlays a base spec
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
}

impl RateOverride {
    fn apply(&self, base: RateSpec) -> RateSpec {
        RateSpec {
            rpm: self.rpm.unwrap_or(base.rpm),
            concurrency: self.concurrency.unwrap_or(base.concurrency),
        }
    }
}

/// Action categories with their own limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Preflight,
    Mutate,
    Diagnose,
    Mcc,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Preflight => "preflight",
            ActionKind::Mutate => "mutate",
            ActionKind::Diagnose => "diagnose",
            ActionKind::Mcc => "mcc",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preflight" => Ok(ActionKind::Preflight),
            "mutate" => Ok(ActionKind::Mutate),
            "diagnose" => Ok(ActionKind::Diagnose),
            "mcc" => Ok(ActionKind::Mcc),
            other => Err(format!("unknown action kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quotas {
    #[serde(default)]
    pub daily: HashMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyDefaults {
    #[serde(default)]
    pub global: Option<RateOverride>,
    #[serde(default)]
    pub actions: HashMap<ActionKind, RateOverride>,
    #[serde(default)]
    pub quotas: Quotas,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanOverrides {
    #[serde(default)]
    pub global: Option<RateOverride>,
    #[serde(default)]
    pub actions: HashMap<ActionKind, RateOverride>,
}

/// Limits policy document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitsPolicy {
    #[serde(default)]
    pub defaults: PolicyDefaults,
    #[serde(default)]
    pub plans: HashMap<String, PlanOverrides>,
}

fn lookup_ci<'a, V>(map: &'a HashMap<String, V>, key: &str) -> Option<&'a V> {
    map.get(key).or_else(|| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

impl LimitsPolicy {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Per-key rate for `(plan, action)`: base → defaults.global →
    /// defaults.actions[action] → plans[plan].global → plans[plan].actions[action]
    pub fn resolve(&self, plan: &str, action: ActionKind, base: RateSpec) -> RateSpec {
        let mut spec = base;
        if let Some(global) = &self.defaults.global {
            spec = global.apply(spec);
        }
        if let Some(action_override) = self.defaults.actions.get(&action) {
            spec = action_override.apply(spec);
        }
        if let Some(plan_overrides) = lookup_ci(&self.plans, plan) {
            if let Some(global) = &plan_overrides.global {
                spec = global.apply(spec);
            }
            if let Some(action_override) = plan_overrides.actions.get(&action) {
                spec = action_override.apply(spec);
            }
        }
        spec
    }

    /// Process-wide cap: base overlaid with defaults.global
    pub fn global(&self, base: RateSpec) -> RateSpec {
        match &self.defaults.global {
            Some(global) => global.apply(base),
            None => base,
        }
    }

    /// Daily request quota for a plan, if any
    pub fn daily_quota(&self, plan: &str) -> Option<u64> {
        lookup_ci(&self.defaults.quotas.daily, plan).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: RateSpec = RateSpec {
        rpm: 60,
        concurrency: 4,
    };

    fn policy() -> LimitsPolicy {
        LimitsPolicy::from_json(
            r#"{
                "defaults": {
                    "global": { "rpm": 120, "concurrency": 8 },
                    "actions": {
                        "mutate": { "rpm": 30, "concurrency": 2 },
                        "preflight": { "rpm": 90 }
                    },
                    "quotas": { "daily": { "Free": 200, "Pro": 5000 } }
                },
                "plans": {
                    "Pro": { "actions": { "mutate": { "rpm": 120 } } },
                    "Enterprise": { "global": { "concurrency": 16 } }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_defaults_apply_per_action() {
        let p = policy();
        assert_eq!(
            p.resolve("Free", ActionKind::Mutate, BASE),
            RateSpec {
                rpm: 30,
                concurrency: 2
            }
        );
        assert_eq!(
            p.resolve("Free", ActionKind::Preflight, BASE),
            RateSpec {
                rpm: 90,
                concurrency: 8
            }
        );
        assert_eq!(
            p.resolve("Free", ActionKind::Diagnose, BASE),
            RateSpec {
                rpm: 120,
                concurrency: 8
            }
        );
    }

    #[test]
    fn test_plan_overrides() {
        let p = policy();
        assert_eq!(
            p.resolve("Pro", ActionKind::Mutate, BASE),
            RateSpec {
                rpm: 120,
                concurrency: 2
            }
        );
        assert_eq!(
            p.resolve("enterprise", ActionKind::Mcc, BASE),
            RateSpec {
                rpm: 120,
                concurrency: 16
            }
        );
    }

    #[test]
    fn test_empty_policy_uses_base() {
        let p = LimitsPolicy::default();
        assert_eq!(p.resolve("Free", ActionKind::Mutate, BASE), BASE);
        assert_eq!(p.global(BASE), BASE);
        assert_eq!(p.daily_quota("Free"), None);
    }

    #[test]
    fn test_quotas() {
        let p = policy();
        assert_eq!(p.daily_quota("Free"), Some(200));
        assert_eq!(p.daily_quota("pro"), Some(5000));
        assert_eq!(p.daily_quota("Enterprise"), None);
    }

    #[test]
    fn test_action_kind_parse() {
        assert_eq!("mcc".parse::<ActionKind>().unwrap(), ActionKind::Mcc);
        assert!("delete".parse::<ActionKind>().is_err());
    }
}
