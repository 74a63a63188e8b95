use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    /// Reserved for blocked actions; never offered to the user.
    Critical,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one proposed action. Lives for a single gating pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ActionVerdict {
    Allowed,
    Blocked {
        reason: String,
    },
    RequiresConfirmation {
        reason: String,
        risk: RiskLevel,
    },
}

impl ActionVerdict {
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self::Blocked {
            reason: reason.into(),
        }
    }

    pub fn confirm(reason: impl Into<String>, risk: RiskLevel) -> Self {
        Self::RequiresConfirmation {
            reason: reason.into(),
            risk,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Blocked { .. } => "blocked",
            Self::RequiresConfirmation { .. } => "requires_confirmation",
        }
    }

    /// Combine two verdicts for the same action, keeping the stricter one.
    /// Blocked beats confirmation, and a higher-risk confirmation beats a lower one.
    #[must_use]
    pub fn stricter(self, other: Self) -> Self {
        match (&self, &other) {
            (Self::Blocked { .. }, _) => self,
            (_, Self::Blocked { .. }) => other,
            (Self::Allowed, _) => other,
            (_, Self::Allowed) => self,
            (
                Self::RequiresConfirmation { risk: a, .. },
                Self::RequiresConfirmation { risk: b, .. },
            ) => {
                if b > a {
                    other
                } else {
                    self
                }
            }
        }
    }
}

/// How an action came to be allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Classification alone found it safe.
    Classified,
    ApprovedOnce,
    /// A session-cached "always" decision.
    ApprovedCached,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Classified => "classified",
            Self::ApprovedOnce => "approved_once",
            Self::ApprovedCached => "approved_cached",
        }
    }
}

/// Proof that one proposed action resolved to Allowed.
///
/// Executors take a `&Clearance`, and only the gating step in the tool loop
/// can construct one, so nothing runs with an unresolved or Blocked verdict.
#[derive(Debug)]
pub struct Clearance {
    call_id: String,
    resolution: Resolution,
}

impl Clearance {
    pub(crate) fn grant(call_id: impl Into<String>, resolution: Resolution) -> Self {
        Self {
            call_id: call_id.into(),
            resolution,
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stricter_prefers_blocked() {
        let merged = ActionVerdict::confirm("overwrite", RiskLevel::Medium)
            .stricter(ActionVerdict::blocked("system dir"));
        assert!(merged.is_blocked());
    }

    #[test]
    fn stricter_keeps_higher_risk_confirmation() {
        let merged = ActionVerdict::confirm("overwrite", RiskLevel::Medium)
            .stricter(ActionVerdict::confirm("sensitive", RiskLevel::High));
        assert_eq!(
            merged,
            ActionVerdict::confirm("sensitive", RiskLevel::High)
        );
    }

    #[test]
    fn stricter_with_allowed_is_identity() {
        let v = ActionVerdict::confirm("x", RiskLevel::Low);
        assert_eq!(ActionVerdict::Allowed.stricter(v.clone()), v);
        assert_eq!(v.clone().stricter(ActionVerdict::Allowed), v);
    }

    #[test]
    fn risk_levels_order_by_severity() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::High < RiskLevel::Critical);
        assert_eq!(RiskLevel::High.to_string(), "HIGH");
    }
}
