//! Policies, rules, skips, and approval records.

use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::selector::Selector;

/// A policy: a selector scoping which release-target contexts it
/// applies to, plus an ordered list of rules that must all accept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

/// One rule within a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    #[serde(flatten)]
    pub kind: RuleKind,
}

/// Rule variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Blocks until `min_approvals` approval records exist for the
    /// candidate version (scoped records also match the environment).
    Approval { min_approvals: u32 },
    /// Rejects versions the selector does not match.
    VersionSelector { selector: Selector },
    /// Rejects while the current time falls inside the window.
    DenyWindow { window: DenyWindow },
}

/// A recurring local-time window during which releases are denied.
///
/// Windows that cross midnight are expressed as two windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenyWindow {
    pub days: Vec<Weekday>,
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// Offset from UTC, in minutes, defining the window's local time.
    #[serde(default)]
    pub timezone_offset_minutes: i32,
}

impl DenyWindow {
    /// Whether `now` falls inside the window.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let local = now + chrono::Duration::minutes(i64::from(self.timezone_offset_minutes));
        let weekday = local.date_naive().weekday();
        if !self.days.contains(&weekday) {
            return false;
        }
        let t = local.time();
        t >= self.start && t < self.end
    }
}

/// A dated, scoped override converting one rule's rejection of one
/// version into acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySkip {
    pub id: String,
    pub rule_id: String,
    pub version_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub reason: String,
}

impl PolicySkip {
    /// A skip applies only while unexpired.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// An external approval signal for an approval rule, stored like any
/// other entity so evaluation can count them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: String,
    pub rule_id: String,
    pub version_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<String>,
    pub approved_by: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_skip_expiry() {
        let now = Utc::now();
        let skip = PolicySkip {
            id: "skip-1".into(),
            rule_id: "rule-1".into(),
            version_id: "v-1".into(),
            environment_id: None,
            resource_id: None,
            created_at: now,
            expires_at: Some(now + chrono::Duration::hours(1)),
            reason: "hotfix".into(),
        };
        assert!(skip.is_active(now));
        assert!(!skip.is_active(now + chrono::Duration::hours(2)));

        let forever = PolicySkip {
            expires_at: None,
            ..skip
        };
        assert!(forever.is_active(now + chrono::Duration::days(365)));
    }

    #[test]
    fn test_deny_window_contains() {
        // Mondays 09:00-17:00 UTC.
        let window = DenyWindow {
            days: vec![Weekday::Mon],
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            timezone_offset_minutes: 0,
        };
        // 2024-01-01 is a Monday.
        let monday_noon = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let monday_night = Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap();
        let tuesday_noon = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap();
        assert!(window.contains(monday_noon));
        assert!(!window.contains(monday_night));
        assert!(!window.contains(tuesday_noon));
    }

    #[test]
    fn test_deny_window_offset_shifts_day() {
        // 23:00-23:59 local, UTC+2: 22:00 UTC on Monday is Tuesday
        // 00:00 local and must not match a Monday-only window.
        let window = DenyWindow {
            days: vec![Weekday::Mon],
            start: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
            timezone_offset_minutes: 120,
        };
        let late_monday_utc = Utc.with_ymd_and_hms(2024, 1, 1, 21, 30, 0).unwrap();
        assert!(window.contains(late_monday_utc));
        let just_past = Utc.with_ymd_and_hms(2024, 1, 1, 22, 30, 0).unwrap();
        assert!(!window.contains(just_past));
    }

    #[test]
    fn test_rule_kind_serde() {
        let rule: PolicyRule = serde_json::from_value(serde_json::json!({
            "id": "rule-1",
            "approval": { "min_approvals": 2 }
        }))
        .unwrap();
        assert!(matches!(rule.kind, RuleKind::Approval { min_approvals: 2 }));
    }
}
