//! Policy evaluation for one `(release target, candidate version)`.
//!
//! Every enabled policy whose selector matches the target context is
//! consulted; every rule of a consulted policy must accept, where a
//! rejection can still be converted to acceptance by a matching,
//! unexpired policy skip. Evaluation is pure given its inputs and the
//! injected clock; there is no I/O.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use keel_expr::{SelectorCache, match_selector};
use keel_store::EntityStore;
use keel_types::{DeploymentVersion, Policy, PolicyRule, PolicySkip, RuleKind};

use crate::context::TargetContext;

/// Why a rule rejected a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectReason {
    pub policy_id: String,
    pub rule_id: String,
    pub message: String,
}

/// The evaluator's verdict for one candidate version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject(Vec<RejectReason>),
}

impl Decision {
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Policy evaluator over the entity store.
pub struct PolicyEvaluator {
    store: Arc<EntityStore>,
    selectors: Arc<SelectorCache>,
}

impl PolicyEvaluator {
    pub fn new(store: Arc<EntityStore>, selectors: Arc<SelectorCache>) -> Self {
        Self { store, selectors }
    }

    /// Evaluate every applicable policy against the candidate.
    pub fn evaluate(
        &self,
        ctx: &TargetContext,
        version: &DeploymentVersion,
        now: DateTime<Utc>,
    ) -> Decision {
        let mut reasons = Vec::new();

        for policy in self.store.policies.items() {
            if !policy.enabled {
                continue;
            }
            if !self.policy_applies(&policy, ctx, version) {
                continue;
            }
            for rule in &policy.rules {
                if let Some(message) = self.rule_rejects(rule, ctx, version, now) {
                    if self.skip_applies(rule, ctx, version, now) {
                        debug!(
                            rule = %rule.id,
                            version = %version.id,
                            "Rejection converted to acceptance by policy skip"
                        );
                        continue;
                    }
                    reasons.push(RejectReason {
                        policy_id: policy.id.clone(),
                        rule_id: rule.id.clone(),
                        message,
                    });
                }
            }
        }

        if reasons.is_empty() {
            Decision::Accept
        } else {
            Decision::Reject(reasons)
        }
    }

    fn policy_applies(
        &self,
        policy: &Policy,
        ctx: &TargetContext,
        version: &DeploymentVersion,
    ) -> bool {
        let expr_ctx = ctx.expr_context(Some(version));
        match match_selector(&self.selectors, policy.selector.as_ref(), &expr_ctx) {
            Ok(applies) => applies,
            Err(err) => {
                warn!(policy = %policy.id, error = %err, "Policy selector failed to compile; policy skipped");
                false
            }
        }
    }

    /// `Some(message)` when the rule rejects the candidate.
    fn rule_rejects(
        &self,
        rule: &PolicyRule,
        ctx: &TargetContext,
        version: &DeploymentVersion,
        now: DateTime<Utc>,
    ) -> Option<String> {
        match &rule.kind {
            RuleKind::Approval { min_approvals } => {
                let granted = self
                    .store
                    .approvals_for(&rule.id, &version.id)
                    .into_iter()
                    .filter(|record| {
                        record
                            .environment_id
                            .as_ref()
                            .is_none_or(|env| *env == ctx.key.environment_id)
                    })
                    .count();
                if granted >= *min_approvals as usize {
                    None
                } else {
                    Some(format!(
                        "requires {min_approvals} approvals, has {granted}"
                    ))
                }
            }
            RuleKind::VersionSelector { selector } => {
                let expr_ctx = ctx.expr_context(Some(version));
                match match_selector(&self.selectors, Some(selector), &expr_ctx) {
                    Ok(true) => None,
                    Ok(false) => Some(format!("version {} not selected", version.tag)),
                    Err(err) => {
                        warn!(rule = %rule.id, error = %err, "Version selector failed to compile");
                        Some("version selector failed to compile".into())
                    }
                }
            }
            RuleKind::DenyWindow { window } => {
                if window.contains(now) {
                    Some("inside deny window".into())
                } else {
                    None
                }
            }
        }
    }

    /// Skip lookup with narrowing precedence: exact
    /// `(rule, version, environment, resource)` first, then the
    /// environment-scoped form, then the unscoped form. Expired skips
    /// never apply.
    fn skip_applies(
        &self,
        rule: &PolicyRule,
        ctx: &TargetContext,
        version: &DeploymentVersion,
        now: DateTime<Utc>,
    ) -> bool {
        let skips: Vec<Arc<PolicySkip>> = self
            .store
            .skips_for(&rule.id, &version.id)
            .into_iter()
            .filter(|skip| skip.is_active(now))
            .collect();

        let exact = skips.iter().any(|skip| {
            skip.environment_id.as_deref() == Some(ctx.key.environment_id.as_str())
                && skip.resource_id.as_deref() == Some(ctx.key.resource_id.as_str())
        });
        if exact {
            return true;
        }
        let env_scoped = skips.iter().any(|skip| {
            skip.environment_id.as_deref() == Some(ctx.key.environment_id.as_str())
                && skip.resource_id.is_none()
        });
        if env_scoped {
            return true;
        }
        skips
            .iter()
            .any(|skip| skip.environment_id.is_none() && skip.resource_id.is_none())
    }
}
