//! Policy engine.
//!
//! [`PolicyEngine`] is the seam decision assembly calls into. [`DecisionPoint`]
//! is the target-matching implementation over the [`PolicyCache`]:
//!
//! 1. Policies are looked up by the requesting enforcement point's entity id.
//! 2. For each policy whose resource pattern matches the request, each rule
//!    whose resources (or its policy's) match and whose actions (or its
//!    policy's, or any action when neither declares one) match is applied.
//! 3. A rule applies when its condition holds for the principal's
//!    attributes. A `Deny` rule ends evaluation; a `Permit` rule is recorded
//!    and evaluation continues.
//!
//! Every applied rule records the policy resources and rule resources that
//! matched the request; a `Deny` discards the earlier records and keeps only
//! its own first pair, so enforcement points cache a denial no wider than
//! the rule that produced it.
//!
//! When nothing applies the outcome carries no decision and the caller falls
//! back to its default. An empty cache always denies.

use async_trait::async_trait;
use esoe_core::protocol::Effect;
use esoe_core::{DefaultDecision, GroupTargetMap, TargetPattern};
use std::sync::Arc;

use crate::error::ConditionError;
use crate::policy::{CompiledPolicy, CompiledRule, Condition};
use crate::policy_cache::PolicyCache;
use crate::sessions::PrincipalAttributes;

// =============================================================================
// Engine Seam
// =============================================================================

/// Inputs to a policy evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationRequest<'a> {
    /// Requested resource.
    pub resource: &'a str,
    /// Entity id of the enforcement point asking.
    pub issuer: &'a str,
    /// Requested action, if any.
    pub action: Option<&'a str>,
    /// Attributes of the principal.
    pub attributes: &'a PrincipalAttributes,
}

/// Result of a policy evaluation with its audit metadata.
#[derive(Debug, Clone, Default)]
pub struct EngineOutcome {
    /// `None` when no rule applied.
    pub decision: Option<Effect>,
    /// Group target to the authz targets of the rules that applied.
    pub cache_targets: GroupTargetMap,
    /// Policy holding the deciding rule.
    pub policy_id: Option<String>,
    /// The deciding rule.
    pub rule_id: Option<String>,
    /// Number of policies looked at.
    pub policies_evaluated: usize,
    /// Human-readable summary for the result status.
    pub message: String,
    /// Decision forced regardless of the caller's default.
    pub forced_default: Option<DefaultDecision>,
}

/// An evaluator of authorization policies.
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    /// Evaluate the policies that apply to `request`.
    async fn evaluate(&self, request: &EvaluationRequest<'_>) -> EngineOutcome;
}

/// Evaluates rule conditions against principal attributes.
pub trait ConditionEvaluator: Send + Sync {
    /// Whether `condition` holds for `attributes`.
    ///
    /// # Errors
    ///
    /// Returns an error when the condition cannot be evaluated; the rule is
    /// then treated as not applying.
    fn evaluate(
        &self,
        condition: &Condition,
        attributes: &PrincipalAttributes,
    ) -> Result<bool, ConditionError>;
}

// =============================================================================
// Decision Point
// =============================================================================

/// Target-matching policy engine over the policy cache.
pub struct DecisionPoint {
    cache: Arc<PolicyCache>,
    conditions: Arc<dyn ConditionEvaluator>,
}

impl DecisionPoint {
    #[must_use]
    pub fn new(cache: Arc<PolicyCache>, conditions: Arc<dyn ConditionEvaluator>) -> Self {
        Self { cache, conditions }
    }

    fn rule_applies(
        &self,
        policy: &CompiledPolicy,
        rule: &CompiledRule,
        request: &EvaluationRequest<'_>,
    ) -> bool {
        let resource_matches = policy
            .rule_resources(rule)
            .iter()
            .any(|pattern| pattern.matches(request.resource));
        if !resource_matches {
            return false;
        }

        let action_matches = match policy.rule_actions(rule) {
            None => true,
            Some(patterns) => request
                .action
                .is_some_and(|action| patterns.iter().any(|p| p.matches(action))),
        };
        if !action_matches {
            return false;
        }

        match &rule.rule.condition {
            None => true,
            Some(condition) => match self.conditions.evaluate(condition, request.attributes) {
                Ok(holds) => holds,
                Err(e) => {
                    tracing::warn!(
                        policy_id = %policy.policy_id(),
                        rule_id = %rule.rule.rule_id,
                        error = %e,
                        "Rule condition could not be evaluated, skipping rule"
                    );
                    false
                }
            },
        }
    }
}

#[async_trait]
impl PolicyEngine for DecisionPoint {
    async fn evaluate(&self, request: &EvaluationRequest<'_>) -> EngineOutcome {
        if self.cache.is_empty() {
            tracing::warn!("Policy cache is empty, denying all requests");
            return EngineOutcome {
                message: "No policies are loaded".to_string(),
                forced_default: Some(DefaultDecision::Deny),
                ..Default::default()
            };
        }

        let Some(policies) = self.cache.policies(request.issuer) else {
            tracing::debug!(issuer = %request.issuer, "No policies for issuer");
            return EngineOutcome {
                message: format!("No policies are defined for {}", request.issuer),
                ..Default::default()
            };
        };

        let mut outcome = EngineOutcome::default();

        for policy in policies.iter() {
            outcome.policies_evaluated += 1;

            let groups = matching(policy.resources(), request.resource);
            if groups.is_empty() {
                continue;
            }

            for rule in policy.rules() {
                if !self.rule_applies(policy, rule, request) {
                    continue;
                }
                let authz = matching(policy.rule_resources(rule), request.resource);

                match rule.rule.effect {
                    Effect::Deny => {
                        outcome.decision = Some(Effect::Deny);
                        outcome.cache_targets.clear();
                        record_targets(
                            &mut outcome.cache_targets,
                            groups.first().copied(),
                            authz.first().copied(),
                        );
                        outcome.policy_id = Some(policy.policy_id().to_string());
                        outcome.rule_id = Some(rule.rule.rule_id.clone());
                        outcome.message = format!(
                            "Identified DENY state for principal in Policy {} Rule {}. Evaluated {}.",
                            policy.policy_id(),
                            rule.rule.rule_id,
                            outcome.policies_evaluated
                        );
                        return outcome;
                    }
                    Effect::Permit => {
                        for group in &groups {
                            for target in &authz {
                                record_targets(
                                    &mut outcome.cache_targets,
                                    Some(*group),
                                    Some(*target),
                                );
                            }
                        }
                        outcome.decision = Some(Effect::Permit);
                        outcome.policy_id = Some(policy.policy_id().to_string());
                        outcome.rule_id = Some(rule.rule.rule_id.clone());
                    }
                }
            }
        }

        outcome.message = match outcome.decision {
            Some(_) => format!(
                "Identified PERMIT state for principal. Evaluated {}.",
                outcome.policies_evaluated
            ),
            None => format!(
                "No policy applied to the request. Evaluated {}.",
                outcome.policies_evaluated
            ),
        };
        outcome
    }
}

fn matching<'p>(patterns: &'p [TargetPattern], resource: &str) -> Vec<&'p str> {
    patterns
        .iter()
        .filter(|p| p.matches(resource))
        .map(TargetPattern::as_str)
        .collect()
}

fn record_targets(targets: &mut GroupTargetMap, group: Option<&str>, authz: Option<&str>) {
    let (Some(group), Some(authz)) = (group, authz) else {
        return;
    };
    let entry = targets.entry(group.to_string()).or_default();
    if !entry.iter().any(|existing| existing == authz) {
        entry.push(authz.to_string());
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Policy, Rule, Target};
    use std::collections::HashMap;

    /// Holds when the principal has `{"attribute": name, "value": value}`.
    struct AttributeEquals;

    impl ConditionEvaluator for AttributeEquals {
        fn evaluate(
            &self,
            condition: &Condition,
            attributes: &PrincipalAttributes,
        ) -> Result<bool, ConditionError> {
            let name = condition.0["attribute"]
                .as_str()
                .ok_or_else(|| ConditionError::invalid("missing attribute"))?;
            let value = condition.0["value"]
                .as_str()
                .ok_or_else(|| ConditionError::invalid("missing value"))?;
            Ok(attributes
                .get(name)
                .is_some_and(|values| values.iter().any(|v| v == value)))
        }
    }

    fn rule(rule_id: &str, effect: Effect, target: Option<Target>) -> Rule {
        Rule {
            rule_id: rule_id.to_string(),
            effect,
            description: None,
            target,
            condition: None,
        }
    }

    fn policy(policy_id: &str, target: Target, rules: Vec<Rule>) -> Arc<CompiledPolicy> {
        Arc::new(CompiledPolicy::new(Policy {
            policy_id: policy_id.to_string(),
            description: None,
            target: Some(target),
            rules,
        }))
    }

    fn engine(policies: Vec<Arc<CompiledPolicy>>) -> DecisionPoint {
        let cache = Arc::new(PolicyCache::new());
        cache.replace_all(HashMap::from([("spep".to_string(), Arc::new(policies))]), 1);
        DecisionPoint::new(cache, Arc::new(AttributeEquals))
    }

    fn request<'a>(
        resource: &'a str,
        action: Option<&'a str>,
        attributes: &'a PrincipalAttributes,
    ) -> EvaluationRequest<'a> {
        EvaluationRequest {
            resource,
            issuer: "spep",
            action,
            attributes,
        }
    }

    #[tokio::test]
    async fn test_permit_rule_applies() {
        let engine = engine(vec![policy(
            "admin",
            Target::resources(["/admin/.*"]),
            vec![rule("all", Effect::Permit, None)],
        )]);
        let attrs = PrincipalAttributes::new();

        let outcome = engine.evaluate(&request("/admin/index.html", None, &attrs)).await;
        assert_eq!(outcome.decision, Some(Effect::Permit));
        assert_eq!(outcome.policy_id.as_deref(), Some("admin"));
        assert_eq!(outcome.rule_id.as_deref(), Some("all"));
        assert_eq!(outcome.policies_evaluated, 1);
        assert_eq!(
            outcome.cache_targets.get("/admin/.*"),
            Some(&vec!["/admin/.*".to_string()])
        );
    }

    #[tokio::test]
    async fn test_deny_short_circuits() {
        let engine = engine(vec![
            policy(
                "secure",
                Target::resources(["/admin/secure/.*"]),
                vec![rule("no", Effect::Deny, None)],
            ),
            policy(
                "admin",
                Target::resources(["/admin/.*"]),
                vec![rule("yes", Effect::Permit, None)],
            ),
        ]);
        let attrs = PrincipalAttributes::new();

        let outcome = engine
            .evaluate(&request("/admin/secure/x", None, &attrs))
            .await;
        assert_eq!(outcome.decision, Some(Effect::Deny));
        assert_eq!(outcome.policies_evaluated, 1);
        assert_eq!(outcome.rule_id.as_deref(), Some("no"));
        assert!(outcome.message.contains("DENY state"));
    }

    #[tokio::test]
    async fn test_permit_then_deny_yields_deny() {
        let engine = engine(vec![
            policy(
                "admin",
                Target::resources(["/admin/.*"]),
                vec![rule("yes", Effect::Permit, None)],
            ),
            policy(
                "secure",
                Target::resources(["/admin/secure/.*"]),
                vec![rule("no", Effect::Deny, None)],
            ),
        ]);
        let attrs = PrincipalAttributes::new();

        let outcome = engine
            .evaluate(&request("/admin/secure/x", None, &attrs))
            .await;
        assert_eq!(outcome.decision, Some(Effect::Deny));
        assert_eq!(outcome.cache_targets.len(), 1);
        assert_eq!(
            outcome.cache_targets.get("/admin/secure/.*"),
            Some(&vec!["/admin/secure/.*".to_string()])
        );
    }

    #[tokio::test]
    async fn test_deny_keeps_only_its_own_targets() {
        let engine = engine(vec![policy(
            "admin",
            Target::resources(["/admin/.*", "/.*\\.html"]),
            vec![
                rule("pages", Effect::Permit, Some(Target::resources(["/.*\\.html"]))),
                rule("admin", Effect::Permit, None),
                rule(
                    "secure",
                    Effect::Deny,
                    Some(Target::resources(["/admin/secure/.*"])),
                ),
            ],
        )]);
        let attrs = PrincipalAttributes::new();

        let outcome = engine
            .evaluate(&request("/admin/secure/keys.html", None, &attrs))
            .await;
        assert_eq!(outcome.decision, Some(Effect::Deny));
        assert_eq!(outcome.cache_targets.len(), 1);
        assert_eq!(
            outcome.cache_targets.get("/admin/.*"),
            Some(&vec!["/admin/secure/.*".to_string()])
        );
    }

    #[tokio::test]
    async fn test_permits_record_every_matching_target() {
        let engine = engine(vec![policy(
            "site",
            Target::resources(["/admin/.*", "/.*\\.html"]),
            vec![
                rule("pages", Effect::Permit, Some(Target::resources(["/.*\\.html"]))),
                rule("admin", Effect::Permit, None),
            ],
        )]);
        let attrs = PrincipalAttributes::new();

        let outcome = engine
            .evaluate(&request("/admin/index.html", None, &attrs))
            .await;
        assert_eq!(outcome.decision, Some(Effect::Permit));
        assert_eq!(
            outcome.cache_targets.get("/admin/.*"),
            Some(&vec!["/.*\\.html".to_string(), "/admin/.*".to_string()])
        );
        assert_eq!(
            outcome.cache_targets.get("/.*\\.html"),
            Some(&vec!["/.*\\.html".to_string(), "/admin/.*".to_string()])
        );
    }

    #[tokio::test]
    async fn test_rule_target_narrows_policy() {
        let engine = engine(vec![policy(
            "admin",
            Target::resources(["/admin/.*"]),
            vec![rule(
                "reports",
                Effect::Permit,
                Some(Target::resources(["/admin/reports/.*"])),
            )],
        )]);
        let attrs = PrincipalAttributes::new();

        let outcome = engine.evaluate(&request("/admin/users", None, &attrs)).await;
        assert_eq!(outcome.decision, None);
        assert!(outcome.cache_targets.is_empty());
    }

    #[tokio::test]
    async fn test_actions_must_match_when_declared() {
        let engine = engine(vec![policy(
            "api",
            Target::resources(["/api/.*"]).with_actions(["GET"]),
            vec![rule("read", Effect::Permit, None)],
        )]);
        let attrs = PrincipalAttributes::new();

        let get = engine.evaluate(&request("/api/x", Some("GET"), &attrs)).await;
        assert_eq!(get.decision, Some(Effect::Permit));

        let post = engine.evaluate(&request("/api/x", Some("POST"), &attrs)).await;
        assert_eq!(post.decision, None);

        let none = engine.evaluate(&request("/api/x", None, &attrs)).await;
        assert_eq!(none.decision, None);
    }

    #[tokio::test]
    async fn test_condition_gates_rule() {
        let mut staff_only = rule("staff", Effect::Permit, None);
        staff_only.condition = Some(Condition(serde_json::json!({
            "attribute": "role",
            "value": "staff"
        })));
        let engine = engine(vec![policy(
            "intranet",
            Target::resources(["/intranet/.*"]),
            vec![staff_only],
        )]);

        let staff = PrincipalAttributes::from([("role".to_string(), vec!["staff".to_string()])]);
        let guest = PrincipalAttributes::from([("role".to_string(), vec!["guest".to_string()])]);

        let outcome = engine.evaluate(&request("/intranet/a", None, &staff)).await;
        assert_eq!(outcome.decision, Some(Effect::Permit));

        let outcome = engine.evaluate(&request("/intranet/a", None, &guest)).await;
        assert_eq!(outcome.decision, None);
    }

    #[tokio::test]
    async fn test_unevaluable_condition_skips_rule() {
        let mut broken = rule("broken", Effect::Deny, None);
        broken.condition = Some(Condition(serde_json::json!({ "unexpected": true })));
        let engine = engine(vec![policy(
            "p",
            Target::resources(["/.*"]),
            vec![broken, rule("open", Effect::Permit, None)],
        )]);
        let attrs = PrincipalAttributes::new();

        let outcome = engine.evaluate(&request("/x", None, &attrs)).await;
        assert_eq!(outcome.decision, Some(Effect::Permit));
    }

    #[tokio::test]
    async fn test_unknown_issuer_has_no_decision() {
        let engine = engine(vec![policy(
            "p",
            Target::resources(["/.*"]),
            vec![rule("open", Effect::Permit, None)],
        )]);
        let attrs = PrincipalAttributes::new();

        let outcome = engine
            .evaluate(&EvaluationRequest {
                resource: "/x",
                issuer: "other-spep",
                action: None,
                attributes: &attrs,
            })
            .await;
        assert_eq!(outcome.decision, None);
        assert_eq!(outcome.forced_default, None);
    }

    #[tokio::test]
    async fn test_empty_cache_forces_deny() {
        let engine = DecisionPoint::new(Arc::new(PolicyCache::new()), Arc::new(AttributeEquals));
        let attrs = PrincipalAttributes::new();

        let outcome = engine.evaluate(&request("/x", None, &attrs)).await;
        assert_eq!(outcome.decision, None);
        assert_eq!(outcome.forced_default, Some(DefaultDecision::Deny));
    }
}
