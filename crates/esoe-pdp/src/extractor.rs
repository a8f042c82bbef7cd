//! Target extraction.
//!
//! Reads resource and action patterns out of policy target trees and derives
//! the group targets that enforcement points cache decisions under.
//!
//! A malformed level of the tree (a declared `Resources` or `Actions`
//! element with a missing child node) yields no patterns for that level.
//! It never fails: for a rule that means "inherit the policy's patterns",
//! for a policy it means "governs nothing".

use esoe_core::GroupTarget;
use esoe_core::protocol::AttributeValue;

use crate::policy::{CompiledPolicy, Policy, Rule, Target};

// =============================================================================
// Pattern Extraction
// =============================================================================

/// Resource patterns declared by the policy target, deduplicated in order of
/// first occurrence.
#[must_use]
pub fn policy_target_resources(policy: &Policy) -> Vec<String> {
    policy
        .target
        .as_ref()
        .and_then(target_resources)
        .unwrap_or_default()
}

/// Action patterns declared by the policy target.
///
/// `None` when the policy declares no actions, or declares them malformed.
#[must_use]
pub fn policy_target_actions(policy: &Policy) -> Option<Vec<String>> {
    policy.target.as_ref().and_then(target_actions)
}

/// Resource patterns declared by the rule target.
///
/// `None` when the rule has no target or its resources are absent or
/// malformed; the rule then applies to every resource of its policy.
#[must_use]
pub fn rule_target_resources(rule: &Rule) -> Option<Vec<String>> {
    rule.target.as_ref().and_then(target_resources)
}

/// Action patterns declared by the rule target, with the same fallback rule
/// as [`rule_target_resources`].
#[must_use]
pub fn rule_target_actions(rule: &Rule) -> Option<Vec<String>> {
    rule.target.as_ref().and_then(target_actions)
}

fn target_resources(target: &Target) -> Option<Vec<String>> {
    let resources = target.resources.as_ref()?;
    collect_values(resources.resources.iter().map(|r| r.attribute_value.as_ref()))
}

fn target_actions(target: &Target) -> Option<Vec<String>> {
    let actions = target.actions.as_ref()?;
    collect_values(actions.actions.iter().map(|a| a.attribute_value.as_ref()))
}

/// Flatten attribute values into trimmed, unique strings. Any missing value
/// makes the whole level malformed.
fn collect_values<'a, I>(values: I) -> Option<Vec<String>>
where
    I: Iterator<Item = Option<&'a AttributeValue>>,
{
    let mut patterns: Vec<String> = Vec::new();
    for value in values {
        for content in &value?.content {
            let pattern = content.trim();
            if !patterns.iter().any(|p| p == pattern) {
                patterns.push(pattern.to_string());
            }
        }
    }
    Some(patterns)
}

// =============================================================================
// Group Targets
// =============================================================================

/// The group target of `policy` that matches `resource`.
///
/// When several policy resource patterns match, the last one wins.
#[must_use]
pub fn matching_group_target(policy: &CompiledPolicy, resource: &str) -> Option<GroupTarget> {
    matching_group_targets(policy, resource).pop()
}

/// Every group target of `policy` whose pattern equals or matches `resource`,
/// in policy declaration order.
#[must_use]
pub fn matching_group_targets(policy: &CompiledPolicy, resource: &str) -> Vec<GroupTarget> {
    policy
        .resources()
        .iter()
        .filter(|pattern| pattern.matches(resource))
        .map(|pattern| group_target(policy, pattern.as_str()))
        .collect()
}

/// One group target per resource pattern of `policy`.
///
/// This is the complete set an enforcement point needs for the policy.
#[must_use]
pub fn policy_group_targets(policy: &CompiledPolicy) -> Vec<GroupTarget> {
    policy
        .resources()
        .iter()
        .map(|pattern| group_target(policy, pattern.as_str()))
        .collect()
}

/// Build the group target keyed by `group_target_id`, collecting the
/// resource patterns of every rule. A rule without its own resources
/// contributes the policy's.
fn group_target(policy: &CompiledPolicy, group_target_id: &str) -> GroupTarget {
    let mut target = GroupTarget::new(group_target_id);
    for rule in policy.rules() {
        for pattern in policy.rule_resources(rule) {
            target.push_authz_target(pattern.as_str());
        }
    }
    target
}

// =============================================================================
// Tests
// =============================================================================
