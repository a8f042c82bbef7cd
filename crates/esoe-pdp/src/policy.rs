//! LXACML policy model.
//!
//! A [`Policy`] declares the resources (and optionally actions) it governs in
//! its [`Target`] and holds an ordered list of [`Rule`]s. A rule without a
//! target inherits its policy's resources and actions.
//!
//! The target tree mirrors the schema: `Target → Resources → Resource →
//! AttributeValue`, and the same for actions. Any missing node below a
//! declared `Resources`/`Actions` element makes that level malformed; see
//! [`crate::extractor`] for how malformed levels are read.
//!
//! [`CompiledPolicy`] is the form the engine and the policy cache work with:
//! the policy alongside its deduplicated, precompiled patterns.

use esoe_core::TargetPattern;
use esoe_core::protocol::{AttributeValue, Effect};
use serde::{Deserialize, Serialize};

use crate::extractor;

// =============================================================================
// Policy Document Model
// =============================================================================

/// An LXACML policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Unique policy identifier.
    pub policy_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Resources and actions the policy governs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,

    /// Rules in evaluation order.
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// A rule within a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Rule identifier, unique within the policy.
    pub rule_id: String,

    /// Outcome when the rule applies.
    pub effect: Effect,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Narrower resources and actions; absent means the policy's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,

    /// Condition on the principal's attributes; absent always holds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

/// Target of a policy or rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Actions>,
}

impl Target {
    /// A target over the given resource patterns.
    #[must_use]
    pub fn resources<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resources: Some(Resources {
                resources: patterns
                    .into_iter()
                    .map(|p| Resource {
                        attribute_value: Some(AttributeValue {
                            content: vec![p.into()],
                        }),
                    })
                    .collect(),
            }),
            actions: None,
        }
    }

    /// Add action patterns to this target.
    #[must_use]
    pub fn with_actions<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = Some(Actions {
            actions: patterns
                .into_iter()
                .map(|p| Action {
                    attribute_value: Some(AttributeValue {
                        content: vec![p.into()],
                    }),
                })
                .collect(),
        });
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_value: Option<AttributeValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actions {
    #[serde(default)]
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_value: Option<AttributeValue>,
}

/// An opaque rule condition.
///
/// The expression is handed unchanged to a
/// [`ConditionEvaluator`](crate::engine::ConditionEvaluator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Condition(pub serde_json::Value);

// =============================================================================
// Compiled Form
// =============================================================================

/// A rule with its patterns compiled.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: Rule,
    /// Declared resource patterns; `None` inherits the policy's.
    pub resources: Option<Vec<TargetPattern>>,
    /// Declared action patterns; `None` inherits the policy's.
    pub actions: Option<Vec<TargetPattern>>,
}

impl CompiledRule {
    fn new(rule: Rule) -> Self {
        let resources = extractor::rule_target_resources(&rule).map(compile);
        let actions = extractor::rule_target_actions(&rule).map(compile);
        Self {
            rule,
            resources,
            actions,
        }
    }
}

/// A policy with its patterns compiled.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    policy: Policy,
    resources: Vec<TargetPattern>,
    actions: Option<Vec<TargetPattern>>,
    rules: Vec<CompiledRule>,
}

impl CompiledPolicy {
    #[must_use]
    pub fn new(policy: Policy) -> Self {
        let resources = compile(extractor::policy_target_resources(&policy));
        let actions = extractor::policy_target_actions(&policy).map(compile);
        let rules = policy.rules.iter().cloned().map(CompiledRule::new).collect();

        Self {
            policy,
            resources,
            actions,
            rules,
        }
    }

    /// The policy document.
    #[must_use]
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    #[must_use]
    pub fn policy_id(&self) -> &str {
        &self.policy.policy_id
    }

    /// Deduplicated policy resource patterns in declaration order.
    #[must_use]
    pub fn resources(&self) -> &[TargetPattern] {
        &self.resources
    }

    /// Policy action patterns, `None` when the policy restricts no action.
    #[must_use]
    pub fn actions(&self) -> Option<&[TargetPattern]> {
        self.actions.as_deref()
    }

    #[must_use]
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Resource patterns that apply to `rule`, inheriting the policy's.
    #[must_use]
    pub fn rule_resources<'a>(&'a self, rule: &'a CompiledRule) -> &'a [TargetPattern] {
        rule.resources.as_deref().unwrap_or(&self.resources)
    }

    /// Action patterns that apply to `rule`, inheriting the policy's.
    #[must_use]
    pub fn rule_actions<'a>(&'a self, rule: &'a CompiledRule) -> Option<&'a [TargetPattern]> {
        rule.actions.as_deref().or(self.actions.as_deref())
    }
}

impl From<Policy> for CompiledPolicy {
    fn from(policy: Policy) -> Self {
        Self::new(policy)
    }
}

fn compile(patterns: Vec<String>) -> Vec<TargetPattern> {
    patterns.into_iter().map(TargetPattern::new).collect()
}
