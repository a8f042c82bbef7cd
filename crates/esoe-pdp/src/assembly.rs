//! Decision assembly.
//!
//! Answers a signed `AuthzDecisionQuery` from an enforcement point:
//!
//! ```text
//! unmarshal + validate ─▶ extract subject/resource/action ─▶ resolve session
//!     ─▶ policy engine ─▶ result + cache hint obligation ─▶ signed response
//! ```
//!
//! A permit or deny carries an obligation holding the group targets of the
//! policies that decided, so the enforcement point can cache the answer. A
//! default decision carries none. Requests that fail before evaluation get an
//! `authnFailed` response with no result; the rendered document travels with
//! the [`RequestRejected`] error so the caller can still return it.

use esoe_core::protocol::{
    Assertion, AssignmentContent, AttributeAssignment, AudienceRestriction, AuthzDecisionQuery,
    BEARER_METHOD, Conditions, DecisionType, Effect, LxacmlAuthzDecisionStatement, LxacmlResult,
    LxacmlStatus, NameId, Obligation, Response, SAML_VERSION, Statement, Status, Subject,
    SubjectConfirmation, SubjectConfirmationData,
};
use esoe_core::{
    AUTHZ_TARGET, DefaultDecision, DocumentCodec, GroupTarget, PdpConfig, ProtocolDocument,
    RequestValidator, generate_id,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;

use crate::PdpResult;
use crate::engine::{EngineOutcome, EvaluationRequest, PolicyEngine};
use crate::error::{RejectionReason, RequestRejected};
use crate::sessions::SessionQuery;

/// A completed evaluation.
#[derive(Debug, Clone)]
pub struct AuthzEvaluation {
    /// Decision returned to the enforcement point.
    pub decision: DecisionType,
    /// Whether the decision came from the default mode.
    pub is_default: bool,
    /// Policy holding the deciding rule.
    pub policy_id: Option<String>,
    /// The deciding rule.
    pub rule_id: Option<String>,
    /// Number of policies looked at.
    pub policies_evaluated: usize,
    /// The signed response.
    pub response_document: Vec<u8>,
}

/// Decision assembly statistics.
#[derive(Debug, Clone, Default)]
pub struct AssemblyStats {
    /// Permits decided by a policy.
    pub permits: u64,
    /// Denies decided by a policy.
    pub denies: u64,
    /// Decisions taken from the default mode.
    pub defaults: u64,
    /// Queries rejected before evaluation.
    pub rejections: u64,
}

/// Decision side orchestrator.
pub struct AuthorizationProcessor {
    config: PdpConfig,
    engine: Arc<dyn PolicyEngine>,
    sessions: Arc<dyn SessionQuery>,
    codec: Arc<dyn DocumentCodec>,
    validator: RequestValidator,
    permits: AtomicU64,
    denies: AtomicU64,
    defaults: AtomicU64,
    rejections: AtomicU64,
}

/// A query that passed validation.
struct ValidatedQuery {
    query: AuthzDecisionQuery,
    issuer: String,
    subject_id: String,
    resource: String,
    action: Option<String>,
}

impl AuthorizationProcessor {
    pub fn new(
        config: PdpConfig,
        engine: Arc<dyn PolicyEngine>,
        sessions: Arc<dyn SessionQuery>,
        codec: Arc<dyn DocumentCodec>,
        validator: RequestValidator,
    ) -> Self {
        Self {
            config,
            engine,
            sessions,
            codec,
            validator,
            permits: AtomicU64::new(0),
            denies: AtomicU64::new(0),
            defaults: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    /// Evaluate a signed authorization query and render the signed answer.
    ///
    /// # Errors
    ///
    /// Returns [`PdpError::Rejected`](crate::PdpError::Rejected) when the
    /// query is invalid or its subject has no session, carrying the
    /// `authnFailed` response when it could be rendered, and
    /// [`PdpError::Codec`](crate::PdpError::Codec) when a successful answer
    /// could not be rendered.
    pub async fn evaluate(&self, request: &[u8]) -> PdpResult<AuthzEvaluation> {
        let validated = match self.validate(request) {
            Ok(validated) => validated,
            Err((in_response_to, rejection)) => {
                return Err(self.reject(in_response_to, rejection).into());
            }
        };

        let principal = match self.sessions.query_saml_session(&validated.subject_id).await {
            Ok(Some(principal)) => principal,
            Ok(None) => {
                let rejection = RequestRejected::new(
                    RejectionReason::SessionUnknown,
                    format!("No session for subject {}", validated.subject_id),
                );
                return Err(self.reject(Some(validated.query.header.id), rejection).into());
            }
            Err(e) => {
                let rejection = RequestRejected::new(RejectionReason::SessionUnknown, e.to_string());
                return Err(self.reject(Some(validated.query.header.id), rejection).into());
            }
        };

        let outcome = self
            .engine
            .evaluate(&EvaluationRequest {
                resource: &validated.resource,
                issuer: &validated.issuer,
                action: validated.action.as_deref(),
                attributes: &principal.attributes,
            })
            .await;

        let (result, is_default) = self.build_result(&outcome);
        let decision = result.decision;

        match (decision, is_default) {
            (_, true) => self.defaults.fetch_add(1, Ordering::Relaxed),
            (DecisionType::Permit, false) => self.permits.fetch_add(1, Ordering::Relaxed),
            _ => self.denies.fetch_add(1, Ordering::Relaxed),
        };

        tracing::info!(
            target: AUTHZ_TARGET,
            issuer = %validated.issuer,
            principal = %validated.subject_id,
            resource = %validated.resource,
            action = validated.action.as_deref().unwrap_or("-"),
            decision = %decision,
            default = is_default,
            policy_id = outcome.policy_id.as_deref().unwrap_or("-"),
            rule_id = outcome.rule_id.as_deref().unwrap_or("-"),
            policies_evaluated = outcome.policies_evaluated,
            "Authorization decision"
        );

        let response = self.build_response(validated, result);
        let response_document = self
            .codec
            .marshal_signed(&ProtocolDocument::from(response))?;

        Ok(AuthzEvaluation {
            decision,
            is_default,
            policy_id: outcome.policy_id,
            rule_id: outcome.rule_id,
            policies_evaluated: outcome.policies_evaluated,
            response_document,
        })
    }

    fn validate(&self, request: &[u8]) -> Result<ValidatedQuery, (Option<String>, RequestRejected)> {
        let query = self
            .codec
            .unmarshal_signed(request)
            .and_then(ProtocolDocument::into_authz_decision_query)
            .map_err(|e| (None, RequestRejected::new(RejectionReason::from(&e), e.to_string())))?;

        let query_id = query.header.id.clone();
        let invalid = |message: String| {
            (
                Some(query_id.clone()),
                RequestRejected::new(RejectionReason::InvalidRequest, message),
            )
        };

        self.validator
            .validate(&query.header)
            .map_err(|e| invalid(e.to_string()))?;

        let issuer = query
            .header
            .issuer_id()
            .ok_or_else(|| invalid("query has no issuer".to_string()))?
            .to_string();
        let subject_id = query
            .request
            .subject_id()
            .map_err(|e| invalid(e.to_string()))?
            .to_string();
        let resource = query
            .request
            .resource()
            .map_err(|e| invalid(e.to_string()))?
            .to_string();
        let action = query
            .request
            .action()
            .map_err(|e| invalid(e.to_string()))?
            .map(str::to_string);

        Ok(ValidatedQuery {
            query,
            issuer,
            subject_id,
            resource,
            action,
        })
    }

    /// Render the `authnFailed` response for a rejected query and attach it.
    ///
    /// A failure to render is logged; the rejection is returned either way.
    fn reject(&self, in_response_to: Option<String>, rejection: RequestRejected) -> RequestRejected {
        self.rejections.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            target: AUTHZ_TARGET,
            request_id = ?in_response_to,
            reason = %rejection.reason,
            message = %rejection.message,
            "Authorization query rejected"
        );

        let response = Response {
            id: generate_id(),
            in_response_to,
            version: SAML_VERSION.to_string(),
            issue_instant: OffsetDateTime::now_utc(),
            issuer: NameId::new(&self.config.esoe_identifier),
            status: Status::authn_failed(rejection.message.clone()),
            assertions: Vec::new(),
        };

        let document = match self.codec.marshal_signed(&ProtocolDocument::from(response)) {
            Ok(document) => Some(document),
            Err(e) => {
                tracing::error!(error = %e, "Unable to render rejection response");
                None
            }
        };

        rejection.with_response(document)
    }

    /// Turn the engine outcome into an LXACML result, returning whether the
    /// default mode decided.
    fn build_result(&self, outcome: &EngineOutcome) -> (LxacmlResult, bool) {
        let status = Some(LxacmlStatus {
            message: Some(outcome.message.clone()),
        });

        let Some(effect) = outcome.decision else {
            let mode = outcome.forced_default.unwrap_or(self.config.default_decision);
            let decision = match mode {
                DefaultDecision::Permit => DecisionType::Permit,
                DefaultDecision::Deny => DecisionType::Deny,
            };
            let result = LxacmlResult {
                decision,
                status,
                obligations: Vec::new(),
            };
            return (result, true);
        };

        let decision = match effect {
            Effect::Permit => DecisionType::Permit,
            Effect::Deny => DecisionType::Deny,
        };

        let content = cache_hints(outcome)
            .into_iter()
            .map(AssignmentContent::GroupTarget)
            .collect();

        let obligation = Obligation {
            obligation_id: self.config.obligations.obligation_id.clone(),
            fulfill_on: effect,
            attribute_assignments: vec![AttributeAssignment {
                attribute_id: self.config.obligations.attribute_id.clone(),
                content,
            }],
        };

        let result = LxacmlResult {
            decision,
            status,
            obligations: vec![obligation],
        };
        (result, false)
    }

    fn build_response(&self, validated: ValidatedQuery, result: LxacmlResult) -> Response {
        let now = OffsetDateTime::now_utc();
        let not_on_or_after = now + self.config.allowed_time_skew;
        let query_id = validated.query.header.id.clone();
        let issuer = NameId::new(&self.config.esoe_identifier);

        let subject = Subject {
            name_id: Some(NameId::new(&validated.subject_id)),
            confirmations: vec![SubjectConfirmation {
                method: BEARER_METHOD.to_string(),
                data: Some(SubjectConfirmationData {
                    not_on_or_after: Some(not_on_or_after),
                    in_response_to: Some(query_id.clone()),
                    recipient: Some(validated.issuer.clone()),
                }),
            }],
        };

        let assertion = Assertion {
            id: generate_id(),
            version: SAML_VERSION.to_string(),
            issue_instant: now,
            issuer: issuer.clone(),
            subject: Some(subject),
            conditions: Some(Conditions {
                not_on_or_after: Some(not_on_or_after),
                audience_restrictions: vec![AudienceRestriction {
                    audiences: vec![validated.issuer],
                }],
            }),
            statements: vec![Statement::LxacmlAuthzDecision(LxacmlAuthzDecisionStatement {
                request: Some(validated.query.request),
                result: Some(result),
            })],
        };

        Response {
            id: generate_id(),
            in_response_to: Some(query_id),
            version: SAML_VERSION.to_string(),
            issue_instant: now,
            issuer,
            status: Status::success(),
            assertions: vec![assertion],
        }
    }

    #[must_use]
    pub fn stats(&self) -> AssemblyStats {
        AssemblyStats {
            permits: self.permits.load(Ordering::Relaxed),
            denies: self.denies.load(Ordering::Relaxed),
            defaults: self.defaults.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
        }
    }
}

/// Group targets to cache the decision under.
///
/// Carries the targets recorded by the rules that applied; a deny carries
/// only the pair that matched its own rule.
fn cache_hints(outcome: &EngineOutcome) -> Vec<GroupTarget> {
    outcome
        .cache_targets
        .iter()
        .map(|(group_target_id, authz_targets)| GroupTarget {
            group_target_id: group_target_id.clone(),
            authz_targets: authz_targets.clone(),
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
