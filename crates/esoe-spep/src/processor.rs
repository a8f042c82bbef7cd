//! Policy enforcement processor.
//!
//! Answers authorization questions for the enforcement point. The decision
//! cache is consulted first; on a miss a signed `AuthzDecisionQuery` is sent
//! to the decision point and the obligations in its answer are used to
//! populate the cache.
//!
//! ```text
//! resolve session ─▶ cache lookup ─┬─ hit ─▶ decision
//!                                  └─ miss ─▶ build query ─▶ remote call ─▶ validate
//!                                             ─▶ extract decision ─▶ process obligations ─▶ decision
//! ```
//!
//! The processor also answers `ClearAuthzCacheRequest`s sent by the decision
//! point when its policy set changes.

use esoe_core::protocol::{
    AssignmentContent, AuthzDecisionQuery, ClearAuthzCacheResponse, DecisionType, LxacmlRequest,
    LxacmlResult, NameId, Obligation, RequestHeader, Response, SAML_VERSION, Status, StatusCode,
};
use esoe_core::{
    AUTHZ_TARGET, CodecError, Decision, DocumentCodec, GroupTargetMap, ProtocolDocument,
    RequestValidator, SpepConfig, Transport, generate_id, group_target_map,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;

use crate::cache::DecisionCache;
use crate::error::EnforcementError;
use crate::session::{PrincipalSession, SessionStore};

/// Enforcement processor statistics.
#[derive(Debug, Clone, Default)]
pub struct ProcessorStats {
    /// Decisions answered by the cache.
    pub cache_answers: u64,
    /// Queries sent to the decision point.
    pub remote_queries: u64,
    /// Queries that ended in a failure.
    pub failed_queries: u64,
    /// Cache clear requests processed.
    pub cache_clears: u64,
}

/// Enforcement side orchestrator.
pub struct PolicyEnforcementProcessor {
    config: SpepConfig,
    cache: Arc<DecisionCache>,
    sessions: Arc<dyn SessionStore>,
    codec: Arc<dyn DocumentCodec>,
    transport: Arc<dyn Transport>,
    validator: RequestValidator,
    cache_answers: AtomicU64,
    remote_queries: AtomicU64,
    failed_queries: AtomicU64,
    cache_clears: AtomicU64,
}

impl PolicyEnforcementProcessor {
    /// Create a processor.
    pub fn new(
        config: SpepConfig,
        cache: Arc<DecisionCache>,
        sessions: Arc<dyn SessionStore>,
        codec: Arc<dyn DocumentCodec>,
        transport: Arc<dyn Transport>,
        validator: RequestValidator,
    ) -> Self {
        Self {
            config,
            cache,
            sessions,
            codec,
            transport,
            validator,
            cache_answers: AtomicU64::new(0),
            remote_queries: AtomicU64::new(0),
            failed_queries: AtomicU64::new(0),
            cache_clears: AtomicU64::new(0),
        }
    }

    /// The decision cache backing this processor.
    #[must_use]
    pub fn cache(&self) -> &Arc<DecisionCache> {
        &self.cache
    }

    // =========================================================================
    // Decisions
    // =========================================================================

    /// Decide whether the principal behind `session_id` may perform `action`
    /// on `resource`.
    ///
    /// Returns `Permit`, `Deny` or `Error`, never `NotCached`. Failures are
    /// logged and reported as `Error`, except when the decision point no
    /// longer knows the principal's session: the local session is then
    /// terminated and the answer is `Deny`.
    pub async fn decide(&self, session_id: &str, resource: &str, action: Option<&str>) -> Decision {
        let session = match self.resolve_session(session_id).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(
                    target: AUTHZ_TARGET,
                    session = %session_id,
                    resource,
                    error = %e,
                    "Unable to resolve principal session"
                );
                return e.decision();
            }
        };

        match self.cache.lookup(&session, resource, action) {
            Ok(Decision::NotCached) => {}
            Ok(decision) => {
                self.cache_answers.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    target: AUTHZ_TARGET,
                    principal = %session.esoe_session_id,
                    resource,
                    action = action.unwrap_or("-"),
                    decision = %decision,
                    "Decision answered from cache"
                );
                return decision;
            }
            Err(e) => {
                tracing::error!(
                    principal = %session.esoe_session_id,
                    resource,
                    error = %e,
                    "Decision cache unavailable"
                );
                return EnforcementError::from(e).decision();
            }
        }

        self.remote_queries.fetch_add(1, Ordering::Relaxed);
        match self.query_decision_point(&session, resource, action).await {
            Ok(decision) => {
                tracing::info!(
                    target: AUTHZ_TARGET,
                    principal = %session.esoe_session_id,
                    resource,
                    action = action.unwrap_or("-"),
                    decision = %decision,
                    "Decision received from decision point"
                );
                decision
            }
            Err(e) => {
                self.failed_queries.fetch_add(1, Ordering::Relaxed);
                if let EnforcementError::SessionUnknown { .. } = e {
                    tracing::warn!(
                        target: AUTHZ_TARGET,
                        principal = %session.esoe_session_id,
                        resource,
                        "Decision point has no session for principal, terminating local session"
                    );
                    self.terminate_session(&session).await;
                } else {
                    tracing::error!(
                        target: AUTHZ_TARGET,
                        principal = %session.esoe_session_id,
                        resource,
                        error = %e,
                        "Authorization query failed"
                    );
                }
                e.decision()
            }
        }
    }

    async fn resolve_session(&self, session_id: &str) -> Result<PrincipalSession, EnforcementError> {
        let session = self
            .sessions
            .principal_session(session_id)
            .await?
            .ok_or(EnforcementError::UnknownLocalSession)?;

        if session.is_expired_at(OffsetDateTime::now_utc()) {
            self.cache.invalidate_principal(&session);
            return Err(EnforcementError::UnknownLocalSession);
        }

        Ok(session)
    }

    async fn terminate_session(&self, session: &PrincipalSession) {
        self.cache.invalidate_principal(session);
        if let Err(e) = self.sessions.terminate(session).await {
            tracing::error!(
                principal = %session.esoe_session_id,
                error = %e,
                "Failed to terminate principal session"
            );
        }
    }

    async fn query_decision_point(
        &self,
        session: &PrincipalSession,
        resource: &str,
        action: Option<&str>,
    ) -> Result<Decision, EnforcementError> {
        let mut header = RequestHeader::new(generate_id(), &self.config.spep_identifier);
        header.destination = Some(self.config.authz_endpoint.clone());
        let query_id = header.id.clone();

        let query = AuthzDecisionQuery {
            header,
            request: LxacmlRequest::new(&session.esoe_session_id, resource, action),
        };

        let document = self.codec.marshal_signed(&query.into())?;
        tracing::debug!(
            query_id = %query_id,
            endpoint = %self.config.authz_endpoint,
            "Sending authorization decision query"
        );

        let reply = self
            .transport
            .send(&self.config.authz_endpoint, document)
            .await?;

        let response = self.codec.unmarshal_signed(&reply)?.into_response()?;
        self.process_response(session, &query_id, action, response)
    }

    fn process_response(
        &self,
        session: &PrincipalSession,
        query_id: &str,
        action: Option<&str>,
        response: Response,
    ) -> Result<Decision, EnforcementError> {
        match response.status.code {
            StatusCode::Success => {}
            StatusCode::AuthnFailed => {
                return Err(EnforcementError::SessionUnknown {
                    message: response.status.message.unwrap_or_default(),
                });
            }
            code => {
                return Err(EnforcementError::Rejected {
                    message: format!(
                        "{}: {}",
                        code.urn(),
                        response.status.message.unwrap_or_default()
                    ),
                });
            }
        }

        let assertion = response
            .assertions
            .first()
            .ok_or_else(|| EnforcementError::malformed("response carries no assertion"))?;

        let subject = assertion
            .subject
            .as_ref()
            .ok_or_else(|| EnforcementError::malformed("assertion has no Subject"))?;

        let confirmation = subject
            .confirmations
            .first()
            .ok_or_else(|| EnforcementError::malformed("subject has no SubjectConfirmation"))?;

        let data = confirmation.data.as_ref().ok_or_else(|| {
            EnforcementError::malformed("subject confirmation has no SubjectConfirmationData")
        })?;

        let not_on_or_after = data.not_on_or_after.ok_or_else(|| {
            EnforcementError::malformed("subject confirmation data has no NotOnOrAfter")
        })?;

        if OffsetDateTime::now_utc() >= not_on_or_after {
            return Err(EnforcementError::Expired { not_on_or_after });
        }

        if let Some(in_response_to) = &data.in_response_to {
            if in_response_to != query_id {
                return Err(EnforcementError::malformed(format!(
                    "assertion answers {in_response_to}, expected {query_id}"
                )));
            }
        }

        let result = assertion
            .authz_decision_statement()
            .and_then(|statement| statement.result.as_ref())
            .ok_or_else(|| EnforcementError::malformed("assertion has no authorization result"))?;

        let decision = match result.decision {
            DecisionType::Permit => Decision::Permit,
            DecisionType::Deny => Decision::Deny,
            other => {
                tracing::warn!(
                    decision = %other,
                    message = ?result.status.as_ref().and_then(|s| s.message.as_deref()),
                    "Decision point returned a non-definitive decision"
                );
                return Ok(Decision::Error);
            }
        };

        self.process_obligations(session, action, decision, result);
        Ok(decision)
    }

    /// Populate the cache from the group targets carried by obligations that
    /// apply to `decision`.
    fn process_obligations(
        &self,
        session: &PrincipalSession,
        action: Option<&str>,
        decision: Decision,
        result: &LxacmlResult,
    ) {
        let obligations = result
            .obligations
            .iter()
            .filter(|o| o.obligation_id == self.config.obligations.obligation_id)
            .filter(|o| o.fulfills_on(decision.as_str()));

        for obligation in obligations {
            self.apply_obligation(session, action, decision, obligation);
        }
    }

    fn apply_obligation(
        &self,
        session: &PrincipalSession,
        action: Option<&str>,
        decision: Decision,
        obligation: &Obligation,
    ) {
        let assignments = obligation
            .attribute_assignments
            .iter()
            .filter(|a| a.attribute_id == self.config.obligations.attribute_id);

        for assignment in assignments {
            for content in &assignment.content {
                match content {
                    AssignmentContent::GroupTarget(target) => {
                        if let Err(e) = self.cache.populate(
                            session,
                            &target.group_target_id,
                            &target.authz_targets,
                            action,
                            decision,
                        ) {
                            tracing::error!(
                                principal = %session.esoe_session_id,
                                group_target = %target.group_target_id,
                                error = %e,
                                "Unable to cache decision"
                            );
                        }
                    }
                    AssignmentContent::Text(text) => {
                        tracing::debug!(content = %text, "Ignoring text obligation content");
                    }
                }
            }
        }
    }

    // =========================================================================
    // Cache invalidation
    // =========================================================================

    /// Process a signed `ClearAuthzCacheRequest` and return the signed
    /// response.
    ///
    /// Invalid requests are answered with a `Requester` status; only a
    /// failure to render the response itself is returned as an error.
    pub fn invalidate(&self, request: &[u8]) -> Result<Vec<u8>, CodecError> {
        let (in_response_to, status) = match self.clear_cache(request) {
            Ok(request_id) => (Some(request_id), Status::success()),
            Err((request_id, message)) => {
                tracing::warn!(
                    request_id = ?request_id,
                    reason = %message,
                    "Rejected authorization cache clear request"
                );
                (request_id, Status::requester(message))
            }
        };

        let response = ClearAuthzCacheResponse {
            id: generate_id(),
            in_response_to,
            version: SAML_VERSION.to_string(),
            issue_instant: OffsetDateTime::now_utc(),
            issuer: NameId::new(&self.config.spep_identifier),
            status,
        };

        self.codec.marshal_signed(&ProtocolDocument::from(response))
    }

    /// Apply a cache clear request, returning the request id on success.
    fn clear_cache(&self, request: &[u8]) -> Result<String, (Option<String>, String)> {
        let request = self
            .codec
            .unmarshal_signed(request)
            .and_then(ProtocolDocument::into_clear_authz_cache_request)
            .map_err(|e| (None, e.to_string()))?;

        let request_id = request.header.id.clone();
        self.validator
            .validate(&request.header)
            .map_err(|e| (Some(request_id.clone()), e.to_string()))?;

        self.cache_clears.fetch_add(1, Ordering::Relaxed);

        if let Some(subject) = &request.subject {
            let name_id = subject.name_id.as_ref().ok_or_else(|| {
                (
                    Some(request_id.clone()),
                    "Subject of cache clear request has no NameID".to_string(),
                )
            })?;

            let removed = self.cache.invalidate_principal_id(&name_id.value);
            tracing::info!(
                request_id = %request_id,
                principal = %name_id.value,
                removed,
                reason = request.reason.as_deref().unwrap_or("-"),
                "Cleared principal authorization cache"
            );
            return Ok(request_id);
        }

        let group_targets: GroupTargetMap = match &request.extensions {
            Some(extensions) => group_target_map(extensions.group_targets().cloned()),
            None => {
                tracing::warn!(
                    request_id = %request_id,
                    "Cache clear request carries no extensions, installing empty group target map"
                );
                GroupTargetMap::new()
            }
        };

        self.cache.invalidate_all(group_targets);
        tracing::info!(
            request_id = %request_id,
            reason = request.reason.as_deref().unwrap_or("-"),
            "Cleared authorization cache"
        );

        Ok(request_id)
    }

    /// Get processor statistics.
    #[must_use]
    pub fn stats(&self) -> ProcessorStats {
        ProcessorStats {
            cache_answers: self.cache_answers.load(Ordering::Relaxed),
            remote_queries: self.remote_queries.load(Ordering::Relaxed),
            failed_queries: self.failed_queries.load(Ordering::Relaxed),
            cache_clears: self.cache_clears.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use async_trait::async_trait;
    use esoe_core::protocol::{
        Assertion, AttributeAssignment, ClearAuthzCacheRequest, Effect, Extensions,
        LxacmlAuthzDecisionStatement, LxacmlStatus, Statement, Subject, SubjectConfirmation,
        SubjectConfirmationData, BEARER_METHOD,
    };
    use esoe_core::{DefaultDecision, GroupTarget, JsonDocumentCodec, TransportError};
    use std::sync::Mutex;
    use std::time::Duration;

    // -------------------------------------------------------------------------
    // Mocks
    // -------------------------------------------------------------------------

    struct MockSessions {
        sessions: Vec<PrincipalSession>,
        terminated: Mutex<Vec<String>>,
    }

    impl MockSessions {
        fn with(session: PrincipalSession) -> Self {
            Self {
                sessions: vec![session],
                terminated: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SessionStore for MockSessions {
        async fn principal_session(
            &self,
            session_id: &str,
        ) -> Result<Option<PrincipalSession>, SessionError> {
            Ok(self
                .sessions
                .iter()
                .find(|s| s.esoe_session_id == session_id)
                .cloned())
        }

        async fn terminate(&self, session: &PrincipalSession) -> Result<(), SessionError> {
            self.terminated
                .lock()
                .unwrap()
                .push(session.esoe_session_id.clone());
            Ok(())
        }
    }

    /// Answers every query with a response built by `respond`.
    struct ScriptedTransport<F> {
        respond: F,
        calls: AtomicU64,
    }

    impl<F> ScriptedTransport<F>
    where
        F: Fn(AuthzDecisionQuery) -> Result<Vec<u8>, TransportError> + Send + Sync,
    {
        fn new(respond: F) -> Self {
            Self {
                respond,
                calls: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl<F> Transport for ScriptedTransport<F>
    where
        F: Fn(AuthzDecisionQuery) -> Result<Vec<u8>, TransportError> + Send + Sync,
    {
        async fn send(&self, _endpoint: &str, document: Vec<u8>) -> Result<Vec<u8>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let query = JsonDocumentCodec
                .unmarshal_signed(&document)
                .unwrap()
                .into_authz_decision_query()
                .unwrap();
            (self.respond)(query)
        }
    }

    struct FailingCodec;

    impl DocumentCodec for FailingCodec {
        fn marshal_signed(&self, document: &ProtocolDocument) -> Result<Vec<u8>, CodecError> {
            JsonDocumentCodec.marshal_signed(document)
        }

        fn unmarshal_signed(&self, _bytes: &[u8]) -> Result<ProtocolDocument, CodecError> {
            Err(CodecError::signature_invalid("digest mismatch"))
        }
    }

    // -------------------------------------------------------------------------
    // Fixtures
    // -------------------------------------------------------------------------

    const SESSION: &str = "esoe-session-1";

    fn config() -> SpepConfig {
        SpepConfig {
            spep_identifier: "https://spep.example.com".to_string(),
            ..SpepConfig::default()
        }
    }

    fn installed_cache() -> Arc<DecisionCache> {
        let cache = Arc::new(DecisionCache::new(DefaultDecision::Deny));
        let mut map = GroupTargetMap::new();
        map.insert("/admin/.*".to_string(), vec!["/admin/secure/.*".to_string()]);
        cache.invalidate_all(map);
        cache
    }

    fn result_with_targets(decision: DecisionType, effect: Effect) -> LxacmlResult {
        LxacmlResult {
            decision,
            status: Some(LxacmlStatus {
                message: Some("evaluated".to_string()),
            }),
            obligations: vec![Obligation {
                obligation_id: esoe_core::config::DEFAULT_OBLIGATION_ID.to_string(),
                fulfill_on: effect,
                attribute_assignments: vec![AttributeAssignment {
                    attribute_id: esoe_core::config::DEFAULT_ATTRIBUTE_ID.to_string(),
                    content: vec![
                        AssignmentContent::GroupTarget(
                            GroupTarget::new("/admin/.*").with_authz_targets(["/admin/secure/.*"]),
                        ),
                        AssignmentContent::Text("note".to_string()),
                    ],
                }],
            }],
        }
    }

    fn response_for(
        query: &AuthzDecisionQuery,
        status: Status,
        subject: Option<Subject>,
        result: Option<LxacmlResult>,
    ) -> Vec<u8> {
        let assertions = if status.is_success() {
            vec![Assertion {
                id: generate_id(),
                version: SAML_VERSION.to_string(),
                issue_instant: OffsetDateTime::now_utc(),
                issuer: NameId::new("https://esoe.example.com"),
                subject,
                conditions: None,
                statements: vec![Statement::LxacmlAuthzDecision(LxacmlAuthzDecisionStatement {
                    request: Some(query.request.clone()),
                    result,
                })],
            }]
        } else {
            Vec::new()
        };

        let response = Response {
            id: generate_id(),
            in_response_to: Some(query.header.id.clone()),
            version: SAML_VERSION.to_string(),
            issue_instant: OffsetDateTime::now_utc(),
            issuer: NameId::new("https://esoe.example.com"),
            status,
            assertions,
        };
        JsonDocumentCodec.marshal_signed(&response.into()).unwrap()
    }

    fn bearer_subject(query: &AuthzDecisionQuery, not_on_or_after: OffsetDateTime) -> Subject {
        Subject {
            name_id: Some(NameId::new(SESSION)),
            confirmations: vec![SubjectConfirmation {
                method: BEARER_METHOD.to_string(),
                data: Some(SubjectConfirmationData {
                    not_on_or_after: Some(not_on_or_after),
                    in_response_to: Some(query.header.id.clone()),
                    recipient: None,
                }),
            }],
        }
    }

    fn valid_subject(query: &AuthzDecisionQuery) -> Subject {
        bearer_subject(query, OffsetDateTime::now_utc() + Duration::from_secs(60))
    }

    fn processor(
        cache: Arc<DecisionCache>,
        sessions: Arc<MockSessions>,
        codec: Arc<dyn DocumentCodec>,
        transport: Arc<dyn Transport>,
    ) -> PolicyEnforcementProcessor {
        PolicyEnforcementProcessor::new(
            config(),
            cache,
            sessions,
            codec,
            transport,
            RequestValidator::default(),
        )
    }

    fn default_processor(transport: Arc<dyn Transport>) -> PolicyEnforcementProcessor {
        processor(
            installed_cache(),
            Arc::new(MockSessions::with(PrincipalSession::new(SESSION))),
            Arc::new(JsonDocumentCodec),
            transport,
        )
    }

    // -------------------------------------------------------------------------
    // decide
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_permit_populates_cache() {
        let transport = Arc::new(ScriptedTransport::new(|q: AuthzDecisionQuery| {
            assert_eq!(q.request.subject_id().unwrap(), SESSION);
            assert_eq!(q.request.action().unwrap(), Some("read"));
            assert_eq!(q.header.issuer_id(), Some("https://spep.example.com"));
            Ok(response_for(
                &q,
                Status::success(),
                Some(valid_subject(&q)),
                Some(result_with_targets(DecisionType::Permit, Effect::Permit)),
            ))
        }));
        let processor = default_processor(transport.clone());

        let decision = processor
            .decide(SESSION, "/admin/secure/page.jsp", Some("read"))
            .await;
        assert_eq!(decision, Decision::Permit);

        let decision = processor
            .decide(SESSION, "/admin/secure/other.jsp", Some("read"))
            .await;
        assert_eq!(decision, Decision::Permit);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

        let stats = processor.stats();
        assert_eq!(stats.remote_queries, 1);
        assert_eq!(stats.cache_answers, 1);
    }

    #[tokio::test]
    async fn test_obligation_for_other_effect_is_ignored() {
        let transport = Arc::new(ScriptedTransport::new(|q: AuthzDecisionQuery| {
            Ok(response_for(
                &q,
                Status::success(),
                Some(valid_subject(&q)),
                Some(result_with_targets(DecisionType::Deny, Effect::Permit)),
            ))
        }));
        let processor = default_processor(transport.clone());

        assert_eq!(
            processor.decide(SESSION, "/admin/secure/a", None).await,
            Decision::Deny
        );
        assert_eq!(
            processor.decide(SESSION, "/admin/secure/a", None).await,
            Decision::Deny
        );
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_local_session_is_error() {
        let transport = Arc::new(ScriptedTransport::new(|_q: AuthzDecisionQuery| {
            unimplemented!()
        }));
        let processor = default_processor(transport);
        assert_eq!(
            processor.decide("nobody", "/admin/a", None).await,
            Decision::Error
        );
    }

    #[tokio::test]
    async fn test_expired_local_session_is_error() {
        let transport = Arc::new(ScriptedTransport::new(|_q: AuthzDecisionQuery| {
            unimplemented!()
        }));
        let session = PrincipalSession::new(SESSION)
            .with_expiry(OffsetDateTime::now_utc() - Duration::from_secs(1));
        let processor = processor(
            installed_cache(),
            Arc::new(MockSessions::with(session)),
            Arc::new(JsonDocumentCodec),
            transport,
        );
        assert_eq!(
            processor.decide(SESSION, "/admin/a", None).await,
            Decision::Error
        );
    }

    #[tokio::test]
    async fn test_uninitialized_cache_is_error() {
        let transport = Arc::new(ScriptedTransport::new(|_q: AuthzDecisionQuery| {
            unimplemented!()
        }));
        let processor = processor(
            Arc::new(DecisionCache::new(DefaultDecision::Permit)),
            Arc::new(MockSessions::with(PrincipalSession::new(SESSION))),
            Arc::new(JsonDocumentCodec),
            transport,
        );
        assert_eq!(
            processor.decide(SESSION, "/admin/a", None).await,
            Decision::Error
        );
    }

    #[tokio::test]
    async fn test_authn_failed_terminates_session_and_denies() {
        let transport = Arc::new(ScriptedTransport::new(|q: AuthzDecisionQuery| {
            Ok(response_for(
                &q,
                Status::authn_failed("no such session"),
                None,
                None,
            ))
        }));
        let sessions = Arc::new(MockSessions::with(PrincipalSession::new(SESSION)));
        let processor = processor(
            installed_cache(),
            sessions.clone(),
            Arc::new(JsonDocumentCodec),
            transport,
        );

        assert_eq!(
            processor.decide(SESSION, "/admin/secure/a", None).await,
            Decision::Deny
        );
        assert_eq!(*sessions.terminated.lock().unwrap(), vec![SESSION.to_string()]);
    }

    #[tokio::test]
    async fn test_transport_failure_is_error() {
        let transport = Arc::new(ScriptedTransport::new(|_q: AuthzDecisionQuery| {
            Err(TransportError::connect("https://esoe", "connection refused"))
        }));
        let processor = default_processor(transport);
        assert_eq!(
            processor.decide(SESSION, "/admin/secure/a", None).await,
            Decision::Error
        );
        assert_eq!(processor.stats().failed_queries, 1);
    }

    #[tokio::test]
    async fn test_invalid_signature_is_error() {
        let transport = Arc::new(ScriptedTransport::new(|q: AuthzDecisionQuery| {
            Ok(response_for(
                &q,
                Status::success(),
                Some(valid_subject(&q)),
                Some(result_with_targets(DecisionType::Permit, Effect::Permit)),
            ))
        }));
        let processor = processor(
            installed_cache(),
            Arc::new(MockSessions::with(PrincipalSession::new(SESSION))),
            Arc::new(FailingCodec),
            transport,
        );
        assert_eq!(
            processor.decide(SESSION, "/admin/secure/a", None).await,
            Decision::Error
        );
    }

    #[tokio::test]
    async fn test_missing_subject_is_error() {
        let transport = Arc::new(ScriptedTransport::new(|q: AuthzDecisionQuery| {
            Ok(response_for(
                &q,
                Status::success(),
                None,
                Some(result_with_targets(DecisionType::Permit, Effect::Permit)),
            ))
        }));
        let processor = default_processor(transport);
        assert_eq!(
            processor.decide(SESSION, "/admin/secure/a", None).await,
            Decision::Error
        );
    }

    #[tokio::test]
    async fn test_missing_confirmation_is_error() {
        let transport = Arc::new(ScriptedTransport::new(|q: AuthzDecisionQuery| {
            Ok(response_for(
                &q,
                Status::success(),
                Some(Subject::named(SESSION)),
                Some(result_with_targets(DecisionType::Permit, Effect::Permit)),
            ))
        }));
        let processor = default_processor(transport);
        assert_eq!(
            processor.decide(SESSION, "/admin/secure/a", None).await,
            Decision::Error
        );
    }

    #[tokio::test]
    async fn test_expired_confirmation_is_error() {
        let transport = Arc::new(ScriptedTransport::new(|q: AuthzDecisionQuery| {
            let expired = OffsetDateTime::now_utc() - Duration::from_secs(1);
            Ok(response_for(
                &q,
                Status::success(),
                Some(bearer_subject(&q, expired)),
                Some(result_with_targets(DecisionType::Permit, Effect::Permit)),
            ))
        }));
        let processor = default_processor(transport);
        assert_eq!(
            processor.decide(SESSION, "/admin/secure/a", None).await,
            Decision::Error
        );
    }

    #[tokio::test]
    async fn test_mismatched_in_response_to_is_error() {
        let transport = Arc::new(ScriptedTransport::new(|q: AuthzDecisionQuery| {
            let mut subject = valid_subject(&q);
            if let Some(data) = subject.confirmations[0].data.as_mut() {
                data.in_response_to = Some("_other".to_string());
            }
            Ok(response_for(
                &q,
                Status::success(),
                Some(subject),
                Some(result_with_targets(DecisionType::Permit, Effect::Permit)),
            ))
        }));
        let processor = default_processor(transport);
        assert_eq!(
            processor.decide(SESSION, "/admin/secure/a", None).await,
            Decision::Error
        );
    }

    #[tokio::test]
    async fn test_indeterminate_decision_is_error() {
        let transport = Arc::new(ScriptedTransport::new(|q: AuthzDecisionQuery| {
            Ok(response_for(
                &q,
                Status::success(),
                Some(valid_subject(&q)),
                Some(LxacmlResult {
                    decision: DecisionType::Indeterminate,
                    status: None,
                    obligations: Vec::new(),
                }),
            ))
        }));
        let processor = default_processor(transport);
        assert_eq!(
            processor.decide(SESSION, "/admin/secure/a", None).await,
            Decision::Error
        );
    }

    #[tokio::test]
    async fn test_requester_status_is_error() {
        let transport = Arc::new(ScriptedTransport::new(|q: AuthzDecisionQuery| {
            Ok(response_for(&q, Status::requester("bad query"), None, None))
        }));
        let processor = default_processor(transport);
        assert_eq!(
            processor.decide(SESSION, "/admin/secure/a", None).await,
            Decision::Error
        );
    }

    // -------------------------------------------------------------------------
    // invalidate
    // -------------------------------------------------------------------------

    fn clear_request(
        subject: Option<Subject>,
        extensions: Option<Extensions>,
    ) -> (String, Vec<u8>) {
        let header = RequestHeader::new(generate_id(), "https://esoe.example.com");
        let id = header.id.clone();
        let request = ClearAuthzCacheRequest {
            header,
            reason: Some("policy update".to_string()),
            subject,
            extensions,
        };
        (id, JsonDocumentCodec.marshal_signed(&request.into()).unwrap())
    }

    fn parse_clear_response(bytes: &[u8]) -> ClearAuthzCacheResponse {
        JsonDocumentCodec
            .unmarshal_signed(bytes)
            .unwrap()
            .into_clear_authz_cache_response()
            .unwrap()
    }

    fn unused_transport() -> Arc<dyn Transport> {
        Arc::new(ScriptedTransport::new(|_q: AuthzDecisionQuery| {
            unimplemented!()
        }))
    }

    #[test]
    fn test_invalidate_installs_group_targets() {
        let processor = default_processor(unused_transport());
        let (id, request) = clear_request(
            None,
            Some(Extensions::from_group_targets([
                GroupTarget::new("/docs/.*").with_authz_targets(["/docs/private/.*"]),
            ])),
        );

        let response = parse_clear_response(&processor.invalidate(&request).unwrap());
        assert_eq!(response.status.code, StatusCode::Success);
        assert_eq!(response.in_response_to.as_deref(), Some(id.as_str()));
        assert_eq!(response.issuer.value, "https://spep.example.com");

        let map = processor.cache().group_targets().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["/docs/.*"], vec!["/docs/private/.*"]);
    }

    #[test]
    fn test_invalidate_without_extensions_installs_empty_map() {
        let processor = default_processor(unused_transport());
        let (_, request) = clear_request(None, None);

        let response = parse_clear_response(&processor.invalidate(&request).unwrap());
        assert!(response.status.is_success());
        assert!(processor.cache().group_targets().unwrap().is_empty());

        let session = PrincipalSession::new(SESSION);
        assert_eq!(
            processor.cache().lookup(&session, "/anything", None).unwrap(),
            Decision::Deny
        );
    }

    #[test]
    fn test_invalidate_single_principal() {
        let processor = default_processor(unused_transport());
        let alice = PrincipalSession::new("alice");
        let bob = PrincipalSession::new("bob");
        for session in [&alice, &bob] {
            processor
                .cache()
                .populate(
                    session,
                    "/admin/.*",
                    &["/admin/secure/.*".to_string()],
                    None,
                    Decision::Permit,
                )
                .unwrap();
        }

        let (_, request) = clear_request(Some(Subject::named("alice")), None);
        let response = parse_clear_response(&processor.invalidate(&request).unwrap());
        assert!(response.status.is_success());

        assert_eq!(processor.cache().principal_count(), 1);
        assert_eq!(
            processor.cache().lookup(&bob, "/admin/secure/a", None).unwrap(),
            Decision::Permit
        );
        assert!(processor.cache().group_targets().unwrap().contains_key("/admin/.*"));
    }

    #[test]
    fn test_invalidate_subject_without_name_is_requester() {
        let processor = default_processor(unused_transport());
        let (id, request) = clear_request(Some(Subject::default()), None);

        let response = parse_clear_response(&processor.invalidate(&request).unwrap());
        assert_eq!(response.status.code, StatusCode::Requester);
        assert_eq!(response.in_response_to.as_deref(), Some(id.as_str()));
        assert!(processor.cache().group_targets().unwrap().contains_key("/admin/.*"));
    }

    #[test]
    fn test_invalidate_garbage_is_requester() {
        let processor = default_processor(unused_transport());
        let response = parse_clear_response(&processor.invalidate(b"garbage").unwrap());
        assert_eq!(response.status.code, StatusCode::Requester);
        assert!(response.in_response_to.is_none());
        assert!(response.status.message.is_some());
    }

    #[test]
    fn test_invalidate_stale_request_is_requester() {
        let processor = default_processor(unused_transport());
        let mut header = RequestHeader::new(generate_id(), "https://esoe.example.com");
        header.issue_instant = OffsetDateTime::now_utc() - Duration::from_secs(3600);
        let request = ClearAuthzCacheRequest {
            header,
            reason: None,
            subject: None,
            extensions: None,
        };
        let bytes = JsonDocumentCodec.marshal_signed(&request.into()).unwrap();

        let response = parse_clear_response(&processor.invalidate(&bytes).unwrap());
        assert_eq!(response.status.code, StatusCode::Requester);
        assert!(processor.cache().group_targets().unwrap().contains_key("/admin/.*"));
    }

    #[test]
    fn test_invalidate_wrong_document_is_requester() {
        let processor = default_processor(unused_transport());
        let query = AuthzDecisionQuery {
            header: RequestHeader::new(generate_id(), "https://spep.example.com"),
            request: LxacmlRequest::new(SESSION, "/a", None),
        };
        let bytes = JsonDocumentCodec.marshal_signed(&query.into()).unwrap();

        let response = parse_clear_response(&processor.invalidate(&bytes).unwrap());
        assert_eq!(response.status.code, StatusCode::Requester);
    }
}
