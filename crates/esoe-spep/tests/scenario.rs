//! Enforcement against a cache seeded with the three nested group targets
//! `/.*\.jsp`, `/admin/.*` and `/admin/secure/.*`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use esoe_core::{
    Decision, DefaultDecision, GroupTargetMap, JsonDocumentCodec, RequestValidator, SpepConfig,
    Transport, TransportError,
};
use esoe_spep::{
    DecisionCache, PolicyEnforcementProcessor, PrincipalSession, SessionError, SessionStore,
};

const SESSION: &str = "esoe-session-a";

struct SingleSession;

#[async_trait]
impl SessionStore for SingleSession {
    async fn principal_session(
        &self,
        session_id: &str,
    ) -> Result<Option<PrincipalSession>, SessionError> {
        Ok((session_id == SESSION).then(|| PrincipalSession::new(SESSION)))
    }

    async fn terminate(&self, _session: &PrincipalSession) -> Result<(), SessionError> {
        Ok(())
    }
}

/// A decision point that cannot be reached.
#[derive(Default)]
struct UnreachableDecisionPoint {
    calls: AtomicUsize,
}

#[async_trait]
impl Transport for UnreachableDecisionPoint {
    async fn send(&self, endpoint: &str, _document: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::connect(endpoint, "connection refused"))
    }
}

fn group_targets() -> GroupTargetMap {
    let mut map = GroupTargetMap::new();
    map.insert("/.*\\.jsp".to_string(), vec!["/admin/.*\\.jsp".to_string()]);
    map.insert("/admin/.*".to_string(), vec!["/admin/secure/.*".to_string()]);
    map.insert(
        "/admin/secure/.*".to_string(),
        vec![".*/secure/.*\\.gif".to_string()],
    );
    map
}

fn processor(
    default: DefaultDecision,
    transport: Arc<UnreachableDecisionPoint>,
) -> PolicyEnforcementProcessor {
    let cache = Arc::new(DecisionCache::new(default));
    cache.invalidate_all(group_targets());

    PolicyEnforcementProcessor::new(
        SpepConfig {
            default_decision: default,
            ..SpepConfig::default()
        },
        cache,
        Arc::new(SingleSession),
        Arc::new(JsonDocumentCodec),
        transport,
        RequestValidator::default(),
    )
}

fn populate(processor: &PolicyEnforcementProcessor, group_target: &str) {
    let session = PrincipalSession::new(SESSION);
    let authz_targets = group_targets()[group_target].clone();
    processor
        .cache()
        .populate(&session, group_target, &authz_targets, None, Decision::Permit)
        .unwrap();
}

#[tokio::test]
async fn nested_group_targets_with_default_deny() {
    let transport = Arc::new(UnreachableDecisionPoint::default());
    let processor = processor(DefaultDecision::Deny, transport.clone());
    populate(&processor, "/.*\\.jsp");
    populate(&processor, "/admin/.*");

    assert_eq!(
        processor.decide(SESSION, "/somepage.jsp", None).await,
        Decision::Deny
    );
    assert_eq!(
        processor.decide(SESSION, "/admin/somepage.jsp", None).await,
        Decision::Permit
    );
    assert_eq!(
        processor
            .decide(SESSION, "/admin/secure/somepage.jsp", None)
            .await,
        Decision::Permit
    );
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);

    // The .gif authz target was never populated, so the cache cannot answer
    // and the unreachable decision point turns the query into an error.
    let session = PrincipalSession::new(SESSION);
    assert_eq!(
        processor
            .cache()
            .lookup(&session, "/admin/secure/icon.gif", None)
            .unwrap(),
        Decision::NotCached
    );
    assert_eq!(
        processor.decide(SESSION, "/admin/secure/icon.gif", None).await,
        Decision::Error
    );
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn nested_group_targets_with_default_permit() {
    let transport = Arc::new(UnreachableDecisionPoint::default());
    let processor = processor(DefaultDecision::Permit, transport.clone());
    populate(&processor, "/.*\\.jsp");
    populate(&processor, "/admin/.*");

    assert_eq!(
        processor.decide(SESSION, "/somepage.jsp", None).await,
        Decision::Permit
    );
    assert_eq!(
        processor.decide(SESSION, "/admin/somepage.jsp", None).await,
        Decision::Permit
    );
    assert_eq!(
        processor.decide(SESSION, "/admin/secure/icon.gif", None).await,
        Decision::Error
    );
}

#[tokio::test]
async fn empty_group_target_map_answers_default_without_querying() {
    let transport = Arc::new(UnreachableDecisionPoint::default());
    let processor = processor(DefaultDecision::Permit, transport.clone());
    populate(&processor, "/admin/.*");

    processor.cache().invalidate_all(GroupTargetMap::new());

    for resource in ["/somepage.jsp", "/admin/secure/icon.gif", "/anything"] {
        assert_eq!(
            processor.decide(SESSION, resource, None).await,
            Decision::Permit,
            "{resource}"
        );
    }
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
}
