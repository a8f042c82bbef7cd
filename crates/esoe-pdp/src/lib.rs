//! # esoe-pdp
//!
//! Policy decision point for the ESOE authorization engine.
//!
//! ## Modules
//!
//! - [`assembly`] - Answers authorization queries with signed decisions
//! - [`engine`] - Policy evaluation and the condition seam
//! - [`policy`] - Policy model and compiled policies
//! - [`extractor`] - Target and group target extraction
//! - [`policy_cache`] - Per-entity policy snapshots
//! - [`refresh`] - Policy source polling and cache rebuilds
//! - [`broadcast`] - Cache clear notifications to enforcement points
//! - [`monitor`] - Retry of undelivered notifications
//! - [`failures`] - Undelivered notification store
//! - [`metadata`] - Enforcement point endpoint lookup
//! - [`sessions`] - Principal session lookup seam
//! - [`error`] - Decision point errors

pub mod assembly;
pub mod broadcast;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod failures;
pub mod metadata;
pub mod monitor;
pub mod policy;
pub mod policy_cache;
pub mod refresh;
pub mod sessions;

pub use assembly::{AssemblyStats, AuthorizationProcessor, AuthzEvaluation};
pub use broadcast::{BroadcastStats, CacheClearBroadcaster};
pub use engine::{ConditionEvaluator, DecisionPoint, EngineOutcome, EvaluationRequest, PolicyEngine};
pub use error::{
    ConditionError, MetadataError, PdpError, PolicySourceError, RejectionReason, RequestRejected,
    SessionError,
};
pub use failures::{FailedCacheUpdate, FailureRepository};
pub use metadata::{SpepMetadata, StaticMetadata};
pub use monitor::{CacheUpdateFailureMonitor, FlushReport, MonitorStats};
pub use policy::{CompiledPolicy, Policy, Rule, Target};
pub use policy_cache::{PolicyCache, PolicySet};
pub use refresh::{PolicyCacheProcessor, PolicyChange, PolicyRecord, PolicySource, RefreshStats};
pub use sessions::{Principal, PrincipalAttributes, SessionQuery};

/// Type alias for decision point results.
pub type PdpResult<T> = Result<T, PdpError>;
