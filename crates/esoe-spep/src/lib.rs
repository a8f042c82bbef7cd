//! # esoe-spep
//!
//! Policy enforcement point for the ESOE authorization engine.
//!
//! ## Modules
//!
//! - [`cache`] - Per-principal decision cache
//! - [`processor`] - Decision queries and cache invalidation requests
//! - [`session`] - Principal sessions and the session store seam
//! - [`error`] - Cache, session and enforcement errors

pub mod cache;
pub mod error;
pub mod processor;
pub mod session;

pub use cache::{DecisionCache, DecisionCacheStats};
pub use error::{CacheError, EnforcementError, SessionError};
pub use processor::{PolicyEnforcementProcessor, ProcessorStats};
pub use session::{PrincipalSession, SessionStore};

/// Type alias for enforcement results.
pub type SpepResult<T> = Result<T, EnforcementError>;
