//! # esoe-core
//!
//! Building blocks shared by the ESOE enforcement and decision points.
//!
//! ## Modules
//!
//! - [`decision`] - Decisions and the combination algebra
//! - [`pattern`] - Precompiled resource and action patterns
//! - [`target`] - Group targets and group target maps
//! - [`protocol`] - SAML/LXACML wire model
//! - [`codec`] - Signed document codec seam
//! - [`transport`] - Web-service transport seam and HTTP client
//! - [`validation`] - Request header validation
//! - [`identifier`] - Protocol identifier generation
//! - [`config`] - Configuration types and loading
//! - [`observability`] - Tracing setup
//! - [`error`] - Codec, transport and validation errors

pub mod codec;
pub mod config;
pub mod decision;
pub mod error;
pub mod identifier;
pub mod observability;
pub mod pattern;
pub mod protocol;
pub mod target;
pub mod transport;
pub mod validation;

pub use codec::{DocumentCodec, JsonDocumentCodec};
pub use config::{
    ConfigError, EsoeConfig, LoggingConfig, ObligationConfig, PdpConfig, ProtocolConfig,
    SpepConfig, load_config,
};
pub use decision::{Decision, DefaultDecision};
pub use error::{CodecError, TransportError, ValidationError};
pub use identifier::generate_id;
pub use observability::{AUTHZ_TARGET, init_tracing};
pub use pattern::{TargetPattern, action_matches};
pub use protocol::ProtocolDocument;
pub use target::{GroupTarget, GroupTargetMap, group_target_map};
pub use transport::{HttpTransport, Transport};
pub use validation::RequestValidator;
