//! Document codec seam.
//!
//! Signing, signature verification and XML rendering live behind
//! [`DocumentCodec`]. Processors hand it protocol documents and get wire
//! bytes back, and the reverse.

use crate::error::CodecError;
use crate::protocol::ProtocolDocument;

/// Marshals and signs protocol documents, and verifies and parses them.
pub trait DocumentCodec: Send + Sync {
    /// Render and sign a document.
    fn marshal_signed(&self, document: &ProtocolDocument) -> Result<Vec<u8>, CodecError>;

    /// Verify the signature of a document and parse it.
    ///
    /// # Errors
    ///
    /// Returns `SignatureInvalid` or `ReferenceInvalid` when verification
    /// fails, and `Unmarshal` when the bytes are not a valid document.
    fn unmarshal_signed(&self, bytes: &[u8]) -> Result<ProtocolDocument, CodecError>;
}

/// Unsigned JSON rendering of the protocol model.
///
/// Performs no signing or verification. Suitable for tests and for local
/// deployments where both sides trust the channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDocumentCodec;

impl DocumentCodec for JsonDocumentCodec {
    fn marshal_signed(&self, document: &ProtocolDocument) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(document).map_err(|e| CodecError::marshal(e.to_string()))
    }

    fn unmarshal_signed(&self, bytes: &[u8]) -> Result<ProtocolDocument, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::unmarshal(e.to_string()))
    }
}
