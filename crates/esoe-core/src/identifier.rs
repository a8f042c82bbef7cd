//! Protocol identifier generation.

use uuid::Uuid;

/// Generate a unique identifier usable as a SAML `ID` attribute.
///
/// The value starts with an underscore so that it is always a valid XML
/// `NCName`.
#[must_use]
pub fn generate_id() -> String {
    format!("_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique_ncnames() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert!(a.starts_with('_'));
        assert_eq!(a.len(), 33);
    }
}
