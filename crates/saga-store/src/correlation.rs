use std::any::type_name;

use crate::error::Error;
use crate::saga::Saga;
use crate::serializer::{DocumentSerializer, FieldRename};

/// Which field of a saga carries its correlation key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CorrelationField {
    saga_type: &'static str,
    serialized_name: &'static str,
}

impl CorrelationField {
    /// Reads the correlation field declared by `S`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `S` declares a blank field.
    pub fn of<S>() -> Result<Self, Error>
    where
        S: Saga,
    {
        let serialized_name = S::CORRELATION_FIELD;
        if serialized_name.trim().is_empty() {
            return Err(Error::invalid_configuration(format!(
                "{} declares a blank correlation field",
                type_name::<S>()
            )));
        }

        Ok(Self {
            saga_type: type_name::<S>(),
            serialized_name,
        })
    }

    /// The saga type the field belongs to.
    #[must_use]
    pub const fn saga_type(&self) -> &'static str {
        self.saga_type
    }

    /// The field's serialized name.
    #[must_use]
    pub const fn serialized_name(&self) -> &'static str {
        self.serialized_name
    }
}

/// Decides whether a storage engine's reserved identity field must be aliased
/// to a saga's correlation field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CorrelationResolver {
    reserved: &'static str,
}

impl CorrelationResolver {
    /// Creates a resolver for an engine whose identity field is `reserved`.
    #[must_use]
    pub const fn new(reserved: &'static str) -> Self {
        Self { reserved }
    }

    /// The engine's reserved identity field.
    #[must_use]
    pub const fn reserved(&self) -> &'static str {
        self.reserved
    }

    /// The rename needed to store `field` under the reserved name, or `None`
    /// if it already serializes that way.
    #[must_use]
    pub fn resolve(&self, field: &CorrelationField) -> Option<FieldRename> {
        (field.serialized_name != self.reserved)
            .then(|| FieldRename::new(field.serialized_name, self.reserved))
    }

    /// The document serializer for `S`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `S` declares a blank
    /// correlation field.
    pub fn serializer_for<S>(&self) -> Result<DocumentSerializer, Error>
    where
        S: Saga,
    {
        let field = CorrelationField::of::<S>()?;

        Ok(self
            .resolve(&field)
            .map_or_else(DocumentSerializer::pass_through, DocumentSerializer::with_rename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct RenamedSaga {
        correlation_id: Uuid,
    }

    impl Saga for RenamedSaga {
        const CORRELATION_FIELD: &'static str = "correlationId";

        fn correlation_id(&self) -> Uuid {
            self.correlation_id
        }
    }

    #[derive(Serialize, Deserialize)]
    struct IdentitySaga {
        id: Uuid,
    }

    impl Saga for IdentitySaga {
        const CORRELATION_FIELD: &'static str = "id";

        fn correlation_id(&self) -> Uuid {
            self.id
        }
    }

    #[derive(Serialize, Deserialize)]
    struct BlankSaga;

    impl Saga for BlankSaga {
        const CORRELATION_FIELD: &'static str = " ";

        fn correlation_id(&self) -> Uuid {
            Uuid::nil()
        }
    }

    #[test]
    fn test_identity_field_needs_no_rename() {
        let resolver = CorrelationResolver::new("id");

        let serializer = resolver.serializer_for::<IdentitySaga>().unwrap();

        assert!(serializer.is_pass_through());
    }

    #[test]
    fn test_other_field_renamed_to_reserved() {
        let resolver = CorrelationResolver::new("id");

        let serializer = resolver.serializer_for::<RenamedSaga>().unwrap();

        assert_eq!(
            serializer.rename(),
            Some(&FieldRename::new("correlationId", "id"))
        );
    }

    #[test]
    fn test_reserved_name_is_engine_specific() {
        let resolver = CorrelationResolver::new("_key");

        let field = CorrelationField::of::<IdentitySaga>().unwrap();

        assert_eq!(resolver.resolve(&field), Some(FieldRename::new("id", "_key")));
    }

    #[test]
    fn test_blank_field_rejected() {
        assert_matches!(
            CorrelationField::of::<BlankSaga>(),
            Err(Error::InvalidConfiguration(_))
        );
    }
}
