use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Error;

/// Renames one top-level document field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRename {
    /// Field name in the domain model.
    pub from: String,

    /// Field name in the stored document.
    pub to: String,
}

impl FieldRename {
    /// Creates a rename from the model's `from` field to the document's `to`.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Converts saga state to and from stored documents.
///
/// A pass-through serializer stores the model as-is. A renaming serializer
/// moves exactly one top-level field on encode and moves it back on decode;
/// every other field is untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentSerializer {
    rename: Option<FieldRename>,
}

impl DocumentSerializer {
    /// A serializer that applies no renames.
    #[must_use]
    pub const fn pass_through() -> Self {
        Self { rename: None }
    }

    /// A serializer applying `rename`.
    #[must_use]
    pub const fn with_rename(rename: FieldRename) -> Self {
        Self {
            rename: Some(rename),
        }
    }

    /// The applied rename, if any.
    #[must_use]
    pub const fn rename(&self) -> Option<&FieldRename> {
        self.rename.as_ref()
    }

    /// Whether documents are stored exactly as the model serializes.
    #[must_use]
    pub const fn is_pass_through(&self) -> bool {
        self.rename.is_none()
    }

    /// Serializes `value` into a stored document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if `value` cannot be serialized, or
    /// [`Error::FieldCollision`] if the model already has a field named like
    /// the rename target.
    pub fn encode<T>(&self, value: &T) -> Result<Value, Error>
    where
        T: Serialize + ?Sized,
    {
        let mut document = serde_json::to_value(value)?;
        if let Some(rename) = &self.rename {
            move_field(&mut document, &rename.from, &rename.to)?;
        }

        Ok(document)
    }

    /// Deserializes a stored document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the document does not match `T`,
    /// or [`Error::FieldCollision`] if the document carries both names.
    pub fn decode<T>(&self, mut document: Value) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        if let Some(rename) = &self.rename {
            move_field(&mut document, &rename.to, &rename.from)?;
        }

        Ok(serde_json::from_value(document)?)
    }
}

fn move_field(document: &mut Value, from: &str, to: &str) -> Result<(), Error> {
    let Value::Object(fields) = document else {
        return Ok(());
    };

    if !fields.contains_key(from) {
        return Ok(());
    }
    if fields.contains_key(to) {
        return Err(Error::FieldCollision {
            field: to.to_string(),
        });
    }

    if let Some(value) = fields.remove(from) {
        fields.insert(to.to_string(), value);
    }

    Ok(())
}
