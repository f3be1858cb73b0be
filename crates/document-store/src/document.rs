//! Raw document helpers.

use serde_json::Value;

use crate::{Result, StoreError};

/// A stored document: a JSON object with a string `_id`.
pub type Document = Value;

/// Name of the key field every document carries.
pub const ID_FIELD: &str = "_id";

/// Returns the document's `_id`, failing if it is absent or not a string.
pub fn document_id<'a>(collection: &str, document: &'a Document) -> Result<&'a str> {
    document
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::MissingId {
            collection: collection.to_string(),
        })
}

/// Resolves a dotted path (`items.quantity` style) inside a document.
pub(crate) fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |current, segment| current.get(segment))
}

/// Resolves a dotted path for mutation, creating missing intermediate objects.
pub(crate) fn lookup_mut<'a>(document: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = document;
    for segment in path.split('.') {
        if current.is_null() {
            *current = Value::Object(serde_json::Map::new());
        }
        let object = current.as_object_mut()?;
        current = object.entry(segment).or_insert(Value::Null);
    }
    Some(current)
}
