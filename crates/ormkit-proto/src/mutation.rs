//! Write operations handed to an adapter's `apply_batch`.

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// One write operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum BatchOp {
    /// Store the full state of an object, creating it if absent.
    Put {
        /// Full object state.
        record: Record,
    },
    /// Update only the fields present in the partial record.
    Patch {
        /// Partial object state.
        record: Record,
    },
    /// Remove an object.
    Delete {
        /// Object type name.
        #[serde(rename = "type")]
        type_name: String,
        /// Object id.
        id: String,
    },
}

impl BatchOp {
    /// Create a put operation.
    pub fn put(record: Record) -> Self {
        BatchOp::Put { record }
    }

    /// Create a patch operation.
    pub fn patch(record: Record) -> Self {
        BatchOp::Patch { record }
    }

    /// Create a delete operation.
    pub fn delete(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        BatchOp::Delete {
            type_name: type_name.into(),
            id: id.into(),
        }
    }

    /// Object type this operation targets.
    pub fn type_name(&self) -> &str {
        match self {
            BatchOp::Put { record } | BatchOp::Patch { record } => &record.type_name,
            BatchOp::Delete { type_name, .. } => type_name,
        }
    }

    /// Object id this operation targets.
    pub fn id(&self) -> &str {
        match self {
            BatchOp::Put { record } | BatchOp::Patch { record } => &record.id,
            BatchOp::Delete { id, .. } => id,
        }
    }

    /// Check if this is a delete.
    pub fn is_delete(&self) -> bool {
        matches!(self, BatchOp::Delete { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_delete_wire_shape() {
        let op = BatchOp::delete("Phone", "p1");
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({"op": "delete", "type": "Phone", "id": "p1"})
        );
        assert!(op.is_delete());
        assert_eq!(op.id(), "p1");
    }

    #[test]
    fn test_patch_targets_record() {
        let op = BatchOp::patch(Record::new("Phone", "p2").with_attribute("make", "Nokia"));
        assert_eq!(op.type_name(), "Phone");
        assert_eq!(op.id(), "p2");
        assert!(!op.is_delete());
    }
}
