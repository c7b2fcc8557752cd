//! Opaque identifiers for allocations, executions and worker resources.
//!
//! All three are UUID v4 newtypes. They are cheap to copy, compare and hash,
//! and serialize as a bare UUID string.

use serde::{Deserialize, Serialize};

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }

            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                let uuid = uuid::Uuid::parse_str(s)?;
                Ok(Self(uuid))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Names one resource reservation on a worker.
    ///
    /// Issued when the worker confirms the reservation and carried by the slot
    /// for its entire lifetime.
    AllocationId
);

uuid_id!(
    /// Identifies one execution attempt of a scheduled task.
    ExecutionId
);

uuid_id!(
    /// Identifies the worker process that owns physical slots.
    ResourceId
);

#[cfg(test)]
mod tests {
    use super::*;

    const FIXED: &str = "550e8400-e29b-41d4-a716-446655440000";

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(AllocationId::new(), AllocationId::new());
        assert_ne!(ExecutionId::new(), ExecutionId::new());
    }

    #[test]
    fn parse_and_display_agree() {
        let id = AllocationId::parse(FIXED).unwrap();
        assert_eq!(id.to_string(), FIXED);
        assert_eq!(id.as_uuid().to_string(), FIXED);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(AllocationId::parse("not-a-uuid").is_err());
        assert!(ResourceId::parse("").is_err());
    }

    #[test]
    fn serializes_transparently() {
        let id = ExecutionId::parse(FIXED).unwrap();
        insta::assert_json_snapshot!(id, @r#""550e8400-e29b-41d4-a716-446655440000""#);

        let back: ExecutionId = serde_json::from_str(&format!("\"{FIXED}\"")).unwrap();
        assert_eq!(back, id);
    }
}
