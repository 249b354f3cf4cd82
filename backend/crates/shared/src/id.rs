//! Common ID Types
//!
//! Type-safe ID wrappers for domain entities.

use std::fmt;
use std::marker::PhantomData;
use uuid::Uuid;

/// Generic typed ID wrapper
///
/// Usage:
/// ```
/// use kernel::id::{Id, markers};
/// type IdentityId = Id<markers::Identity>;
/// ```
pub struct Id<T> {
    value: uuid::Uuid,
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    /// Create a new random ID (UUID v4)
    pub fn new() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    /// Create from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self {
            value: uuid,
            _marker: PhantomData,
        }
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.value
    }

    /// Convert to UUID
    pub fn into_uuid(self) -> Uuid {
        self.value
    }
}

// Manual impls: derives would require `T: Clone` etc. on the marker type.
impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> std::hash::Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.value)
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> From<Uuid> for Id<T> {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

/// Marker types for different entity IDs
pub mod markers {
    /// Marker for Identity IDs
    pub struct Identity;
}

/// Internal identifier of an identity (never exposed to clients)
pub type IdentityId = Id<markers::Identity>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_v4() {
        let id = IdentityId::new();
        assert_eq!(id.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn test_id_from_uuid() {
        let uuid = Uuid::new_v4();
        let id: IdentityId = Id::from_uuid(uuid);
        assert_eq!(id.as_uuid(), &uuid);
        assert_eq!(id, IdentityId::from(uuid));
    }
}
