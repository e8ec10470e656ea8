//! Typed record identifiers.
//!
//! Every record kind gets its own id newtype so that references between
//! records (a shape pointing at its asset, the instance naming its current
//! page) are checked at compile time. [`RecordId`] unifies them into a
//! single keyspace for the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! typed_id {
    ($name:ident, $prefix:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(Uuid);

        impl $name {
            /// Create a fresh random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

typed_id!(ShapeId, "shape");
typed_id!(AssetId, "asset");
typed_id!(PageId, "page");
typed_id!(CameraId, "camera");
typed_id!(InstanceId, "instance");

/// The kind of a record, used to key side-effect handler registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Shape,
    Asset,
    Page,
    Camera,
    Instance,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::Shape => "shape",
            RecordKind::Asset => "asset",
            RecordKind::Page => "page",
            RecordKind::Camera => "camera",
            RecordKind::Instance => "instance",
        };
        f.write_str(name)
    }
}

/// A typed id over all record kinds, the store's key type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordId {
    Shape(ShapeId),
    Asset(AssetId),
    Page(PageId),
    Camera(CameraId),
    Instance(InstanceId),
}

impl RecordId {
    /// The kind this id belongs to.
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordId::Shape(_) => RecordKind::Shape,
            RecordId::Asset(_) => RecordKind::Asset,
            RecordId::Page(_) => RecordKind::Page,
            RecordId::Camera(_) => RecordKind::Camera,
            RecordId::Instance(_) => RecordKind::Instance,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Shape(id) => id.fmt(f),
            RecordId::Asset(id) => id.fmt(f),
            RecordId::Page(id) => id.fmt(f),
            RecordId::Camera(id) => id.fmt(f),
            RecordId::Instance(id) => id.fmt(f),
        }
    }
}

impl From<ShapeId> for RecordId {
    fn from(id: ShapeId) -> Self {
        RecordId::Shape(id)
    }
}

impl From<AssetId> for RecordId {
    fn from(id: AssetId) -> Self {
        RecordId::Asset(id)
    }
}

impl From<PageId> for RecordId {
    fn from(id: PageId) -> Self {
        RecordId::Page(id)
    }
}

impl From<CameraId> for RecordId {
    fn from(id: CameraId) -> Self {
        RecordId::Camera(id)
    }
}

impl From<InstanceId> for RecordId {
    fn from(id: InstanceId) -> Self {
        RecordId::Instance(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = ShapeId::new();
        let b = ShapeId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_prefix() {
        let id = ShapeId::new();
        assert!(id.to_string().starts_with("shape:"));
        assert!(RecordId::from(AssetId::new())
            .to_string()
            .starts_with("asset:"));
    }

    #[test]
    fn test_record_id_kind() {
        assert_eq!(RecordId::from(ShapeId::new()).kind(), RecordKind::Shape);
        assert_eq!(RecordId::from(PageId::new()).kind(), RecordKind::Page);
    }
}
