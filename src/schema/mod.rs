//! Entity Schema Module
//!
//! Declares an application's entity graph and reflects it into metadata
//! describing tables, fields and relationship topology.

mod entity;
mod reflect;
mod registry;

pub use entity::{EntityType, FieldDeclaration, FieldKind, RelationKind, ScalarKind};
pub use reflect::{
    classify_relation, reflect, EntityMetadata, FieldMetadata, MetadataDocument,
    ThroughFieldDescriptor,
};
pub use registry::{EntityDecl, Registry, RegistryBuilder, RegistryError, Relation, SELF_REFERENCE};
