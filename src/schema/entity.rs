//! Entity and field declarations
//!
//! Structural metadata for a declared entity graph. Every field carries a
//! tagged kind, so consumers dispatch on the variant instead of probing for
//! optional attributes.

use serde::Serialize;

/// Relationship topology of a relation field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    OneToOne,
    /// Foreign key: the "many" side holds a column pointing at the "one" side
    OneToMany,
    ManyToMany,
}

impl RelationKind {
    /// Internal type label shared by both sides of a relation
    pub fn internal_type(&self) -> &'static str {
        match self {
            RelationKind::OneToOne => "OneToOneField",
            RelationKind::OneToMany => "ForeignKey",
            RelationKind::ManyToMany => "ManyToManyField",
        }
    }
}

/// Storage kind of a non-relational field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// Auto-incrementing 64-bit primary identifier
    AutoId,
    Char,
    Text,
    Email,
    Url,
    Slug,
    Integer,
    PositiveInteger,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Duration,
    File,
    Image,
    Uuid,
    IpAddress,
    Json,
}

impl ScalarKind {
    /// Internal type label reported in the metadata document.
    ///
    /// Several kinds share a storage representation and therefore a label
    /// (`Email` and `Url` are stored as `CharField`, `Image` as `FileField`).
    pub fn internal_type(&self) -> &'static str {
        match self {
            ScalarKind::AutoId => "BigAutoField",
            ScalarKind::Char | ScalarKind::Email | ScalarKind::Url => "CharField",
            ScalarKind::Text => "TextField",
            ScalarKind::Slug => "SlugField",
            ScalarKind::Integer => "IntegerField",
            ScalarKind::PositiveInteger => "PositiveIntegerField",
            ScalarKind::Decimal => "DecimalField",
            ScalarKind::Boolean => "BooleanField",
            ScalarKind::Date => "DateField",
            ScalarKind::DateTime => "DateTimeField",
            ScalarKind::Duration => "DurationField",
            ScalarKind::File | ScalarKind::Image => "FileField",
            ScalarKind::Uuid => "UUIDField",
            ScalarKind::IpAddress => "GenericIPAddressField",
            ScalarKind::Json => "JSONField",
        }
    }
}

/// Capability descriptor of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Plain column
    Scalar { kind: ScalarKind, column: String },

    /// Owning side of a one-to-one or foreign key relation
    ForwardRelation {
        kind: RelationKind,
        related: String,
        local_column: String,
        /// Field on the related entity this column references
        target_field: Option<String>,
    },

    /// Synthesized inverse view of a forward relation, no column of its own
    ReverseRelation { kind: RelationKind, related: String },

    /// Owning side of a many-to-many association
    ManyToMany {
        related: String,
        through: Option<String>,
    },
}

/// A single field declared on (or synthesized for) an entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDeclaration {
    pub name: String,
    pub kind: FieldKind,
    pub auto_created: bool,
}

impl FieldDeclaration {
    /// Scalar field stored in a column of the same name
    pub fn scalar(name: impl Into<String>, kind: ScalarKind) -> Self {
        let name = name.into();
        Self {
            kind: FieldKind::Scalar {
                kind,
                column: name.clone(),
            },
            name,
            auto_created: false,
        }
    }

    pub fn forward(
        name: impl Into<String>,
        kind: RelationKind,
        related: impl Into<String>,
        local_column: impl Into<String>,
        target_field: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::ForwardRelation {
                kind,
                related: related.into(),
                local_column: local_column.into(),
                target_field,
            },
            auto_created: false,
        }
    }

    /// Reverse fields are always auto-created
    pub fn reverse(name: impl Into<String>, kind: RelationKind, related: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::ReverseRelation {
                kind,
                related: related.into(),
            },
            auto_created: true,
        }
    }

    pub fn many_to_many(
        name: impl Into<String>,
        related: impl Into<String>,
        through: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::ManyToMany {
                related: related.into(),
                through,
            },
            auto_created: false,
        }
    }

    /// Mark the field as synthesized rather than user-declared
    pub fn auto_created(mut self) -> Self {
        self.auto_created = true;
        self
    }

    pub fn internal_type(&self) -> &'static str {
        match &self.kind {
            FieldKind::Scalar { kind, .. } => kind.internal_type(),
            FieldKind::ForwardRelation { kind, .. } | FieldKind::ReverseRelation { kind, .. } => {
                kind.internal_type()
            }
            FieldKind::ManyToMany { .. } => RelationKind::ManyToMany.internal_type(),
        }
    }

    pub fn is_relation(&self) -> bool {
        !matches!(self.kind, FieldKind::Scalar { .. })
    }

    /// True when this side owns the physical column or join declaration
    pub fn is_forward(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::ForwardRelation { .. } | FieldKind::ManyToMany { .. }
        )
    }

    /// Name of the entity a relation field points to
    pub fn related_entity(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Scalar { .. } => None,
            FieldKind::ForwardRelation { related, .. }
            | FieldKind::ReverseRelation { related, .. }
            | FieldKind::ManyToMany { related, .. } => Some(related),
        }
    }

    /// Physical column on the owning entity, if any
    pub fn column(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Scalar { column, .. } => Some(column),
            FieldKind::ForwardRelation { local_column, .. } => Some(local_column),
            FieldKind::ReverseRelation { .. } | FieldKind::ManyToMany { .. } => None,
        }
    }

    pub fn through_entity(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::ManyToMany { through, .. } => through.as_deref(),
            _ => None,
        }
    }

    fn relation_kind(&self) -> Option<RelationKind> {
        match &self.kind {
            FieldKind::Scalar { .. } => None,
            FieldKind::ForwardRelation { kind, .. } | FieldKind::ReverseRelation { kind, .. } => {
                Some(*kind)
            }
            FieldKind::ManyToMany { .. } => Some(RelationKind::ManyToMany),
        }
    }

    pub fn is_one_to_one(&self) -> bool {
        self.relation_kind() == Some(RelationKind::OneToOne)
    }

    pub fn is_one_to_many(&self) -> bool {
        self.relation_kind() == Some(RelationKind::OneToMany)
    }

    pub fn is_many_to_many(&self) -> bool {
        self.relation_kind() == Some(RelationKind::ManyToMany)
    }
}

/// A declared record type backed by a storage table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    pub name: String,
    /// Namespace (application) the entity belongs to
    pub app_label: String,
    /// Storage identifier
    pub table: String,
    pub fields: Vec<FieldDeclaration>,
    /// Synthesized join entities are not documented on their own
    pub auto_created: bool,
}

impl EntityType {
    pub fn new(
        name: impl Into<String>,
        app_label: impl Into<String>,
        table: impl Into<String>,
        fields: Vec<FieldDeclaration>,
    ) -> Self {
        Self {
            name: name.into(),
            app_label: app_label.into(),
            table: table.into(),
            fields,
            auto_created: false,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDeclaration> {
        self.fields.iter().find(|f| f.name == name)
    }
}
