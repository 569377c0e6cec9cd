//! Entity registry
//!
//! The registry is built once at startup from declarations and is read-only
//! afterwards. The builder synthesizes everything a declaration implies but
//! does not spell out: primary keys, reverse relation fields and implicit
//! join entities for many-to-many associations.

use super::entity::{EntityType, FieldDeclaration, FieldKind, RelationKind, ScalarKind};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

/// Target name that makes a relation point at its own entity
pub const SELF_REFERENCE: &str = "self";

const DEFAULT_PRIMARY_KEY: &str = "id";

/// Malformed declarations detected while building a registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Entity '{0}' is declared more than once")]
    DuplicateEntity(String),

    #[error("Field '{field}' is declared more than once on entity '{entity}'")]
    DuplicateField { entity: String, field: String },

    #[error("Field '{entity}.{field}' refers to unknown entity '{target}'")]
    UnknownEntity {
        entity: String,
        field: String,
        target: String,
    },

    #[error("Field '{entity}.{field}' uses unknown through entity '{through}'")]
    UnknownThrough {
        entity: String,
        field: String,
        through: String,
    },

    #[error("Through entity '{through}' of '{entity}.{field}' has no relation to '{target}'")]
    ThroughMissingLink {
        entity: String,
        field: String,
        through: String,
        target: String,
    },
}

/// Immutable collection of entity types keyed by name
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entities: Vec<EntityType>,
    index: HashMap<String, usize>,
}

impl Registry {
    /// Assemble a registry from finished entity types without validating
    /// their relations. Later entities reusing a name are dropped.
    pub fn from_entities(entities: impl IntoIterator<Item = EntityType>) -> Self {
        let mut registry = Self::default();
        for entity in entities {
            if registry.index.contains_key(&entity.name) {
                continue;
            }
            registry
                .index
                .insert(entity.name.clone(), registry.entities.len());
            registry.entities.push(entity);
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<&EntityType> {
        self.index.get(name).map(|&i| &self.entities[i])
    }

    /// All entities in registration order
    pub fn entities(&self) -> impl Iterator<Item = &EntityType> {
        self.entities.iter()
    }

    /// Entities belonging to one application namespace
    pub fn app_entities<'a>(&'a self, app_label: &'a str) -> impl Iterator<Item = &'a EntityType> {
        self.entities.iter().filter(move |e| e.app_label == app_label)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelationDeclKind {
    ForeignKey,
    OneToOne,
    ManyToMany,
}

/// Relation declared on an entity
#[derive(Debug, Clone)]
pub struct Relation {
    name: String,
    kind: RelationDeclKind,
    target: String,
    related_name: Option<String>,
    through: Option<String>,
    db_column: Option<String>,
}

impl Relation {
    fn new(name: impl Into<String>, kind: RelationDeclKind, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            related_name: None,
            through: None,
            db_column: None,
        }
    }

    pub fn foreign_key(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationDeclKind::ForeignKey, target)
    }

    pub fn one_to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationDeclKind::OneToOne, target)
    }

    pub fn many_to_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationDeclKind::ManyToMany, target)
    }

    /// Name of the reverse field synthesized on the target entity
    pub fn related_name(mut self, name: impl Into<String>) -> Self {
        self.related_name = Some(name.into());
        self
    }

    /// Explicit join entity for a many-to-many relation
    pub fn through(mut self, entity: impl Into<String>) -> Self {
        self.through = Some(entity.into());
        self
    }

    /// Override the `<name>_id` column of a foreign key or one-to-one
    pub fn db_column(mut self, column: impl Into<String>) -> Self {
        self.db_column = Some(column.into());
        self
    }
}

#[derive(Debug, Clone)]
enum Member {
    Scalar { name: String, kind: ScalarKind },
    Relation(Relation),
}

/// Declaration of one entity type
#[derive(Debug, Clone)]
pub struct EntityDecl {
    name: String,
    app_label: Option<String>,
    table: Option<String>,
    primary_key: Option<(String, ScalarKind)>,
    members: Vec<Member>,
}

impl EntityDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            app_label: None,
            table: None,
            primary_key: None,
            members: Vec::new(),
        }
    }

    /// Place the entity in another namespace than the builder's default
    pub fn app_label(mut self, app_label: impl Into<String>) -> Self {
        self.app_label = Some(app_label.into());
        self
    }

    /// Override the `<app_label>_<name>` storage identifier
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Declare the primary key instead of the implicit `id`
    pub fn primary_key(mut self, name: impl Into<String>, kind: ScalarKind) -> Self {
        self.primary_key = Some((name.into(), kind));
        self
    }

    pub fn field(mut self, name: impl Into<String>, kind: ScalarKind) -> Self {
        self.members.push(Member::Scalar {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.members.push(Member::Relation(relation));
        self
    }

    fn primary_key_name(&self) -> &str {
        self.primary_key
            .as_ref()
            .map(|(name, _)| name.as_str())
            .unwrap_or(DEFAULT_PRIMARY_KEY)
    }
}

/// Builds an immutable [`Registry`] from entity declarations
#[derive(Debug, Clone)]
pub struct RegistryBuilder {
    app_label: String,
    decls: Vec<EntityDecl>,
}

impl RegistryBuilder {
    /// `app_label` is the namespace of every declaration that does not set its own
    pub fn new(app_label: impl Into<String>) -> Self {
        Self {
            app_label: app_label.into(),
            decls: Vec::new(),
        }
    }

    pub fn entity(mut self, decl: EntityDecl) -> Self {
        self.decls.push(decl);
        self
    }

    pub fn build(self) -> Result<Registry, RegistryError> {
        let mut primary_keys: HashMap<String, String> = HashMap::new();
        for decl in &self.decls {
            if primary_keys
                .insert(decl.name.clone(), decl.primary_key_name().to_string())
                .is_some()
            {
                return Err(RegistryError::DuplicateEntity(decl.name.clone()));
            }
        }

        let mut entities = Vec::new();
        // (target entity, reverse field) in forward declaration order
        let mut reverse_fields: Vec<(String, FieldDeclaration)> = Vec::new();

        for decl in &self.decls {
            let app_label = decl.app_label.as_deref().unwrap_or(&self.app_label);
            let table = decl
                .table
                .clone()
                .unwrap_or_else(|| default_table(app_label, &decl.name));

            let mut fields = vec![match &decl.primary_key {
                Some((name, kind)) => FieldDeclaration::scalar(name.clone(), *kind),
                None => FieldDeclaration::scalar(DEFAULT_PRIMARY_KEY, ScalarKind::AutoId).auto_created(),
            }];
            let mut m2m_fields = Vec::new();
            let mut m2m_reverse = Vec::new();
            let mut through_entities = Vec::new();

            for member in &decl.members {
                let relation = match member {
                    Member::Scalar { name, kind } => {
                        fields.push(FieldDeclaration::scalar(name.clone(), *kind));
                        continue;
                    }
                    Member::Relation(relation) => relation,
                };

                let target = resolve_target(decl, relation, &primary_keys)?;
                let reverse_name = relation
                    .related_name
                    .clone()
                    .unwrap_or_else(|| decl.name.to_lowercase());

                match relation.kind {
                    RelationDeclKind::ForeignKey | RelationDeclKind::OneToOne => {
                        let kind = if relation.kind == RelationDeclKind::OneToOne {
                            RelationKind::OneToOne
                        } else {
                            RelationKind::OneToMany
                        };
                        let column = relation
                            .db_column
                            .clone()
                            .unwrap_or_else(|| format!("{}_id", relation.name));
                        fields.push(FieldDeclaration::forward(
                            relation.name.clone(),
                            kind,
                            target.clone(),
                            column,
                            primary_keys.get(&target).cloned(),
                        ));
                        reverse_fields.push((
                            target,
                            FieldDeclaration::reverse(reverse_name, kind, decl.name.clone()),
                        ));
                    }
                    RelationDeclKind::ManyToMany => {
                        let through = match &relation.through {
                            Some(through) if primary_keys.contains_key(through) => through.clone(),
                            Some(through) => {
                                return Err(RegistryError::UnknownThrough {
                                    entity: decl.name.clone(),
                                    field: relation.name.clone(),
                                    through: through.clone(),
                                });
                            }
                            None => {
                                let through = implicit_through(
                                    &decl.name,
                                    app_label,
                                    &table,
                                    &relation.name,
                                    &target,
                                    &primary_keys,
                                );
                                let name = through.name.clone();
                                through_entities.push(through);
                                name
                            }
                        };
                        m2m_fields.push(FieldDeclaration::many_to_many(
                            relation.name.clone(),
                            target.clone(),
                            Some(through),
                        ));
                        m2m_reverse.push((
                            target,
                            FieldDeclaration::reverse(
                                reverse_name,
                                RelationKind::ManyToMany,
                                decl.name.clone(),
                            ),
                        ));
                    }
                }
            }

            fields.extend(m2m_fields);
            reverse_fields.extend(m2m_reverse);
            entities.push(EntityType::new(
                decl.name.clone(),
                app_label,
                table,
                fields,
            ));
            entities.extend(through_entities);
        }

        let mut names = HashSet::new();
        for entity in &entities {
            if !names.insert(entity.name.as_str()) {
                return Err(RegistryError::DuplicateEntity(entity.name.clone()));
            }
        }

        let registry = Registry::from_entities(entities);
        check_through_links(&registry)?;

        let entities = registry.entities.into_iter().map(|mut entity| {
            let mut fields: Vec<FieldDeclaration> = reverse_fields
                .iter()
                .filter(|(target, _)| *target == entity.name)
                .map(|(_, field)| field.clone())
                .collect();
            fields.append(&mut entity.fields);
            entity.fields = fields;
            entity
        });
        let registry = Registry::from_entities(entities);

        for entity in registry.entities() {
            let mut seen = HashSet::new();
            for field in &entity.fields {
                if !seen.insert(field.name.as_str()) {
                    return Err(RegistryError::DuplicateField {
                        entity: entity.name.clone(),
                        field: field.name.clone(),
                    });
                }
            }
        }

        debug!(
            "Built registry with {} entities ({} reverse fields)",
            registry.len(),
            reverse_fields.len()
        );

        Ok(registry)
    }
}

fn default_table(app_label: &str, entity: &str) -> String {
    format!("{}_{}", app_label, entity.to_lowercase())
}

fn resolve_target(
    decl: &EntityDecl,
    relation: &Relation,
    primary_keys: &HashMap<String, String>,
) -> Result<String, RegistryError> {
    if relation.target == SELF_REFERENCE {
        return Ok(decl.name.clone());
    }
    if primary_keys.contains_key(&relation.target) {
        Ok(relation.target.clone())
    } else {
        Err(RegistryError::UnknownEntity {
            entity: decl.name.clone(),
            field: relation.name.clone(),
            target: relation.target.clone(),
        })
    }
}

/// Join entity for a many-to-many relation declared without `through`.
///
/// Holds one foreign key per side; a self-referential association uses
/// `from_<entity>` and `to_<entity>` to keep the two names apart.
fn implicit_through(
    owner: &str,
    app_label: &str,
    owner_table: &str,
    field: &str,
    target: &str,
    primary_keys: &HashMap<String, String>,
) -> EntityType {
    let owner_lower = owner.to_lowercase();
    let target_lower = target.to_lowercase();
    let (source_name, target_name) = if owner == target {
        (format!("from_{}", owner_lower), format!("to_{}", target_lower))
    } else {
        (owner_lower, target_lower)
    };

    let link = |name: String, related: &str| {
        let column = format!("{}_id", name);
        FieldDeclaration::forward(
            name,
            RelationKind::OneToMany,
            related,
            column,
            primary_keys.get(related).cloned(),
        )
    };

    let mut through = EntityType::new(
        format!("{}_{}", owner, field),
        app_label,
        format!("{}_{}", owner_table, field),
        vec![
            FieldDeclaration::scalar(DEFAULT_PRIMARY_KEY, ScalarKind::AutoId).auto_created(),
            link(source_name, owner),
            link(target_name, target),
        ],
    );
    through.auto_created = true;
    through
}

/// Every join entity must link back to both sides of its association
/// through foreign keys or one-to-one columns
fn check_through_links(registry: &Registry) -> Result<(), RegistryError> {
    for entity in registry.entities() {
        for field in &entity.fields {
            let (Some(through_name), Some(target)) = (field.through_entity(), field.related_entity())
            else {
                continue;
            };
            let Some(through) = registry.get(through_name) else {
                continue;
            };

            let links: Vec<&str> = through
                .fields
                .iter()
                .filter_map(|f| match &f.kind {
                    FieldKind::ForwardRelation { related, .. } => Some(related.as_str()),
                    _ => None,
                })
                .collect();
            let count = |name: &str| links.iter().filter(|&&l| l == name).count();

            let missing = if entity.name == target {
                (count(target) < 2).then_some(target)
            } else if count(&entity.name) == 0 {
                Some(entity.name.as_str())
            } else if count(target) == 0 {
                Some(target)
            } else {
                None
            };

            if let Some(missing) = missing {
                return Err(RegistryError::ThroughMissingLink {
                    entity: entity.name.clone(),
                    field: field.name.clone(),
                    through: through_name.to_string(),
                    target: missing.to_string(),
                });
            }
        }
    }
    Ok(())
}
