//! Schema reflection
//!
//! Turns a registry into a relationship-aware metadata document: tables,
//! fields, types, foreign key linkage and many-to-many join details. The
//! traversal only reads structural metadata and never fails; anything that
//! cannot be resolved is left out of the document.

use super::entity::{EntityType, FieldDeclaration, FieldKind, RelationKind};
use super::registry::Registry;
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::debug;

/// Join column of a many-to-many through entity
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ThroughFieldDescriptor {
    pub field_name: String,
    pub column_name: Option<String>,
    pub related_model: String,
    pub related_table: String,
}

/// Reflected metadata of a single field
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub is_relation: bool,
    pub related_model: Option<String>,
    pub related_type: Option<RelationKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub through_table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub through_fields: Option<Vec<ThroughFieldDescriptor>>,
}

/// Reflected metadata of an entity
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct EntityMetadata {
    pub table: String,
    pub fields: Vec<FieldMetadata>,
}

impl EntityMetadata {
    pub fn field(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Entity name to metadata, in registry order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataDocument {
    entities: Vec<(String, EntityMetadata)>,
}

impl MetadataDocument {
    pub fn get(&self, entity: &str) -> Option<&EntityMetadata> {
        self.entities
            .iter()
            .find(|(name, _)| name == entity)
            .map(|(_, metadata)| metadata)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntityMetadata)> {
        self.entities.iter().map(|(name, metadata)| (name.as_str(), metadata))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl Serialize for MetadataDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, metadata) in self.iter() {
            map.serialize_entry(name, metadata)?;
        }
        map.end()
    }
}

/// Relationship kind of a field, checked in a fixed order:
/// one-to-one, then one-to-many, then many-to-many.
pub fn classify_relation(field: &FieldDeclaration) -> Option<RelationKind> {
    if field.is_one_to_one() {
        Some(RelationKind::OneToOne)
    } else if field.is_one_to_many() {
        Some(RelationKind::OneToMany)
    } else if field.is_many_to_many() {
        Some(RelationKind::ManyToMany)
    } else {
        None
    }
}

/// Reflect every entity of one application namespace.
///
/// Auto-created join entities are skipped; entities from other namespaces
/// only show up as `related_model` references.
pub fn reflect(registry: &Registry, app_label: &str) -> MetadataDocument {
    let entities: Vec<(String, EntityMetadata)> = registry
        .app_entities(app_label)
        .filter(|entity| !entity.auto_created)
        .map(|entity| (entity.name.clone(), reflect_entity(registry, entity)))
        .collect();

    debug!(
        "Reflected {} entities in '{}' with {} fields",
        entities.len(),
        app_label,
        entities.iter().map(|(_, e)| e.fields.len()).sum::<usize>()
    );

    MetadataDocument { entities }
}

fn reflect_entity(registry: &Registry, entity: &EntityType) -> EntityMetadata {
    EntityMetadata {
        table: entity.table.clone(),
        fields: entity
            .fields
            .iter()
            .map(|field| reflect_field(registry, entity, field))
            .collect(),
    }
}

fn reflect_field(registry: &Registry, owner: &EntityType, field: &FieldDeclaration) -> FieldMetadata {
    let related = field.related_entity().and_then(|name| registry.get(name));

    let mut metadata = FieldMetadata {
        name: field.name.clone(),
        field_type: field.internal_type().to_string(),
        is_relation: field.is_relation(),
        related_model: related.map(|e| e.name.clone()),
        related_type: classify_relation(field),
        local_column: None,
        target_column: None,
        related_table: None,
        through_table: None,
        through_fields: None,
    };

    match &field.kind {
        FieldKind::ForwardRelation {
            kind: RelationKind::OneToOne | RelationKind::OneToMany,
            local_column,
            target_field,
            ..
        } if !field.auto_created => {
            metadata.local_column = Some(local_column.clone());

            let target = related.zip(target_field.as_deref()).and_then(|(related, target)| {
                related
                    .field(target)
                    .and_then(|f| f.column())
                    .map(|column| (column, &related.table))
            });
            if let Some((column, table)) = target {
                metadata.target_column = Some(column.to_string());
                metadata.related_table = Some(table.clone());
            }
        }
        FieldKind::ManyToMany {
            related: target,
            through: Some(through),
        } => {
            if let Some(through) = registry.get(through) {
                metadata.through_table = Some(through.table.clone());
                metadata.through_fields = Some(through_fields(registry, owner, target, through));
            }
        }
        _ => {}
    }

    metadata
}

/// Relation fields of `through` that point at either side of the association
fn through_fields(
    registry: &Registry,
    owner: &EntityType,
    target: &str,
    through: &EntityType,
) -> Vec<ThroughFieldDescriptor> {
    through
        .fields
        .iter()
        .filter(|f| f.is_relation())
        .filter_map(|f| {
            let related_name = f.related_entity()?;
            if related_name != owner.name && related_name != target {
                return None;
            }
            let related = registry.get(related_name)?;
            Some(ThroughFieldDescriptor {
                field_name: f.name.clone(),
                column_name: f.column().map(str::to_string),
                related_model: related.name.clone(),
                related_table: related.table.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::entity::ScalarKind;
    use crate::schema::registry::{EntityDecl, Relation, RegistryBuilder, SELF_REFERENCE};
    use pretty_assertions::assert_eq;

    fn scenario_category_product() -> Registry {
        RegistryBuilder::new("core")
            .entity(
                EntityDecl::new("Category")
                    .field("name", ScalarKind::Char)
                    .field("slug", ScalarKind::Slug),
            )
            .entity(
                EntityDecl::new("Product")
                    .relation(Relation::foreign_key("category", "Category"))
                    .field("name", ScalarKind::Char),
            )
            .build()
            .unwrap()
    }

    fn scenario_orders() -> Registry {
        RegistryBuilder::new("core")
            .entity(
                EntityDecl::new("Order")
                    .relation(Relation::many_to_many("products", "Product").through("OrderItem")),
            )
            .entity(
                EntityDecl::new("OrderItem")
                    .relation(Relation::foreign_key("order", "Order"))
                    .relation(Relation::foreign_key("product", "Product"))
                    .field("quantity", ScalarKind::PositiveInteger),
            )
            .entity(EntityDecl::new("Product").field("name", ScalarKind::Char))
            .build()
            .unwrap()
    }

    #[test]
    fn test_classify_relation() {
        let fk = FieldDeclaration::forward("category", RelationKind::OneToMany, "Category", "category_id", None);
        let one = FieldDeclaration::forward("details", RelationKind::OneToOne, "ProductDetail", "details_id", None);
        let reverse = FieldDeclaration::reverse("product", RelationKind::OneToOne, "Product");
        let m2m = FieldDeclaration::many_to_many("tags", "Tag", None);
        let scalar = FieldDeclaration::scalar("name", ScalarKind::Char);

        assert_eq!(classify_relation(&fk), Some(RelationKind::OneToMany));
        assert_eq!(classify_relation(&one), Some(RelationKind::OneToOne));
        assert_eq!(classify_relation(&reverse), Some(RelationKind::OneToOne));
        assert_eq!(classify_relation(&m2m), Some(RelationKind::ManyToMany));
        assert_eq!(classify_relation(&scalar), None);
    }

    #[test]
    fn test_foreign_key_forward_and_reverse() {
        let registry = scenario_category_product();
        let document = reflect(&registry, "core");

        let category = document.get("Product").unwrap().field("category").unwrap();
        assert_eq!(
            category,
            &FieldMetadata {
                name: "category".to_string(),
                field_type: "ForeignKey".to_string(),
                is_relation: true,
                related_model: Some("Category".to_string()),
                related_type: Some(RelationKind::OneToMany),
                local_column: Some("category_id".to_string()),
                target_column: Some("id".to_string()),
                related_table: Some("core_category".to_string()),
                through_table: None,
                through_fields: None,
            }
        );

        let reverse = document.get("Category").unwrap().field("product").unwrap();
        assert_eq!(reverse.related_type, Some(RelationKind::OneToMany));
        assert_eq!(reverse.related_model.as_deref(), Some("Product"));
        assert_eq!(reverse.local_column, None);
        assert_eq!(reverse.target_column, None);
    }

    #[test]
    fn test_field_coverage_matches_declarations() {
        let registry = scenario_orders();
        let document = reflect(&registry, "core");

        assert_eq!(document.len(), 3);
        let names: Vec<&str> = document.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Order", "OrderItem", "Product"]);
        for entity in registry.app_entities("core") {
            let metadata = document.get(&entity.name).unwrap();
            assert_eq!(metadata.fields.len(), entity.fields.len());
            assert_eq!(metadata.table, entity.table);
        }
    }

    #[test]
    fn test_auto_created_fields_have_no_columns() {
        let registry = scenario_orders();
        let document = reflect(&registry, "core");

        for entity in registry.app_entities("core") {
            for field in entity.fields.iter().filter(|f| f.auto_created && f.is_relation()) {
                let metadata = document.get(&entity.name).unwrap().field(&field.name).unwrap();
                assert!(metadata.local_column.is_none(), "{}.{}", entity.name, field.name);
                assert!(metadata.target_column.is_none(), "{}.{}", entity.name, field.name);
            }
        }
    }

    #[test]
    fn test_implicit_many_to_many() {
        let registry = RegistryBuilder::new("core")
            .entity(
                EntityDecl::new("Product")
                    .relation(Relation::many_to_many("tags", "Tag").related_name("products")),
            )
            .entity(EntityDecl::new("Tag").field("name", ScalarKind::Char))
            .build()
            .unwrap();
        let document = reflect(&registry, "core");

        // The join entity itself is not documented
        assert_eq!(document.len(), 2);
        assert!(document.get("Product_tags").is_none());

        let tags = document.get("Product").unwrap().field("tags").unwrap();
        assert_eq!(tags.related_type, Some(RelationKind::ManyToMany));
        assert_eq!(tags.local_column, None);
        assert_eq!(tags.through_table.as_deref(), Some("core_product_tags"));
        assert_eq!(
            tags.through_fields.as_deref().unwrap(),
            &[
                ThroughFieldDescriptor {
                    field_name: "product".to_string(),
                    column_name: Some("product_id".to_string()),
                    related_model: "Product".to_string(),
                    related_table: "core_product".to_string(),
                },
                ThroughFieldDescriptor {
                    field_name: "tag".to_string(),
                    column_name: Some("tag_id".to_string()),
                    related_model: "Tag".to_string(),
                    related_table: "core_tag".to_string(),
                },
            ][..]
        );

        // The reverse side carries no join details
        let products = document.get("Tag").unwrap().field("products").unwrap();
        assert_eq!(products.related_type, Some(RelationKind::ManyToMany));
        assert_eq!(products.related_model.as_deref(), Some("Product"));
        assert!(products.through_table.is_none());
        assert!(products.through_fields.is_none());
    }

    #[test]
    fn test_explicit_through_entity() {
        let registry = scenario_orders();
        let document = reflect(&registry, "core");

        let products = document.get("Order").unwrap().field("products").unwrap();
        assert_eq!(products.through_table.as_deref(), Some("core_orderitem"));

        let through: Vec<(&str, Option<&str>, &str)> = products
            .through_fields
            .as_ref()
            .unwrap()
            .iter()
            .map(|t| (t.field_name.as_str(), t.column_name.as_deref(), t.related_model.as_str()))
            .collect();
        assert_eq!(
            through,
            vec![
                ("order", Some("order_id"), "Order"),
                ("product", Some("product_id"), "Product"),
            ]
        );
    }

    #[test]
    fn test_self_referential_many_to_many() {
        let registry = RegistryBuilder::new("core")
            .entity(
                EntityDecl::new("Person")
                    .relation(Relation::many_to_many("friends", SELF_REFERENCE).related_name("friend_of")),
            )
            .build()
            .unwrap();
        let document = reflect(&registry, "core");

        let friends = document.get("Person").unwrap().field("friends").unwrap();
        let through = friends.through_fields.as_ref().unwrap();
        assert_eq!(through.len(), 2);
        assert!(through.iter().all(|t| t.related_model == "Person"));
        assert_ne!(through[0].field_name, through[1].field_name);
    }

    #[test]
    fn test_other_namespaces_are_excluded() {
        let registry = RegistryBuilder::new("core")
            .entity(EntityDecl::new("User").app_label("auth"))
            .entity(EntityDecl::new("Order").relation(Relation::foreign_key("customer", "User")))
            .build()
            .unwrap();
        let document = reflect(&registry, "core");

        assert_eq!(document.len(), 1);
        assert!(document.get("User").is_none());

        let customer = document.get("Order").unwrap().field("customer").unwrap();
        assert_eq!(customer.related_model.as_deref(), Some("User"));
        assert_eq!(customer.related_table.as_deref(), Some("auth_user"));
    }

    #[test]
    fn test_unknown_namespace_yields_empty_document() {
        let registry = scenario_orders();
        let document = reflect(&registry, "billing");

        assert!(document.is_empty());
        assert_eq!(serde_json::to_value(&document).unwrap(), serde_json::json!({}));
    }

    #[test]
    fn test_unresolvable_references_are_omitted() {
        let registry = Registry::from_entities(vec![EntityType::new(
            "Order",
            "core",
            "core_order",
            vec![
                FieldDeclaration::forward("customer", RelationKind::OneToMany, "Person", "customer_id", Some("id".to_string())),
                FieldDeclaration::many_to_many("products", "Product", Some("OrderItem".to_string())),
                FieldDeclaration::many_to_many("tags", "Tag", None),
            ],
        )]);
        let document = reflect(&registry, "core");
        let order = document.get("Order").unwrap();

        let customer = order.field("customer").unwrap();
        assert_eq!(customer.related_model, None);
        assert_eq!(customer.related_type, Some(RelationKind::OneToMany));
        assert_eq!(customer.local_column.as_deref(), Some("customer_id"));
        assert_eq!(customer.target_column, None);
        assert_eq!(customer.related_table, None);

        for name in ["products", "tags"] {
            let field = order.field(name).unwrap();
            assert_eq!(field.related_model, None);
            assert!(field.through_table.is_none());
            assert!(field.through_fields.is_none());
        }
    }

    #[test]
    fn test_document_serialization() {
        let registry = scenario_category_product();
        let json = serde_json::to_value(reflect(&registry, "core")).unwrap();

        assert_eq!(json["Category"]["table"], "core_category");

        let fields = json["Product"]["fields"].as_array().unwrap();
        let id = &fields[0];
        assert_eq!(id["name"], "id");
        assert_eq!(id["type"], "BigAutoField");
        assert_eq!(id["is_relation"], false);
        assert!(id["related_model"].is_null());
        assert!(id["related_type"].is_null());
        assert!(id.get("local_column").is_none());

        let category = &fields[1];
        assert_eq!(category["related_type"], "one_to_many");
        assert_eq!(category["local_column"], "category_id");
        assert!(category.get("through_fields").is_none());
    }
}
