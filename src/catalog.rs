//! Core application catalog
//!
//! Entity declarations of the `core` application: people, the product
//! catalog and orders.

use crate::schema::{EntityDecl, Registry, RegistryBuilder, RegistryError, Relation, ScalarKind, SELF_REFERENCE};

/// Namespace the catalog entities are declared in
pub const CORE_APP_LABEL: &str = "core";

/// Build the registry holding every `core` entity
pub fn core_registry() -> Result<Registry, RegistryError> {
    RegistryBuilder::new(CORE_APP_LABEL)
        .entity(
            EntityDecl::new("Person")
                .field("name", ScalarKind::Char)
                .field("age", ScalarKind::Integer)
                .field("bio", ScalarKind::Text)
                .field("email", ScalarKind::Email)
                .field("website", ScalarKind::Url)
                .field("salary", ScalarKind::Decimal)
                .field("is_active", ScalarKind::Boolean)
                .field("birth_date", ScalarKind::Date)
                .field("created_at", ScalarKind::DateTime)
                .field("updated_at", ScalarKind::DateTime)
                .field("profile_image", ScalarKind::Image)
                .field("file_attachment", ScalarKind::File)
                .field("uuid", ScalarKind::Uuid)
                .field("ip_address", ScalarKind::IpAddress),
        )
        .entity(
            EntityDecl::new("Category")
                .field("name", ScalarKind::Char)
                .field("slug", ScalarKind::Slug),
        )
        .entity(
            EntityDecl::new("Product")
                .relation(Relation::foreign_key("category", "Category").related_name("products"))
                .relation(Relation::many_to_many("tags", "Tag").related_name("products"))
                .relation(Relation::one_to_one("details", "ProductDetail"))
                .field("name", ScalarKind::Char)
                .field("price", ScalarKind::Decimal)
                .field("description", ScalarKind::Text),
        )
        .entity(EntityDecl::new("Tag").field("name", ScalarKind::Char))
        .entity(
            EntityDecl::new("ProductDetail")
                .field("sku", ScalarKind::Char)
                .field("manufacturer", ScalarKind::Char)
                .field("condition", ScalarKind::Char)
                .field("stock", ScalarKind::PositiveInteger)
                .field("specifications", ScalarKind::Json),
        )
        .entity(
            EntityDecl::new("Order")
                .relation(Relation::foreign_key("parent_order", SELF_REFERENCE))
                .relation(Relation::foreign_key("customer", "Person"))
                .relation(Relation::many_to_many("products", "Product").through("OrderItem"))
                .field("total", ScalarKind::Decimal)
                .field("processing_time", ScalarKind::Duration),
        )
        .entity(
            EntityDecl::new("OrderItem")
                .relation(Relation::foreign_key("order", "Order"))
                .relation(Relation::foreign_key("product", "Product"))
                .field("quantity", ScalarKind::PositiveInteger)
                .field("price_at_time", ScalarKind::Decimal),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{reflect, RelationKind};
    use pretty_assertions::assert_eq;

    fn field_names(registry: &Registry, entity: &str) -> Vec<String> {
        registry
            .get(entity)
            .unwrap()
            .fields
            .iter()
            .map(|f| f.name.clone())
            .collect()
    }

    #[test]
    fn test_catalog_builds() {
        let registry = core_registry().unwrap();
        let documented: Vec<&str> = registry
            .app_entities(CORE_APP_LABEL)
            .filter(|e| !e.auto_created)
            .map(|e| e.name.as_str())
            .collect();

        assert_eq!(
            documented,
            vec!["Person", "Category", "Product", "Tag", "ProductDetail", "Order", "OrderItem"]
        );
        assert!(registry.get("Product_tags").unwrap().auto_created);
    }

    #[test]
    fn test_catalog_field_layout() {
        let registry = core_registry().unwrap();

        assert_eq!(field_names(&registry, "Category"), vec!["products", "id", "name", "slug"]);
        assert_eq!(
            field_names(&registry, "Product"),
            vec!["order", "orderitem", "id", "category", "details", "name", "price", "description", "tags"]
        );
        assert_eq!(
            field_names(&registry, "Order"),
            vec!["order", "orderitem", "id", "parent_order", "customer", "total", "processing_time", "products"]
        );
        assert_eq!(field_names(&registry, "ProductDetail")[0], "product");
    }

    #[test]
    fn test_catalog_document() {
        let registry = core_registry().unwrap();
        let document = reflect(&registry, CORE_APP_LABEL);
        assert_eq!(document.len(), 7);

        let person = document.get("Person").unwrap();
        assert_eq!(person.table, "core_person");
        assert_eq!(person.field("email").unwrap().field_type, "CharField");
        assert_eq!(person.field("ip_address").unwrap().field_type, "GenericIPAddressField");

        let customers = person.field("order").unwrap();
        assert_eq!(customers.related_model.as_deref(), Some("Order"));
        assert_eq!(customers.related_type, Some(RelationKind::OneToMany));

        let details = document.get("Product").unwrap().field("details").unwrap();
        assert_eq!(details.field_type, "OneToOneField");
        assert_eq!(details.related_type, Some(RelationKind::OneToOne));
        assert_eq!(details.local_column.as_deref(), Some("details_id"));
        assert_eq!(details.related_table.as_deref(), Some("core_productdetail"));

        let parent = document.get("Order").unwrap().field("parent_order").unwrap();
        assert_eq!(parent.related_model.as_deref(), Some("Order"));
        assert_eq!(parent.local_column.as_deref(), Some("parent_order_id"));
        assert_eq!(parent.related_table.as_deref(), Some("core_order"));

        let products = document.get("Order").unwrap().field("products").unwrap();
        assert_eq!(products.through_table.as_deref(), Some("core_orderitem"));
        let names: Vec<&str> = products
            .through_fields
            .as_ref()
            .unwrap()
            .iter()
            .map(|t| t.field_name.as_str())
            .collect();
        assert_eq!(names, vec!["order", "product"]);
    }
}
