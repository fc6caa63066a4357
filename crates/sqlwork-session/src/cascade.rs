//! Propagation of a changed key into dependent entities.

use sqlwork_core::{Entity, PropertyKind, Value};

/// Assign `value` to every nested entity below `entity` that exposes a
/// property called `property`, walking nested entities and nested lists
/// recursively.
///
/// Returns how many entities were updated. `entity` itself is not touched.
/// Entities without the property, or whose property cannot hold the value,
/// are skipped.
pub fn cascade(entity: &mut dyn Entity, property: &str, value: &Value) -> usize {
    let mut updated = 0;
    for info in entity.properties() {
        if !matches!(info.kind, PropertyKind::Entity | PropertyKind::EntityList) {
            continue;
        }
        for child in entity.nested_mut(info.name) {
            if child.property_info(property).is_some() && child.set_property(property, value.clone())
            {
                updated += 1;
            }
            updated += cascade(child, property, value);
        }
    }
    if updated > 0 {
        tracing::trace!(
            table = entity.table_name(),
            property,
            updated,
            "Cascaded value to nested entities"
        );
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Address, new_customer, unsaved_order};

    #[test]
    fn cascades_through_lists_and_nested_entities() {
        let mut customer = new_customer();
        customer.orders.push(unsaved_order("SO-2", 5));
        customer.address = Some(Address {
            address_id: None,
            customer_id: None,
            city: "Oslo".to_string(),
        });

        let updated = cascade(&mut customer, "customer_id", &Value::BigInt(42));
        assert_eq!(updated, 3);
        assert!(customer.orders.iter().all(|o| o.customer_id == Some(42)));
        assert_eq!(customer.address.unwrap().customer_id, Some(42));
        // The entity itself is left alone.
        assert_eq!(customer.customer_id, None);
    }

    #[test]
    fn unknown_property_is_skipped() {
        let mut customer = new_customer();
        assert_eq!(cascade(&mut customer, "warehouse_id", &Value::BigInt(1)), 0);
    }

    #[test]
    fn reaches_grandchildren() {
        let mut customer = crate::fixtures::saved_customer();
        let updated = cascade(&mut customer, "order_id", &Value::BigInt(77));
        // Orders have their own order_id; lines under them get it too.
        assert_eq!(updated, 3);
        assert_eq!(customer.orders[0].lines[0].order_id, Some(77));
    }
}
