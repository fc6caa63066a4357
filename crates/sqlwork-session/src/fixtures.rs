//! Entity graph shared by the unit tests of this crate.

use serde::{Deserialize, Serialize};
use sqlwork_core::{
    ContentIdentity, Entity, Property, PropertyInfo, SqlType, Value, assign, primary_key_hash,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: Option<i64>,
    pub name: String,
    pub region: Option<String>,
    pub tags: Vec<String>,
    pub address: Option<Address>,
    pub orders: Vec<Order>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub address_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub number: String,
    pub total: i64,
    pub lines: Vec<OrderLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_id: Option<i64>,
    pub order_id: Option<i64>,
    pub sku: String,
    pub quantity: i32,
}

pub static CUSTOMER_PROPERTIES: [PropertyInfo; 6] = [
    PropertyInfo::new("customer_id", SqlType::BigInt)
        .column("CustomerId")
        .primary_key(true)
        .auto_generated(true),
    PropertyInfo::new("name", SqlType::VarChar(100)).column("Name"),
    PropertyInfo::new("region", SqlType::VarChar(20)).column("Region"),
    PropertyInfo::simple_list("tags", SqlType::Text).column("Tags"),
    PropertyInfo::entity("address"),
    PropertyInfo::entity_list("orders"),
];

pub static ADDRESS_PROPERTIES: [PropertyInfo; 3] = [
    PropertyInfo::new("address_id", SqlType::BigInt)
        .column("AddressId")
        .primary_key(true)
        .auto_generated(true),
    PropertyInfo::new("customer_id", SqlType::BigInt).column("CustomerId"),
    PropertyInfo::new("city", SqlType::Text).column("City"),
];

pub static ORDER_PROPERTIES: [PropertyInfo; 5] = [
    PropertyInfo::new("order_id", SqlType::BigInt)
        .column("OrderId")
        .primary_key(true)
        .auto_generated(true),
    PropertyInfo::new("customer_id", SqlType::BigInt).column("CustomerId"),
    PropertyInfo::new("number", SqlType::VarChar(20)).column("Number"),
    PropertyInfo::new("total", SqlType::BigInt).column("Total"),
    PropertyInfo::entity_list("lines"),
];

pub static LINE_PROPERTIES: [PropertyInfo; 4] = [
    PropertyInfo::new("line_id", SqlType::BigInt)
        .column("LineId")
        .primary_key(true)
        .auto_generated(true),
    PropertyInfo::new("order_id", SqlType::BigInt).column("OrderId"),
    PropertyInfo::new("sku", SqlType::VarChar(20)).column("Sku"),
    PropertyInfo::new("quantity", SqlType::Integer).column("Quantity"),
];

impl ContentIdentity for Customer {
    fn content_hash(&self) -> String {
        primary_key_hash(self)
    }
}

impl Entity for Customer {
    fn table_name(&self) -> &'static str {
        "customers"
    }

    fn properties(&self) -> &'static [PropertyInfo] {
        &CUSTOMER_PROPERTIES
    }

    fn property(&self, name: &str) -> Option<Property<'_>> {
        match name {
            "customer_id" => Some(Property::Scalar(self.customer_id.into())),
            "name" => Some(Property::Scalar(self.name.as_str().into())),
            "region" => Some(Property::Scalar(self.region.clone().into())),
            "tags" => Some(Property::Scalar(self.tags.clone().into())),
            "address" => Some(Property::Entity(
                self.address.as_ref().map(|a| a as &dyn Entity),
            )),
            "orders" => Some(Property::List(
                self.orders.iter().map(|o| o as &dyn Entity).collect(),
            )),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: Value) -> bool {
        match name {
            "customer_id" => assign(&mut self.customer_id, value),
            "name" => assign(&mut self.name, value),
            "region" => assign(&mut self.region, value),
            "tags" => assign(&mut self.tags, value),
            _ => false,
        }
    }

    fn nested_mut(&mut self, name: &str) -> Vec<&mut dyn Entity> {
        match name {
            "address" => self
                .address
                .iter_mut()
                .map(|a| a as &mut dyn Entity)
                .collect(),
            "orders" => self
                .orders
                .iter_mut()
                .map(|o| o as &mut dyn Entity)
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl ContentIdentity for Address {
    fn content_hash(&self) -> String {
        primary_key_hash(self)
    }
}

impl Entity for Address {
    fn table_name(&self) -> &'static str {
        "addresses"
    }

    fn properties(&self) -> &'static [PropertyInfo] {
        &ADDRESS_PROPERTIES
    }

    fn property(&self, name: &str) -> Option<Property<'_>> {
        match name {
            "address_id" => Some(Property::Scalar(self.address_id.into())),
            "customer_id" => Some(Property::Scalar(self.customer_id.into())),
            "city" => Some(Property::Scalar(self.city.as_str().into())),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: Value) -> bool {
        match name {
            "address_id" => assign(&mut self.address_id, value),
            "customer_id" => assign(&mut self.customer_id, value),
            "city" => assign(&mut self.city, value),
            _ => false,
        }
    }
}

impl ContentIdentity for Order {
    fn content_hash(&self) -> String {
        format!("orders:{}", self.number)
    }
}

impl Entity for Order {
    fn table_name(&self) -> &'static str {
        "orders"
    }

    fn properties(&self) -> &'static [PropertyInfo] {
        &ORDER_PROPERTIES
    }

    fn property(&self, name: &str) -> Option<Property<'_>> {
        match name {
            "order_id" => Some(Property::Scalar(self.order_id.into())),
            "customer_id" => Some(Property::Scalar(self.customer_id.into())),
            "number" => Some(Property::Scalar(self.number.as_str().into())),
            "total" => Some(Property::Scalar(self.total.into())),
            "lines" => Some(Property::List(
                self.lines.iter().map(|l| l as &dyn Entity).collect(),
            )),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: Value) -> bool {
        match name {
            "order_id" => assign(&mut self.order_id, value),
            "customer_id" => assign(&mut self.customer_id, value),
            "number" => assign(&mut self.number, value),
            "total" => assign(&mut self.total, value),
            _ => false,
        }
    }

    fn nested_mut(&mut self, name: &str) -> Vec<&mut dyn Entity> {
        match name {
            "lines" => self
                .lines
                .iter_mut()
                .map(|l| l as &mut dyn Entity)
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl ContentIdentity for OrderLine {
    fn content_hash(&self) -> String {
        format!("lines:{}", self.sku)
    }
}

impl Entity for OrderLine {
    fn table_name(&self) -> &'static str {
        "order_lines"
    }

    fn properties(&self) -> &'static [PropertyInfo] {
        &LINE_PROPERTIES
    }

    fn property(&self, name: &str) -> Option<Property<'_>> {
        match name {
            "line_id" => Some(Property::Scalar(self.line_id.into())),
            "order_id" => Some(Property::Scalar(self.order_id.into())),
            "sku" => Some(Property::Scalar(self.sku.as_str().into())),
            "quantity" => Some(Property::Scalar(self.quantity.into())),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: Value) -> bool {
        match name {
            "line_id" => assign(&mut self.line_id, value),
            "order_id" => assign(&mut self.order_id, value),
            "sku" => assign(&mut self.sku, value),
            "quantity" => assign(&mut self.quantity, value),
            _ => false,
        }
    }
}

/// `Customer{Id: null, Name: "Acme"}` with one unsaved order.
pub fn new_customer() -> Customer {
    Customer {
        customer_id: None,
        name: "Acme".to_string(),
        region: None,
        tags: Vec::new(),
        address: None,
        orders: vec![Order {
            order_id: None,
            customer_id: None,
            number: "SO-1".to_string(),
            total: 10,
            lines: Vec::new(),
        }],
    }
}

/// A persisted customer with two persisted orders, the first with one line.
pub fn saved_customer() -> Customer {
    Customer {
        customer_id: Some(1),
        name: "Acme".to_string(),
        region: Some("West".to_string()),
        tags: vec!["key".to_string()],
        address: None,
        orders: vec![
            Order {
                order_id: Some(10),
                customer_id: Some(1),
                number: "SO-10".to_string(),
                total: 25,
                lines: vec![OrderLine {
                    line_id: Some(100),
                    order_id: Some(10),
                    sku: "BOLT".to_string(),
                    quantity: 4,
                }],
            },
            Order {
                order_id: Some(11),
                customer_id: Some(1),
                number: "SO-11".to_string(),
                total: 40,
                lines: Vec::new(),
            },
        ],
    }
}

pub fn unsaved_order(number: &str, total: i64) -> Order {
    Order {
        order_id: None,
        customer_id: None,
        number: number.to_string(),
        total,
        lines: Vec::new(),
    }
}
