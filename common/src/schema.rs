//! Column tables for each entity.
//!
//! One `EntitySchema` per table is the single source of truth for projection
//! order, insert fields and response redaction. The identity column is always
//! the first field.

use serde_json::Value;

use crate::record::Record;
use crate::value::SqlValue;

/// How a column participates in reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// Store-assigned primary key. Read, never written.
    Identity,
    /// Ordinary column. Read and written.
    Data,
    /// Written and readable by the core, stripped before a record leaves it.
    Secret,
    /// Filled in by the store on insert (e.g. a default timestamp). Read only.
    StoreAssigned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub role: FieldRole,
}

impl Field {
    pub const fn identity(name: &'static str) -> Self {
        Self {
            name,
            role: FieldRole::Identity,
        }
    }

    pub const fn data(name: &'static str) -> Self {
        Self {
            name,
            role: FieldRole::Data,
        }
    }

    pub const fn secret(name: &'static str) -> Self {
        Self {
            name,
            role: FieldRole::Secret,
        }
    }

    pub const fn store_assigned(name: &'static str) -> Self {
        Self {
            name,
            role: FieldRole::StoreAssigned,
        }
    }

    /// Whether the caller supplies this column on insert.
    pub const fn is_writable(&self) -> bool {
        matches!(self.role, FieldRole::Data | FieldRole::Secret)
    }
}

/// Table name plus its ordered column descriptors.
#[derive(Debug)]
pub struct EntitySchema {
    pub table: &'static str,
    pub fields: &'static [Field],
}

impl EntitySchema {
    /// Projection list, identity first.
    pub fn columns(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    /// Identity column name.
    pub fn identity(&self) -> &'static str {
        self.fields.first().map(|f| f.name).unwrap_or_default()
    }

    /// Columns the caller supplies on insert, in projection order.
    pub fn insert_fields(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| f.is_writable())
            .map(|f| f.name)
            .collect()
    }

    /// Positional insert values taken from a JSON payload. Missing keys bind as NULL.
    pub fn insert_values(&self, payload: &Record) -> Vec<SqlValue> {
        self.insert_fields()
            .into_iter()
            .map(|name| payload.get(name).map(SqlValue::from).unwrap_or(SqlValue::Null))
            .collect()
    }

    /// Remove every secret column from a record.
    pub fn redact(&self, record: &mut Record) {
        for field in self.fields.iter().filter(|f| f.role == FieldRole::Secret) {
            record.shift_remove(field.name);
        }
    }

    /// Whether a payload carries a non-null value for `name`.
    pub fn has_value(payload: &Record, name: &str) -> bool {
        !matches!(payload.get(name), None | Some(Value::Null))
    }
}

pub const PRODUCT_ID: &str = "ProductID";

pub const USER_ID: &str = "userID";
pub const USERNAME: &str = "Username";
pub const PASSWORD: &str = "Password";

pub const IMPACT_USER: &str = "UserID";
pub const IMPACT_GHG: &str = "GHG";
pub const IMPACT_WATER: &str = "Water";
pub const IMPACT_TIME: &str = "ImpactTime";

pub static PRODUCTS: EntitySchema = EntitySchema {
    table: "Products",
    fields: &[
        Field::identity(PRODUCT_ID),
        Field::data("ProductName"),
        Field::data("ProductCategory"),
        Field::data("ProductImage"),
    ],
};

pub static PRODUCT_INFORMATION: EntitySchema = EntitySchema {
    table: "ProductInformation",
    fields: &[
        Field::identity("InformationID"),
        Field::data("Product_Biodegradable"),
        Field::data("Product_GreenHouseGas"),
        Field::data("Product_WaterUse"),
        Field::data("Product_HumanHours"),
        Field::data("Product_MachineHours"),
        Field::data("Product_Biodegradable_Detailed"),
        Field::data("Product_GreenHouseGas_Detailed"),
        Field::data("Product_WaterUse_Detailed"),
        Field::data("Product_ProductionHours_Detailed"),
        Field::data(PRODUCT_ID),
    ],
};

pub static ALTERNATE_PRODUCTS: EntitySchema = EntitySchema {
    table: "AlternateProducts",
    fields: &[
        Field::identity("AlternateProductID"),
        Field::data("AlternateProductName"),
        Field::data("Product_Biodegradable"),
        Field::data("Product_GreenHouseGas"),
        Field::data("Product_WaterUse"),
        Field::data("Product_HumanHours"),
        Field::data("Product_MachineHours"),
        Field::data("Product_Biodegradable_Detailed"),
        Field::data("Product_GreenHouseGas_Detailed"),
        Field::data("Product_WaterUse_Detailed"),
        Field::data("Product_ProductionHours_Detailed"),
        Field::data("AlternateProductImage"),
        Field::data(PRODUCT_ID),
    ],
};

pub static USERS: EntitySchema = EntitySchema {
    table: "USERS",
    fields: &[
        Field::identity(USER_ID),
        Field::data(USERNAME),
        Field::data("FirstName"),
        Field::data("LastName"),
        Field::secret(PASSWORD),
    ],
};

/// Append-only impact events. Only ever inserted and summed.
pub static USER_IMPACT: EntitySchema = EntitySchema {
    table: "UserImpact",
    fields: &[
        Field::identity("ImpactID"),
        Field::data(IMPACT_USER),
        Field::data(IMPACT_GHG),
        Field::data(IMPACT_WATER),
        Field::store_assigned(IMPACT_TIME),
    ],
};

pub static ALL: [&EntitySchema; 5] = [
    &PRODUCTS,
    &PRODUCT_INFORMATION,
    &ALTERNATE_PRODUCTS,
    &USERS,
    &USER_IMPACT,
];
