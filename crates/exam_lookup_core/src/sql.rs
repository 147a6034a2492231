//! Statement text for the lookup queries.
//!
//! Identifiers only ever come from [`Table`] and [`QueryField`], so the text is
//! drawn from a closed set. The looked-up value is always a `?` placeholder
//! bound by the driver.

use crate::contract::{QueryField, Table};

pub fn count_statement(table: Table, field: QueryField) -> String {
    format!(
        "SELECT COUNT(*) AS count FROM `{}` WHERE `{}` = ?",
        table.as_str(),
        field.column()
    )
}

pub fn select_statement(table: Table, field: QueryField) -> String {
    format!(
        "SELECT * FROM `{}` WHERE `{}` = ?",
        table.as_str(),
        field.column()
    )
}
