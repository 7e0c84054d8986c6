//! Owner-side preload statements.
//!
//! SQL-backed stores resolve a [`RelatedLookup`] with one statement per
//! lookup, built here. The statement always starts from the relation's
//! declaration on the owning type:
//!
//! - belongs_to: read the foreign key (and type column) off the owner rows
//! - has_one / has_many: read the related rows whose foreign key is in the
//!   owner key set, restricted to the owner's type name when the relation is
//!   `as:` a polymorphic owner
//!
//! No statement ever joins from the related table back to the owner through
//! a relation name, which a polymorphic has_many could not express.

use crate::relation::{ForeignKeyOn, RelationTarget, Schema};
use crate::store::dialect::FieldQuoter;
use crate::store::{RelatedLookup, StoreError};
use sea_query::{DynIden, Expr, ExprTrait, Query, SelectStatement};

fn iden(name: &str) -> DynIden {
    DynIden::from(name.to_string())
}

/// Build the preload statement for `lookup`
///
/// Select items are rendered through `quoter` as `"table"."column" AS
/// "table_column"`, so the column aliases follow the store's dialect.
///
/// # Errors
///
/// Returns `StoreError::QueryError` when the owner or the (single) target type
/// is not registered in `schema`, or when a has_one/has_many targets a
/// polymorphic type list.
pub fn preload_statement(
    schema: &Schema,
    lookup: &RelatedLookup,
    quoter: &dyn FieldQuoter,
) -> Result<SelectStatement, StoreError> {
    let owner = schema.get(&lookup.owner_type).ok_or_else(|| {
        StoreError::QueryError(format!("unknown owner type {}", lookup.owner_type))
    })?;
    let relation = &lookup.relation;
    let keys: Vec<sea_query::Value> =
        lookup.owners.iter().map(|id| id.key.to_sql_value()).collect();

    let mut stmt = Query::select();
    match relation.foreign_key_on() {
        ForeignKeyOn::Owner => {
            let table = owner.table.as_str();
            stmt.from(iden(table))
                .expr(Expr::cust(quoter.field_with_alias(table, &owner.primary_key)))
                .expr(Expr::cust(quoter.field_with_alias(table, &relation.foreign_key)));
            if let Some(type_column) = &relation.polymorphic_type_column {
                stmt.expr(Expr::cust(quoter.field_with_alias(table, type_column)));
            }
            stmt.and_where(Expr::col((iden(table), iden(&owner.primary_key))).is_in(keys));
        }
        ForeignKeyOn::Related => {
            let target = match &relation.target {
                RelationTarget::Type(t) => t,
                RelationTarget::Polymorphic(_) => {
                    return Err(StoreError::QueryError(format!(
                        "{} on {} cannot target a polymorphic type list",
                        relation.name, lookup.owner_type
                    )))
                }
            };
            let related = schema
                .get(target)
                .ok_or_else(|| StoreError::QueryError(format!("unknown related type {target}")))?;
            let table = related.table.as_str();
            stmt.from(iden(table))
                .expr(Expr::cust(quoter.field_with_alias(table, &related.primary_key)))
                .expr(Expr::cust(quoter.field_with_alias(table, &relation.foreign_key)))
                .and_where(Expr::col((iden(table), iden(&relation.foreign_key))).is_in(keys));
            if let Some(type_column) = &relation.polymorphic_type_column {
                stmt.and_where(
                    Expr::col((iden(table), iden(type_column))).eq(lookup.owner_type.as_str()),
                );
            }
        }
    }
    Ok(stmt)
}
