//! Identifier quoting per SQL dialect.
//!
//! The engine never hardcodes a quoting convention. Whenever it has to
//! express `table.field` or `field AS alias` it goes through a
//! [`FieldQuoter`], which the data store implements for its own dialect.

use sea_query::{
    MysqlQueryBuilder, PostgresQueryBuilder, QuotedBuilder, SelectStatement, SqliteQueryBuilder,
    Values,
};

/// Identifier quoting capability of a data store
///
/// Only [`quote_identifier`](FieldQuoter::quote_identifier) is required; the
/// composed forms are built from it so a store that overrides quoting gets
/// consistent qualified and aliased expressions for free.
pub trait FieldQuoter {
    /// Quote a single identifier (`title` -> `"title"` or `` `title` ``)
    fn quote_identifier(&self, name: &str) -> String;

    /// Qualified column reference: `"table"."field"`
    fn qualify(&self, table: &str, field: &str) -> String {
        format!("{}.{}", self.quote_identifier(table), self.quote_identifier(field))
    }

    /// Alias used for a selected column: `"table_field"`
    fn alias_for(&self, table: &str, field: &str) -> String {
        self.quote_identifier(&format!("{table}_{field}"))
    }

    /// Select-list item: `"table"."field" AS "table_field"`
    fn field_with_alias(&self, table: &str, field: &str) -> String {
        format!("{} AS {}", self.qualify(table, field), self.alias_for(table, field))
    }
}

/// SQL dialects with built-in quoting and statement rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlDialect {
    /// Double-quoted identifiers
    #[default]
    Postgres,
    /// Backtick-quoted identifiers
    MySql,
    /// Double-quoted identifiers
    Sqlite,
}

impl SqlDialect {
    /// Left and right quote characters as sea-query renders them
    fn quote_chars(&self) -> (char, char) {
        let quote = match self {
            SqlDialect::Postgres => PostgresQueryBuilder.quote(),
            SqlDialect::MySql => MysqlQueryBuilder.quote(),
            SqlDialect::Sqlite => SqliteQueryBuilder.quote(),
        };
        (quote.left(), quote.right())
    }

    /// Render a select statement with this dialect's builder
    pub fn build(&self, statement: &SelectStatement) -> (String, Values) {
        match self {
            SqlDialect::Postgres => statement.build(PostgresQueryBuilder),
            SqlDialect::MySql => statement.build(MysqlQueryBuilder),
            SqlDialect::Sqlite => statement.build(SqliteQueryBuilder),
        }
    }
}

impl FieldQuoter for SqlDialect {
    fn quote_identifier(&self, name: &str) -> String {
        let (left, right) = self.quote_chars();
        // Embedded closing quotes are doubled
        let escaped = name.replace(right, &format!("{right}{right}"));
        format!("{left}{escaped}{right}")
    }
}
