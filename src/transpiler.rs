//! SQL template compiler.
//!
//! Renders statement text from a table descriptor, an optional column subset
//! and (for selects) a filter list. Compilation is total: any descriptor set
//! produces a statement. Identifiers are written verbatim, unquoted.

use crate::column::ColumnDescriptor;
use crate::dialect::Dialect;
use crate::filter::Filter;
use crate::table::TableDescriptor;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Statement text plus the columns and filters that produced it.
pub struct Template<T> {
    sql: String,
    columns: Vec<Arc<ColumnDescriptor<T>>>,
    filters: Vec<Filter>,
}

impl<T> Template<T> {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Columns in placeholder (insert) or projection (select) order.
    pub fn columns(&self) -> &[Arc<ColumnDescriptor<T>>] {
        &self.columns
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Filter values in placeholder order.
    pub fn filter_values(&self) -> Vec<Value> {
        self.filters.iter().map(|f| f.value.clone()).collect()
    }
}

impl<T> fmt::Display for Template<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

impl<T> fmt::Debug for Template<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("sql", &self.sql)
            .field("columns", &self.columns)
            .field("filters", &self.filters)
            .finish()
    }
}

/// `SELECT <cols> FROM [<schema>.]<table> [WHERE <col> = $1 AND ...];`
pub fn build_select<T>(table: &TableDescriptor<T>, filters: &[Filter], columns: &[&str]) -> Template<T> {
    let defines = table.select_columns(columns);

    let mut sql = String::from("SELECT ");
    sql.push_str(&column_list(&defines));
    sql.push_str(" FROM ");
    sql.push_str(&table.qualified_name());

    if !filters.is_empty() {
        sql.push_str(" WHERE ");
        let conditions: Vec<String> = filters
            .iter()
            .enumerate()
            .map(|(idx, f)| f.to_sql(idx + 1))
            .collect();
        sql.push_str(&conditions.join(" AND "));
    }
    sql.push(';');

    Template {
        sql,
        columns: defines,
        filters: filters.to_vec(),
    }
}

/// `INSERT INTO [<schema>.]<table>(<cols>) VALUES ($1,...,$n);`
pub fn build_insert<T>(table: &TableDescriptor<T>, columns: &[&str]) -> Template<T> {
    let defines = table.select_columns(columns);
    let placeholders: Vec<String> = (1..=defines.len()).map(|n| format!("${}", n)).collect();

    let mut sql = String::from("INSERT INTO ");
    sql.push_str(&table.qualified_name());
    sql.push('(');
    sql.push_str(&column_list(&defines));
    sql.push_str(") VALUES (");
    sql.push_str(&placeholders.join(","));
    sql.push_str(");");

    Template {
        sql,
        columns: defines,
        filters: Vec::new(),
    }
}

/// `CREATE TABLE IF NOT EXISTS [<schema>.]<table> (<col> <type>,...);`
pub fn build_create_table<T>(table: &TableDescriptor<T>, dialect: Dialect) -> Template<T> {
    let defs: Vec<String> = table
        .columns()
        .iter()
        .map(|c| format!("{} {}", c.name(), dialect.resolve(c.column_type())))
        .collect();

    let mut sql = String::from("CREATE TABLE IF NOT EXISTS ");
    sql.push_str(&table.qualified_name());
    sql.push_str(" (");
    sql.push_str(&defs.join(","));
    sql.push_str(");");

    Template {
        sql,
        columns: table.columns().to_vec(),
        filters: Vec::new(),
    }
}

/// `DROP TABLE IF EXISTS [<schema>.]<table>;`
pub fn build_drop_table<T>(table: &TableDescriptor<T>) -> Template<T> {
    let mut sql = String::from("DROP TABLE IF EXISTS ");
    sql.push_str(&table.qualified_name());
    sql.push(';');

    Template {
        sql,
        columns: Vec::new(),
        filters: Vec::new(),
    }
}

fn column_list<T>(columns: &[Arc<ColumnDescriptor<T>>]) -> String {
    columns.iter().map(|c| c.name()).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{ColumnDef, ColumnType};
    use crate::table::Record;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Order {
        id: u64,
        user_id: i64,
        total: f64,
        paid: bool,
    }

    impl Record for Order {
        const TABLE: &'static str = "orders";

        fn columns() -> Vec<ColumnDef<Self>> {
            vec![
                crate::column!(Order, id, "id", ColumnType::BigUint).primary_key(),
                crate::column!(Order, user_id, "user_id", ColumnType::BigInt).indexed(),
                crate::column!(Order, total, "total", ColumnType::Double),
                crate::column!(Order, paid, "paid", ColumnType::Boolean),
            ]
        }
    }

    fn orders() -> TableDescriptor<Order> {
        TableDescriptor::for_record().unwrap()
    }

    fn shop_orders() -> TableDescriptor<Order> {
        TableDescriptor::build(Some("shop"), "orders", Order::columns()).unwrap()
    }

    #[test]
    fn test_select_all() {
        assert_eq!(
            build_select(&orders(), &[], &[]).sql(),
            "SELECT id,user_id,total,paid FROM orders;"
        );
    }

    #[test]
    fn test_select_subset_with_schema() {
        assert_eq!(
            build_select(&shop_orders(), &[], &["total", "id"]).sql(),
            "SELECT total,id FROM shop.orders;"
        );
    }

    #[test]
    fn test_select_with_filters() {
        let filters = [Filter::eq("user_id", 7i64), Filter::eq("paid", true)];
        let tpl = build_select(&orders(), &filters, &["id"]);
        assert_eq!(tpl.sql(), "SELECT id FROM orders WHERE user_id = $1 AND paid = $2;");
        assert_eq!(tpl.filter_values(), vec![Value::BigInt(7), Value::Boolean(true)]);
    }

    #[test]
    fn test_select_drops_unknown_columns() {
        assert_eq!(
            build_select(&orders(), &[], &["id", "missing", "paid"]).sql(),
            "SELECT id,paid FROM orders;"
        );
    }

    #[test]
    fn test_insert_all() {
        let tpl = build_insert(&orders(), &[]);
        assert_eq!(
            tpl.sql(),
            "INSERT INTO orders(id,user_id,total,paid) VALUES ($1,$2,$3,$4);"
        );
        assert_eq!(tpl.columns().len(), 4);
    }

    #[test]
    fn test_insert_subset() {
        assert_eq!(
            build_insert(&shop_orders(), &["user_id", "total"]).sql(),
            "INSERT INTO shop.orders(user_id,total) VALUES ($1,$2);"
        );
    }

    #[test]
    fn test_create_sqlite() {
        assert_eq!(
            build_create_table(&orders(), Dialect::Sqlite).sql(),
            "CREATE TABLE IF NOT EXISTS orders (id INTEGER,user_id INTEGER,total REAL,paid INTEGER);"
        );
    }

    #[test]
    fn test_create_postgres() {
        assert_eq!(
            build_create_table(&shop_orders(), Dialect::Postgres).sql(),
            "CREATE TABLE IF NOT EXISTS shop.orders (id BIGINT,user_id BIGINT,total DOUBLE PRECISION,paid BOOLEAN);"
        );
    }

    #[test]
    fn test_drop() {
        assert_eq!(build_drop_table(&orders()).sql(), "DROP TABLE IF EXISTS orders;");
        assert_eq!(build_drop_table(&shop_orders()).sql(), "DROP TABLE IF EXISTS shop.orders;");
    }
}
