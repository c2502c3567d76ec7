//! Engine behaviour against a scripted in-process connection.

use async_trait::async_trait;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use rowmap::driver::{Prepared, RowStream};
use rowmap::prelude::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default, Clone, PartialEq)]
struct Order {
    id: i64,
    item: String,
    total: f64,
}

impl Record for Order {
    const TABLE: &'static str = "orders";

    fn columns() -> Vec<ColumnDef<Self>> {
        vec![
            rowmap::column!(Order, id, "id", ColumnType::BigInt).primary_key(),
            rowmap::column!(Order, item, "item", ColumnType::String),
            rowmap::column!(Order, total, "total", ColumnType::Double),
        ]
    }
}

fn order(id: i64, item: &str, total: f64) -> Order {
    Order {
        id,
        item: item.to_string(),
        total,
    }
}

#[derive(Default)]
struct Script {
    rows: Vec<Vec<Value>>,
    fail_row: Option<usize>,
    fail_prepare: bool,
    fail_rollback: bool,
    delay: Option<Duration>,
}

type Log = Arc<Mutex<Vec<String>>>;

struct MockConnection {
    script: Arc<Script>,
    log: Log,
}

impl MockConnection {
    fn new(script: Script) -> (Arc<Self>, Log) {
        let log = Log::default();
        let conn = Arc::new(Self {
            script: Arc::new(script),
            log: log.clone(),
        });
        (conn, log)
    }
}

fn record(log: &Log, entry: String) {
    log.lock().unwrap().push(entry);
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[async_trait]
impl Connection for MockConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query<'a>(&'a self, sql: &'a str, args: &'a [Value], _types: &'a [ColumnType]) -> RowStream<'a> {
        record(&self.log, format!("query {} {:?}", sql, args));
        futures::stream::iter(self.script.rows.clone().into_iter().map(Ok)).boxed()
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> RowmapResult<ExecResult> {
        if let Some(delay) = self.script.delay {
            tokio::time::sleep(delay).await;
        }
        record(&self.log, format!("execute {} {:?}", sql, args));
        Ok(ExecResult {
            rows_affected: 1,
            last_insert_id: None,
        })
    }

    async fn begin(&self) -> RowmapResult<Box<dyn Transaction>> {
        record(&self.log, "begin".to_string());
        Ok(Box::new(MockTransaction {
            script: self.script.clone(),
            log: self.log.clone(),
            executed: 0,
        }))
    }
}

struct MockTransaction {
    script: Arc<Script>,
    log: Log,
    executed: usize,
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn prepare(&mut self, sql: &str) -> RowmapResult<Prepared> {
        record(&self.log, format!("prepare {}", sql));
        if self.script.fail_prepare {
            return Err(RowmapError::Execution("syntax error".into()));
        }
        Ok(Prepared::new(0, sql))
    }

    async fn execute_prepared(&mut self, _stmt: &Prepared, args: &[Value]) -> RowmapResult<ExecResult> {
        let row = self.executed;
        self.executed += 1;
        record(&self.log, format!("exec {:?}", args));
        if self.script.fail_row == Some(row) {
            return Err(RowmapError::Execution(format!("row {} rejected", row)));
        }
        Ok(ExecResult {
            rows_affected: 1,
            last_insert_id: Some(row as i64 + 1),
        })
    }

    async fn commit(self: Box<Self>) -> RowmapResult<()> {
        record(&self.log, "commit".to_string());
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> RowmapResult<()> {
        record(&self.log, "rollback".to_string());
        if self.script.fail_rollback {
            return Err(RowmapError::Execution("connection lost".into()));
        }
        Ok(())
    }
}

fn database(conn: Arc<MockConnection>) -> Database {
    Database::new(conn).with_registry(Arc::new(Registry::new()))
}

const INSERT_SQL: &str = "INSERT INTO orders(id,item,total) VALUES ($1,$2,$3);";

#[tokio::test]
async fn test_batch_insert_commits_once() {
    let (conn, log) = MockConnection::new(Script::default());
    let db = database(conn);

    let batch = db.compile_batch_insert::<Order>(&[]).unwrap();
    let results = batch
        .run(&[order(1, "pen", 1.5), order(2, "ink", 3.0), order(3, "pad", 2.25)])
        .await
        .unwrap();

    let ids: Vec<Option<i64>> = results.iter().map(|r| r.last_insert_id).collect();
    assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);

    let log = entries(&log);
    assert_eq!(log.first().map(String::as_str), Some("begin"));
    assert_eq!(log[1], format!("prepare {}", INSERT_SQL));
    assert_eq!(log.iter().filter(|e| e.starts_with("exec ")).count(), 3);
    assert_eq!(log.iter().filter(|e| *e == "commit").count(), 1);
    assert_eq!(log.last().map(String::as_str), Some("commit"));
    assert!(!log.contains(&"rollback".to_string()));
}

#[tokio::test]
async fn test_batch_insert_stops_at_first_failure() {
    let (conn, log) = MockConnection::new(Script {
        fail_row: Some(1),
        ..Script::default()
    });
    let db = database(conn);

    let batch = db.compile_batch_insert::<Order>(&[]).unwrap();
    let err = batch
        .run(&[order(1, "pen", 1.5), order(2, "ink", 3.0), order(3, "pad", 2.25)])
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Execution error: row 1 rejected");
    let log = entries(&log);
    assert_eq!(log.iter().filter(|e| e.starts_with("exec ")).count(), 2);
    assert_eq!(log.last().map(String::as_str), Some("rollback"));
    assert!(!log.contains(&"commit".to_string()));
}

#[tokio::test]
async fn test_batch_insert_reports_failed_rollback() {
    let (conn, _log) = MockConnection::new(Script {
        fail_row: Some(0),
        fail_rollback: true,
        ..Script::default()
    });
    let db = database(conn);

    let batch = db.compile_batch_insert::<Order>(&[]).unwrap();
    let err = batch.run(&[order(1, "pen", 1.5)]).await.unwrap_err();

    assert!(matches!(err, RowmapError::Rollback { .. }));
    assert_eq!(
        err.to_string(),
        "Execution error: row 0 rejected & rollback failed due to: Execution error: connection lost"
    );
}

#[tokio::test]
async fn test_batch_insert_prepare_failure_rolls_back() {
    let (conn, log) = MockConnection::new(Script {
        fail_prepare: true,
        ..Script::default()
    });
    let db = database(conn);

    let batch = db.compile_batch_insert::<Order>(&["id"]).unwrap();
    let err = batch.run(&[order(1, "pen", 1.5)]).await.unwrap_err();

    assert_eq!(err.to_string(), "Execution error: syntax error");
    assert_eq!(
        entries(&log),
        vec![
            "begin".to_string(),
            "prepare INSERT INTO orders(id) VALUES ($1);".to_string(),
            "rollback".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_batch_insert_empty() {
    let (conn, log) = MockConnection::new(Script::default());
    let db = database(conn);

    let results = db.compile_batch_insert::<Order>(&[]).unwrap().run(&[]).await.unwrap();
    assert!(results.is_empty());
    assert_eq!(entries(&log).last().map(String::as_str), Some("commit"));
}

#[tokio::test]
async fn test_insert_binds_in_column_order() {
    let (conn, log) = MockConnection::new(Script::default());
    let db = database(conn);

    let insert = db.compile_insert::<Order>(&["total", "id"]).unwrap();
    assert_eq!(insert.sql(), "INSERT INTO orders(total,id) VALUES ($1,$2);");

    let result = insert.run(&order(9, "pen", 4.5)).await.unwrap();
    assert_eq!(result.rows_affected, 1);
    assert_eq!(
        entries(&log),
        vec!["execute INSERT INTO orders(total,id) VALUES ($1,$2); [Double(4.5), BigInt(9)]".to_string()]
    );
}

#[tokio::test]
async fn test_query_scans_rows() {
    let (conn, log) = MockConnection::new(Script {
        rows: vec![
            vec![Value::BigInt(1), Value::Double(1.5)],
            vec![Value::BigInt(2), Value::Double(3.0)],
        ],
        ..Script::default()
    });
    let db = database(conn);

    let query = db
        .compile_query::<Order>(&[Filter::eq("item", "pen")], &["id", "total"])
        .unwrap();
    assert_eq!(query.sql(), "SELECT id,total FROM orders WHERE item = $1;");

    let orders = query.run().await.unwrap();
    assert_eq!(orders, vec![order(1, "", 1.5), order(2, "", 3.0)]);
    assert_eq!(
        entries(&log),
        vec![r#"query SELECT id,total FROM orders WHERE item = $1; [String("pen")]"#.to_string()]
    );
}

#[tokio::test]
async fn test_query_scan_error_discards_results() {
    let (conn, _log) = MockConnection::new(Script {
        rows: vec![
            vec![Value::BigInt(1), Value::Double(1.5)],
            vec![Value::String("two".into()), Value::Double(3.0)],
        ],
        ..Script::default()
    });
    let db = database(conn);

    let query = db.compile_query::<Order>(&[], &["id", "total"]).unwrap();
    let err = query.run().await.unwrap_err();
    assert!(matches!(
        err,
        RowmapError::TypeMismatch {
            expected: ColumnType::BigInt,
            ..
        }
    ));

    let table = db.table::<Order>().unwrap();
    assert_eq!(table.pool().idle(), 2);
}

#[tokio::test]
async fn test_query_without_rows() {
    let (conn, _log) = MockConnection::new(Script::default());
    let db = database(conn);
    let orders = db.compile_query::<Order>(&[], &[]).unwrap().run().await.unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
async fn test_statement_timeout() {
    let (conn, _log) = MockConnection::new(Script {
        delay: Some(Duration::from_millis(500)),
        ..Script::default()
    });
    let db = database(conn).with_statement_timeout(Some(Duration::from_millis(20)));

    let insert = db.compile_insert::<Order>(&[]).unwrap();
    let err = insert.run(&order(1, "pen", 1.5)).await.unwrap_err();
    assert!(matches!(err, RowmapError::Timeout(20)));
}

#[tokio::test]
async fn test_compiled_operations_keep_their_connection() {
    let (first, first_log) = MockConnection::new(Script::default());
    let (second, second_log) = MockConnection::new(Script::default());
    let db = database(first);

    let insert = db.compile_insert::<Order>(&[]).unwrap();
    let swapped = db.with_connection(second);
    insert.run(&order(1, "pen", 1.5)).await.unwrap();
    assert_eq!(entries(&first_log).len(), 1);

    swapped.compile_insert::<Order>(&[]).unwrap().run(&order(2, "ink", 2.0)).await.unwrap();
    assert_eq!(entries(&second_log).len(), 1);
}

#[tokio::test]
async fn test_create_and_drop_use_connection_dialect() {
    let (conn, log) = MockConnection::new(Script::default());
    let db = database(conn);

    db.create_table::<Order>().await.unwrap();
    db.drop_table::<Order>().await.unwrap();
    assert_eq!(
        entries(&log),
        vec![
            "execute CREATE TABLE IF NOT EXISTS orders (id INTEGER,item TEXT,total REAL); []".to_string(),
            "execute DROP TABLE IF EXISTS orders; []".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_from_config_requires_url() {
    let err = Database::from_config(&Config::default()).await.err().unwrap();
    assert!(matches!(err, RowmapError::NotInitialized));
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_with_config_selects_registry() {
    let (conn, _log) = MockConnection::new(Script::default());

    let shared = Config {
        pool_max_idle: 8,
        ..Config::default()
    };
    let db = Database::with_config(conn.clone(), &shared);
    assert!(Arc::ptr_eq(&db.registry(), &Registry::global()));

    let private = Config {
        shared_registry: false,
        pool_max_idle: 1,
        ..Config::default()
    };
    let db = Database::with_config(conn, &private);
    assert!(!Arc::ptr_eq(&db.registry(), &Registry::global()));

    let table = db.table::<Order>().unwrap();
    table.pool().release_all([order(1, "a", 1.0), order(2, "b", 2.0)]);
    assert_eq!(table.pool().idle(), 1);
}
