mod common;

use csv_steward::dataset::{Column, ColumnData, Dataset};
use csv_steward::optimize::optimize;
use csv_steward::persistence::{
    PersistenceError, PersistenceGateway, QueryOutcome, QueryResult, SqliteGateway, TableName,
};

use common::{TestWorkspace, accounts};

fn rows(outcome: QueryOutcome) -> QueryResult {
    match outcome {
        QueryOutcome::Rows(result) => result,
        other => panic!("expected rows, got {other:?}"),
    }
}

#[test]
fn save_replaces_the_table() {
    let mut gateway = SqliteGateway::open_in_memory().unwrap();
    let table = TableName::from_upload("Q1 Report.csv").unwrap();
    let mut dataset = accounts();
    optimize(&mut dataset);

    let message = gateway.save(&dataset, &table).unwrap();
    assert_eq!(message, "Data saved to `q1_report` successfully.");

    dataset.remove_columns(&["notes"]);
    gateway.save(&dataset, &table).unwrap();

    let result = rows(gateway.query("SELECT * FROM q1_report ORDER BY customer_id").unwrap());
    assert_eq!(result.columns, vec!["customer_id".to_string(), "balance".to_string()]);
    assert_eq!(
        result.rows,
        vec![
            vec![Some("1".to_string()), Some("1000".to_string())],
            vec![Some("2".to_string()), Some("1000".to_string())],
            vec![Some("3".to_string()), Some("250".to_string())],
        ]
    );
    assert_eq!(gateway.list_tables().unwrap(), vec!["q1_report".to_string()]);
}

#[test]
fn column_affinity_follows_the_type_category() {
    let mut gateway = SqliteGateway::open_in_memory().unwrap();
    let dataset = Dataset::new(vec![
        Column::new("active", ColumnData::Boolean(vec![Some(true), None])),
        Column::new("rate", ColumnData::Float32(vec![Some(0.5), Some(f32::NAN)])),
        Column::new(
            "label",
            ColumnData::Text(vec![Some("a \"quoted\" label".into()), None]),
        ),
    ])
    .unwrap();
    let table = TableName::from_upload("mixed.tsv").unwrap();
    gateway.save(&dataset, &table).unwrap();

    let result = rows(
        gateway
            .query("SELECT typeof(active), typeof(rate), typeof(label), active, rate FROM mixed")
            .unwrap(),
    );
    assert_eq!(
        result.rows[0],
        vec![
            Some("integer".to_string()),
            Some("real".to_string()),
            Some("text".to_string()),
            Some("1".to_string()),
            Some("0.5".to_string()),
        ]
    );
    assert_eq!(result.rows[1][3], None);
    assert_eq!(result.rows[1][4], None);
}

#[test]
fn statements_without_results_report_no_rows() {
    let mut gateway = SqliteGateway::open_in_memory().unwrap();
    gateway
        .save(&accounts(), &TableName::from_upload("accounts.csv").unwrap())
        .unwrap();

    let outcome = gateway
        .query("UPDATE accounts SET balance = 0 WHERE customer_id = 3")
        .unwrap();
    assert_eq!(outcome, QueryOutcome::NoRows { affected: 1 });

    let empty = rows(gateway.query("SELECT * FROM accounts WHERE balance > 5000").unwrap());
    assert_eq!(empty.columns.len(), 3);
    assert!(empty.rows.is_empty());
}

#[test]
fn malformed_sql_is_a_query_error() {
    let mut gateway = SqliteGateway::open_in_memory().unwrap();
    let err = gateway.query("SELEC nonsense").unwrap_err();
    assert!(matches!(err, PersistenceError::Query(_)));
}

#[test]
fn saved_tables_survive_reopening() {
    let workspace = TestWorkspace::new();
    let db = workspace.path().join("store.db");
    {
        let mut gateway = SqliteGateway::open(&db).unwrap();
        gateway
            .save(&accounts(), &TableName::from_upload("accounts.csv").unwrap())
            .unwrap();
    }
    let mut gateway = SqliteGateway::open(&db).unwrap();
    let result = rows(gateway.query("SELECT count(*) AS n FROM accounts").unwrap());
    assert_eq!(result.rows, vec![vec![Some("3".to_string())]]);
}

#[test]
fn datasets_without_columns_cannot_be_saved() {
    let mut gateway = SqliteGateway::open_in_memory().unwrap();
    let err = gateway
        .save(&Dataset::default(), &TableName::from_upload("blank.csv").unwrap())
        .unwrap_err();
    assert!(matches!(err, PersistenceError::Save { .. }));
}

#[test]
fn only_single_statements_are_run() {
    let mut gateway = SqliteGateway::open_in_memory().unwrap();

    let err = gateway
        .query("CREATE TABLE t(a); CREATE TABLE u(b)")
        .unwrap_err();
    assert_eq!(
        err,
        PersistenceError::Query("only one SQL statement can run at a time".into())
    );

    gateway
        .save(&accounts(), &TableName::from_upload("accounts.csv").unwrap())
        .unwrap();
    let err = gateway
        .query("SELECT 1 AS x; DROP TABLE accounts")
        .unwrap_err();
    assert!(matches!(err, PersistenceError::Query(_)));
    assert_eq!(gateway.list_tables().unwrap(), vec!["accounts".to_string()]);

    let trailing = rows(gateway.query("SELECT count(*) FROM accounts;  ").unwrap());
    assert_eq!(trailing.rows, vec![vec![Some("3".to_string())]]);
}

#[test]
fn blank_sql_is_refused_with_a_clear_message() {
    let mut gateway = SqliteGateway::open_in_memory().unwrap();
    for sql in ["", "   \n", "-- just a comment"] {
        let err = gateway.query(sql).unwrap_err();
        assert_eq!(err.to_string(), "Query Error: no SQL statement to run");
    }
}
