//! Cross, filter and project composition over stored tables.

use minibase_core::config::EngineConfig;
use minibase_core::error::{DbError, QueryError, StorageError};
use minibase_core::query::{Column, FieldRef, LogicalPlan, PlanBuilder, Predicate, QueryExecutor};
use minibase_core::storage::BlockStore;
use minibase_core::types::{FieldDescriptor, FieldType, Value};
use ntest::timeout;

use super::helpers::temp_config;

fn create(config: &EngineConfig, table: &str, fields: &[(&str, FieldType, u32)], rows: &[&[&str]]) {
    let fields: Vec<FieldDescriptor> = fields
        .iter()
        .map(|(name, ty, len)| FieldDescriptor::new(*name, *ty, *len).unwrap())
        .collect();
    let mut store = BlockStore::open(&config.data_dir, table, Some(&fields)).unwrap();
    for row in rows {
        store.insert(row).unwrap();
    }
    store.close().unwrap();
}

fn setup_ab(config: &EngineConfig) {
    create(
        config,
        "A",
        &[("id", FieldType::Integer, 4), ("name", FieldType::FixedString, 6)],
        &[&["1", "x"], &["2", "y"]],
    );
    create(
        config,
        "B",
        &[("id", FieldType::Integer, 4), ("a_id", FieldType::Integer, 4)],
        &[&["10", "1"], &["20", "2"]],
    );
}

#[timeout(2000)]
#[test]
fn test_join_filter_project() {
    let (_dir, config) = temp_config();
    setup_ab(&config);

    let plan = LogicalPlan::cross(vec![LogicalPlan::table("A"), LogicalPlan::table("B")])
        .filter(vec![Predicate::join("A.id", "B.a_id")])
        .project(vec![
            Column::Field(FieldRef::parse("A.name")),
            Column::Field(FieldRef::parse("B.id")),
        ]);
    let result = QueryExecutor::new(&config).evaluate(&plan).unwrap();

    assert_eq!(result.header, vec!["A.name", "B.id"]);
    assert_eq!(
        result.rows,
        vec![
            vec![Value::Text("x".to_string()), Value::Integer(10)],
            vec![Value::Text("y".to_string()), Value::Integer(20)],
        ]
    );
}

#[timeout(2000)]
#[test]
fn test_join_plus_literal_conjunction() {
    let (_dir, config) = temp_config();
    setup_ab(&config);

    let plan = PlanBuilder::select(
        &["B.id"],
        &["A", "B"],
        vec![Predicate::join("A.id", "B.a_id"), Predicate::equals("name", "y")],
    );
    let result = QueryExecutor::new(&config).evaluate(&plan).unwrap();
    assert_eq!(result.rows, vec![vec![Value::Integer(20)]]);
}

#[timeout(2000)]
#[test]
fn test_star_expands_in_table_order() {
    let (_dir, config) = temp_config();
    setup_ab(&config);
    create(
        &config,
        "C",
        &[("flag", FieldType::Boolean, 1)],
        &[&["true"], &["false"], &["true"]],
    );

    let plan = PlanBuilder::select(&["*"], &["A", "B", "C"], vec![Predicate::equals("C.flag", "t")]);
    let result = QueryExecutor::new(&config).evaluate(&plan).unwrap();
    assert_eq!(result.header, vec!["A.id", "A.name", "B.id", "B.a_id", "C.flag"]);
    assert_eq!(result.len(), 2 * 2 * 2);
    assert!(result.rows.iter().all(|r| r[4] == Value::Boolean(true)));
}

#[timeout(2000)]
#[test]
fn test_unresolvable_references() {
    let (_dir, config) = temp_config();
    setup_ab(&config);
    let executor = QueryExecutor::new(&config);

    let ambiguous = PlanBuilder::select(&["*"], &["A", "B"], vec![Predicate::equals("id", "1")]);
    assert!(matches!(
        executor.evaluate(&ambiguous),
        Err(DbError::Query(QueryError::AmbiguousOrUnknownField { .. }))
    ));

    let unknown = PlanBuilder::select(&["A.missing"], &["A"], Vec::new());
    assert!(matches!(
        executor.evaluate(&unknown),
        Err(DbError::Query(QueryError::AmbiguousOrUnknownField { .. }))
    ));

    let wrong_table = PlanBuilder::select(&["B.name"], &["A", "B"], Vec::new());
    assert!(executor.evaluate(&wrong_table).is_err());

    let missing = PlanBuilder::select(&["*"], &["Z"], Vec::new());
    assert!(matches!(
        executor.evaluate(&missing),
        Err(DbError::Storage(StorageError::TableNotFound(_)))
    ));
}

#[timeout(2000)]
#[test]
fn test_filter_with_no_matches_is_empty() {
    let (_dir, config) = temp_config();
    setup_ab(&config);
    let plan = PlanBuilder::select(&["A.name"], &["A"], vec![Predicate::equals("A.id", "3")]);
    let result = QueryExecutor::new(&config).evaluate(&plan).unwrap();
    assert!(result.is_empty());
    assert_eq!(result.to_string(), "A.name\n");
}
