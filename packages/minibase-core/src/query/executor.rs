//! Nested-loop evaluation of a [`LogicalPlan`].
//!
//! Every intermediate relation is held in memory. Cross products are
//! computed in full before any filter runs; there is no predicate pushdown.

use std::fmt;
use std::path::PathBuf;

use crate::config::EngineConfig;
use crate::error::{DbError, QueryError};
use crate::storage::BlockStore;
use crate::types::{FieldDescriptor, Row, Value};

use super::plan::{Column, FieldRef, LogicalPlan, Operand, Predicate};

/// Output of a query: `table.field` headers and the selected values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultSet {
    pub header: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl fmt::Display for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.header.join(" | "))?;
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(Value::to_string).collect();
            writeln!(f, "{}", cells.join(" | "))?;
        }
        Ok(())
    }
}

/// Column of a working relation, attributed to its source table.
#[derive(Debug, Clone)]
struct Attribute {
    table: String,
    field: FieldDescriptor,
}

#[derive(Debug, Clone, Default)]
struct Relation {
    attributes: Vec<Attribute>,
    rows: Vec<Row>,
}

impl Relation {
    /// Index of the single attribute `reference` names.
    fn resolve(&self, reference: &FieldRef) -> Result<usize, QueryError> {
        let mut matches = self.attributes.iter().enumerate().filter(|(_, a)| {
            a.field.name() == reference.field
                && reference.table.as_deref().map_or(true, |t| t == a.table)
        });
        match (matches.next(), matches.next()) {
            (Some((index, _)), None) => Ok(index),
            _ => Err(QueryError::AmbiguousOrUnknownField {
                reference: reference.to_string(),
            }),
        }
    }

    fn header(&self) -> Vec<String> {
        self.attributes
            .iter()
            .map(|a| format!("{}.{}", a.table, a.field.name()))
            .collect()
    }
}

/// A predicate resolved against a relation.
enum Condition {
    Literal(usize, Value),
    Columns(usize, usize),
}

impl Condition {
    fn holds(&self, row: &Row) -> bool {
        match self {
            Condition::Literal(i, value) => row[*i].loosely_equals(value),
            Condition::Columns(a, b) => row[*a].loosely_equals(&row[*b]),
        }
    }
}

/// Evaluates plans against the tables in a data directory.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    data_dir: PathBuf,
}

impl QueryExecutor {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
        }
    }

    /// Evaluates `plan` bottom-up. Any resolution or coercion failure aborts
    /// the whole query.
    pub fn evaluate(&self, plan: &LogicalPlan) -> Result<ResultSet, DbError> {
        let relation = self.relation(plan)?;
        tracing::debug!(
            "Query produced {} rows of {} columns",
            relation.rows.len(),
            relation.attributes.len()
        );
        Ok(ResultSet {
            header: relation.header(),
            rows: relation.rows,
        })
    }

    fn relation(&self, plan: &LogicalPlan) -> Result<Relation, DbError> {
        match plan {
            LogicalPlan::TableRef(name) => self.load(name),
            LogicalPlan::Cross(children) => {
                let mut children = children.iter();
                // no input tables: an empty relation, not an error
                let Some(first) = children.next() else {
                    return Ok(Relation::default());
                };
                let mut acc = self.relation(first)?;
                for child in children {
                    acc = cross(acc, self.relation(child)?);
                }
                Ok(acc)
            }
            LogicalPlan::Filter { input, predicates } => {
                let relation = self.relation(input)?;
                filter(relation, predicates)
            }
            LogicalPlan::Project { input, columns } => {
                let relation = self.relation(input)?;
                Ok(project(relation, columns)?)
            }
        }
    }

    /// Loads every row of `table` through a short-lived store.
    fn load(&self, table: &str) -> Result<Relation, DbError> {
        let store = BlockStore::open_existing(&self.data_dir, table)?;
        let attributes = store
            .fields()
            .iter()
            .map(|field| Attribute {
                table: store.table().to_string(),
                field: field.clone(),
            })
            .collect();
        let rows = store.scan().iter().map(|r| r.values.clone()).collect();
        store.close()?;
        Ok(Relation { attributes, rows })
    }
}

fn cross(left: Relation, right: Relation) -> Relation {
    let mut attributes = left.attributes;
    attributes.extend(right.attributes);
    let mut rows = Vec::with_capacity(left.rows.len() * right.rows.len());
    for l in &left.rows {
        for r in &right.rows {
            let mut row = l.clone();
            row.extend(r.iter().cloned());
            rows.push(row);
        }
    }
    Relation { attributes, rows }
}

fn filter(mut relation: Relation, predicates: &[Predicate]) -> Result<Relation, DbError> {
    let mut conditions = Vec::with_capacity(predicates.len());
    for predicate in predicates {
        let left = relation.resolve(&predicate.left)?;
        let condition = match &predicate.right {
            Operand::Field(reference) => Condition::Columns(left, relation.resolve(reference)?),
            Operand::Literal(literal) => {
                let field = &relation.attributes[left].field;
                let value = Value::parse(field.field_type(), literal).ok_or_else(|| {
                    QueryError::LiteralCoercion {
                        field: predicate.left.to_string(),
                        literal: literal.clone(),
                        expected: field.field_type().name(),
                    }
                })?;
                Condition::Literal(left, value)
            }
        };
        conditions.push(condition);
    }
    relation
        .rows
        .retain(|row| conditions.iter().all(|c| c.holds(row)));
    Ok(relation)
}

fn project(relation: Relation, columns: &[Column]) -> Result<Relation, QueryError> {
    let mut selected = Vec::new();
    for column in columns {
        match column {
            Column::Star => selected.extend(0..relation.attributes.len()),
            Column::Field(reference) => selected.push(relation.resolve(reference)?),
        }
    }
    Ok(Relation {
        attributes: selected
            .iter()
            .map(|&i| relation.attributes[i].clone())
            .collect(),
        rows: relation
            .rows
            .iter()
            .map(|row| selected.iter().map(|&i| row[i].clone()).collect())
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::plan::PlanBuilder;
    use crate::types::FieldType;
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> EngineConfig {
        let config = EngineConfig::with_data_dir(dir.path());
        let a = vec![
            FieldDescriptor::new("id", FieldType::Integer, 4).unwrap(),
            FieldDescriptor::new("name", FieldType::FixedString, 8).unwrap(),
        ];
        let b = vec![
            FieldDescriptor::new("id", FieldType::Integer, 4).unwrap(),
            FieldDescriptor::new("a_id", FieldType::Integer, 4).unwrap(),
        ];
        let mut store = BlockStore::open(&config.data_dir, "A", Some(&a)).unwrap();
        store.insert(&["1", "x"]).unwrap();
        store.insert(&["2", "y"]).unwrap();
        store.close().unwrap();
        let mut store = BlockStore::open(&config.data_dir, "B", Some(&b)).unwrap();
        store.insert(&["10", "1"]).unwrap();
        store.insert(&["20", "2"]).unwrap();
        store.close().unwrap();
        config
    }

    #[test]
    fn test_cross_size() {
        let dir = TempDir::new().unwrap();
        let config = setup(&dir);
        let plan = PlanBuilder::select(&["*"], &["A", "B"], Vec::new());
        let result = QueryExecutor::new(&config).evaluate(&plan).unwrap();
        assert_eq!(result.len(), 4);
        assert_eq!(result.header, vec!["A.id", "A.name", "B.id", "B.a_id"]);
    }

    #[test]
    fn test_literal_filter_with_bare_field() {
        let dir = TempDir::new().unwrap();
        let config = setup(&dir);
        let plan = PlanBuilder::select(&["name"], &["A"], vec![Predicate::equals("id", " 2 ")]);
        let result = QueryExecutor::new(&config).evaluate(&plan).unwrap();
        assert_eq!(result.header, vec!["A.name"]);
        assert_eq!(result.rows, vec![vec![Value::Text("y".to_string())]]);
    }

    #[test]
    fn test_bare_field_in_two_tables_is_ambiguous() {
        let dir = TempDir::new().unwrap();
        let config = setup(&dir);
        let plan = PlanBuilder::select(&["id"], &["A", "B"], Vec::new());
        assert!(matches!(
            QueryExecutor::new(&config).evaluate(&plan),
            Err(DbError::Query(QueryError::AmbiguousOrUnknownField { .. }))
        ));
    }

    #[test]
    fn test_literal_coercion_failure() {
        let dir = TempDir::new().unwrap();
        let config = setup(&dir);
        let plan = PlanBuilder::select(&["*"], &["A"], vec![Predicate::equals("A.id", "one")]);
        assert!(matches!(
            QueryExecutor::new(&config).evaluate(&plan),
            Err(DbError::Query(QueryError::LiteralCoercion { .. }))
        ));
    }

    #[test]
    fn test_empty_cross() {
        let dir = TempDir::new().unwrap();
        let config = setup(&dir);
        let executor = QueryExecutor::new(&config);
        let result = executor.evaluate(&LogicalPlan::Cross(Vec::new())).unwrap();
        assert!(result.is_empty());
        assert!(result.header.is_empty());

        let star = LogicalPlan::Cross(Vec::new()).project(vec![Column::Star]);
        assert!(executor.evaluate(&star).unwrap().is_empty());
    }

    #[test]
    fn test_display() {
        let result = ResultSet {
            header: vec!["A.name".to_string(), "B.id".to_string()],
            rows: vec![vec![Value::Text("x".to_string()), Value::Integer(10)]],
        };
        assert_eq!(result.to_string(), "A.name | B.id\nx | 10\n");
    }
}
