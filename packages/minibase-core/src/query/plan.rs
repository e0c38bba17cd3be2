//! Logical plan tree.

use std::fmt;

/// Reference to a field, optionally qualified by its table (`movie.title`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub table: Option<String>,
    pub field: String,
}

impl FieldRef {
    /// Parses `table.field` or a bare `field`.
    pub fn parse(reference: &str) -> Self {
        match reference.trim().split_once('.') {
            Some((table, field)) => Self {
                table: Some(table.trim().to_string()),
                field: field.trim().to_string(),
            },
            None => Self {
                table: None,
                field: reference.trim().to_string(),
            },
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.field),
            None => f.write_str(&self.field),
        }
    }
}

/// Right-hand side of an equality predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// Coerced to the left field's type before comparing
    Literal(String),
    Field(FieldRef),
}

/// `left = right`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub left: FieldRef,
    pub right: Operand,
}

impl Predicate {
    /// `field = 'literal'`
    pub fn equals(field: &str, literal: &str) -> Self {
        Self {
            left: FieldRef::parse(field),
            right: Operand::Literal(literal.to_string()),
        }
    }

    /// `left = right`, both field references.
    pub fn join(left: &str, right: &str) -> Self {
        Self {
            left: FieldRef::parse(left),
            right: Operand::Field(FieldRef::parse(right)),
        }
    }
}

/// Output column of a projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    /// Every field of every input table, in table order
    Star,
    Field(FieldRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalPlan {
    TableRef(String),
    Cross(Vec<LogicalPlan>),
    Filter {
        input: Box<LogicalPlan>,
        predicates: Vec<Predicate>,
    },
    Project {
        input: Box<LogicalPlan>,
        columns: Vec<Column>,
    },
}

impl LogicalPlan {
    pub fn table(name: &str) -> Self {
        LogicalPlan::TableRef(name.trim().to_string())
    }

    pub fn cross(children: Vec<LogicalPlan>) -> Self {
        LogicalPlan::Cross(children)
    }

    /// Wraps `self` in a conjunctive filter.
    pub fn filter(self, predicates: Vec<Predicate>) -> Self {
        LogicalPlan::Filter {
            input: Box::new(self),
            predicates,
        }
    }

    pub fn project(self, columns: Vec<Column>) -> Self {
        LogicalPlan::Project {
            input: Box::new(self),
            columns,
        }
    }
}

/// Builds the canonical `Project(Filter(Cross(...)))` tree of a
/// select-from-where statement.
pub struct PlanBuilder;

impl PlanBuilder {
    /// `select_list` entries are field references or `*`; an empty list
    /// also means `*`. Three or more tables nest left-deep:
    /// `Cross(Cross(A, B), C)`. The filter is omitted when `where_list` is
    /// empty.
    pub fn select(select_list: &[&str], from_list: &[&str], where_list: Vec<Predicate>) -> LogicalPlan {
        let mut tables = from_list.iter().map(|t| LogicalPlan::table(t));
        let mut from = match (tables.next(), tables.next()) {
            (None, _) => LogicalPlan::Cross(Vec::new()),
            (Some(first), None) => LogicalPlan::Cross(vec![first]),
            (Some(first), Some(second)) => LogicalPlan::Cross(vec![first, second]),
        };
        for table in tables {
            from = LogicalPlan::Cross(vec![from, table]);
        }

        let filtered = if where_list.is_empty() {
            from
        } else {
            from.filter(where_list)
        };

        let columns: Vec<Column> = if select_list.is_empty() {
            vec![Column::Star]
        } else {
            select_list
                .iter()
                .map(|c| match c.trim() {
                    "*" => Column::Star,
                    other => Column::Field(FieldRef::parse(other)),
                })
                .collect()
        };
        filtered.project(columns)
    }
}
