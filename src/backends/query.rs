//! Backend-agnostic description of a relational read or write filter.
//!
//! `Query` renders to PostgREST query parameters for the HTTP client and can
//! also be evaluated directly against JSON rows by the in-memory backend.

use serde_json::{Map, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOp {
    Eq(String),
    Neq(String),
    IsNull,
    NotNull,
    /// Case-insensitive match, `%` as wildcard
    ILike(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    columns: Option<Vec<String>>,
    filters: Vec<Filter>,
    order: Option<Order>,
    limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the returned columns
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn eq(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, FilterOp::Eq(value.to_string()))
    }

    pub fn neq(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, FilterOp::Neq(value.to_string()))
    }

    pub fn is_null(self, column: &str) -> Self {
        self.filter(column, FilterOp::IsNull)
    }

    pub fn not_null(self, column: &str) -> Self {
        self.filter(column, FilterOp::NotNull)
    }

    /// Substring match on `column`
    pub fn ilike(self, column: &str, needle: &str) -> Self {
        self.filter(column, FilterOp::ILike(format!("%{}%", needle)))
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn filter(mut self, column: &str, op: FilterOp) -> Self {
        self.filters.push(Filter {
            column: column.to_string(),
            op,
        });
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn get_limit(&self) -> Option<usize> {
        self.limit
    }

    /// PostgREST rendering: `col=eq.v`, `order=col.desc`, `limit=n`
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::with_capacity(self.filters.len() + 3);

        let select = self
            .columns
            .as_ref()
            .map(|c| c.join(","))
            .unwrap_or_else(|| "*".to_string());
        params.push(("select".to_string(), select));

        for filter in &self.filters {
            let rendered = match &filter.op {
                FilterOp::Eq(v) => format!("eq.{}", v),
                FilterOp::Neq(v) => format!("neq.{}", v),
                FilterOp::IsNull => "is.null".to_string(),
                FilterOp::NotNull => "not.is.null".to_string(),
                FilterOp::ILike(pattern) => format!("ilike.{}", pattern.replace('%', "*")),
            };
            params.push((filter.column.clone(), rendered));
        }

        if let Some(order) = &self.order {
            let direction = if order.ascending { "asc" } else { "desc" };
            params.push((
                "order".to_string(),
                format!("{}.{}.nullslast", order.column, direction),
            ));
        }

        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }

        params
    }

    /// Same filter semantics as the database for rows held in memory
    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|filter| {
            let field = scalar(row.get(&filter.column));
            match &filter.op {
                FilterOp::Eq(expected) => field.as_deref() == Some(expected.as_str()),
                // SQL: NULL <> x is not true
                FilterOp::Neq(expected) => {
                    field.is_some() && field.as_deref() != Some(expected.as_str())
                }
                FilterOp::IsNull => field.is_none(),
                FilterOp::NotNull => field.is_some(),
                FilterOp::ILike(pattern) => field
                    .map(|value| like_match(&pattern.to_lowercase(), &value.to_lowercase()))
                    .unwrap_or(false),
            }
        })
    }

    /// Filter, order, limit and project `rows`
    pub fn apply(&self, rows: &[Value]) -> Vec<Value> {
        let mut selected: Vec<Value> = rows.iter().filter(|r| self.matches(r)).cloned().collect();

        if let Some(order) = &self.order {
            selected.sort_by(|a, b| {
                let ordering = compare_fields(a.get(&order.column), b.get(&order.column));
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }

        match &self.columns {
            Some(columns) => selected
                .into_iter()
                .map(|row| project(&row, columns))
                .collect(),
            None => selected,
        }
    }
}

fn scalar(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// Nulls sort last regardless of direction
fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => match (scalar(a), scalar(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    }
}

fn project(row: &Value, columns: &[String]) -> Value {
    let mut projected = Map::new();
    for column in columns {
        if let Some(value) = row.get(column) {
            projected.insert(column.clone(), value.clone());
        }
    }
    Value::Object(projected)
}

fn like_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut rest = text;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(remaining) => rest = remaining,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}
