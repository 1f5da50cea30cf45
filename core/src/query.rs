//! Structured queries and their translation into HTTP access patterns.
//!
//! # Design
//! A query's conditions form an explicit tree of `And`, `Or` and `Leaf`
//! nodes. Translation inspects that tree to choose between:
//!
//! - a single-resource fetch at `{collection}/{key}`, used only for the
//!   narrow shape `limit = 1 AND key = K`;
//! - a collection fetch at `{collection}` with request parameters.
//!
//! A collection fetch is always correct because the caller re-filters the
//! parsed records with [`Query::filter_records`]; the key fetch is an
//! optimization. Parameters are hints to the server and never the authority.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::endpoint::Params;
use crate::schema::{AttributeMap, Schema, Value};

/// Comparison applied by a leaf condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// `field <operator> value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

impl Comparison {
    fn matches(&self, attributes: &AttributeMap) -> bool {
        let actual = attributes.get(&self.field).unwrap_or(&Value::Null);
        let Some(ordering) = actual.partial_cmp_value(&self.value) else {
            return false;
        };
        match self.operator {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Gte => ordering != Ordering::Less,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Lte => ordering != Ordering::Greater,
        }
    }
}

/// Condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Leaf(Comparison),
}

impl Condition {
    pub fn compare(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Condition::Leaf(Comparison {
            field: field.into(),
            operator,
            value: value.into(),
        })
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, Operator::Eq, value)
    }

    /// Whether `attributes` satisfy the condition. An empty `And` matches
    /// everything, an empty `Or` nothing.
    pub fn matches(&self, attributes: &AttributeMap) -> bool {
        match self {
            Condition::And(operands) => operands.iter().all(|c| c.matches(attributes)),
            Condition::Or(operands) => operands.iter().any(|c| c.matches(attributes)),
            Condition::Leaf(comparison) => comparison.matches(attributes),
        }
    }

    /// True when any leaf anywhere in the tree targets a key field.
    fn mentions_key(&self, schema: &Schema) -> bool {
        match self {
            Condition::And(operands) | Condition::Or(operands) => {
                operands.iter().any(|c| c.mentions_key(schema))
            }
            Condition::Leaf(comparison) => schema.is_key(&comparison.field),
        }
    }

    /// Equality leaves in conjunctive position, in tree order. `Or`
    /// subtrees are skipped.
    fn conjunctive_equalities<'a>(&'a self, out: &mut Vec<&'a Comparison>) {
        match self {
            Condition::And(operands) => {
                for operand in operands {
                    operand.conjunctive_equalities(out);
                }
            }
            Condition::Or(_) => {}
            Condition::Leaf(comparison) => {
                if comparison.operator == Operator::Eq {
                    out.push(comparison);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

/// A read request against one schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    schema: Arc<Schema>,
    conditions: Condition,
    limit: Option<usize>,
    offset: usize,
    order: Vec<Order>,
}

impl Query {
    /// Unscoped query: every record of the schema.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            conditions: Condition::And(Vec::new()),
            limit: None,
            offset: 0,
            order: Vec::new(),
        }
    }

    /// AND another condition onto the top level.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions = match self.conditions {
            Condition::And(mut operands) => {
                operands.push(condition);
                Condition::And(operands)
            }
            other => Condition::And(vec![other, condition]),
        };
        self
    }

    /// Replace the whole condition tree.
    pub fn with_conditions(mut self, conditions: Condition) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn order(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order.push(Order {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn conditions(&self) -> &Condition {
        &self.conditions
    }

    /// The key value for a direct resource fetch.
    ///
    /// Only `limit = 1` with a top-level `And` holding exactly one operand,
    /// an equality on the schema's single key field, qualifies. Any other
    /// shape yields `None`.
    pub fn extract_key(&self) -> Option<&Value> {
        if self.limit != Some(1) || self.schema.key().count() != 1 {
            return None;
        }
        let Condition::And(operands) = &self.conditions else {
            return None;
        };
        match operands.as_slice() {
            [Condition::Leaf(comparison)]
                if comparison.operator == Operator::Eq
                    && self.schema.is_key(&comparison.field)
                    && !comparison.value.is_null() =>
            {
                Some(&comparison.value)
            }
            _ => None,
        }
    }

    /// Request parameters for a collection fetch.
    ///
    /// Conditions are forwarded only when the tree never mentions a key
    /// field; then every equality leaf in conjunctive position becomes
    /// `field=value`. Options (`limit`, `offset`, `order`) always follow.
    pub fn extract_params(&self) -> Params {
        let mut params = Params::new();

        if !self.conditions.mentions_key(&self.schema) {
            let mut leaves = Vec::new();
            self.conditions.conjunctive_equalities(&mut leaves);
            for comparison in leaves {
                params.insert(comparison.field.as_str(), comparison.value.to_param());
            }
        }

        if let Some(limit) = self.limit {
            params.insert("limit", limit.to_string());
        }
        if self.limit.is_some() || self.offset > 0 {
            params.insert("offset", self.offset.to_string());
        }
        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(|o| match o.direction {
                    Direction::Asc => format!("{}.asc", o.field),
                    Direction::Desc => format!("{}.desc", o.field),
                })
                .collect::<Vec<_>>()
                .join(",");
            params.insert("order", order);
        }

        params
    }

    /// Decide how to fetch this query.
    pub fn plan(&self) -> ReadPlan {
        match self.extract_key() {
            Some(key) => ReadPlan::Resource {
                key: key.to_param(),
            },
            None => ReadPlan::Collection {
                params: self.extract_params(),
            },
        }
    }

    /// Re-apply conditions, order and limit to fetched records. Offset is
    /// left to the server, which received it as a parameter.
    pub fn filter_records(&self, records: Vec<AttributeMap>) -> Vec<AttributeMap> {
        let mut matched: Vec<AttributeMap> = records
            .into_iter()
            .filter(|r| self.conditions.matches(r))
            .collect();

        if !self.order.is_empty() {
            matched.sort_by(|a, b| {
                for order in &self.order {
                    let left = a.get(&order.field).unwrap_or(&Value::Null);
                    let right = b.get(&order.field).unwrap_or(&Value::Null);
                    let ordering = match order.direction {
                        Direction::Asc => left.total_cmp(right),
                        Direction::Desc => left.total_cmp(right).reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}

/// The HTTP access pattern chosen for a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadPlan {
    /// `GET {collection}/{key}`; a 404 means zero results.
    Resource { key: String },
    /// `GET {collection}?{params}`.
    Collection { params: Params },
}
