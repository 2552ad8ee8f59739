//! Segment rule engine
//!
//! Translates a declarative rule tree (`{combinator, rules: [{field,
//! operator, value}]}`) into a predicate over customers. The tree is a
//! flat list of leaves; nested rule groups are not representable. Both
//! `and` and `or` combinators are honored.
//!
//! Evaluation is deliberately lenient: a leaf naming an unknown field or
//! operator, or carrying a value that cannot be coerced to the field's
//! type, is dropped from the predicate instead of failing the request.
//! Dropped leaves are logged at debug level; a fully degenerate rule set
//! compiles to a predicate that matches every customer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Customer;

/// How leaves are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    And,
    Or,
}

/// A single filter leaf
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub field: String,
    pub operator: String,
    pub value: Value,
}

/// A rule tree: one combinator over a flat list of leaves
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    pub combinator: Combinator,
    pub rules: Vec<Rule>,
}

/// Customer fields addressable from rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    TotalSpent,
    VisitCount,
    OrderCount,
    DaysSinceLastOrder,
    LastActive,
    Email,
    Name,
}

impl Field {
    /// Both camelCase (UI rule builder) and snake_case (AI parser output)
    /// spellings are accepted.
    fn parse(name: &str) -> Option<Self> {
        match name {
            "totalSpent" | "total_spent" => Some(Self::TotalSpent),
            "visitCount" | "visit_count" => Some(Self::VisitCount),
            "orderCount" | "order_count" => Some(Self::OrderCount),
            "daysSinceLastOrder" | "days_since_last_order" => Some(Self::DaysSinceLastOrder),
            "lastActive" | "last_active" => Some(Self::LastActive),
            "email" => Some(Self::Email),
            "name" => Some(Self::Name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CmpOp {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "=" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            ">" => Some(Self::Gt),
            "<" => Some(Self::Lt),
            ">=" => Some(Self::Ge),
            "<=" => Some(Self::Le),
            _ => None,
        }
    }

    fn eval<T: PartialOrd>(self, lhs: T, rhs: T) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Gt => lhs > rhs,
            Self::Lt => lhs < rhs,
            Self::Ge => lhs >= rhs,
            Self::Le => lhs <= rhs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextOp {
    Eq,
    Ne,
    Contains,
    BeginsWith,
    EndsWith,
}

impl TextOp {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "=" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            "contains" => Some(Self::Contains),
            "beginsWith" => Some(Self::BeginsWith),
            "endsWith" => Some(Self::EndsWith),
            _ => None,
        }
    }
}

/// A compiled, type-checked leaf
#[derive(Debug, Clone)]
enum Leaf {
    Numeric { field: Field, op: CmpOp, value: f64 },
    Time { op: CmpOp, value: DateTime<Utc> },
    Text { field: Field, op: TextOp, value: String },
}

impl Leaf {
    fn compile(rule: &Rule) -> Option<Self> {
        let field = Field::parse(&rule.field)?;
        match field {
            Field::TotalSpent | Field::VisitCount | Field::OrderCount | Field::DaysSinceLastOrder => {
                Some(Self::Numeric {
                    field,
                    op: CmpOp::parse(&rule.operator)?,
                    value: coerce_number(&rule.value)?,
                })
            }
            Field::LastActive => Some(Self::Time {
                op: CmpOp::parse(&rule.operator)?,
                value: coerce_timestamp(&rule.value)?,
            }),
            Field::Email | Field::Name => Some(Self::Text {
                field,
                op: TextOp::parse(&rule.operator)?,
                value: rule.value.as_str()?.to_string(),
            }),
        }
    }

    fn matches(&self, customer: &Customer) -> bool {
        match self {
            Self::Numeric { field, op, value } => {
                let lhs = match field {
                    Field::TotalSpent => customer.total_spent,
                    Field::VisitCount => f64::from(customer.visit_count),
                    Field::OrderCount => f64::from(customer.order_count),
                    Field::DaysSinceLastOrder => f64::from(customer.days_since_last_order),
                    _ => return false,
                };
                op.eval(lhs, *value)
            }
            Self::Time { op, value } => op.eval(customer.last_active, *value),
            Self::Text { field, op, value } => {
                let lhs = match field {
                    Field::Email => customer.email.as_str(),
                    Field::Name => customer.name.as_str(),
                    _ => return false,
                };
                match op {
                    TextOp::Eq => lhs == value,
                    TextOp::Ne => lhs != value,
                    TextOp::Contains => lhs.contains(value.as_str()),
                    TextOp::BeginsWith => lhs.starts_with(value.as_str()),
                    TextOp::EndsWith => lhs.ends_with(value.as_str()),
                }
            }
        }
    }
}

/// Rule values may arrive as numbers or numeric strings
fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Timestamps arrive as RFC 3339 or bare `YYYY-MM-DD`
fn coerce_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// A compiled rule set, ready to filter customers
#[derive(Debug, Clone)]
pub struct Predicate {
    combinator: Combinator,
    leaves: Vec<Leaf>,
}

impl Predicate {
    /// Number of leaves that survived compilation
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// True when no leaf survived compilation
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Evaluate against a single customer.
    ///
    /// An empty predicate matches everything, mirroring an unconstrained
    /// store query.
    pub fn matches(&self, customer: &Customer) -> bool {
        if self.leaves.is_empty() {
            return true;
        }
        match self.combinator {
            Combinator::And => self.leaves.iter().all(|leaf| leaf.matches(customer)),
            Combinator::Or => self.leaves.iter().any(|leaf| leaf.matches(customer)),
        }
    }
}

/// Compile a rule set into a predicate, dropping leaves that do not
/// type-check.
pub fn compile(rules: &RuleSet) -> Predicate {
    let leaves: Vec<Leaf> = rules.rules.iter().filter_map(Leaf::compile).collect();
    if leaves.len() < rules.rules.len() {
        tracing::debug!(
            dropped = rules.rules.len() - leaves.len(),
            "ignored unsupported rule leaves"
        );
    }
    Predicate {
        combinator: rules.combinator,
        leaves,
    }
}

/// Stable cache key for a rule set's preview count
pub fn preview_cache_key(rules: &RuleSet) -> String {
    // Struct field order is fixed, so the JSON encoding is canonical.
    format!(
        "segment:preview:{}",
        serde_json::to_string(rules).unwrap_or_default()
    )
}
