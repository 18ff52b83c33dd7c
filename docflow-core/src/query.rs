// src/query.rs
//! Row predicates for the aggregation pipeline
//!
//! A [`Predicate`] binds a field path and an operator from
//! [`operators::OPERATOR_REGISTRY`] to its operands. `where` predicates carry
//! literal operands; `match` predicates name other fields of the same row.

pub mod operators;

use crate::document::Document;
use crate::error::{DocflowError, Result};
use operators::OperatorMatcher;
use std::fmt;

/// Where a predicate's operands come from
#[derive(Debug, Clone, PartialEq)]
pub enum Operands {
    /// Literal values (`where`)
    Literal {
        value: Document,
        value2: Option<Document>,
    },
    /// Paths into the row being tested (`match`)
    Fields {
        field_a: String,
        field_b: Option<String>,
    },
}

impl Operands {
    fn count(&self) -> usize {
        match self {
            Operands::Literal { value2, .. } => 1 + value2.is_some() as usize,
            Operands::Fields { field_b, .. } => 1 + field_b.is_some() as usize,
        }
    }
}

#[derive(Clone)]
pub struct Predicate {
    field: String,
    operator: &'static dyn OperatorMatcher,
    operands: Operands,
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("field", &self.field)
            .field("operator", &self.operator.name())
            .field("operands", &self.operands)
            .finish()
    }
}

impl Predicate {
    fn new(field: &str, symbol: &str, operands: Operands) -> Result<Self> {
        let operator = operators::lookup(symbol)?;
        let count = operands.count();
        if count < operator.min_operands() || count > operator.max_operands() {
            return Err(DocflowError::InvalidOperand(format!(
                "'{}' takes {}..={} operands, got {}",
                symbol,
                operator.min_operands(),
                operator.max_operands(),
                count
            )));
        }
        Ok(Predicate {
            field: field.to_string(),
            operator,
            operands,
        })
    }

    /// Compare `field` against literal operands
    pub fn literal(
        field: &str,
        symbol: &str,
        value: Document,
        value2: Option<Document>,
    ) -> Result<Self> {
        let predicate = Predicate::new(field, symbol, Operands::Literal { value, value2 })?;
        if let Operands::Literal { value, value2 } = &predicate.operands {
            predicate.operator.validate(value, value2.as_ref())?;
        }
        Ok(predicate)
    }

    /// Compare `field` against other fields of the same row
    pub fn reference(
        field: &str,
        symbol: &str,
        field_a: &str,
        field_b: Option<&str>,
    ) -> Result<Self> {
        Predicate::new(
            field,
            symbol,
            Operands::Fields {
                field_a: field_a.to_string(),
                field_b: field_b.map(str::to_string),
            },
        )
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator_name(&self) -> &'static str {
        self.operator.name()
    }

    /// A missing field, or a missing referenced field, fails the predicate
    pub fn evaluate(&self, row: &Document) -> Result<bool> {
        let value = match row.get(&self.field) {
            Some(v) => v,
            None => return Ok(false),
        };
        match &self.operands {
            Operands::Literal { value: a, value2: b } => self.operator.matches(value, a, b.as_ref()),
            Operands::Fields { field_a, field_b } => {
                let a = match row.get(field_a) {
                    Some(a) => a,
                    None => return Ok(false),
                };
                let b = match field_b {
                    Some(path) => match row.get(path) {
                        Some(b) => Some(b),
                        None => return Ok(false),
                    },
                    None => None,
                };
                self.operator.matches(value, a, b)
            }
        }
    }
}
