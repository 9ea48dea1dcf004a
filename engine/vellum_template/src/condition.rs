//! The `if` tag's condition grammar.
//!
//! A small precedence-climbing parser over the tag's argument bits:
//! `or` binds loosest, then `and`, then prefix `not`, then `in`/`not in`,
//! then the comparison operators. Leaves are full filter expressions.
//! Evaluation never fails on a missing variable (it reads as falsy) and
//! incomparable operands simply compare unequal.

use std::cmp::Ordering;

use vellum_value::Value;

use crate::context::Context;
use crate::error::{RenderError, TemplateSyntaxError};
use crate::expression::FilterExpression;
use crate::parser::Parser;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    NotIn,
}

pub(crate) enum Condition {
    Expr(FilterExpression),
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Compare(CmpOp, Box<Condition>, Box<Condition>),
}

impl Condition {
    pub(crate) fn eval(&self, context: &mut Context) -> Result<bool, RenderError> {
        Ok(match self {
            Condition::Expr(expr) => expr.resolve(context, true)?.is_truthy(),
            Condition::Not(inner) => !inner.eval(context)?,
            Condition::And(left, right) => left.eval(context)? && right.eval(context)?,
            Condition::Or(left, right) => left.eval(context)? || right.eval(context)?,
            Condition::Compare(op, left, right) => {
                let lhs = left.value(context)?;
                let rhs = right.value(context)?;
                match op {
                    CmpOp::Eq => lhs.eq_value(&rhs),
                    CmpOp::Ne => !lhs.eq_value(&rhs),
                    CmpOp::Lt => lhs.cmp_value(&rhs) == Some(Ordering::Less),
                    CmpOp::Gt => lhs.cmp_value(&rhs) == Some(Ordering::Greater),
                    CmpOp::Le => matches!(
                        lhs.cmp_value(&rhs),
                        Some(Ordering::Less | Ordering::Equal)
                    ),
                    CmpOp::Ge => matches!(
                        lhs.cmp_value(&rhs),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                    CmpOp::In => rhs.contains(&lhs) == Some(true),
                    CmpOp::NotIn => rhs.contains(&lhs) == Some(false),
                }
            }
        })
    }

    /// The value of this subtree when used as a comparison operand.
    fn value(&self, context: &mut Context) -> Result<Value, RenderError> {
        match self {
            Condition::Expr(expr) => expr.resolve(context, true),
            other => other.eval(context).map(Value::Bool),
        }
    }
}

enum InfixOp {
    Or,
    And,
    Cmp(CmpOp),
}

/// Binding power of the infix operator starting at `bits[pos]`, if any.
/// `not in` spans two bits.
fn peek_infix(bits: &[String], pos: usize) -> Option<(InfixOp, u8, usize)> {
    let bit = bits.get(pos)?;
    let (op, bp, width) = match bit.as_str() {
        "or" => (InfixOp::Or, 6, 1),
        "and" => (InfixOp::And, 7, 1),
        "not" if bits.get(pos + 1).map(String::as_str) == Some("in") => {
            (InfixOp::Cmp(CmpOp::NotIn), 9, 2)
        }
        "in" => (InfixOp::Cmp(CmpOp::In), 9, 1),
        "==" => (InfixOp::Cmp(CmpOp::Eq), 10, 1),
        "!=" => (InfixOp::Cmp(CmpOp::Ne), 10, 1),
        "<" => (InfixOp::Cmp(CmpOp::Lt), 10, 1),
        ">" => (InfixOp::Cmp(CmpOp::Gt), 10, 1),
        "<=" => (InfixOp::Cmp(CmpOp::Le), 10, 1),
        ">=" => (InfixOp::Cmp(CmpOp::Ge), 10, 1),
        _ => return None,
    };
    Some((op, bp, width))
}

fn is_operator(bit: &str) -> bool {
    matches!(
        bit,
        "or" | "and" | "not" | "in" | "==" | "!=" | "<" | ">" | "<=" | ">="
    )
}

struct ConditionParser<'a> {
    bits: &'a [String],
    pos: usize,
    parser: &'a Parser,
}

impl ConditionParser<'_> {
    fn expression(&mut self, rbp: u8) -> Result<Condition, TemplateSyntaxError> {
        let mut left = self.prefix()?;
        while let Some((op, bp, width)) = peek_infix(self.bits, self.pos) {
            if bp <= rbp {
                break;
            }
            self.pos += width;
            let right = self.expression(bp)?;
            left = match op {
                InfixOp::Or => Condition::Or(Box::new(left), Box::new(right)),
                InfixOp::And => Condition::And(Box::new(left), Box::new(right)),
                InfixOp::Cmp(cmp) => Condition::Compare(cmp, Box::new(left), Box::new(right)),
            };
        }
        Ok(left)
    }

    fn prefix(&mut self) -> Result<Condition, TemplateSyntaxError> {
        let Some(bit) = self.bits.get(self.pos) else {
            return Err(TemplateSyntaxError::other("unexpected end of if expression"));
        };
        if bit == "not" {
            self.pos += 1;
            return Ok(Condition::Not(Box::new(self.expression(8)?)));
        }
        if is_operator(bit) {
            return Err(TemplateSyntaxError::other(format!(
                "not expecting '{bit}' in this position in if expression"
            )));
        }
        let expr = self.parser.compile_filter(bit)?;
        self.pos += 1;
        Ok(Condition::Expr(expr))
    }
}

/// Parse an `if`/`elif` condition from its argument bits.
pub(crate) fn parse_condition(
    bits: &[String],
    parser: &Parser,
) -> Result<Condition, TemplateSyntaxError> {
    let mut cp = ConditionParser {
        bits,
        pos: 0,
        parser,
    };
    let condition = cp.expression(0)?;
    if cp.pos != bits.len() {
        return Err(TemplateSyntaxError::other(format!(
            "unused '{}' at end of if expression",
            bits[cp.pos..].join(" ")
        )));
    }
    Ok(condition)
}
