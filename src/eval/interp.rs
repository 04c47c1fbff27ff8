//! Tree-walking evaluation of parsed expressions over live bindings

use std::cmp::Ordering;

use super::parser::{BinaryOp, Expr, UnaryOp};
use crate::context::Context;
use crate::error::EvalError;
use crate::value::Value;

pub fn evaluate(expr: &Expr, ctx: &mut Context) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Ident(name) => ctx
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::Undefined { name: name.clone() }),
        Expr::List(items) => Ok(Value::List(
            items
                .iter()
                .map(|e| evaluate(e, ctx))
                .collect::<Result<_, _>>()?,
        )),
        Expr::Unary(op, operand) => {
            let v = evaluate(operand, ctx)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!v.truthy())),
                UnaryOp::Neg => match v {
                    Value::Int(i) => i.checked_neg().map(Value::Int).ok_or(EvalError::Overflow {
                        op: "-".to_string(),
                    }),
                    Value::Float(f) => Ok(Value::Float(-f)),
                    other => Err(type_error("-", &other, &Value::Null)),
                },
            }
        }
        Expr::Binary(BinaryOp::And, l, r) => {
            let left = evaluate(l, ctx)?;
            if !left.truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(evaluate(r, ctx)?.truthy()))
        }
        Expr::Binary(BinaryOp::Or, l, r) => {
            let left = evaluate(l, ctx)?;
            if left.truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(evaluate(r, ctx)?.truthy()))
        }
        Expr::Binary(op, l, r) => {
            let left = evaluate(l, ctx)?;
            let right = evaluate(r, ctx)?;
            binary(*op, left, right)
        }
        Expr::Ternary(cond, then, otherwise) => {
            if evaluate(cond, ctx)?.truthy() {
                evaluate(then, ctx)
            } else {
                evaluate(otherwise, ctx)
            }
        }
        Expr::Index(target, index) => {
            let target = evaluate(target, ctx)?;
            let index = evaluate(index, ctx)?;
            index_into(target, index)
        }
        Expr::Member(target, member) => {
            let target = evaluate(target, ctx)?;
            match (member.as_str(), &target) {
                ("length" | "size", Value::List(items)) => Ok(Value::Int(items.len() as i64)),
                ("length" | "size", Value::Str(s)) => Ok(Value::Int(s.chars().count() as i64)),
                _ => Err(EvalError::Type {
                    op: format!(".{}", member),
                    left: target.type_name().to_string(),
                    right: "member".to_string(),
                }),
            }
        }
        Expr::Assign(name, rhs) => {
            let v = evaluate(rhs, ctx)?;
            ctx.set(name.clone(), v.clone());
            Ok(v)
        }
    }
}

fn type_error(op: &str, left: &Value, right: &Value) -> EvalError {
    EvalError::Type {
        op: op.to_string(),
        left: left.type_name().to_string(),
        right: right.type_name().to_string(),
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => {
            as_f64(left) == as_f64(right)
        }
        _ => left == right,
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(&left, &right))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(&left, &right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (&left, &right) {
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => match (as_f64(&left), as_f64(&right)) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => return Err(type_error(op.symbol(), &left, &right)),
                },
            };
            Ok(Value::Bool(match (op, ordering) {
                (_, None) => false,
                (BinaryOp::Lt, Some(o)) => o == Ordering::Less,
                (BinaryOp::Le, Some(o)) => o != Ordering::Greater,
                (BinaryOp::Gt, Some(o)) => o == Ordering::Greater,
                (_, Some(o)) => o != Ordering::Less,
            }))
        }
        BinaryOp::Add => match (left, right) {
            (Value::List(mut a), Value::List(b)) => {
                a.extend(b);
                Ok(Value::List(a))
            }
            (l @ Value::Str(_), r) | (l, r @ Value::Str(_)) => {
                Ok(Value::Str(format!("{}{}", l, r)))
            }
            (l, r) => arithmetic(op, &l, &r),
        },
        _ => arithmetic(op, &left, &right),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        let (a, b) = (*a, *b);
        let overflow = || EvalError::Overflow {
            op: op.symbol().to_string(),
        };
        return match op {
            BinaryOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Div if b == 0 => Err(EvalError::DivideByZero),
            BinaryOp::Div if a % b == 0 => Ok(Value::Int(a / b)),
            BinaryOp::Div => Ok(Value::Float(a as f64 / b as f64)),
            BinaryOp::Rem if b == 0 => Err(EvalError::DivideByZero),
            BinaryOp::Rem => a.checked_rem(b).map(Value::Int).ok_or_else(overflow),
            _ => Err(type_error(op.symbol(), left, right)),
        };
    }
    let (a, b) = match (as_f64(left), as_f64(right)) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(type_error(op.symbol(), left, right)),
    };
    match op {
        BinaryOp::Add => Ok(Value::Float(a + b)),
        BinaryOp::Sub => Ok(Value::Float(a - b)),
        BinaryOp::Mul => Ok(Value::Float(a * b)),
        BinaryOp::Div | BinaryOp::Rem if b == 0.0 => Err(EvalError::DivideByZero),
        BinaryOp::Div => Ok(Value::Float(a / b)),
        BinaryOp::Rem => Ok(Value::Float(a % b)),
        _ => Err(type_error(op.symbol(), left, right)),
    }
}

fn index_into(target: Value, index: Value) -> Result<Value, EvalError> {
    let i = match index {
        Value::Int(i) => i,
        other => return Err(type_error("[]", &target, &other)),
    };
    let (len, item) = match &target {
        Value::List(items) => (
            items.len(),
            usize::try_from(i).ok().and_then(|i| items.get(i)).cloned(),
        ),
        Value::Str(s) => (
            s.chars().count(),
            usize::try_from(i)
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::Str(c.to_string())),
        ),
        _ => return Err(type_error("[]", &target, &Value::Int(i))),
    };
    item.ok_or(EvalError::Index { index: i, len })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::parser::parse_expression;

    fn eval(src: &str, ctx: &mut Context) -> Result<Value, EvalError> {
        evaluate(&parse_expression(src)?, ctx)
    }

    #[test]
    fn test_arithmetic() {
        let mut ctx = Context::new();
        assert_eq!(eval("3 + 5", &mut ctx).unwrap(), Value::Int(8));
        assert_eq!(eval("7 / 2", &mut ctx).unwrap(), Value::Float(3.5));
        assert_eq!(eval("8 / 2", &mut ctx).unwrap(), Value::Int(4));
        assert_eq!(eval("-(2 * 3) % 4", &mut ctx).unwrap(), Value::Int(-2));
        assert_eq!(eval("1 / 0", &mut ctx), Err(EvalError::DivideByZero));
    }

    #[test]
    fn test_string_concat_and_compare() {
        let mut ctx = Context::new().with("name", "x");
        assert_eq!(
            eval("'get_' + name + 1", &mut ctx).unwrap(),
            Value::from("get_x1")
        );
        assert_eq!(eval("name == 'x'", &mut ctx).unwrap(), Value::Bool(true));
        assert_eq!(eval("'a' < 'b'", &mut ctx).unwrap(), Value::Bool(true));
        assert_eq!(eval("2 == 2.0", &mut ctx).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_undefined_and_short_circuit() {
        let mut ctx = Context::new();
        assert_eq!(
            eval("missing", &mut ctx),
            Err(EvalError::Undefined {
                name: "missing".to_string()
            })
        );
        assert_eq!(
            eval("false && missing", &mut ctx).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(eval("true || missing", &mut ctx).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_lists() {
        let mut ctx = Context::new().with("names", vec!["x", "y"]);
        assert_eq!(eval("names.length", &mut ctx).unwrap(), Value::Int(2));
        assert_eq!(eval("names[1]", &mut ctx).unwrap(), Value::from("y"));
        assert_eq!(
            eval("names[2]", &mut ctx),
            Err(EvalError::Index { index: 2, len: 2 })
        );
        assert_eq!(
            eval("names + ['z']", &mut ctx).unwrap(),
            Value::from(vec!["x", "y", "z"])
        );
    }

    #[test]
    fn test_assignment_writes_instance_scope() {
        let mut ctx = Context::new();
        assert_eq!(eval("total = 2 * 21", &mut ctx).unwrap(), Value::Int(42));
        assert_eq!(ctx.get("total"), Some(&Value::Int(42)));
    }
}
