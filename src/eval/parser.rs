//! Nom parser for the default expression language
//!
//! ```text
//! expression := IDENT '=' expression | ternary
//! ternary    := or ('?' expression ':' expression)?
//! or         := and ('||' and)*
//! and        := equality ('&&' equality)*
//! equality   := compare (('==' | '!=') compare)*
//! compare    := additive (('<=' | '>=' | '<' | '>') additive)*
//! additive   := term (('+' | '-') term)*
//! term       := unary (('*' | '/' | '%') unary)*
//! unary      := ('!' | '-') unary | postfix
//! postfix    := primary ('[' expression ']' | '.' IDENT)*
//! primary    := NUMBER | STRING | '[' list ']' | '(' expression ')' | IDENT
//! ```

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, tag},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, none_of},
    combinator::{all_consuming, cut, map, map_res, not, opt, recognize, value},
    error::{context, convert_error, VerboseError},
    multi::{fold_many0, many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};

use crate::error::EvalError;
use crate::value::Value;

type Res<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

/// Parsed expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident(String),
    List(Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Member(Box<Expr>, String),
    Assign(String, Box<Expr>),
}

impl Expr {
    /// Names read by this expression, in first-use order
    pub fn identifiers(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_identifiers(&mut names);
        names
    }

    fn collect_identifiers(&self, names: &mut Vec<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Ident(name) => {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            Expr::List(items) => items.iter().for_each(|e| e.collect_identifiers(names)),
            Expr::Unary(_, e) | Expr::Member(e, _) | Expr::Assign(_, e) => {
                e.collect_identifiers(names)
            }
            Expr::Binary(_, l, r) | Expr::Index(l, r) => {
                l.collect_identifiers(names);
                r.collect_identifiers(names);
            }
            Expr::Ternary(c, a, b) => {
                c.collect_identifiers(names);
                a.collect_identifiers(names);
                b.collect_identifiers(names);
            }
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Parse a complete expression
pub fn parse_expression(input: &str) -> Result<Expr, EvalError> {
    match all_consuming(delimited(multispace0, expression, multispace0))(input) {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(EvalError::Syntax {
            expression: input.to_string(),
            message: convert_error(input, e),
        }),
        Err(nom::Err::Incomplete(_)) => Err(EvalError::Syntax {
            expression: input.to_string(),
            message: "Incomplete input".to_string(),
        }),
    }
}

// ============================================================================
// Internal Parsers
// ============================================================================

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> Res<'a, O>
where
    F: FnMut(&'a str) -> Res<'a, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn expression(input: &str) -> Res<'_, Expr> {
    alt((assignment, ternary))(input)
}

fn assignment(input: &str) -> Res<'_, Expr> {
    let (input, name) = ws(identifier)(input)?;
    let (input, _) = terminated(char('='), not(char('=')))(input)?;
    let (input, rhs) = expression(input)?;
    Ok((input, Expr::Assign(name.to_string(), Box::new(rhs))))
}

fn ternary(input: &str) -> Res<'_, Expr> {
    let (input, cond) = or_expr(input)?;
    let (input, branches) = opt(pair(
        preceded(ws(char('?')), expression),
        preceded(ws(char(':')), cut(context("ternary else branch", expression))),
    ))(input)?;
    Ok((
        input,
        match branches {
            Some((then, otherwise)) => {
                Expr::Ternary(Box::new(cond), Box::new(then), Box::new(otherwise))
            }
            None => cond,
        },
    ))
}

/// Left-associative chain of `operand (op operand)*`
fn chain<'a>(
    input: &'a str,
    operand: fn(&'a str) -> Res<'a, Expr>,
    op: fn(&'a str) -> Res<'a, BinaryOp>,
) -> Res<'a, Expr> {
    let (input, first) = operand(input)?;
    fold_many0(
        pair(ws(op), operand),
        move || first.clone(),
        |acc, (op, rhs)| Expr::Binary(op, Box::new(acc), Box::new(rhs)),
    )(input)
}

fn or_expr(input: &str) -> Res<'_, Expr> {
    chain(input, and_expr, |i| value(BinaryOp::Or, tag("||"))(i))
}

fn and_expr(input: &str) -> Res<'_, Expr> {
    chain(input, equality, |i| value(BinaryOp::And, tag("&&"))(i))
}

fn equality(input: &str) -> Res<'_, Expr> {
    chain(input, comparison, |i| {
        alt((value(BinaryOp::Eq, tag("==")), value(BinaryOp::Ne, tag("!="))))(i)
    })
}

fn comparison(input: &str) -> Res<'_, Expr> {
    chain(input, additive, |i| {
        alt((
            value(BinaryOp::Le, tag("<=")),
            value(BinaryOp::Ge, tag(">=")),
            value(BinaryOp::Lt, char('<')),
            value(BinaryOp::Gt, char('>')),
        ))(i)
    })
}

fn additive(input: &str) -> Res<'_, Expr> {
    chain(input, term, |i| {
        alt((value(BinaryOp::Add, char('+')), value(BinaryOp::Sub, char('-'))))(i)
    })
}

fn term(input: &str) -> Res<'_, Expr> {
    chain(input, unary, |i| {
        alt((
            value(BinaryOp::Mul, char('*')),
            value(BinaryOp::Div, char('/')),
            value(BinaryOp::Rem, char('%')),
        ))(i)
    })
}

fn unary(input: &str) -> Res<'_, Expr> {
    alt((
        map(preceded(ws(char('!')), unary), |e| {
            Expr::Unary(UnaryOp::Not, Box::new(e))
        }),
        map(preceded(ws(char('-')), unary), |e| {
            Expr::Unary(UnaryOp::Neg, Box::new(e))
        }),
        postfix,
    ))(input)
}

enum Suffix {
    Index(Expr),
    Member(String),
}

fn postfix(input: &str) -> Res<'_, Expr> {
    let (input, base) = ws(primary)(input)?;
    fold_many0(
        alt((
            map(
                delimited(ws(char('[')), expression, cut(ws(char(']')))),
                Suffix::Index,
            ),
            map(preceded(ws(char('.')), identifier), |name: &str| {
                Suffix::Member(name.to_string())
            }),
        )),
        move || base.clone(),
        |acc, suffix| match suffix {
            Suffix::Index(index) => Expr::Index(Box::new(acc), Box::new(index)),
            Suffix::Member(name) => Expr::Member(Box::new(acc), name),
        },
    )(input)
}

fn primary(input: &str) -> Res<'_, Expr> {
    alt((
        number,
        map(string_literal, |s| Expr::Literal(Value::Str(s))),
        list,
        delimited(
            char('('),
            ws(expression),
            cut(context("closing parenthesis", char(')'))),
        ),
        word,
    ))(input)
}

fn identifier(input: &str) -> Res<'_, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn word(input: &str) -> Res<'_, Expr> {
    map(identifier, |name| match name {
        "true" => Expr::Literal(Value::Bool(true)),
        "false" => Expr::Literal(Value::Bool(false)),
        "null" => Expr::Literal(Value::Null),
        other => Expr::Ident(other.to_string()),
    })(input)
}

fn number(input: &str) -> Res<'_, Expr> {
    map_res(
        recognize(pair(digit1, opt(pair(char('.'), digit1)))),
        |digits: &str| -> Result<Expr, std::num::ParseFloatError> {
            if !digits.contains('.') {
                if let Ok(i) = digits.parse::<i64>() {
                    return Ok(Expr::Literal(Value::Int(i)));
                }
            }
            digits
                .parse::<f64>()
                .map(|f| Expr::Literal(Value::Float(f)))
        },
    )(input)
}

fn escape(input: &str) -> Res<'_, &str> {
    alt((
        value("\\", char('\\')),
        value("\"", char('"')),
        value("'", char('\'')),
        value("\n", char('n')),
        value("\t", char('t')),
    ))(input)
}

fn string_literal(input: &str) -> Res<'_, String> {
    alt((
        delimited(
            char('"'),
            map(
                opt(escaped_transform(none_of("\\\""), '\\', escape)),
                Option::unwrap_or_default,
            ),
            cut(char('"')),
        ),
        delimited(
            char('\''),
            map(
                opt(escaped_transform(none_of("\\'"), '\\', escape)),
                Option::unwrap_or_default,
            ),
            cut(char('\'')),
        ),
    ))(input)
}

fn list(input: &str) -> Res<'_, Expr> {
    map(
        delimited(
            char('['),
            separated_list0(ws(char(',')), ws(expression)),
            cut(ws(char(']'))),
        ),
        Expr::List,
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> Box<Expr> {
        Box::new(Expr::Literal(Value::Int(i)))
    }

    #[test]
    fn test_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Add,
                int(1),
                Box::new(Expr::Binary(BinaryOp::Mul, int(2), int(3)))
            )
        );
    }

    #[test]
    fn test_left_associative() {
        let expr = parse_expression("8 - 3 - 1").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Sub,
                Box::new(Expr::Binary(BinaryOp::Sub, int(8), int(3))),
                int(1)
            )
        );
    }

    #[test]
    fn test_assignment_vs_equality() {
        assert!(matches!(
            parse_expression("x = 1").unwrap(),
            Expr::Assign(name, _) if name == "x"
        ));
        assert!(matches!(
            parse_expression("x == 1").unwrap(),
            Expr::Binary(BinaryOp::Eq, _, _)
        ));
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            parse_expression("'it\\'s'").unwrap(),
            Expr::Literal(Value::from("it's"))
        );
        assert_eq!(
            parse_expression("\"\"").unwrap(),
            Expr::Literal(Value::from(""))
        );
        assert_eq!(
            parse_expression("2.5").unwrap(),
            Expr::Literal(Value::Float(2.5))
        );
        assert_eq!(
            parse_expression("null").unwrap(),
            Expr::Literal(Value::Null)
        );
        assert_eq!(parse_expression("[]").unwrap(), Expr::List(vec![]));
    }

    #[test]
    fn test_postfix_and_ternary() {
        let expr = parse_expression("names.length > 1 ? names[0] : 'none'").unwrap();
        assert!(matches!(expr, Expr::Ternary(..)));
        assert_eq!(expr.identifiers(), vec!["names".to_string()]);
    }

    #[test]
    fn test_identifiers_deduplicated() {
        let expr = parse_expression("a + b * a - (c && !b)").unwrap();
        assert_eq!(expr.identifiers(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(
            parse_expression("(1 + 2"),
            Err(EvalError::Syntax { .. })
        ));
        assert!(parse_expression("1 +").is_err());
        assert!(parse_expression("").is_err());
    }
}
