//! Post-transform expression parser
//!
//! # Supported Syntax
//!
//! ```text
//! $('x') == $('y')                 # field access and comparison
//! $('x') * 2 + 1 > $("limit")      # arithmetic
//! not ($('a') < 0 or $('b') >= 10) # boolean logic
//! $('name') + '-suffix'            # string concatenation
//! true, false, null, 3, -2.5e3     # literals
//! ```
//!
//! Precedence, lowest first: `or`/`||`, `and`/`&&`, `not`, comparisons
//! (non-associative), `+ -`, `* / %`, unary `-`.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0, one_of},
    combinator::{map, map_res, opt, recognize, value},
    error::{Error as NomError, ErrorKind},
    sequence::{delimited, preceded, terminated},
    IResult, Parser,
};
use serde_json::Value;

use super::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::ExprError;

/// Deepest expression tree, and deepest nesting of parentheses and prefix
/// operators, that the parser accepts
///
/// Parsing and evaluation both recurse once per level, so the bound keeps a
/// hostile expression from exhausting the stack.
pub const MAX_EXPRESSION_DEPTH: usize = 128;

/// Parse an expression string into an expression tree
pub fn parse_expression(input: &str) -> Result<Expr, ExprError> {
    let parse_error = |message: String| ExprError::Parse {
        expression: input.to_string(),
        message,
    };

    match delimited(multispace0, expression, multispace0).parse(input) {
        Ok((remaining, (expr, _))) => {
            if remaining.is_empty() {
                Ok(expr)
            } else {
                Err(parse_error(format!(
                    "unexpected trailing input '{}'",
                    remaining.trim()
                )))
            }
        }
        Err(nom::Err::Failure(e)) if e.code == ErrorKind::TooLarge => Err(parse_error(format!(
            "expression exceeds the maximum depth of {}",
            MAX_EXPRESSION_DEPTH
        ))),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let at = e.input.trim();
            Err(parse_error(if at.is_empty() {
                "unexpected end of expression".to_string()
            } else {
                format!("unexpected input at '{}'", at)
            }))
        }
        Err(nom::Err::Incomplete(_)) => Err(parse_error("incomplete expression".to_string())),
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// A parsed subtree and its height
type Node = (Expr, usize);

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn fail<O>(input: &str) -> IResult<&str, O> {
    Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)))
}

/// Abort the whole parse once `depth` passes the limit
fn check_depth(input: &str, depth: usize) -> Result<(), nom::Err<NomError<&str>>> {
    if depth > MAX_EXPRESSION_DEPTH {
        return Err(nom::Err::Failure(NomError::new(input, ErrorKind::TooLarge)));
    }
    Ok(())
}

fn space(input: &str) -> IResult<&str, &str> {
    multispace0(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(is_ident_char).parse(input)
}

/// Match a whole word, so `order` is not read as `or` followed by `der`
fn keyword<'a>(word: &'static str, input: &'a str) -> IResult<&'a str, &'a str> {
    let (rest, ident) = identifier(input)?;
    if ident == word {
        Ok((rest, ident))
    } else {
        fail(input)
    }
}

/// Parse `operand (operator operand)*` as a left-associative chain
///
/// Every operator lifts the chain built so far one level, so long chains are
/// bounded by height just like nesting.
fn fold_binary<'a>(
    input: &'a str,
    nesting: usize,
    operand: fn(&'a str, usize) -> IResult<&'a str, Node>,
    operator: fn(&'a str) -> IResult<&'a str, BinaryOp>,
) -> IResult<&'a str, Node> {
    let (mut input, (mut lhs, mut height)) = operand(input, nesting)?;
    loop {
        let (rest, _) = space(input)?;
        let (rest, op) = match operator(rest) {
            Ok(parsed) => parsed,
            Err(nom::Err::Error(_)) => return Ok((input, (lhs, height))),
            Err(e) => return Err(e),
        };
        let (rest, _) = space(rest)?;
        let (rest, (rhs, rhs_height)) = operand(rest, nesting)?;
        height = height.max(rhs_height) + 1;
        check_depth(input, height)?;
        lhs = Expr::binary(op, lhs, rhs);
        input = rest;
    }
}

// ============================================================================
// Operators
// ============================================================================

fn or_op(input: &str) -> IResult<&str, BinaryOp> {
    if let Ok((rest, _)) = keyword("or", input) {
        return Ok((rest, BinaryOp::Or));
    }
    value(BinaryOp::Or, tag("||")).parse(input)
}

fn and_op(input: &str) -> IResult<&str, BinaryOp> {
    if let Ok((rest, _)) = keyword("and", input) {
        return Ok((rest, BinaryOp::And));
    }
    value(BinaryOp::And, tag("&&")).parse(input)
}

fn comparison_op(input: &str) -> IResult<&str, BinaryOp> {
    alt((
        value(BinaryOp::Eq, tag("==")),
        value(BinaryOp::Ne, tag("!=")),
        value(BinaryOp::Le, tag("<=")),
        value(BinaryOp::Ge, tag(">=")),
        value(BinaryOp::Lt, tag("<")),
        value(BinaryOp::Gt, tag(">")),
    ))
    .parse(input)
}

fn additive_op(input: &str) -> IResult<&str, BinaryOp> {
    alt((
        value(BinaryOp::Add, char('+')),
        value(BinaryOp::Sub, char('-')),
    ))
    .parse(input)
}

fn multiplicative_op(input: &str) -> IResult<&str, BinaryOp> {
    alt((
        value(BinaryOp::Mul, char('*')),
        value(BinaryOp::Div, char('/')),
        value(BinaryOp::Rem, char('%')),
    ))
    .parse(input)
}

// ============================================================================
// Grammar
// ============================================================================
//
// `nesting` counts the parentheses and prefix operators enclosing the current
// position; it bounds recursion before any subtree exists to measure.

fn expression(input: &str) -> IResult<&str, Node> {
    or_expr(input, 0)
}

fn or_expr(input: &str, nesting: usize) -> IResult<&str, Node> {
    fold_binary(input, nesting, and_expr, or_op)
}

fn and_expr(input: &str, nesting: usize) -> IResult<&str, Node> {
    fold_binary(input, nesting, not_expr, and_op)
}

fn not_expr(input: &str, nesting: usize) -> IResult<&str, Node> {
    if let Ok((rest, _)) = keyword("not", input) {
        check_depth(input, nesting + 1)?;
        let (rest, _) = space(rest)?;
        let (rest, (operand, height)) = not_expr(rest, nesting + 1)?;
        check_depth(input, height + 1)?;
        return Ok((rest, (Expr::unary(UnaryOp::Not, operand), height + 1)));
    }
    comparison(input, nesting)
}

fn comparison(input: &str, nesting: usize) -> IResult<&str, Node> {
    let (input, (lhs, lhs_height)) = additive(input, nesting)?;
    let (rest, _) = space(input)?;
    match comparison_op(rest) {
        Ok((rest, op)) => {
            let (rest, _) = space(rest)?;
            let (rest, (rhs, rhs_height)) = additive(rest, nesting)?;
            let height = lhs_height.max(rhs_height) + 1;
            check_depth(input, height)?;
            Ok((rest, (Expr::binary(op, lhs, rhs), height)))
        }
        Err(nom::Err::Error(_)) => Ok((input, (lhs, lhs_height))),
        Err(e) => Err(e),
    }
}

fn additive(input: &str, nesting: usize) -> IResult<&str, Node> {
    fold_binary(input, nesting, multiplicative, additive_op)
}

fn multiplicative(input: &str, nesting: usize) -> IResult<&str, Node> {
    fold_binary(input, nesting, unary, multiplicative_op)
}

fn unary(input: &str, nesting: usize) -> IResult<&str, Node> {
    let minus: IResult<&str, (char, &str)> = (char('-'), multispace0).parse(input);
    if let Ok((rest, _)) = minus {
        check_depth(input, nesting + 1)?;
        let (rest, (operand, height)) = unary(rest, nesting + 1)?;
        check_depth(input, height + 1)?;
        return Ok((rest, (Expr::unary(UnaryOp::Neg, operand), height + 1)));
    }
    primary(input, nesting)
}

fn primary(input: &str, nesting: usize) -> IResult<&str, Node> {
    let open: IResult<&str, (char, &str)> = (char('('), multispace0).parse(input);
    if let Ok((rest, _)) = open {
        check_depth(input, nesting + 1)?;
        let (rest, node) = or_expr(rest, nesting + 1)?;
        let close: IResult<&str, (&str, char)> = (multispace0, char(')')).parse(rest);
        let (rest, _) = close?;
        return Ok((rest, node));
    }

    map(
        alt((
            number,
            map(string_literal, |s| Expr::Literal(Value::String(s))),
            field,
            constant,
        )),
        |expr| (expr, 1),
    )
    .parse(input)
}

// ============================================================================
// Terminals
// ============================================================================

fn number_value(text: &str) -> Result<Value, String> {
    if !text.contains(|c| matches!(c, '.' | 'e' | 'E')) {
        if let Ok(n) = text.parse::<i64>() {
            return Ok(Value::from(n));
        }
    }
    let f: f64 = text.parse().map_err(|e: std::num::ParseFloatError| e.to_string())?;
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| format!("number out of range: {}", text))
}

fn number(input: &str) -> IResult<&str, Expr> {
    map(
        map_res(
            recognize((
                digit1,
                opt((char('.'), digit1)),
                opt((one_of("eE"), opt(one_of("+-")), digit1)),
            )),
            number_value,
        ),
        Expr::Literal,
    )
    .parse(input)
}

fn string_literal(input: &str) -> IResult<&str, String> {
    map(
        alt((
            delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
            delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
        )),
        |s: &str| s.to_string(),
    )
    .parse(input)
}

/// `$('name')` or `$("name")`
fn field(input: &str) -> IResult<&str, Expr> {
    map(
        preceded(
            (char('$'), multispace0, char('('), multispace0),
            terminated(string_literal, (multispace0, char(')'))),
        ),
        Expr::Field,
    )
    .parse(input)
}

fn constant(input: &str) -> IResult<&str, Expr> {
    let (rest, word) = identifier(input)?;
    let literal = match word {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => return fail(input),
    };
    Ok((rest, Expr::Literal(literal)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field_expr(name: &str) -> Expr {
        Expr::Field(name.to_string())
    }

    #[test]
    fn test_parse_field_equality() {
        let expr = parse_expression("$('x')==$('y')").unwrap();
        assert_eq!(
            expr,
            Expr::binary(BinaryOp::Eq, field_expr("x"), field_expr("y"))
        );
    }

    #[test]
    fn test_parse_double_quoted_field_with_spaces() {
        let expr = parse_expression(r#"  $ ( "heart rate" )  "#).unwrap();
        assert_eq!(expr, field_expr("heart rate"));
    }

    #[test]
    fn test_arithmetic_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::Add,
                Expr::Literal(json!(1)),
                Expr::binary(BinaryOp::Mul, Expr::Literal(json!(2)), Expr::Literal(json!(3)))
            )
        );
    }

    #[test]
    fn test_subtraction_is_left_associative() {
        let expr = parse_expression("10 - 4 - 3").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::Sub,
                Expr::binary(BinaryOp::Sub, Expr::Literal(json!(10)), Expr::Literal(json!(4))),
                Expr::Literal(json!(3))
            )
        );
    }

    #[test]
    fn test_logic_precedence() {
        let expr = parse_expression("not $('a') > 1 and true or false").unwrap();
        let expected = Expr::binary(
            BinaryOp::Or,
            Expr::binary(
                BinaryOp::And,
                Expr::unary(
                    UnaryOp::Not,
                    Expr::binary(BinaryOp::Gt, field_expr("a"), Expr::Literal(json!(1))),
                ),
                Expr::Literal(json!(true)),
            ),
            Expr::Literal(json!(false)),
        );
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_symbolic_logic_operators() {
        let words = parse_expression("true and false or true").unwrap();
        let symbols = parse_expression("true && false || true").unwrap();
        assert_eq!(words, symbols);
    }

    #[test]
    fn test_number_literals() {
        assert_eq!(parse_expression("42").unwrap(), Expr::Literal(json!(42)));
        assert_eq!(parse_expression("2.5").unwrap(), Expr::Literal(json!(2.5)));
        assert_eq!(parse_expression("1e3").unwrap(), Expr::Literal(json!(1000.0)));
        assert_eq!(
            parse_expression("-7").unwrap(),
            Expr::unary(UnaryOp::Neg, Expr::Literal(json!(7)))
        );
    }

    #[test]
    fn test_keywords_need_word_boundary() {
        assert!(parse_expression("true or").is_err());
        assert!(parse_expression("nothing").is_err());
        assert!(parse_expression("$('a') orx $('b')").is_err());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let nested = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        let err = parse_expression(&nested).unwrap_err();
        assert!(err.to_string().contains("maximum depth"), "{}", err);

        for prefix in ["-", "not "] {
            let chained = format!("{}true", prefix.repeat(10_000));
            assert!(matches!(parse_expression(&chained), Err(ExprError::Parse { .. })));
        }
    }

    #[test]
    fn test_long_operator_chain_is_rejected() {
        let chain = vec!["1"; 100_000].join(" + ");
        let err = parse_expression(&chain).unwrap_err();
        assert!(err.to_string().contains("maximum depth"), "{}", err);
    }

    #[test]
    fn test_nesting_within_limit() {
        let depth = MAX_EXPRESSION_DEPTH - 1;
        let nested = format!("{}$('x'){}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(parse_expression(&nested).unwrap(), field_expr("x"));

        let chain = vec!["1"; MAX_EXPRESSION_DEPTH].join(" + ");
        assert!(parse_expression(&chain).is_ok());
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", "$('x') ==", "$(x)", "(1 + 2", "1 = 2", "1 2", "'open"] {
            let err = parse_expression(bad).unwrap_err();
            assert!(
                matches!(err, ExprError::Parse { .. }),
                "expected parse error for {:?}",
                bad
            );
        }
    }
}
