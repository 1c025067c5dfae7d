//! Criteria parser
//!
//! Parses textual criteria such as `age >= 30, name = 'Alice'` into
//! [`SelectionCriterion`] values. Criteria are separated by commas or `AND`.
//!
//! Literals: `'quoted'` or `"quoted"` strings, `null`, `true`, `false`,
//! integers, floats, and bare words (taken as strings).

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, tag_no_case, take_while, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::{all_consuming, map, map_res, recognize, verify},
    multi::separated_list1,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use super::predicate::{Operator, SelectionCriterion};
use crate::error::{Error, Result};
use crate::storage::Value;

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')),
    ))(input)
}

fn operator(input: &str) -> IResult<&str, Operator> {
    map_res(
        alt((
            tag(">="),
            tag("<="),
            tag("!="),
            tag("=="),
            tag("="),
            tag("<"),
            tag(">"),
        )),
        |s: &str| s.parse::<Operator>(),
    )(input)
}

fn quoted(input: &str) -> IResult<&str, Value> {
    map(
        alt((
            delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
            delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
        )),
        |s: &str| Value::String(s.to_string()),
    )(input)
}

/// A bare word may not open with a quote, so an unterminated string is an error
fn bare(input: &str) -> IResult<&str, Value> {
    map(
        verify(is_not(" \t\r\n,"), |s: &str| !s.starts_with(['\'', '"'])),
        classify,
    )(input)
}

/// Type a bare literal
fn classify(token: &str) -> Value {
    match token.to_ascii_lowercase().as_str() {
        "null" => return Value::Null,
        "true" => return Value::Boolean(true),
        "false" => return Value::Boolean(false),
        _ => {}
    }
    if let Ok(i) = token.parse::<i64>() {
        return Value::Integer(i);
    }
    // "inf"/"nan" parse as floats; only numeric-looking tokens count
    if token.chars().any(|c| c.is_ascii_digit()) {
        if let Ok(f) = token.parse::<f64>() {
            return Value::Float(f);
        }
    }
    Value::String(token.to_string())
}

fn literal(input: &str) -> IResult<&str, Value> {
    alt((quoted, bare))(input)
}

fn criterion(input: &str) -> IResult<&str, SelectionCriterion> {
    map(
        tuple((
            preceded(multispace0, identifier),
            preceded(multispace0, operator),
            preceded(multispace0, literal),
        )),
        |(field, op, value)| SelectionCriterion::new(field, op, value),
    )(input)
}

fn separator(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(multispace0, tag(","), multispace0),
        delimited(multispace1, tag_no_case("and"), multispace1),
    ))(input)
}

/// Parse a criteria list. Blank input is an empty list (matches everything).
pub fn parse_criteria(input: &str) -> Result<Vec<SelectionCriterion>> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }

    all_consuming(terminated(
        separated_list1(separator, criterion),
        multispace0,
    ))(input)
    .map(|(_, criteria)| criteria)
    .map_err(|e| Error::ParseError(format!("invalid criteria '{}': {}", input, e)))
}

/// Parse exactly one criterion
pub fn parse_criterion(input: &str) -> Result<SelectionCriterion> {
    let mut criteria = parse_criteria(input)?;
    if criteria.len() != 1 {
        return Err(Error::ParseError(format!(
            "expected one criterion, found {}",
            criteria.len()
        )));
    }
    Ok(criteria.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single() {
        let c = parse_criterion("age>=30").unwrap();
        assert_eq!(c, SelectionCriterion::new("age", Operator::Gte, 30));

        let c = parse_criterion("  name = 'Alice Smith' ").unwrap();
        assert_eq!(c, SelectionCriterion::equals("name", "Alice Smith"));

        let c = parse_criterion("score == 2.5").unwrap();
        assert_eq!(c, SelectionCriterion::equals("score", 2.5));
    }

    #[test]
    fn test_parse_list() {
        let criteria = parse_criteria("a = 1, b > 5 AND c != null and d < \"x,y\"").unwrap();
        assert_eq!(
            criteria,
            vec![
                SelectionCriterion::new("a", Operator::Eq, 1),
                SelectionCriterion::new("b", Operator::Gt, 5),
                SelectionCriterion::new("c", Operator::Neq, Value::Null),
                SelectionCriterion::new("d", Operator::Lt, "x,y"),
            ]
        );
    }

    #[test]
    fn test_literal_typing() {
        assert_eq!(classify("-12"), Value::Integer(-12));
        assert_eq!(classify("1e3"), Value::Float(1000.0));
        assert_eq!(classify("TRUE"), Value::Boolean(true));
        assert_eq!(classify("nan"), Value::from("nan"));
        assert_eq!(classify("bob"), Value::from("bob"));
    }

    #[test]
    fn test_blank_is_empty() {
        assert!(parse_criteria("   ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_criteria("age 30"), Err(Error::ParseError(_))));
        assert!(matches!(parse_criteria("= 30"), Err(Error::ParseError(_))));
        assert!(matches!(parse_criteria("a = 1,"), Err(Error::ParseError(_))));
        assert!(matches!(parse_criterion("a = 1, b = 2"), Err(Error::ParseError(_))));
    }

    #[test]
    fn test_unterminated_quote_is_an_error() {
        assert!(matches!(parse_criteria("name = 'Alice"), Err(Error::ParseError(_))));
        assert!(matches!(parse_criteria("name = \"Bob"), Err(Error::ParseError(_))));
        assert!(matches!(
            parse_criteria("a = 1, name = 'Alice"),
            Err(Error::ParseError(_))
        ));
        // quotes inside a bare word are kept as text
        assert_eq!(
            parse_criterion("name = O'Brien").unwrap().value,
            Value::from("O'Brien")
        );
    }
}
