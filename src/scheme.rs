//! Reader from source text to node chains.
//!
//! The surface syntax is deliberately small: parentheses, the `'` quote
//! shorthand and atoms. An atom is any maximal run of characters that are not
//! whitespace, parentheses or `'` (nor `;` when comments are enabled), so
//! numerals, `#t`, `#f` and names like `null?` all read as plain atoms. Meaning
//! is assigned later by the evaluator.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_till, take_while1},
    character::complete::{char, multispace0},
    combinator::cut,
    error::ErrorKind,
    multi::many0,
    sequence::{preceded, terminated},
};

use crate::ast::Handle;
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Reader options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParseConfig {
    /// Accept `;` line comments
    pub handle_comments: bool,
}

type ParseResult<'a> = IResult<&'a str, Handle>;

fn is_atom_char(c: char, config: ParseConfig) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '\'') && !(config.handle_comments && c == ';')
}

/// Skip whitespace and, if enabled, comments
fn skip_ignored(input: &str, config: ParseConfig) -> IResult<&str, ()> {
    let (mut input, _) = multispace0.parse(input)?;
    while config.handle_comments && input.starts_with(';') {
        let (rest, _) = take_till(|c: char| c == '\n').parse(input)?;
        let (rest, _) = multispace0.parse(rest)?;
        input = rest;
    }
    Ok((input, ()))
}

/// Convert nom parsing errors to structured parse errors
fn parse_error_from_nom(input: &str, error: nom::Err<nom::error::Error<&str>>) -> ParseError {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = input.len().saturating_sub(e.input.len());
            match e.code {
                ErrorKind::TooLarge => ParseError::with_context(
                    ParseErrorKind::TooDeeplyNested,
                    format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                    input,
                    position,
                ),
                _ if e.input.is_empty() => ParseError::from_message(
                    ParseErrorKind::Incomplete,
                    "Unexpected end of input",
                ),
                _ => {
                    let near: String = e.input.chars().take(10).collect();
                    ParseError::with_context(
                        ParseErrorKind::InvalidSyntax,
                        format!("Invalid syntax near '{near}'"),
                        input,
                        position,
                    )
                }
            }
        }
        nom::Err::Incomplete(_) => {
            ParseError::from_message(ParseErrorKind::Incomplete, "Incomplete input")
        }
    }
}

fn parse_atom(input: &str, config: ParseConfig) -> ParseResult<'_> {
    let (input, label) = take_while1(|c: char| is_atom_char(c, config)).parse(input)?;
    Ok((input, Handle::atom(label)))
}

/// Parse a parenthesized chain; `()` reads as the empty chain
fn parse_list(input: &str, config: ParseConfig, depth: usize) -> ParseResult<'_> {
    let (input, _) = char('(').parse(input)?;
    let (input, elements) = many0(|input| parse_sexpr(input, config, depth + 1)).parse(input)?;
    // Once a chain is open, a missing ')' is fatal rather than a reason to backtrack
    let (input, _) = cut(preceded(|input| skip_ignored(input, config), char(')'))).parse(input)?;
    Ok((input, Handle::list(elements)))
}

/// Parse quoted expression ('expr -> (quote expr))
fn parse_quote(input: &str, config: ParseConfig, depth: usize) -> ParseResult<'_> {
    let (input, _) = char('\'').parse(input)?;
    let (input, expr) = cut(|input| parse_sexpr(input, config, depth + 1)).parse(input)?;
    Ok((input, Handle::list(vec![Handle::atom("quote"), expr])))
}

/// Parse one expression, skipping leading whitespace
fn parse_sexpr(input: &str, config: ParseConfig, depth: usize) -> ParseResult<'_> {
    if depth >= MAX_PARSE_DEPTH {
        // Failure, not Error: no alternative can recover from this
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::TooLarge,
        )));
    }
    preceded(
        |input| skip_ignored(input, config),
        alt((
            |input| parse_quote(input, config, depth),
            |input| parse_list(input, config, depth),
            |input| parse_atom(input, config),
        )),
    )
    .parse(input)
}

/// Parse a complete S-expression from input.
pub fn parse_scheme(input: &str) -> Result<Handle, Error> {
    parse_scheme_with_config(input, ParseConfig::default())
}

/// Parse exactly one expression; anything but whitespace (and comments, if
/// enabled) after it is an error.
pub fn parse_scheme_with_config(input: &str, config: ParseConfig) -> Result<Handle, Error> {
    match terminated(
        |input| parse_sexpr(input, config, 0),
        |input| skip_ignored(input, config),
    )
    .parse(input)
    {
        Ok(("", value)) => Ok(value),
        Ok((remaining, _)) => Err(ParseError::with_context(
            ParseErrorKind::TrailingContent,
            format!("Unexpected remaining input: '{remaining}'"),
            input,
            input.len() - remaining.len(),
        )
        .into()),
        Err(e) => Err(parse_error_from_nom(input, e).into()),
    }
}

/// Parse every expression in `input`, in order. Blank input gives an empty vector.
pub fn parse_scheme_sequence(input: &str, config: ParseConfig) -> Result<Vec<Handle>, Error> {
    let mut expressions = Vec::new();
    let mut rest = input;
    loop {
        let (after, _) =
            skip_ignored(rest, config).map_err(|e| parse_error_from_nom(input, e))?;
        if after.is_empty() {
            return Ok(expressions);
        }
        let (after, expr) =
            parse_sexpr(after, config, 0).map_err(|e| parse_error_from_nom(input, e))?;
        expressions.push(expr);
        rest = after;
    }
}
