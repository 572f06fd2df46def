//! ChainLisp - interactive evaluator for a minimal Scheme-like language
//!
//! Programs and runtime values share one representation: chains of linked
//! nodes, where each link holds the element at its position (`content`) and a
//! pointer to the next link (`continuation`). The evaluator walks these chains
//! directly, dispatching on keyword atoms for special forms and primitives and
//! falling back to user-defined functions and variables.
//!
//! ```scheme
//! (+ 1 2 3)                       ; 6
//! (if (> 3 2) 1 0)                ; 1
//! (car '(a b c))                  ; a
//! (cond ((> 1 2) 'no) (else 'yes)); yes
//! (define (double x) (* x 2))
//! (double 5)                      ; 10
//! ```
//!
//! ## Semantics worth knowing
//!
//! - Unbound symbols evaluate to themselves; numerals are just atoms that
//!   happen to parse as integers.
//! - `()` is both the empty list and the false value. The literal atoms `#t`
//!   and `#f` are accepted wherever a truth value is tested.
//! - A user function body sees only its own parameters, never the variables of
//!   the defining or calling scope. Function definitions are always global.
//!
//! ## Modules
//!
//! - `ast`: node chains, handles, printing and structural equality
//! - `evaluator`: evaluation session, dispatch core and special forms
//! - `builtinops`: keyword registry and primitive library
//! - `scheme`: reader from text to node chains

use std::fmt;

/// Maximum parsing depth to prevent stack overflow attacks
pub const MAX_PARSE_DEPTH: usize = 64;

/// Maximum evaluation depth, bounding runaway recursion in user functions.
/// Each level of a recursive call uses about three units.
pub const MAX_EVAL_DEPTH: usize = 10_000;

/// Remaining native stack below which evaluation grows the stack
pub(crate) const STACK_RED_ZONE: usize = 128 * 1024;

/// Size of each additional stack segment
pub(crate) const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (stray closing parenthesis, dangling quote)
    InvalidSyntax,
    /// Input ended before the expression was complete (EOF, unclosed parens)
    Incomplete,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Extra input found after a complete, valid expression
    TrailingContent,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 60 chars)
    pub context: Option<String>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, context: Option<String>) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
        }
    }

    /// Create a simple ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None)
    }

    /// Create a ParseError with context extracted from input at a given byte offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        const MAX_CONTEXT: usize = 60;

        let context_start = input
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|&i| i + 20 <= error_offset)
            .last()
            .unwrap_or(0);

        let context_str: String = input[context_start..].chars().take(MAX_CONTEXT).collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.len() < input.len() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context))
    }

    /// Whether more input could complete the expression
    pub fn is_incomplete(&self) -> bool {
        self.kind == ParseErrorKind::Incomplete
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    ParseError(ParseError),
    EvalError(String),
    TypeError(String),
    ArityError {
        expected: usize,
        got: usize,
        expression: Option<String>,
    },
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityError with expression context
    pub fn arity_error_with_expr(expected: usize, got: usize, expression: String) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: Some(expression),
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::ParseError(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ParseError(e) => {
                write!(f, "ParseError: {}", e.message)?;
                if let Some(context) = &e.context {
                    write!(f, "\nContext: {context}")?;
                }
                Ok(())
            }
            Error::EvalError(msg) => write!(f, "EvaluationError: {msg}"),
            Error::TypeError(msg) => write!(f, "Type error: {msg}"),
            Error::ArityError {
                expected,
                got,
                expression,
            } => match expression {
                Some(expr) => write!(
                    f,
                    "ArityError: expression {expr}: expected {expected} arguments, got {got}"
                ),
                None => write!(
                    f,
                    "ArityError: function expected {expected} arguments but got {got}"
                ),
            },
        }
    }
}

impl std::error::Error for Error {}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod scheme;

pub use ast::{Handle, Node};
pub use evaluator::{Session, eval};
pub use scheme::{ParseConfig, parse_scheme, parse_scheme_sequence, parse_scheme_with_config};
