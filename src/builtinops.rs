//! Built-in operations registry.
//!
//! Every keyword the evaluator recognizes lives in one table, keyed by its exact,
//! case-sensitive text. The evaluator looks the head atom of a chain up here
//! before considering user-defined functions or variables.
//!
//! ## Functions vs Special Forms
//!
//! - **Functions**: receive their operands already evaluated, left to right
//!   (e.g. `+`, `car`, `cons`, `equal?`)
//! - **Special Forms**: receive the raw operand nodes and decide themselves what
//!   to evaluate and when (`quote`, `if`, `cond`, `define`, `and`, `or`)
//!
//! ## Truth values
//!
//! Predicates answer with the true sentinel (printed `#t`) or the empty chain
//! (printed `()`). Only the sentinel counts as true where truth is tested; the
//! literal atoms `#t` and `#f` matter only to `null?` (and `#t` to `cond`).
//!
//! ## Error Handling
//!
//! Operand counts are checked against each entry's [`Arity`] before the handler
//! runs. Arithmetic and comparisons reject atoms that are not integer numerals,
//! and arithmetic reports overflow instead of wrapping. `cdr` never fails: past
//! the end of a chain, or applied to an atom, it yields the empty chain.

use crate::Error;
use crate::ast::{Handle, Node, NumberType};
use crate::evaluator::environment::lookup;
use crate::evaluator::{
    Scope, Session, eval_and, eval_cond, eval_define, eval_if, eval_or, eval_quote,
};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Primitive taking already-evaluated operands
pub type PrimitiveFn = fn(&[Handle]) -> Result<Handle, Error>;

/// Special form taking the session, raw operands, the current scope and evaluation depth
pub type SpecialFormFn = fn(&mut Session, &[Handle], &Scope, usize) -> Result<Handle, Error>;

/// Represents the implementation of a built-in expression (function or special form)
#[derive(Clone, Copy)]
pub enum OpKind {
    Function(PrimitiveFn),
    SpecialForm(SpecialFormFn),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Number of operands an operation accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly n operands
    Exact(usize),
    /// At least n operands
    AtLeast(usize),
    /// Any number of operands
    Any,
}

impl Arity {
    pub fn validate(self, arg_count: usize) -> Result<(), Error> {
        match self {
            Arity::Exact(n) if arg_count != n => Err(Error::arity_error(n, arg_count)),
            Arity::AtLeast(n) if arg_count < n => Err(Error::arity_error(n, arg_count)),
            _ => Ok(()),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The keyword text that selects this operation
    pub id: &'static str,
    pub op_kind: OpKind,
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl BuiltinOp {
    #[cfg_attr(not(test), expect(dead_code))]
    pub(crate) fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }

    pub(crate) fn validate_arity(&self, arg_count: usize) -> Result<(), Error> {
        self.arity.validate(arg_count)
    }
}

//
// Operand helpers
//

/// Read an operand as an integer numeral
fn number_arg(op: &str, arg: &Handle) -> Result<NumberType, Error> {
    arg.label()
        .and_then(|label| label.parse::<NumberType>().ok())
        .ok_or_else(|| Error::TypeError(format!("'{op}' requires numeric arguments, got {arg}")))
}

fn single(args: &[Handle]) -> Result<&Handle, Error> {
    match args {
        [arg] => Ok(arg),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

fn pair_of(args: &[Handle]) -> Result<(&Handle, &Handle), Error> {
    match args {
        [first, second] => Ok((first, second)),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

/// Descend one level into a chain
pub(crate) fn car_of(list: &Handle) -> Result<Handle, Error> {
    match list.node() {
        Node::Link { content, .. } => Ok(content.clone()),
        Node::Nil => Err(Error::EvalError("car of empty list".into())),
        _ => Err(Error::TypeError(format!("car requires a list, got {list}"))),
    }
}

/// Advance one link; the end of a chain (or a non-chain) gives the empty chain
pub(crate) fn cdr_of(list: &Handle) -> Handle {
    list.continuation().cloned().unwrap_or_else(Handle::nil)
}

/// Whether every character of an atom label is a digit, allowing one leading
/// '-'. A lone `-` passes.
fn is_numeral(label: &str) -> bool {
    let digits = label.strip_prefix('-').unwrap_or(label);
    !label.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

//
// Builtin Function Implementations
//

// Fold over all operands, the first one seeding the accumulator
macro_rules! arithmetic_fold {
    ($name:ident, $op_str:expr, $checked:ident, $what:literal) => {
        fn $name(args: &[Handle]) -> Result<Handle, Error> {
            let mut numbers = args.iter().map(|arg| number_arg($op_str, arg));
            let mut acc = match numbers.next() {
                Some(first) => first?,
                None => return Err(Error::arity_error(1, 0)),
            };
            for n in numbers {
                acc = acc
                    .$checked(n?)
                    .ok_or_else(|| Error::EvalError(concat!("Integer overflow in ", $what).into()))?;
            }
            Ok(Handle::number(acc))
        }
    };
}

arithmetic_fold!(builtin_add, "+", checked_add, "addition");
arithmetic_fold!(builtin_sub, "-", checked_sub, "subtraction");
arithmetic_fold!(builtin_mul, "*", checked_mul, "multiplication");

macro_rules! numeric_comparison {
    ($name:ident, $op:tt, $op_str:expr) => {
        fn $name(args: &[Handle]) -> Result<Handle, Error> {
            let (a, b) = pair_of(args)?;
            let (a, b) = (number_arg($op_str, a)?, number_arg($op_str, b)?);
            Ok(Handle::boolean(a $op b))
        }
    };
}

numeric_comparison!(builtin_lt, <, "<");
numeric_comparison!(builtin_gt, >, ">");
numeric_comparison!(builtin_le, <=, "<=");
numeric_comparison!(builtin_ge, >=, ">=");

fn builtin_not(args: &[Handle]) -> Result<Handle, Error> {
    Ok(Handle::boolean(!single(args)?.is_true()))
}

fn builtin_car(args: &[Handle]) -> Result<Handle, Error> {
    car_of(single(args)?)
}

fn builtin_cdr(args: &[Handle]) -> Result<Handle, Error> {
    Ok(cdr_of(single(args)?))
}

fn builtin_cadr(args: &[Handle]) -> Result<Handle, Error> {
    car_of(&cdr_of(single(args)?))
}

fn builtin_caddr(args: &[Handle]) -> Result<Handle, Error> {
    car_of(&cdr_of(&cdr_of(single(args)?)))
}

fn builtin_cadddr(args: &[Handle]) -> Result<Handle, Error> {
    car_of(&cdr_of(&cdr_of(&cdr_of(single(args)?))))
}

fn builtin_caddddr(args: &[Handle]) -> Result<Handle, Error> {
    car_of(&cdr_of(&cdr_of(&cdr_of(&cdr_of(single(args)?)))))
}

fn builtin_cdar(args: &[Handle]) -> Result<Handle, Error> {
    Ok(cdr_of(&car_of(single(args)?)?))
}

fn builtin_cons(args: &[Handle]) -> Result<Handle, Error> {
    let (first, rest) = pair_of(args)?;
    if rest.is_false_or_empty() {
        return Ok(Handle::list(vec![first.clone()]));
    }
    if !rest.is_list() {
        return Err(Error::TypeError(format!(
            "cons requires a list as second argument, got {rest}"
        )));
    }
    // The tail is shared, not copied
    Ok(Handle::link(first.clone(), Some(rest.clone())))
}

fn builtin_append(args: &[Handle]) -> Result<Handle, Error> {
    let (front, back) = pair_of(args)?;
    let tail = if back.is_list() {
        Some(back.clone())
    } else if back.is_false_or_empty() {
        None
    } else {
        return Err(Error::TypeError(format!(
            "append requires a list as second argument, got {back}"
        )));
    };

    if !front.is_list() && !front.is_false_or_empty() {
        return Err(Error::TypeError(format!(
            "append requires a list as first argument, got {front}"
        )));
    }

    // Fresh links for the front chain, the back chain attached as-is
    let items: Vec<Handle> = front.elements().collect();
    let mut chain = tail;
    for item in items.into_iter().rev() {
        chain = Some(Handle::link(item, chain));
    }
    Ok(chain.unwrap_or_else(Handle::nil))
}

fn builtin_list(args: &[Handle]) -> Result<Handle, Error> {
    Ok(Handle::list(args.to_vec()))
}

fn builtin_last(args: &[Handle]) -> Result<Handle, Error> {
    let list = single(args)?;
    match list.node() {
        Node::Link { .. } => list
            .elements()
            .last()
            .ok_or_else(|| Error::EvalError("last of empty list".into())),
        Node::Nil => Err(Error::EvalError("last of empty list".into())),
        _ => Err(Error::TypeError(format!("last requires a list, got {list}"))),
    }
}

fn builtin_length(args: &[Handle]) -> Result<Handle, Error> {
    let list = single(args)?;
    if list.is_empty_structure() {
        return Ok(Handle::number(0));
    }
    if !list.is_list() {
        return Err(Error::TypeError(format!("length requires a list, got {list}")));
    }
    let count = NumberType::try_from(list.elements().count())
        .map_err(|_| Error::EvalError("list too long to measure".into()))?;
    Ok(Handle::number(count))
}

fn builtin_is_symbol(args: &[Handle]) -> Result<Handle, Error> {
    Ok(Handle::boolean(single(args)?.is_atom()))
}

// A chain is judged by its first element
fn builtin_is_number(args: &[Handle]) -> Result<Handle, Error> {
    let arg = single(args)?;
    let candidate = arg.content().unwrap_or(arg);
    Ok(Handle::boolean(candidate.label().is_some_and(is_numeral)))
}

fn builtin_is_list(args: &[Handle]) -> Result<Handle, Error> {
    Ok(Handle::boolean(single(args)?.is_list()))
}

fn builtin_is_null(args: &[Handle]) -> Result<Handle, Error> {
    let arg = single(args)?;
    let null = if arg.is_true() || arg.label() == Some("#t") {
        false
    } else if arg.is_false_or_empty() {
        true
    } else {
        arg.is_empty_structure()
    };
    Ok(Handle::boolean(null))
}

fn builtin_equal(args: &[Handle]) -> Result<Handle, Error> {
    let (a, b) = pair_of(args)?;
    Ok(Handle::boolean(a == b))
}

/// The whole matching pair, or the atom `#f` when nothing matches
fn builtin_assoc(args: &[Handle]) -> Result<Handle, Error> {
    let (key, alist) = pair_of(args)?;
    Ok(lookup(key, alist).unwrap_or_else(Handle::false_atom))
}

/// Global registry of all built-in operations.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn function(id: &'static str, arity: Arity, f: PrimitiveFn) -> BuiltinOp {
        BuiltinOp {
            id,
            op_kind: OpKind::Function(f),
            arity,
        }
    }

    fn special_form(id: &'static str, arity: Arity, f: SpecialFormFn) -> BuiltinOp {
        BuiltinOp {
            id,
            op_kind: OpKind::SpecialForm(f),
            arity,
        }
    }

    vec![
        // Special forms
        special_form("quote", Arity::Exact(1), eval_quote),
        special_form("if", Arity::Exact(3), eval_if),
        special_form("cond", Arity::Any, eval_cond),
        special_form("define", Arity::Exact(2), eval_define),
        // Logical operations (upper-case spellings are accepted as aliases)
        special_form("and", Arity::Any, eval_and),
        special_form("AND", Arity::Any, eval_and),
        special_form("or", Arity::Any, eval_or),
        special_form("OR", Arity::Any, eval_or),
        function("not", Arity::Exact(1), builtin_not),
        function("NOT", Arity::Exact(1), builtin_not),
        // Arithmetic operations
        function("+", Arity::AtLeast(1), builtin_add),
        function("-", Arity::AtLeast(1), builtin_sub),
        function("*", Arity::AtLeast(1), builtin_mul),
        // Comparison operations
        function("<", Arity::Exact(2), builtin_lt),
        function(">", Arity::Exact(2), builtin_gt),
        function("<=", Arity::Exact(2), builtin_le),
        function(">=", Arity::Exact(2), builtin_ge),
        // List operations
        function("car", Arity::Exact(1), builtin_car),
        function("cdr", Arity::Exact(1), builtin_cdr),
        function("cadr", Arity::Exact(1), builtin_cadr),
        function("caddr", Arity::Exact(1), builtin_caddr),
        function("cadddr", Arity::Exact(1), builtin_cadddr),
        function("caddddr", Arity::Exact(1), builtin_caddddr),
        function("cdar", Arity::Exact(1), builtin_cdar),
        function("cons", Arity::Exact(2), builtin_cons),
        function("append", Arity::Exact(2), builtin_append),
        function("list", Arity::Any, builtin_list),
        function("last", Arity::Exact(1), builtin_last),
        function("length", Arity::Exact(1), builtin_length),
        function("assoc", Arity::Exact(2), builtin_assoc),
        // Predicates
        function("symbol?", Arity::Exact(1), builtin_is_symbol),
        function("number?", Arity::Exact(1), builtin_is_number),
        function("list?", Arity::Exact(1), builtin_is_list),
        function("null?", Arity::Exact(1), builtin_is_null),
        function("equal?", Arity::Exact(2), builtin_equal),
    ]
});

/// Lazy static map from keyword text to BuiltinOp (private - use find_op)
static BUILTIN_TABLE: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.id, op)).collect()
});

/// Get all builtin operations
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by its exact keyword text
pub fn find_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_TABLE.get(id).copied()
}
