//! Association-chain environments.
//!
//! An environment is an ordinary chain whose elements are `(name value)` pairs,
//! most recent first. Defining a name prepends a new pair and returns the new
//! head; the previous chain is shared, never modified, so a redefinition shadows
//! the older binding instead of replacing it.

use crate::Error;
use crate::ast::{Handle, Node};

/// Variable or function bindings, stored as an association chain
#[derive(Debug, Clone)]
pub struct Environment {
    head: Handle,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Environment { head: Handle::nil() }
    }

    /// The underlying chain of pairs
    pub fn as_handle(&self) -> &Handle {
        &self.head
    }

    /// Find the most recent pair whose key has the same head atom as `symbol`
    pub fn lookup(&self, symbol: &Handle) -> Option<Handle> {
        lookup(symbol, &self.head)
    }

    /// The value bound to `symbol`, if any
    pub fn get(&self, symbol: &Handle) -> Option<Handle> {
        self.lookup(symbol).and_then(|pair| pair_value(&pair))
    }

    /// Return a new environment with `(symbol value)` in front of this one
    #[must_use]
    pub fn define(&self, symbol: Handle, value: Handle) -> Environment {
        let pair = Handle::list(vec![symbol, value]);
        let rest = self.head.is_list().then(|| self.head.clone());
        Environment {
            head: Handle::link(pair, rest),
        }
    }

    /// All `(key, value)` pairs, most recent first, shadowed ones included
    pub fn bindings(&self) -> impl Iterator<Item = (Handle, Handle)> + use<> {
        self.head.elements().filter_map(|pair| {
            let key = pair.content()?.clone();
            let value = pair_value(&pair)?;
            Some((key, value))
        })
    }

    pub fn is_empty(&self) -> bool {
        !self.head.is_list()
    }
}

/// Scan the pairs of `chain` for one whose key's head atom equals the head atom
/// of `symbol`. Keys may be bare atoms (variables) or chains such as
/// `(double x)` (function definitions); both match on their leading atom.
///
/// This is the search behind variable lookup, function lookup and the `assoc`
/// primitive. Elements with no head atom are skipped.
pub fn lookup(symbol: &Handle, chain: &Handle) -> Option<Handle> {
    let wanted = symbol.head_atom()?;
    chain
        .elements()
        .find(|pair| pair.head_atom() == Some(wanted))
}

/// The second element of a binding pair
pub(crate) fn pair_value(pair: &Handle) -> Option<Handle> {
    pair.continuation()?.content().cloned()
}

/// Bind each formal parameter to its actual argument, evaluating actuals in
/// order with `eval_actual`. Returns the extended `new_env`.
///
/// The result holds only the parameters; nothing links it back to the caller's
/// scope or to the scope the function was defined in.
pub(crate) fn bind_formals<F>(
    formals: &Handle,
    actuals: &Handle,
    mut new_env: Environment,
    mut eval_actual: F,
) -> Result<Environment, Error>
where
    F: FnMut(&Handle) -> Result<Handle, Error>,
{
    let expected = formals.elements().count();
    let got = actuals.elements().count();
    if expected != got {
        return Err(Error::arity_error(expected, got));
    }

    for (formal, actual) in formals.elements().zip(actuals.elements()) {
        if !matches!(formal.node(), Node::Atom(_)) {
            return Err(Error::TypeError(format!(
                "function parameters must be symbols, got {formal}"
            )));
        }
        let value = eval_actual(&actual)?;
        new_env = new_env.define(formal, value);
    }
    Ok(new_env)
}
