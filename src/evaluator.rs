//! Evaluation of node chains.
//!
//! A [`Session`] holds the global variable and function environments and
//! evaluates one top-level expression at a time. Evaluation of a chain whose
//! head atom is a keyword dispatches through the registry in
//! [`crate::builtinops`]. A chain whose head names a user-defined function is
//! applied. Any other chain is first walked to its end, evaluating each
//! remaining element for its effects, and then resolved: a function defined
//! during the walk is applied, otherwise a variable of that name gives its
//! value, otherwise the chain evaluates to itself.

use crate::ast::{Handle, Node};
use crate::builtinops::{BuiltinOp, OpKind, find_op};
use crate::scheme::{ParseConfig, parse_scheme_sequence};
use crate::{Error, MAX_EVAL_DEPTH, STACK_GROW_SIZE, STACK_RED_ZONE};

pub mod environment;

pub use environment::Environment;
use environment::{bind_formals, pair_value};

/// Where an expression is being evaluated
#[derive(Debug, Clone)]
pub enum Scope {
    /// Top level: variables come from, and definitions go to, the session
    Global,
    /// Inside a user-function body: only the call's parameter bindings are visible
    Local(Environment),
}

/// Global state shared by all top-level evaluations
#[derive(Debug, Clone, Default)]
pub struct Session {
    variables: Environment,
    functions: Environment,
}

impl Session {
    pub fn new() -> Self {
        Session::default()
    }

    pub fn variables(&self) -> &Environment {
        &self.variables
    }

    pub fn functions(&self) -> &Environment {
        &self.functions
    }

    /// All variable bindings followed by all function definitions, most recent
    /// first within each group
    pub fn bindings(&self) -> Vec<(Handle, Handle)> {
        self.variables
            .bindings()
            .chain(self.functions.bindings())
            .collect()
    }

    /// Evaluate one top-level expression
    pub fn eval(&mut self, expr: &Handle) -> Result<Handle, Error> {
        self.eval_with_depth_tracking(expr, &Scope::Global, 0)
    }

    /// Read every expression in `input` (comments allowed) and evaluate them in
    /// order, returning the last result. Blank input gives an unspecified value.
    pub fn eval_str(&mut self, input: &str) -> Result<Handle, Error> {
        let config = ParseConfig {
            handle_comments: true,
        };
        let mut result = Handle::unspecified();
        for expr in parse_scheme_sequence(input, config)? {
            result = self.eval(&expr)?;
        }
        Ok(result)
    }

    fn environment_for<'a>(&'a self, scope: &'a Scope) -> &'a Environment {
        match scope {
            Scope::Global => &self.variables,
            Scope::Local(env) => env,
        }
    }

    /// The bound value, or the node itself when nothing is bound
    fn resolve_variable(&self, node: &Handle, scope: &Scope) -> Handle {
        self.environment_for(scope)
            .get(node)
            .unwrap_or_else(|| node.clone())
    }

    pub(crate) fn eval_with_depth_tracking(
        &mut self,
        node: &Handle,
        scope: &Scope,
        depth: usize,
    ) -> Result<Handle, Error> {
        if depth >= MAX_EVAL_DEPTH {
            return Err(Error::EvalError(format!(
                "Evaluation depth limit exceeded (max: {MAX_EVAL_DEPTH})"
            )));
        }
        // Grow the native stack when running low
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || match node.node() {
            Node::Atom(_) => Ok(self.resolve_variable(node, scope)),
            Node::Nil | Node::True | Node::Unspecified => Ok(node.clone()),
            Node::Link {
                content,
                continuation,
            } => self.eval_chain(node, content, continuation.as_ref(), scope, depth),
        })
    }

    fn eval_chain(
        &mut self,
        node: &Handle,
        content: &Handle,
        continuation: Option<&Handle>,
        scope: &Scope,
        depth: usize,
    ) -> Result<Handle, Error> {
        match content.label() {
            Some(keyword) => {
                if let Some(op) = find_op(keyword) {
                    return self.apply_builtin(op, node, scope, depth);
                }
            }
            None => {
                // A structured head is evaluated for its effects only
                self.eval_with_depth_tracking(content, scope, depth + 1)?;
                self.walk_remainder(continuation, scope, depth)?;
                return Ok(node.clone());
            }
        }

        // Binding evaluates every actual, so a call skips the walk
        if let Some(definition) = self.functions.lookup(node) {
            return self.apply_function(&definition, node, scope, depth);
        }
        self.walk_remainder(continuation, scope, depth)?;
        match self.functions.lookup(node) {
            Some(definition) => self.apply_function(&definition, node, scope, depth),
            None => Ok(self.resolve_variable(node, scope)),
        }
    }

    /// Walk the rest of a chain for its effects; the results are discarded.
    ///
    /// Every suffix is handled as a chain of its own. A keyword head dispatches
    /// and consumes the remainder, a structured head is evaluated, and
    /// atom-headed suffixes naming a user function are applied once the end is
    /// reached, innermost first. The walk is a loop, so long chains cost no
    /// extra depth.
    fn walk_remainder(
        &mut self,
        rest: Option<&Handle>,
        scope: &Scope,
        depth: usize,
    ) -> Result<(), Error> {
        let mut pending = Vec::new();
        let mut link = rest.cloned();
        while let Some(suffix) = link {
            let Some(head) = suffix.content() else {
                break;
            };
            match head.label() {
                Some(keyword) => {
                    if let Some(op) = find_op(keyword) {
                        self.apply_builtin(op, &suffix, scope, depth + 1)?;
                        break;
                    }
                    pending.push(suffix.clone());
                }
                None => {
                    self.eval_with_depth_tracking(head, scope, depth + 1)?;
                }
            }
            link = suffix.continuation().cloned();
        }

        for suffix in pending.iter().rev() {
            if let Some(definition) = self.functions.lookup(suffix) {
                self.apply_function(&definition, suffix, scope, depth + 1)?;
            }
        }
        Ok(())
    }

    fn eval_args(
        &mut self,
        args: &[Handle],
        scope: &Scope,
        depth: usize,
    ) -> Result<Vec<Handle>, Error> {
        args.iter()
            .map(|arg| self.eval_with_depth_tracking(arg, scope, depth + 1))
            .collect()
    }

    fn apply_builtin(
        &mut self,
        op: &BuiltinOp,
        node: &Handle,
        scope: &Scope,
        depth: usize,
    ) -> Result<Handle, Error> {
        let args: Vec<Handle> = node.elements().skip(1).collect();
        if let Err(Error::ArityError { expected, got, .. }) = op.validate_arity(args.len()) {
            return Err(Error::arity_error_with_expr(expected, got, node.to_string()));
        }
        log::trace!("dispatching '{}' with {} operands", op.id, args.len());

        let result = match op.op_kind {
            OpKind::Function(f) => {
                let evaluated = self.eval_args(&args, scope, depth)?;
                f(&evaluated)
            }
            OpKind::SpecialForm(special_form) => special_form(self, &args, scope, depth),
        };
        result.map_err(|err| add_context(err, node))
    }

    /// Apply a stored `((name formals...) body)` definition to the call `node`.
    /// Actuals are evaluated in the caller's scope; the body runs in a fresh
    /// scope holding only the parameters.
    fn apply_function(
        &mut self,
        definition: &Handle,
        node: &Handle,
        scope: &Scope,
        depth: usize,
    ) -> Result<Handle, Error> {
        let formals = definition
            .content()
            .and_then(Handle::continuation)
            .cloned()
            .unwrap_or_else(Handle::nil);
        let body = pair_value(definition).ok_or_else(|| {
            Error::EvalError(format!("malformed function definition: {definition}"))
        })?;
        let actuals = node.continuation().cloned().unwrap_or_else(Handle::nil);

        log::debug!("calling {node}");
        let local = bind_formals(&formals, &actuals, Environment::new(), |actual| {
            self.eval_with_depth_tracking(actual, scope, depth + 1)
        })
        .map_err(|err| match err {
            Error::ArityError {
                expected,
                got,
                expression: None,
            } => Error::arity_error_with_expr(expected, got, node.to_string()),
            other => add_context(other, node),
        })?;

        self.eval_with_depth_tracking(&body, &Scope::Local(local), depth + 1)
    }
}

/// Evaluate an expression at the top level of `session` (public API)
pub fn eval(expr: &Handle, session: &mut Session) -> Result<Handle, Error> {
    session.eval(expr)
}

/// Helper function to add expression context to errors. Only the innermost
/// failing expression is recorded.
fn add_context(error: Error, expr: &Handle) -> Error {
    const MARKER: &str = "\n  Context: ";
    let context = format!("while evaluating: {expr}");
    match error {
        Error::EvalError(msg) if !msg.contains(MARKER) => {
            Error::EvalError(format!("{msg}{MARKER}{context}"))
        }
        Error::TypeError(msg) if !msg.contains(MARKER) => {
            Error::TypeError(format!("{msg}{MARKER}{context}"))
        }
        // Parse and arity errors carry their own context
        other => other,
    }
}

/// Evaluate quote special form
pub(crate) fn eval_quote(
    _session: &mut Session,
    args: &[Handle],
    _scope: &Scope,
    _depth: usize,
) -> Result<Handle, Error> {
    match args {
        [expr] => Ok(expr.clone()),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

/// Evaluate if special form
pub(crate) fn eval_if(
    session: &mut Session,
    args: &[Handle],
    scope: &Scope,
    depth: usize,
) -> Result<Handle, Error> {
    match args {
        [condition_expr, then_expr, else_expr] => {
            let condition = session.eval_with_depth_tracking(condition_expr, scope, depth + 1)?;
            let branch = if condition.is_true() {
                then_expr
            } else {
                else_expr
            };
            session.eval_with_depth_tracking(branch, scope, depth + 1)
        }
        _ => Err(Error::arity_error(3, args.len())),
    }
}

/// Evaluate cond special form. The first clause whose test is `else`, `#t`, or
/// evaluates to true is selected; its body expressions are evaluated in order
/// and the last value returned. No selected clause gives the empty chain.
pub(crate) fn eval_cond(
    session: &mut Session,
    clauses: &[Handle],
    scope: &Scope,
    depth: usize,
) -> Result<Handle, Error> {
    for clause in clauses {
        let mut parts = clause.elements();
        let Some(test) = parts.next() else {
            return Err(Error::TypeError(format!(
                "cond clause must be a non-empty list, got {clause}"
            )));
        };

        let test_value = if matches!(test.label(), Some("else" | "#t")) {
            Handle::truth()
        } else {
            let value = session.eval_with_depth_tracking(&test, scope, depth + 1)?;
            if !value.is_true() {
                continue;
            }
            value
        };

        let mut result = test_value;
        for expr in parts {
            result = session.eval_with_depth_tracking(&expr, scope, depth + 1)?;
        }
        return Ok(result);
    }
    Ok(Handle::nil())
}

/// Evaluate define special form.
///
/// `(define name expr)` binds a variable to the value of `expr`; the binding is
/// published only at the top level. `(define (name formals...) body)` stores
/// the body unevaluated as a global function, from any scope. The key itself
/// is never evaluated.
pub(crate) fn eval_define(
    session: &mut Session,
    args: &[Handle],
    scope: &Scope,
    depth: usize,
) -> Result<Handle, Error> {
    let [key, expr] = args else {
        return Err(Error::arity_error(2, args.len()));
    };

    match key.node() {
        Node::Atom(_) => {
            let value = session.eval_with_depth_tracking(expr, scope, depth + 1)?;
            match scope {
                Scope::Global => {
                    log::debug!("define {key} = {value}");
                    session.variables = session.variables.define(key.clone(), value);
                }
                Scope::Local(_) => {
                    log::debug!("define of {key} inside a function body is discarded");
                }
            }
            Ok(Handle::unspecified())
        }
        Node::Link { content, .. } => {
            if !content.is_atom() {
                return Err(Error::TypeError(format!(
                    "function name must be a symbol, got {content}"
                )));
            }
            if let Some(formal) = key.elements().skip(1).find(|formal| !formal.is_atom()) {
                return Err(Error::TypeError(format!(
                    "function parameters must be symbols, got {formal}"
                )));
            }
            log::debug!("define function {key}");
            session.functions = session.functions.define(key.clone(), expr.clone());
            Ok(Handle::unspecified())
        }
        _ => Err(Error::TypeError(format!(
            "define requires a symbol or a (name parameters...) list, got {key}"
        ))),
    }
}

// `and` stops at the first operand that is not true, `or` at the first that is
macro_rules! boolean_logic_op {
    ($name:ident, $stop_when:literal) => {
        pub(crate) fn $name(
            session: &mut Session,
            args: &[Handle],
            scope: &Scope,
            depth: usize,
        ) -> Result<Handle, Error> {
            for arg in args {
                let result = session.eval_with_depth_tracking(arg, scope, depth + 1)?;
                if result.is_true() == $stop_when {
                    return Ok(Handle::boolean($stop_when));
                }
            }
            Ok(Handle::boolean(!$stop_when))
        }
    };
}

boolean_logic_op!(eval_and, false);
boolean_logic_op!(eval_or, true);

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::Error;
    use crate::ast::{nil, sym, val};
    use crate::scheme::parse_scheme;

    /// Test result variants for comprehensive testing
    #[derive(Debug)]
    enum TestResult {
        EvalResult(Handle),          // Evaluation should succeed with this value
        Printed(&'static str),       // Evaluation should succeed and print as this text
        SpecificError(&'static str), // Evaluation should fail with error containing this string
        Error,                       // Evaluation should fail (any error)
    }
    use TestResult::*;

    /// Test environment containing test cases that share state
    struct TestEnvironment(Vec<(&'static str, TestResult)>);

    /// Micro-helper for success cases in comprehensive tests
    fn success<T: Into<Handle>>(value: T) -> TestResult {
        EvalResult(val(value))
    }

    /// Macro for setup expressions that return Unspecified (like define)
    macro_rules! test_setup {
        ($expr:expr) => {
            ($expr, EvalResult(Handle::unspecified()))
        };
    }

    /// Run tests in isolated sessions with shared state
    fn run_tests_in_environment(test_environments: Vec<TestEnvironment>) {
        for (env_idx, TestEnvironment(test_cases)) in test_environments.iter().enumerate() {
            let mut session = Session::new();

            for (test_idx, (input, expected)) in test_cases.iter().enumerate() {
                let test_id = format!("Environment #{} test #{}", env_idx + 1, test_idx + 1);
                execute_test_case(input, expected, &mut session, &test_id);
            }
        }
    }

    /// Execute a single test case with detailed error reporting
    fn execute_test_case(input: &str, expected: &TestResult, session: &mut Session, test_id: &str) {
        let expr = match parse_scheme(input) {
            Ok(expr) => expr,
            Err(parse_err) => {
                panic!("{test_id}: unexpected parse error for '{input}': {parse_err:?}");
            }
        };

        match (eval(&expr, session), expected) {
            (Ok(actual), EvalResult(expected_val)) => {
                // Unspecified never compares equal, so match on the variant
                match (actual.node(), expected_val.node()) {
                    (Node::Unspecified, Node::Unspecified) => {}
                    _ => {
                        assert_eq!(
                            actual, *expected_val,
                            "{test_id}: '{input}' expected {expected_val}, got {actual}"
                        );
                    }
                }
            }
            (Ok(actual), Printed(text)) => {
                assert_eq!(actual.to_string(), *text, "{test_id}: '{input}'");
            }

            (Err(_), Error) => {}
            (Err(e), SpecificError(expected_text)) => {
                let error_msg = format!("{e}");
                assert!(
                    error_msg.contains(expected_text),
                    "{test_id}: error should contain '{expected_text}', got: {error_msg}"
                );
            }
            (Ok(actual), Error) => {
                panic!("{test_id}: '{input}' expected error, got {actual}");
            }
            (Ok(actual), SpecificError(expected_text)) => {
                panic!("{test_id}: '{input}' expected error containing '{expected_text}', got {actual}");
            }
            (Err(err), EvalResult(_) | Printed(_)) => {
                panic!("{test_id}: '{input}' unexpected error {err}");
            }
        }
    }

    /// Each case runs in a fresh session
    fn run_comprehensive_tests(test_cases: Vec<(&str, TestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let mut session = Session::new();
            let test_id = format!("#{}", i + 1);
            execute_test_case(input, expected, &mut session, &test_id);
        }
    }

    #[test]
    fn test_comprehensive_operations_data_driven() {
        let test_cases = vec![
            // === SELF-EVALUATING AND UNBOUND ===
            ("42", success(42)),
            ("-7", success(-7)),
            ("foo", success("foo")),
            ("()", EvalResult(nil())),
            ("#t", success("#t")),
            ("(foo 1 2)", Printed("(foo 1 2)")),
            ("((a b) c)", Printed("((a b) c)")),
            // === QUOTE ===
            ("'a", success("a")),
            ("'(a b c)", success(["a", "b", "c"])),
            ("(quote (+ 1 2))", Printed("(+ 1 2)")),
            ("'()", EvalResult(nil())),
            ("(quote)", SpecificError("ArityError")),
            // === ARITHMETIC ===
            ("(+ 1 2 3)", success(6)),
            ("(- 10 3 2)", success(5)),
            ("(- 5)", success(5)),
            ("(* 2 3 4)", success(24)),
            ("(+ (* 2 3) (- 10 4))", success(12)),
            ("(+ 1 a)", SpecificError("requires numeric arguments")),
            ("(+)", SpecificError("ArityError")),
            ("(* 9223372036854775807 2)", SpecificError("overflow")),
            // === COMPARISON ===
            ("(< 1 2)", Printed("#t")),
            ("(> 1 2)", Printed("()")),
            ("(<= 2 2)", Printed("#t")),
            ("(>= 1 2)", Printed("()")),
            ("(< 1 2 3)", SpecificError("ArityError")),
            // === IF ===
            ("(if (> 3 2) 1 0)", success(1)),
            ("(if (< 3 2) 1 0)", success(0)),
            // only the true sentinel selects the then-branch
            ("(if #t 'yes 'no)", success("no")),
            ("(if '#t 'yes 'no)", success("no")),
            ("(if '() 'yes 'no)", success("no")),
            ("(if 1 'yes 'no)", success("no")),
            ("(if (> 3 2) 1)", SpecificError("ArityError")),
            // === COND ===
            ("(cond ((> 1 2) 'no) (else 'yes))", success("yes")),
            ("(cond ((< 1 2) 'first) (else 'second))", success("first")),
            ("(cond ((> 1 2) 'no))", EvalResult(nil())),
            ("(cond (#t 'always))", success("always")),
            ("(cond ('#t 'never))", EvalResult(nil())),
            ("(cond ((< 1 2)))", Printed("#t")),
            ("(cond ((< 1 2) 1 2 3))", success(3)),
            ("(cond)", EvalResult(nil())),
            ("(cond (else))", Printed("#t")),
            ("(cond a)", SpecificError("cond clause")),
            // === LOGIC ===
            ("(and (> 2 1) (< 1 2))", Printed("#t")),
            ("(and (> 2 1) (> 1 2))", Printed("()")),
            ("(and)", Printed("#t")),
            ("(or (> 1 2) (< 1 2))", Printed("#t")),
            ("(or (> 1 2) (> 1 3))", Printed("()")),
            ("(or)", Printed("()")),
            ("(not (> 1 2))", Printed("#t")),
            ("(not #t)", Printed("#t")),
            ("(not (< 1 2))", Printed("()")),
            ("(and #t #t)", Printed("()")),
            ("(or #t)", Printed("()")),
            ("(AND (< 1 2) (<= 1 1))", Printed("#t")),
            ("(OR '() (< 1 2))", Printed("#t")),
            ("(NOT '())", Printed("#t")),
            // short-circuit: the failing operand is never evaluated
            ("(and (> 1 2) (+ 1 a))", Printed("()")),
            ("(or (< 1 2) (+ 1 a))", Printed("#t")),
            ("(and (< 1 2) (+ 1 a))", Error),
            // === LIST OPERATIONS ===
            ("(car '(a b c))", success("a")),
            ("(cdr '(a b c))", success(["b", "c"])),
            ("(cdr '())", EvalResult(nil())),
            ("(cdr '(a))", EvalResult(nil())),
            ("(cadr '(a b c))", success("b")),
            ("(caddr '(a b c))", success("c")),
            ("(cadddr '(a b c d))", success("d")),
            ("(caddddr '(a b c d e))", success("e")),
            ("(cdar '((a b) c))", success(["b"])),
            ("(cons 'a '(b c))", success(["a", "b", "c"])),
            ("(cons 'a '())", success(["a"])),
            ("(cons '(a) '(b))", Printed("((a) b)")),
            ("(append (list 1 2) (list 3 4))", success([1, 2, 3, 4])),
            ("(list 'a (+ 1 2))", Printed("(a 3)")),
            ("(list)", EvalResult(nil())),
            ("(last '(a b c))", success("c")),
            ("(length '(a b c))", success(3)),
            ("(length '())", success(0)),
            ("(car '())", SpecificError("car of empty list")),
            ("(car 'a)", SpecificError("car requires a list")),
            ("(car '(a) '(b))", SpecificError("ArityError")),
            // === PREDICATES ===
            ("(symbol? 'a)", Printed("#t")),
            ("(symbol? '(a))", Printed("()")),
            ("(number? 5)", Printed("#t")),
            ("(number? -12)", Printed("#t")),
            ("(number? 'a)", Printed("()")),
            ("(list? '(a))", Printed("#t")),
            ("(list? 'a)", Printed("()")),
            ("(null? '())", Printed("#t")),
            ("(null? '(a))", Printed("()")),
            ("(null? #f)", Printed("#t")),
            ("(null? #t)", Printed("()")),
            ("(equal? '(a (b)) '(a (b)))", Printed("#t")),
            ("(equal? '(a b) '(a c))", Printed("()")),
            ("(equal? (+ 1 1) 2)", Printed("#t")),
            // === ASSOC ===
            ("(assoc 'b '((a 1) (b 2)))", Printed("(b 2)")),
            ("(assoc 'c '((a 1)))", success("#f")),
            // === DEFINE ERRORS ===
            ("(define 1)", SpecificError("ArityError")),
            ("(define (f (x)) x)", SpecificError("parameters must be symbols")),
            ("(define ((f) x) x)", SpecificError("function name must be a symbol")),
            ("(define () 1)", SpecificError("define requires")),
        ];

        run_comprehensive_tests(test_cases);
    }

    #[test]
    fn test_definitions_and_user_functions() {
        let environment_test_cases = vec![
            TestEnvironment(vec![
                test_setup!("(define x 5)"),
                ("x", success(5)),
                ("(+ x 1)", success(6)),
                // a bound head atom resolves to its value
                ("(x 1 2)", success(5)),
                test_setup!("(define x 7)"),
                ("x", success(7)),
                test_setup!("(define y (list x 'b))"),
                ("y", Printed("(7 b)")),
            ]),
            TestEnvironment(vec![
                test_setup!("(define (double x) (* x 2))"),
                ("(double 5)", success(10)),
                ("(double (double 3))", success(12)),
                ("(double)", SpecificError("ArityError")),
                ("(double 1 2)", SpecificError("ArityError")),
                // redefinition: the most recent definition wins
                test_setup!("(define (double x) (+ x x x))"),
                ("(double 5)", success(15)),
            ]),
            TestEnvironment(vec![
                test_setup!("(define (seven) 7)"),
                ("(seven)", success(7)),
                test_setup!("(define (pick a b) (if (> a b) a b))"),
                ("(pick 3 9)", success(9)),
                ("(pick (seven) 2)", success(7)),
            ]),
            TestEnvironment(vec![
                // function bodies see only their own parameters
                test_setup!("(define y 10)"),
                test_setup!("(define (add-y x) (+ x y))"),
                ("(add-y 1)", SpecificError("requires numeric arguments")),
                test_setup!("(define (show-y) y)"),
                ("(show-y)", success("y")),
            ]),
            TestEnvironment(vec![
                // a variable define inside a function body is not published
                test_setup!("(define (set-z v) (define z v))"),
                test_setup!("(set-z 3)"),
                ("z", success("z")),
                // but a function define is always global
                test_setup!("(define (make-f) (define (f) 42))"),
                test_setup!("(make-f)"),
                ("(f)", success(42)),
            ]),
            TestEnvironment(vec![
                // arguments are evaluated in the caller's scope
                test_setup!("(define (inc n) (+ n 1))"),
                test_setup!("(define (add2 n) (inc (inc n)))"),
                ("(add2 5)", success(7)),
                test_setup!("(define k 40)"),
                ("(add2 k)", success(42)),
            ]),
        ];

        run_tests_in_environment(environment_test_cases);
    }

    #[test]
    fn test_recursive_functions() {
        let recursive_test_cases = vec![
            TestEnvironment(vec![
                test_setup!("(define (fact n) (if (< n 1) 1 (* n (fact (- n 1)))))"),
                ("(fact 0)", success(1)),
                ("(fact 5)", success(120)),
                ("(fact 10)", success(3_628_800)),
            ]),
            TestEnvironment(vec![
                test_setup!("(define (fib n) (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2)))))"),
                ("(fib 10)", success(55)),
            ]),
            TestEnvironment(vec![
                test_setup!(
                    "(define (count-down n) (if (< n 1) '() (cons n (count-down (- n 1)))))"
                ),
                ("(count-down 3)", success([3, 2, 1])),
                ("(length (count-down 20))", success(20)),
            ]),
            TestEnvironment(vec![
                test_setup!("(define (is-even n) (if (< n 1) #t (is-odd (- n 1))))"),
                test_setup!("(define (is-odd n) (if (< n 1) #f (is-even (- n 1))))"),
                ("(is-even 4)", success("#t")),
                ("(is-odd 4)", success("#f")),
            ]),
            TestEnvironment(vec![
                test_setup!(
                    "(define (my-length l) (if (null? l) 0 (+ 1 (my-length (cdr l)))))"
                ),
                ("(my-length '(a b c d))", success(4)),
                ("(my-length '())", success(0)),
            ]),
            TestEnvironment(vec![
                test_setup!(
                    "(define (count-down n) (if (< n 1) '() (cons n (count-down (- n 1)))))"
                ),
                test_setup!(
                    "(define (my-length l) (if (null? l) 0 (+ 1 (my-length (cdr l)))))"
                ),
                ("(my-length (count-down 1000))", success(1000)),
                ("(length (count-down 1500))", success(1500)),
            ]),
            TestEnvironment(vec![
                // a user call as an argument is evaluated once, so this is linear
                test_setup!("(define (inc n) (+ n 1))"),
                test_setup!("(define (nest n) (if (< n 1) 0 (inc (nest (- n 1)))))"),
                ("(nest 18)", success(18)),
                ("(nest 300)", success(300)),
            ]),
        ];

        run_tests_in_environment(recursive_test_cases);
    }

    #[test]
    fn test_evaluation_depth_limit() {
        let depth_test_environments = vec![TestEnvironment(vec![
            test_setup!("(define (deep n) (if (< n 1) 42 (+ 1 (deep (- n 1)))))"),
            ("(deep 10)", success(52)),
            ("(deep 1000)", success(1042)),
            ("(deep 5000)", SpecificError("depth")),
        ])];

        run_tests_in_environment(depth_test_environments);
    }

    #[test]
    fn test_long_chains_cost_no_depth() {
        let mut session = Session::new();
        let numbers: Vec<String> = (0..2000).map(|n| n.to_string()).collect();
        let chain = format!("(foo {})", numbers.join(" "));
        let result = session.eval_str(&chain).unwrap();
        assert_eq!(result.to_string(), chain);

        let failing_tail = format!("(foo {} (car '()))", numbers.join(" "));
        let err = session.eval_str(&failing_tail).unwrap_err();
        assert!(err.to_string().contains("car of empty list"), "{err}");
    }

    #[test]
    fn test_error_context() {
        let mut session = Session::new();
        let err = session.eval(&parse_scheme("(list (car 'a))").unwrap()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("while evaluating: (car (quote a))"), "{msg}");
        assert_eq!(msg.matches("Context:").count(), 1, "{msg}");

        let err = session.eval(&parse_scheme("(if 1 2)").unwrap()).unwrap_err();
        assert_eq!(
            err,
            Error::arity_error_with_expr(3, 2, "(if 1 2)".to_owned())
        );
    }

    #[test]
    fn test_session_state_and_eval_str() {
        let mut session = Session::new();
        let result = session
            .eval_str("(define x 2) ; a comment\n(define (sq n) (* n n))\n(sq x)")
            .unwrap();
        assert_eq!(result, val(4));

        let names: Vec<String> = session
            .bindings()
            .iter()
            .map(|(key, _)| key.to_string())
            .collect();
        assert_eq!(names, vec!["x", "(sq n)"]);
        assert!(!session.variables().is_empty());
        assert_eq!(session.functions().get(&sym("sq")).unwrap().to_string(), "(* n n)");

        // a failing expression keeps the bindings made before it
        assert!(session.eval_str("(define y 1) (car '())").is_err());
        assert_eq!(session.eval(&sym("y")).unwrap(), val(1));

        let blank = session.eval_str("   ").unwrap();
        assert!(matches!(blank.node(), Node::Unspecified));
    }

    #[test]
    fn test_environments_share_structure() {
        let mut session = Session::new();
        session.eval_str("(define a 1)").unwrap();
        let before = session.variables().clone();
        session.eval_str("(define b 2)").unwrap();

        // the new head links to the old chain rather than copying it
        let after = session.variables().as_handle().continuation().unwrap().clone();
        assert!(after.ptr_eq(before.as_handle()));
        assert_eq!(before.get(&sym("b")), None);
    }
}
