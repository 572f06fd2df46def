use chainlisp::ast::{Handle, Node};
use chainlisp::evaluator::{Environment, Session};
use chainlisp::scheme::{ParseConfig, parse_scheme_sequence};
use chainlisp::{Error, builtinops};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::panic;
use std::process;

const PROMPT: &str = "scheme> ";
const CONTINUATION_PROMPT: &str = "...> ";
const FAREWELL: &str = "Have a nice day!";

fn main() {
    env_logger::init();

    let result = panic::catch_unwind(|| {
        run_repl();
    });

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

/// What the loop should do after a chunk of input
enum Outcome {
    Continue,
    NeedMoreInput,
    Exit,
}

fn run_repl() {
    println!("ChainLisp - a minimal Scheme over linked symbol chains");
    println!("Enter S-expressions like: (+ 1 2)");
    println!("Type :help for more commands, (exit) or Ctrl+D to leave.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            process::exit(1);
        }
    };
    let mut session = Session::new();
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() {
            PROMPT
        } else {
            CONTINUATION_PROMPT
        };

        match rl.readline(prompt) {
            Ok(line) => {
                if pending.is_empty() {
                    let command = line.trim();
                    if command.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(command);

                    match command {
                        ":help" => {
                            print_help();
                            continue;
                        }
                        ":env" => {
                            print_environment(&session);
                            continue;
                        }
                        ":quit" | ":exit" => {
                            println!("{FAREWELL}");
                            break;
                        }
                        _ => {}
                    }
                } else {
                    let _ = rl.add_history_entry(line.trim());
                }

                pending.push_str(&line);
                pending.push('\n');

                match eval_input(&pending, &mut session) {
                    Outcome::NeedMoreInput => {}
                    Outcome::Continue => pending.clear(),
                    Outcome::Exit => {
                        println!("{FAREWELL}");
                        break;
                    }
                }
            }

            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("{FAREWELL}");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

/// Read and evaluate every expression in `input`, printing each result
fn eval_input(input: &str, session: &mut Session) -> Outcome {
    let config = ParseConfig {
        handle_comments: true,
    };
    let expressions = match parse_scheme_sequence(input, config) {
        Ok(expressions) => expressions,
        Err(Error::ParseError(err)) if err.is_incomplete() => return Outcome::NeedMoreInput,
        Err(err) => {
            println!("Error: {err}");
            return Outcome::Continue;
        }
    };

    for expr in &expressions {
        if is_exit_request(expr) {
            return Outcome::Exit;
        }
        match session.eval(expr) {
            // Don't print Unspecified values (e.g., from define)
            Ok(result) if matches!(result.node(), Node::Unspecified) => {}
            Ok(result) => println!("{result}"),
            Err(err) => {
                println!("Error: {err}");
                return Outcome::Continue;
            }
        }
    }
    Outcome::Continue
}

/// `(exit)`: a chain whose only element is the atom `exit`
fn is_exit_request(expr: &Handle) -> bool {
    expr.content().and_then(Handle::label) == Some("exit") && expr.continuation().is_none()
}

fn print_help() {
    println!("ChainLisp interpreter:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current variable and function bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  (exit)     - Exit the interpreter");
    println!("  Ctrl+C/D   - Exit the interpreter");
    println!();
    println!("Syntax: atoms, (parenthesized lists), 'x for (quote x), ; comments");
    println!("Unbound symbols evaluate to themselves; () is both empty and false.");
    println!();
    println!("Keywords:");
    let ids: Vec<&str> = builtinops::get_builtin_ops().iter().map(|op| op.id).collect();
    for row in ids.chunks(8) {
        println!("  {}", row.join(" "));
    }
    println!();
    println!("Examples:");
    println!("  (+ 1 2 3)");
    println!("  (cond ((> 1 2) 'no) (else 'yes))");
    println!("  (define (double x) (* x 2))");
    println!("  (double 5)");
    println!();
    println!("Set RUST_LOG=debug to trace definitions and function calls.");
}

fn print_environment(session: &Session) {
    print_bindings("Variables", session.variables());
    print_bindings("Functions", session.functions());
}

fn print_bindings(title: &str, env: &Environment) {
    let bindings: Vec<(Handle, Handle)> = env.bindings().collect();
    if bindings.is_empty() {
        println!("{title}: none");
        return;
    }

    println!("{title} ({}, most recent first):", bindings.len());
    for (key, value) in bindings {
        println!("  {key} = {value}");
    }
}
