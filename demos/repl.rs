use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use schemer::ast::Value;
use schemer::evaluator::Environment;
use schemer::{Error, Interpreter, ParseError, ParseErrorKind};
use std::panic;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // With a path argument, run that file instead of starting the REPL
    if let Some(path) = std::env::args().nth(1) {
        process::exit(run_file(&path));
    }

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

fn run_file(path: &str) -> i32 {
    let source = match std::fs::read(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Could not read {path}: {err}");
            return 1;
        }
    };

    let mut interpreter = Interpreter::new();
    match interpreter.run(&source) {
        Ok(_) => 0,
        Err(Error::Exit(code)) => code,
        Err(e) => {
            eprintln!("{e}");
            1
        }
    }
}

/// The reader ran out of tokens, so more lines may complete the form
fn needs_more_input(err: &Error) -> bool {
    matches!(
        err,
        Error::ParseError(ParseError {
            kind: ParseErrorKind::UnexpectedEof,
            ..
        })
    )
}

fn run_repl() {
    println!("Schemer: a minimal Scheme interpreter");
    println!("Enter S-expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl = DefaultEditor::new().expect("Could not initialize REPL");
    let mut interpreter = Interpreter::new();
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() { "schemer> " } else { "     ... " };
        match rl.readline(prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if pending.is_empty() {
                    if trimmed.is_empty() {
                        continue;
                    }

                    // Handle special commands
                    match trimmed {
                        ":help" => {
                            print_help();
                            continue;
                        }
                        ":env" => {
                            print_environment(interpreter.environment());
                            continue;
                        }
                        ":quit" | ":exit" => {
                            println!("Goodbye!");
                            break;
                        }
                        _ => {}
                    }
                }

                pending.push_str(&line);
                pending.push('\n');

                match interpreter.eval_str(&pending) {
                    Err(ref e) if needs_more_input(e) => continue,
                    Ok(result) => {
                        // Don't print Unspecified values (e.g., from newline)
                        if !matches!(result, Value::Unspecified) {
                            println!("{result}");
                        }
                    }
                    Err(Error::Exit(code)) => process::exit(code),
                    Err(e) => println!("{e}"),
                }

                let _ = rl.add_history_entry(pending.trim_end());
                pending.clear();
            }

            Err(ReadlineError::Interrupted) if !pending.is_empty() => {
                // Ctrl+C abandons an unfinished form
                pending.clear();
            }
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  (exit [n]) - Exit with status n");
    println!("  Ctrl+D     - Exit the interpreter");
    println!();
    println!("Forms left open continue on the next line.");
    println!("Set RUST_LOG=schemer=debug to trace evaluation.");
    println!();
    println!("Special forms: quote ('x), if, define, lambda, exit");
    println!("Builtins: arithmetic, comparison, list operations, map/filter/reduce/apply,");
    println!("          display, newline, error (see :env for the full list)");
    println!();
    println!("Examples:");
    println!("  (define fact (lambda (n) (if (<= n 1) 1 (* n (fact (- n 1))))))");
    println!("  (fact 20)");
    println!("  (map (lambda (x) (* x x)) '(1 2 3))");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Separate built-in functions from user-defined values
    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::BuiltinFunction(_) => builtins.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    // Print built-in functions
    if !builtins.is_empty() {
        println!("Built-in functions ({}):", builtins.len());
        // Print in columns for readability
        let mut col = 0;
        for name in builtins {
            print!("  {name:<15}");
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    // Print user-defined values
    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
