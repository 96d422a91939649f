use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use scopelisp::Error;
use scopelisp::ast::Value;
use scopelisp::environment::{EnvRef, GlobalEnv};
use scopelisp::evaluator;
use scopelisp::scheme::parse_program;
use std::panic;
use std::process;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

fn main() {
    // RUST_LOG=scopelisp=trace shows scope construction and dispatch
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let result = panic::catch_unwind(run_repl);

    match result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            eprintln!("Could not start the REPL: {err}");
            process::exit(1);
        }
        Err(panic_info) => {
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
}

fn run_repl() -> Result<(), ReadlineError> {
    println!("scopelisp - a small Lisp with lexical let scoping");
    println!("Enter S-expressions like: (let ((a 1) (b 2)) (+ a b))");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;
    let root: Rc<GlobalEnv> = evaluator::create_global_env();

    // Callable from user code as (help)
    root.register_builtin_function("help", print_help);

    let env: EnvRef = root.clone();

    loop {
        match rl.readline("scopelisp> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        let _ = print_help(&[]);
                        continue;
                    }
                    ":env" => {
                        print_environment(&root);
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                if let Err(e) = eval_line(line, &env) {
                    println!("Error: {e}");
                }
            }

            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }

    Ok(())
}

/// Evaluate every expression on the line, printing each result
fn eval_line(line: &str, env: &EnvRef) -> Result<(), Error> {
    for expr in parse_program(line)? {
        let result = evaluator::eval(&expr, env)?;
        // define, set! and defun produce nothing worth printing
        if !matches!(result, Value::Unspecified) {
            println!("{result}");
        }
    }
    Ok(())
}

fn print_help(_args: &[Value]) -> Result<Value, Error> {
    println!("scopelisp REPL:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show global environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("Supported forms:");
    println!("  Numbers: 42, -5, #xff   Booleans: #t #f   Strings: \"hi\"");
    println!("  Arithmetic: + - * max min   Comparison: = < > <= >= equal?");
    println!("  Logic: and or not   Lists: car cdr cons list null?");
    println!("  Binding: define set! let lambda defun begin");
    println!("  Typed names: n:int flag:bool s:string xs:list f:fn");
    println!();
    println!("Examples:");
    println!("  (define a 1)");
    println!("  (let ((a 2) (b a)) (list a b))      ; => (2 1)");
    println!("  (defun area (w h) (* w h))");
    println!("  (defun area (s) (area s s))         ; second overload");
    println!("  (let ((n:int 1)) (set! n #t))       ; type error");
    println!();

    Ok(Value::Unspecified)
}

fn print_environment(env: &GlobalEnv) {
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
            Value::BuiltinFunction { .. } => builtins.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !builtins.is_empty() {
        println!("Built-in functions ({}):", builtins.len());
        for (col, name) in builtins.iter().enumerate() {
            print!("  {name:<15}");
            if (col + 1) % 4 == 0 {
                println!();
            }
        }
        if builtins.len() % 4 != 0 {
            println!();
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
