use clap::{App, Arg};
use std::fs;
use std::io::{self, Write};

use treelox::interpreter::Interpreter;
use treelox::parser;
use treelox::scanner;

enum RunResult {
    Ok,
    SyntaxError,
    RuntimeError,
}

fn main() {
    let matches = App::new("treelox")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Tree-walking interpreter for the Lox language")
        .arg(
            Arg::with_name("script")
                .help("Script file to run; omit for an interactive prompt")
                .index(1),
        )
        .get_matches();

    match matches.value_of("script") {
        Some(file) => run_file(file),
        None => run_prompt(),
    }
}

fn run_file(file: &str) {
    let contents = match fs::read_to_string(file) {
        Ok(contents) => contents,
        Err(e) => {
            eprintln!("Could not read {}: {}", file, e);
            std::process::exit(66);
        }
    };
    let mut interpreter = Interpreter::new();
    match run(&contents, &mut interpreter) {
        RunResult::Ok => (),
        RunResult::SyntaxError => std::process::exit(65),
        RunResult::RuntimeError => std::process::exit(70),
    }
}

fn run_prompt() {
    // One interpreter for the whole session, so definitions persist between
    // lines.
    let mut interpreter = Interpreter::new();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                run(&line, &mut interpreter);
            }
        }
    }
}

fn run(source: &str, interpreter: &mut Interpreter) -> RunResult {
    let (tokens, scan_errors) = scanner::scan_tokens(source);
    for e in &scan_errors {
        eprintln!("{}", e);
    }
    match parser::parse(&tokens) {
        // Any scan or parse error means the program never executes.
        Ok(statements) if scan_errors.is_empty() => match interpreter.interpret(&statements) {
            Ok(()) => RunResult::Ok,
            Err(e) => {
                eprintln!("{}", e);
                RunResult::RuntimeError
            }
        },
        Ok(_) => RunResult::SyntaxError,
        Err(errors) => {
            for e in &errors {
                eprintln!("{}", e);
            }
            RunResult::SyntaxError
        }
    }
}
