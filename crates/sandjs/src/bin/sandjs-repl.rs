//! Interactive entry point, grounded on `ouros-repl`'s binary `main`:
//! a file path argument runs that file once, no argument opens a prompt.

use std::{env, fs, process::ExitCode};

use sandjs::Context;
use sandjs::repl::{run_file, run_interactive};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    match args.get(1) {
        Some(path) => {
            let source = match fs::read_to_string(path) {
                Ok(source) => source,
                Err(err) => {
                    eprintln!("error: {err}");
                    return ExitCode::FAILURE;
                }
            };
            let mut ctx = Context::new();
            if run_file(&mut ctx, &source) { ExitCode::SUCCESS } else { ExitCode::FAILURE }
        }
        None => {
            if run_interactive() { ExitCode::SUCCESS } else { ExitCode::FAILURE }
        }
    }
}
