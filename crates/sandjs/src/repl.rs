//! The interactive prompt loop, grounded on `ouros-repl`'s binary-level
//! `main`: file-path-vs-interactive dispatch, a `read_line` helper, and a
//! `needs_more_input` heuristic that keeps accumulating lines while braces,
//! brackets, or parens are unbalanced.
//!
//! `ouros-repl` also drives an elaborate `ReplSession` that pauses execution
//! for external function calls and async futures; none of that exists here,
//! since this dialect has neither host-callback bindings nor a futures
//! model, so every line goes straight through [`Context::eval`] and a
//! [`Context`]'s shared globals table is already the whole of a REPL
//! session's persistent state.

use std::io::{self, Write};

use crate::Context;

/// Runs one line (or, interactively, one accumulated multi-line snippet) at
/// a time against `ctx`, printing the completion value or error to stdout.
pub fn run_file(ctx: &mut Context, source: &str) -> bool {
    match ctx.eval(source) {
        Ok(value) => {
            println!("{value}");
            true
        }
        Err(err) => {
            eprintln!("error: {err}");
            false
        }
    }
}

/// Reads snippets from stdin until EOF, evaluating each against a single
/// long-lived [`Context`] so top-level `let`/`function` declarations persist
/// across prompts the way a REPL user expects.
pub fn run_interactive() -> bool {
    let mut ctx = Context::new();
    let mut ok = true;
    loop {
        let Some(mut source) = read_line(">> ") else { break };
        while needs_more_input(&source) {
            let Some(line) = read_line(".. ") else { break };
            source.push('\n');
            source.push_str(&line);
        }
        if source.trim().is_empty() {
            continue;
        }
        match ctx.eval(&source) {
            Ok(value) => println!("{value}"),
            Err(err) => {
                eprintln!("error: {err}");
                ok = false;
            }
        }
    }
    ok
}

fn read_line(prompt: &str) -> Option<String> {
    print!("{prompt}");
    io::stdout().flush().ok()?;
    let mut line = String::new();
    let read = io::stdin().read_line(&mut line).ok()?;
    if read == 0 {
        return None;
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Some(line)
}

/// True while `source`'s brackets are unbalanced or it ends in a line
/// continuation, so the prompt loop should keep reading before evaluating.
fn needs_more_input(source: &str) -> bool {
    if source.trim_end().ends_with('\\') {
        return true;
    }
    let mut depth: i32 = 0;
    for c in source.chars() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
    }
    depth > 0
}
