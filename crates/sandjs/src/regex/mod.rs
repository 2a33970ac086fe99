//! Regular expression sub-engine (§4.6-§4.8, §7): an independent pattern
//! parser, compiler, and backtracking executor used by `RegExp` literals and
//! constructor calls, plus the `String.prototype` methods that accept a
//! pattern.

mod ast;
mod compiler;
mod op;
mod parser;
pub mod vm;

pub use ast::RegexError;
pub use vm::{RegExpData, RegexMatch};
