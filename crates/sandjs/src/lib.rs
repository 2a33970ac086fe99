#![doc = include_str!("../../../README.md")]

mod ast;
mod builtins;
pub mod compiler;
mod context;
mod exception;
mod function;
mod intern;
mod io;
mod lexer;
mod marshal;
mod object;
mod parser;
pub mod regex;
pub mod repl;
mod resource;
mod scope;
pub mod tracer;
mod value;
pub mod vm;

pub use crate::context::Context;
pub use crate::exception::{CodeLoc, ExcKind, Exception, JSError};
pub use crate::io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint};
pub use crate::marshal::HostValue;
pub use crate::resource::{LimitedTracker, NoLimitTracker, ResourceError, ResourceLimits, ResourceTracker};
pub use crate::tracer::{NoopTracer, VmTracer};
pub use crate::value::Value;
