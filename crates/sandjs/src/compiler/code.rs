//! Compiled function representation (§3, §4.4).
//!
//! Grounded on `ouros::bytecode::code::Code`: a compiled function is an
//! immutable record produced once by the compiler and shared (via `Rc`) by
//! every closure value created from it.

use std::rc::Rc;

/// One entry of a compiled function's constant pool.
#[derive(Debug, Clone)]
pub enum ConstValue {
    Number(f64),
    Str(Rc<str>),
    /// Interned identifier, used by `LOAD_NAME`/`STORE_NAME`/`TYPEOF_NAME`.
    Name(Rc<str>),
    Function(Rc<CompiledFunction>),
    Regex { pattern: Rc<str>, flags: Rc<str> },
}

/// A sparse `bytecode offset -> source location` entry; the VM looks up the
/// nearest preceding entry for the current instruction pointer when it
/// needs to annotate a thrown error with `lineNumber`/`columnNumber`.
#[derive(Debug, Clone, Copy)]
pub struct LocationEntry {
    pub offset: usize,
    pub line: u32,
    pub column: u32,
}

/// Where `MAKE_CLOSURE` should pull one of this function's captured cells
/// from, resolved once by the *enclosing* function's compiler (it alone
/// knows whether a captured name is one of its own `cell_vars` or itself a
/// pass-through `free_var`). Parallel to `free_vars`.
#[derive(Debug, Clone, Copy)]
pub enum CaptureSource {
    /// Index into the defining frame's own `cell_storage`.
    Cell(u16),
    /// Index into the defining closure's `closure_cells` (pass-through).
    Closure(u16),
}

/// Immutable record produced by the compiler for one function (or the
/// top-level program, treated as a parameterless function).
#[derive(Debug)]
pub struct CompiledFunction {
    pub name: Rc<str>,
    pub param_count: usize,
    pub num_locals: u16,
    /// Local slots that must be boxed in `cell_storage` because some inner
    /// function captures them.
    pub cell_slots: Vec<u16>,
    /// Names this function needs from its defining frame, in the order the
    /// resulting `FunctionValue`'s `closure_cells` vector must be built in.
    pub free_vars: Vec<Rc<str>>,
    /// Parallel to `free_vars`; where `MAKE_CLOSURE` fetches each cell from
    /// in the defining frame.
    pub capture_sources: Vec<CaptureSource>,
    pub bytecode: Vec<u8>,
    pub constants: Vec<ConstValue>,
    pub locations: Vec<LocationEntry>,
    pub max_stack_depth: u16,
    pub is_arrow: bool,
}

impl CompiledFunction {
    /// Finds the source location for the instruction at or before `offset`,
    /// for error annotation.
    #[must_use]
    pub fn location_at(&self, offset: usize) -> Option<(u32, u32)> {
        self.locations.iter().rev().find(|e| e.offset <= offset).map(|e| (e.line, e.column))
    }
}
