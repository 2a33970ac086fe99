//! AST-to-bytecode compiler (§4.4), grounded on `ouros::bytecode::builder`
//! for the emission mechanics and on the data model described alongside the
//! VM for everything opcode-shaped.
//!
//! One [`Compiler`] instance per function body; nested function literals
//! recursively produce their own `CompiledFunction`, stored in the
//! enclosing function's constant pool and instantiated at runtime by
//! `MAKE_CLOSURE`.

pub mod builder;
pub mod code;
pub mod op;

use std::rc::Rc;

use crate::ast::{
    AssignOp, BinOp, Expr, ForInit, ForTarget, FunctionNode, LogicalOp, Program, PropDef, PropKey, PropKind, Stmt,
    SwitchCase, UnaryOp, UpdateOp,
};
use crate::exception::CompileError;
use crate::scope::{analyze_function, ScopeInfo};

use builder::{CodeBuilder, JumpLabel};
use code::{CaptureSource, CompiledFunction};
use op::Opcode;

type PResult<T> = Result<T, CompileError>;

fn here() -> crate::exception::CodeLoc {
    crate::exception::CodeLoc::default()
}

#[must_use]
pub fn compile_program(program: &Program) -> PResult<Rc<CompiledFunction>> {
    let scope = analyze_function(&[], &program.body, None, true);
    let mut c = Compiler::new(scope);
    c.compile_stmts(&program.body)?;
    c.builder.emit(Opcode::LoadUndefined);
    c.builder.emit(Opcode::Return);
    Ok(Rc::new(c.finish(Rc::from("<program>"), 0, false, Vec::new())))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CtrlKind {
    Loop,
    Switch,
    /// A bare labeled statement whose body isn't itself a loop/switch; only
    /// `break label;` can target it.
    Block,
}

struct CtrlCtx {
    label: Option<Rc<str>>,
    kind: CtrlKind,
    break_jumps: Vec<JumpLabel>,
    continue_jumps: Vec<JumpLabel>,
    finally_len_at_entry: usize,
    /// Stack slots (beyond the loop/switch's own net-zero contribution)
    /// still live when `break`/`continue` fires from inside the body: the
    /// switch discriminant, or a for-in/for-of iterator handle.
    extra_live: u8,
}

struct Compiler {
    builder: CodeBuilder,
    scope: ScopeInfo,
    ctrl_stack: Vec<CtrlCtx>,
    finally_stack: Vec<Rc<[Stmt]>>,
    next_temp: u16,
    max_temp: u16,
}

impl Compiler {
    fn new(scope: ScopeInfo) -> Self {
        Self { builder: CodeBuilder::new(), scope, ctrl_stack: Vec::new(), finally_stack: Vec::new(), next_temp: 0, max_temp: 0 }
    }

    fn alloc_temp(&mut self) -> PResult<u8> {
        let slot = self.scope.locals.len() as u16 + self.next_temp;
        self.next_temp += 1;
        self.max_temp = self.max_temp.max(self.next_temp);
        u8::try_from(slot).map_err(|_| CompileError::new("function has too many local variables", here()))
    }

    fn free_temp(&mut self) {
        self.next_temp -= 1;
    }

    fn finish(self, name: Rc<str>, param_count: usize, is_arrow: bool, capture_sources: Vec<CaptureSource>) -> CompiledFunction {
        let num_locals = self.scope.locals.len() as u16 + self.max_temp;
        let cell_slots = self
            .scope
            .cell_vars
            .iter()
            .map(|n| self.scope.local_slot(n).expect("cell var must be a local") as u16)
            .collect();
        let free_vars = self.scope.free_vars.clone();
        self.builder.build(name, param_count, num_locals, cell_slots, free_vars, capture_sources, is_arrow)
    }

    // ---- variable resolution ----

    fn local_slot_u8(&self, name: &str) -> PResult<u8> {
        let slot = self.scope.local_slot(name).expect("local_slot_u8 called for a non-local name");
        u8::try_from(slot).map_err(|_| CompileError::new("function has too many local variables", here()))
    }

    fn emit_load_name(&mut self, name: &Rc<str>) -> PResult<()> {
        if self.scope.is_cell(name) {
            let idx = self.scope.cell_vars.iter().position(|n| n == name).unwrap();
            self.builder.emit_u8(Opcode::LoadCell, u8::try_from(idx).unwrap());
        } else if self.scope.local_slot(name).is_some() {
            let slot = self.local_slot_u8(name)?;
            self.builder.emit_u8(Opcode::LoadLocal, slot);
        } else if let Some(idx) = self.scope.free_slot(name) {
            self.builder.emit_u8(Opcode::LoadClosure, u8::try_from(idx).unwrap());
        } else {
            let idx = self.builder.add_name(Rc::clone(name));
            self.builder.emit_u16(Opcode::LoadName, idx);
        }
        Ok(())
    }

    /// Pops the top of stack and stores it into `name`, leaving the stack
    /// unchanged in size (store opcodes have net effect -1; the value
    /// popped here is the assignment's own result and must already have
    /// been duplicated by the caller if that result is still needed).
    fn emit_store_name(&mut self, name: &Rc<str>) -> PResult<()> {
        if self.scope.is_cell(name) {
            let idx = self.scope.cell_vars.iter().position(|n| n == name).unwrap();
            self.builder.emit_u8(Opcode::StoreCell, u8::try_from(idx).unwrap());
        } else if self.scope.local_slot(name).is_some() {
            let slot = self.local_slot_u8(name)?;
            self.builder.emit_u8(Opcode::StoreLocal, slot);
        } else if let Some(idx) = self.scope.free_slot(name) {
            self.builder.emit_u8(Opcode::StoreClosure, u8::try_from(idx).unwrap());
        } else {
            let idx = self.builder.add_name(Rc::clone(name));
            self.builder.emit_u16(Opcode::StoreName, idx);
        }
        Ok(())
    }

    // ---- statements ----

    fn compile_stmts(&mut self, stmts: &[Stmt]) -> PResult<()> {
        for s in stmts {
            self.compile_stmt(s, None)?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt, label: Option<Rc<str>>) -> PResult<()> {
        match stmt {
            Stmt::Expr(e) => {
                self.compile_expr(e)?;
                self.builder.emit(Opcode::Pop);
            }
            Stmt::VarDecl(decls) => {
                for (name, init) in decls {
                    if let Some(e) = init {
                        self.compile_expr(e)?;
                        self.emit_store_name(name)?;
                        self.builder.emit(Opcode::Pop);
                    }
                }
            }
            Stmt::FunctionDecl(f) => {
                let idx = self.compile_function_literal(f)?;
                self.builder.emit_u16(Opcode::MakeClosure, idx);
                self.builder.adjust_stack(1);
                let name = f.name.as_ref().expect("function declarations are named");
                self.emit_store_name(name)?;
                self.builder.emit(Opcode::Pop);
            }
            Stmt::Block(stmts) => self.compile_stmts(stmts)?,
            Stmt::If { test, consequent, alternate } => self.compile_if(test, consequent, alternate.as_deref())?,
            Stmt::For { init, test, update, body } => self.compile_for(init.as_deref(), test.as_ref(), update.as_ref(), body, label)?,
            Stmt::ForIn { decl, object, body } => self.compile_for_in_of(decl, object, body, label, Opcode::ForInInit, Opcode::ForInNext)?,
            Stmt::ForOf { decl, object, body } => self.compile_for_in_of(decl, object, body, label, Opcode::ForOfInit, Opcode::ForOfNext)?,
            Stmt::While { test, body } => self.compile_while(test, body, label)?,
            Stmt::DoWhile { body, test } => self.compile_do_while(body, test, label)?,
            Stmt::Break(target) => self.compile_break(target.as_deref())?,
            Stmt::Continue(target) => self.compile_continue(target.as_deref())?,
            Stmt::Return(value) => {
                match value {
                    Some(e) => self.compile_expr(e)?,
                    None => self.builder.emit(Opcode::LoadUndefined),
                }
                self.inline_all_finally()?;
                self.builder.emit(Opcode::Return);
            }
            Stmt::Throw(e) => {
                self.compile_expr(e)?;
                self.builder.emit(Opcode::Throw);
            }
            Stmt::Try { block, catch_param, catch_block, finally_block } => {
                self.compile_try(block, catch_param.as_deref(), catch_block.as_deref(), finally_block.as_deref())?;
            }
            Stmt::Switch { discriminant, cases } => self.compile_switch(discriminant, cases, label)?,
            Stmt::Labeled { label: l, body } => match &**body {
                Stmt::For { .. }
                | Stmt::ForIn { .. }
                | Stmt::ForOf { .. }
                | Stmt::While { .. }
                | Stmt::DoWhile { .. }
                | Stmt::Switch { .. } => self.compile_stmt(body, Some(Rc::clone(l)))?,
                _ => {
                    self.ctrl_stack.push(CtrlCtx {
                        label: Some(Rc::clone(l)),
                        kind: CtrlKind::Block,
                        break_jumps: Vec::new(),
                        continue_jumps: Vec::new(),
                        finally_len_at_entry: self.finally_stack.len(),
                        extra_live: 0,
                    });
                    self.compile_stmt(body, None)?;
                    let ctx = self.ctrl_stack.pop().unwrap();
                    for l in ctx.break_jumps {
                        self.builder.patch_jump(l);
                    }
                }
            },
            Stmt::Empty => {}
        }
        Ok(())
    }

    fn compile_if(&mut self, test: &Expr, consequent: &Stmt, alternate: Option<&Stmt>) -> PResult<()> {
        self.compile_expr(test)?;
        let to_else = self.builder.emit_jump(Opcode::JumpIfFalse);
        let depth_before = self.builder.stack_depth();
        self.compile_stmt(consequent, None)?;
        match alternate {
            Some(alt) => {
                let to_end = self.builder.emit_jump(Opcode::Jump);
                self.builder.patch_jump(to_else);
                self.builder.set_stack_depth(depth_before);
                self.compile_stmt(alt, None)?;
                self.builder.patch_jump(to_end);
            }
            None => {
                self.builder.patch_jump(to_else);
                self.builder.set_stack_depth(depth_before);
            }
        }
        Ok(())
    }

    fn compile_while(&mut self, test: &Expr, body: &Stmt, label: Option<Rc<str>>) -> PResult<()> {
        let loop_start = self.builder.current_offset();
        self.compile_expr(test)?;
        let to_end = self.builder.emit_jump(Opcode::JumpIfFalse);
        self.push_loop_ctx(label, 0);
        self.compile_stmt(body, None)?;
        let ctx = self.ctrl_stack.pop().unwrap();
        for l in ctx.continue_jumps {
            self.builder.patch_jump_to(l, loop_start);
        }
        self.builder.emit_jump_to(Opcode::Jump, loop_start);
        self.builder.patch_jump(to_end);
        for l in ctx.break_jumps {
            self.builder.patch_jump(l);
        }
        Ok(())
    }

    fn compile_do_while(&mut self, body: &Stmt, test: &Expr, label: Option<Rc<str>>) -> PResult<()> {
        let loop_start = self.builder.current_offset();
        self.push_loop_ctx(label, 0);
        self.compile_stmt(body, None)?;
        let ctx_idx = self.ctrl_stack.len() - 1;
        let test_start = self.builder.current_offset();
        let continue_jumps = std::mem::take(&mut self.ctrl_stack[ctx_idx].continue_jumps);
        for l in continue_jumps {
            self.builder.patch_jump_to(l, test_start);
        }
        self.compile_expr(test)?;
        self.builder.emit_jump_to(Opcode::JumpIfTrue, loop_start);
        let ctx = self.ctrl_stack.pop().unwrap();
        for l in ctx.break_jumps {
            self.builder.patch_jump(l);
        }
        Ok(())
    }

    fn compile_for(
        &mut self,
        init: Option<&ForInit>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        label: Option<Rc<str>>,
    ) -> PResult<()> {
        match init {
            Some(ForInit::VarDecl(decls)) => {
                for (name, e) in decls {
                    if let Some(e) = e {
                        self.compile_expr(e)?;
                        self.emit_store_name(name)?;
                        self.builder.emit(Opcode::Pop);
                    }
                }
            }
            Some(ForInit::Expr(e)) => {
                self.compile_expr(e)?;
                self.builder.emit(Opcode::Pop);
            }
            None => {}
        }

        let loop_start = self.builder.current_offset();
        let to_end = match test {
            Some(t) => {
                self.compile_expr(t)?;
                Some(self.builder.emit_jump(Opcode::JumpIfFalse))
            }
            None => None,
        };

        self.push_loop_ctx(label, 0);
        self.compile_stmt(body, None)?;
        let ctx_idx = self.ctrl_stack.len() - 1;
        let update_start = self.builder.current_offset();
        let continue_jumps = std::mem::take(&mut self.ctrl_stack[ctx_idx].continue_jumps);
        for l in continue_jumps {
            self.builder.patch_jump_to(l, update_start);
        }
        if let Some(u) = update {
            self.compile_expr(u)?;
            self.builder.emit(Opcode::Pop);
        }
        self.builder.emit_jump_to(Opcode::Jump, loop_start);

        if let Some(l) = to_end {
            self.builder.patch_jump(l);
        }
        let ctx = self.ctrl_stack.pop().unwrap();
        for l in ctx.break_jumps {
            self.builder.patch_jump(l);
        }
        Ok(())
    }

    fn compile_for_in_of(
        &mut self,
        decl: &ForTarget,
        object: &Expr,
        body: &Stmt,
        label: Option<Rc<str>>,
        init_op: Opcode,
        next_op: Opcode,
    ) -> PResult<()> {
        self.compile_expr(object)?;
        self.builder.emit(init_op); // pops iterable, pushes iterator handle
        let loop_start = self.builder.current_offset();
        let to_end = self.builder.emit_jump(next_op); // falls through pushing next value; jumps (popping the handle) when exhausted

        self.bind_for_target(decl)?; // pops the yielded value

        self.push_loop_ctx(label, 1);
        self.compile_stmt(body, None)?;
        let ctx = self.ctrl_stack.pop().unwrap();
        for l in ctx.continue_jumps {
            self.builder.patch_jump_to(l, loop_start);
        }
        self.builder.emit_jump_to(Opcode::Jump, loop_start);
        self.builder.patch_jump(to_end);
        for l in ctx.break_jumps {
            self.builder.patch_jump(l);
        }
        Ok(())
    }

    fn bind_for_target(&mut self, decl: &ForTarget) -> PResult<()> {
        match decl {
            ForTarget::VarDecl(name) => {
                self.emit_store_name(name)?;
                self.builder.emit(Opcode::Pop);
            }
            ForTarget::Pattern(Expr::Ident(name)) => {
                self.emit_store_name(name)?;
                self.builder.emit(Opcode::Pop);
            }
            ForTarget::Pattern(Expr::Member { object, property, computed }) => {
                // stack: [value]; reorder to [obj, key, value] via Rot3.
                self.compile_expr(object)?;
                self.compile_member_key(property, *computed)?;
                self.builder.emit(Opcode::Rot3);
                self.builder.emit(Opcode::SetProp);
                self.builder.emit(Opcode::Pop);
            }
            ForTarget::Pattern(_) => {
                return Err(CompileError::new("invalid for-in/for-of binding target", here()));
            }
        }
        Ok(())
    }

    fn push_loop_ctx(&mut self, label: Option<Rc<str>>, extra_live: u8) {
        self.ctrl_stack.push(CtrlCtx {
            label,
            kind: CtrlKind::Loop,
            break_jumps: Vec::new(),
            continue_jumps: Vec::new(),
            finally_len_at_entry: self.finally_stack.len(),
            extra_live,
        });
    }

    fn compile_break(&mut self, target: Option<&str>) -> PResult<()> {
        let idx = self.find_ctrl(target, false)?;
        self.unwind_to(idx, true)?;
        let l = self.builder.emit_jump(Opcode::Jump);
        self.ctrl_stack[idx].break_jumps.push(l);
        Ok(())
    }

    fn compile_continue(&mut self, target: Option<&str>) -> PResult<()> {
        let idx = self.find_ctrl(target, true)?;
        // `continue` re-enters the target loop rather than exiting it, so
        // whatever it keeps live across iterations (a for-in/for-of
        // iterator) must not be popped here.
        self.unwind_to(idx, false)?;
        let l = self.builder.emit_jump(Opcode::Jump);
        self.ctrl_stack[idx].continue_jumps.push(l);
        Ok(())
    }

    /// An unlabeled `break`/`continue` targets the innermost loop (or,
    /// for `break`, the innermost switch) regardless of any label that
    /// statement happens to carry; a labeled one targets the context
    /// carrying that exact label.
    fn find_ctrl(&self, target: Option<&str>, must_be_loop: bool) -> PResult<usize> {
        for (i, ctx) in self.ctrl_stack.iter().enumerate().rev() {
            let kind_ok = if must_be_loop {
                ctx.kind == CtrlKind::Loop
            } else if target.is_none() {
                ctx.kind == CtrlKind::Loop || ctx.kind == CtrlKind::Switch
            } else {
                true
            };
            let matches = match target {
                Some(t) => ctx.label.as_deref() == Some(t) && kind_ok,
                None => kind_ok,
            };
            if matches {
                return Ok(i);
            }
        }
        Err(CompileError::new("break/continue has no matching enclosing statement", here()))
    }

    /// Drops whatever is still live above this control context (switch
    /// discriminants, for-in/for-of iterators) and inlines any `finally`
    /// bodies entered since that context was pushed, innermost first.
    /// `include_target` is true for `break` (the target itself is being
    /// exited, so its own `extra_live` must go too) and false for
    /// `continue` (the target loop keeps iterating).
    fn unwind_to(&mut self, idx: usize, include_target: bool) -> PResult<()> {
        let from = if include_target { idx } else { idx + 1 };
        for ctx_idx in (from..self.ctrl_stack.len()).rev() {
            for _ in 0..self.ctrl_stack[ctx_idx].extra_live {
                self.builder.emit(Opcode::Pop);
            }
        }
        let cut = self.ctrl_stack[idx].finally_len_at_entry;
        self.inline_finally_from(cut)
    }

    fn inline_all_finally(&mut self) -> PResult<()> {
        self.inline_finally_from(0)
    }

    fn inline_finally_from(&mut self, cut: usize) -> PResult<()> {
        let mut i = self.finally_stack.len();
        while i > cut {
            i -= 1;
            let body = Rc::clone(&self.finally_stack[i]);
            // Temporarily hide this (and any more deeply nested) finally
            // while compiling its own body, so a jump inside it doesn't
            // re-inline itself.
            let saved = self.finally_stack.split_off(i);
            self.compile_stmts(&body)?;
            self.finally_stack.extend(saved);
        }
        Ok(())
    }

    fn compile_try(
        &mut self,
        block: &[Stmt],
        catch_param: Option<&str>,
        catch_block: Option<&[Stmt]>,
        finally_block: Option<&[Stmt]>,
    ) -> PResult<()> {
        if let Some(f) = finally_block {
            self.finally_stack.push(Rc::from(f));
        }

        let handler = self.builder.emit_jump(Opcode::TryStart);
        let depth_before = self.builder.stack_depth();
        self.compile_stmts(block)?;
        self.builder.emit(Opcode::TryEnd);
        let skip_handler = self.builder.emit_jump(Opcode::Jump);

        self.builder.patch_jump(handler);
        self.builder.set_stack_depth(depth_before);
        self.builder.emit(Opcode::Catch); // pushes the in-flight thrown value

        match catch_block {
            Some(cb) => {
                match catch_param {
                    Some(p) => {
                        let name: Rc<str> = Rc::from(p);
                        self.emit_store_name(&name)?;
                        self.builder.emit(Opcode::Pop);
                    }
                    None => self.builder.emit(Opcode::Pop),
                }
                self.compile_stmts(cb)?;
                if finally_block.is_some() {
                    self.finally_stack.pop();
                }
                self.builder.patch_jump(skip_handler);
                self.builder.set_stack_depth(depth_before);
                if let Some(f) = finally_block {
                    self.compile_stmts(f)?;
                }
            }
            None => {
                let slot = self.alloc_temp()?;
                self.builder.emit_u8(Opcode::StoreLocal, slot);
                if finally_block.is_some() {
                    self.finally_stack.pop();
                }
                if let Some(f) = finally_block {
                    self.compile_stmts(f)?;
                }
                self.builder.emit_u8(Opcode::LoadLocal, slot);
                self.free_temp();
                self.builder.emit(Opcode::Throw);

                self.builder.patch_jump(skip_handler);
                self.builder.set_stack_depth(depth_before);
                if let Some(f) = finally_block {
                    self.compile_stmts(f)?;
                }
            }
        }
        Ok(())
    }

    fn compile_switch(&mut self, discriminant: &Expr, cases: &[SwitchCase], label: Option<Rc<str>>) -> PResult<()> {
        self.compile_expr(discriminant)?;
        self.ctrl_stack.push(CtrlCtx {
            label,
            kind: CtrlKind::Switch,
            break_jumps: Vec::new(),
            continue_jumps: Vec::new(),
            finally_len_at_entry: self.finally_stack.len(),
            extra_live: 1,
        });

        let mut case_labels: Vec<Option<JumpLabel>> = Vec::with_capacity(cases.len());
        let mut default_index = None;
        for (i, case) in cases.iter().enumerate() {
            match &case.test {
                Some(test) => {
                    self.builder.emit(Opcode::Dup);
                    self.compile_expr(test)?;
                    self.builder.emit(Opcode::Seq);
                    case_labels.push(Some(self.builder.emit_jump(Opcode::JumpIfTrue)));
                }
                None => {
                    default_index = Some(i);
                    case_labels.push(None);
                }
            }
        }
        let fallback = self.builder.emit_jump(Opcode::Jump);
        let depth_at_bodies = self.builder.stack_depth();

        for (i, case) in cases.iter().enumerate() {
            self.builder.set_stack_depth(depth_at_bodies);
            if let Some(l) = case_labels[i] {
                self.builder.patch_jump(l);
            }
            if default_index == Some(i) {
                self.builder.patch_jump_to(fallback, self.builder.current_offset());
            }
            self.compile_stmts(&case.body)?;
        }
        if default_index.is_none() {
            self.builder.patch_jump(fallback);
            self.builder.set_stack_depth(depth_at_bodies);
        }
        self.builder.emit(Opcode::Pop);
        let end = self.builder.current_offset();
        let ctx = self.ctrl_stack.pop().unwrap();
        for l in ctx.break_jumps {
            self.builder.patch_jump_to(l, end);
        }
        Ok(())
    }

    // ---- expressions (each leaves exactly one value on the stack) ----

    fn compile_expr(&mut self, expr: &Expr) -> PResult<()> {
        match expr {
            Expr::Number(n) => {
                let idx = self.builder.add_number(*n);
                self.builder.emit_u16(Opcode::LoadConst, idx);
            }
            Expr::Str(s) => {
                let idx = self.builder.add_str(Rc::clone(s));
                self.builder.emit_u16(Opcode::LoadConst, idx);
            }
            Expr::Bool(true) => self.builder.emit(Opcode::LoadTrue),
            Expr::Bool(false) => self.builder.emit(Opcode::LoadFalse),
            Expr::Null => self.builder.emit(Opcode::LoadNull),
            Expr::Undefined => self.builder.emit(Opcode::LoadUndefined),
            Expr::Ident(name) => self.emit_load_name(name)?,
            Expr::This => self.builder.emit(Opcode::LoadThis),
            Expr::Array(elems) => {
                for e in elems {
                    self.compile_expr(e)?;
                }
                let n = u16::try_from(elems.len()).map_err(|_| CompileError::new("array literal too large", here()))?;
                self.builder.emit_u16(Opcode::BuildArray, n);
                self.builder.adjust_stack(1 - i32::from(n));
            }
            Expr::Object(props) => self.compile_object_literal(props)?,
            Expr::Regex { pattern, flags } => {
                let idx = self.builder.add_regex(Rc::clone(pattern), Rc::clone(flags));
                self.builder.emit_u16(Opcode::BuildRegex, idx);
                self.builder.adjust_stack(1);
            }
            Expr::Function(f) => {
                let idx = self.compile_function_literal(f)?;
                self.builder.emit_u16(Opcode::MakeClosure, idx);
                self.builder.adjust_stack(1);
            }
            Expr::Unary { op, argument } => self.compile_unary(*op, argument)?,
            Expr::Update { op, prefix, argument } => self.compile_update(*op, *prefix, argument)?,
            Expr::Binary { op, left, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.builder.emit(binop_opcode(*op));
            }
            Expr::Logical { op, left, right } => self.compile_logical(*op, left, right)?,
            Expr::Assign { op, target, value } => self.compile_assign(*op, target, value)?,
            Expr::Conditional { test, consequent, alternate } => self.compile_conditional(test, consequent, alternate)?,
            Expr::Call { callee, args } => self.compile_call(callee, args)?,
            Expr::New { callee, args } => {
                self.compile_expr(callee)?;
                for a in args {
                    self.compile_expr(a)?;
                }
                let argc = u8::try_from(args.len()).map_err(|_| CompileError::new("too many constructor arguments", here()))?;
                self.builder.emit_u8(Opcode::New, argc);
                self.builder.adjust_stack(1 - 1 - i32::from(argc));
            }
            Expr::Member { object, property, computed } => {
                self.compile_expr(object)?;
                self.compile_member_key(property, *computed)?;
                self.builder.emit(Opcode::GetProp);
            }
            Expr::Sequence(parts) => {
                for (i, e) in parts.iter().enumerate() {
                    self.compile_expr(e)?;
                    if i + 1 < parts.len() {
                        self.builder.emit(Opcode::Pop);
                    }
                }
            }
        }
        Ok(())
    }

    fn compile_member_key(&mut self, property: &Expr, computed: bool) -> PResult<()> {
        if computed {
            self.compile_expr(property)
        } else if let Expr::Str(name) = property {
            let idx = self.builder.add_str(Rc::clone(name));
            self.builder.emit_u16(Opcode::LoadConst, idx);
            Ok(())
        } else {
            unreachable!("parser always gives non-computed member keys as Expr::Str")
        }
    }

    fn compile_object_literal(&mut self, props: &[PropDef]) -> PResult<()> {
        for p in props {
            match &p.key {
                PropKey::Ident(name) => {
                    let idx = self.builder.add_str(Rc::clone(name));
                    self.builder.emit_u16(Opcode::LoadConst, idx);
                }
                PropKey::Computed(e) => self.compile_expr(e)?,
            }
            let tag = match p.kind {
                PropKind::Init => 0.0,
                PropKind::Get => 1.0,
                PropKind::Set => 2.0,
            };
            let tag_idx = self.builder.add_number(tag);
            self.builder.emit_u16(Opcode::LoadConst, tag_idx);
            self.compile_expr(&p.value)?;
        }
        let n = u16::try_from(props.len()).map_err(|_| CompileError::new("object literal too large", here()))?;
        self.builder.emit_u16(Opcode::BuildObject, n);
        self.builder.adjust_stack(1 - 3 * i32::from(n));
        Ok(())
    }

    fn compile_unary(&mut self, op: UnaryOp, argument: &Expr) -> PResult<()> {
        match op {
            UnaryOp::Delete => match argument {
                Expr::Member { object, property, computed } => {
                    self.compile_expr(object)?;
                    self.compile_member_key(property, *computed)?;
                    self.builder.emit(Opcode::DeleteProp);
                }
                _ => self.builder.emit(Opcode::LoadTrue),
            },
            UnaryOp::Void => {
                self.compile_expr(argument)?;
                self.builder.emit(Opcode::Pop);
                self.builder.emit(Opcode::LoadUndefined);
            }
            UnaryOp::Typeof => {
                if let Expr::Ident(name) = argument {
                    if !self.scope.is_cell(name) && self.scope.local_slot(name).is_none() && self.scope.free_slot(name).is_none() {
                        let idx = self.builder.add_name(Rc::clone(name));
                        self.builder.emit_u16(Opcode::TypeofName, idx);
                        return Ok(());
                    }
                }
                self.compile_expr(argument)?;
                self.builder.emit(Opcode::Typeof);
            }
            UnaryOp::Neg => {
                self.compile_expr(argument)?;
                self.builder.emit(Opcode::Neg);
            }
            UnaryOp::Pos => {
                self.compile_expr(argument)?;
                self.builder.emit(Opcode::Pos);
            }
            UnaryOp::Not => {
                self.compile_expr(argument)?;
                self.builder.emit(Opcode::Not);
            }
            UnaryOp::BitNot => {
                self.compile_expr(argument)?;
                self.builder.emit(Opcode::BNot);
            }
        }
        Ok(())
    }

    fn compile_update(&mut self, op: UpdateOp, prefix: bool, argument: &Expr) -> PResult<()> {
        let step = if op == UpdateOp::Inc { Opcode::Inc } else { Opcode::Dec };
        match argument {
            Expr::Ident(name) => {
                self.emit_load_name(name)?;
                if prefix {
                    self.builder.emit(step);
                    self.builder.emit(Opcode::Dup);
                    self.emit_store_name(name)?;
                } else {
                    self.builder.emit(Opcode::Dup);
                    self.builder.emit(step);
                    self.emit_store_name(name)?;
                }
            }
            Expr::Member { object, property, computed } => {
                self.compile_expr(object)?;
                self.compile_member_key(property, *computed)?;
                self.builder.emit(Opcode::Dup2);
                self.builder.emit(Opcode::GetProp);
                if prefix {
                    self.builder.emit(step);
                    self.builder.emit(Opcode::SetProp);
                } else {
                    let slot = self.alloc_temp()?;
                    self.builder.emit_u8(Opcode::StoreLocal, slot);
                    self.builder.emit_u8(Opcode::LoadLocal, slot);
                    self.builder.emit(step);
                    self.builder.emit(Opcode::SetProp);
                    self.builder.emit(Opcode::Pop);
                    self.builder.emit_u8(Opcode::LoadLocal, slot);
                    self.free_temp();
                }
            }
            _ => return Err(CompileError::new("invalid increment/decrement target", here())),
        }
        Ok(())
    }

    fn compile_logical(&mut self, op: LogicalOp, left: &Expr, right: &Expr) -> PResult<()> {
        self.compile_expr(left)?;
        self.builder.emit(Opcode::Dup);
        let short_circuit = if op == LogicalOp::And { Opcode::JumpIfFalse } else { Opcode::JumpIfTrue };
        let end = self.builder.emit_jump(short_circuit);
        self.builder.emit(Opcode::Pop);
        self.compile_expr(right)?;
        self.builder.patch_jump(end);
        Ok(())
    }

    fn compile_conditional(&mut self, test: &Expr, consequent: &Expr, alternate: &Expr) -> PResult<()> {
        self.compile_expr(test)?;
        let to_alt = self.builder.emit_jump(Opcode::JumpIfFalse);
        let depth = self.builder.stack_depth();
        self.compile_expr(consequent)?;
        let to_end = self.builder.emit_jump(Opcode::Jump);
        self.builder.patch_jump(to_alt);
        self.builder.set_stack_depth(depth);
        self.compile_expr(alternate)?;
        self.builder.patch_jump(to_end);
        Ok(())
    }

    fn compile_call(&mut self, callee: &Expr, args: &[Expr]) -> PResult<()> {
        if let Expr::Member { object, property, computed } = callee {
            self.compile_expr(object)?;
            self.compile_member_key(property, *computed)?;
            for a in args {
                self.compile_expr(a)?;
            }
            let argc = u8::try_from(args.len()).map_err(|_| CompileError::new("too many call arguments", here()))?;
            self.builder.emit_u8(Opcode::CallMethod, argc);
            self.builder.adjust_stack(1 - 2 - i32::from(argc));
        } else {
            self.compile_expr(callee)?;
            for a in args {
                self.compile_expr(a)?;
            }
            let argc = u8::try_from(args.len()).map_err(|_| CompileError::new("too many call arguments", here()))?;
            self.builder.emit_u8(Opcode::Call, argc);
            self.builder.adjust_stack(1 - 1 - i32::from(argc));
        }
        Ok(())
    }

    fn compile_assign(&mut self, op: AssignOp, target: &Expr, value: &Expr) -> PResult<()> {
        if let AssignOp::Assign = op {
            match target {
                Expr::Ident(name) => {
                    self.compile_expr(value)?;
                    self.builder.emit(Opcode::Dup);
                    self.emit_store_name(name)?;
                }
                Expr::Member { object, property, computed } => {
                    self.compile_expr(object)?;
                    self.compile_member_key(property, *computed)?;
                    self.compile_expr(value)?;
                    self.builder.emit(Opcode::SetProp);
                }
                _ => return Err(CompileError::new("invalid assignment target", here())),
            }
            return Ok(());
        }

        let bin = compound_opcode(op);
        match target {
            Expr::Ident(name) => {
                self.emit_load_name(name)?;
                self.compile_expr(value)?;
                self.builder.emit(bin);
                self.builder.emit(Opcode::Dup);
                self.emit_store_name(name)?;
            }
            Expr::Member { object, property, computed } => {
                self.compile_expr(object)?;
                self.compile_member_key(property, *computed)?;
                self.builder.emit(Opcode::Dup2);
                self.builder.emit(Opcode::GetProp);
                self.compile_expr(value)?;
                self.builder.emit(bin);
                self.builder.emit(Opcode::SetProp);
            }
            _ => return Err(CompileError::new("invalid assignment target", here())),
        }
        Ok(())
    }

    fn compile_function_literal(&mut self, f: &FunctionNode) -> PResult<u16> {
        let inner_scope = analyze_function(&f.params, &f.body, f.expr_body.as_deref(), false);
        let mut capture_sources = Vec::with_capacity(inner_scope.free_vars.len());
        for name in &inner_scope.free_vars {
            if self.scope.is_cell(name) {
                let idx = self.scope.cell_vars.iter().position(|n| n == name).unwrap();
                capture_sources.push(CaptureSource::Cell(u16::try_from(idx).unwrap()));
            } else if let Some(idx) = self.scope.free_slot(name) {
                capture_sources.push(CaptureSource::Closure(u16::try_from(idx).unwrap()));
            } else {
                return Err(CompileError::new("internal: unresolved closure capture", here()));
            }
        }

        let mut inner = Compiler::new(inner_scope);
        if let Some(e) = &f.expr_body {
            inner.compile_expr(e)?;
            inner.builder.emit(Opcode::Return);
        } else {
            inner.compile_stmts(&f.body)?;
            inner.builder.emit(Opcode::LoadUndefined);
            inner.builder.emit(Opcode::Return);
        }
        let name = f.name.clone().unwrap_or_else(|| Rc::from(""));
        let compiled = inner.finish(name, f.params.len(), f.is_arrow, capture_sources);
        Ok(self.builder.add_function(Rc::new(compiled)))
    }
}

fn binop_opcode(op: BinOp) -> Opcode {
    match op {
        BinOp::Add => Opcode::Add,
        BinOp::Sub => Opcode::Sub,
        BinOp::Mul => Opcode::Mul,
        BinOp::Div => Opcode::Div,
        BinOp::Mod => Opcode::Mod,
        BinOp::Pow => Opcode::Pow,
        BinOp::BitAnd => Opcode::BAnd,
        BinOp::BitOr => Opcode::BOr,
        BinOp::BitXor => Opcode::BXor,
        BinOp::Shl => Opcode::Shl,
        BinOp::Shr => Opcode::Shr,
        BinOp::UShr => Opcode::UShr,
        BinOp::Lt => Opcode::Lt,
        BinOp::Le => Opcode::Le,
        BinOp::Gt => Opcode::Gt,
        BinOp::Ge => Opcode::Ge,
        BinOp::Eq => Opcode::Eq,
        BinOp::NotEq => Opcode::Ne,
        BinOp::StrictEq => Opcode::Seq,
        BinOp::StrictNotEq => Opcode::Sne,
        BinOp::Instanceof => Opcode::Instanceof,
        BinOp::In => Opcode::In,
    }
}

fn compound_opcode(op: AssignOp) -> Opcode {
    match op {
        AssignOp::Assign => unreachable!("plain assignment has its own code path"),
        AssignOp::Add => Opcode::Add,
        AssignOp::Sub => Opcode::Sub,
        AssignOp::Mul => Opcode::Mul,
        AssignOp::Div => Opcode::Div,
        AssignOp::Mod => Opcode::Mod,
        AssignOp::Pow => Opcode::Pow,
        AssignOp::BitAnd => Opcode::BAnd,
        AssignOp::BitOr => Opcode::BOr,
        AssignOp::BitXor => Opcode::BXor,
        AssignOp::Shl => Opcode::Shl,
        AssignOp::Shr => Opcode::Shr,
        AssignOp::UShr => Opcode::UShr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::code::ConstValue;
    use crate::parser::parse_program;

    fn compile(src: &str) -> Rc<CompiledFunction> {
        compile_program(&parse_program(src).unwrap()).unwrap()
    }

    #[test]
    fn every_function_body_ends_with_an_explicit_return() {
        let f = compile("1 + 1;");
        assert_eq!(f.bytecode.last().copied(), Some(Opcode::Return as u8));
    }

    #[test]
    fn var_decl_allocates_a_local_slot() {
        let f = compile("var x = 1; var y = 2;");
        assert!(f.num_locals >= 2);
    }

    #[test]
    fn number_and_name_literals_land_in_the_constant_pool() {
        let f = compile("var total = 42;");
        assert!(f.constants.iter().any(|c| matches!(c, ConstValue::Number(n) if *n == 42.0)));
        assert!(f.constants.iter().any(|c| matches!(c, ConstValue::Name(n) if &**n == "total")));
    }

    #[test]
    fn nested_function_literal_compiles_to_a_closure_constant() {
        let f = compile("function outer() { function inner() { return 1; } return inner; }");
        assert!(f.constants.iter().any(|c| matches!(c, ConstValue::Function(_))));
    }

    #[test]
    fn a_variable_captured_by_an_inner_function_becomes_a_free_var() {
        let f = compile("function outer() { var captured = 1; function inner() { return captured; } return inner; }");
        let ConstValue::Function(inner) = f.constants.iter().find(|c| matches!(c, ConstValue::Function(_))).unwrap()
        else {
            unreachable!()
        };
        assert!(inner.free_vars.iter().any(|n| &**n == "captured"));
    }

    #[test]
    fn regex_literal_compiles_to_a_regex_constant() {
        let f = compile("var r = /ab+c/i;");
        assert!(f.constants.iter().any(|c| matches!(c, ConstValue::Regex { pattern, flags } if &**pattern == "ab+c" && &**flags == "i")));
    }

    #[test]
    fn max_stack_depth_is_recorded_and_nonzero_for_nontrivial_code() {
        let f = compile("var a = 1; var b = 2; var c = a + b * 2;");
        assert!(f.max_stack_depth > 0);
    }

    #[test]
    fn fixed_effect_opcodes_report_their_net_stack_change() {
        assert_eq!(Opcode::Add.stack_effect(), Some(-1));
        assert_eq!(Opcode::LoadConst.stack_effect(), Some(1));
        assert_eq!(Opcode::Pop.stack_effect(), Some(-1));
        assert_eq!(Opcode::Call.stack_effect(), None);
    }
}
