//! Scope analyzer (§4.3), run by the compiler once per function body
//! (including the program body and arrow functions).
//!
//! Two passes per function: [`hoisted_names`] collects `var`/function-decl
//! names without descending into nested function bodies; [`FreeVarWalker`]
//! then walks the whole body, including nested functions, to compute which
//! locals are captured (`cell_vars`) and which outer names this function
//! itself still needs (`free_vars`), recursing into
//! [`analyze_function`] for every nested function it meets.

use std::collections::HashSet;
use std::rc::Rc;

use crate::ast::{Expr, ForInit, ForTarget, FunctionNode, PropDef, PropKey, Stmt};

/// Insertion-order-preserving set, since bytecode slot assignment should be
/// deterministic and stable across compiler runs.
#[derive(Debug, Default, Clone)]
struct OrderedSet {
    order: Vec<Rc<str>>,
    seen: HashSet<Rc<str>>,
}

impl OrderedSet {
    fn insert(&mut self, name: Rc<str>) {
        if self.seen.insert(Rc::clone(&name)) {
            self.order.push(name);
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.seen.contains(name)
    }

    fn into_vec(self) -> Vec<Rc<str>> {
        self.order
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScopeInfo {
    pub locals: Vec<Rc<str>>,
    pub cell_vars: Vec<Rc<str>>,
    pub free_vars: Vec<Rc<str>>,
}

impl ScopeInfo {
    #[must_use]
    pub fn local_slot(&self, name: &str) -> Option<usize> {
        self.locals.iter().position(|n| &**n == name)
    }

    #[must_use]
    pub fn is_cell(&self, name: &str) -> bool {
        self.cell_vars.iter().any(|n| &**n == name)
    }

    #[must_use]
    pub fn free_slot(&self, name: &str) -> Option<usize> {
        self.free_vars.iter().position(|n| &**n == name)
    }
}

/// Computes the `locals`/`cell_vars`/`free_vars` triple for one function
/// (or the program, passing an empty `params` list).
#[must_use]
pub fn analyze_function(params: &[Rc<str>], body: &[Stmt], expr_body: Option<&Expr>, is_program: bool) -> ScopeInfo {
    let mut locals = OrderedSet::default();
    for p in params {
        locals.insert(Rc::clone(p));
    }
    if !is_program {
        locals.insert(Rc::from("arguments"));
    }
    let mut hoisted = OrderedSet::default();
    for stmt in body {
        collect_hoisted(stmt, &mut hoisted);
    }
    for name in hoisted.into_vec() {
        locals.insert(name);
    }
    let locals_set: HashSet<Rc<str>> = locals.seen.clone();

    let mut walker = FreeVarWalker { locals: &locals_set, cell_vars: OrderedSet::default(), free_vars: OrderedSet::default() };
    for stmt in body {
        walker.visit_stmt(stmt);
    }
    if let Some(e) = expr_body {
        walker.visit_expr(e);
    }

    ScopeInfo { locals: locals.into_vec(), cell_vars: walker.cell_vars.into_vec(), free_vars: walker.free_vars.into_vec() }
}

/// Pass 1: `var` declarators and function declarations, hoisted to the top
/// of the enclosing function without descending into nested function
/// bodies (their own locals are the nested function's problem).
fn collect_hoisted(stmt: &Stmt, out: &mut OrderedSet) {
    match stmt {
        Stmt::VarDecl(decls) => {
            for (name, _) in decls {
                out.insert(Rc::clone(name));
            }
        }
        Stmt::FunctionDecl(f) => {
            if let Some(name) = &f.name {
                out.insert(Rc::clone(name));
            }
        }
        Stmt::Block(stmts) => {
            for s in stmts {
                collect_hoisted(s, out);
            }
        }
        Stmt::If { consequent, alternate, .. } => {
            collect_hoisted(consequent, out);
            if let Some(a) = alternate {
                collect_hoisted(a, out);
            }
        }
        Stmt::For { init, body, .. } => {
            if let Some(init) = init {
                if let ForInit::VarDecl(decls) = init.as_ref() {
                    for (name, _) in decls {
                        out.insert(Rc::clone(name));
                    }
                }
            }
            collect_hoisted(body, out);
        }
        Stmt::ForIn { decl, body, .. } | Stmt::ForOf { decl, body, .. } => {
            if let ForTarget::VarDecl(name) = decl {
                out.insert(Rc::clone(name));
            }
            collect_hoisted(body, out);
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } | Stmt::Labeled { body, .. } => {
            collect_hoisted(body, out);
        }
        Stmt::Try { block, catch_block, finally_block, .. } => {
            for s in block {
                collect_hoisted(s, out);
            }
            if let Some(cb) = catch_block {
                for s in cb {
                    collect_hoisted(s, out);
                }
            }
            if let Some(fb) = finally_block {
                for s in fb {
                    collect_hoisted(s, out);
                }
            }
        }
        Stmt::Switch { cases, .. } => {
            for case in cases {
                for s in &case.body {
                    collect_hoisted(s, out);
                }
            }
        }
        Stmt::Expr(_) | Stmt::Break(_) | Stmt::Continue(_) | Stmt::Return(_) | Stmt::Throw(_) | Stmt::Empty => {}
    }
}

/// Pass 2, run with `locals` fixed: direct identifier references resolve
/// immediately; nested functions are analyzed recursively and their
/// unresolved names either settle here (capturing one of our locals, so it
/// joins `cell_vars`) or propagate further up (joining our own `free_vars`).
struct FreeVarWalker<'a> {
    locals: &'a HashSet<Rc<str>>,
    cell_vars: OrderedSet,
    free_vars: OrderedSet,
}

impl<'a> FreeVarWalker<'a> {
    fn note_use(&mut self, name: &Rc<str>) {
        if !self.locals.contains(&**name) {
            self.free_vars.insert(Rc::clone(name));
        }
    }

    fn visit_nested_function(&mut self, f: &FunctionNode) {
        let info = analyze_function(&f.params, &f.body, f.expr_body.as_deref(), false);
        for name in &info.free_vars {
            if self.locals.contains(&**name) {
                self.cell_vars.insert(Rc::clone(name));
            } else {
                self.free_vars.insert(Rc::clone(name));
            }
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(e) | Stmt::Throw(e) => self.visit_expr(e),
            Stmt::VarDecl(decls) => {
                for (_, init) in decls {
                    if let Some(e) = init {
                        self.visit_expr(e);
                    }
                }
            }
            Stmt::FunctionDecl(f) => self.visit_nested_function(f),
            Stmt::Block(stmts) => {
                for s in stmts {
                    self.visit_stmt(s);
                }
            }
            Stmt::If { test, consequent, alternate } => {
                self.visit_expr(test);
                self.visit_stmt(consequent);
                if let Some(a) = alternate {
                    self.visit_stmt(a);
                }
            }
            Stmt::For { init, test, update, body } => {
                if let Some(init) = init {
                    match init.as_ref() {
                        ForInit::VarDecl(decls) => {
                            for (_, e) in decls {
                                if let Some(e) = e {
                                    self.visit_expr(e);
                                }
                            }
                        }
                        ForInit::Expr(e) => self.visit_expr(e),
                    }
                }
                if let Some(t) = test {
                    self.visit_expr(t);
                }
                if let Some(u) = update {
                    self.visit_expr(u);
                }
                self.visit_stmt(body);
            }
            Stmt::ForIn { decl, object, body } | Stmt::ForOf { decl, object, body } => {
                if let ForTarget::Pattern(e) = decl {
                    self.visit_expr(e);
                }
                self.visit_expr(object);
                self.visit_stmt(body);
            }
            Stmt::While { test, body } => {
                self.visit_expr(test);
                self.visit_stmt(body);
            }
            Stmt::DoWhile { body, test } => {
                self.visit_stmt(body);
                self.visit_expr(test);
            }
            Stmt::Break(_) | Stmt::Continue(_) | Stmt::Empty => {}
            Stmt::Return(e) => {
                if let Some(e) = e {
                    self.visit_expr(e);
                }
            }
            Stmt::Try { block, catch_block, finally_block, .. } => {
                for s in block {
                    self.visit_stmt(s);
                }
                if let Some(cb) = catch_block {
                    for s in cb {
                        self.visit_stmt(s);
                    }
                }
                if let Some(fb) = finally_block {
                    for s in fb {
                        self.visit_stmt(s);
                    }
                }
            }
            Stmt::Switch { discriminant, cases } => {
                self.visit_expr(discriminant);
                for case in cases {
                    if let Some(t) = &case.test {
                        self.visit_expr(t);
                    }
                    for s in &case.body {
                        self.visit_stmt(s);
                    }
                }
            }
            Stmt::Labeled { body, .. } => self.visit_stmt(body),
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Ident(name) => self.note_use(name),
            Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Null | Expr::Undefined | Expr::This | Expr::Regex { .. } => {}
            Expr::Array(elems) => {
                for e in elems {
                    self.visit_expr(e);
                }
            }
            Expr::Object(props) => {
                for p in props {
                    self.visit_prop(p);
                }
            }
            Expr::Function(f) => self.visit_nested_function(f),
            Expr::Unary { argument, .. } | Expr::Update { argument, .. } => self.visit_expr(argument),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.visit_expr(left);
                self.visit_expr(right);
            }
            Expr::Assign { target, value, .. } => {
                self.visit_expr(target);
                self.visit_expr(value);
            }
            Expr::Conditional { test, consequent, alternate } => {
                self.visit_expr(test);
                self.visit_expr(consequent);
                self.visit_expr(alternate);
            }
            Expr::Call { callee, args } | Expr::New { callee, args } => {
                self.visit_expr(callee);
                for a in args {
                    self.visit_expr(a);
                }
            }
            Expr::Member { object, property, computed } => {
                self.visit_expr(object);
                if *computed {
                    self.visit_expr(property);
                }
            }
            Expr::Sequence(parts) => {
                for e in parts {
                    self.visit_expr(e);
                }
            }
        }
    }

    fn visit_prop(&mut self, prop: &PropDef) {
        if let PropKey::Computed(e) = &prop.key {
            self.visit_expr(e);
        }
        self.visit_expr(&prop.value);
    }
}
