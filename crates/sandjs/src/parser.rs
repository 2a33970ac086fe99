//! Recursive-descent parser (§4.2).
//!
//! Precedence is handled by a standard climb (`**` right-associative,
//! `&&`/`||` building a distinct "logical" node so the compiler can emit
//! short-circuit code). ASI is modelled as "semicolon is consumed if
//! present" — no newline-sensitive lookahead.

use std::rc::Rc;

use crate::ast::*;
use crate::exception::{CodeLoc, CompileError};
use crate::lexer::{Keyword, Lexer, Punct, TokKind, Token};

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    cur: Token,
    /// Set while parsing a `for (...)` head's init clause, so the relational
    /// precedence level refuses to consume a bare `in` there, letting the
    /// caller detect a for-in loop instead.
    exclude_in: bool,
}

type PResult<T> = Result<T, CompileError>;

impl<'a> Parser<'a> {
    pub fn new(src: &'a str) -> PResult<Self> {
        let mut lexer = Lexer::new(src);
        let cur = lexer.next_token()?;
        Ok(Self { lexer, cur, exclude_in: false })
    }

    #[must_use]
    pub fn loc(&self) -> CodeLoc {
        CodeLoc { line: self.cur.line, column: self.cur.column }
    }

    fn advance(&mut self) -> PResult<Token> {
        let old = std::mem::replace(&mut self.cur, self.lexer.next_token()?);
        Ok(old)
    }

    fn checkpoint(&self) -> (Token, (usize, u32, u32)) {
        (self.cur.clone(), self.lexer.state())
    }

    fn restore(&mut self, checkpoint: (Token, (usize, u32, u32))) {
        self.cur = checkpoint.0;
        self.lexer.set_state(checkpoint.1);
    }

    fn is_punct(&self, p: Punct) -> bool {
        matches!(&self.cur.kind, TokKind::Punct(q) if *q == p)
    }

    fn is_kw(&self, k: Keyword) -> bool {
        matches!(&self.cur.kind, TokKind::Keyword(q) if *q == k)
    }

    fn eat_punct(&mut self, p: Punct) -> PResult<bool> {
        if self.is_punct(p) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect_punct(&mut self, p: Punct) -> PResult<()> {
        if !self.eat_punct(p)? {
            return Err(CompileError::new(format!("expected {p:?}"), self.loc()));
        }
        Ok(())
    }

    fn eat_kw(&mut self, k: Keyword) -> PResult<bool> {
        if self.is_kw(k) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn ident_name(&mut self) -> PResult<Rc<str>> {
        match self.cur.kind.clone() {
            TokKind::Ident(s) => {
                self.advance()?;
                Ok(s)
            }
            _ => Err(CompileError::new("expected identifier", self.loc())),
        }
    }

    /// Consumes a trailing `;` if present; the dialect's ASI never errors on
    /// its absence.
    fn semi(&mut self) -> PResult<()> {
        self.eat_punct(Punct::Semi)?;
        Ok(())
    }

    pub fn parse_program(mut self) -> PResult<Program> {
        let mut body = Vec::new();
        while !matches!(self.cur.kind, TokKind::Eof) {
            body.push(self.parse_stmt()?);
        }
        Ok(Program { body })
    }

    fn parse_block_raw(&mut self) -> PResult<Vec<Stmt>> {
        self.expect_punct(Punct::LBrace)?;
        let mut body = Vec::new();
        while !self.is_punct(Punct::RBrace) && !matches!(self.cur.kind, TokKind::Eof) {
            body.push(self.parse_stmt()?);
        }
        self.expect_punct(Punct::RBrace)?;
        Ok(body)
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        match self.cur.kind.clone() {
            TokKind::Punct(Punct::LBrace) => Ok(Stmt::Block(self.parse_block_raw()?)),
            TokKind::Punct(Punct::Semi) => {
                self.advance()?;
                Ok(Stmt::Empty)
            }
            TokKind::Keyword(Keyword::Var) => {
                self.advance()?;
                let decls = self.parse_var_declarators()?;
                self.semi()?;
                Ok(Stmt::VarDecl(decls))
            }
            TokKind::Keyword(Keyword::Function) => {
                self.advance()?;
                let f = self.parse_function_tail(false)?;
                Ok(Stmt::FunctionDecl(Rc::new(f)))
            }
            TokKind::Keyword(Keyword::If) => self.parse_if(),
            TokKind::Keyword(Keyword::For) => self.parse_for(),
            TokKind::Keyword(Keyword::While) => {
                self.advance()?;
                self.expect_punct(Punct::LParen)?;
                let test = self.parse_expression()?;
                self.expect_punct(Punct::RParen)?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::While { test, body })
            }
            TokKind::Keyword(Keyword::Do) => {
                self.advance()?;
                let body = Box::new(self.parse_stmt()?);
                if !self.eat_kw(Keyword::While)? {
                    return Err(CompileError::new("expected 'while' after do body", self.loc()));
                }
                self.expect_punct(Punct::LParen)?;
                let test = self.parse_expression()?;
                self.expect_punct(Punct::RParen)?;
                self.semi()?;
                Ok(Stmt::DoWhile { body, test })
            }
            TokKind::Keyword(Keyword::Break) => {
                self.advance()?;
                let label = self.optional_label()?;
                self.semi()?;
                Ok(Stmt::Break(label))
            }
            TokKind::Keyword(Keyword::Continue) => {
                self.advance()?;
                let label = self.optional_label()?;
                self.semi()?;
                Ok(Stmt::Continue(label))
            }
            TokKind::Keyword(Keyword::Return) => {
                self.advance()?;
                let value = if self.is_punct(Punct::Semi) || self.is_punct(Punct::RBrace) || matches!(self.cur.kind, TokKind::Eof) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.semi()?;
                Ok(Stmt::Return(value))
            }
            TokKind::Keyword(Keyword::Throw) => {
                self.advance()?;
                let value = self.parse_expression()?;
                self.semi()?;
                Ok(Stmt::Throw(value))
            }
            TokKind::Keyword(Keyword::Try) => self.parse_try(),
            TokKind::Keyword(Keyword::Switch) => self.parse_switch(),
            TokKind::Ident(name) => {
                // labeled statement vs expression statement: IDENT ":" with
                // one-token lookahead.
                let checkpoint = self.checkpoint();
                self.advance()?;
                if self.eat_punct(Punct::Colon)? {
                    let body = Box::new(self.parse_stmt()?);
                    return Ok(Stmt::Labeled { label: name, body });
                }
                self.restore(checkpoint);
                let e = self.parse_expression()?;
                self.semi()?;
                Ok(Stmt::Expr(e))
            }
            _ => {
                let e = self.parse_expression()?;
                self.semi()?;
                Ok(Stmt::Expr(e))
            }
        }
    }

    fn optional_label(&mut self) -> PResult<Option<Rc<str>>> {
        if !self.cur.preceded_by_newline {
            if let TokKind::Ident(s) = self.cur.kind.clone() {
                self.advance()?;
                return Ok(Some(s));
            }
        }
        Ok(None)
    }

    fn parse_var_declarators(&mut self) -> PResult<Vec<(Rc<str>, Option<Expr>)>> {
        let mut decls = Vec::new();
        loop {
            let name = self.ident_name()?;
            let init = if self.eat_punct(Punct::Assign)? { Some(self.parse_assignment()?) } else { None };
            decls.push((name, init));
            if !self.eat_punct(Punct::Comma)? {
                break;
            }
        }
        Ok(decls)
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        self.advance()?;
        self.expect_punct(Punct::LParen)?;
        let test = self.parse_expression()?;
        self.expect_punct(Punct::RParen)?;
        let consequent = Box::new(self.parse_stmt()?);
        let alternate = if self.eat_kw(Keyword::Else)? { Some(Box::new(self.parse_stmt()?)) } else { None };
        Ok(Stmt::If { test, consequent, alternate })
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        self.advance()?;
        self.expect_punct(Punct::LParen)?;

        if self.is_punct(Punct::Semi) {
            self.advance()?;
            return self.parse_for_rest(None);
        }

        if self.eat_kw(Keyword::Var)? {
            let name = self.ident_name()?;
            // for-in/for-of: a lone `var x` declarator (no initializer) as LHS.
            if self.eat_kw(Keyword::In)? {
                let object = self.parse_expression()?;
                self.expect_punct(Punct::RParen)?;
                let body = Box::new(self.parse_stmt()?);
                return Ok(Stmt::ForIn { decl: ForTarget::VarDecl(name), object, body });
            }
            if self.eat_kw(Keyword::Of)? {
                let object = self.parse_assignment()?;
                self.expect_punct(Punct::RParen)?;
                let body = Box::new(self.parse_stmt()?);
                return Ok(Stmt::ForOf { decl: ForTarget::VarDecl(name), object, body });
            }
            let init = if self.eat_punct(Punct::Assign)? { Some(self.parse_assignment()?) } else { None };
            let mut decls = vec![(name, init)];
            while self.eat_punct(Punct::Comma)? {
                let n = self.ident_name()?;
                let i = if self.eat_punct(Punct::Assign)? { Some(self.parse_assignment()?) } else { None };
                decls.push((n, i));
            }
            self.expect_punct(Punct::Semi)?;
            return self.parse_for_rest(Some(Box::new(ForInit::VarDecl(decls))));
        }

        // init clause parsed with an implicit exclude-in rule: an `in`
        // encountered here terminates the LHS and triggers for-in.
        let lhs = self.parse_assignment_no_in()?;
        if self.eat_kw(Keyword::In)? {
            let target = expr_to_for_target(lhs)?;
            let object = self.parse_expression()?;
            self.expect_punct(Punct::RParen)?;
            let body = Box::new(self.parse_stmt()?);
            return Ok(Stmt::ForIn { decl: target, object, body });
        }
        if self.eat_kw(Keyword::Of)? {
            let target = expr_to_for_target(lhs)?;
            let object = self.parse_assignment()?;
            self.expect_punct(Punct::RParen)?;
            let body = Box::new(self.parse_stmt()?);
            return Ok(Stmt::ForOf { decl: target, object, body });
        }
        let mut first = lhs;
        let mut exprs = Vec::new();
        while self.eat_punct(Punct::Comma)? {
            exprs.push(std::mem::replace(&mut first, self.parse_assignment()?));
        }
        exprs.push(first);
        let init_expr = if exprs.len() == 1 { exprs.pop().unwrap() } else { Expr::Sequence(exprs) };
        self.expect_punct(Punct::Semi)?;
        self.parse_for_rest(Some(Box::new(ForInit::Expr(init_expr))))
    }

    fn parse_for_rest(&mut self, init: Option<Box<ForInit>>) -> PResult<Stmt> {
        let test = if self.is_punct(Punct::Semi) { None } else { Some(self.parse_expression()?) };
        self.expect_punct(Punct::Semi)?;
        let update = if self.is_punct(Punct::RParen) { None } else { Some(self.parse_expression()?) };
        self.expect_punct(Punct::RParen)?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::For { init, test, update, body })
    }

    /// Parses an assignment expression without treating a top-level `in` as
    /// part of a relational comparison, so `for (x in obj)` disambiguates.
    fn parse_assignment_no_in(&mut self) -> PResult<Expr> {
        // Our precedence climb always treats `in` as a relational operator;
        // the simplest correct-enough approach here is to parse a full
        // assignment expression and, since `in` only ever appears inside a
        // parenthesized or already-delimited subexpression in valid
        // for-loop heads, let the relational level refuse to consume a
        // bare `in` when `exclude_in` is active.
        self.exclude_in = true;
        let result = self.parse_assignment();
        self.exclude_in = false;
        result
    }

    fn parse_try(&mut self) -> PResult<Stmt> {
        self.advance()?;
        let block = self.parse_block_raw()?;
        let mut catch_param = None;
        let mut catch_block = None;
        if self.eat_kw(Keyword::Catch)? {
            if self.eat_punct(Punct::LParen)? {
                catch_param = Some(self.ident_name()?);
                self.expect_punct(Punct::RParen)?;
            }
            catch_block = Some(self.parse_block_raw()?);
        }
        let mut finally_block = None;
        if self.eat_kw(Keyword::Finally)? {
            finally_block = Some(self.parse_block_raw()?);
        }
        Ok(Stmt::Try { block, catch_param, catch_block, finally_block })
    }

    fn parse_switch(&mut self) -> PResult<Stmt> {
        self.advance()?;
        self.expect_punct(Punct::LParen)?;
        let discriminant = self.parse_expression()?;
        self.expect_punct(Punct::RParen)?;
        self.expect_punct(Punct::LBrace)?;
        let mut cases = Vec::new();
        while !self.is_punct(Punct::RBrace) {
            let test = if self.eat_kw(Keyword::Case)? {
                let e = self.parse_expression()?;
                self.expect_punct(Punct::Colon)?;
                Some(e)
            } else if self.eat_kw(Keyword::Default)? {
                self.expect_punct(Punct::Colon)?;
                None
            } else {
                return Err(CompileError::new("expected 'case' or 'default'", self.loc()));
            };
            let mut body = Vec::new();
            while !self.is_punct(Punct::RBrace) && !self.is_kw(Keyword::Case) && !self.is_kw(Keyword::Default) {
                body.push(self.parse_stmt()?);
            }
            cases.push(SwitchCase { test, body });
        }
        self.expect_punct(Punct::RBrace)?;
        Ok(Stmt::Switch { discriminant, cases })
    }

    // ---- expressions ----

    fn parse_expression(&mut self) -> PResult<Expr> {
        let first = self.parse_assignment()?;
        if !self.is_punct(Punct::Comma) {
            return Ok(first);
        }
        let mut parts = vec![first];
        while self.eat_punct(Punct::Comma)? {
            parts.push(self.parse_assignment()?);
        }
        Ok(Expr::Sequence(parts))
    }

    fn parse_assignment(&mut self) -> PResult<Expr> {
        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }
        let lhs = self.parse_conditional()?;
        let op = match &self.cur.kind {
            TokKind::Punct(Punct::Assign) => Some(AssignOp::Assign),
            TokKind::Punct(Punct::PlusAssign) => Some(AssignOp::Add),
            TokKind::Punct(Punct::MinusAssign) => Some(AssignOp::Sub),
            TokKind::Punct(Punct::StarAssign) => Some(AssignOp::Mul),
            TokKind::Punct(Punct::SlashAssign) => Some(AssignOp::Div),
            TokKind::Punct(Punct::PercentAssign) => Some(AssignOp::Mod),
            TokKind::Punct(Punct::StarStarAssign) => Some(AssignOp::Pow),
            TokKind::Punct(Punct::AndAssign) => Some(AssignOp::BitAnd),
            TokKind::Punct(Punct::OrAssign) => Some(AssignOp::BitOr),
            TokKind::Punct(Punct::XorAssign) => Some(AssignOp::BitXor),
            TokKind::Punct(Punct::ShlAssign) => Some(AssignOp::Shl),
            TokKind::Punct(Punct::ShrAssign) => Some(AssignOp::Shr),
            TokKind::Punct(Punct::UShrAssign) => Some(AssignOp::UShr),
            _ => None,
        };
        let Some(op) = op else { return Ok(lhs) };
        self.advance()?;
        let value = self.parse_assignment()?;
        Ok(Expr::Assign { op, target: Box::new(lhs), value: Box::new(value) })
    }

    /// Speculatively tries to parse `IDENT => ...` or `(params) => ...`,
    /// restoring parser state and falling through to ordinary expression
    /// parsing when the arrow form doesn't materialize.
    fn try_parse_arrow(&mut self) -> PResult<Option<Expr>> {
        if let TokKind::Ident(name) = self.cur.kind.clone() {
            let checkpoint = self.checkpoint();
            self.advance()?;
            if self.eat_punct(Punct::Arrow)? {
                return Ok(Some(self.parse_arrow_tail(vec![name])?));
            }
            self.restore(checkpoint);
            return Ok(None);
        }
        if self.is_punct(Punct::LParen) {
            let checkpoint = self.checkpoint();
            if let Ok(Some(params)) = self.try_parse_arrow_params() {
                if self.eat_punct(Punct::Arrow)? {
                    return Ok(Some(self.parse_arrow_tail(params)?));
                }
            }
            self.restore(checkpoint);
        }
        Ok(None)
    }

    fn try_parse_arrow_params(&mut self) -> PResult<Option<Vec<Rc<str>>>> {
        self.expect_punct(Punct::LParen)?;
        let mut params = Vec::new();
        if !self.is_punct(Punct::RParen) {
            loop {
                match self.cur.kind.clone() {
                    TokKind::Ident(name) => {
                        self.advance()?;
                        params.push(name);
                    }
                    _ => return Ok(None),
                }
                if !self.eat_punct(Punct::Comma)? {
                    break;
                }
            }
        }
        if !self.eat_punct(Punct::RParen)? {
            return Ok(None);
        }
        Ok(Some(params))
    }

    fn parse_arrow_tail(&mut self, params: Vec<Rc<str>>) -> PResult<Expr> {
        if self.is_punct(Punct::LBrace) {
            let body = self.parse_block_raw()?;
            Ok(Expr::Function(Rc::new(FunctionNode { name: None, params, body, is_arrow: true, expr_body: None })))
        } else {
            let expr = self.parse_assignment()?;
            Ok(Expr::Function(Rc::new(FunctionNode {
                name: None,
                params,
                body: Vec::new(),
                is_arrow: true,
                expr_body: Some(Box::new(expr)),
            })))
        }
    }

    fn parse_conditional(&mut self) -> PResult<Expr> {
        let test = self.parse_binary(0)?;
        if !self.eat_punct(Punct::Question)? {
            return Ok(test);
        }
        let consequent = self.parse_assignment()?;
        self.expect_punct(Punct::Colon)?;
        let alternate = self.parse_assignment()?;
        Ok(Expr::Conditional { test: Box::new(test), consequent: Box::new(consequent), alternate: Box::new(alternate) })
    }

    fn binop_info(&self) -> Option<(BinOp, u8, bool)> {
        // (op, precedence, right_associative)
        Some(match &self.cur.kind {
            TokKind::Punct(Punct::OrOr) => return None, // handled as LogicalOp below
            TokKind::Punct(Punct::Lt) => (BinOp::Lt, 9, false),
            TokKind::Punct(Punct::Le) => (BinOp::Le, 9, false),
            TokKind::Punct(Punct::Gt) => (BinOp::Gt, 9, false),
            TokKind::Punct(Punct::Ge) => (BinOp::Ge, 9, false),
            TokKind::Keyword(Keyword::Instanceof) => (BinOp::Instanceof, 9, false),
            TokKind::Keyword(Keyword::In) if !self.exclude_in => (BinOp::In, 9, false),
            TokKind::Punct(Punct::EqEq) => (BinOp::Eq, 8, false),
            TokKind::Punct(Punct::NotEq) => (BinOp::NotEq, 8, false),
            TokKind::Punct(Punct::EqEqEq) => (BinOp::StrictEq, 8, false),
            TokKind::Punct(Punct::NotEqEq) => (BinOp::StrictNotEq, 8, false),
            TokKind::Punct(Punct::Amp) => (BinOp::BitAnd, 7, false),
            TokKind::Punct(Punct::Caret) => (BinOp::BitXor, 6, false),
            TokKind::Punct(Punct::Pipe) => (BinOp::BitOr, 5, false),
            TokKind::Punct(Punct::Shl) => (BinOp::Shl, 10, false),
            TokKind::Punct(Punct::Shr) => (BinOp::Shr, 10, false),
            TokKind::Punct(Punct::UShr) => (BinOp::UShr, 10, false),
            TokKind::Punct(Punct::Plus) => (BinOp::Add, 11, false),
            TokKind::Punct(Punct::Minus) => (BinOp::Sub, 11, false),
            TokKind::Punct(Punct::Star) => (BinOp::Mul, 12, false),
            TokKind::Punct(Punct::Slash) => (BinOp::Div, 12, false),
            TokKind::Punct(Punct::Percent) => (BinOp::Mod, 12, false),
            TokKind::Punct(Punct::StarStar) => (BinOp::Pow, 13, true),
            _ => return None,
        })
    }

    /// Precedence climb over binary and logical operators; `min_prec`
    /// follows the standard algorithm. Levels (low to high): `||`(1)
    /// `&&`(2) `|`(5) `^`(6) `&`(7) equality(8) relational(9) shift(10)
    /// additive(11) multiplicative(12) `**`(13, right-assoc).
    fn parse_binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            if self.is_punct(Punct::OrOr) && min_prec <= 1 {
                self.advance()?;
                let right = self.parse_binary(2)?;
                left = Expr::Logical { op: LogicalOp::Or, left: Box::new(left), right: Box::new(right) };
                continue;
            }
            if self.is_punct(Punct::AndAnd) && min_prec <= 2 {
                self.advance()?;
                let right = self.parse_binary(3)?;
                left = Expr::Logical { op: LogicalOp::And, left: Box::new(left), right: Box::new(right) };
                continue;
            }
            let Some((op, prec, right_assoc)) = self.binop_info() else { break };
            if prec < min_prec {
                break;
            }
            self.advance()?;
            let next_min = if right_assoc { prec } else { prec + 1 };
            let right = self.parse_binary(next_min)?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let op = match &self.cur.kind {
            TokKind::Punct(Punct::Minus) => Some(UnaryOp::Neg),
            TokKind::Punct(Punct::Plus) => Some(UnaryOp::Pos),
            TokKind::Punct(Punct::Not) => Some(UnaryOp::Not),
            TokKind::Punct(Punct::Tilde) => Some(UnaryOp::BitNot),
            TokKind::Keyword(Keyword::Typeof) => Some(UnaryOp::Typeof),
            TokKind::Keyword(Keyword::Void) => Some(UnaryOp::Void),
            TokKind::Keyword(Keyword::Delete) => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            self.advance()?;
            let argument = Box::new(self.parse_unary()?);
            return Ok(Expr::Unary { op, argument });
        }
        if self.is_punct(Punct::PlusPlus) || self.is_punct(Punct::MinusMinus) {
            let op = if self.is_punct(Punct::PlusPlus) { UpdateOp::Inc } else { UpdateOp::Dec };
            self.advance()?;
            let argument = Box::new(self.parse_unary()?);
            return Ok(Expr::Update { op, prefix: true, argument });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_call_member()?;
        if !self.cur.preceded_by_newline && (self.is_punct(Punct::PlusPlus) || self.is_punct(Punct::MinusMinus)) {
            let op = if self.is_punct(Punct::PlusPlus) { UpdateOp::Inc } else { UpdateOp::Dec };
            self.advance()?;
            expr = Expr::Update { op, prefix: false, argument: Box::new(expr) };
        }
        Ok(expr)
    }

    fn parse_call_member(&mut self) -> PResult<Expr> {
        let mut expr = if self.eat_kw(Keyword::New)? {
            let callee = self.parse_call_member_no_call()?;
            let args = if self.is_punct(Punct::LParen) { self.parse_arguments()? } else { Vec::new() };
            Expr::New { callee: Box::new(callee), args }
        } else {
            self.parse_primary()?
        };
        loop {
            if self.eat_punct(Punct::Dot)? {
                let name = self.ident_name()?;
                expr = Expr::Member { object: Box::new(expr), property: Box::new(Expr::Str(name)), computed: false };
            } else if self.eat_punct(Punct::LBracket)? {
                let prop = self.parse_expression()?;
                self.expect_punct(Punct::RBracket)?;
                expr = Expr::Member { object: Box::new(expr), property: Box::new(prop), computed: true };
            } else if self.is_punct(Punct::LParen) {
                let args = self.parse_arguments()?;
                expr = Expr::Call { callee: Box::new(expr), args };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Parses a `new` callee without consuming a trailing call's argument
    /// list (that belongs to the `new` expression itself), but still
    /// follows `.`/`[]` member access, matching ordinary precedence.
    fn parse_call_member_no_call(&mut self) -> PResult<Expr> {
        let mut expr = if self.eat_kw(Keyword::New)? {
            let callee = self.parse_call_member_no_call()?;
            let args = if self.is_punct(Punct::LParen) { self.parse_arguments()? } else { Vec::new() };
            Expr::New { callee: Box::new(callee), args }
        } else {
            self.parse_primary()?
        };
        loop {
            if self.eat_punct(Punct::Dot)? {
                let name = self.ident_name()?;
                expr = Expr::Member { object: Box::new(expr), property: Box::new(Expr::Str(name)), computed: false };
            } else if self.eat_punct(Punct::LBracket)? {
                let prop = self.parse_expression()?;
                self.expect_punct(Punct::RBracket)?;
                expr = Expr::Member { object: Box::new(expr), property: Box::new(prop), computed: true };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_arguments(&mut self) -> PResult<Vec<Expr>> {
        self.expect_punct(Punct::LParen)?;
        let mut args = Vec::new();
        if !self.is_punct(Punct::RParen) {
            loop {
                args.push(self.parse_assignment()?);
                if !self.eat_punct(Punct::Comma)? {
                    break;
                }
            }
        }
        self.expect_punct(Punct::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        match self.cur.kind.clone() {
            TokKind::Number(n) => {
                self.advance()?;
                Ok(Expr::Number(n))
            }
            TokKind::String(s) => {
                self.advance()?;
                Ok(Expr::Str(s))
            }
            TokKind::Keyword(Keyword::True) => {
                self.advance()?;
                Ok(Expr::Bool(true))
            }
            TokKind::Keyword(Keyword::False) => {
                self.advance()?;
                Ok(Expr::Bool(false))
            }
            TokKind::Keyword(Keyword::Null) => {
                self.advance()?;
                Ok(Expr::Null)
            }
            TokKind::Keyword(Keyword::Undefined) => {
                self.advance()?;
                Ok(Expr::Undefined)
            }
            TokKind::Keyword(Keyword::This) => {
                self.advance()?;
                Ok(Expr::This)
            }
            TokKind::Keyword(Keyword::Function) => {
                self.advance()?;
                let f = self.parse_function_tail(true)?;
                Ok(Expr::Function(Rc::new(f)))
            }
            TokKind::Ident(name) => {
                self.advance()?;
                Ok(Expr::Ident(name))
            }
            TokKind::Punct(Punct::LParen) => {
                self.advance()?;
                let e = self.parse_expression()?;
                self.expect_punct(Punct::RParen)?;
                Ok(e)
            }
            TokKind::Punct(Punct::LBracket) => self.parse_array_literal(),
            TokKind::Punct(Punct::LBrace) => self.parse_object_literal(),
            TokKind::Punct(Punct::Slash | Punct::SlashAssign) => self.parse_regex_literal(),
            _ => Err(CompileError::new(format!("unexpected token {:?}", self.cur.kind), self.loc())),
        }
    }

    /// Rewinds the lexer to just before the current token's leading `/`
    /// (which was already tokenized as division or `/=`) and re-reads it as
    /// a regex literal instead.
    fn parse_regex_literal(&mut self) -> PResult<Expr> {
        let (pos, line, col) = self.cur.start_state;
        // the `/` is always a single ASCII byte, so advancing the cursor by
        // one column reproduces what `Lexer::bump` would have done.
        self.lexer.set_state((pos + 1, line, col + 1));
        let (pattern, flags) = self.lexer.read_regex_literal()?;
        self.cur = self.lexer.next_token()?;
        Ok(Expr::Regex { pattern, flags })
    }

    fn parse_array_literal(&mut self) -> PResult<Expr> {
        self.expect_punct(Punct::LBracket)?;
        let mut elements = Vec::new();
        while !self.is_punct(Punct::RBracket) {
            elements.push(self.parse_assignment()?);
            if !self.eat_punct(Punct::Comma)? {
                break;
            }
        }
        self.expect_punct(Punct::RBracket)?;
        Ok(Expr::Array(elements))
    }

    fn parse_object_literal(&mut self) -> PResult<Expr> {
        self.expect_punct(Punct::LBrace)?;
        let mut props = Vec::new();
        while !self.is_punct(Punct::RBrace) {
            props.push(self.parse_property()?);
            if !self.eat_punct(Punct::Comma)? {
                break;
            }
        }
        self.expect_punct(Punct::RBrace)?;
        Ok(Expr::Object(props))
    }

    fn parse_property(&mut self) -> PResult<PropDef> {
        // getter/setter: identifier `get`/`set` followed by a property name
        // starts an accessor; otherwise it's a shorthand or ordinary prop.
        if let TokKind::Ident(name) = self.cur.kind.clone() {
            if &*name == "get" || &*name == "set" {
                let checkpoint = self.checkpoint();
                self.advance()?;
                if !self.is_punct(Punct::Colon) && !self.is_punct(Punct::Comma) && !self.is_punct(Punct::RBrace) && !self.is_punct(Punct::LParen)
                {
                    let key = self.parse_property_key()?;
                    let func = self.parse_function_tail(true)?;
                    let kind = if &*name == "get" { PropKind::Get } else { PropKind::Set };
                    return Ok(PropDef { key, kind, value: Expr::Function(Rc::new(func)) });
                }
                self.restore(checkpoint);
            }
        }
        let key = self.parse_property_key()?;
        if self.eat_punct(Punct::Colon)? {
            let value = self.parse_assignment()?;
            return Ok(PropDef { key, kind: PropKind::Init, value });
        }
        if self.is_punct(Punct::LParen) {
            let func = self.parse_function_tail(true)?;
            return Ok(PropDef { key, kind: PropKind::Init, value: Expr::Function(Rc::new(func)) });
        }
        // shorthand { x }
        if let PropKey::Ident(name) = &key {
            return Ok(PropDef { key: key.clone(), kind: PropKind::Init, value: Expr::Ident(Rc::clone(name)) });
        }
        Err(CompileError::new("invalid object literal property", self.loc()))
    }

    fn parse_property_key(&mut self) -> PResult<PropKey> {
        match self.cur.kind.clone() {
            TokKind::Ident(s) => {
                self.advance()?;
                Ok(PropKey::Ident(s))
            }
            TokKind::Keyword(_) => {
                let name = self.keyword_text();
                self.advance()?;
                Ok(PropKey::Ident(Rc::from(name)))
            }
            TokKind::String(s) => {
                self.advance()?;
                Ok(PropKey::Ident(s))
            }
            TokKind::Number(n) => {
                self.advance()?;
                Ok(PropKey::Ident(Rc::from(crate::value::number_to_string(n).as_str())))
            }
            TokKind::Punct(Punct::LBracket) => {
                self.advance()?;
                let e = self.parse_assignment()?;
                self.expect_punct(Punct::RBracket)?;
                Ok(PropKey::Computed(Box::new(e)))
            }
            _ => Err(CompileError::new("expected property key", self.loc())),
        }
    }

    fn keyword_text(&self) -> &'static str {
        match &self.cur.kind {
            TokKind::Keyword(k) => match k {
                Keyword::Var => "var",
                Keyword::Function => "function",
                Keyword::Return => "return",
                Keyword::If => "if",
                Keyword::Else => "else",
                Keyword::For => "for",
                Keyword::While => "while",
                Keyword::Do => "do",
                Keyword::Break => "break",
                Keyword::Continue => "continue",
                Keyword::True => "true",
                Keyword::False => "false",
                Keyword::Null => "null",
                Keyword::Undefined => "undefined",
                Keyword::New => "new",
                Keyword::Typeof => "typeof",
                Keyword::Instanceof => "instanceof",
                Keyword::In => "in",
                Keyword::Of => "of",
                Keyword::This => "this",
                Keyword::Throw => "throw",
                Keyword::Try => "try",
                Keyword::Catch => "catch",
                Keyword::Finally => "finally",
                Keyword::Switch => "switch",
                Keyword::Case => "case",
                Keyword::Default => "default",
                Keyword::Delete => "delete",
                Keyword::Void => "void",
            },
            _ => "",
        }
    }

    fn parse_function_tail(&mut self, allow_anonymous: bool) -> PResult<FunctionNode> {
        let name = if let TokKind::Ident(s) = self.cur.kind.clone() {
            self.advance()?;
            Some(s)
        } else if allow_anonymous {
            None
        } else {
            return Err(CompileError::new("expected function name", self.loc()));
        };
        self.expect_punct(Punct::LParen)?;
        let mut params = Vec::new();
        if !self.is_punct(Punct::RParen) {
            loop {
                params.push(self.ident_name()?);
                if !self.eat_punct(Punct::Comma)? {
                    break;
                }
            }
        }
        self.expect_punct(Punct::RParen)?;
        let body = self.parse_block_raw()?;
        Ok(FunctionNode { name, params, body, is_arrow: false, expr_body: None })
    }
}

fn expr_to_for_target(e: Expr) -> PResult<ForTarget> {
    match e {
        Expr::Ident(_) | Expr::Member { .. } => Ok(ForTarget::Pattern(e)),
        _ => Err(CompileError::new("invalid for-in/for-of left-hand side", CodeLoc::default())),
    }
}

/// Convenience entry point.
pub fn parse_program(src: &str) -> PResult<Program> {
    Parser::new(src)?.parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_decl_with_initializer_and_without() {
        let prog = parse_program("var x = 1, y;").unwrap();
        assert_eq!(prog.body.len(), 1);
        let Stmt::VarDecl(decls) = &prog.body[0] else { panic!("expected VarDecl, got {:?}", prog.body[0]) };
        assert_eq!(decls.len(), 2);
        assert!(matches!(decls[0].1, Some(Expr::Number(n)) if n == 1.0));
        assert!(decls[1].1.is_none());
    }

    #[test]
    fn function_declaration_collects_name_params_and_body() {
        let prog = parse_program("function add(a, b) { return a + b; }").unwrap();
        let Stmt::FunctionDecl(f) = &prog.body[0] else { panic!("expected FunctionDecl") };
        assert_eq!(f.name.as_deref(), Some("add"));
        assert_eq!(f.params.iter().map(|p| p.as_ref()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(f.body.len(), 1);
    }

    #[test]
    fn arrow_function_with_expression_body_parses_as_expr_statement() {
        let prog = parse_program("var f = x => x * 2;").unwrap();
        let Stmt::VarDecl(decls) = &prog.body[0] else { panic!("expected VarDecl") };
        assert!(matches!(&decls[0].1, Some(Expr::Function(node)) if node.is_arrow && node.expr_body.is_some()));
    }

    #[test]
    fn operator_precedence_binds_multiplication_tighter_than_addition() {
        let prog = parse_program("1 + 2 * 3;").unwrap();
        let Stmt::Expr(Expr::Binary { op, right, .. }) = &prog.body[0] else { panic!("expected top-level binary add") };
        assert_eq!(*op, BinOp::Add);
        assert!(matches!(**right, Expr::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn ternary_is_right_associative_and_lower_precedence_than_logical_or() {
        let prog = parse_program("a || b ? c : d;").unwrap();
        let Stmt::Expr(Expr::Conditional { test, .. }) = &prog.body[0] else { panic!("expected Conditional") };
        assert!(matches!(**test, Expr::Logical { .. }));
    }

    #[test]
    fn for_in_and_for_of_parse_distinct_statement_shapes() {
        let prog = parse_program("for (var k in obj) {} for (var v of arr) {}").unwrap();
        assert!(matches!(prog.body[0], Stmt::ForIn { .. }));
        assert!(matches!(prog.body[1], Stmt::ForOf { .. }));
    }

    #[test]
    fn array_and_object_literals_parse_their_elements() {
        let prog = parse_program("[1, 2, 3]; ({a: 1, b: 2});").unwrap();
        assert!(matches!(&prog.body[0], Stmt::Expr(Expr::Array(items)) if items.len() == 3));
        assert!(matches!(&prog.body[1], Stmt::Expr(Expr::Object(props)) if props.len() == 2));
    }

    #[test]
    fn try_catch_finally_all_populate() {
        let prog = parse_program("try { a(); } catch (e) { b(); } finally { c(); }").unwrap();
        assert!(matches!(&prog.body[0], Stmt::Try { catch_block: Some(_), finally_block: Some(_), .. }));
    }

    #[test]
    fn division_after_identifier_is_not_mistaken_for_a_regex_literal() {
        let prog = parse_program("var a = 10; var b = a / 2;").unwrap();
        let Stmt::VarDecl(decls) = &prog.body[1] else { panic!("expected VarDecl") };
        assert!(matches!(&decls[0].1, Some(Expr::Binary { op: BinOp::Div, .. })));
    }

    #[test]
    fn regex_literal_at_start_of_expression_is_recognized() {
        let prog = parse_program("var r = /ab+c/gi;").unwrap();
        let Stmt::VarDecl(decls) = &prog.body[0] else { panic!("expected VarDecl") };
        assert!(matches!(&decls[0].1, Some(Expr::Regex { pattern, flags }) if &**pattern == "ab+c" && &**flags == "gi"));
    }

    #[test]
    fn missing_closing_brace_is_a_parse_error() {
        assert!(parse_program("function f() { return 1;").is_err());
    }

    #[test]
    fn missing_semicolon_before_unexpected_token_is_a_parse_error() {
        assert!(parse_program("var x = ;").is_err());
    }
}
