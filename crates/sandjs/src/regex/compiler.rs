//! AST → [`RegexOp`] compiler (§4.7), a near 1:1 structural adaptation of
//! `regex/compiler.py`'s `RegexCompiler`.
//!
//! `SplitFirst(target)` runs the fallthrough instruction (`pc + 1`) first,
//! pushing `target` as the backtrack alternative; `SplitNext(target)` runs
//! `target` first, pushing the fallthrough as the backtrack alternative.
//! Which one a construct uses depends only on whether its preferred branch
//! sits inline (fallthrough) or at a separate address (target) in the
//! emitted layout — see each `compile_*` method below.

use super::ast::{AnchorKind, Node, RegexError, ShorthandKind};
use super::op::RegexOp;

pub struct Compiled {
    pub program: Vec<RegexOp>,
    pub capture_count: u32,
    pub register_count: u32,
}

pub fn compile(ast: &Node, capture_count: u32, multiline: bool) -> Result<Compiled, RegexError> {
    let mut c = Compiler { program: Vec::new(), next_register: 0, multiline };
    c.emit(RegexOp::SaveStart(0));
    c.compile_node(ast)?;
    c.emit(RegexOp::SaveEnd(0));
    c.emit(RegexOp::Match);
    Ok(Compiled { program: c.program, capture_count, register_count: c.next_register })
}

struct Compiler {
    program: Vec<RegexOp>,
    next_register: u32,
    multiline: bool,
}

impl Compiler {
    fn emit(&mut self, op: RegexOp) -> usize {
        self.program.push(op);
        self.program.len() - 1
    }

    fn here(&self) -> usize {
        self.program.len()
    }

    fn allocate_register(&mut self) -> Result<u32, RegexError> {
        if self.next_register >= 255 {
            return Err(RegexError::new("Regular expression too complex (register limit exceeded)"));
        }
        let r = self.next_register;
        self.next_register += 1;
        Ok(r)
    }

    fn compile_node(&mut self, node: &Node) -> Result<(), RegexError> {
        match node {
            Node::Char(ch) => {
                self.emit(RegexOp::Char(*ch));
            }
            Node::Dot => {
                self.emit(RegexOp::Dot);
            }
            Node::CharClass { ranges, negated } => self.compile_char_class(ranges, *negated),
            Node::Shorthand(kind) => self.compile_shorthand(*kind),
            Node::Anchor(kind) => {
                self.emit(match kind {
                    AnchorKind::Start if self.multiline => RegexOp::LineStartM,
                    AnchorKind::Start => RegexOp::LineStart,
                    AnchorKind::End if self.multiline => RegexOp::LineEndM,
                    AnchorKind::End => RegexOp::LineEnd,
                    AnchorKind::Boundary => RegexOp::WordBoundary,
                    AnchorKind::NotBoundary => RegexOp::NotWordBoundary,
                });
            }
            Node::Backref(n) => {
                self.emit(RegexOp::Backref(*n));
            }
            Node::Group { body, capturing, group_index } => {
                if *capturing {
                    self.emit(RegexOp::SaveStart(*group_index));
                    self.compile_node(body)?;
                    self.emit(RegexOp::SaveEnd(*group_index));
                } else {
                    self.compile_node(body)?;
                }
            }
            Node::Lookahead { body, positive } => self.compile_lookahead(body, *positive)?,
            Node::Lookbehind { body, positive } => self.compile_lookbehind(body, *positive)?,
            Node::Quantifier { body, min, max, greedy } => self.compile_quantifier(body, *min, *max, *greedy)?,
            Node::Alternative(items) => {
                for item in items {
                    self.compile_node(item)?;
                }
            }
            Node::Disjunction(alts) => self.compile_disjunction(alts)?,
        }
        Ok(())
    }

    fn compile_char_class(&mut self, ranges: &[(u32, u32)], negated: bool) {
        let expanded = normalize_ranges(ranges);
        self.emit(if negated { RegexOp::RangeNeg(expanded) } else { RegexOp::Range(expanded) });
    }

    fn compile_shorthand(&mut self, kind: ShorthandKind) {
        self.emit(match kind {
            ShorthandKind::Digit => RegexOp::Digit,
            ShorthandKind::NotDigit => RegexOp::NotDigit,
            ShorthandKind::Word => RegexOp::Word,
            ShorthandKind::NotWord => RegexOp::NotWord,
            ShorthandKind::Space => RegexOp::Space,
            ShorthandKind::NotSpace => RegexOp::NotSpace,
        });
    }

    /// The sub-program always starts at `idx + 1`: the VM's lookahead
    /// handler runs it as a bounded sub-match and resumes main execution
    /// right after the matching `LookaheadEnd`, so ordinary fallthrough
    /// never walks into it.
    fn compile_lookahead(&mut self, body: &Node, positive: bool) -> Result<(), RegexError> {
        let idx = self.emit(RegexOp::Jump(0));
        let sub_start = self.here();
        self.compile_node(body)?;
        self.emit(RegexOp::LookaheadEnd);
        self.program[idx] = if positive { RegexOp::Lookahead(sub_start) } else { RegexOp::LookaheadNeg(sub_start) };
        Ok(())
    }

    fn compile_lookbehind(&mut self, body: &Node, positive: bool) -> Result<(), RegexError> {
        let idx = self.emit(RegexOp::Jump(0));
        let sub_start = self.here();
        self.compile_node(body)?;
        self.emit(RegexOp::LookbehindEnd);
        self.program[idx] = if positive { RegexOp::Lookbehind(sub_start) } else { RegexOp::LookbehindNeg(sub_start) };
        Ok(())
    }

    /// Left-to-right alternative priority: each non-last alternative is
    /// tried via fallthrough first (`SplitFirst`), with the next
    /// alternative as its backtrack target.
    fn compile_disjunction(&mut self, alts: &[Node]) -> Result<(), RegexError> {
        let mut end_jumps = Vec::new();
        for (i, alt) in alts.iter().enumerate() {
            if i == alts.len() - 1 {
                self.compile_node(alt)?;
                continue;
            }
            let split_idx = self.emit(RegexOp::SplitFirst(0));
            self.compile_node(alt)?;
            end_jumps.push(self.emit(RegexOp::Jump(0)));
            let next_alt_start = self.here();
            self.program[split_idx] = RegexOp::SplitFirst(next_alt_start);
        }
        let end = self.here();
        for idx in end_jumps {
            self.program[idx] = RegexOp::Jump(end);
        }
        Ok(())
    }

    fn needs_advance_check(body: &Node) -> bool {
        match body {
            Node::Char(_) | Node::Dot | Node::CharClass { .. } | Node::Shorthand(_) | Node::Backref(_) => false,
            Node::Anchor(_) => true,
            Node::Group { body, .. } => Self::needs_advance_check(body),
            Node::Lookahead { .. } | Node::Lookbehind { .. } => true,
            Node::Quantifier { body, min, .. } => *min == 0 || Self::needs_advance_check(body),
            Node::Alternative(items) => items.iter().all(Self::needs_advance_check),
            Node::Disjunction(alts) => alts.iter().any(Self::needs_advance_check),
        }
    }

    fn compile_quantifier(&mut self, body: &Node, min: u32, max: Option<u32>, greedy: bool) -> Result<(), RegexError> {
        match (min, max) {
            (0, Some(1)) => self.compile_optional(body, greedy),
            (0, None) => self.compile_star(body, greedy),
            (1, None) => self.compile_plus(body, greedy),
            (n, None) => self.compile_at_least(body, n, greedy),
            (n, Some(m)) => self.compile_range(body, n, m, greedy),
        }
    }

    /// `body?`: greedy tries the inline body first (`SplitFirst`, skip as
    /// backtrack target); lazy tries the skip first (`SplitNext`, body as
    /// backtrack target). Both use the same layout, differing only in
    /// opcode choice.
    fn compile_optional(&mut self, body: &Node, greedy: bool) -> Result<(), RegexError> {
        let split_idx = self.emit(if greedy { RegexOp::SplitFirst(0) } else { RegexOp::SplitNext(0) });
        self.compile_node(body)?;
        let end = self.here();
        self.program[split_idx] = if greedy { RegexOp::SplitFirst(end) } else { RegexOp::SplitNext(end) };
        Ok(())
    }

    /// `body*`, with `SetPos`/`CheckAdvance` register guarding against an
    /// infinite loop when `body` can match the empty string.
    fn compile_star(&mut self, body: &Node, greedy: bool) -> Result<(), RegexError> {
        let reg = if Self::needs_advance_check(body) { Some(self.allocate_register()?) } else { None };
        let loop_start = self.here();
        let split_idx = self.emit(if greedy { RegexOp::SplitFirst(0) } else { RegexOp::SplitNext(0) });
        if let Some(r) = reg {
            self.emit(RegexOp::SetPos(r));
        }
        self.compile_node(body)?;
        if let Some(r) = reg {
            self.emit(RegexOp::CheckAdvance(r));
        }
        self.emit(RegexOp::Jump(loop_start));
        let end = self.here();
        self.program[split_idx] = if greedy { RegexOp::SplitFirst(end) } else { RegexOp::SplitNext(end) };
        Ok(())
    }

    /// `body+`: one mandatory match, then a backward split deciding whether
    /// to repeat. The repeat target sits behind the split, so greedy (which
    /// prefers repeating) needs `SplitNext` here — the opposite choice from
    /// `compile_star`, where the preferred branch is the one in front.
    fn compile_plus(&mut self, body: &Node, greedy: bool) -> Result<(), RegexError> {
        let reg = if Self::needs_advance_check(body) { Some(self.allocate_register()?) } else { None };
        let body_start = self.here();
        if let Some(r) = reg {
            self.emit(RegexOp::SetPos(r));
        }
        self.compile_node(body)?;
        if let Some(r) = reg {
            self.emit(RegexOp::CheckAdvance(r));
        }
        self.emit(if greedy { RegexOp::SplitNext(body_start) } else { RegexOp::SplitFirst(body_start) });
        Ok(())
    }

    fn compile_at_least(&mut self, body: &Node, n: u32, greedy: bool) -> Result<(), RegexError> {
        for _ in 0..n {
            self.compile_node(body)?;
        }
        self.compile_star(body, greedy)
    }

    /// `body{n,m}`: `n` mandatory copies followed by `m - n` independently
    /// optional copies; greedy's per-copy preference to enter naturally
    /// cascades into preferring the maximal count.
    fn compile_range(&mut self, body: &Node, min: u32, max: u32, greedy: bool) -> Result<(), RegexError> {
        for _ in 0..min {
            self.compile_node(body)?;
        }
        for _ in 0..(max - min) {
            self.compile_optional(body, greedy)?;
        }
        Ok(())
    }
}

/// Sorts and merges overlapping/adjacent ranges so the execution engine can
/// binary-search them.
fn normalize_ranges(ranges: &[(u32, u32)]) -> Vec<(u32, u32)> {
    let mut sorted: Vec<(u32, u32)> = ranges.to_vec();
    sorted.sort_unstable();
    let mut merged: Vec<(u32, u32)> = Vec::with_capacity(sorted.len());
    for (start, end) in sorted {
        match merged.last_mut() {
            Some((_, last_end)) if start <= last_end.saturating_add(1) => {
                *last_end = (*last_end).max(end);
            }
            _ => merged.push((start, end)),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::op::RegexOp;
    use super::super::parser::parse;

    fn compile_pattern(pattern: &str, flags: &str) -> Compiled {
        let (ast, groups) = parse(pattern, flags).unwrap();
        compile(&ast, groups, flags.contains('m')).unwrap()
    }

    #[test]
    fn every_program_brackets_the_whole_match_with_save_slot_zero() {
        let c = compile_pattern("ab", "");
        assert!(matches!(c.program.first(), Some(RegexOp::SaveStart(0))));
        assert!(matches!(c.program[c.program.len() - 2], RegexOp::SaveEnd(0)));
        assert!(matches!(c.program.last(), Some(RegexOp::Match)));
    }

    #[test]
    fn capturing_group_wraps_its_body_in_matching_save_slots() {
        let c = compile_pattern("(a)", "");
        assert!(c.program.iter().any(|op| matches!(op, RegexOp::SaveStart(1))));
        assert!(c.program.iter().any(|op| matches!(op, RegexOp::SaveEnd(1))));
        assert_eq!(c.capture_count, 1);
    }

    #[test]
    fn anchors_pick_multiline_variants_only_when_the_m_flag_is_set() {
        let c = compile_pattern("^a$", "");
        assert!(c.program.iter().any(|op| matches!(op, RegexOp::LineStart)));
        assert!(c.program.iter().any(|op| matches!(op, RegexOp::LineEnd)));

        let c = compile_pattern("^a$", "m");
        assert!(c.program.iter().any(|op| matches!(op, RegexOp::LineStartM)));
        assert!(c.program.iter().any(|op| matches!(op, RegexOp::LineEndM)));
    }

    #[test]
    fn star_quantifier_on_a_possibly_empty_body_allocates_an_advance_guard_register() {
        let c = compile_pattern("(a*)*", "");
        assert!(c.program.iter().any(|op| matches!(op, RegexOp::SetPos(_))));
        assert!(c.program.iter().any(|op| matches!(op, RegexOp::CheckAdvance(_))));
        assert!(c.register_count >= 1);
    }

    #[test]
    fn single_char_plus_quantifier_needs_no_advance_guard() {
        let c = compile_pattern("a+", "");
        assert_eq!(c.register_count, 0);
        assert!(!c.program.iter().any(|op| matches!(op, RegexOp::SetPos(_))));
    }

    #[test]
    fn char_class_ranges_are_sorted_and_merged() {
        let c = compile_pattern("[a-cb-d]", "");
        let Some(RegexOp::Range(ranges)) = c.program.iter().find(|op| matches!(op, RegexOp::Range(_))) else {
            panic!("expected a merged Range op")
        };
        assert_eq!(ranges, &vec![('a' as u32, 'd' as u32)]);
    }

    #[test]
    fn disjunction_compiles_to_a_split_chain_ending_at_a_shared_join_point() {
        let c = compile_pattern("a|b|c", "");
        let splits = c.program.iter().filter(|op| matches!(op, RegexOp::SplitFirst(_))).count();
        assert_eq!(splits, 2, "n-way alternation needs n-1 split points");
    }

    #[test]
    fn lookahead_compiles_to_a_bounded_sub_program_followed_by_lookahead_end() {
        let c = compile_pattern("(?=a)", "");
        assert!(c.program.iter().any(|op| matches!(op, RegexOp::Lookahead(_))));
        assert!(c.program.iter().any(|op| matches!(op, RegexOp::LookaheadEnd)));
    }
}
