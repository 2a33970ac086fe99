//! Backtracking executor and guest-visible regex object (§4.7, §4.8, §7),
//! ported from `regex/vm.py`'s `RegexVM`/`MatchResult`.
//!
//! Operates on a `Vec<char>` (Unicode scalar value) snapshot of the subject
//! string rather than its UTF-16 or UTF-8 form. `lastIndex` is guest-visible
//! as a UTF-16 code unit count (per the dialect's string semantics); when the
//! `u` flag is set the boundary conversion in [`RegExpData::exec`] maps it to
//! and from a code point offset before/after touching the engine.

use std::rc::Rc;

use super::ast::RegexError;
use super::compiler;
use super::op::RegexOp;
use super::parser;
use crate::resource::{ResourceError, ResourceTracker};

const DEFAULT_STEP_LIMIT: usize = 100_000;
const DEFAULT_POLL_INTERVAL: usize = 100;

#[derive(Debug, Clone)]
pub struct RegexMatch {
    pub start: usize,
    pub end: usize,
    /// Index 0 is always `Some((start, end))`; indices `1..=capture_count`
    /// hold each capturing group, in code-point offsets.
    pub captures: Vec<Option<(usize, usize)>>,
}

/// A compiled, guest-visible `RegExp` (§4.8). `source`/`flags` are kept as
/// given; `last_index` is the mutable guest-settable cursor used by the
/// `g`/`y` exec loop.
pub struct RegExpData {
    pub source: Rc<str>,
    pub flags: Rc<str>,
    pub capture_count: u32,
    pub last_index: u32,
    pub global: bool,
    pub ignore_case: bool,
    pub multiline: bool,
    pub dot_all: bool,
    pub unicode: bool,
    pub sticky: bool,
    program: Rc<[RegexOp]>,
    register_count: u32,
}

impl RegExpData {
    pub fn compile(pattern: Rc<str>, flags: Rc<str>) -> Result<Self, RegexError> {
        for ch in flags.chars() {
            if !"gimsuy".contains(ch) {
                return Err(RegexError::new(format!("Invalid regular expression flag '{ch}'")));
            }
        }
        let global = flags.contains('g');
        let ignore_case = flags.contains('i');
        let multiline = flags.contains('m');
        let dot_all = flags.contains('s');
        let unicode = flags.contains('u');
        let sticky = flags.contains('y');

        let (ast, capture_count) = parser::parse(&pattern, &flags)?;
        let compiled = compiler::compile(&ast, capture_count, multiline)?;

        Ok(Self {
            source: pattern,
            flags,
            capture_count: compiled.capture_count,
            last_index: 0,
            global,
            ignore_case,
            multiline,
            dot_all,
            unicode,
            sticky,
            program: Rc::from(compiled.program),
            register_count: compiled.register_count,
        })
    }

    /// `RegExp.prototype.test` (§4.8): like `exec` but reports only success,
    /// still advancing `last_index` for `g`/`y` patterns.
    pub fn test(&mut self, input: &str, tracker: &mut dyn ResourceTracker) -> Result<bool, ResourceError> {
        Ok(self.exec(input, tracker)?.is_some())
    }

    /// `RegExp.prototype.exec` (§4.8). Honors `lastIndex` and the `g`/`y`
    /// flags the way the guest observes them: a non-global, non-sticky regex
    /// always searches from the start and never touches `last_index`.
    pub fn exec(&mut self, input: &str, tracker: &mut dyn ResourceTracker) -> Result<Option<RegexMatch>, ResourceError> {
        let chars: Vec<char> = input.chars().collect();
        let stateful = self.global || self.sticky;
        let start_units = if stateful { self.last_index } else { 0 };
        let Some(start) = self.units_to_codepoints(&chars, start_units) else {
            if stateful {
                self.last_index = 0;
            }
            return Ok(None);
        };

        let mut step_budget = 0usize;
        let result = if self.sticky {
            self.try_match_at(&chars, start, tracker, &mut step_budget)?
        } else {
            self.search_from(&chars, start, tracker, &mut step_budget)?
        };

        if stateful {
            match &result {
                Some(m) => self.last_index = self.codepoints_to_units(&chars, m.end.max(m.start + (m.start == m.end) as usize)),
                None => self.last_index = 0,
            }
        }
        Ok(result)
    }

    /// Extracts the matched substring and each capture group's substring
    /// from `input`, in guest-visible (UTF-16-boundary-correct only at the
    /// `lastIndex` property, not here — callers that need a JS string
    /// already operate on a `Vec<char>` snapshot) form.
    pub fn capture_strings(&self, input: &str, m: &RegexMatch) -> Vec<Option<String>> {
        let chars: Vec<char> = input.chars().collect();
        m.captures.iter().map(|c| c.map(|(s, e)| chars[s..e].iter().collect())).collect()
    }

    fn units_to_codepoints(&self, chars: &[char], units: u32) -> Option<usize> {
        if !self.unicode {
            return if (units as usize) <= chars.len() { Some(units as usize) } else { None };
        }
        let mut seen_units = 0u32;
        for (idx, ch) in chars.iter().enumerate() {
            if seen_units >= units {
                return Some(idx);
            }
            seen_units += ch.len_utf16() as u32;
        }
        if seen_units == units { Some(chars.len()) } else { None }
    }

    fn codepoints_to_units(&self, chars: &[char], codepoints: usize) -> u32 {
        if !self.unicode {
            return codepoints as u32;
        }
        chars[..codepoints.min(chars.len())].iter().map(|c| c.len_utf16() as u32).sum()
    }

    fn search_from(&self, chars: &[char], from: usize, tracker: &mut dyn ResourceTracker, step_budget: &mut usize) -> Result<Option<RegexMatch>, ResourceError> {
        for start in from..=chars.len() {
            if let Some(m) = self.try_match_at(chars, start, tracker, step_budget)? {
                return Ok(Some(m));
            }
        }
        Ok(None)
    }

    fn try_match_at(&self, chars: &[char], start: usize, tracker: &mut dyn ResourceTracker, step_budget: &mut usize) -> Result<Option<RegexMatch>, ResourceError> {
        let exec = Executor {
            program: &self.program,
            text: chars,
            ignore_case: self.ignore_case,
            dot_all: self.dot_all,
            step_limit: DEFAULT_STEP_LIMIT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        };
        let captures = vec![None; self.capture_count as usize + 1];
        let registers = vec![None; self.register_count as usize];
        match exec.run(0, start, captures, registers, Terminator::Match, tracker, step_budget)? {
            Some(RunOutcome { end_sp, captures, .. }) => {
                let mut captures = captures;
                captures[0] = Some((start, end_sp));
                Ok(Some(RegexMatch { start, end: end_sp, captures }))
            }
            None => Ok(None),
        }
    }
}

#[derive(Clone, Copy)]
enum Terminator {
    Match,
    LookaheadEnd,
    /// Lookbehind succeeds only when the sub-match's end position lands
    /// exactly on the anchor it was scanning backward from.
    LookbehindEnd(usize),
}

struct RunOutcome {
    end_sp: usize,
    captures: Vec<Option<(usize, usize)>>,
}

struct Executor<'a> {
    program: &'a [RegexOp],
    text: &'a [char],
    ignore_case: bool,
    dot_all: bool,
    step_limit: usize,
    poll_interval: usize,
}

type BacktrackEntry = (usize, usize, Vec<Option<(usize, usize)>>, Vec<Option<usize>>);

impl Executor<'_> {
    /// The single execution core for both top-level matching and bounded
    /// lookaround sub-matches: runs until `terminator` is reached (treated
    /// like success, subject to `Terminator::LookbehindEnd`'s position
    /// check) or the backtrack stack is exhausted (failure).
    #[allow(clippy::too_many_arguments)]
    fn run(
        &self,
        pc0: usize,
        sp0: usize,
        captures0: Vec<Option<(usize, usize)>>,
        registers0: Vec<Option<usize>>,
        terminator: Terminator,
        tracker: &mut dyn ResourceTracker,
        step_budget: &mut usize,
    ) -> Result<Option<RunOutcome>, ResourceError> {
        let mut pc = pc0;
        let mut sp = sp0;
        let mut captures = captures0;
        let mut registers = registers0;
        let mut stack: Vec<BacktrackEntry> = Vec::new();

        loop {
            *step_budget += 1;
            if *step_budget > self.step_limit {
                return Ok(None);
            }
            if *step_budget % self.poll_interval == 0 {
                tracker.check_time()?;
            }

            if self.at_terminator(pc, sp, terminator) {
                return Ok(Some(RunOutcome { end_sp: sp, captures }));
            }

            match self.step(pc, sp, &mut captures, &mut registers, &mut stack, tracker, step_budget)? {
                StepOutcome::Continue(next_pc, next_sp) => {
                    pc = next_pc;
                    sp = next_sp;
                }
                StepOutcome::Fail => match stack.pop() {
                    Some((p, s, c, r)) => {
                        pc = p;
                        sp = s;
                        captures = c;
                        registers = r;
                    }
                    None => return Ok(None),
                },
            }
        }
    }

    fn at_terminator(&self, pc: usize, sp: usize, terminator: Terminator) -> bool {
        match (terminator, &self.program[pc]) {
            (Terminator::Match, RegexOp::Match) => true,
            (Terminator::LookaheadEnd, RegexOp::LookaheadEnd) => true,
            (Terminator::LookbehindEnd(anchor), RegexOp::LookbehindEnd) => sp == anchor,
            _ => false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn step(
        &self,
        pc: usize,
        sp: usize,
        captures: &mut Vec<Option<(usize, usize)>>,
        registers: &mut [Option<usize>],
        stack: &mut Vec<BacktrackEntry>,
        tracker: &mut dyn ResourceTracker,
        step_budget: &mut usize,
    ) -> Result<StepOutcome, ResourceError> {
        use StepOutcome::{Continue, Fail};

        Ok(match &self.program[pc] {
            RegexOp::Char(expected) => match self.char_at(sp) {
                Some(c) if self.char_eq(c, *expected) => Continue(pc + 1, sp + 1),
                _ => Fail,
            },
            RegexOp::Dot => match self.char_at(sp) {
                Some(c) if self.dot_all || !is_line_terminator(c) => Continue(pc + 1, sp + 1),
                _ => Fail,
            },
            RegexOp::Range(ranges) => match self.char_at(sp) {
                Some(c) if self.in_ranges(c, ranges) => Continue(pc + 1, sp + 1),
                _ => Fail,
            },
            RegexOp::RangeNeg(ranges) => match self.char_at(sp) {
                Some(c) if !self.in_ranges(c, ranges) => Continue(pc + 1, sp + 1),
                _ => Fail,
            },
            RegexOp::Digit => self.class_step(pc, sp, char::is_ascii_digit),
            RegexOp::NotDigit => self.class_step(pc, sp, |c| !c.is_ascii_digit()),
            RegexOp::Word => self.class_step(pc, sp, is_word_char),
            RegexOp::NotWord => self.class_step(pc, sp, |c| !is_word_char(c)),
            RegexOp::Space => self.class_step(pc, sp, |c| c.is_whitespace()),
            RegexOp::NotSpace => self.class_step(pc, sp, |c| !c.is_whitespace()),
            RegexOp::LineStart => {
                if sp == 0 { Continue(pc + 1, sp) } else { Fail }
            }
            RegexOp::LineStartM => {
                if sp == 0 || self.char_at(sp - 1).is_some_and(is_line_terminator) { Continue(pc + 1, sp) } else { Fail }
            }
            RegexOp::LineEnd => {
                if sp == self.text.len() { Continue(pc + 1, sp) } else { Fail }
            }
            RegexOp::LineEndM => {
                if sp == self.text.len() || self.char_at(sp).is_some_and(is_line_terminator) { Continue(pc + 1, sp) } else { Fail }
            }
            RegexOp::WordBoundary => {
                if self.is_word_boundary(sp) { Continue(pc + 1, sp) } else { Fail }
            }
            RegexOp::NotWordBoundary => {
                if !self.is_word_boundary(sp) { Continue(pc + 1, sp) } else { Fail }
            }
            RegexOp::Jump(target) => Continue(*target, sp),
            RegexOp::SplitFirst(target) => {
                self.push_backtrack(stack, tracker, *target, sp, captures, registers)?;
                Continue(pc + 1, sp)
            }
            RegexOp::SplitNext(target) => {
                self.push_backtrack(stack, tracker, pc + 1, sp, captures, registers)?;
                Continue(*target, sp)
            }
            RegexOp::SaveStart(n) => {
                let idx = *n as usize;
                if idx < captures.len() {
                    let end = captures[idx].map_or(sp, |(_, e)| e);
                    captures[idx] = Some((sp, end));
                }
                Continue(pc + 1, sp)
            }
            RegexOp::SaveEnd(n) => {
                let idx = *n as usize;
                if idx < captures.len() {
                    let start = captures[idx].map_or(sp, |(s, _)| s);
                    captures[idx] = Some((start, sp));
                }
                Continue(pc + 1, sp)
            }
            RegexOp::Backref(n) => self.backref_step(pc, sp, *n, captures, false),
            RegexOp::BackrefI(n) => self.backref_step(pc, sp, *n, captures, true),
            RegexOp::Lookahead(sub_start) => self.lookaround_step(pc, sp, *sub_start, true, Terminator::LookaheadEnd, captures, registers, tracker, step_budget)?,
            RegexOp::LookaheadNeg(sub_start) => self.lookaround_step(pc, sp, *sub_start, false, Terminator::LookaheadEnd, captures, registers, tracker, step_budget)?,
            RegexOp::Lookbehind(sub_start) => self.lookbehind_step(pc, sp, *sub_start, true, captures, registers, tracker, step_budget)?,
            RegexOp::LookbehindNeg(sub_start) => self.lookbehind_step(pc, sp, *sub_start, false, captures, registers, tracker, step_budget)?,
            RegexOp::LookaheadEnd | RegexOp::LookbehindEnd => {
                // Only reachable here when executed as ordinary main-flow
                // instructions, which never happens: the lookaround
                // handlers above always resume main execution at `pc + 1`
                // of the originating instruction, never falling into the
                // sub-program.
                Fail
            }
            RegexOp::SetPos(reg) => {
                registers[*reg as usize] = Some(sp);
                Continue(pc + 1, sp)
            }
            RegexOp::CheckAdvance(reg) => {
                if registers[*reg as usize] == Some(sp) { Fail } else { Continue(pc + 1, sp) }
            }
            RegexOp::Match => Continue(pc, sp),
        })
    }

    fn class_step(&self, pc: usize, sp: usize, pred: impl Fn(&char) -> bool) -> StepOutcome {
        match self.char_at(sp) {
            Some(c) if pred(&c) => StepOutcome::Continue(pc + 1, sp + 1),
            _ => StepOutcome::Fail,
        }
    }

    fn backref_step(&self, pc: usize, sp: usize, group: u32, captures: &[Option<(usize, usize)>], ignore_case_override: bool) -> StepOutcome {
        let Some(Some((start, end))) = captures.get(group as usize) else {
            // An unmatched (not-yet-reached or optional-and-skipped) group
            // back-reference matches the empty string, per the dialect's
            // simplified semantics (§4.7).
            return StepOutcome::Continue(pc + 1, sp);
        };
        let len = end - start;
        if sp + len > self.text.len() {
            return StepOutcome::Fail;
        }
        let ignore_case = self.ignore_case || ignore_case_override;
        for i in 0..len {
            let a = self.text[start + i];
            let b = self.text[sp + i];
            let matches = if ignore_case { fold(a) == fold(b) } else { a == b };
            if !matches {
                return StepOutcome::Fail;
            }
        }
        StepOutcome::Continue(pc + 1, sp + len)
    }

    #[allow(clippy::too_many_arguments)]
    fn lookaround_step(
        &self,
        pc: usize,
        sp: usize,
        sub_start: usize,
        positive: bool,
        terminator: Terminator,
        captures: &mut [Option<(usize, usize)>],
        registers: &mut [Option<usize>],
        tracker: &mut dyn ResourceTracker,
        step_budget: &mut usize,
    ) -> Result<StepOutcome, ResourceError> {
        let outcome = self.run(sub_start, sp, captures.to_vec(), registers.to_vec(), terminator, tracker, step_budget)?;
        match (outcome, positive) {
            (Some(result), true) => {
                captures.clone_from_slice(&result.captures);
                Ok(StepOutcome::Continue(pc + 1, sp))
            }
            (None, false) => Ok(StepOutcome::Continue(pc + 1, sp)),
            _ => Ok(StepOutcome::Fail),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn lookbehind_step(
        &self,
        pc: usize,
        sp: usize,
        sub_start: usize,
        positive: bool,
        captures: &mut [Option<(usize, usize)>],
        registers: &mut [Option<usize>],
        tracker: &mut dyn ResourceTracker,
        step_budget: &mut usize,
    ) -> Result<StepOutcome, ResourceError> {
        for candidate in (0..=sp).rev() {
            let outcome = self.run(sub_start, candidate, captures.to_vec(), registers.to_vec(), Terminator::LookbehindEnd(sp), tracker, step_budget)?;
            if let Some(result) = outcome {
                return if positive {
                    captures.clone_from_slice(&result.captures);
                    Ok(StepOutcome::Continue(pc + 1, sp))
                } else {
                    Ok(StepOutcome::Fail)
                };
            }
        }
        if positive { Ok(StepOutcome::Fail) } else { Ok(StepOutcome::Continue(pc + 1, sp)) }
    }

    /// Backtrack-stack depth shares its ceiling with the main VM's call-stack
    /// recursion check (`ResourceTracker::check_recursion_depth`) rather than
    /// a separate limit: both represent the same "how deep can this sandbox
    /// let a single execution nest" policy, and breaching it is a catchable
    /// `RangeError` either way (§7).
    fn push_backtrack(
        &self,
        stack: &mut Vec<BacktrackEntry>,
        tracker: &mut dyn ResourceTracker,
        pc: usize,
        sp: usize,
        captures: &[Option<(usize, usize)>],
        registers: &[Option<usize>],
    ) -> Result<(), ResourceError> {
        tracker.check_recursion_depth(stack.len() + 1)?;
        stack.push((pc, sp, captures.to_vec(), registers.to_vec()));
        Ok(())
    }

    fn char_at(&self, sp: usize) -> Option<char> {
        self.text.get(sp).copied()
    }

    fn char_eq(&self, a: char, b: char) -> bool {
        if self.ignore_case { fold(a) == fold(b) } else { a == b }
    }

    fn in_ranges(&self, c: char, ranges: &[(u32, u32)]) -> bool {
        let cp = c as u32;
        let direct = ranges.binary_search_by(|&(lo, hi)| if cp < lo { std::cmp::Ordering::Greater } else if cp > hi { std::cmp::Ordering::Less } else { std::cmp::Ordering::Equal }).is_ok();
        if direct || !self.ignore_case {
            return direct;
        }
        let folded = fold(c) as u32;
        ranges.iter().any(|&(lo, hi)| folded >= lo && folded <= hi)
    }

    fn is_word_boundary(&self, sp: usize) -> bool {
        let before = sp.checked_sub(1).and_then(|i| self.char_at(i)).is_some_and(is_word_char);
        let after = self.char_at(sp).is_some_and(is_word_char);
        before != after
    }
}

enum StepOutcome {
    Continue(usize, usize),
    Fail,
}

fn is_word_char(c: &char) -> bool {
    c.is_ascii_alphanumeric() || *c == '_'
}

fn is_line_terminator(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}
