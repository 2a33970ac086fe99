//! Compiled regex instruction set (§4.7) — a linear sequence distinct from
//! the JS VM's byte-packed opcodes (`compiler/op.rs`). Operands are carried
//! directly on each variant rather than packed into a byte stream; nothing
//! downstream needs random-access seeking into a byte buffer the way the
//! main bytecode does, so there is no reason to pay for that encoding here.

#[derive(Debug, Clone)]
pub enum RegexOp {
    Char(char),
    /// Matches any one code point; excludes line terminators unless the
    /// regex carries the `s` (dotAll) flag, checked at match time.
    Dot,
    Range(Vec<(u32, u32)>),
    RangeNeg(Vec<(u32, u32)>),
    Digit,
    NotDigit,
    Word,
    NotWord,
    Space,
    NotSpace,
    LineStart,
    LineStartM,
    LineEnd,
    LineEndM,
    WordBoundary,
    NotWordBoundary,
    Jump(usize),
    /// Tries the alternative at `target` first; falls through to the next
    /// instruction on backtrack.
    SplitFirst(usize),
    /// Falls through to `target` first; tries the next instruction on
    /// backtrack. Used for lazy quantifiers, where skipping should be tried
    /// before repeating.
    SplitNext(usize),
    SaveStart(u32),
    SaveEnd(u32),
    Backref(u32),
    BackrefI(u32),
    Lookahead(usize),
    LookaheadNeg(usize),
    LookaheadEnd,
    Lookbehind(usize),
    LookbehindNeg(usize),
    LookbehindEnd,
    /// Stashes the current string position into a zero-advance-detection
    /// register, paired with a later `CheckAdvance` on the same register.
    SetPos(u32),
    /// Fails the current thread if the string position has not moved since
    /// the matching `SetPos` — breaks infinite loops on quantifiers whose
    /// body can match the empty string.
    CheckAdvance(u32),
    Match,
}
