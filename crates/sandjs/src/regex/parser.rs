//! Recursive-descent pattern parser (§4.6), ported from `regex/parser.py`.
//!
//! Operates over a `Vec<char>` (Unicode scalar values) rather than a byte
//! slice so multi-byte source characters index correctly; `u`-flagged
//! patterns see full code points, matching the dialect's "full Unicode for
//! regex classes" boundary rule.

use super::ast::{AnchorKind, Node, RegexError, ShorthandKind};

pub fn parse(pattern: &str, flags: &str) -> Result<(Node, u32), RegexError> {
    Parser::new(pattern, flags).parse()
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    group_count: u32,
}

impl Parser {
    fn new(pattern: &str, _flags: &str) -> Self {
        Self { chars: pattern.chars().collect(), pos: 0, group_count: 0 }
    }

    /// Returns the parsed body plus the number of capturing groups it
    /// contains (not counting the implicit whole-match slot).
    fn parse(mut self) -> Result<(Node, u32), RegexError> {
        if self.chars.is_empty() {
            return Ok((Node::Alternative(Vec::new()), 0));
        }
        let ast = self.parse_disjunction()?;
        if self.pos < self.chars.len() {
            return Err(RegexError::new(format!("Unexpected character '{}' at position {}", self.chars[self.pos], self.pos)));
        }
        Ok((ast, self.group_count))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_disjunction(&mut self) -> Result<Node, RegexError> {
        let mut alternatives = vec![self.parse_alternative()?];
        while self.eat('|') {
            alternatives.push(self.parse_alternative()?);
        }
        if alternatives.len() == 1 { Ok(alternatives.pop().unwrap()) } else { Ok(Node::Disjunction(alternatives)) }
    }

    fn parse_alternative(&mut self) -> Result<Node, RegexError> {
        let mut terms = Vec::new();
        while !matches!(self.peek(), None | Some('|') | Some(')')) {
            let before = self.pos;
            match self.parse_term()? {
                Some(term) => terms.push(term),
                None if self.pos == before => {
                    if matches!(self.peek(), Some('*') | Some('+') | Some('?')) {
                        return Err(RegexError::new(format!("Nothing to repeat at position {}", self.pos)));
                    }
                    break;
                }
                None => {}
            }
        }
        match terms.len() {
            0 => Ok(Node::Alternative(Vec::new())),
            1 => Ok(terms.pop().unwrap()),
            _ => Ok(Node::Alternative(terms)),
        }
    }

    fn parse_term(&mut self) -> Result<Option<Node>, RegexError> {
        if let Some(assertion) = self.try_parse_assertion() {
            return Ok(Some(assertion));
        }
        let Some(atom) = self.parse_atom()? else { return Ok(None) };
        Ok(Some(self.try_parse_quantifier(atom)?))
    }

    fn try_parse_assertion(&mut self) -> Option<Node> {
        match self.peek() {
            Some('^') => {
                self.advance();
                Some(Node::Anchor(AnchorKind::Start))
            }
            Some('$') => {
                self.advance();
                Some(Node::Anchor(AnchorKind::End))
            }
            _ => None,
        }
    }

    fn parse_atom(&mut self) -> Result<Option<Node>, RegexError> {
        let Some(ch) = self.peek() else { return Ok(None) };
        match ch {
            '.' => {
                self.advance();
                Ok(Some(Node::Dot))
            }
            '[' => self.parse_char_class().map(Some),
            '(' => self.parse_group().map(Some),
            '\\' => self.parse_escape().map(Some),
            '{' if !self.is_quantifier_start() => {
                self.advance();
                Ok(Some(Node::Char(ch)))
            }
            '{' | '}' => Ok(None),
            '.' | '*' | '+' | '?' | '^' | '$' | '[' | ']' | '(' | ')' | '|' | '\\' => Ok(None),
            _ => {
                self.advance();
                Ok(Some(Node::Char(ch)))
            }
        }
    }

    /// Looks ahead past `{` for a shape that reads as `{n}`, `{n,}`, or
    /// `{n,m}`; anything else means the brace is a literal character.
    fn is_quantifier_start(&self) -> bool {
        if self.peek() != Some('{') {
            return false;
        }
        let mut i = self.pos + 1;
        if self.chars.get(i) == Some(&'}') {
            return true;
        }
        let digits_start = i;
        while self.chars.get(i).is_some_and(char::is_ascii_digit) {
            i += 1;
        }
        if i == digits_start {
            return false;
        }
        match self.chars.get(i) {
            Some('}') => true,
            Some(',') => {
                i += 1;
                while self.chars.get(i).is_some_and(char::is_ascii_digit) {
                    i += 1;
                }
                self.chars.get(i) == Some(&'}')
            }
            _ => false,
        }
    }

    fn parse_char_class(&mut self) -> Result<Node, RegexError> {
        self.advance();
        let negated = self.eat('^');
        let mut ranges = Vec::new();
        while !matches!(self.peek(), None | Some(']')) {
            let Some(start) = self.parse_class_char()? else { break };
            if let ClassChar::Shorthand(kind) = start {
                ranges.extend(shorthand_ranges(kind));
                continue;
            }
            let start_ch = start.literal();
            if self.peek() == Some('-') && !matches!(self.peek_at(1), None | Some(']')) {
                self.advance();
                let Some(end) = self.parse_class_char()? else {
                    ranges.push((start_ch as u32, start_ch as u32));
                    ranges.push(('-' as u32, '-' as u32));
                    continue;
                };
                ranges.push((start_ch as u32, end.literal() as u32));
            } else {
                ranges.push((start_ch as u32, start_ch as u32));
            }
        }
        if !self.eat(']') {
            return Err(RegexError::new("Unterminated character class"));
        }
        Ok(Node::CharClass { ranges, negated })
    }

    fn parse_class_char(&mut self) -> Result<Option<ClassChar>, RegexError> {
        let Some(ch) = self.peek() else { return Ok(None) };
        if ch == ']' {
            return Ok(None);
        }
        if ch == '\\' {
            self.advance();
            let Some(escaped) = self.advance() else {
                return Err(RegexError::new("Trailing backslash in character class"));
            };
            if let Some(lit) = simple_escape(escaped) {
                return Ok(Some(ClassChar::Literal(lit)));
            }
            if matches!(escaped, 'd' | 'D' | 'w' | 'W' | 's' | 'S') {
                return Ok(Some(ClassChar::Shorthand(shorthand_kind(escaped))));
            }
            return Ok(Some(ClassChar::Literal(escaped)));
        }
        self.advance();
        Ok(Some(ClassChar::Literal(ch)))
    }

    fn parse_group(&mut self) -> Result<Node, RegexError> {
        self.advance();
        let mut capturing = true;
        let mut group_index = 0;
        let mut kind = GroupKind::Plain;

        if self.peek() == Some('?') {
            self.advance();
            match self.peek() {
                Some(':') => {
                    self.advance();
                    capturing = false;
                }
                Some('=') => {
                    self.advance();
                    capturing = false;
                    kind = GroupKind::Lookahead(true);
                }
                Some('!') => {
                    self.advance();
                    capturing = false;
                    kind = GroupKind::Lookahead(false);
                }
                Some('<') => {
                    self.advance();
                    match self.peek() {
                        Some('=') => {
                            self.advance();
                            capturing = false;
                            kind = GroupKind::Lookbehind(true);
                        }
                        Some('!') => {
                            self.advance();
                            capturing = false;
                            kind = GroupKind::Lookbehind(false);
                        }
                        other => return Err(RegexError::new(format!("Invalid group syntax: (?<{}", other.map_or(String::new(), String::from)))),
                    }
                }
                other => return Err(RegexError::new(format!("Invalid group syntax: (?{}", other.map_or(String::new(), String::from)))),
            }
        }

        if capturing {
            self.group_count += 1;
            group_index = self.group_count;
        }

        let body = self.parse_disjunction()?;

        if !self.eat(')') {
            return Err(RegexError::new("Unterminated group"));
        }

        Ok(match kind {
            GroupKind::Plain => Node::Group { body: Box::new(body), capturing, group_index },
            GroupKind::Lookahead(positive) => Node::Lookahead { body: Box::new(body), positive },
            GroupKind::Lookbehind(positive) => Node::Lookbehind { body: Box::new(body), positive },
        })
    }

    fn parse_escape(&mut self) -> Result<Node, RegexError> {
        self.advance();
        let Some(ch) = self.advance() else { return Err(RegexError::new("Trailing backslash")) };

        if matches!(ch, 'd' | 'D' | 'w' | 'W' | 's' | 'S') {
            return Ok(Node::Shorthand(shorthand_kind(ch)));
        }
        if ch == 'b' {
            return Ok(Node::Anchor(AnchorKind::Boundary));
        }
        if ch == 'B' {
            return Ok(Node::Anchor(AnchorKind::NotBoundary));
        }
        if ch.is_ascii_digit() && ch != '0' {
            let mut num = String::from(ch);
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                num.push(self.advance().unwrap());
            }
            let group_num: u32 = num.parse().expect("digit-only string parses as u32");
            if group_num > self.group_count {
                return Err(RegexError::new(format!("Invalid backreference \\{group_num}")));
            }
            return Ok(Node::Backref(group_num));
        }
        if ch == 'u' {
            return self.parse_unicode_escape();
        }
        if ch == 'x' {
            return self.parse_hex_escape();
        }
        if ch == 'c' {
            if let Some(ctrl) = self.peek().filter(char::is_ascii_alphabetic) {
                self.advance();
                let code = (ctrl.to_ascii_uppercase() as u32).wrapping_sub(64);
                return Ok(Node::Char(char::from_u32(code).unwrap_or('\0')));
            }
            return Ok(Node::Alternative(vec![Node::Char('\\'), Node::Char('c')]));
        }
        Ok(Node::Char(simple_escape(ch).unwrap_or(ch)))
    }

    fn parse_unicode_escape(&mut self) -> Result<Node, RegexError> {
        if self.eat('{') {
            let mut digits = String::new();
            while !matches!(self.peek(), None | Some('}')) {
                digits.push(self.advance().unwrap());
            }
            if !self.eat('}') {
                return Err(RegexError::new("Unterminated unicode escape"));
            }
            if digits.is_empty() {
                return Err(RegexError::new("Empty unicode escape"));
            }
            let code = u32::from_str_radix(&digits, 16).map_err(|_| RegexError::new(format!("Invalid unicode escape: {digits}")))?;
            return Ok(Node::Char(char::from_u32(code).ok_or_else(|| RegexError::new(format!("Invalid unicode escape: {digits}")))?));
        }
        let mut digits = String::new();
        for _ in 0..4 {
            match self.peek().filter(char::is_ascii_hexdigit) {
                Some(c) => {
                    digits.push(c);
                    self.advance();
                }
                None => break,
            }
        }
        if digits.len() != 4 {
            return Err(RegexError::new("Invalid unicode escape"));
        }
        let code = u32::from_str_radix(&digits, 16).expect("validated hex digits");
        Ok(Node::Char(char::from_u32(code).unwrap_or('\u{FFFD}')))
    }

    fn parse_hex_escape(&mut self) -> Result<Node, RegexError> {
        let mut digits = String::new();
        for _ in 0..2 {
            match self.peek().filter(char::is_ascii_hexdigit) {
                Some(c) => {
                    digits.push(c);
                    self.advance();
                }
                None => break,
            }
        }
        if digits.len() != 2 {
            return Err(RegexError::new("Invalid hex escape"));
        }
        let code = u32::from_str_radix(&digits, 16).expect("validated hex digits");
        Ok(Node::Char(char::from_u32(code).unwrap_or('\u{FFFD}')))
    }

    fn try_parse_quantifier(&mut self, atom: Node) -> Result<Node, RegexError> {
        let (min, max) = match self.peek() {
            Some('*') => {
                self.advance();
                (0, None)
            }
            Some('+') => {
                self.advance();
                (1, None)
            }
            Some('?') => {
                self.advance();
                (0, Some(1))
            }
            Some('{') => match self.parse_brace_quantifier()? {
                Some(bounds) => bounds,
                None => return Ok(atom),
            },
            _ => return Ok(atom),
        };
        let greedy = !self.eat('?');
        Ok(Node::Quantifier { body: Box::new(atom), min, max, greedy })
    }

    fn parse_brace_quantifier(&mut self) -> Result<Option<(u32, Option<u32>)>, RegexError> {
        if !self.is_quantifier_start() {
            return Ok(None);
        }
        self.advance();
        let mut min_str = String::new();
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            min_str.push(self.advance().unwrap());
        }
        if min_str.is_empty() {
            return Err(RegexError::new("Invalid quantifier"));
        }
        let min: u32 = min_str.parse().expect("digit-only string parses as u32");
        let mut max = Some(min);

        if self.eat(',') {
            let mut max_str = String::new();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                max_str.push(self.advance().unwrap());
            }
            max = if max_str.is_empty() { None } else { Some(max_str.parse().expect("digit-only string parses as u32")) };
        }

        if !self.eat('}') {
            return Err(RegexError::new("Unterminated quantifier"));
        }
        if let Some(m) = max {
            if m < min {
                return Err(RegexError::new("Quantifier max less than min"));
            }
        }
        Ok(Some((min, max)))
    }
}

enum GroupKind {
    Plain,
    Lookahead(bool),
    Lookbehind(bool),
}

#[derive(Clone, Copy)]
enum ClassChar {
    Literal(char),
    Shorthand(ShorthandKind),
}

impl ClassChar {
    fn literal(self) -> char {
        match self {
            ClassChar::Literal(c) => c,
            ClassChar::Shorthand(_) => unreachable!("caller always handles Shorthand before taking a literal"),
        }
    }
}

fn simple_escape(ch: char) -> Option<char> {
    Some(match ch {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        'f' => '\u{000C}',
        'v' => '\u{000B}',
        '0' => '\0',
        'b' => '\u{0008}',
        _ => return None,
    })
}

fn shorthand_kind(ch: char) -> ShorthandKind {
    match ch {
        'd' => ShorthandKind::Digit,
        'D' => ShorthandKind::NotDigit,
        'w' => ShorthandKind::Word,
        'W' => ShorthandKind::NotWord,
        's' => ShorthandKind::Space,
        'S' => ShorthandKind::NotSpace,
        _ => unreachable!("caller only passes dDwWsS"),
    }
}

/// Expands a shorthand class appearing *inside* `[...]` to explicit ranges,
/// the same expansion `RegexCompiler._expand_shorthand` performs for a bare
/// shorthand term (§4.7).
fn shorthand_ranges(kind: ShorthandKind) -> Vec<(u32, u32)> {
    match kind {
        ShorthandKind::Digit => vec![('0' as u32, '9' as u32)],
        ShorthandKind::NotDigit => vec![(0, '0' as u32 - 1), ('9' as u32 + 1, 0x10_FFFF)],
        ShorthandKind::Word => vec![('0' as u32, '9' as u32), ('A' as u32, 'Z' as u32), ('a' as u32, 'z' as u32), ('_' as u32, '_' as u32)],
        ShorthandKind::NotWord => {
            vec![(0, '0' as u32 - 1), ('9' as u32 + 1, 'A' as u32 - 1), ('Z' as u32 + 1, '_' as u32 - 1), ('_' as u32 + 1, 'a' as u32 - 1), ('z' as u32 + 1, 0x10_FFFF)]
        }
        ShorthandKind::Space => vec![
            (' ' as u32, ' ' as u32),
            ('\t' as u32, '\r' as u32),
            (0x00A0, 0x00A0),
            (0x1680, 0x1680),
            (0x2000, 0x200A),
            (0x2028, 0x2029),
            (0x202F, 0x202F),
            (0x205F, 0x205F),
            (0x3000, 0x3000),
            (0xFEFF, 0xFEFF),
        ],
        ShorthandKind::NotSpace => vec![('!' as u32, '~' as u32)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_chars_parse_as_an_alternative_of_char_nodes() {
        let (ast, groups) = parse("ab", "").unwrap();
        assert_eq!(groups, 0);
        assert!(matches!(ast, Node::Alternative(terms) if terms.len() == 2));
    }

    #[test]
    fn alternation_produces_a_disjunction() {
        let (ast, _) = parse("cat|dog", "").unwrap();
        assert!(matches!(ast, Node::Disjunction(alts) if alts.len() == 2));
    }

    #[test]
    fn capturing_group_increments_group_count_and_index() {
        let (ast, groups) = parse("(a)(b)", "").unwrap();
        assert_eq!(groups, 2);
        let Node::Alternative(terms) = ast else { panic!("expected Alternative") };
        assert!(matches!(terms[0], Node::Group { capturing: true, group_index: 1, .. }));
        assert!(matches!(terms[1], Node::Group { capturing: true, group_index: 2, .. }));
    }

    #[test]
    fn non_capturing_group_does_not_advance_group_count() {
        let (_, groups) = parse("(?:ab)", "").unwrap();
        assert_eq!(groups, 0);
    }

    #[test]
    fn lookahead_and_lookbehind_set_positivity() {
        let (ast, _) = parse("(?=a)(?!b)(?<=c)(?<!d)", "").unwrap();
        let Node::Alternative(terms) = ast else { panic!("expected Alternative") };
        assert!(matches!(terms[0], Node::Lookahead { positive: true, .. }));
        assert!(matches!(terms[1], Node::Lookahead { positive: false, .. }));
        assert!(matches!(terms[2], Node::Lookbehind { positive: true, .. }));
        assert!(matches!(terms[3], Node::Lookbehind { positive: false, .. }));
    }

    #[test]
    fn quantifiers_cover_star_plus_optional_and_braces() {
        let (ast, _) = parse("a*", "").unwrap();
        assert!(matches!(ast, Node::Quantifier { min: 0, max: None, greedy: true, .. }));
        let (ast, _) = parse("a+?", "").unwrap();
        assert!(matches!(ast, Node::Quantifier { min: 1, max: None, greedy: false, .. }));
        let (ast, _) = parse("a{2,4}", "").unwrap();
        assert!(matches!(ast, Node::Quantifier { min: 2, max: Some(4), greedy: true, .. }));
    }

    #[test]
    fn char_class_parses_ranges_and_negation() {
        let (ast, _) = parse("[^a-z0-9]", "").unwrap();
        assert!(matches!(ast, Node::CharClass { negated: true, ref ranges } if ranges.len() == 2));
    }

    #[test]
    fn shorthand_escapes_parse_as_shorthand_nodes() {
        let (ast, _) = parse(r"\d\w\s", "").unwrap();
        let Node::Alternative(terms) = ast else { panic!("expected Alternative") };
        assert!(matches!(terms[0], Node::Shorthand(ShorthandKind::Digit)));
        assert!(matches!(terms[1], Node::Shorthand(ShorthandKind::Word)));
        assert!(matches!(terms[2], Node::Shorthand(ShorthandKind::Space)));
    }

    #[test]
    fn anchors_and_word_boundaries_parse_distinctly() {
        let (ast, _) = parse(r"^a$\b\B", "").unwrap();
        let Node::Alternative(terms) = ast else { panic!("expected Alternative") };
        assert!(matches!(terms[0], Node::Anchor(AnchorKind::Start)));
        assert!(matches!(terms[2], Node::Anchor(AnchorKind::End)));
        assert!(matches!(terms[3], Node::Anchor(AnchorKind::Boundary)));
        assert!(matches!(terms[4], Node::Anchor(AnchorKind::NotBoundary)));
    }

    #[test]
    fn backreference_to_undefined_group_is_an_error() {
        assert!(parse(r"\1", "").is_err());
    }

    #[test]
    fn unterminated_group_and_class_are_errors() {
        assert!(parse("(a", "").is_err());
        assert!(parse("[a", "").is_err());
    }

    #[test]
    fn dangling_quantifier_with_nothing_to_repeat_is_an_error() {
        assert!(parse("*", "").is_err());
    }
}
