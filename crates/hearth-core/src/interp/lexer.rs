//! Tokenizer for the snippet language.
//!
//! Produces a flat token stream with explicit `Newline`, `Indent` and
//! `Dedent` tokens. Newlines inside brackets are ignored.

use super::error::Fault;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    /// Raw f-string body; placeholders are parsed later.
    FStr(String),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
}

// Longest first so that "**=" wins over "**" and "*".
const OPERATORS: &[&str] = &[
    "//=", "**=", "==", "!=", "<=", ">=", "//", "**", "+=", "-=", "*=", "/=", "%=", "->", "+",
    "-", "*", "/", "%", "<", ">", "=", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";",
];

pub fn tokenize(source: &str) -> Result<Vec<Token>, Fault> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    depth: usize,
    indents: Vec<usize>,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            depth: 0,
            indents: vec![0],
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, tok: Tok) {
        self.tokens.push(Token {
            tok,
            line: self.line,
        });
    }

    fn run(mut self) -> Result<Vec<Token>, Fault> {
        let mut at_line_start = true;

        while self.pos < self.chars.len() {
            if at_line_start && self.depth == 0 {
                if !self.handle_indentation()? {
                    continue;
                }
                at_line_start = false;
            }

            let c = match self.peek() {
                Some(c) => c,
                None => break,
            };

            match c {
                '\n' => {
                    self.pos += 1;
                    if self.depth == 0 {
                        self.push_newline();
                        at_line_start = true;
                    }
                    self.line += 1;
                }
                ' ' | '\t' | '\r' => self.pos += 1,
                '#' => self.skip_comment(),
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.pos += 2;
                    self.line += 1;
                }
                '0'..='9' => self.number()?,
                '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.number()?,
                '"' | '\'' => {
                    let s = self.string()?;
                    self.push(Tok::Str(s));
                }
                c if is_name_start(c) => self.name_or_prefixed_string()?,
                _ => self.operator()?,
            }
        }

        self.push_newline();
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Tok::Dedent);
        }
        self.push(Tok::Eof);
        Ok(self.tokens)
    }

    fn push_newline(&mut self) {
        if !matches!(
            self.tokens.last().map(|t| &t.tok),
            None | Some(Tok::Newline) | Some(Tok::Indent) | Some(Tok::Dedent)
        ) {
            self.push(Tok::Newline);
        }
    }

    /// Measures leading whitespace. Returns false for blank or comment-only
    /// lines, which are consumed entirely.
    fn handle_indentation(&mut self) -> Result<bool, Fault> {
        let mut width = 0;
        while let Some(c) = self.peek() {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\r' => {}
                _ => break,
            }
            self.pos += 1;
        }

        match self.peek() {
            None => return Ok(false),
            Some('\n') => {
                self.pos += 1;
                self.line += 1;
                return Ok(false);
            }
            Some('#') => {
                self.skip_comment();
                return Ok(false);
            }
            _ => {}
        }

        let current = *self.indents.last().unwrap_or(&0);
        if width > current {
            self.indents.push(width);
            self.push(Tok::Indent);
        } else if width < current {
            while width < *self.indents.last().unwrap_or(&0) {
                self.indents.pop();
                self.push(Tok::Dedent);
            }
            if width != *self.indents.last().unwrap_or(&0) {
                return Err(Fault::syntax(
                    "unindent does not match any outer indentation level",
                    self.line,
                ));
            }
        }
        Ok(true)
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn number(&mut self) -> Result<(), Fault> {
        let start = self.pos;
        let mut is_float = false;

        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B')) {
            let radix = match self.peek_at(1) {
                Some('x' | 'X') => 16,
                Some('o' | 'O') => 8,
                _ => 2,
            };
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
                self.pos += 1;
            }
            let digits: String = self.chars[digits_start..self.pos]
                .iter()
                .filter(|c| **c != '_')
                .collect();
            let value = i64::from_str_radix(&digits, radix)
                .map_err(|_| Fault::syntax("invalid integer literal", self.line))?;
            self.push(Tok::Int(value));
            return Ok(());
        }

        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => self.pos += 1,
                '.' if !is_float && self.peek_at(1) != Some('.') => {
                    is_float = true;
                    self.pos += 1;
                }
                'e' | 'E' => {
                    let sign = matches!(self.peek_at(1), Some('+' | '-'));
                    let digit_at = if sign { 2 } else { 1 };
                    if self.peek_at(digit_at).is_some_and(|d| d.is_ascii_digit()) {
                        is_float = true;
                        self.pos += digit_at + 1;
                        while self.peek().is_some_and(|d| d.is_ascii_digit()) {
                            self.pos += 1;
                        }
                    }
                    break;
                }
                _ => break,
            }
        }

        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        if is_float {
            let value = text
                .parse::<f64>()
                .map_err(|_| Fault::syntax("invalid float literal", self.line))?;
            self.push(Tok::Float(value));
        } else {
            match text.parse::<i64>() {
                Ok(value) => self.push(Tok::Int(value)),
                Err(_) => {
                    return Err(Fault::syntax(
                        "integer literal too large (integers are 64-bit)",
                        self.line,
                    ))
                }
            }
        }
        Ok(())
    }

    fn name_or_prefixed_string(&mut self) -> Result<(), Fault> {
        let start = self.pos;
        while self.peek().is_some_and(is_name_char) {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();

        if matches!(self.peek(), Some('"' | '\'')) {
            match name.to_ascii_lowercase().as_str() {
                "f" => {
                    let body = self.string()?;
                    self.push(Tok::FStr(body));
                    return Ok(());
                }
                "r" => {
                    let body = self.raw_string()?;
                    self.push(Tok::Str(body));
                    return Ok(());
                }
                _ => {}
            }
        }

        self.push(Tok::Name(name));
        Ok(())
    }

    fn string_delimiters(&mut self) -> (char, bool) {
        let quote = self.chars[self.pos];
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };
        (quote, triple)
    }

    fn at_string_end(&self, quote: char, triple: bool) -> bool {
        if triple {
            self.peek() == Some(quote) && self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote)
        } else {
            self.peek() == Some(quote)
        }
    }

    fn string(&mut self) -> Result<String, Fault> {
        let start_line = self.line;
        let (quote, triple) = self.string_delimiters();
        let mut out = String::new();

        loop {
            if self.at_string_end(quote, triple) {
                self.pos += if triple { 3 } else { 1 };
                return Ok(out);
            }
            let c = self
                .peek()
                .ok_or_else(|| Fault::syntax("unterminated string literal", start_line))?;
            self.pos += 1;
            match c {
                '\n' if !triple => {
                    return Err(Fault::syntax("unterminated string literal", start_line))
                }
                '\n' => {
                    self.line += 1;
                    out.push('\n');
                }
                '\\' => {
                    let escaped = self
                        .peek()
                        .ok_or_else(|| Fault::syntax("unterminated string literal", start_line))?;
                    self.pos += 1;
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        '\\' => out.push('\\'),
                        '\'' => out.push('\''),
                        '"' => out.push('"'),
                        '\n' => self.line += 1,
                        'u' => out.push(self.unicode_escape(4)?),
                        'x' => out.push(self.unicode_escape(2)?),
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                other => out.push(other),
            }
        }
    }

    fn raw_string(&mut self) -> Result<String, Fault> {
        let start_line = self.line;
        let (quote, triple) = self.string_delimiters();
        let mut out = String::new();

        loop {
            if self.at_string_end(quote, triple) {
                self.pos += if triple { 3 } else { 1 };
                return Ok(out);
            }
            let c = self
                .peek()
                .ok_or_else(|| Fault::syntax("unterminated string literal", start_line))?;
            self.pos += 1;
            if c == '\n' {
                if !triple {
                    return Err(Fault::syntax("unterminated string literal", start_line));
                }
                self.line += 1;
            }
            out.push(c);
        }
    }

    fn unicode_escape(&mut self, len: usize) -> Result<char, Fault> {
        let end = self.pos + len;
        if end > self.chars.len() {
            return Err(Fault::syntax("truncated escape sequence", self.line));
        }
        let hex: String = self.chars[self.pos..end].iter().collect();
        self.pos = end;
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| Fault::syntax("invalid escape sequence", self.line))
    }

    fn operator(&mut self) -> Result<(), Fault> {
        for op in OPERATORS {
            let matches = op
                .chars()
                .enumerate()
                .all(|(i, c)| self.peek_at(i) == Some(c));
            if matches {
                self.pos += op.len();
                match *op {
                    "(" | "[" | "{" => self.depth += 1,
                    ")" | "]" | "}" => self.depth = self.depth.saturating_sub(1),
                    _ => {}
                }
                self.push(Tok::Op(op));
                return Ok(());
            }
        }
        Err(Fault::syntax(
            format!("invalid character '{}'", self.peek().unwrap_or(' ')),
            self.line,
        ))
    }
}

fn is_name_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_name_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Tok> {
        tokenize(source).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn test_simple_assignment() {
        assert_eq!(
            kinds("x = 1\n"),
            vec![
                Tok::Name("x".into()),
                Tok::Op("="),
                Tok::Int(1),
                Tok::Newline,
                Tok::Eof
            ]
        );
    }

    #[test]
    fn test_indent_and_dedent() {
        let toks = kinds("if x:\n    y = 2\nz = 3");
        assert!(toks.contains(&Tok::Indent));
        assert!(toks.contains(&Tok::Dedent));
        let indent = toks.iter().position(|t| *t == Tok::Indent).unwrap();
        let dedent = toks.iter().position(|t| *t == Tok::Dedent).unwrap();
        assert!(indent < dedent);
    }

    #[test]
    fn test_blank_and_comment_lines_do_not_indent() {
        let toks = kinds("x = 1\n\n    # comment\ny = 2\n");
        assert!(!toks.contains(&Tok::Indent));
    }

    #[test]
    fn test_newlines_inside_brackets_are_ignored() {
        let toks = kinds("x = [1,\n     2]\n");
        let newlines = toks.iter().filter(|t| **t == Tok::Newline).count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("1_000")[0], Tok::Int(1000));
        assert_eq!(kinds("0x1f")[0], Tok::Int(31));
        assert_eq!(kinds("2.5")[0], Tok::Float(2.5));
        assert_eq!(kinds("1e3")[0], Tok::Float(1000.0));
        assert_eq!(kinds(".5")[0], Tok::Float(0.5));
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(kinds(r#""a\nb""#)[0], Tok::Str("a\nb".into()));
        assert_eq!(kinds("'it''s'")[0], Tok::Str("it".into()));
        assert_eq!(kinds("r'a\\n'")[0], Tok::Str("a\\n".into()));
        assert_eq!(kinds("f'{x}!'")[0], Tok::FStr("{x}!".into()));
    }

    #[test]
    fn test_triple_quoted_string_tracks_lines() {
        let tokens = tokenize("s = \"\"\"a\nb\"\"\"\ny = 1").unwrap();
        assert_eq!(tokens[2].tok, Tok::Str("a\nb".into()));
        let y = tokens.iter().find(|t| t.tok == Tok::Name("y".into())).unwrap();
        assert_eq!(y.line, 3);
    }

    #[test]
    fn test_longest_operator_wins() {
        assert_eq!(kinds("a //= 2")[1], Tok::Op("//="));
        assert_eq!(kinds("a ** 2")[1], Tok::Op("**"));
    }

    #[test]
    fn test_bad_dedent_is_syntax_error() {
        let err = tokenize("if x:\n    y = 1\n  z = 2\n").unwrap_err();
        assert_eq!(err.kind_name(), "SyntaxError");
    }

    #[test]
    fn test_unterminated_string() {
        assert!(tokenize("x = 'abc\n").is_err());
    }
}
