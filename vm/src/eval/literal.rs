/// Single-pass literal parser backing the eval and JSONP fast paths.
///
/// Anything outside the accepted grammar makes the parser give up with
/// `None`; the caller then hands the source to the real compiler. The
/// parser never reports errors of its own.
use memory::{Object, ObjectKind, Property, Value};

use crate::machine::VM;
use crate::realm::RealmId;

const MAX_NESTING: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserMode {
    /// JSON plus single-quoted strings and identifier keys. A top-level
    /// object must be parenthesized, otherwise it would be a block.
    SloppyJson,
    StrictJson,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    String(String),
    Array(Vec<Literal>),
    /// Keys in source order; a repeated key keeps its first position and
    /// its last value.
    Object(Vec<(String, Literal)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonpPathEntry {
    DeclareVar(String),
    Dot(String),
    Lookup(u32),
    Call(String),
}

impl JsonpPathEntry {
    pub fn name(&self) -> Option<&str> {
        match self {
            JsonpPathEntry::DeclareVar(n) | JsonpPathEntry::Dot(n) | JsonpPathEntry::Call(n) => Some(n),
            JsonpPathEntry::Lookup(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonpStatement {
    pub path: Vec<JsonpPathEntry>,
    pub value: Literal,
}

pub struct LiteralParser<'a> {
    source: &'a [u8],
    pos: usize,
    mode: ParserMode,
    depth: usize,
}

impl<'a> LiteralParser<'a> {
    pub fn new(source: &'a str, mode: ParserMode) -> Self {
        Self {
            source: source.as_bytes(),
            pos: 0,
            mode,
            depth: 0,
        }
    }

    /// Parses the whole source as one literal expression, optionally
    /// followed by a semicolon.
    pub fn try_eval(source: &str) -> Option<Literal> {
        let mut parser = LiteralParser::new(source, ParserMode::SloppyJson);
        parser.skip_whitespace();
        let value = if parser.peek() == Some(b'(') {
            parser.advance();
            let value = parser.parse_value()?;
            parser.expect(b')')?;
            value
        } else {
            let value = parser.parse_value()?;
            if matches!(value, Literal::Object(_)) {
                return None;
            }
            value
        };
        parser.skip_whitespace();
        if parser.peek() == Some(b';') {
            parser.advance();
            parser.skip_whitespace();
        }
        parser.at_end().then_some(value)
    }

    /// Parses a program made only of JSONP statements.
    pub fn try_jsonp_parse(source: &str) -> Option<Vec<JsonpStatement>> {
        let mut parser = LiteralParser::new(source, ParserMode::StrictJson);
        let mut statements = Vec::new();
        loop {
            parser.skip_whitespace();
            if parser.at_end() {
                break;
            }
            statements.push(parser.parse_jsonp_statement()?);
            parser.skip_whitespace();
            match parser.peek() {
                Some(b';') => {
                    parser.advance();
                }
                None => break,
                Some(_) => return None,
            }
        }
        (!statements.is_empty()).then_some(statements)
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn expect(&mut self, ch: u8) -> Option<()> {
        self.skip_whitespace();
        (self.advance()? == ch).then_some(())
    }

    fn skip_whitespace(&mut self) {
        while let Some(b' ' | b'\t' | b'\r' | b'\n') = self.peek() {
            self.pos += 1;
        }
    }

    fn parse_jsonp_statement(&mut self) -> Option<JsonpStatement> {
        let first = self.parse_identifier()?;
        if first == "var" {
            self.skip_whitespace();
            let name = self.parse_identifier()?;
            self.expect(b'=')?;
            let value = self.parse_value()?;
            return Some(JsonpStatement {
                path: vec![JsonpPathEntry::DeclareVar(name)],
                value,
            });
        }

        let mut path = vec![JsonpPathEntry::Dot(first)];
        loop {
            self.skip_whitespace();
            match self.peek()? {
                b'.' => {
                    self.advance();
                    self.skip_whitespace();
                    path.push(JsonpPathEntry::Dot(self.parse_identifier()?));
                }
                b'[' => {
                    self.advance();
                    self.skip_whitespace();
                    let index = self.parse_index()?;
                    self.expect(b']')?;
                    path.push(JsonpPathEntry::Lookup(index));
                }
                b'=' => {
                    self.advance();
                    let value = self.parse_value()?;
                    return Some(JsonpStatement { path, value });
                }
                b'(' => {
                    self.advance();
                    let value = self.parse_value()?;
                    self.expect(b')')?;
                    // The callee is named by the last dotted segment.
                    let Some(JsonpPathEntry::Dot(name)) = path.pop() else {
                        return None;
                    };
                    path.push(JsonpPathEntry::Call(name));
                    return Some(JsonpStatement { path, value });
                }
                _ => return None,
            }
        }
    }

    fn parse_index(&mut self) -> Option<u32> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        std::str::from_utf8(&self.source[start..self.pos]).ok()?.parse().ok()
    }

    fn parse_identifier(&mut self) -> Option<String> {
        let start = self.pos;
        match self.peek()? {
            c if c.is_ascii_alphabetic() || c == b'_' || c == b'$' => self.pos += 1,
            _ => return None,
        }
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_' || c == b'$')
        {
            self.pos += 1;
        }
        std::str::from_utf8(&self.source[start..self.pos]).ok().map(str::to_string)
    }

    fn parse_value(&mut self) -> Option<Literal> {
        self.skip_whitespace();
        match self.peek()? {
            b'{' => self.nested(Self::parse_object),
            b'[' => self.nested(Self::parse_array),
            b'"' => self.parse_string(b'"').map(Literal::String),
            b'\'' if self.mode == ParserMode::SloppyJson => self.parse_string(b'\'').map(Literal::String),
            b'-' | b'0'..=b'9' => self.parse_number(),
            _ => match self.parse_identifier()?.as_str() {
                "null" => Some(Literal::Null),
                "true" => Some(Literal::Bool(true)),
                "false" => Some(Literal::Bool(false)),
                _ => None,
            },
        }
    }

    fn nested(&mut self, parse: fn(&mut Self) -> Option<Literal>) -> Option<Literal> {
        if self.depth >= MAX_NESTING {
            return None;
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn parse_array(&mut self) -> Option<Literal> {
        self.advance();
        let mut elements = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(b']') {
            self.advance();
            return Some(Literal::Array(elements));
        }
        loop {
            elements.push(self.parse_value()?);
            self.skip_whitespace();
            match self.advance()? {
                b',' => continue,
                b']' => return Some(Literal::Array(elements)),
                _ => return None,
            }
        }
    }

    fn parse_object(&mut self) -> Option<Literal> {
        self.advance();
        let mut entries: Vec<(String, Literal)> = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(b'}') {
            self.advance();
            return Some(Literal::Object(entries));
        }
        loop {
            self.skip_whitespace();
            let key = match (self.peek()?, self.mode) {
                (b'"', _) => self.parse_string(b'"')?,
                (b'\'', ParserMode::SloppyJson) => self.parse_string(b'\'')?,
                (_, ParserMode::SloppyJson) => self.parse_identifier()?,
                (_, ParserMode::StrictJson) => return None,
            };
            self.expect(b':')?;
            let value = self.parse_value()?;
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value,
                None => entries.push((key, value)),
            }
            self.skip_whitespace();
            match self.advance()? {
                b',' => continue,
                b'}' => return Some(Literal::Object(entries)),
                _ => return None,
            }
        }
    }

    fn parse_string(&mut self, quote: u8) -> Option<String> {
        self.advance();
        let mut bytes = Vec::new();
        loop {
            match self.advance()? {
                c if c == quote => break,
                b'\\' => {
                    let escaped = match self.advance()? {
                        b'"' => '"',
                        b'\'' => '\'',
                        b'\\' => '\\',
                        b'/' => '/',
                        b'b' => '\u{8}',
                        b'f' => '\u{c}',
                        b'n' => '\n',
                        b'r' => '\r',
                        b't' => '\t',
                        b'u' => self.parse_unicode_escape()?,
                        _ => return None,
                    };
                    let mut buf = [0; 4];
                    bytes.extend_from_slice(escaped.encode_utf8(&mut buf).as_bytes());
                }
                c if c < 0x20 => return None,
                c => bytes.push(c),
            }
        }
        String::from_utf8(bytes).ok()
    }

    fn parse_unicode_escape(&mut self) -> Option<char> {
        let end = self.pos.checked_add(4)?;
        let digits = std::str::from_utf8(self.source.get(self.pos..end)?).ok()?;
        let code = u32::from_str_radix(digits, 16).ok()?;
        self.pos = end;
        // Lone surrogates have no `char`; leave them to the compiler.
        char::from_u32(code)
    }

    /// Integers only; fractions and exponents go to the compiler.
    fn parse_number(&mut self) -> Option<Literal> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let digits_start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let digits = &self.source[digits_start..self.pos];
        if digits.is_empty() || (digits.len() > 1 && digits[0] == b'0') {
            return None;
        }
        if matches!(self.peek(), Some(b'.' | b'e' | b'E')) {
            return None;
        }
        let n: i64 = std::str::from_utf8(&self.source[start..self.pos]).ok()?.parse().ok()?;
        (memory::value::I60_MIN..=memory::value::I60_MAX)
            .contains(&n)
            .then_some(Literal::Int(n))
    }
}

impl VM {
    /// Allocates the heap value of a parsed literal in `realm`.
    pub fn materialize_literal(&mut self, literal: &Literal, realm: RealmId) -> Value {
        match literal {
            Literal::Null => Value::null(),
            Literal::Bool(b) => Value::bool(*b),
            Literal::Int(n) => Value::int(*n),
            Literal::String(s) => self.alloc_str(s),
            Literal::Array(items) => {
                let elements = items
                    .iter()
                    .map(|item| self.materialize_literal(item, realm))
                    .collect();
                Value::object(
                    self.heap
                        .alloc_object(Object::with_elements(ObjectKind::Array, realm.0, elements)),
                )
            }
            Literal::Object(entries) => {
                let mut object = Object::new(ObjectKind::Ordinary, realm.0);
                for (key, item) in entries {
                    let value = self.materialize_literal(item, realm);
                    object.properties.insert(key.clone(), Property::data(value));
                }
                Value::object(self.heap.alloc_object(object))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(entries: &[(&str, Literal)]) -> Literal {
        Literal::Object(entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    #[test]
    fn parenthesized_object_with_identifier_keys() {
        let parsed = LiteralParser::try_eval("({a:1,b:[2,3]})").unwrap();
        assert_eq!(
            parsed,
            obj(&[
                ("a", Literal::Int(1)),
                ("b", Literal::Array(vec![Literal::Int(2), Literal::Int(3)])),
            ])
        );
    }

    #[test]
    fn bare_object_is_a_block() {
        assert_eq!(LiteralParser::try_eval("{a:1}"), None);
    }

    #[test]
    fn primitives_and_trailing_semicolon() {
        assert_eq!(LiteralParser::try_eval(" 42; "), Some(Literal::Int(42)));
        assert_eq!(LiteralParser::try_eval("'it\\'s'"), Some(Literal::String("it's".into())));
        assert_eq!(LiteralParser::try_eval("[true,null]"), Some(Literal::Array(vec![Literal::Bool(true), Literal::Null])));
        assert_eq!(LiteralParser::try_eval("\"\\u0041\""), Some(Literal::String("A".into())));
    }

    #[test]
    fn non_literals_fall_through() {
        for source in ["var x = 1;", "x", "1.5", "1 + 2", "[1,]", "undefined", "01"] {
            assert_eq!(LiteralParser::try_eval(source), None, "{source}");
        }
    }

    #[test]
    fn repeated_keys_keep_last_value() {
        assert_eq!(
            LiteralParser::try_eval("({a:1,b:2,a:3})"),
            Some(obj(&[("a", Literal::Int(3)), ("b", Literal::Int(2))]))
        );
    }

    #[test]
    fn jsonp_statement_shapes() {
        let statements =
            LiteralParser::try_jsonp_parse("var x = {\"k\":1}; a.b[2].c = [1]; ns.cb(\"v\"); cb(0)").unwrap();
        assert_eq!(statements.len(), 4);
        assert_eq!(statements[0].path, vec![JsonpPathEntry::DeclareVar("x".into())]);
        assert_eq!(
            statements[1].path,
            vec![
                JsonpPathEntry::Dot("a".into()),
                JsonpPathEntry::Dot("b".into()),
                JsonpPathEntry::Lookup(2),
                JsonpPathEntry::Dot("c".into()),
            ]
        );
        assert_eq!(
            statements[2].path,
            vec![JsonpPathEntry::Dot("ns".into()), JsonpPathEntry::Call("cb".into())]
        );
        assert_eq!(statements[3].path, vec![JsonpPathEntry::Call("cb".into())]);
    }

    #[test]
    fn jsonp_rejects_sloppy_values_and_code() {
        assert!(LiteralParser::try_jsonp_parse("x = {a:1}").is_none());
        assert!(LiteralParser::try_jsonp_parse("f(1)(2)").is_none());
        assert!(LiteralParser::try_jsonp_parse("").is_none());
    }

    #[test]
    fn materialized_array_keeps_elements() {
        let mut vm = VM::new();
        let value = vm.materialize_literal(&Literal::Array(vec![Literal::Int(7)]), RealmId::MAIN);
        let object = vm.heap.get_object(value.as_object().unwrap()).unwrap();
        assert_eq!(object.kind, ObjectKind::Array);
        assert_eq!(object.elements, vec![Value::int(7)]);
    }
}
