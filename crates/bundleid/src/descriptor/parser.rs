//! OpenStep property list reader for project descriptors.
//!
//! `project.pbxproj` files use the old-style (OpenStep) property list text
//! format:
//!
//! ```text
//! // !$*UTF8*$!
//! {
//!     objects = {
//!         97C146ED1CF9000F007C117D /* Runner */ = {
//!             isa = PBXNativeTarget;
//!             buildConfigurationList = 97C146FA1CF9000F007C117D;
//!             productType = "com.apple.product-type.application";
//!         };
//!     };
//! }
//! ```
//!
//! The reader builds a [`Node`] tree where every string remembers the byte
//! range it was read from and whether it was quoted. Rewriting splices new
//! text into those ranges only, so every other byte of the file survives
//! untouched.

use crate::error::ParseError;

/// Byte range of a scalar token in the descriptor text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    /// Whether the token was written as a quoted string.
    pub quoted: bool,
}

/// A string token and its decoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scalar {
    pub value: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    String(Scalar),
    /// `<0fbd 77...>` blocks are kept as raw hex text.
    Data(String),
    Array(Vec<Node>),
    Dict(Vec<(Scalar, Node)>),
}

impl Node {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(&s.value),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Node]> {
        match self {
            Node::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&[(Scalar, Node)]> {
        match self {
            Node::Dict(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up `key` in a dictionary node. Later duplicates win, matching
    /// how Xcode reads the file.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_dict()?
            .iter()
            .rev()
            .find(|(k, _)| k.value == key)
            .map(|(_, v)| v)
    }
}

/// Parse descriptor text into a node tree.
///
/// # Errors
///
/// Returns a [`ParseError`] positioned at the first token that cannot be
/// read, or at trailing content after the root value.
pub fn parse(source: &str) -> Result<Node, ParseError> {
    let mut reader = Reader {
        source,
        bytes: source.as_bytes(),
        pos: 0,
    };
    // Byte order mark
    if source.starts_with('\u{feff}') {
        reader.pos = 3;
    }
    let root = reader.value()?;
    reader.skip_trivia()?;
    if reader.pos < reader.bytes.len() {
        return Err(reader.error("unexpected content after root value"));
    }
    Ok(root)
}

struct Reader<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::at(self.source, self.pos, message)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(b'/') if self.bytes.get(self.pos + 1) == Some(&b'/') => {
                    while let Some(b) = self.peek() {
                        self.pos += 1;
                        if b == b'\n' {
                            break;
                        }
                    }
                }
                Some(b'/') if self.bytes.get(self.pos + 1) == Some(&b'*') => {
                    let start = self.pos;
                    match self.source[self.pos + 2..].find("*/") {
                        Some(end) => self.pos += 2 + end + 2,
                        None => {
                            self.pos = start;
                            return Err(self.error("unterminated comment"));
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), ParseError> {
        self.skip_trivia()?;
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected `{}`", byte as char)))
        }
    }

    fn value(&mut self) -> Result<Node, ParseError> {
        self.skip_trivia()?;
        match self.peek() {
            Some(b'{') => self.dict(),
            Some(b'(') => self.array(),
            Some(b'<') => self.data(),
            Some(b'"') | Some(b'\'') => self.quoted().map(Node::String),
            Some(b) if is_bare(b) => Ok(Node::String(self.bare())),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn dict(&mut self) -> Result<Node, ParseError> {
        self.pos += 1;
        let mut entries = Vec::new();
        loop {
            self.skip_trivia()?;
            match self.peek() {
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Node::Dict(entries));
                }
                None => return Err(self.error("unterminated dictionary")),
                _ => {}
            }
            let key = match self.value()? {
                Node::String(key) => key,
                _ => return Err(self.error("dictionary key must be a string")),
            };
            self.expect(b'=')?;
            let value = self.value()?;
            self.expect(b';')?;
            entries.push((key, value));
        }
    }

    fn array(&mut self) -> Result<Node, ParseError> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_trivia()?;
            match self.peek() {
                Some(b')') => {
                    self.pos += 1;
                    return Ok(Node::Array(items));
                }
                None => return Err(self.error("unterminated array")),
                _ => {}
            }
            items.push(self.value()?);
            self.skip_trivia()?;
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b')') => {}
                _ => return Err(self.error("expected `,` or `)`")),
            }
        }
    }

    fn data(&mut self) -> Result<Node, ParseError> {
        let start = self.pos;
        self.pos += 1;
        while let Some(b) = self.peek() {
            self.pos += 1;
            if b == b'>' {
                let hex: String = self.source[start + 1..self.pos - 1]
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();
                if let Some(bad) = hex.chars().find(|c| !c.is_ascii_hexdigit()) {
                    self.pos = start;
                    return Err(self.error(format!("invalid hex digit `{bad}` in data")));
                }
                return Ok(Node::Data(hex));
            }
        }
        self.pos = start;
        Err(self.error("unterminated data block"))
    }

    fn bare(&mut self) -> Scalar {
        let start = self.pos;
        while self.peek().is_some_and(is_bare) {
            // `//` and `/*` start comments even directly after a token
            if self.peek() == Some(b'/')
                && matches!(self.bytes.get(self.pos + 1), Some(b'/') | Some(b'*'))
            {
                break;
            }
            self.pos += 1;
        }
        Scalar {
            value: self.source[start..self.pos].to_string(),
            span: Span {
                start,
                end: self.pos,
                quoted: false,
            },
        }
    }

    fn quoted(&mut self) -> Result<Scalar, ParseError> {
        let start = self.pos;
        let quote = self.bytes[self.pos];
        self.pos += 1;
        let mut value = String::new();
        loop {
            let Some(b) = self.peek() else {
                self.pos = start;
                return Err(self.error("unterminated string"));
            };
            if b == quote {
                self.pos += 1;
                break;
            }
            if b == b'\\' {
                self.pos += 1;
                self.escape(&mut value)?;
                continue;
            }
            // Copy one UTF-8 character; `pos` always sits on a char boundary
            // here because escapes and quotes are ASCII.
            let ch = self.source[self.pos..]
                .chars()
                .next()
                .ok_or_else(|| self.error("invalid UTF-8"))?;
            value.push(ch);
            self.pos += ch.len_utf8();
        }
        Ok(Scalar {
            value,
            span: Span {
                start,
                end: self.pos,
                quoted: true,
            },
        })
    }

    fn escape(&mut self, out: &mut String) -> Result<(), ParseError> {
        let Some(b) = self.peek() else {
            return Err(self.error("unterminated escape"));
        };
        self.pos += 1;
        match b {
            b'n' => out.push('\n'),
            b't' => out.push('\t'),
            b'r' => out.push('\r'),
            b'a' => out.push('\u{7}'),
            b'b' => out.push('\u{8}'),
            b'f' => out.push('\u{c}'),
            b'v' => out.push('\u{b}'),
            b'U' => {
                let digits = self
                    .source
                    .get(self.pos..self.pos + 4)
                    .filter(|d| d.chars().all(|c| c.is_ascii_hexdigit()))
                    .ok_or_else(|| self.error("expected four hex digits after \\U"))?;
                let code = u32::from_str_radix(digits, 16)
                    .map_err(|_| self.error("invalid \\U escape"))?;
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                self.pos += 4;
            }
            b'0'..=b'7' => {
                let mut code = u32::from(b - b'0');
                for _ in 0..2 {
                    match self.peek() {
                        Some(d @ b'0'..=b'7') => {
                            code = code * 8 + u32::from(d - b'0');
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            _ => {
                // `\"`, `\\` and anything unknown stand for themselves
                let ch = self.source[self.pos - 1..]
                    .chars()
                    .next()
                    .ok_or_else(|| self.error("invalid UTF-8"))?;
                self.pos += ch.len_utf8() - 1;
                out.push(ch);
            }
        }
        Ok(())
    }
}

fn is_bare(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$' | b'+' | b'/' | b':' | b'.' | b'-' | b'@' | b'~') || b >= 0x80
}
