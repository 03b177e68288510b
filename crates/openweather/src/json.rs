//! Bounded JSON tokenizer.
//!
//! A single forward pass turns the input into a flat list of [`JsonToken`]s
//! holding byte offsets into the input; nothing is copied or decoded. The
//! number of tokens is capped so a large document fails instead of growing
//! without bound. Containers are tracked with an explicit stack, never by
//! recursion.

use thiserror::Error;

/// Token classes produced by the tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Object,
    Array,
    /// String contents, quotes excluded from the offsets.
    String,
    Number,
    /// `true`, `false` or `null`.
    Primitive,
}

/// One token: its kind, `start..end` byte range in the input and child count.
///
/// For objects `size` is the number of keys, for arrays the number of
/// elements, for a string used as an object key it is 1 once its value has
/// been seen, and 0 otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonToken {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    pub size: usize,
}

impl JsonToken {
    /// The raw bytes this token covers.
    pub fn text<'a>(&self, input: &'a [u8]) -> &'a [u8] {
        &input[self.start..self.end]
    }

    /// Whether this is a string token acting as an object key.
    pub fn is_key(&self) -> bool {
        self.kind == TokenKind::String && self.size == 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenizeError {
    #[error("more than {max} JSON tokens")]
    TokenBudget { max: usize },
    #[error("unexpected byte at offset {offset}")]
    Invalid { offset: usize },
    #[error("JSON document ends early")]
    Incomplete,
}

/// Default token budget.
pub const DEFAULT_MAX_TOKENS: usize = 100;

/// Tokenize `input` into at most `max_tokens` tokens.
///
/// The input must hold exactly one JSON value, optionally surrounded by
/// whitespace.
pub fn tokenize(input: &[u8], max_tokens: usize) -> Result<Vec<JsonToken>, TokenizeError> {
    Tokenizer::new(input, max_tokens).run()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// Just after `{`.
    KeyOrClose,
    /// After `,` inside an object.
    Key,
    Colon,
    Value,
    /// Just after `[`.
    ValueOrClose,
    CommaOrClose,
}

#[derive(Debug)]
struct Frame {
    token: usize,
    object: bool,
    key: Option<usize>,
    expect: Expect,
}

struct Tokenizer<'a> {
    input: &'a [u8],
    max_tokens: usize,
    tokens: Vec<JsonToken>,
    stack: Vec<Frame>,
    pos: usize,
    root_done: bool,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a [u8], max_tokens: usize) -> Self {
        Self {
            input,
            max_tokens,
            tokens: Vec::new(),
            stack: Vec::new(),
            pos: 0,
            root_done: false,
        }
    }

    fn run(mut self) -> Result<Vec<JsonToken>, TokenizeError> {
        while self.pos < self.input.len() {
            let c = self.input[self.pos];
            if matches!(c, b' ' | b'\t' | b'\r' | b'\n') {
                self.pos += 1;
                continue;
            }
            if self.root_done {
                return Err(self.invalid());
            }

            match c {
                b'{' | b'[' => self.open(c == b'{')?,
                b'}' | b']' => self.close(c == b'}')?,
                b'"' => self.string()?,
                b':' => {
                    let frame = self.stack.last_mut().ok_or(TokenizeError::Invalid {
                        offset: self.pos,
                    })?;
                    if frame.expect != Expect::Colon {
                        return Err(TokenizeError::Invalid { offset: self.pos });
                    }
                    frame.expect = Expect::Value;
                    self.pos += 1;
                }
                b',' => {
                    let frame = self.stack.last_mut().ok_or(TokenizeError::Invalid {
                        offset: self.pos,
                    })?;
                    if frame.expect != Expect::CommaOrClose {
                        return Err(TokenizeError::Invalid { offset: self.pos });
                    }
                    frame.expect = if frame.object {
                        Expect::Key
                    } else {
                        Expect::Value
                    };
                    self.pos += 1;
                }
                b'-' | b'0'..=b'9' => self.number()?,
                b't' | b'f' | b'n' => self.primitive()?,
                _ => return Err(self.invalid()),
            }
        }

        if !self.root_done {
            return Err(TokenizeError::Incomplete);
        }
        Ok(self.tokens)
    }

    fn invalid(&self) -> TokenizeError {
        TokenizeError::Invalid { offset: self.pos }
    }

    fn push(&mut self, kind: TokenKind, start: usize, end: usize) -> Result<usize, TokenizeError> {
        if self.tokens.len() >= self.max_tokens {
            return Err(TokenizeError::TokenBudget {
                max: self.max_tokens,
            });
        }
        self.tokens.push(JsonToken {
            kind,
            start,
            end,
            size: 0,
        });
        Ok(self.tokens.len() - 1)
    }

    /// Account for a value starting at the current position in its parent.
    fn begin_value(&mut self) -> Result<(), TokenizeError> {
        let offset = self.pos;
        let Some(frame) = self.stack.last_mut() else {
            return Ok(());
        };
        match (frame.object, frame.expect) {
            (true, Expect::Value) => {
                if let Some(key) = frame.key.take() {
                    self.tokens[key].size = 1;
                }
            }
            (false, Expect::Value | Expect::ValueOrClose) => {
                self.tokens[frame.token].size += 1;
            }
            _ => return Err(TokenizeError::Invalid { offset }),
        }
        frame.expect = Expect::CommaOrClose;
        Ok(())
    }

    /// Mark the root finished when a value completes at depth zero.
    fn end_value(&mut self) {
        if self.stack.is_empty() {
            self.root_done = true;
        }
    }

    fn open(&mut self, object: bool) -> Result<(), TokenizeError> {
        self.begin_value()?;
        let kind = if object {
            TokenKind::Object
        } else {
            TokenKind::Array
        };
        let token = self.push(kind, self.pos, self.pos)?;
        self.stack.push(Frame {
            token,
            object,
            key: None,
            expect: if object {
                Expect::KeyOrClose
            } else {
                Expect::ValueOrClose
            },
        });
        self.pos += 1;
        Ok(())
    }

    fn close(&mut self, object: bool) -> Result<(), TokenizeError> {
        let frame = self.stack.last().ok_or_else(|| self.invalid())?;
        let allowed = match (frame.object, object) {
            (true, true) => matches!(frame.expect, Expect::KeyOrClose | Expect::CommaOrClose),
            (false, false) => matches!(frame.expect, Expect::ValueOrClose | Expect::CommaOrClose),
            _ => false,
        };
        if !allowed {
            return Err(self.invalid());
        }
        self.tokens[frame.token].end = self.pos + 1;
        self.stack.pop();
        self.pos += 1;
        self.end_value();
        Ok(())
    }

    fn string(&mut self) -> Result<(), TokenizeError> {
        let as_key = match self.stack.last() {
            Some(frame) => {
                frame.object && matches!(frame.expect, Expect::KeyOrClose | Expect::Key)
            }
            None => false,
        };
        if !as_key {
            self.begin_value()?;
        }

        let start = self.pos + 1;
        let mut i = start;
        loop {
            match self.input.get(i) {
                None => return Err(TokenizeError::Incomplete),
                Some(b'"') => break,
                Some(b'\\') => {
                    i += 1;
                    match self.input.get(i) {
                        None => return Err(TokenizeError::Incomplete),
                        Some(b'"' | b'\\' | b'/' | b'b' | b'f' | b'n' | b'r' | b't') => i += 1,
                        Some(b'u') => {
                            for _ in 0..4 {
                                i += 1;
                                match self.input.get(i) {
                                    None => return Err(TokenizeError::Incomplete),
                                    Some(h) if h.is_ascii_hexdigit() => {}
                                    Some(_) => return Err(TokenizeError::Invalid { offset: i }),
                                }
                            }
                            i += 1;
                        }
                        Some(_) => return Err(TokenizeError::Invalid { offset: i }),
                    }
                }
                Some(c) if *c < 0x20 => return Err(TokenizeError::Invalid { offset: i }),
                Some(_) => i += 1,
            }
        }

        let token = self.push(TokenKind::String, start, i)?;
        self.pos = i + 1;

        if as_key {
            if let Some(frame) = self.stack.last_mut() {
                frame.key = Some(token);
                frame.expect = Expect::Colon;
                let object = frame.token;
                self.tokens[object].size += 1;
            }
        } else {
            self.end_value();
        }
        Ok(())
    }

    fn number(&mut self) -> Result<(), TokenizeError> {
        self.begin_value()?;
        let start = self.pos;
        let end = self.scan(|c| matches!(c, b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E'));
        let valid = std::str::from_utf8(&self.input[start..end])
            .ok()
            .is_some_and(|text| text.parse::<f64>().is_ok());
        if !valid {
            return Err(TokenizeError::Invalid { offset: start });
        }
        self.push(TokenKind::Number, start, end)?;
        self.pos = end;
        self.end_value();
        Ok(())
    }

    fn primitive(&mut self) -> Result<(), TokenizeError> {
        self.begin_value()?;
        let start = self.pos;
        let end = self.scan(|c| c.is_ascii_alphabetic());
        if !matches!(&self.input[start..end], b"true" | b"false" | b"null") {
            return Err(TokenizeError::Invalid { offset: start });
        }
        self.push(TokenKind::Primitive, start, end)?;
        self.pos = end;
        self.end_value();
        Ok(())
    }

    fn scan(&self, accept: impl Fn(u8) -> bool) -> usize {
        self.input[self.pos..]
            .iter()
            .position(|&c| !accept(c))
            .map_or(self.input.len(), |n| self.pos + n)
    }
}
