//! Single-pass scanner that closes a truncated JSON prefix
//!
//! The scanner walks the input once, copying everything that is structurally
//! sound into an output buffer while tracking a stack of open containers and
//! what each one expects next. Whatever the input was in the middle of when it
//! ran out (a string, a key, a literal, a nested container) is then closed off
//! so that the output parses.
//!
//! Insignificant whitespace is dropped from the output, which also takes care
//! of raw newlines between tokens. Raw control characters inside strings are
//! replaced with a space.

use tracing::debug;

use crate::literal;

/// The kind of an open container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

impl Container {
    fn closer(self) -> char {
        match self {
            Container::Object => '}',
            Container::Array => ']',
        }
    }
}

/// What the innermost container expects next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// Object key or closer
    Key,
    /// Colon after a complete key
    Colon,
    /// A value (after a colon, `[`, or an array comma)
    Value,
    /// Comma or closer after a complete value
    Separator,
}

#[derive(Debug)]
struct Frame {
    container: Container,
    expect: Expect,
}

/// Escape state inside a string literal
#[derive(Debug, Clone, Copy)]
enum Escape {
    None,
    /// A backslash was seen; `start` is its output offset
    Pending { start: usize },
    /// Inside `\uXXXX`
    Unicode { start: usize, digits: u8, value: u32 },
}

/// The token currently being scanned
#[derive(Debug, Clone, Copy)]
enum Token {
    None,
    Str { key: bool, escape: Escape },
    /// Unquoted object key; the opening quote is already in the output
    BareKey,
    /// Literal or number starting at this output offset
    Bare { start: usize },
}

/// Repairs one input string; consumed by [`Scanner::finish`]
#[derive(Debug)]
pub struct Scanner {
    out: String,
    stack: Vec<Frame>,
    token: Token,
    /// A comma was read but not yet written; dropped if a closer follows
    pending_comma: bool,
    /// Output offset of a `\uD8xx` escape still waiting for its low half
    high_surrogate: Option<usize>,
    started: bool,
    done: bool,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            stack: Vec::new(),
            token: Token::None,
            pending_comma: false,
            high_surrogate: None,
            started: false,
            done: false,
        }
    }

    /// Scan `input` and return the repaired text
    pub fn repair(input: &str) -> String {
        let mut scanner = Self::new();
        scanner.feed(input);
        scanner.finish()
    }

    /// Feed more input
    pub fn feed(&mut self, input: &str) {
        for c in input.chars() {
            if self.done {
                break;
            }
            self.step(c);
        }
    }

    /// Whether an opening `{` or `[` has been read yet
    pub fn found_container(&self) -> bool {
        self.started
    }

    /// Close everything that is still open and return the output
    pub fn finish(mut self) -> String {
        debug!(depth = self.stack.len(), token = ?self.token, "finish: called");
        if !self.started {
            debug!("finish: no container found, returning empty object");
            return "{}".to_string();
        }

        match self.token {
            Token::Str { key, escape } => {
                self.drop_incomplete_escape(escape);
                self.out.push('"');
                self.token = Token::None;
                if key {
                    debug!("finish: closed truncated key");
                    self.out.push_str(":null");
                }
                self.set_expect(Expect::Separator);
            }
            Token::BareKey => {
                debug!("finish: closed truncated bare key");
                self.out.push_str("\":null");
                self.token = Token::None;
                self.set_expect(Expect::Separator);
            }
            Token::Bare { start } => self.end_bare(start),
            Token::None => {}
        }

        while let Some(frame) = self.stack.pop() {
            self.complete_dangling(&frame);
            self.out.push(frame.container.closer());
        }
        self.out
    }

    fn step(&mut self, c: char) {
        match self.token {
            Token::Str { key, escape } => self.step_string(c, key, escape),
            Token::BareKey => self.step_bare_key(c),
            Token::Bare { start } => {
                if is_delimiter(c) {
                    self.end_bare(start);
                    self.step_structural(c);
                } else {
                    self.out.push(c);
                }
            }
            Token::None => self.step_structural(c),
        }
    }

    fn step_string(&mut self, c: char, key: bool, escape: Escape) {
        match escape {
            Escape::Pending { start } => match c {
                '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' => {
                    self.clear_lone_high_surrogate();
                    self.out.push(c);
                    self.token = Token::Str {
                        key,
                        escape: Escape::None,
                    };
                }
                'u' => {
                    self.out.push(c);
                    self.token = Token::Str {
                        key,
                        escape: Escape::Unicode {
                            start,
                            digits: 0,
                            value: 0,
                        },
                    };
                }
                _ => {
                    // Unknown escape: keep the backslash as a literal character
                    debug!(%c, "step_string: invalid escape");
                    self.clear_lone_high_surrogate();
                    self.out.push('\\');
                    self.token = Token::Str {
                        key,
                        escape: Escape::None,
                    };
                    self.push_string_char(c, key);
                }
            },
            Escape::Unicode { start, digits, value } => match c.to_digit(16) {
                Some(d) => {
                    self.out.push(c);
                    let value = value * 16 + d;
                    if digits + 1 < 4 {
                        self.token = Token::Str {
                            key,
                            escape: Escape::Unicode {
                                start,
                                digits: digits + 1,
                                value,
                            },
                        };
                    } else {
                        self.token = Token::Str {
                            key,
                            escape: Escape::None,
                        };
                        self.finish_unicode(start, value);
                    }
                }
                None => {
                    debug!(%c, "step_string: malformed unicode escape dropped");
                    self.out.truncate(start);
                    self.token = Token::Str {
                        key,
                        escape: Escape::None,
                    };
                    self.push_string_char(c, key);
                }
            },
            Escape::None => self.push_string_char(c, key),
        }
    }

    fn push_string_char(&mut self, c: char, key: bool) {
        match c {
            '"' => {
                self.clear_lone_high_surrogate();
                self.out.push('"');
                self.token = Token::None;
                self.set_expect(if key { Expect::Colon } else { Expect::Separator });
            }
            '\\' => {
                let start = self.out.len();
                self.out.push('\\');
                self.token = Token::Str {
                    key,
                    escape: Escape::Pending { start },
                };
            }
            c if c.is_control() => {
                self.clear_lone_high_surrogate();
                self.out.push(' ');
            }
            c => {
                self.clear_lone_high_surrogate();
                self.out.push(c);
            }
        }
    }

    /// A `\uXXXX` escape just completed at `start`
    fn finish_unicode(&mut self, start: usize, value: u32) {
        match value {
            0xD800..=0xDBFF => {
                self.clear_lone_high_surrogate();
                self.high_surrogate = Some(start);
            }
            0xDC00..=0xDFFF => {
                if self.high_surrogate.take().is_none() {
                    debug!("finish_unicode: lone low surrogate replaced");
                    self.out.replace_range(start..start + 6, "\\ufffd");
                }
            }
            _ => self.clear_lone_high_surrogate(),
        }
    }

    /// A high surrogate was followed by something other than its low half
    fn clear_lone_high_surrogate(&mut self) {
        if let Some(start) = self.high_surrogate.take() {
            debug!("clear_lone_high_surrogate: replaced with U+FFFD");
            self.out.replace_range(start..start + 6, "\\ufffd");
        }
    }

    /// Drop a half-written escape (and a high surrogate still waiting for its pair)
    fn drop_incomplete_escape(&mut self, escape: Escape) {
        match escape {
            Escape::Pending { start } | Escape::Unicode { start, .. } => {
                debug!("drop_incomplete_escape: truncating dangling escape");
                self.out.truncate(start);
            }
            Escape::None => {}
        }
        if let Some(start) = self.high_surrogate.take() {
            self.out.truncate(start);
        }
    }

    fn step_bare_key(&mut self, c: char) {
        if is_bare_key_char(c) {
            self.out.push(c);
            return;
        }
        self.out.push('"');
        self.token = Token::None;
        self.set_expect(Expect::Colon);
        self.step_structural(c);
    }

    fn step_structural(&mut self, c: char) {
        if c.is_whitespace() {
            return;
        }

        let Some(expect) = self.stack.last().map(|f| f.expect) else {
            self.step_top_level(c);
            return;
        };

        match c {
            '{' | '[' if expect == Expect::Value => {
                self.emit_pending_comma();
                self.open(c);
            }
            '}' | ']' => self.close(c),
            ',' => self.comma(expect),
            ':' if expect == Expect::Colon => {
                self.out.push(':');
                self.set_expect(Expect::Value);
            }
            '"' if expect == Expect::Key || expect == Expect::Value => {
                self.emit_pending_comma();
                self.out.push('"');
                self.token = Token::Str {
                    key: expect == Expect::Key,
                    escape: Escape::None,
                };
            }
            c if expect == Expect::Key && is_bare_key_char(c) => {
                self.emit_pending_comma();
                self.out.push('"');
                self.out.push(c);
                self.token = Token::BareKey;
            }
            c if expect == Expect::Value && !is_delimiter(c) => {
                self.emit_pending_comma();
                let start = self.out.len();
                self.out.push(c);
                self.token = Token::Bare { start };
            }
            _ => {
                debug!(%c, ?expect, "step_structural: ignoring unexpected character");
            }
        }
    }

    /// Before the first container: skip prose until `{` or `[`
    fn step_top_level(&mut self, c: char) {
        if matches!(c, '{' | '[') {
            debug!(%c, "step_top_level: document starts");
            self.started = true;
            self.open(c);
        }
    }

    fn open(&mut self, c: char) {
        let (container, expect) = if c == '{' {
            (Container::Object, Expect::Key)
        } else {
            (Container::Array, Expect::Value)
        };
        // The parent's value is now this container
        self.set_expect(Expect::Separator);
        self.out.push(c);
        self.stack.push(Frame { container, expect });
    }

    fn close(&mut self, c: char) {
        let matches = self.stack.last().is_some_and(|f| f.container.closer() == c);
        if !matches {
            debug!(%c, "close: ignoring stray closer");
            return;
        }

        self.pending_comma = false;
        if let Some(frame) = self.stack.pop() {
            self.complete_dangling(&frame);
            self.out.push(c);
        }

        if self.stack.is_empty() {
            debug!("close: top-level container closed");
            self.done = true;
        } else {
            self.set_expect(Expect::Separator);
        }
    }

    fn comma(&mut self, expect: Expect) {
        let container = match self.stack.last() {
            Some(frame) => frame.container,
            None => return,
        };
        match expect {
            Expect::Separator => {}
            Expect::Colon => self.out.push_str(":null"),
            Expect::Value if container == Container::Object => self.out.push_str("null"),
            Expect::Key | Expect::Value => {
                debug!(?expect, "comma: ignoring comma with nothing before it");
                return;
            }
        }
        self.pending_comma = true;
        self.set_expect(match container {
            Container::Object => Expect::Key,
            Container::Array => Expect::Value,
        });
    }

    /// Fill in a value for an object left waiting after a key or colon
    fn complete_dangling(&mut self, frame: &Frame) {
        if frame.container != Container::Object {
            return;
        }
        match frame.expect {
            Expect::Colon => {
                debug!("complete_dangling: key without colon");
                self.out.push_str(":null");
            }
            Expect::Value => {
                debug!("complete_dangling: colon without value");
                self.out.push_str("null");
            }
            Expect::Key | Expect::Separator => {}
        }
    }

    fn end_bare(&mut self, start: usize) {
        let settled = literal::settle(&self.out[start..]).into_owned();
        self.out.truncate(start);
        self.out.push_str(&settled);
        self.token = Token::None;
        self.set_expect(Expect::Separator);
    }

    fn emit_pending_comma(&mut self) {
        if self.pending_comma {
            self.out.push(',');
            self.pending_comma = false;
        }
    }

    fn set_expect(&mut self, expect: Expect) {
        if let Some(frame) = self.stack.last_mut() {
            frame.expect = expect;
        }
    }
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | ':' | '{' | '}' | '[' | ']' | '"')
}

fn is_bare_key_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '-')
}
