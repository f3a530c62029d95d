// Copyright 2025 Pavel Roskin
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Parsing terminfo source files
//!
//! A line that starts with a non-blank character begins a new entry and holds
//! its `|`-separated names. Indented lines hold comma-separated capabilities:
//! `name` for booleans, `name#value` for numbers and `name=value` for strings.
//!
//! Parsing is lenient. A malformed capability is dropped and reported in
//! [`Parsed::diagnostics`], the rest of the entry is kept. `use` references
//! are collected in [`TermInfo::uses`] and left for [`crate::resolve`].

use std::mem;

use crate::{
    catalog::{Catalog, Kind, StandardCatalog},
    terminfo::TermInfo,
};

const ESCAPE: u8 = 0x1b;

/// Problems found in the source, each one drops a single capability
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error("Invalid number {value:?} for capability {name}")]
    InvalidNumber { name: String, value: String },
    #[error("Unsupported escape \\{escape} in capability {name}")]
    UnsupportedEscape { name: String, escape: char },
    /// The entry ended before the capability got its value
    #[error("Capability {0} has no value")]
    DanglingName(String),
    #[error("Capability without a name")]
    EmptyName,
    /// An indented line before the first entry
    #[error("Capabilities outside of any entry")]
    NoEntry,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Reading a capability name
    Ground,
    /// Reading a number after `#`
    Number,
    /// Reading a string after `=`
    String,
    /// After `^` in a string
    Control,
    /// After `\` in a string
    Escape,
}

/// Result of parsing a source file
#[derive(Debug, Default)]
pub struct Parsed {
    /// Entries in source order, with unresolved `use` references
    pub entries: Vec<TermInfo>,
    /// Capabilities that were dropped, in the order they were found
    pub diagnostics: Vec<Error>,
}

/// Line by line parser for terminfo source
#[derive(Debug)]
pub struct Parser<'c, C: Catalog + ?Sized = StandardCatalog> {
    catalog: &'c C,
    entries: Vec<TermInfo>,
    current: Option<TermInfo>,
    state: State,
    /// Name of the number or string capability being read
    name: String,
    buffer: Vec<u8>,
    bad_escape: Option<char>,
    diagnostics: Vec<Error>,
}

impl<'c, C: Catalog + ?Sized> Parser<'c, C> {
    /// Create a parser resolving standard capabilities with `catalog`
    pub const fn new(catalog: &'c C) -> Self {
        Self {
            catalog,
            entries: Vec::new(),
            current: None,
            state: State::Ground,
            name: String::new(),
            buffer: Vec::new(),
            bad_escape: None,
            diagnostics: Vec::new(),
        }
    }

    /// Feed one line of source, without the line terminator
    pub fn parse_line(&mut self, line: &str) {
        if line.starts_with('#') || line.trim().is_empty() {
            return;
        }

        if !line.starts_with(char::is_whitespace) {
            self.finish_entry();
            let names = line.split_once(',').map_or(line, |(names, _)| names);
            self.current = Some(TermInfo::new(names.split('|')));
            return;
        }

        if self.current.is_none() {
            self.report(Error::NoEntry);
            return;
        }

        let text = line.trim().as_bytes();
        let mut pos = 0;
        while pos < text.len() {
            let c = text[pos];
            match self.state {
                State::Ground => match c {
                    b'=' => self.begin_value(State::String),
                    b'#' => self.begin_value(State::Number),
                    b',' => self.add_bool(),
                    b' ' => {}
                    _ => self.buffer.push(c),
                },
                State::Number => match c {
                    b',' => self.add_number(),
                    _ => self.buffer.push(c),
                },
                State::String => match c {
                    b'\\' => self.state = State::Escape,
                    b'^' => self.state = State::Control,
                    b' ' => {}
                    b',' => self.add_string(),
                    _ => self.buffer.push(c),
                },
                State::Control => {
                    self.buffer.push(c ^ 0x40);
                    self.state = State::String;
                }
                State::Escape => {
                    pos += self.escape(&text[pos..]);
                    self.state = State::String;
                }
            }
            pos += 1;
        }
    }

    /// Finish parsing and return all entries
    pub fn finish(mut self) -> Parsed {
        self.finish_entry();
        Parsed {
            entries: self.entries,
            diagnostics: self.diagnostics,
        }
    }

    fn finish_entry(&mut self) {
        if self.state != State::Ground || !self.buffer.is_empty() {
            let name = if self.state == State::Ground {
                String::from_utf8_lossy(&self.buffer).into_owned()
            } else {
                mem::take(&mut self.name)
            };
            self.report(Error::DanglingName(name));
        }
        self.reset();
        if let Some(terminfo) = self.current.take() {
            self.entries.push(terminfo);
        }
    }

    fn reset(&mut self) {
        self.state = State::Ground;
        self.name.clear();
        self.buffer.clear();
        self.bad_escape = None;
    }

    fn report(&mut self, err: Error) {
        let entry = self.current.as_ref().and_then(TermInfo::name).unwrap_or_default();
        tracing::warn!(entry, %err, "skipping capability");
        self.diagnostics.push(err);
    }

    fn begin_value(&mut self, state: State) {
        self.name = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        self.state = state;
    }

    /// Handle the character after a backslash
    ///
    /// `rest` starts at that character. Returns the number of additional
    /// characters consumed.
    fn escape(&mut self, rest: &[u8]) -> usize {
        let c = rest[0];
        match c {
            b'E' | b'e' => self.buffer.push(ESCAPE),
            b'0'..=b'7' => {
                if let [_, d1 @ b'0'..=b'7', d2 @ b'0'..=b'7', ..] = *rest {
                    let value = (u32::from(c - b'0') << 6)
                        | (u32::from(d1 - b'0') << 3)
                        | u32::from(d2 - b'0');
                    self.buffer.push(value as u8);
                    return 2;
                }
                if c == b'0' {
                    self.buffer.push(0);
                }
            }
            b'n' => self.buffer.push(b'\n'),
            b'r' => self.buffer.push(b'\r'),
            b't' => self.buffer.push(b'\t'),
            b'b' => self.buffer.push(0x08),
            b'f' => self.buffer.push(0x0c),
            b's' => self.buffer.push(b' '),
            b',' => self.buffer.push(b','),
            b'l' => self.bad_escape = Some('l'),
            _ => self.buffer.push(c),
        }
        0
    }

    fn add_bool(&mut self) {
        let name = String::from_utf8_lossy(&self.buffer).into_owned();
        self.reset();
        if name.is_empty() {
            self.report(Error::EmptyName);
            return;
        }
        let Some(terminfo) = self.current.as_mut() else {
            return;
        };
        match self.catalog.index(Kind::Bool, &name) {
            Some(index) => {
                terminfo.bools.insert(index);
            }
            None => {
                terminfo.ext_bools.set(&name, true);
            }
        }
    }

    fn add_number(&mut self) {
        let name = mem::take(&mut self.name);
        let value = String::from_utf8_lossy(&self.buffer).into_owned();
        self.reset();
        if name.is_empty() {
            self.report(Error::EmptyName);
            return;
        }
        let Some(number) = parse_number(&value) else {
            self.report(Error::InvalidNumber { name, value });
            return;
        };
        let Some(terminfo) = self.current.as_mut() else {
            return;
        };
        match self.catalog.index(Kind::Number, &name) {
            Some(index) => {
                terminfo.numbers.insert(index, number);
            }
            None => {
                terminfo.ext_numbers.set(&name, number);
            }
        }
    }

    fn add_string(&mut self) {
        let name = mem::take(&mut self.name);
        let value = mem::take(&mut self.buffer);
        let bad_escape = self.bad_escape;
        self.reset();
        if name.is_empty() {
            self.report(Error::EmptyName);
            return;
        }
        if let Some(escape) = bad_escape {
            self.report(Error::UnsupportedEscape { name, escape });
            return;
        }
        let Some(terminfo) = self.current.as_mut() else {
            return;
        };
        if name == "use" {
            terminfo.uses.push(String::from_utf8_lossy(&value).into_owned());
            return;
        }
        match self.catalog.index(Kind::String, &name) {
            Some(index) => {
                terminfo.strings.insert(index, value);
            }
            None => {
                terminfo.ext_strings.set(&name, value);
            }
        }
    }
}

/// Parse a decimal number, or a hexadecimal one with the `0x` prefix
fn parse_number(text: &str) -> Option<i32> {
    let (digits, radix) = match text.strip_prefix("0x") {
        Some(hex) => (hex, 16),
        None => (text, 10),
    };
    if digits.starts_with('+') {
        return None;
    }
    let number = u32::from_str_radix(digits, radix).ok()?;
    i32::try_from(number).ok()
}

/// Parse terminfo source using a custom catalog
pub fn parse_with<C: Catalog + ?Sized>(catalog: &C, source: &str) -> Parsed {
    let mut parser = Parser::new(catalog);
    for line in source.split('\n') {
        parser.parse_line(line);
    }
    parser.finish()
}

/// Parse terminfo source using the standard catalog
///
/// Returns the entries in source order. `use` references are not resolved.
pub fn parse(source: &str) -> Vec<TermInfo> {
    parse_with(&StandardCatalog, source).entries
}
