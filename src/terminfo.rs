// Copyright 2025 Pavel Roskin
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Capability model shared by the compiled and the source formats

use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::{Catalog, Kind};

/// Value of a single capability
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Value<'a> {
    Bool(bool),
    Number(i32),
    String(&'a [u8]),
}

/// Extended (non-standard) capabilities of one kind
///
/// The index of a capability is the position where its name was first seen.
/// Indices are private to one entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Extended<T> {
    entries: Vec<(String, T)>,
}

impl<T> Default for Extended<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> Extended<T> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(entry, _)| entry == name)
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.index_of(name).map(|index| &self.entries[index].1)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|(name, _)| name.as_str())
    }

    pub fn value(&self, index: usize) -> Option<&T> {
        self.entries.get(index).map(|(_, value)| value)
    }

    /// Store `value` under `name`, returning the index of the capability
    ///
    /// A name seen before keeps its index and gets the new value.
    pub fn set(&mut self, name: &str, value: T) -> usize {
        if let Some(index) = self.index_of(name) {
            self.entries[index].1 = value;
            index
        } else {
            self.entries.push((name.to_owned(), value));
            self.entries.len() - 1
        }
    }

    /// Store `value` under `name` unless the name already has a value
    ///
    /// Returns `true` if the value was stored.
    pub fn set_if_absent(&mut self, name: &str, value: T) -> bool {
        self.set_if_absent_with(name, || value)
    }

    /// Like [`Self::set_if_absent`], computing the value only when stored
    pub fn set_if_absent_with(&mut self, name: &str, value: impl FnOnce() -> T) -> bool {
        if self.index_of(name).is_some() {
            return false;
        }
        self.entries.push((name.to_owned(), value()));
        true
    }

    /// Iterate over `(name, value)` pairs in index order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// Capabilities of one terminal type
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TermInfo {
    /// Terminal names, the first one is canonical
    pub names: Vec<String>,
    /// Indices of the standard boolean capabilities that are set
    pub bools: BTreeSet<usize>,
    pub numbers: BTreeMap<usize, i32>,
    pub strings: BTreeMap<usize, Vec<u8>>,
    pub ext_bools: Extended<bool>,
    pub ext_numbers: Extended<i32>,
    pub ext_strings: Extended<Vec<u8>>,
    /// Names of entries to inherit from, not yet resolved
    pub uses: Vec<String>,
}

impl TermInfo {
    /// Create an entry without capabilities
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Canonical name of the terminal
    pub fn name(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }

    /// Check whether `name` is one of the names of the terminal
    pub fn has_name(&self, name: &str) -> bool {
        self.names.iter().any(|alias| alias == name)
    }

    /// Look up a capability by name, standard capabilities first
    pub fn get<C: Catalog + ?Sized>(
        &self,
        catalog: &C,
        kind: Kind,
        name: &str,
    ) -> Option<Value<'_>> {
        let index = catalog.index(kind, name);
        match kind {
            Kind::Bool => match index {
                Some(index) if self.bools.contains(&index) => Some(Value::Bool(true)),
                _ => self.ext_bools.get(name).copied().map(Value::Bool),
            },
            Kind::Number => index
                .and_then(|index| self.numbers.get(&index))
                .or_else(|| self.ext_numbers.get(name))
                .copied()
                .map(Value::Number),
            Kind::String => index
                .and_then(|index| self.strings.get(&index))
                .or_else(|| self.ext_strings.get(name))
                .map(|value| Value::String(value.as_slice())),
        }
    }

    /// Iterate over all capabilities with their names
    ///
    /// Booleans come first, then numbers, then strings. Within each kind,
    /// standard capabilities precede extended ones. Standard capabilities
    /// unknown to `catalog` are skipped.
    pub fn capabilities<'a, C: Catalog + ?Sized>(
        &'a self,
        catalog: &'a C,
    ) -> impl Iterator<Item = (&'a str, Value<'a>)> {
        let bools = self
            .bools
            .iter()
            .filter_map(move |index| catalog.name(Kind::Bool, *index))
            .map(|name| (name, Value::Bool(true)))
            .chain(
                self.ext_bools
                    .iter()
                    .map(|(name, value)| (name, Value::Bool(*value))),
            );
        let numbers = self
            .numbers
            .iter()
            .filter_map(move |(index, value)| {
                catalog
                    .name(Kind::Number, *index)
                    .map(|name| (name, Value::Number(*value)))
            })
            .chain(
                self.ext_numbers
                    .iter()
                    .map(|(name, value)| (name, Value::Number(*value))),
            );
        let strings = self
            .strings
            .iter()
            .filter_map(move |(index, value)| {
                catalog
                    .name(Kind::String, *index)
                    .map(|name| (name, Value::String(value.as_slice())))
            })
            .chain(
                self.ext_strings
                    .iter()
                    .map(|(name, value)| (name, Value::String(value.as_slice()))),
            );
        bools.chain(numbers).chain(strings)
    }
}
