// Copyright 2025 Pavel Roskin
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Lookup of terminal entries by any of their names

use std::{collections::HashMap, sync::Arc};

use crate::{resolve::resolve_uses, source, terminfo::TermInfo};

/// Entries indexed by every one of their names
///
/// All names of an entry share the same [`Arc`].
#[derive(Clone, Debug, Default)]
pub struct Registry {
    entries: HashMap<String, Arc<TermInfo>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse terminfo source, resolve `use` references and register all entries
    pub fn from_source(source: &str) -> Self {
        let mut entries = source::parse(source);
        resolve_uses(&mut entries);
        entries.into_iter().collect()
    }

    /// Register `terminfo` under each of its names
    ///
    /// A name already registered for another entry is silently taken over.
    pub fn set(&mut self, terminfo: impl Into<Arc<TermInfo>>) {
        let terminfo = terminfo.into();
        for name in &terminfo.names {
            self.entries.insert(name.clone(), Arc::clone(&terminfo));
        }
    }

    /// Find the entry with the given name
    pub fn find(&self, name: &str) -> Option<&Arc<TermInfo>> {
        self.entries.get(name)
    }

    /// Number of registered names
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over registered names in arbitrary order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl FromIterator<TermInfo> for Registry {
    fn from_iter<I: IntoIterator<Item = TermInfo>>(iter: I) -> Self {
        let mut registry = Self::new();
        for terminfo in iter {
            registry.set(terminfo);
        }
        registry
    }
}
