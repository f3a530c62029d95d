// Copyright 2025 Pavel Roskin
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Resolving `use` references between source entries

use std::mem;

use crate::terminfo::TermInfo;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Pending,
    InProgress,
    Done,
}

/// Merge capabilities of the referenced entries into each entry
///
/// References are looked up by exact name among `entries` only. Referenced
/// entries are resolved first, so chains are flattened. A capability already
/// present in an entry is never overridden, neither by a referenced entry nor
/// by a later reference in the same list.
///
/// A reference to an unknown name is logged and stays in [`TermInfo::uses`].
/// A circular reference is logged and dropped. Resolved references are
/// removed too, so resolving again is a no-op.
pub fn resolve_uses(entries: &mut [TermInfo]) {
    let mut marks = vec![Mark::Pending; entries.len()];
    for index in 0..entries.len() {
        resolve_entry(entries, index, &mut marks);
    }
}

fn find_entry(entries: &[TermInfo], name: &str) -> Option<usize> {
    entries.iter().position(|entry| entry.has_name(name))
}

fn resolve_entry(entries: &mut [TermInfo], index: usize, marks: &mut [Mark]) {
    if marks[index] != Mark::Pending || entries[index].uses.is_empty() {
        return;
    }
    marks[index] = Mark::InProgress;

    let uses = mem::take(&mut entries[index].uses);
    let mut unresolved = Vec::new();
    for name in uses {
        let entry = entries[index].name().unwrap_or_default();
        let Some(source) = find_entry(entries, &name) else {
            tracing::warn!(entry, uses = %name, "referenced entry not found");
            unresolved.push(name);
            continue;
        };
        if marks[source] == Mark::InProgress {
            tracing::warn!(entry, uses = %name, "circular use reference");
            continue;
        }
        resolve_entry(entries, source, marks);
        let (target, source) = target_and_source(entries, index, source);
        merge(target, source);
    }

    entries[index].uses = unresolved;
    marks[index] = Mark::Done;
}

fn target_and_source(
    entries: &mut [TermInfo],
    target: usize,
    source: usize,
) -> (&mut TermInfo, &TermInfo) {
    if target < source {
        let (head, tail) = entries.split_at_mut(source);
        (&mut head[target], &tail[0])
    } else {
        let (head, tail) = entries.split_at_mut(target);
        (&mut tail[0], &head[source])
    }
}

/// Copy capabilities missing in `target` from `source`
fn merge(target: &mut TermInfo, source: &TermInfo) {
    target.bools.extend(&source.bools);
    for (index, value) in &source.numbers {
        target.numbers.entry(*index).or_insert(*value);
    }
    for (index, value) in &source.strings {
        target.strings.entry(*index).or_insert_with(|| value.clone());
    }
    for (name, value) in source.ext_bools.iter() {
        target.ext_bools.set_if_absent(name, *value);
    }
    for (name, value) in source.ext_numbers.iter() {
        target.ext_numbers.set_if_absent(name, *value);
    }
    for (name, value) in source.ext_strings.iter() {
        target.ext_strings.set_if_absent_with(name, || value.clone());
    }
}
