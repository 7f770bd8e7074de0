/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Related-task groups: the transitive closure of competitor links.
//!
//! Groups are disjoint and keyed by a positive id (0 means "no group" on the
//! task side).  A group with one member or fewer is deleted.

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelatedTaskGroup {
    /// Largest value a member needs to reach before values decay.
    pub max_value: u32,
    pub tasks: BTreeSet<String>,
}

/// Result of merging two groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merge {
    pub survivor: u32,
    /// Members that moved into `survivor` and must be re-pointed.
    pub moved: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RelatedGroups {
    groups: BTreeMap<u32, RelatedTaskGroup>,
}

impl RelatedGroups {
    pub fn get(&self, id: u32) -> Option<&RelatedTaskGroup> {
        self.groups.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut RelatedTaskGroup> {
        self.groups.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn remove(&mut self, id: u32) -> Option<RelatedTaskGroup> {
        self.groups.remove(&id)
    }

    /// New group holding `a` and `b`.  Ids are never reused while a larger
    /// one is alive: the new id is one past the current maximum.
    pub fn create(&mut self, a: &str, b: &str) -> u32 {
        let id = self.groups.keys().next_back().copied().unwrap_or(0) + 1;
        let group = RelatedTaskGroup {
            max_value: 0,
            tasks: [a.to_string(), b.to_string()].into_iter().collect(),
        };
        self.groups.insert(id, group);
        info!(group = id, task = a, competitor = b, "related-task group created");
        id
    }

    /// Union two groups into the larger one (ties keep `a`), keeping the
    /// larger `max_value`.
    pub fn merge(&mut self, a: u32, b: u32) -> Option<Merge> {
        if a == b {
            return None;
        }
        let len_a = self.groups.get(&a)?.tasks.len();
        let len_b = self.groups.get(&b)?.tasks.len();
        let (survivor, absorbed) = if len_a >= len_b { (a, b) } else { (b, a) };

        let old = self.groups.remove(&absorbed)?;
        let target = self.groups.get_mut(&survivor)?;
        target.max_value = target.max_value.max(old.max_value);
        let moved: Vec<String> = old.tasks.into_iter().collect();
        target.tasks.extend(moved.iter().cloned());

        info!(survivor, absorbed, moved = moved.len(), "related-task groups merged");
        Some(Merge { survivor, moved })
    }
}
