//! The meeting ledger: how many times each unordered pair of people has met.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{GroupResult, Person, PersonId};

/// Symmetric pair counts. Absent pairs have met zero times and self-pairs are
/// never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    counts: HashMap<(PersonId, PersonId), u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub person1: PersonId,
    pub person2: PersonId,
    pub count: u32,
}

fn key(a: &PersonId, b: &PersonId) -> Option<(PersonId, PersonId)> {
    match a.cmp(b) {
        std::cmp::Ordering::Less => Some((a.clone(), b.clone())),
        std::cmp::Ordering::Greater => Some((b.clone(), a.clone())),
        std::cmp::Ordering::Equal => None,
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a ledger from a log of past pairings, one entry per meeting.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (PersonId, PersonId)>,
    {
        let mut ledger = Ledger::new();
        for (a, b) in pairs {
            ledger.record(&a, &b);
        }
        ledger
    }

    pub fn count(&self, a: &PersonId, b: &PersonId) -> u32 {
        key(a, b)
            .and_then(|k| self.counts.get(&k).copied())
            .unwrap_or(0)
    }

    /// Past meetings summed over every pair of `people`, saturating at
    /// `u32::MAX`.
    pub fn score(&self, people: &[Person]) -> u32 {
        let mut total: u32 = 0;
        for (i, a) in people.iter().enumerate() {
            for b in &people[i + 1..] {
                total = total.saturating_add(self.count(&a.id, &b.id));
            }
        }
        total
    }

    /// Adds one meeting between `a` and `b`. A self-pair is ignored and a
    /// count stops at `u32::MAX`.
    pub fn record(&mut self, a: &PersonId, b: &PersonId) {
        if let Some(k) = key(a, b) {
            let count = self.counts.entry(k).or_insert(0);
            *count = count.saturating_add(1);
        }
    }

    /// Overwrites the count of a pair; a zero count removes the entry.
    pub fn set(&mut self, a: &PersonId, b: &PersonId, count: u32) {
        let Some(k) = key(a, b) else {
            return;
        };
        if count == 0 {
            self.counts.remove(&k);
        } else {
            self.counts.insert(k, count);
        }
    }

    /// A copy of the ledger with every entry mentioning `id` dropped.
    pub fn without_person(&self, id: &PersonId) -> Ledger {
        Ledger {
            counts: self
                .counts
                .iter()
                .filter(|((a, b), _)| a != id && b != id)
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        }
    }

    /// Entries sorted by pair, so listings are stable.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        let mut entries: Vec<_> = self
            .counts
            .iter()
            .map(|((a, b), count)| LedgerEntry {
                person1: a.clone(),
                person2: b.clone(),
                count: *count,
            })
            .collect();
        entries.sort_by(|x, y| (&x.person1, &x.person2).cmp(&(&y.person1, &y.person2)));
        entries
    }

    pub fn total_meetings(&self) -> u64 {
        self.counts.values().map(|c| u64::from(*c)).sum()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Returns a new ledger with one extra meeting for every pair inside every
/// group. The input is left untouched. Applying the same groups twice counts
/// them twice.
pub fn update_history(ledger: &Ledger, groups: &[GroupResult]) -> Ledger {
    let mut next = ledger.clone();
    for group in groups {
        for (a, b) in group.member_pairs() {
            next.record(&a.id, &b.id);
        }
    }
    next
}
