use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Stable, unique identifier of a person. Opaque to the engine.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(String);

impl PersonId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PersonId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
}

impl Person {
    pub fn new(id: impl Into<PersonId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// One group of a round. `score` is the sum of past meetings over every pair
/// inside the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GroupResult {
    Pair { people: [Person; 2], score: u32 },
    Triple { people: [Person; 3], score: u32 },
}

impl GroupResult {
    pub fn people(&self) -> &[Person] {
        match self {
            GroupResult::Pair { people, .. } => people,
            GroupResult::Triple { people, .. } => people,
        }
    }

    pub fn score(&self) -> u32 {
        match self {
            GroupResult::Pair { score, .. } | GroupResult::Triple { score, .. } => *score,
        }
    }

    /// Builds a group from its members; only two or three people form one.
    pub fn from_members(people: Vec<Person>, score: u32) -> Result<GroupResult> {
        match people.len() {
            2 => Ok(GroupResult::Pair {
                people: <[Person; 2]>::try_from(people).map_err(|_| member_count_mismatch())?,
                score,
            }),
            3 => Ok(GroupResult::Triple {
                people: <[Person; 3]>::try_from(people).map_err(|_| member_count_mismatch())?,
                score,
            }),
            n => Err(Error::InvalidGroup(format!("a group has {n} members"))),
        }
    }

    pub fn is_triple(&self) -> bool {
        matches!(self, GroupResult::Triple { .. })
    }

    /// Every unordered pair of members, in member order.
    pub fn member_pairs(&self) -> impl Iterator<Item = (&Person, &Person)> + '_ {
        let people = self.people();
        (0..people.len())
            .flat_map(move |i| (i + 1..people.len()).map(move |j| (&people[i], &people[j])))
    }
}

fn member_count_mismatch() -> Error {
    Error::InvalidGroup("member count changed during conversion".to_owned())
}
