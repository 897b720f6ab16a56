//! Error types for the matching engine and the service around it.

use thiserror::Error;

use crate::model::PersonId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("person {id} appears more than once in the roster")]
    DuplicatePerson { id: PersonId },

    #[error("edge ({u}, {v}) has negative weight {weight}")]
    NegativeWeight { u: usize, v: usize, weight: i64 },

    #[error("edge ({u}, {v}) does not join two distinct vertices of the graph")]
    InvalidEdge { u: usize, v: usize },

    /// The solver broke one of its own invariants. Never recovered from.
    #[error("matching invariant violated: {0}")]
    Invariant(String),

    #[error("no person with id {id}")]
    UnknownPerson { id: PersonId },

    #[error("no person named {name:?} on the roster")]
    UnknownName { name: String },

    #[error("more than one person is named {name:?}")]
    AmbiguousName { name: String },

    #[error("invalid group: {0}")]
    InvalidGroup(String),

    #[error("no round has been confirmed yet")]
    NoRound,

    #[error("name cannot be empty")]
    EmptyName,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
