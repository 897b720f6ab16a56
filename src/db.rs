use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::Serialize;

use crate::{
    error::{Error, Result},
    ledger::{update_history, Ledger},
    model::{GroupResult, Person, PersonId},
};

/// A confirmed round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Round {
    pub id: i64,
    pub time: DateTime<Utc>,
    pub groups: Vec<GroupResult>,
}

const CREATE_TABLE_PEOPLE: &str = "CREATE TABLE IF NOT EXISTS people (
    id text primary key,
    name text not null,
    position integer not null
)";

const CREATE_TABLE_EDGES: &str = "CREATE TABLE IF NOT EXISTS edges (
    person1 text not null,
    person2 text not null,
    weight integer not null,
    primary key(person1, person2)
)";

const CREATE_TABLE_ROUNDS: &str = "CREATE TABLE IF NOT EXISTS rounds (
    id integer primary key,
    time text not null
)";

const CREATE_TABLE_ROUND_GROUPS: &str = "CREATE TABLE IF NOT EXISTS round_groups (
    round integer not null,
    idx integer not null,
    score integer not null,
    primary key(round, idx),
    foreign key(round) references rounds(id)
)";

// Names are copied so old rounds still read after a person is removed.
const CREATE_TABLE_ROUND_MEMBERS: &str = "CREATE TABLE IF NOT EXISTS round_members (
    round integer not null,
    idx integer not null,
    position integer not null,
    person text not null,
    name text not null,
    primary key(round, idx, position),
    foreign key(round) references rounds(id)
)";

fn clean_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::EmptyName);
    }
    Ok(name.to_owned())
}

fn person_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Person> {
    Ok(Person {
        id: PersonId::new(row.get::<_, String>(0)?),
        name: row.get(1)?,
    })
}

fn write_ledger(tx: &Transaction<'_>, ledger: &Ledger) -> Result<()> {
    tx.execute("DELETE FROM edges", [])?;
    let mut stmt =
        tx.prepare("INSERT INTO edges (person1, person2, weight) VALUES (?1, ?2, ?3)")?;
    for entry in ledger.entries() {
        stmt.execute(params![
            entry.person1.as_str(),
            entry.person2.as_str(),
            entry.count
        ])?;
    }
    Ok(())
}

fn insert_person(tx: &Transaction<'_>, name: &str) -> Result<Person> {
    let person = Person {
        id: PersonId::random(),
        name: clean_name(name)?,
    };
    tx.execute(
        "INSERT INTO people (id, name, position)
         VALUES (?1, ?2, (SELECT coalesce(max(position) + 1, 0) FROM people))",
        params![person.id.as_str(), person.name],
    )?;
    Ok(person)
}

fn read_people(conn: &Connection) -> Result<Vec<Person>> {
    let mut stmt = conn.prepare("SELECT id, name FROM people ORDER BY position")?;
    let people = stmt
        .query_map([], person_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(people)
}

fn read_ledger(conn: &Connection) -> Result<Ledger> {
    let mut stmt = conn.prepare("SELECT person1, person2, weight FROM edges")?;
    let mut rows = stmt.query([])?;
    let mut ledger = Ledger::new();
    while let Some(row) = rows.next()? {
        let p1 = PersonId::new(row.get::<_, String>(0)?);
        let p2 = PersonId::new(row.get::<_, String>(1)?);
        ledger.set(&p1, &p2, row.get(2)?);
    }
    Ok(ledger)
}

/// Checks that every member is on the roster and in one group only, and
/// recomputes each group's score from `ledger`.
fn rescore(
    groups: &[GroupResult],
    roster: &[Person],
    ledger: &Ledger,
) -> Result<Vec<GroupResult>> {
    if groups.is_empty() {
        return Err(Error::InvalidGroup("a round needs at least one group".to_owned()));
    }
    let roster: HashMap<&PersonId, &Person> = roster.iter().map(|p| (&p.id, p)).collect();
    let mut seen = HashSet::new();
    let mut rescored = Vec::with_capacity(groups.len());
    for group in groups {
        let mut members = Vec::with_capacity(group.people().len());
        for person in group.people() {
            let known = roster.get(&person.id).ok_or_else(|| Error::UnknownPerson {
                id: person.id.clone(),
            })?;
            if !seen.insert(&person.id) {
                return Err(Error::InvalidGroup(format!(
                    "{} appears in more than one group",
                    person.id
                )));
            }
            members.push((*known).clone());
        }
        let score = ledger.score(&members);
        rescored.push(GroupResult::from_members(members, score)?);
    }
    Ok(rescored)
}

/// Maps display names to ids. A name shared by several people maps to
/// `None`.
fn ids_by_name(roster: &[Person]) -> HashMap<&str, Option<&PersonId>> {
    let mut by_name: HashMap<&str, Option<&PersonId>> = HashMap::new();
    for person in roster {
        by_name
            .entry(person.name.as_str())
            .and_modify(|id| *id = None)
            .or_insert(Some(&person.id));
    }
    by_name
}

fn resolve_name(by_name: &HashMap<&str, Option<&PersonId>>, name: &str) -> Result<PersonId> {
    match by_name.get(name) {
        Some(Some(id)) => Ok((*id).clone()),
        Some(None) => Err(Error::AmbiguousName {
            name: name.to_owned(),
        }),
        None => Err(Error::UnknownName {
            name: name.to_owned(),
        }),
    }
}

/// SQLite store for the roster, the meeting ledger and confirmed rounds.
#[derive(Clone)]
pub struct Database {
    connection: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Database> {
        info!("opening database {}", path.as_ref().display());
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Database> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Database> {
        let s = Database {
            connection: Arc::new(Mutex::new(conn)),
        };
        s.migrate()?;
        Ok(s)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // Writes are transactional, so a poisoned lock still guards a
        // consistent connection.
        self.connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn();
        let creations = [
            CREATE_TABLE_PEOPLE,
            CREATE_TABLE_EDGES,
            CREATE_TABLE_ROUNDS,
            CREATE_TABLE_ROUND_GROUPS,
            CREATE_TABLE_ROUND_MEMBERS,
        ];
        for creation in creations {
            conn.execute(creation, [])?;
        }
        Ok(())
    }

    /// The roster in insertion order.
    pub fn all_people(&self) -> Result<Vec<Person>> {
        read_people(&self.conn())
    }

    pub fn get_person(&self, id: &PersonId) -> Result<Option<Person>> {
        let person = self
            .conn()
            .query_row(
                "SELECT id, name FROM people WHERE id = ?1",
                [id.as_str()],
                person_from_row,
            )
            .optional()?;
        Ok(person)
    }

    pub fn add_person(&self, name: &str) -> Result<Person> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let person = insert_person(&tx, name)?;
        tx.commit()?;
        debug!("added person {} ({})", person.id, person.name);
        Ok(person)
    }

    pub fn rename_person(&self, id: &PersonId, name: &str) -> Result<Person> {
        let name = clean_name(name)?;
        let changed = self.conn().execute(
            "UPDATE people SET name = ?1 WHERE id = ?2",
            params![name, id.as_str()],
        )?;
        if changed == 0 {
            return Err(Error::UnknownPerson { id: id.clone() });
        }
        Ok(Person {
            id: id.clone(),
            name,
        })
    }

    /// Removes a person together with every ledger entry that mentions them.
    pub fn remove_person(&self, id: &PersonId) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM people WHERE id = ?1", [id.as_str()])?;
        if removed == 0 {
            return Err(Error::UnknownPerson { id: id.clone() });
        }
        let pruned = tx.execute(
            "DELETE FROM edges WHERE person1 = ?1 OR person2 = ?1",
            [id.as_str()],
        )?;
        tx.commit()?;
        debug!("removed person {id} and {pruned} ledger entries");
        Ok(())
    }

    /// Replaces the whole roster with fresh people. The ledger only refers to
    /// the old ids, so it is cleared as well.
    pub fn replace_people(&self, names: &[String]) -> Result<Vec<Person>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM people", [])?;
        tx.execute("DELETE FROM edges", [])?;
        let people = names
            .iter()
            .map(|name| insert_person(&tx, name))
            .collect::<Result<Vec<_>>>()?;
        tx.commit()?;
        info!("imported {} people", people.len());
        Ok(people)
    }

    pub fn ledger(&self) -> Result<Ledger> {
        read_ledger(&self.conn())
    }

    pub fn replace_ledger(&self, ledger: &Ledger) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        write_ledger(&tx, ledger)?;
        tx.commit()?;
        Ok(())
    }

    pub fn clear_history(&self) -> Result<()> {
        self.conn().execute("DELETE FROM edges", [])?;
        info!("cleared meeting history");
        Ok(())
    }

    /// Adds a meeting log of `(left, right)` display names to the stored
    /// ledger. Names must identify exactly one person on the roster. Nothing
    /// is written if any name fails to resolve.
    pub fn import_meetings(&self, pairs: &[(String, String)]) -> Result<Ledger> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let roster = read_people(&tx)?;
        let by_name = ids_by_name(&roster);
        let mut ledger = read_ledger(&tx)?;
        for (left, right) in pairs {
            ledger.record(&resolve_name(&by_name, left)?, &resolve_name(&by_name, right)?);
        }
        write_ledger(&tx, &ledger)?;
        tx.commit()?;
        info!("imported {} past meetings", pairs.len());
        Ok(ledger)
    }

    /// Confirms a round against the stored roster and ledger. Scores are
    /// recomputed, the round is stored and every pair inside every group
    /// gains one meeting, all in one transaction.
    pub fn confirm_round(&self, groups: &[GroupResult]) -> Result<Round> {
        let time = Utc::now();
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let roster = read_people(&tx)?;
        let ledger = read_ledger(&tx)?;
        let groups = rescore(groups, &roster, &ledger)?;

        let id: i64 = tx.query_row(
            "INSERT INTO rounds (id, time)
             VALUES ((SELECT coalesce(max(id) + 1, 1) FROM rounds), ?1)
             RETURNING id",
            [time],
            |row| row.get(0),
        )?;
        for (idx, group) in groups.iter().enumerate() {
            tx.execute(
                "INSERT INTO round_groups (round, idx, score) VALUES (?1, ?2, ?3)",
                params![id, idx as i64, group.score()],
            )?;
            for (position, person) in group.people().iter().enumerate() {
                tx.execute(
                    "INSERT INTO round_members (round, idx, position, person, name)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![id, idx as i64, position as i64, person.id.as_str(), person.name],
                )?;
            }
        }
        write_ledger(&tx, &update_history(&ledger, &groups))?;
        tx.commit()?;
        info!("recorded round {id} with {} groups", groups.len());
        Ok(Round { id, time, groups })
    }

    pub fn latest_round_id(&self) -> Result<Option<i64>> {
        let latest = self
            .conn()
            .query_row("SELECT max(id) FROM rounds", [], |r| r.get(0))?;
        Ok(latest)
    }

    pub fn latest_round(&self) -> Result<Option<Round>> {
        let Some(id) = self.latest_round_id()? else {
            return Ok(None);
        };
        let conn = self.conn();
        let time: DateTime<Utc> =
            conn.query_row("SELECT time FROM rounds WHERE id = ?1", [id], |r| r.get(0))?;

        let mut stmt =
            conn.prepare("SELECT idx, score FROM round_groups WHERE round = ?1 ORDER BY idx")?;
        let scores = stmt
            .query_map([id], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, u32>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
            "SELECT idx, person, name FROM round_members
             WHERE round = ?1 ORDER BY idx, position",
        )?;
        let members = stmt
            .query_map([id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    Person {
                        id: PersonId::new(row.get::<_, String>(1)?),
                        name: row.get(2)?,
                    },
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let groups = scores
            .into_iter()
            .map(|(idx, score)| {
                let people = members
                    .iter()
                    .filter(|(i, _)| *i == idx)
                    .map(|(_, p)| p.clone())
                    .collect();
                GroupResult::from_members(people, score)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(Round { id, time, groups }))
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Barrier, thread};

    use super::*;

    #[test]
    fn roster_keeps_insertion_order() {
        let db = Database::open_in_memory().unwrap();
        for name in ["Carol", "alice", "Bob"] {
            db.add_person(name).unwrap();
        }
        let names: Vec<_> = db.all_people().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Carol", "alice", "Bob"]);
    }

    #[test]
    fn empty_names_are_rejected() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.add_person("   "), Err(Error::EmptyName)));
        let person = db.add_person("Ann").unwrap();
        assert!(matches!(db.rename_person(&person.id, ""), Err(Error::EmptyName)));
    }

    #[test]
    fn rename_and_lookup() {
        let db = Database::open_in_memory().unwrap();
        let person = db.add_person(" Ann ").unwrap();
        assert_eq!(person.name, "Ann");
        db.rename_person(&person.id, "Anne").unwrap();
        assert_eq!(db.get_person(&person.id).unwrap().unwrap().name, "Anne");
        let missing = PersonId::from("missing");
        assert!(db.get_person(&missing).unwrap().is_none());
        assert!(matches!(
            db.rename_person(&missing, "x"),
            Err(Error::UnknownPerson { .. })
        ));
    }

    #[test]
    fn ledger_round_trips() {
        let db = Database::open_in_memory().unwrap();
        let a = PersonId::from("a");
        let b = PersonId::from("b");
        let c = PersonId::from("c");
        let ledger = Ledger::from_pairs(vec![(a.clone(), b.clone()), (b.clone(), a), (c, b)]);
        db.replace_ledger(&ledger).unwrap();
        assert_eq!(db.ledger().unwrap(), ledger);
        db.clear_history().unwrap();
        assert!(db.ledger().unwrap().is_empty());
    }

    #[test]
    fn removing_a_person_prunes_their_history() {
        let db = Database::open_in_memory().unwrap();
        let a = db.add_person("A").unwrap();
        let b = db.add_person("B").unwrap();
        let c = db.add_person("C").unwrap();
        let ledger = Ledger::from_pairs(vec![
            (a.id.clone(), b.id.clone()),
            (b.id.clone(), c.id.clone()),
            (a.id.clone(), c.id.clone()),
        ]);
        db.replace_ledger(&ledger).unwrap();

        db.remove_person(&b.id).unwrap();
        assert_eq!(db.ledger().unwrap(), ledger.without_person(&b.id));
        assert_eq!(db.all_people().unwrap(), vec![a, c]);
        assert!(matches!(
            db.remove_person(&b.id),
            Err(Error::UnknownPerson { .. })
        ));
    }

    #[test]
    fn importing_people_resets_history() {
        let db = Database::open_in_memory().unwrap();
        let a = db.add_person("A").unwrap();
        let b = db.add_person("B").unwrap();
        db.replace_ledger(&Ledger::from_pairs(vec![(a.id, b.id)])).unwrap();

        let people = db
            .replace_people(&["X".to_owned(), "Y".to_owned(), "Z".to_owned()])
            .unwrap();
        assert_eq!(people.len(), 3);
        assert_eq!(db.all_people().unwrap(), people);
        assert!(db.ledger().unwrap().is_empty());
    }

    #[test]
    fn rounds_are_recorded_with_their_ledger() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.latest_round().unwrap().is_none());
        let people: Vec<_> = ["A", "B", "C", "D", "E"]
            .iter()
            .map(|n| db.add_person(n).unwrap())
            .collect();
        let groups = vec![
            GroupResult::Pair {
                people: [people[0].clone(), people[1].clone()],
                score: 0,
            },
            GroupResult::Triple {
                people: [people[2].clone(), people[3].clone(), people[4].clone()],
                score: 0,
            },
        ];
        let first = db.confirm_round(&groups).unwrap();
        let after_first = update_history(&Ledger::new(), &groups);
        assert_eq!(db.ledger().unwrap(), after_first);

        let second = db.confirm_round(&groups[..1]).unwrap();
        assert_eq!(second.id, first.id + 1);
        assert_eq!(second.groups[0].score(), 1);

        let latest = db.latest_round().unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.groups, second.groups);
        assert_eq!(
            db.ledger().unwrap(),
            update_history(&after_first, &groups[..1])
        );

        // Removing a member keeps the recorded round readable.
        db.remove_person(&people[0].id).unwrap();
        assert_eq!(db.latest_round().unwrap().unwrap().groups[0].people()[0].name, "A");
    }

    fn pair_of(a: &Person, b: &Person) -> GroupResult {
        GroupResult::Pair {
            people: [a.clone(), b.clone()],
            score: 0,
        }
    }

    #[test]
    fn confirm_rejects_strangers_without_writing() {
        let db = Database::open_in_memory().unwrap();
        let a = db.add_person("A").unwrap();
        let ghost = Person::new("ghost", "Ghost");
        assert!(matches!(
            db.confirm_round(&[pair_of(&a, &ghost)]),
            Err(Error::UnknownPerson { .. })
        ));
        assert!(matches!(db.confirm_round(&[]), Err(Error::InvalidGroup(_))));
        assert!(db.latest_round().unwrap().is_none());
        assert!(db.ledger().unwrap().is_empty());
    }

    #[test]
    fn removed_person_stays_out_of_later_rounds() {
        let db = Database::open_in_memory().unwrap();
        let a = db.add_person("A").unwrap();
        let b = db.add_person("B").unwrap();
        let c = db.add_person("C").unwrap();
        db.confirm_round(&[pair_of(&a, &c)]).unwrap();
        db.remove_person(&c.id).unwrap();
        db.confirm_round(&[pair_of(&a, &b)]).unwrap();

        let ledger = db.ledger().unwrap();
        assert_eq!(ledger.count(&a.id, &c.id), 0);
        assert_eq!(ledger.count(&a.id, &b.id), 1);
        assert!(matches!(
            db.confirm_round(&[pair_of(&a, &c)]),
            Err(Error::UnknownPerson { .. })
        ));
    }

    #[test]
    fn concurrent_confirms_keep_every_meeting() {
        let db = Database::open_in_memory().unwrap();
        let people: Vec<_> = (0..8)
            .map(|i| db.add_person(&format!("P{i}")).unwrap())
            .collect();
        let start = Barrier::new(4);
        thread::scope(|s| {
            for pair in people.chunks(2) {
                let (db, start) = (&db, &start);
                s.spawn(move || {
                    start.wait();
                    for _ in 0..10 {
                        db.confirm_round(&[pair_of(&pair[0], &pair[1])]).unwrap();
                    }
                });
            }
        });

        let ledger = db.ledger().unwrap();
        assert_eq!(ledger.total_meetings(), 40);
        for pair in people.chunks(2) {
            assert_eq!(ledger.count(&pair[0].id, &pair[1].id), 10);
        }
        assert_eq!(db.latest_round_id().unwrap(), Some(40));
    }

    #[test]
    fn removal_racing_confirms_stays_pruned() {
        let db = Database::open_in_memory().unwrap();
        let a = db.add_person("A").unwrap();
        let b = db.add_person("B").unwrap();
        let c = db.add_person("C").unwrap();
        let start = Barrier::new(2);
        thread::scope(|s| {
            s.spawn(|| {
                start.wait();
                for _ in 0..50 {
                    match db.confirm_round(&[pair_of(&a, &c)]) {
                        Ok(_) | Err(Error::UnknownPerson { .. }) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                    db.confirm_round(&[pair_of(&a, &b)]).unwrap();
                }
            });
            s.spawn(|| {
                start.wait();
                db.remove_person(&c.id).unwrap();
            });
        });

        let ledger = db.ledger().unwrap();
        assert!(ledger
            .entries()
            .iter()
            .all(|e| e.person1 != c.id && e.person2 != c.id));
        assert_eq!(ledger.count(&a.id, &b.id), 50);
    }

    #[test]
    fn on_disk_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("donuts.sqlite");
        let person = {
            let db = Database::open(&path).unwrap();
            db.add_person("Persistent").unwrap()
        };
        let db = Database::open(&path).unwrap();
        assert_eq!(db.all_people().unwrap(), vec![person]);
    }
}
