use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use log::{error, warn};
use serde::Deserialize;
use serde_json::json;

use crate::{
    db::{Database, Round},
    error::{Error, Result},
    import,
    ledger::LedgerEntry,
    matching::generate_matching,
    model::{GroupResult, Person, PersonId},
};

pub fn router(db: Database) -> Router {
    Router::new()
        .route("/people", get(all_people).post(add_person))
        .route("/people/import", post(import_people))
        .route("/people/export", get(export_people))
        .route("/people/:id", put(rename_person).delete(remove_person))
        .route("/history", get(history).delete(clear_history))
        .route("/history/import", post(import_history))
        .route("/matching", post(trigger_matching))
        .route("/rounds", post(confirm_round))
        .route("/rounds/latest", get(latest_round))
        .with_state(db)
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::UnknownPerson { .. } | Error::NoRound => StatusCode::NOT_FOUND,
            Error::DuplicatePerson { .. }
            | Error::NegativeWeight { .. }
            | Error::InvalidEdge { .. }
            | Error::UnknownName { .. }
            | Error::AmbiguousName { .. }
            | Error::InvalidGroup(_)
            | Error::EmptyName => StatusCode::BAD_REQUEST,
            Error::Invariant(_) | Error::Config(_) | Error::Database(_) | Error::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            error!("{self}");
        } else {
            warn!("rejected request: {self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct NewName {
    name: String,
}

pub async fn all_people(State(db): State<Database>) -> Result<Json<Vec<Person>>> {
    Ok(Json(db.all_people()?))
}

pub async fn add_person(
    State(db): State<Database>,
    Json(body): Json<NewName>,
) -> Result<(StatusCode, Json<Person>)> {
    let person = db.add_person(&body.name)?;
    Ok((StatusCode::CREATED, Json(person)))
}

pub async fn rename_person(
    State(db): State<Database>,
    Path(id): Path<String>,
    Json(body): Json<NewName>,
) -> Result<Json<Person>> {
    Ok(Json(db.rename_person(&PersonId::new(id), &body.name)?))
}

pub async fn remove_person(
    State(db): State<Database>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    db.remove_person(&PersonId::new(id))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Replaces the roster with the names in the body. An upload without any
/// names leaves everything as it was.
pub async fn import_people(State(db): State<Database>, body: String) -> Result<Json<Vec<Person>>> {
    let names = import::parse_roster(&body);
    if names.is_empty() {
        warn!("roster upload contained no names");
        return Ok(Json(db.all_people()?));
    }
    Ok(Json(db.replace_people(&names)?))
}

pub async fn export_people(State(db): State<Database>) -> Result<String> {
    let names: Vec<_> = db.all_people()?.into_iter().map(|p| p.name).collect();
    Ok(names.join("\n"))
}

pub async fn history(State(db): State<Database>) -> Result<Json<Vec<LedgerEntry>>> {
    Ok(Json(db.ledger()?.entries()))
}

pub async fn clear_history(State(db): State<Database>) -> Result<StatusCode> {
    db.clear_history()?;
    Ok(StatusCode::NO_CONTENT)
}

/// Adds a `Left,Right` meeting log to the ledger. Names are looked up on the
/// current roster and must identify exactly one person.
pub async fn import_history(
    State(db): State<Database>,
    body: String,
) -> Result<Json<Vec<LedgerEntry>>> {
    let pairs = import::parse_history(&body);
    Ok(Json(db.import_meetings(&pairs)?.entries()))
}

/// Proposes a round for the current roster. Nothing is stored until the
/// round is confirmed.
pub async fn trigger_matching(State(db): State<Database>) -> Result<Json<Vec<GroupResult>>> {
    let people = db.all_people()?;
    let ledger = db.ledger()?;
    Ok(Json(generate_matching(&people, &ledger)?))
}

/// Confirms a round: every member must be on the roster and in one group
/// only. Scores are recomputed from the stored ledger before it is updated.
pub async fn confirm_round(
    State(db): State<Database>,
    Json(groups): Json<Vec<GroupResult>>,
) -> Result<(StatusCode, Json<Round>)> {
    let round = db.confirm_round(&groups)?;
    Ok((StatusCode::CREATED, Json(round)))
}

pub async fn latest_round(State(db): State<Database>) -> Result<Json<Round>> {
    db.latest_round()?.map(Json).ok_or(Error::NoRound)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(names: &[&str]) -> Database {
        let db = Database::open_in_memory().unwrap();
        for name in names {
            db.add_person(name).unwrap();
        }
        db
    }

    #[test]
    fn routes_do_not_conflict() {
        let _ = router(Database::open_in_memory().unwrap());
    }

    #[test]
    fn errors_map_to_status_codes() {
        let missing = Error::UnknownPerson {
            id: PersonId::from("x"),
        };
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(Error::EmptyName.into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::Invariant("boom".to_owned()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn propose_then_confirm() {
        let db = seeded(&["A", "B", "C", "D", "E"]);
        let Json(groups) = trigger_matching(State(db.clone())).await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups.iter().filter(|g| g.is_triple()).count(), 1);
        // Proposing alone does not touch the ledger.
        assert!(db.ledger().unwrap().is_empty());

        let (status, Json(round)) = confirm_round(State(db.clone()), Json(groups.clone()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(round.groups, groups);
        assert_eq!(db.ledger().unwrap().total_meetings(), 4);

        let Json(latest) = latest_round(State(db)).await.unwrap();
        assert_eq!(latest.id, round.id);
    }

    #[tokio::test]
    async fn confirm_rejects_strangers_and_repeats() {
        let db = seeded(&["A", "B", "C"]);
        let people = db.all_people().unwrap();
        let stranger = GroupResult::Pair {
            people: [people[0].clone(), Person::new("ghost", "Ghost")],
            score: 0,
        };
        let err = confirm_round(State(db.clone()), Json(vec![stranger]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownPerson { .. }));

        let twice = vec![
            GroupResult::Pair {
                people: [people[0].clone(), people[1].clone()],
                score: 0,
            },
            GroupResult::Pair {
                people: [people[1].clone(), people[2].clone()],
                score: 0,
            },
        ];
        let err = confirm_round(State(db.clone()), Json(twice)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidGroup(_)));
        assert!(db.ledger().unwrap().is_empty());
    }

    #[tokio::test]
    async fn confirm_recomputes_scores() {
        let db = seeded(&["A", "B"]);
        let people = db.all_people().unwrap();
        let group = GroupResult::Pair {
            people: [people[0].clone(), people[1].clone()],
            score: 99,
        };
        confirm_round(State(db.clone()), Json(vec![group.clone()]))
            .await
            .unwrap();
        let (_, Json(round)) = confirm_round(State(db), Json(vec![group])).await.unwrap();
        assert_eq!(round.groups[0].score(), 1);
    }

    #[tokio::test]
    async fn latest_round_is_not_found_before_any_confirmation() {
        let db = seeded(&[]);
        assert!(matches!(
            latest_round(State(db)).await.unwrap_err(),
            Error::NoRound
        ));
    }

    #[tokio::test]
    async fn history_import_resolves_names() {
        let db = seeded(&["alice", "bob", "carol"]);
        let body = "Left,Right\n@alice,@bob\nbob,alice\nalice,carol\n".to_owned();
        let Json(entries) = import_history(State(db.clone()), body).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(db.ledger().unwrap().total_meetings(), 3);

        let err = import_history(State(db), "alice,dave".to_owned())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownName { name } if name == "dave"));
    }

    #[tokio::test]
    async fn history_import_refuses_ambiguous_names() {
        let db = seeded(&["sam", "sam", "kim"]);
        let err = import_history(State(db), "sam,kim".to_owned())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousName { .. }));
    }

    #[tokio::test]
    async fn roster_import_and_export() {
        let db = seeded(&["old"]);
        let Json(people) = import_people(State(db.clone()), "name\nAnn\nBen\n".to_owned())
            .await
            .unwrap();
        assert_eq!(people.len(), 2);
        let text = export_people(State(db.clone())).await.unwrap();
        assert_eq!(text, "Ann\nBen");

        // An empty upload keeps the roster.
        let Json(people) = import_people(State(db), "name\n".to_owned()).await.unwrap();
        assert_eq!(people.len(), 2);
    }

    #[tokio::test]
    async fn people_crud() {
        let db = seeded(&[]);
        let (status, Json(ann)) = add_person(
            State(db.clone()),
            Json(NewName {
                name: "Ann".to_owned(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(renamed) = rename_person(
            State(db.clone()),
            Path(ann.id.to_string()),
            Json(NewName {
                name: "Annie".to_owned(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(renamed.name, "Annie");

        let status = remove_person(State(db.clone()), Path(ann.id.to_string()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        let Json(people) = all_people(State(db)).await.unwrap();
        assert!(people.is_empty());
    }
}
