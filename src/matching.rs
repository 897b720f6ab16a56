use std::collections::HashSet;

use log::{debug, info};

use crate::{
    blossom,
    error::{Error, Result},
    ledger::Ledger,
    model::{GroupResult, Person},
};

/// Complete graph over one roster. The weight of an edge is how many times
/// the two people have already met; missing edges weigh zero.
#[derive(Default, Debug)]
pub struct Graph {
    nodes: Vec<Person>,
    edges: Vec<Vec<u32>>,
}

/// Vertex-disjoint pairs plus the vertex left over when the roster is odd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matching {
    pub pairs: Vec<(usize, usize)>,
    pub leftover: Option<usize>,
}

impl Graph {
    /// Builds the graph for one run. Vertex `i` is `roster[i]`.
    pub fn from_roster(roster: &[Person], ledger: &Ledger) -> Result<Graph> {
        let mut seen = HashSet::new();
        let mut graph = Graph::default();
        for person in roster {
            if !seen.insert(&person.id) {
                return Err(Error::DuplicatePerson {
                    id: person.id.clone(),
                });
            }
            graph.add_node(person.clone());
        }
        for i in 0..roster.len() {
            for j in i + 1..roster.len() {
                let weight = ledger.count(&roster[i].id, &roster[j].id);
                if weight > 0 {
                    graph.add_edge(i, j, weight);
                }
            }
        }
        Ok(graph)
    }

    fn add_edge(&mut self, id1: usize, id2: usize, weight: u32) {
        self.edges[id1][id2] = weight;
        self.edges[id2][id1] = weight;
    }

    fn add_node(&mut self, person: Person) -> usize {
        let id = self.nodes.len();
        self.nodes.push(person);
        for edge_row in &mut self.edges {
            edge_row.push(0);
        }
        self.edges.push(vec![0; self.nodes.len()]);
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: usize) -> &Person {
        &self.nodes[id]
    }

    pub fn weight(&self, id1: usize, id2: usize) -> u32 {
        self.edges[id1][id2]
    }

    /// Minimum-weight matching covering all vertices but at most one.
    pub fn matching(&self) -> Result<Matching> {
        let n = self.len();
        let mate = blossom::min_cost_matching(n, |u, v| i64::from(self.weight(u, v)))?;

        let mut pairs = Vec::new();
        let mut matched = vec![false; n];
        for (v, partner) in mate.iter().enumerate() {
            let Some(w) = *partner else {
                continue;
            };
            if w > v {
                if matched[v] || matched[w] {
                    return Err(Error::Invariant(format!(
                        "vertex {v} or {w} is already matched"
                    )));
                }
                pairs.push((v, w));
                matched[v] = true;
                matched[w] = true;
            }
        }

        let unmatched: Vec<usize> = (0..n).filter(|&v| !matched[v]).collect();
        let leftover = match unmatched.as_slice() {
            [] => None,
            [w] => Some(*w),
            more => {
                return Err(Error::Invariant(format!(
                    "vertices {more:?} were left unmatched"
                )))
            }
        };
        Ok(Matching { pairs, leftover })
    }

    fn pair(&self, a: usize, b: usize) -> GroupResult {
        GroupResult::Pair {
            people: [self.node(a).clone(), self.node(b).clone()],
            score: self.weight(a, b),
        }
    }

    fn triple(&self, a: usize, b: usize, w: usize) -> GroupResult {
        GroupResult::Triple {
            people: [
                self.node(a).clone(),
                self.node(b).clone(),
                self.node(w).clone(),
            ],
            score: self
                .weight(a, b)
                .saturating_add(self.weight(a, w))
                .saturating_add(self.weight(b, w)),
        }
    }

    /// Turns the pair that has met `leftover` least into a triple. Ties go to
    /// the earliest pair. The rest of the matching is kept as it is.
    pub fn fold_leftover(
        &self,
        pairs: &[(usize, usize)],
        leftover: usize,
    ) -> Result<Vec<GroupResult>> {
        let target = pairs
            .iter()
            .enumerate()
            .min_by_key(|&(_, &(a, b))| {
                u64::from(self.weight(a, leftover)) + u64::from(self.weight(b, leftover))
            })
            .map(|(i, _)| i)
            .ok_or_else(|| {
                Error::Invariant(format!("no pair to absorb leftover vertex {leftover}"))
            })?;
        debug!(
            "folding {} into pair {:?}",
            self.node(leftover).id,
            pairs[target]
        );

        Ok(pairs
            .iter()
            .enumerate()
            .map(|(i, &(a, b))| {
                if i == target {
                    self.triple(a, b, leftover)
                } else {
                    self.pair(a, b)
                }
            })
            .collect())
    }
}

/// Splits the roster into pairs, plus one triple when the roster is odd, so
/// that the people grouped together have met as rarely as possible.
///
/// Rosters of fewer than two people produce no groups.
pub fn generate_matching(roster: &[Person], ledger: &Ledger) -> Result<Vec<GroupResult>> {
    let graph = Graph::from_roster(roster, ledger)?;
    let groups = match graph.len() {
        0 | 1 => Vec::new(),
        2 => vec![graph.pair(0, 1)],
        _ => {
            let Matching { pairs, leftover } = graph.matching()?;
            match leftover {
                Some(w) => graph.fold_leftover(&pairs, w)?,
                None => pairs.iter().map(|&(a, b)| graph.pair(a, b)).collect(),
            }
        }
    };
    info!(
        "matched {} people into {} groups, total repeat score {}",
        roster.len(),
        groups.len(),
        groups.iter().map(|g| u64::from(g.score())).sum::<u64>()
    );
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PersonId;

    fn roster(names: &[&str]) -> Vec<Person> {
        names.iter().map(|n| Person::new(*n, *n)).collect()
    }

    fn ids(group: &GroupResult) -> Vec<&str> {
        let mut ids: Vec<_> = group.people().iter().map(|p| p.id.as_str()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn tiny_rosters() {
        let ledger = Ledger::new();
        assert!(generate_matching(&[], &ledger).unwrap().is_empty());
        assert!(generate_matching(&roster(&["a"]), &ledger).unwrap().is_empty());

        let ledger = Ledger::from_pairs(vec![(PersonId::from("a"), PersonId::from("b"))]);
        let groups = generate_matching(&roster(&["a", "b"]), &ledger).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].score(), 1);
        assert!(!groups[0].is_triple());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let people = vec![Person::new("a", "Ann"), Person::new("b", "Bo"), Person::new("a", "Al")];
        let err = generate_matching(&people, &Ledger::new()).unwrap_err();
        assert!(matches!(err, Error::DuplicatePerson { id } if id.as_str() == "a"));
    }

    #[test]
    fn three_people_who_all_met_twice() {
        let mut ledger = Ledger::new();
        for (a, b) in [("a", "b"), ("a", "c"), ("b", "c")] {
            ledger.set(&PersonId::from(a), &PersonId::from(b), 2);
        }
        let groups = generate_matching(&roster(&["a", "b", "c"]), &ledger).unwrap();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].is_triple());
        assert_eq!(groups[0].score(), 6);
    }

    #[test]
    fn avoids_the_pair_that_met_before() {
        let mut ledger = Ledger::new();
        ledger.set(&PersonId::from("a"), &PersonId::from("b"), 3);
        let groups = generate_matching(&roster(&["a", "b", "c", "d"]), &ledger).unwrap();
        assert_eq!(groups.len(), 2);
        for group in &groups {
            assert_ne!(ids(group), vec!["a", "b"]);
            assert_eq!(group.score(), 0);
        }
    }

    #[test]
    fn leftover_joins_the_pair_it_met_least() {
        let mut graph = Graph::default();
        for name in ["a", "b", "c", "d", "e"] {
            graph.add_node(Person::new(name, name));
        }
        graph.add_edge(0, 4, 2);
        graph.add_edge(2, 4, 1);
        graph.add_edge(0, 1, 5);
        let groups = graph.fold_leftover(&[(0, 1), (2, 3)], 4).unwrap();
        assert!(!groups[0].is_triple());
        assert_eq!(groups[0].score(), 5);
        assert!(groups[1].is_triple());
        assert_eq!(ids(&groups[1]), vec!["c", "d", "e"]);
        assert_eq!(groups[1].score(), 1);
    }

    #[test]
    fn leftover_ties_go_to_the_first_pair() {
        let mut graph = Graph::default();
        for name in ["a", "b", "c", "d", "e"] {
            graph.add_node(Person::new(name, name));
        }
        let groups = graph.fold_leftover(&[(2, 3), (0, 1)], 4).unwrap();
        assert!(groups[0].is_triple());
        assert_eq!(ids(&groups[0]), vec!["c", "d", "e"]);
    }

    #[test]
    fn leftover_without_pairs_is_an_invariant_error() {
        let mut graph = Graph::default();
        graph.add_node(Person::new("a", "a"));
        let err = graph.fold_leftover(&[], 0).unwrap_err();
        assert!(matches!(err, Error::Invariant(msg) if msg.contains("leftover vertex 0")));
    }

    #[test]
    fn triple_score_saturates() {
        let mut ledger = Ledger::new();
        for (a, b) in [("a", "b"), ("a", "c"), ("b", "c")] {
            ledger.set(&PersonId::from(a), &PersonId::from(b), u32::MAX);
        }
        let groups = generate_matching(&roster(&["a", "b", "c"]), &ledger).unwrap();
        assert_eq!(groups[0].score(), u32::MAX);
    }

    #[test]
    fn graph_weights_come_from_the_ledger() {
        let mut ledger = Ledger::new();
        ledger.set(&PersonId::from("c"), &PersonId::from("a"), 4);
        let graph = Graph::from_roster(&roster(&["a", "b", "c"]), &ledger).unwrap();
        assert_eq!(graph.weight(0, 2), 4);
        assert_eq!(graph.weight(2, 0), 4);
        assert_eq!(graph.weight(0, 1), 0);
        assert_eq!(graph.node(1).id.as_str(), "b");
    }

    #[test]
    fn odd_roster_matching_leaves_one_vertex() {
        let graph = Graph::from_roster(&roster(&["a", "b", "c", "d", "e"]), &Ledger::new()).unwrap();
        let matching = graph.matching().unwrap();
        assert_eq!(matching.pairs.len(), 2);
        assert!(matching.leftover.is_some());
    }
}
