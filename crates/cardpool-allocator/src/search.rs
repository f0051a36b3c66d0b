//! Placement search (C4): backtracking over a node's card vector, scoring
//! every complete assignment with a [`Rater`] and keeping the best.

use crate::rater::Rater;
use cardpool_core::{Card, Demand};

/// An assignment of a demand vector to card indices, plus the score the
/// rater gave the completed card state.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub demand: Vec<Demand>,
    pub assigned: Vec<Vec<usize>>,
    pub score: i64,
}

/// Find the highest-scoring complete assignment of `demands` onto `cards`.
/// `cards` is mutated during the search but restored to its input state
/// before returning, win or lose.
pub fn search(cards: &mut [Card], demands: &[Demand], rater: &dyn Rater) -> Option<Plan> {
    let mut assigned: Vec<Vec<usize>> = vec![Vec::new(); demands.len()];
    let mut best: Option<Plan> = None;
    dfs(cards, demands, 0, &mut assigned, rater, &mut best);
    best
}

fn dfs(
    cards: &mut [Card],
    demands: &[Demand],
    i: usize,
    assigned: &mut Vec<Vec<usize>>,
    rater: &dyn Rater,
    best: &mut Option<Plan>,
) {
    if i == demands.len() {
        let score = rater.score(cards);
        if best.as_ref().is_none_or(|b| score > b.score) {
            *best = Some(Plan {
                demand: demands.to_vec(),
                assigned: assigned.clone(),
                score,
            });
        }
        return;
    }

    let d = demands[i];

    if d.is_none() {
        assigned[i] = Vec::new();
        dfs(cards, demands, i + 1, assigned, rater, best);
        return;
    }

    if d.is_whole() {
        let k = d.whole_count() as usize;
        let free: Vec<usize> = cards
            .iter()
            .filter(|c| c.is_free())
            .map(|c| c.index)
            .collect();
        if free.len() < k {
            return;
        }
        let chosen = &free[..k];
        for &idx in chosen {
            cards[idx].apply(&d);
        }
        assigned[i] = chosen.to_vec();
        dfs(cards, demands, i + 1, assigned, rater, best);
        for &idx in chosen {
            cards[idx].revert(&d);
        }
        return;
    }

    for ci in 0..cards.len() {
        if !cards[ci].can_allocate(&d) {
            continue;
        }
        cards[ci].apply(&d);
        assigned[i] = vec![cards[ci].index];
        dfs(cards, demands, i + 1, assigned, rater, best);
        cards[ci].revert(&d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rater::{Binpack, Spread};

    fn two_free_cards() -> Vec<Card> {
        vec![Card::new(0, 16 * 1024), Card::new(1, 16 * 1024)]
    }

    #[test]
    fn binpack_stacks_two_shared_slices_on_one_card() {
        let mut cards = two_free_cards();
        let demands = vec![Demand { core: 50, mem: 2048 }];
        let plan = search(&mut cards, &demands, &Binpack).unwrap();
        assert_eq!(plan.assigned, vec![vec![0]]);
        // cards themselves are untouched after search returns
        assert!(cards[0].is_free());
    }

    #[test]
    fn spread_prefers_the_emptier_card() {
        let mut cards = two_free_cards();
        cards[0].apply(&Demand { core: 50, mem: 0 });
        let demands = vec![Demand { core: 20, mem: 0 }];
        let plan = search(&mut cards, &demands, &Spread).unwrap();
        assert_eq!(plan.assigned, vec![vec![1]]);
    }

    #[test]
    fn whole_card_demand_takes_free_cards_in_index_order() {
        let mut cards = vec![
            Card::new(0, 1024),
            Card::new(1, 1024),
            Card::new(2, 1024),
            Card::new(3, 1024),
        ];
        let demands = vec![Demand { core: 200, mem: 0 }];
        let plan = search(&mut cards, &demands, &Binpack).unwrap();
        assert_eq!(plan.assigned, vec![vec![0, 1]]);
        assert!(cards.iter().all(|c| c.is_free()));
    }

    #[test]
    fn infeasible_whole_card_demand_returns_none() {
        let mut cards = vec![Card::new(0, 1024), Card::new(1, 1024)];
        let demands = vec![Demand { core: 300, mem: 0 }];
        assert!(search(&mut cards, &demands, &Binpack).is_none());
    }

    #[test]
    fn none_demand_is_satisfied_without_touching_cards() {
        let mut cards = two_free_cards();
        let demands = vec![Demand::NONE];
        let plan = search(&mut cards, &demands, &Binpack).unwrap();
        assert_eq!(plan.assigned, vec![Vec::<usize>::new()]);
        assert!(cards.iter().all(|c| c.is_free()));
    }

    #[test]
    fn multi_container_pod_assigns_each_independently() {
        let mut cards = two_free_cards();
        let demands = vec![
            Demand { core: 30, mem: 0 },
            Demand { core: 40, mem: 0 },
        ];
        let plan = search(&mut cards, &demands, &Binpack).unwrap();
        assert_eq!(plan.assigned.len(), 2);
        assert!(cards.iter().all(|c| c.is_free()));
    }
}
