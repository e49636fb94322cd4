// 🏆 Leaderboard Projector - ranked standings from the cached totals
//
// Pure functions over a LedgerState snapshot; nothing here touches storage.

use serde::{Deserialize, Serialize};

use crate::db::LedgerState;
use crate::teams::House;

/// One row of the standings board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub house: House,
    pub points: i64,
    /// 1-based position in the sorted order. Ties are NOT collapsed: two
    /// houses on equal points get consecutive ranks in tie-break order.
    pub rank: usize,
}

/// Standings sorted by points descending.
///
/// Tie-break: `House::ALL` declaration order. The sort is stable and the
/// input is built in declaration order, so equal-point houses always come
/// out in the same sequence.
pub fn standings(state: &LedgerState) -> Vec<Standing> {
    let mut rows: Vec<(House, i64)> = House::ALL
        .iter()
        .map(|h| (*h, state.points(*h)))
        .collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1));

    rows.into_iter()
        .enumerate()
        .map(|(idx, (house, points))| Standing {
            house,
            points,
            rank: idx + 1,
        })
        .collect()
}

/// Sum of all house totals.
pub fn total_points(state: &LedgerState) -> i64 {
    House::ALL.iter().map(|h| state.points(*h)).sum()
}

/// The rank-1 house, but only when its total is strictly positive.
/// With everything at zero (or negative) there is no leader to announce,
/// even though a nominal rank-1 row exists.
pub fn leading_house(state: &LedgerState) -> Option<House> {
    let top = standings(state).into_iter().next()?;
    if top.points > 0 {
        Some(top.house)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn state_with(points: [(House, i64); 4]) -> LedgerState {
        LedgerState {
            totals: points.into_iter().collect::<HashMap<_, _>>(),
            log: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_standings_sorted_descending_with_ranks() {
        let state = state_with([
            (House::Gryffindor, 100),
            (House::Slytherin, 100),
            (House::Hufflepuff, 50),
            (House::Ravenclaw, 0),
        ]);

        let board = standings(&state);
        let ranks: Vec<usize> = board.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);

        // Tie at 100 resolves by declaration order: Gryffindor before Slytherin
        assert_eq!(board[0].house, House::Gryffindor);
        assert_eq!(board[1].house, House::Slytherin);
        assert_eq!(board[2].house, House::Hufflepuff);
        assert_eq!(board[3].house, House::Ravenclaw);
    }

    #[test]
    fn test_leading_house_on_tie_is_deterministic() {
        let state = state_with([
            (House::Gryffindor, 100),
            (House::Slytherin, 100),
            (House::Hufflepuff, 50),
            (House::Ravenclaw, 0),
        ]);

        assert_eq!(leading_house(&state), Some(House::Gryffindor));
        assert_eq!(total_points(&state), 250);
    }

    #[test]
    fn test_no_leader_when_all_zero() {
        let state = state_with([
            (House::Gryffindor, 0),
            (House::Slytherin, 0),
            (House::Hufflepuff, 0),
            (House::Ravenclaw, 0),
        ]);

        assert_eq!(leading_house(&state), None);
        assert_eq!(standings(&state)[0].rank, 1, "rank 1 still exists");
    }

    #[test]
    fn test_no_leader_when_max_is_negative() {
        let state = state_with([
            (House::Gryffindor, -10),
            (House::Slytherin, -5),
            (House::Hufflepuff, -20),
            (House::Ravenclaw, -1),
        ]);

        assert_eq!(leading_house(&state), None);
        let board = standings(&state);
        assert_eq!(board[0].house, House::Ravenclaw);
        assert_eq!(total_points(&state), -36);
    }
}
