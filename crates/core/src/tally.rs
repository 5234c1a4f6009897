//! Derivation of a version's total votes and winning party.

use std::collections::BTreeMap;

/// Sum of all parties' votes. A first-place tie still counts every party.
pub fn total_votes(party_votes: &BTreeMap<String, i64>) -> i64 {
    party_votes.values().sum()
}

/// The party with strictly the greatest votes, or `None` on a tie for
/// first place (or an empty tally).
pub fn winning_party(party_votes: &BTreeMap<String, i64>) -> Option<String> {
    let mut winner: Option<&str> = None;
    let mut max_votes = i64::MIN;
    let mut tied = false;

    for (code, votes) in party_votes {
        if *votes > max_votes {
            max_votes = *votes;
            winner = Some(code);
            tied = false;
        } else if *votes == max_votes {
            tied = true;
        }
    }

    if tied {
        None
    } else {
        winner.map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(entries: &[(&str, i64)]) -> BTreeMap<String, i64> {
        entries
            .iter()
            .map(|(code, votes)| (code.to_string(), *votes))
            .collect()
    }

    #[test]
    fn sums_all_parties() {
        let votes = tally(&[("C", 6643), ("L", 5276)]);
        assert_eq!(total_votes(&votes), 11919);
    }

    #[test]
    fn strict_maximum_wins() {
        let votes = tally(&[("C", 100), ("L", 50)]);
        assert_eq!(winning_party(&votes).as_deref(), Some("C"));
    }

    #[test]
    fn first_place_tie_has_no_winner_but_full_total() {
        let votes = tally(&[("C", 100), ("L", 100), ("G", 10)]);
        assert_eq!(winning_party(&votes), None);
        assert_eq!(total_votes(&votes), 210);
    }

    #[test]
    fn tie_below_first_place_still_has_winner() {
        let votes = tally(&[("C", 100), ("L", 40), ("G", 40)]);
        assert_eq!(winning_party(&votes).as_deref(), Some("C"));
    }

    #[test]
    fn empty_tally_is_empty() {
        let votes = BTreeMap::new();
        assert_eq!(total_votes(&votes), 0);
        assert_eq!(winning_party(&votes), None);
    }

    #[test]
    fn single_party_wins_outright() {
        let votes = tally(&[("Ind", 1)]);
        assert_eq!(winning_party(&votes).as_deref(), Some("Ind"));
    }
}
