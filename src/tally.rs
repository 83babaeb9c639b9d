use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::SessionError;
use crate::submissions::SubmissionStore;
use crate::types::{PlayerId, Standing, VoteDirection};

/// Up/down votes for one round, keyed by (voter, submission owner).
#[derive(Debug, Clone, Default)]
pub struct VoteTally {
    votes: HashMap<(PlayerId, PlayerId), VoteDirection>,
    sealed: bool,
}

impl VoteTally {
    /// Records a vote. A repeated (voter, target) pair replaces the earlier direction.
    pub fn cast(
        &mut self,
        voter: PlayerId,
        target: PlayerId,
        direction: VoteDirection,
        submissions: &SubmissionStore,
    ) -> Result<(), SessionError> {
        if self.sealed {
            return Err(SessionError::PhaseMismatch);
        }
        if voter == target {
            return Err(SessionError::SelfVote);
        }
        if !submissions.contains(target) {
            return Err(SessionError::SubmissionNotFound);
        }
        self.votes.insert((voter, target), direction);
        Ok(())
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn has_voted(&self, voter: PlayerId, target: PlayerId) -> bool {
        self.votes.contains_key(&(voter, target))
    }

    pub fn vote(&self, voter: PlayerId, target: PlayerId) -> Option<VoteDirection> {
        self.votes.get(&(voter, target)).copied()
    }

    pub fn votes_cast(&self) -> usize {
        self.votes.len()
    }

    /// Upvotes minus downvotes for one submission.
    pub fn score(&self, target: PlayerId) -> i64 {
        self.votes
            .iter()
            .filter(|((_, t), _)| *t == target)
            .map(|(_, direction)| direction.weight())
            .sum()
    }

    /// Aggregate score for every submission owner.
    pub fn totals(&self, submissions: &SubmissionStore) -> HashMap<PlayerId, i64> {
        submissions
            .in_order()
            .into_iter()
            .map(|s| (s.player_id, self.score(s.player_id)))
            .collect()
    }

    /// Orders the participants of a round.
    ///
    /// Players with a submission come first, by aggregate score descending,
    /// then earlier submission, then player id. Players without a submission
    /// follow, by player id.
    pub fn ranking(&self, participants: &[PlayerId], submissions: &SubmissionStore) -> Vec<Standing> {
        let mut entries: Vec<(Standing, Option<u64>)> = participants
            .iter()
            .map(|&player_id| {
                let order = submissions.get(player_id).map(|s| s.order);
                let score = if order.is_some() { self.score(player_id) } else { 0 };
                (
                    Standing {
                        player_id,
                        score,
                        submitted: order.is_some(),
                    },
                    order,
                )
            })
            .collect();

        entries.sort_by(|(a, a_order), (b, b_order)| match (a_order, b_order) {
            (Some(a_order), Some(b_order)) => b
                .score
                .cmp(&a.score)
                .then_with(|| a_order.cmp(b_order))
                .then_with(|| a.player_id.cmp(&b.player_id)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.player_id.cmp(&b.player_id),
        });

        entries.into_iter().map(|(standing, _)| standing).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn store_with(players: &[PlayerId]) -> SubmissionStore {
        let mut store = SubmissionStore::default();
        for player in players {
            store
                .submit(*player, "t".to_string(), format!("top {player}"), "bottom".to_string())
                .unwrap();
        }
        store
    }

    #[test]
    fn latest_vote_wins() {
        let voter = Uuid::new_v4();
        let target = Uuid::new_v4();
        let store = store_with(&[target]);
        let mut tally = VoteTally::default();

        tally.cast(voter, target, VoteDirection::Up, &store).unwrap();
        tally.cast(voter, target, VoteDirection::Down, &store).unwrap();

        assert_eq!(tally.votes_cast(), 1);
        assert_eq!(tally.vote(voter, target), Some(VoteDirection::Down));
        assert_eq!(tally.score(target), -1);
    }

    #[test]
    fn self_vote_never_counts() {
        let player = Uuid::new_v4();
        let store = store_with(&[player]);
        let mut tally = VoteTally::default();

        for direction in [VoteDirection::Up, VoteDirection::Down] {
            assert_eq!(
                tally.cast(player, player, direction, &store).unwrap_err(),
                SessionError::SelfVote
            );
        }
        assert_eq!(tally.votes_cast(), 0);
        assert_eq!(tally.score(player), 0);
    }

    #[test]
    fn vote_needs_a_submission() {
        let store = store_with(&[]);
        let mut tally = VoteTally::default();
        let err = tally
            .cast(Uuid::new_v4(), Uuid::new_v4(), VoteDirection::Up, &store)
            .unwrap_err();
        assert_eq!(err, SessionError::SubmissionNotFound);
    }

    #[test]
    fn sealed_tally_rejects_votes() {
        let target = Uuid::new_v4();
        let store = store_with(&[target]);
        let mut tally = VoteTally::default();
        tally.seal();
        assert_eq!(
            tally.cast(Uuid::new_v4(), target, VoteDirection::Up, &store).unwrap_err(),
            SessionError::PhaseMismatch
        );
    }

    #[test]
    fn ranks_by_score_then_unsubmitted_last() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let voters: Vec<PlayerId> = (0..3).map(|_| Uuid::new_v4()).collect();
        let store = store_with(&[a, b]);
        let mut tally = VoteTally::default();

        tally.cast(voters[0], a, VoteDirection::Up, &store).unwrap();
        tally.cast(voters[1], a, VoteDirection::Up, &store).unwrap();
        tally.cast(voters[2], a, VoteDirection::Down, &store).unwrap();
        for voter in &voters {
            tally.cast(*voter, b, VoteDirection::Up, &store).unwrap();
        }

        assert_eq!(tally.score(a), 1);
        assert_eq!(tally.score(b), 3);

        let ranking = tally.ranking(&[a, b, c], &store);
        let order: Vec<PlayerId> = ranking.iter().map(|s| s.player_id).collect();
        assert_eq!(order, vec![b, a, c]);
        assert!(!ranking[2].submitted);
    }

    #[test]
    fn ties_go_to_the_earlier_submission() {
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        let store = store_with(&[first, second]);
        let tally = VoteTally::default();

        let ranking = tally.ranking(&[second, first], &store);
        assert_eq!(ranking[0].player_id, first);
        assert_eq!(ranking[1].player_id, second);
    }

    #[test]
    fn unsubmitted_sort_after_negative_scores() {
        let (loser, idle) = (Uuid::new_v4(), Uuid::new_v4());
        let store = store_with(&[loser]);
        let mut tally = VoteTally::default();
        tally.cast(idle, loser, VoteDirection::Down, &store).unwrap();

        let ranking = tally.ranking(&[idle, loser], &store);
        assert_eq!(ranking[0].player_id, loser);
        assert_eq!(ranking[0].score, -1);
        assert_eq!(ranking[1].player_id, idle);
    }
}
