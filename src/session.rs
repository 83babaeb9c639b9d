//! The session state machine.
//!
//! A [`Session`] is the explicit record of one game: its roster, its phase
//! and its round history. It is plain data with no timers or channels; the
//! task in [`crate::game`] owns one and is the only thing that mutates it.

use std::collections::HashMap;

use crate::config::GameConfig;
use crate::error::SessionError;
use crate::players::{Joined, Roster};
use crate::submissions::SubmissionStore;
use crate::tally::VoteTally;
use crate::types::*;

/// A phase change that was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
}

/// One round of play. Kept after completion for the leaderboard.
#[derive(Debug, Clone)]
pub struct Round {
    pub number: u32,
    pub template: String,
    participants: Vec<PlayerId>,
    submissions: SubmissionStore,
    tally: VoteTally,
}

impl Round {
    fn new(number: u32, template: String, participants: Vec<PlayerId>) -> Self {
        Self {
            number,
            template,
            participants,
            submissions: SubmissionStore::default(),
            tally: VoteTally::default(),
        }
    }

    pub fn participants(&self) -> &[PlayerId] {
        &self.participants
    }

    pub fn submissions(&self) -> &SubmissionStore {
        &self.submissions
    }

    pub fn tally(&self) -> &VoteTally {
        &self.tally
    }

    pub fn ranking(&self) -> Vec<Standing> {
        self.tally.ranking(&self.participants, &self.submissions)
    }

    /// Whether voting has closed and the ranking is final.
    pub fn is_finished(&self) -> bool {
        self.tally.is_sealed()
    }

    fn summary(&self) -> RoundSummary {
        RoundSummary {
            number: self.number,
            template: self.template.clone(),
            ranking: self.ranking(),
        }
    }

    fn view(&self, viewer: Option<PlayerId>) -> RoundView {
        let revealed = self.submissions.is_sealed();
        let in_order = self.submissions.in_order();
        RoundView {
            number: self.number,
            template: self.template.clone(),
            submitted: in_order.iter().map(|s| s.player_id).collect(),
            submissions: in_order
                .iter()
                .filter(|s| revealed || Some(s.player_id) == viewer)
                .map(|s| s.view())
                .collect(),
            votes_cast: self.tally.votes_cast(),
            ranking: if self.is_finished() {
                self.ranking()
            } else {
                Vec::new()
            },
        }
    }
}

/// The full state of one game session.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    invite_code: String,
    phase: Phase,
    roster: Roster,
    rounds: Vec<Round>,
    min_players: usize,
}

impl Session {
    pub fn new(id: SessionId, invite_code: String, config: &GameConfig) -> Self {
        Self {
            id,
            invite_code,
            phase: Phase::Lobby,
            roster: Roster::new(config.max_players),
            rounds: Vec::new(),
            min_players: config.min_players,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn invite_code(&self) -> &str {
        &self.invite_code
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    pub fn current_round(&self) -> Option<&Round> {
        self.rounds.last()
    }

    /// Number of the latest round, 0 before the first one starts.
    pub fn round_number(&self) -> u32 {
        self.current_round().map_or(0, |r| r.number)
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.phase == Phase::Closed {
            return Err(SessionError::SessionNotFound);
        }
        Ok(())
    }

    fn ensure_member(&self, player_id: PlayerId) -> Result<(), SessionError> {
        if !self.roster.contains(player_id) {
            return Err(SessionError::PlayerNotFound);
        }
        Ok(())
    }

    fn ensure_host(&self, player_id: PlayerId) -> Result<(), SessionError> {
        if !self.roster.is_host(player_id) {
            return Err(SessionError::NotHost);
        }
        Ok(())
    }

    fn round_mut(&mut self) -> Result<&mut Round, SessionError> {
        self.rounds.last_mut().ok_or(SessionError::PhaseMismatch)
    }

    /// Moves along a declared edge and applies what entering the new phase implies.
    fn transition(&mut self, to: Phase) -> Result<Transition, SessionError> {
        let from = self.phase;
        if !from.can_transition_to(to) {
            return Err(SessionError::InvalidTransition);
        }

        match to {
            Phase::Voting => {
                if let Some(round) = self.rounds.last_mut() {
                    round.submissions.seal();
                }
            }
            Phase::Results => {
                if let Some(round) = self.rounds.last_mut() {
                    round.submissions.seal();
                    round.tally.seal();
                }
                self.recompute_scores();
            }
            _ => {}
        }

        self.phase = to;
        tracing::debug!("Session {} {} -> {}", self.invite_code, from, to);
        Ok(Transition { from, to })
    }

    /// Cumulative scores are the sum of every completed round's tally.
    fn recompute_scores(&mut self) {
        let mut totals: HashMap<PlayerId, i64> = HashMap::new();
        for round in self.rounds.iter().filter(|r| r.is_finished()) {
            for (player_id, score) in round.tally.totals(&round.submissions) {
                *totals.entry(player_id).or_insert(0) += score;
            }
        }
        self.roster.apply_scores(&totals);
    }

    pub fn join(&mut self, profile: Profile) -> Result<Joined, SessionError> {
        self.ensure_open()?;
        let returning = self
            .roster
            .players()
            .iter()
            .any(|p| p.client_id == profile.client_id);
        if !returning && !matches!(self.phase, Phase::Lobby | Phase::Results) {
            return Err(SessionError::PhaseMismatch);
        }
        self.roster.join(profile)
    }

    /// Removes a player. Silently does nothing if they are not here.
    pub fn leave(&mut self, player_id: PlayerId) -> Option<Player> {
        if self.phase == Phase::Closed {
            return None;
        }
        let player = self.roster.leave(player_id)?;

        if matches!(self.phase, Phase::RoundIntro | Phase::Creation) {
            if let Some(round) = self.rounds.last_mut() {
                round.participants.retain(|id| *id != player_id);
                round.submissions.withdraw(player_id);
            }
        }
        Some(player)
    }

    pub fn disconnect(&mut self, player_id: PlayerId) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.roster.disconnect(player_id)
    }

    pub fn start_round(&mut self, by: PlayerId, template: String) -> Result<Transition, SessionError> {
        self.ensure_open()?;
        self.ensure_member(by)?;
        if self.phase != Phase::Lobby {
            return Err(SessionError::InvalidTransition);
        }
        self.ensure_host(by)?;
        let active = self.roster.players().iter().filter(|p| p.is_active()).count();
        if active < self.min_players {
            return Err(SessionError::InvalidTransition);
        }

        let transition = self.transition(Phase::RoundIntro)?;
        let number = self.round_number() + 1;
        self.rounds.push(Round::new(number, template, self.roster.ids()));
        Ok(transition)
    }

    pub fn submit(
        &mut self,
        player_id: PlayerId,
        round: u32,
        template: Option<String>,
        top_text: String,
        bottom_text: String,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        if self.phase != Phase::Creation || round != self.round_number() {
            return Err(SessionError::PhaseMismatch);
        }
        let current = self.round_mut()?;
        if !current.participants.contains(&player_id) {
            return Err(SessionError::PlayerNotFound);
        }
        let template = template.unwrap_or_else(|| current.template.clone());
        current
            .submissions
            .submit(player_id, template, top_text, bottom_text)
    }

    pub fn cast_vote(
        &mut self,
        voter: PlayerId,
        target: PlayerId,
        direction: VoteDirection,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        if self.phase != Phase::Voting {
            return Err(SessionError::PhaseMismatch);
        }
        let current = self.round_mut()?;
        if !current.participants.contains(&voter) {
            return Err(SessionError::PlayerNotFound);
        }
        current.tally.cast(voter, target, direction, &current.submissions)
    }

    pub fn play_again(&mut self, by: PlayerId) -> Result<Transition, SessionError> {
        self.ensure_open()?;
        self.ensure_member(by)?;
        if self.phase != Phase::Results {
            return Err(SessionError::InvalidTransition);
        }
        self.ensure_host(by)?;
        self.transition(Phase::Lobby)
    }

    pub fn close(&mut self) -> Result<Transition, SessionError> {
        self.transition(Phase::Closed)
    }

    /// Called when the deadline of `phase` elapses.
    ///
    /// Returns `Ok(None)` if the session has already left that phase. A
    /// session whose roster emptied out is closed instead of advanced.
    pub fn expire(&mut self, phase: Phase) -> Result<Option<Transition>, SessionError> {
        if self.phase != phase {
            return Ok(None);
        }
        if self.roster.is_empty() {
            return self.close().map(Some);
        }
        let next = match phase {
            Phase::RoundIntro => Phase::Creation,
            Phase::Creation => Phase::Voting,
            Phase::Voting => Phase::Results,
            Phase::Lobby | Phase::Results | Phase::Closed => {
                return Err(SessionError::InvalidTransition);
            }
        };
        self.transition(next).map(Some)
    }

    /// Applies every transition whose completion condition already holds.
    pub fn settle(&mut self) -> Vec<Transition> {
        let mut applied = Vec::new();
        loop {
            let next = match self.phase {
                Phase::Creation if self.all_submitted() => Phase::Voting,
                Phase::Voting if self.all_voted() => Phase::Results,
                _ => break,
            };
            match self.transition(next) {
                Ok(transition) => applied.push(transition),
                Err(_) => break,
            }
        }
        applied
    }

    fn active_participants(&self) -> Vec<PlayerId> {
        self.current_round()
            .map(|round| {
                round
                    .participants
                    .iter()
                    .copied()
                    .filter(|id| self.roster.is_active(*id))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn all_submitted(&self) -> bool {
        let Some(round) = self.current_round() else {
            return false;
        };
        let active = self.active_participants();
        !active.is_empty() && active.iter().all(|id| round.submissions.contains(*id))
    }

    fn all_voted(&self) -> bool {
        let Some(round) = self.current_round() else {
            return false;
        };
        let active = self.active_participants();
        !active.is_empty()
            && active.iter().all(|voter| {
                round
                    .submissions
                    .in_order()
                    .iter()
                    .filter(|s| s.player_id != *voter)
                    .all(|s| round.tally.has_voted(*voter, s.player_id))
            })
    }

    /// Current players by cumulative score, highest first, ties by player id.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> = self
            .roster
            .players()
            .iter()
            .map(|p| LeaderboardEntry {
                player_id: p.id,
                name: p.name.clone(),
                score: p.score,
            })
            .collect();
        entries.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.player_id.cmp(&b.player_id)));
        entries
    }

    pub fn history(&self) -> Vec<RoundSummary> {
        self.rounds
            .iter()
            .filter(|r| r.is_finished())
            .map(Round::summary)
            .collect()
    }

    /// Renders the session for one viewer, or for everyone when `viewer` is `None`.
    pub fn snapshot(&self, viewer: Option<PlayerId>) -> SessionSnapshot {
        let leaderboard = self.leaderboard();
        let history = self.history();
        let leader = if history.is_empty() {
            None
        } else {
            leaderboard.first().map(|e| e.player_id)
        };
        SessionSnapshot {
            session_id: self.id,
            invite_code: self.invite_code.clone(),
            phase: self.phase,
            round: self.round_number(),
            host: self.roster.host(),
            players: self.roster.players().to_vec(),
            current_round: self.current_round().map(|r| r.view(viewer)),
            leaderboard,
            leader,
            history,
            viewer,
        }
    }
}
