use std::collections::HashMap;

use uuid::Uuid;

use crate::error::SessionError;
use crate::types::{Connection, Player, PlayerId, Profile};

const MAX_NAME_CHARS: usize = 20;

/// Result of a successful join.
#[derive(Debug, Clone)]
pub enum Joined {
    /// A new player was added to the roster.
    New(Player),
    /// A disconnected player came back with the same client id.
    Reconnected(Player),
}

impl Joined {
    pub fn player(&self) -> &Player {
        match self {
            Self::New(player) | Self::Reconnected(player) => player,
        }
    }
}

/// The players of one session, in join order.
#[derive(Debug, Clone)]
pub struct Roster {
    players: Vec<Player>,
    host: Option<PlayerId>,
    max_players: usize,
}

fn validate_name(name: &str) -> Result<String, SessionError> {
    let name = name.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_NAME_CHARS {
        return Err(SessionError::InvalidName);
    }
    Ok(name.to_string())
}

impl Roster {
    pub fn new(max_players: usize) -> Self {
        Self {
            players: Vec::new(),
            host: None,
            max_players,
        }
    }

    /// Adds a player, or reconnects a disconnected one with the same client id.
    pub fn join(&mut self, profile: Profile) -> Result<Joined, SessionError> {
        let name = validate_name(&profile.name)?;

        if let Some(existing) = self.players.iter_mut().find(|p| p.client_id == profile.client_id) {
            if existing.is_active() {
                return Err(SessionError::DuplicatePlayer);
            }
            existing.connection = Connection::Active;
            return Ok(Joined::Reconnected(existing.clone()));
        }

        if self.players.len() >= self.max_players {
            return Err(SessionError::SessionFull);
        }

        let player = Player {
            id: Uuid::new_v4(),
            client_id: profile.client_id,
            name,
            avatar: profile.avatar,
            score: 0,
            connection: Connection::Active,
        };
        if self.host.is_none() {
            self.host = Some(player.id);
        }
        self.players.push(player.clone());
        Ok(Joined::New(player))
    }

    /// Removes a player. Absent players are ignored.
    pub fn leave(&mut self, player_id: PlayerId) -> Option<Player> {
        let index = self.players.iter().position(|p| p.id == player_id)?;
        let player = self.players.remove(index);
        if self.host == Some(player_id) {
            self.host = self.players.first().map(|p| p.id);
        }
        Some(player)
    }

    pub fn disconnect(&mut self, player_id: PlayerId) -> Result<(), SessionError> {
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == player_id)
            .ok_or(SessionError::PlayerNotFound)?;
        player.connection = Connection::Disconnected;
        Ok(())
    }

    pub fn get(&self, player_id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.get(player_id).is_some()
    }

    pub fn is_active(&self, player_id: PlayerId) -> bool {
        self.get(player_id).is_some_and(Player::is_active)
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.id).collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn host(&self) -> Option<PlayerId> {
        self.host
    }

    pub fn is_host(&self, player_id: PlayerId) -> bool {
        self.host == Some(player_id)
    }

    /// Overwrites every cumulative score from totals derived from vote history.
    pub fn apply_scores(&mut self, totals: &HashMap<PlayerId, i64>) {
        for player in &mut self.players {
            player.score = totals.get(&player.id).copied().unwrap_or(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(client: &str, name: &str) -> Profile {
        Profile {
            client_id: client.to_string(),
            name: name.to_string(),
            avatar: None,
        }
    }

    #[test]
    fn never_exceeds_max_players() {
        let mut roster = Roster::new(3);
        for i in 0..3 {
            roster.join(profile(&format!("c{i}"), &format!("Player {i}"))).unwrap();
            assert!(roster.len() <= 3);
        }
        let err = roster.join(profile("c3", "Late")).unwrap_err();
        assert_eq!(err, SessionError::SessionFull);
        assert_eq!(roster.len(), 3);
    }

    #[test]
    fn first_player_hosts_and_host_passes_on_leave() {
        let mut roster = Roster::new(4);
        let a = roster.join(profile("a", "Alice")).unwrap().player().id;
        let b = roster.join(profile("b", "Bob")).unwrap().player().id;
        assert!(roster.is_host(a));

        roster.leave(a);
        assert!(roster.is_host(b));

        roster.leave(b);
        assert_eq!(roster.host(), None);
    }

    #[test]
    fn leave_is_silent_when_absent() {
        let mut roster = Roster::new(2);
        assert!(roster.leave(Uuid::new_v4()).is_none());
    }

    #[test]
    fn duplicate_client_is_rejected_while_active() {
        let mut roster = Roster::new(4);
        roster.join(profile("a", "Alice")).unwrap();
        assert_eq!(
            roster.join(profile("a", "Alice again")).unwrap_err(),
            SessionError::DuplicatePlayer
        );
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn disconnected_client_reconnects_even_when_full() {
        let mut roster = Roster::new(1);
        let id = roster.join(profile("a", "Alice")).unwrap().player().id;
        roster.disconnect(id).unwrap();
        assert!(!roster.is_active(id));

        match roster.join(profile("a", "Alice")).unwrap() {
            Joined::Reconnected(player) => assert_eq!(player.id, id),
            Joined::New(_) => panic!("expected reconnect"),
        }
        assert!(roster.is_active(id));
    }

    #[test]
    fn names_are_trimmed_and_bounded() {
        let mut roster = Roster::new(4);
        assert_eq!(roster.join(profile("a", "   ")).unwrap_err(), SessionError::InvalidName);
        assert_eq!(
            roster.join(profile("b", &"x".repeat(21))).unwrap_err(),
            SessionError::InvalidName
        );
        let player = roster.join(profile("c", "  Carol ")).unwrap();
        assert_eq!(player.player().name, "Carol");
    }
}
