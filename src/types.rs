use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;

pub type PlayerId = Uuid;
pub type SessionId = Uuid;

/// Whether a player currently has a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Connection {
    Active,
    Disconnected,
}

/// A player in a game session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    /// Identity token supplied by the sign-in provider. Never sent to other players.
    #[serde(skip_serializing, default)]
    pub client_id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    pub score: i64,
    pub connection: Connection,
}

impl Player {
    pub fn is_active(&self) -> bool {
        self.connection == Connection::Active
    }
}

/// What the identity provider tells us about someone joining.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub client_id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// A meme template from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn weight(self) -> i64 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }
}

/// All phases a session moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Lobby,
    RoundIntro,
    Creation,
    Voting,
    Results,
    Closed,
}

impl Phase {
    /// The declared edges of the session state machine.
    pub fn can_transition_to(self, next: Phase) -> bool {
        match (self, next) {
            (Self::Closed, _) => false,
            (_, Self::Closed) => true,
            (Self::Lobby, Self::RoundIntro)
            | (Self::RoundIntro, Self::Creation)
            | (Self::Creation, Self::Voting)
            | (Self::Voting, Self::Results)
            | (Self::Results, Self::Lobby) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lobby => write!(f, "LOBBY"),
            Self::RoundIntro => write!(f, "ROUND_INTRO"),
            Self::Creation => write!(f, "CREATION"),
            Self::Voting => write!(f, "VOTING"),
            Self::Results => write!(f, "RESULTS"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// A submission as shown to a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionView {
    pub player_id: PlayerId,
    pub template: String,
    pub top_text: String,
    pub bottom_text: String,
}

/// One line of a round ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub player_id: PlayerId,
    pub score: i64,
    pub submitted: bool,
}

/// A player's place on the session leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub player_id: PlayerId,
    pub name: String,
    pub score: i64,
}

/// A finished round as kept for the leaderboard history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundSummary {
    pub number: u32,
    pub template: String,
    pub ranking: Vec<Standing>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundView {
    pub number: u32,
    pub template: String,
    /// Who has submitted so far. Visible in every phase.
    pub submitted: Vec<PlayerId>,
    /// Submission contents. Before voting only the viewer's own is included.
    pub submissions: Vec<SubmissionView>,
    pub votes_cast: usize,
    /// Filled once the round reaches results.
    pub ranking: Vec<Standing>,
}

/// Everything a client needs to render the session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub invite_code: String,
    pub phase: Phase,
    pub round: u32,
    pub host: Option<PlayerId>,
    pub players: Vec<Player>,
    pub current_round: Option<RoundView>,
    /// Everyone by cumulative score, highest first, ties by player id.
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Top of the leaderboard once a round has finished.
    pub leader: Option<PlayerId>,
    /// Finished rounds, oldest first.
    pub history: Vec<RoundSummary>,
    /// The player this snapshot was rendered for, if any.
    pub viewer: Option<PlayerId>,
}

/// Messages sent from server to clients via WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMsg {
    Joined {
        player_id: PlayerId,
        snapshot: SessionSnapshot,
    },
    State {
        snapshot: SessionSnapshot,
    },
    Error {
        code: SessionError,
        message: String,
    },
    Left {
        session_id: SessionId,
    },
    Closed {
        session_id: SessionId,
    },
}

impl From<SessionError> for ServerMsg {
    fn from(err: SessionError) -> Self {
        Self::Error {
            code: err,
            message: err.to_string(),
        }
    }
}

/// Messages sent from clients to server via WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMsg {
    CreateSession {
        name: String,
        #[serde(default)]
        avatar: Option<String>,
    },
    JoinSession {
        invite_code: String,
        name: String,
        #[serde(default)]
        avatar: Option<String>,
    },
    LeaveSession,
    StartRound,
    SubmitMeme {
        round: u32,
        #[serde(default)]
        template: Option<String>,
        top_text: String,
        bottom_text: String,
    },
    CastVote {
        target: PlayerId,
        direction: VoteDirection,
    },
    PlayAgain,
    RequestState,
    CloseSession,
}
