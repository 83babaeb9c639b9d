use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::Rng;
use rand::seq::IndexedRandom;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use crate::clock::{RoundClock, TimerFired, TimerKey};
use crate::config::GameConfig;
use crate::error::SessionError;
use crate::players::Joined;
use crate::session::Session;
use crate::types::*;

const INVITE_CODE_LEN: usize = 6;
const INVITE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Commands a session task processes one at a time.
#[derive(Debug)]
pub enum GameCommand {
    Join {
        profile: Profile,
        reply: Reply<(PlayerId, SessionSnapshot)>,
    },
    Leave {
        player_id: PlayerId,
        reply: Reply<()>,
    },
    Disconnect {
        player_id: PlayerId,
    },
    StartRound {
        player_id: PlayerId,
        reply: Reply<SessionSnapshot>,
    },
    Submit {
        player_id: PlayerId,
        round: u32,
        template: Option<String>,
        top_text: String,
        bottom_text: String,
        reply: Reply<SessionSnapshot>,
    },
    CastVote {
        player_id: PlayerId,
        target: PlayerId,
        direction: VoteDirection,
        reply: Reply<SessionSnapshot>,
    },
    PlayAgain {
        player_id: PlayerId,
        reply: Reply<SessionSnapshot>,
    },
    State {
        viewer: Option<PlayerId>,
        reply: Reply<SessionSnapshot>,
    },
    /// Only the host may close.
    Close {
        player_id: PlayerId,
        reply: Reply<()>,
    },
}

/// Events broadcast from a session to its subscribers.
#[derive(Debug, Clone)]
pub enum GameEvent {
    /// Public view of the session after a change.
    Snapshot(SessionSnapshot),
    /// The session is gone. Nothing follows this.
    Closed { session_id: SessionId },
}

fn create_invite_code() -> String {
    let mut rng = rand::rng();
    (0..INVITE_CODE_LEN)
        .map(|_| char::from(INVITE_ALPHABET[rng.random_range(0..INVITE_ALPHABET.len())]))
        .collect()
}

/// Registry holds all active sessions.
pub struct Registry {
    /// session_id -> handle
    pub sessions: DashMap<SessionId, SessionHandle>,
    /// invite_code -> session_id
    pub invite_codes: DashMap<String, SessionId>,
    /// client_id -> session_id the client is playing in
    pub clients: DashMap<String, SessionId>,
    config: GameConfig,
    templates: Vec<Template>,
}

impl Registry {
    pub fn new(config: GameConfig, templates: Vec<Template>) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            invite_codes: DashMap::new(),
            clients: DashMap::new(),
            config,
            templates,
        })
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn find(&self, session_id: SessionId) -> Result<SessionHandle, SessionError> {
        self.sessions
            .get(&session_id)
            .map(|h| h.value().clone())
            .ok_or(SessionError::SessionNotFound)
    }

    pub fn find_by_code(&self, invite_code: &str) -> Result<SessionHandle, SessionError> {
        let code = invite_code.trim().to_ascii_uppercase();
        let session_id = self
            .invite_codes
            .get(&code)
            .map(|id| *id.value())
            .ok_or(SessionError::SessionNotFound)?;
        self.find(session_id)
    }

    /// Picks a template reference for a new round.
    fn pick_template(&self) -> String {
        self.templates
            .choose(&mut rand::rng())
            .map(|t| t.url.clone())
            .unwrap_or_default()
    }

    fn reserve_invite_code(&self, session_id: SessionId) -> String {
        loop {
            let code = create_invite_code();
            if let Entry::Vacant(entry) = self.invite_codes.entry(code.clone()) {
                entry.insert(session_id);
                return code;
            }
        }
    }

    /// Binds a client to a session. Returns true if the binding is new.
    fn claim_client(&self, client_id: &str, session_id: SessionId) -> Result<bool, SessionError> {
        match self.clients.entry(client_id.to_string()) {
            Entry::Occupied(entry) if *entry.get() == session_id => Ok(false),
            Entry::Occupied(_) => Err(SessionError::DuplicatePlayer),
            Entry::Vacant(entry) => {
                entry.insert(session_id);
                Ok(true)
            }
        }
    }

    fn release_client(&self, client_id: &str, session_id: SessionId) {
        self.clients.remove_if(client_id, |_, id| *id == session_id);
    }

    pub fn remove_session(&self, session_id: SessionId) {
        if let Some((_, handle)) = self.sessions.remove(&session_id) {
            self.invite_codes.remove(&handle.invite_code);
        }
        self.clients.retain(|_, id| *id != session_id);
    }
}

/// Cheap, cloneable access to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    pub session_id: SessionId,
    pub invite_code: String,
    cmd_tx: mpsc::Sender<GameCommand>,
    event_tx: broadcast::Sender<GameEvent>,
}

impl SessionHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> GameCommand,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.cmd_tx
            .send(command(reply))
            .await
            .map_err(|_| SessionError::SessionNotFound)?;
        response.await.map_err(|_| SessionError::SessionNotFound)?
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.event_tx.subscribe()
    }

    pub async fn join(&self, profile: Profile) -> Result<(PlayerId, SessionSnapshot), SessionError> {
        self.request(|reply| GameCommand::Join { profile, reply }).await
    }

    pub async fn leave(&self, player_id: PlayerId) -> Result<(), SessionError> {
        self.request(|reply| GameCommand::Leave { player_id, reply }).await
    }

    pub async fn disconnect(&self, player_id: PlayerId) {
        let _ = self.cmd_tx.send(GameCommand::Disconnect { player_id }).await;
    }

    pub async fn start_round(&self, player_id: PlayerId) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| GameCommand::StartRound { player_id, reply }).await
    }

    pub async fn submit(
        &self,
        player_id: PlayerId,
        round: u32,
        template: Option<String>,
        top_text: String,
        bottom_text: String,
    ) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| GameCommand::Submit {
            player_id,
            round,
            template,
            top_text,
            bottom_text,
            reply,
        })
        .await
    }

    pub async fn cast_vote(
        &self,
        player_id: PlayerId,
        target: PlayerId,
        direction: VoteDirection,
    ) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| GameCommand::CastVote {
            player_id,
            target,
            direction,
            reply,
        })
        .await
    }

    pub async fn play_again(&self, player_id: PlayerId) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| GameCommand::PlayAgain { player_id, reply }).await
    }

    pub async fn state(&self, viewer: Option<PlayerId>) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| GameCommand::State { viewer, reply }).await
    }

    pub async fn close(&self, player_id: PlayerId) -> Result<(), SessionError> {
        self.request(|reply| GameCommand::Close { player_id, reply }).await
    }
}

/// Create a new session hosted by `host` and spawn its task.
pub fn create_session(
    registry: &Arc<Registry>,
    host: Profile,
) -> Result<(SessionHandle, PlayerId, SessionSnapshot), SessionError> {
    let session_id = Uuid::new_v4();
    let client_id = host.client_id.clone();
    registry.claim_client(&client_id, session_id)?;

    let invite_code = registry.reserve_invite_code(session_id);
    let mut session = Session::new(session_id, invite_code.clone(), registry.config());
    let host_id = match session.join(host) {
        Ok(joined) => joined.player().id,
        Err(err) => {
            registry.invite_codes.remove(&invite_code);
            registry.release_client(&client_id, session_id);
            return Err(err);
        }
    };
    let snapshot = session.snapshot(Some(host_id));

    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let (event_tx, _) = broadcast::channel(256);
    let handle = SessionHandle {
        session_id,
        invite_code: invite_code.clone(),
        cmd_tx,
        event_tx: event_tx.clone(),
    };
    registry.sessions.insert(session_id, handle.clone());

    let (clock, timer_rx) = RoundClock::new();
    let task = SessionTask {
        session,
        clock,
        registry: registry.clone(),
        event_tx,
    };
    tokio::spawn(game_task(task, cmd_rx, timer_rx));

    tracing::info!("Session created: {} invite: {}", session_id, invite_code);

    Ok((handle, host_id, snapshot))
}

/// Owner of one session's state. Only the task running [`game_task`] touches it.
struct SessionTask {
    session: Session,
    clock: RoundClock,
    registry: Arc<Registry>,
    event_tx: broadcast::Sender<GameEvent>,
}

async fn game_task(
    mut task: SessionTask,
    mut cmd_rx: mpsc::Receiver<GameCommand>,
    mut timer_rx: mpsc::UnboundedReceiver<TimerFired>,
) {
    task.arm_teardown();

    while task.session.phase() != Phase::Closed {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(cmd) => task.handle(cmd),
                None => break,
            },
            Some(fired) = timer_rx.recv() => task.on_timer(fired),
        }
    }

    task.teardown();
}

impl SessionTask {
    fn config(&self) -> &GameConfig {
        self.registry.config()
    }

    fn handle(&mut self, cmd: GameCommand) {
        let before = self.session.phase();
        match cmd {
            GameCommand::Join { profile, reply } => {
                let result = self.join(profile);
                let changed = result.is_ok();
                let _ = reply.send(result);
                if changed {
                    self.after_change(before);
                }
            }
            GameCommand::Leave { player_id, reply } => {
                if self.remove_player(player_id) {
                    self.after_change(before);
                }
                let _ = reply.send(Ok(()));
            }
            GameCommand::Disconnect { player_id } => {
                if self.session.disconnect(player_id).is_ok() {
                    let grace = self.config().reconnect_grace();
                    self.clock.arm(TimerKey::Reconnect(player_id), grace);
                    self.after_change(before);
                }
            }
            GameCommand::StartRound { player_id, reply } => {
                let template = self.registry.pick_template();
                let result = self.session.start_round(player_id, template).map(|_| ());
                self.respond(before, player_id, result, reply);
            }
            GameCommand::Submit {
                player_id,
                round,
                template,
                top_text,
                bottom_text,
                reply,
            } => {
                let result = self
                    .session
                    .submit(player_id, round, template, top_text, bottom_text);
                self.respond(before, player_id, result, reply);
            }
            GameCommand::CastVote {
                player_id,
                target,
                direction,
                reply,
            } => {
                let result = self.session.cast_vote(player_id, target, direction);
                self.respond(before, player_id, result, reply);
            }
            GameCommand::PlayAgain { player_id, reply } => {
                let result = self.session.play_again(player_id).map(|_| ());
                self.respond(before, player_id, result, reply);
            }
            GameCommand::State { viewer, reply } => {
                let _ = reply.send(Ok(self.session.snapshot(viewer)));
            }
            GameCommand::Close { player_id, reply } => {
                let result = self.close_by(player_id);
                let _ = reply.send(result);
            }
        }
    }

    /// Replies with the caller's view on success and publishes the change.
    fn respond(
        &mut self,
        before: Phase,
        player_id: PlayerId,
        result: Result<(), SessionError>,
        reply: Reply<SessionSnapshot>,
    ) {
        match result {
            Ok(()) => {
                self.after_change(before);
                let _ = reply.send(Ok(self.session.snapshot(Some(player_id))));
            }
            Err(err) => {
                let _ = reply.send(Err(err));
            }
        }
    }

    fn join(&mut self, profile: Profile) -> Result<(PlayerId, SessionSnapshot), SessionError> {
        let session_id = self.session.id();
        let client_id = profile.client_id.clone();
        let fresh_claim = self.registry.claim_client(&client_id, session_id)?;

        let joined = match self.session.join(profile) {
            Ok(joined) => joined,
            Err(err) => {
                if fresh_claim {
                    self.registry.release_client(&client_id, session_id);
                }
                return Err(err);
            }
        };

        let player_id = joined.player().id;
        match joined {
            Joined::New(player) => {
                tracing::info!("{} joined session {}", player.name, self.session.invite_code());
            }
            Joined::Reconnected(player) => {
                self.clock.cancel(TimerKey::Reconnect(player_id));
                tracing::info!("{} reconnected to session {}", player.name, self.session.invite_code());
            }
        }
        Ok((player_id, self.session.snapshot(Some(player_id))))
    }

    fn remove_player(&mut self, player_id: PlayerId) -> bool {
        let Some(player) = self.session.leave(player_id) else {
            return false;
        };
        self.clock.cancel(TimerKey::Reconnect(player_id));
        self.registry.release_client(&player.client_id, self.session.id());
        tracing::info!("{} left session {}", player.name, self.session.invite_code());
        true
    }

    fn close_by(&mut self, player_id: PlayerId) -> Result<(), SessionError> {
        let roster = self.session.roster();
        if !roster.contains(player_id) {
            return Err(SessionError::PlayerNotFound);
        }
        if !roster.is_host(player_id) {
            return Err(SessionError::NotHost);
        }
        self.session.close().map(|_| ())
    }

    /// Settles completion conditions, re-arms timers and publishes the new state.
    fn after_change(&mut self, before: Phase) {
        self.session.settle();
        let phase = self.session.phase();
        if phase == Phase::Closed {
            return;
        }
        if phase != before {
            let config = self.registry.config();
            self.clock.arm_phase(phase, config);
        }
        self.arm_teardown();
        let _ = self.event_tx.send(GameEvent::Snapshot(self.session.snapshot(None)));
    }

    /// An empty session closes after a short wait, an idle one after a long one.
    fn arm_teardown(&mut self) {
        let after = if self.session.roster().is_empty() {
            self.config().empty_session_timeout()
        } else {
            self.config().inactivity_timeout()
        };
        self.clock.arm(TimerKey::Teardown, after);
    }

    fn on_timer(&mut self, fired: TimerFired) {
        if !self.clock.accept(fired) {
            return;
        }
        let before = self.session.phase();
        match fired.key {
            TimerKey::Phase(phase) => match self.session.expire(phase) {
                Ok(Some(_)) => self.after_change(before),
                Ok(None) => {}
                Err(err) => {
                    tracing::debug!("Session {} deadline ignored: {}", self.session.invite_code(), err);
                }
            },
            TimerKey::Teardown => {
                tracing::info!("Session {} timed out", self.session.invite_code());
                let _ = self.session.close();
            }
            TimerKey::Reconnect(player_id) => {
                if !self.session.roster().is_active(player_id) && self.remove_player(player_id) {
                    self.after_change(before);
                }
            }
        }
    }

    fn teardown(&mut self) {
        self.clock.cancel_all();
        let session_id = self.session.id();
        self.registry.remove_session(session_id);
        let _ = self.event_tx.send(GameEvent::Closed { session_id });
        tracing::info!("Session {} task ended", self.session.invite_code());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn registry(max_players: usize) -> Arc<Registry> {
        let config = GameConfig {
            max_players,
            ..GameConfig::default()
        };
        let templates = vec![Template {
            id: "1".to_string(),
            name: "Drake".to_string(),
            url: "https://i.imgflip.com/30b1gx.jpg".to_string(),
        }];
        Registry::new(config, templates)
    }

    fn profile(client: &str) -> Profile {
        Profile {
            client_id: client.to_string(),
            name: format!("Player {client}"),
            avatar: None,
        }
    }

    async fn seat(handle: &SessionHandle, client: &str) -> PlayerId {
        handle.join(profile(client)).await.unwrap().0
    }

    async fn submit(handle: &SessionHandle, player: PlayerId, round: u32) -> Result<SessionSnapshot, SessionError> {
        handle
            .submit(player, round, None, format!("top {player}"), "bottom".to_string())
            .await
    }

    async fn wait(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn join_by_invite_code_until_full() {
        let registry = registry(3);
        let (handle, _, snapshot) = create_session(&registry, profile("host")).unwrap();
        assert_eq!(snapshot.invite_code.len(), INVITE_CODE_LEN);

        let found = registry.find_by_code(&handle.invite_code.to_lowercase()).unwrap();
        seat(&found, "b").await;
        seat(&found, "c").await;

        let err = found.join(profile("d")).await.unwrap_err();
        assert_eq!(err, SessionError::SessionFull);
        assert!(!registry.clients.contains_key("d"));

        let state = handle.state(None).await.unwrap();
        assert_eq!(state.players.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_invite_code_is_not_found() {
        let registry = registry(4);
        assert_eq!(
            registry.find_by_code("ZZZZZZ").err(),
            Some(SessionError::SessionNotFound)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn a_client_plays_in_one_session_at_a_time() {
        let registry = registry(4);
        let (first, _, _) = create_session(&registry, profile("alice")).unwrap();
        let (second, _, _) = create_session(&registry, profile("bob")).unwrap();

        assert_eq!(
            second.join(profile("alice")).await.unwrap_err(),
            SessionError::DuplicatePlayer
        );
        assert_eq!(
            create_session(&registry, profile("alice")).err(),
            Some(SessionError::DuplicatePlayer)
        );
        assert_eq!(
            first.join(profile("alice")).await.unwrap_err(),
            SessionError::DuplicatePlayer
        );
        assert_eq!(registry.sessions.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_drives_round_and_rejects_late_submission() {
        let registry = registry(4);
        let (handle, a, _) = create_session(&registry, profile("a")).unwrap();
        let b = seat(&handle, "b").await;
        let c = seat(&handle, "c").await;

        let snapshot = handle.start_round(a).await.unwrap();
        assert_eq!(snapshot.phase, Phase::RoundIntro);
        assert_eq!(snapshot.round, 1);
        assert_eq!(
            submit(&handle, a, 1).await.unwrap_err(),
            SessionError::PhaseMismatch
        );

        wait(registry.config().intro_countdown_secs + 1).await;
        assert_eq!(handle.state(None).await.unwrap().phase, Phase::Creation);

        submit(&handle, a, 1).await.unwrap();
        submit(&handle, b, 1).await.unwrap();

        wait(registry.config().creation_secs + 1).await;
        let state = handle.state(None).await.unwrap();
        assert_eq!(state.phase, Phase::Voting);

        assert_eq!(
            submit(&handle, c, 1).await.unwrap_err(),
            SessionError::PhaseMismatch
        );
        let round = handle.state(None).await.unwrap().current_round.unwrap();
        assert_eq!(round.submitted.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn last_submission_and_last_vote_advance_immediately() {
        let registry = registry(4);
        let (handle, a, _) = create_session(&registry, profile("a")).unwrap();
        let b = seat(&handle, "b").await;

        handle.start_round(a).await.unwrap();
        wait(registry.config().intro_countdown_secs + 1).await;

        submit(&handle, a, 1).await.unwrap();
        let snapshot = submit(&handle, b, 1).await.unwrap();
        assert_eq!(snapshot.phase, Phase::Voting);

        handle.cast_vote(a, b, VoteDirection::Up).await.unwrap();
        let snapshot = handle.cast_vote(b, a, VoteDirection::Up).await.unwrap();
        assert_eq!(snapshot.phase, Phase::Results);

        let ranking = snapshot.current_round.unwrap().ranking;
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].player_id, a);

        let snapshot = handle.play_again(a).await.unwrap();
        assert_eq!(snapshot.phase, Phase::Lobby);
        assert!(snapshot.players.iter().all(|p| p.score == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn voting_times_out_into_results() {
        let registry = registry(4);
        let (handle, a, _) = create_session(&registry, profile("a")).unwrap();
        let b = seat(&handle, "b").await;

        handle.start_round(a).await.unwrap();
        wait(registry.config().intro_countdown_secs + 1).await;
        submit(&handle, a, 1).await.unwrap();
        submit(&handle, b, 1).await.unwrap();
        handle.cast_vote(b, a, VoteDirection::Down).await.unwrap();

        wait(registry.config().voting_secs + 1).await;
        let state = handle.state(None).await.unwrap();
        assert_eq!(state.phase, Phase::Results);
        let score_of = |id: PlayerId| state.players.iter().find(|p| p.id == id).unwrap().score;
        assert_eq!(score_of(a), -1);
        assert_eq!(score_of(b), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_timers_and_forgets_session() {
        let registry = registry(4);
        let (handle, a, _) = create_session(&registry, profile("a")).unwrap();
        let b = seat(&handle, "b").await;
        let mut events = handle.subscribe();

        handle.start_round(a).await.unwrap();
        assert_eq!(handle.close(b).await.unwrap_err(), SessionError::NotHost);
        handle.close(a).await.unwrap();

        assert_eq!(handle.state(None).await.unwrap_err(), SessionError::SessionNotFound);
        assert_eq!(
            registry.find_by_code(&handle.invite_code).err(),
            Some(SessionError::SessionNotFound)
        );
        assert!(registry.clients.is_empty());

        wait(registry.config().creation_secs * 2).await;
        assert_eq!(
            submit(&handle, a, 1).await.unwrap_err(),
            SessionError::SessionNotFound
        );

        let mut saw_closed = false;
        while let Ok(event) = events.try_recv() {
            assert!(!saw_closed, "event after close");
            if let GameEvent::Closed { session_id } = event {
                assert_eq!(session_id, handle.session_id);
                saw_closed = true;
            }
        }
        assert!(saw_closed);

        create_session(&registry, profile("a")).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn empty_session_is_torn_down() {
        let registry = registry(4);
        let (handle, a, _) = create_session(&registry, profile("a")).unwrap();

        handle.leave(a).await.unwrap();
        handle.leave(a).await.unwrap();
        assert!(registry.find(handle.session_id).is_ok());

        wait(registry.config().empty_session_timeout_secs + 1).await;
        assert!(registry.find(handle.session_id).is_err());
        assert!(registry.invite_codes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_player_has_a_grace_period() {
        let registry = registry(4);
        let (handle, a, _) = create_session(&registry, profile("a")).unwrap();
        let b = seat(&handle, "b").await;

        handle.disconnect(b).await;
        wait(registry.config().reconnect_grace_secs / 2).await;
        let (back, _) = handle.join(profile("b")).await.unwrap();
        assert_eq!(back, b);

        wait(registry.config().reconnect_grace_secs * 2).await;
        let state = handle.state(None).await.unwrap();
        assert!(state.players.iter().any(|p| p.id == b && p.is_active()));

        handle.disconnect(b).await;
        wait(registry.config().reconnect_grace_secs + 1).await;
        let state = handle.state(None).await.unwrap();
        assert_eq!(state.players.len(), 1);
        assert_eq!(state.players[0].id, a);
        assert!(!registry.clients.contains_key("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_session_with_players_is_torn_down() {
        let registry = registry(4);
        let (handle, _, _) = create_session(&registry, profile("a")).unwrap();
        seat(&handle, "b").await;
        let mut events = handle.subscribe();

        let idle = registry.config().inactivity_timeout_secs;
        wait(idle - 60).await;
        seat(&handle, "c").await;
        wait(60).await;
        // The join pushed the idle deadline back.
        assert!(registry.find(handle.session_id).is_ok());

        wait(idle + 1).await;
        assert!(registry.find(handle.session_id).is_err());
        assert_eq!(handle.state(None).await.unwrap_err(), SessionError::SessionNotFound);
        assert!(registry.clients.is_empty());
        assert!(registry.invite_codes.is_empty());

        let mut saw_closed = false;
        while let Ok(event) = events.try_recv() {
            saw_closed |= matches!(event, GameEvent::Closed { .. });
        }
        assert!(saw_closed);
    }
}
