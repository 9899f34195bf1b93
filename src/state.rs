use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::api::Session;
use crate::data::AuthService;
use crate::fetch::{Executor, Fetch};
use crate::session::Persistence;

pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again";
pub const LOGGED_OUT_MESSAGE: &str = "You have successfully logged out.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashMessage {
    pub text: String,
    pub posted_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub logged_in: bool,
    pub user: Session,
    pub flash_messages: Vec<FlashMessage>,
    pub is_search_open: bool,
    pub is_chat_open: bool,
    pub unread_chat_count: u32,
}

impl AppState {
    pub fn new(session: Option<Session>) -> Self {
        Self {
            logged_in: session.is_some(),
            user: session.unwrap_or_default(),
            flash_messages: Vec::new(),
            is_search_open: false,
            is_chat_open: false,
            unread_chat_count: 0,
        }
    }

    pub fn token(&self) -> Option<&str> {
        if self.logged_in {
            Some(self.user.token.as_str())
        } else {
            None
        }
    }

    pub fn is_user(&self, username: &str) -> bool {
        self.logged_in && self.user.username == username
    }

    pub fn unread_badge(&self) -> Option<String> {
        match self.unread_chat_count {
            0 => None,
            n if n > 9 => Some("9+".to_string()),
            n => Some(n.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Login(Session),
    Logout,
    FlashMessage { text: String, at: Instant },
    OpenSearch,
    CloseSearch,
    ToggleChat,
    CloseChat,
    IncrementUnreadChatCount,
    ClearUnreadChatCount,
    ExpireFlashMessages { cutoff: Instant },
}

impl Action {
    pub fn flash<S: Into<String>>(text: S) -> Self {
        Action::FlashMessage {
            text: text.into(),
            at: Instant::now(),
        }
    }
}

pub fn reduce(state: &mut AppState, action: Action) {
    match action {
        Action::Login(session) => {
            state.logged_in = true;
            state.user = session;
        }
        Action::Logout => {
            state.logged_in = false;
            state.user = Session::default();
            state.is_chat_open = false;
            state.unread_chat_count = 0;
        }
        Action::FlashMessage { text, at } => {
            state.flash_messages.push(FlashMessage {
                text,
                posted_at: at,
            });
        }
        Action::OpenSearch => state.is_search_open = true,
        Action::CloseSearch => state.is_search_open = false,
        Action::ToggleChat => state.is_chat_open = !state.is_chat_open,
        Action::CloseChat => state.is_chat_open = false,
        Action::IncrementUnreadChatCount => {
            state.unread_chat_count = state.unread_chat_count.saturating_add(1);
        }
        Action::ClearUnreadChatCount => state.unread_chat_count = 0,
        Action::ExpireFlashMessages { cutoff } => {
            state.flash_messages.retain(|msg| msg.posted_at >= cutoff);
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    tx: Sender<Action>,
}

impl Dispatcher {
    pub fn dispatch(&self, action: Action) {
        let _ = self.tx.send(action);
    }

    pub fn flash<S: Into<String>>(&self, text: S) {
        self.dispatch(Action::flash(text));
    }
}

pub struct StateContainer {
    state: AppState,
    persistence: Persistence,
    dispatcher: Dispatcher,
    rx: Receiver<Action>,
    token_check: Fetch<bool>,
    flash_ttl: Option<Duration>,
}

impl StateContainer {
    pub fn new(persistence: Persistence, flash_ttl: Option<Duration>) -> Result<Self> {
        let session = persistence.load()?;
        if let Some(session) = &session {
            tracing::info!(username = %session.username, "restored stored session");
        }
        let (tx, rx) = unbounded();
        Ok(Self {
            state: AppState::new(session),
            persistence,
            dispatcher: Dispatcher { tx },
            rx,
            token_check: Fetch::new("checkToken"),
            flash_ttl,
        })
    }

    pub fn validate_session(&mut self, auth: Arc<dyn AuthService>, executor: &dyn Executor) {
        let Some(token) = self.state.token().map(str::to_string) else {
            return;
        };
        self.token_check
            .start(executor, move |_| auth.check_token(&token));
    }

    pub fn snapshot(&self) -> &AppState {
        &self.state
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    pub fn dispatch(&self, action: Action) {
        self.dispatcher.dispatch(action);
    }

    pub fn tick(&mut self, now: Instant) -> bool {
        if self.token_check.poll() {
            match self.token_check.take_outcome() {
                Some(Ok(false)) if self.state.logged_in => {
                    tracing::info!("stored session rejected by backend");
                    self.dispatch(Action::Logout);
                    self.dispatch(Action::flash(SESSION_EXPIRED_MESSAGE));
                }
                Some(Err(reason)) => {
                    tracing::warn!(%reason, "could not validate stored session");
                }
                _ => {}
            }
        }
        if let Some(ttl) = self.flash_ttl {
            if let Some(cutoff) = now.checked_sub(ttl) {
                let expired = self
                    .state
                    .flash_messages
                    .iter()
                    .any(|msg| msg.posted_at < cutoff);
                if expired {
                    self.dispatch(Action::ExpireFlashMessages { cutoff });
                }
            }
        }
        self.apply_pending()
    }

    // Reduces every queued action in order, mirroring the session to
    // storage whenever the login flag flips.
    pub fn apply_pending(&mut self) -> bool {
        let mut changed = false;
        while let Ok(action) = self.rx.try_recv() {
            let was_logged_in = self.state.logged_in;
            let before = self.state.user.clone();
            reduce(&mut self.state, action);
            changed = true;
            if self.state.logged_in != was_logged_in
                || (self.state.logged_in && self.state.user != before)
            {
                self.persist();
            }
        }
        changed
    }

    pub fn is_validating(&self) -> bool {
        self.token_check.is_pending()
    }

    pub fn teardown(&mut self) {
        self.token_check.cancel();
    }

    fn persist(&self) {
        let result = if self.state.logged_in {
            tracing::info!(username = %self.state.user.username, "session stored");
            self.persistence.save(&self.state.user)
        } else {
            tracing::info!("session cleared");
            self.persistence.clear()
        };
        if let Err(err) = result {
            tracing::warn!(error = %format!("{err:#}"), "failed to mirror session to storage");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MockBackend;
    use crate::fetch::QueuedExecutor;
    use crate::storage::{self, AVATAR_KEY, TOKEN_KEY, USERNAME_KEY};

    fn persistence() -> Persistence {
        let store = storage::Store::open(storage::Options {
            in_memory: true,
            ..Default::default()
        })
        .unwrap();
        Persistence::new(Arc::new(store))
    }

    fn session(name: &str) -> Session {
        Session {
            token: format!("token-{name}"),
            username: name.to_string(),
            avatar: format!("https://gravatar.com/avatar/{name}"),
        }
    }

    #[test]
    fn reducer_handles_panels_and_counters() {
        let mut state = AppState::new(None);
        reduce(&mut state, Action::OpenSearch);
        assert!(state.is_search_open);
        reduce(&mut state, Action::CloseSearch);
        assert!(!state.is_search_open);
        reduce(&mut state, Action::ToggleChat);
        assert!(state.is_chat_open);
        reduce(&mut state, Action::ToggleChat);
        assert!(!state.is_chat_open);
        reduce(&mut state, Action::ToggleChat);
        reduce(&mut state, Action::CloseChat);
        assert!(!state.is_chat_open);
        for _ in 0..12 {
            reduce(&mut state, Action::IncrementUnreadChatCount);
        }
        assert_eq!(state.unread_badge().as_deref(), Some("9+"));
        reduce(&mut state, Action::ClearUnreadChatCount);
        assert_eq!(state.unread_badge(), None);
        reduce(&mut state, Action::IncrementUnreadChatCount);
        assert_eq!(state.unread_badge().as_deref(), Some("1"));
    }

    #[test]
    fn flash_messages_queue_in_order_and_expire() {
        let start = Instant::now();
        let mut state = AppState::new(None);
        reduce(
            &mut state,
            Action::FlashMessage {
                text: "first".into(),
                at: start,
            },
        );
        reduce(
            &mut state,
            Action::FlashMessage {
                text: "second".into(),
                at: start + Duration::from_secs(3),
            },
        );
        let texts: Vec<_> = state.flash_messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["first", "second"]);
        reduce(
            &mut state,
            Action::ExpireFlashMessages {
                cutoff: start + Duration::from_secs(1),
            },
        );
        assert_eq!(state.flash_messages.len(), 1);
        assert_eq!(state.flash_messages[0].text, "second");
    }

    #[test]
    fn login_then_logout_round_trips_storage() {
        let p = persistence();
        let mut container = StateContainer::new(p.clone(), None).unwrap();
        container.dispatch(Action::Login(session("ana")));
        container.apply_pending();
        assert!(container.snapshot().logged_in);
        let store = p.store();
        assert_eq!(store.get(TOKEN_KEY).unwrap().as_deref(), Some("token-ana"));
        assert_eq!(store.get(USERNAME_KEY).unwrap().as_deref(), Some("ana"));
        assert_eq!(
            store.get(AVATAR_KEY).unwrap().as_deref(),
            Some("https://gravatar.com/avatar/ana")
        );
        assert_eq!(store.keys().unwrap().len(), 3);

        container.dispatch(Action::Logout);
        container.dispatch(Action::flash(LOGGED_OUT_MESSAGE));
        container.apply_pending();
        assert!(!container.snapshot().logged_in);
        assert!(store.keys().unwrap().is_empty());
        assert_eq!(container.snapshot().flash_messages[0].text, LOGGED_OUT_MESSAGE);
    }

    #[test]
    fn restores_session_from_storage() {
        let p = persistence();
        p.save(&session("ana")).unwrap();
        let container = StateContainer::new(p, None).unwrap();
        assert!(container.snapshot().logged_in);
        assert_eq!(container.snapshot().user.username, "ana");
    }

    #[test]
    fn rejected_token_logs_out_with_flash() {
        let p = persistence();
        p.save(&session("ghost")).unwrap();
        let backend = Arc::new(MockBackend::new());
        let exec = QueuedExecutor::new();
        let mut container = StateContainer::new(p.clone(), None).unwrap();
        container.validate_session(backend.clone(), &exec);
        assert!(container.is_validating());
        exec.run_all();
        container.tick(Instant::now());

        let state = container.snapshot();
        assert!(!state.logged_in);
        assert_eq!(state.flash_messages.len(), 1);
        assert_eq!(state.flash_messages[0].text, SESSION_EXPIRED_MESSAGE);
        assert!(p.load().unwrap().is_none());
        assert_eq!(backend.call_count("check_token"), 1);
    }

    #[test]
    fn accepted_token_keeps_session() {
        let p = persistence();
        let backend = Arc::new(MockBackend::new());
        let ana = backend.add_user("ana", "pw");
        p.save(&ana).unwrap();
        let exec = QueuedExecutor::new();
        let mut container = StateContainer::new(p, None).unwrap();
        container.validate_session(backend, &exec);
        exec.run_all();
        container.tick(Instant::now());
        assert!(container.snapshot().logged_in);
        assert!(container.snapshot().flash_messages.is_empty());
    }

    #[test]
    fn teardown_cancels_token_check() {
        let p = persistence();
        p.save(&session("ghost")).unwrap();
        let exec = QueuedExecutor::new();
        let mut container = StateContainer::new(p, None).unwrap();
        container.validate_session(Arc::new(MockBackend::new()), &exec);
        container.teardown();
        exec.run_all();
        container.tick(Instant::now());
        assert!(container.snapshot().logged_in);
    }

    #[test]
    fn logged_out_start_skips_validation() {
        let backend = Arc::new(MockBackend::new());
        let exec = QueuedExecutor::new();
        let mut container = StateContainer::new(persistence(), None).unwrap();
        container.validate_session(backend, &exec);
        assert_eq!(exec.pending(), 0);
    }

    #[test]
    fn tick_expires_flash_after_ttl() {
        let mut container =
            StateContainer::new(persistence(), Some(Duration::from_secs(5))).unwrap();
        let start = Instant::now();
        container.dispatch(Action::FlashMessage {
            text: "hi".into(),
            at: start,
        });
        container.tick(start + Duration::from_secs(1));
        assert_eq!(container.snapshot().flash_messages.len(), 1);
        container.tick(start + Duration::from_secs(6));
        assert!(container.snapshot().flash_messages.is_empty());
    }
}
