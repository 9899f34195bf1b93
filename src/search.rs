use std::time::{Duration, Instant};

use crate::api::Post;
use crate::fetch::Fetch;
use crate::keys::{KeyListener, KeyListeners};
use crate::router::Route;
use crate::screen::Context;
use crate::state::{Action, Dispatcher};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(750);
pub const LISTENER_NAME: &str = "search";
pub const NO_RESULTS_MESSAGE: &str = "Sorry, we could not find any results for that search.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Show {
    Neither,
    Loading,
    Results,
    Failed(String),
}

pub struct SearchOverlay {
    term: String,
    results: Vec<Post>,
    show: Show,
    request_count: u64,
    deadline: Option<Instant>,
    debounce: Duration,
    request: Fetch<Vec<Post>>,
    selected: usize,
    listener: Option<KeyListener>,
}

impl SearchOverlay {
    pub fn new(debounce: Duration) -> Self {
        Self {
            term: String::new(),
            results: Vec::new(),
            show: Show::Neither,
            request_count: 0,
            deadline: None,
            debounce,
            request: Fetch::new("search"),
            selected: 0,
            listener: None,
        }
    }

    pub fn mount(&mut self, listeners: &KeyListeners) {
        self.listener = Some(listeners.subscribe(LISTENER_NAME));
    }

    pub fn is_mounted(&self) -> bool {
        self.listener.is_some()
    }

    pub fn unmount(&mut self) {
        self.request.cancel();
        self.deadline = None;
        self.listener = None;
    }

    pub fn set_term(&mut self, term: String, now: Instant) {
        self.term = term;
        // Whatever is in flight was asked for an older term.
        self.request.cancel();
        if self.term.trim().is_empty() {
            self.show = Show::Neither;
            self.deadline = None;
        } else {
            self.show = Show::Loading;
            self.deadline = Some(now + self.debounce);
        }
    }

    pub fn push_char(&mut self, ch: char, now: Instant) {
        let mut term = std::mem::take(&mut self.term);
        term.push(ch);
        self.set_term(term, now);
    }

    pub fn backspace(&mut self, now: Instant) {
        let mut term = std::mem::take(&mut self.term);
        term.pop();
        self.set_term(term, now);
    }

    pub fn tick(&mut self, now: Instant, ctx: &Context<'_>) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {}
            _ => return false,
        }
        self.deadline = None;
        self.request_count += 1;
        let posts = ctx.services.posts.clone();
        let term = self.term.clone();
        tracing::debug!(request_count = self.request_count, "search fired");
        self.request
            .start(ctx.executor(), move |_| posts.search(&term));
        true
    }

    pub fn poll(&mut self) -> bool {
        if !self.request.poll() {
            return false;
        }
        match self.request.take_outcome() {
            Some(Ok(results)) => {
                self.results = results;
                self.selected = 0;
                self.show = Show::Results;
            }
            Some(Err(reason)) => self.show = Show::Failed(reason),
            None => {}
        }
        true
    }

    // Visibility belongs to global state; the overlay only asks to close.
    pub fn close(&self, dispatcher: &Dispatcher) {
        dispatcher.dispatch(Action::CloseSearch);
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn show(&self) -> &Show {
        &self.show
    }

    pub fn results(&self) -> &[Post] {
        &self.results
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn header(&self) -> Option<String> {
        match self.results.len() {
            0 => None,
            1 => Some("Search Results (1 item found)".to_string()),
            n => Some(format!("Search Results ({n} items found)")),
        }
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn select_next(&mut self) {
        if !self.results.is_empty() {
            self.selected = (self.selected + 1).min(self.results.len() - 1);
        }
    }

    pub fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn open_selected(&self, dispatcher: &Dispatcher) -> Option<Route> {
        if self.show != Show::Results {
            return None;
        }
        let post = self.results.get(self.selected)?;
        self.close(dispatcher);
        Some(Route::ViewPost {
            id: post.id.clone(),
        })
    }
}
