use crate::api::Post;
use crate::auth::RegisterForm;
use crate::fetch::{Fetch, Phase};
use crate::router::Route;
use crate::screen::{Context, Polled};

pub const FEED_HEADING: &str = "The Latest From Those You Follow";

pub struct HomeScreen {
    feed: Fetch<Vec<Post>>,
    register: RegisterForm,
    logged_in: bool,
    selected: usize,
}

impl Default for HomeScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl HomeScreen {
    pub fn new() -> Self {
        Self {
            feed: Fetch::new("home feed"),
            register: RegisterForm::new(),
            logged_in: false,
            selected: 0,
        }
    }

    pub fn mount(&mut self, ctx: &Context<'_>) {
        self.logged_in = ctx.state.logged_in;
        self.selected = 0;
        match ctx.state.token() {
            Some(token) => {
                let posts = ctx.services.posts.clone();
                let token = token.to_string();
                self.feed
                    .start(ctx.executor(), move |_| posts.home_feed(&token));
            }
            None => {
                self.feed.reset();
                self.register = RegisterForm::new();
            }
        }
    }

    pub fn retry(&mut self, ctx: &Context<'_>) {
        self.mount(ctx);
    }

    pub fn poll(&mut self, ctx: &Context<'_>) -> Polled {
        let mut changed = false;
        if ctx.state.logged_in != self.logged_in {
            self.mount(ctx);
            changed = true;
        }
        changed |= self.feed.poll();
        let registering = self.register.is_busy();
        self.register.poll(ctx);
        changed |= registering && !self.register.is_busy();
        Polled::changed(changed)
    }

    pub fn is_guest(&self) -> bool {
        !self.logged_in
    }

    pub fn feed(&self) -> &Phase<Vec<Post>> {
        self.feed.phase()
    }

    pub fn is_loading(&self) -> bool {
        self.feed.is_pending()
    }

    pub fn empty_feed_message(username: &str) -> String {
        format!("Hello {username}, your feed is empty.")
    }

    pub fn register(&self) -> &RegisterForm {
        &self.register
    }

    pub fn register_mut(&mut self) -> &mut RegisterForm {
        &mut self.register
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn select_next(&mut self) {
        let len = self.feed.phase().loaded().map_or(0, Vec::len);
        if len > 0 {
            self.selected = (self.selected + 1).min(len - 1);
        }
    }

    pub fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn selected_route(&self) -> Option<Route> {
        self.feed
            .phase()
            .loaded()
            .and_then(|posts| posts.get(self.selected))
            .map(|post| Route::ViewPost {
                id: post.id.clone(),
            })
    }

    pub fn unmount(&mut self) {
        self.feed.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ProfileService;
    use crate::screen::test_support::Harness;

    #[test]
    fn guests_see_the_register_form() {
        let h = Harness::new();
        let mut home = HomeScreen::new();
        home.mount(&h.ctx());
        assert!(home.is_guest());
        assert_eq!(h.exec.pending(), 0);
        assert_eq!(*home.feed(), Phase::Idle);
    }

    #[test]
    fn members_get_posts_from_people_they_follow() {
        let mut h = Harness::new();
        let ana = h.backend.add_user("ana", "pw");
        h.backend.add_user("bob", "pw");
        h.backend.add_user("cy", "pw");
        h.backend.add_post("bob", "From bob", "x");
        h.backend.add_post("cy", "From cy", "x");
        h.backend.follow("bob", &ana.token).unwrap();
        h.login(ana);

        let mut home = HomeScreen::new();
        home.mount(&h.ctx());
        h.exec.run_all();
        home.poll(&h.ctx());
        let feed = home.feed().loaded().unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].title, "From bob");
        assert!(matches!(home.selected_route(), Some(Route::ViewPost { .. })));
    }

    #[test]
    fn logging_out_switches_to_guest_view() {
        let mut h = Harness::new();
        let ana = h.backend.add_user("ana", "pw");
        h.login(ana);
        let mut home = HomeScreen::new();
        home.mount(&h.ctx());
        h.exec.run_all();
        home.poll(&h.ctx());
        assert!(!home.is_guest());

        h.logout();
        home.poll(&h.ctx());
        assert!(home.is_guest());
        assert_eq!(*home.feed(), Phase::Idle);
    }

    #[test]
    fn empty_feed_greets_by_name() {
        assert_eq!(
            HomeScreen::empty_feed_message("ana"),
            "Hello ana, your feed is empty."
        );
    }
}
