use crate::api::{Counts, FollowEntry, Post, ProfileSummary};
use crate::fetch::{Fetch, Phase, Submitter};
use crate::router::{ProfileTab, Route};
use crate::screen::{Context, Polled};
use crate::state::AppState;

pub const PLACEHOLDER_USERNAME: &str = "...";
pub const FOLLOW_FAILED_MESSAGE: &str = "That follow request did not go through. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowChange {
    Followed,
    Unfollowed,
}

pub struct ProfileScreen {
    username: String,
    tab: ProfileTab,
    profile: Fetch<Option<ProfileSummary>>,
    posts: Fetch<Vec<Post>>,
    followers: Fetch<Vec<FollowEntry>>,
    following: Fetch<Vec<FollowEntry>>,
    start_following_count: u64,
    stop_following_count: u64,
    follow_action: Submitter<FollowChange>,
    selected: usize,
}

impl ProfileScreen {
    pub fn new(username: &str, tab: ProfileTab) -> Self {
        Self {
            username: username.to_string(),
            tab,
            profile: Fetch::new("profile"),
            posts: Fetch::new("profile posts"),
            followers: Fetch::new("profile followers"),
            following: Fetch::new("profile following"),
            start_following_count: 0,
            stop_following_count: 0,
            follow_action: Submitter::new("follow"),
            selected: 0,
        }
    }

    pub fn mount(&mut self, ctx: &Context<'_>) {
        self.load_profile(ctx);
        self.load_tab(ctx);
    }

    pub fn set_route(&mut self, username: &str, tab: ProfileTab, ctx: &Context<'_>) {
        if username != self.username {
            self.username = username.to_string();
            self.tab = tab;
            self.follow_action.cancel();
            self.posts.reset();
            self.followers.reset();
            self.following.reset();
            self.selected = 0;
            self.mount(ctx);
        } else if tab != self.tab {
            self.tab = tab;
            self.selected = 0;
            self.load_tab(ctx);
        }
    }

    pub fn retry(&mut self, ctx: &Context<'_>) {
        if self.profile.phase().error().is_some() {
            self.load_profile(ctx);
        }
        self.load_tab(ctx);
    }

    fn load_profile(&mut self, ctx: &Context<'_>) {
        let profiles = ctx.services.profiles.clone();
        let username = self.username.clone();
        let token = ctx.state.token().map(str::to_string);
        self.profile.start(ctx.executor(), move |_| {
            profiles.load_profile(&username, token.as_deref())
        });
    }

    fn load_tab(&mut self, ctx: &Context<'_>) {
        let profiles = ctx.services.profiles.clone();
        let username = self.username.clone();
        let exec = ctx.executor();
        match self.tab {
            ProfileTab::Posts => {
                self.posts
                    .start(exec, move |_| profiles.profile_posts(&username));
            }
            ProfileTab::Followers => {
                self.followers
                    .start(exec, move |_| profiles.followers(&username));
            }
            ProfileTab::Following => {
                self.following
                    .start(exec, move |_| profiles.following(&username));
            }
        }
    }

    pub fn poll(&mut self, ctx: &Context<'_>) -> Polled {
        let mut changed = self.profile.poll();
        changed |= self.posts.poll();
        changed |= self.followers.poll();
        changed |= self.following.poll();
        match self.follow_action.poll() {
            Some(Ok(change)) => {
                self.apply_follow(change);
                changed = true;
            }
            Some(Err(reason)) => {
                tracing::warn!(username = %self.username, %reason, "follow action failed");
                ctx.flash(FOLLOW_FAILED_MESSAGE);
                changed = true;
            }
            None => {}
        }
        Polled::changed(changed)
    }

    fn apply_follow(&mut self, change: FollowChange) {
        let Some(profile) = self.profile.phase_mut().loaded_mut().and_then(Option::as_mut) else {
            return;
        };
        match change {
            FollowChange::Followed => {
                profile.is_following = true;
                profile.counts.follower_count += 1;
            }
            FollowChange::Unfollowed => {
                profile.is_following = false;
                profile.counts.follower_count -= 1;
            }
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn tab(&self) -> ProfileTab {
        self.tab
    }

    pub fn summary(&self) -> Option<&ProfileSummary> {
        self.profile.phase().loaded().and_then(Option::as_ref)
    }

    pub fn profile_phase(&self) -> &Phase<Option<ProfileSummary>> {
        self.profile.phase()
    }

    pub fn display_username(&self) -> &str {
        self.summary()
            .map(|profile| profile.username.as_str())
            .unwrap_or(PLACEHOLDER_USERNAME)
    }

    pub fn counts(&self) -> Option<&Counts> {
        self.summary().map(|profile| &profile.counts)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.profile.phase(), Phase::Loaded(None))
    }

    pub fn is_loading(&self) -> bool {
        self.profile.is_pending()
            || match self.tab {
                ProfileTab::Posts => self.posts.is_pending(),
                ProfileTab::Followers => self.followers.is_pending(),
                ProfileTab::Following => self.following.is_pending(),
            }
    }

    pub fn posts(&self) -> &Phase<Vec<Post>> {
        self.posts.phase()
    }

    pub fn follow_list(&self) -> &Phase<Vec<FollowEntry>> {
        match self.tab {
            ProfileTab::Following => self.following.phase(),
            _ => self.followers.phase(),
        }
    }

    fn is_someone_else(&self, state: &AppState) -> Option<&ProfileSummary> {
        let profile = self.summary()?;
        (state.logged_in && state.user.username != profile.username).then_some(profile)
    }

    pub fn show_follow(&self, state: &AppState) -> bool {
        self.is_someone_else(state)
            .is_some_and(|profile| !profile.is_following)
    }

    pub fn show_stop_following(&self, state: &AppState) -> bool {
        self.is_someone_else(state)
            .is_some_and(|profile| profile.is_following)
    }

    pub fn follow_action_loading(&self) -> bool {
        self.follow_action.is_busy()
    }

    pub fn start_following_count(&self) -> u64 {
        self.start_following_count
    }

    pub fn stop_following_count(&self) -> u64 {
        self.stop_following_count
    }

    pub fn start_following(&mut self, ctx: &Context<'_>) -> bool {
        if !self.show_follow(ctx.state) || self.follow_action.is_busy() {
            return false;
        }
        self.start_following_count += 1;
        let profiles = ctx.services.profiles.clone();
        let username = self.display_username().to_string();
        let token = ctx.state.user.token.clone();
        self.follow_action.submit(ctx.executor(), move |_| {
            profiles.follow(&username, &token)?;
            Ok(FollowChange::Followed)
        })
    }

    pub fn stop_following(&mut self, ctx: &Context<'_>) -> bool {
        if !self.show_stop_following(ctx.state) || self.follow_action.is_busy() {
            return false;
        }
        self.stop_following_count += 1;
        let profiles = ctx.services.profiles.clone();
        let username = self.display_username().to_string();
        let token = ctx.state.user.token.clone();
        self.follow_action.submit(ctx.executor(), move |_| {
            profiles.unfollow(&username, &token)?;
            Ok(FollowChange::Unfollowed)
        })
    }

    pub fn tab_route(&self, tab: ProfileTab) -> Route {
        Route::Profile {
            username: self.username.clone(),
            tab,
        }
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    fn tab_len(&self) -> usize {
        match self.tab {
            ProfileTab::Posts => self.posts.phase().loaded().map_or(0, Vec::len),
            _ => self.follow_list().loaded().map_or(0, Vec::len),
        }
    }

    pub fn select_next(&mut self) {
        let len = self.tab_len();
        if len > 0 {
            self.selected = (self.selected + 1).min(len - 1);
        }
    }

    pub fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn selected_route(&self) -> Option<Route> {
        match self.tab {
            ProfileTab::Posts => self
                .posts
                .phase()
                .loaded()
                .and_then(|posts| posts.get(self.selected))
                .map(|post| Route::ViewPost {
                    id: post.id.clone(),
                }),
            _ => self
                .follow_list()
                .loaded()
                .and_then(|entries| entries.get(self.selected))
                .map(|entry| Route::profile(&entry.username)),
        }
    }

    pub fn unmount(&mut self) {
        self.profile.cancel();
        self.posts.cancel();
        self.followers.cancel();
        self.following.cancel();
    }
}
