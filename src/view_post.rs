use crate::api::Post;
use crate::fetch::{Fetch, Phase, Submitter};
use crate::router::Route;
use crate::screen::{Context, Polled};
use crate::state::AppState;

pub const DELETE_PROMPT: &str = "Do you really want to delete this post?";
pub const DELETED_MESSAGE: &str = "Post was successfully deleted";
pub const DELETE_REFUSED_MESSAGE: &str = "That post could not be deleted.";

pub struct ViewPost {
    id: String,
    post: Fetch<Option<Post>>,
    delete: Submitter<bool>,
    confirming_delete: bool,
}

impl ViewPost {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            post: Fetch::new("post"),
            delete: Submitter::new("delete post"),
            confirming_delete: false,
        }
    }

    pub fn mount(&mut self, ctx: &Context<'_>) {
        self.load(ctx);
    }

    pub fn set_id(&mut self, id: &str, ctx: &Context<'_>) {
        if id == self.id {
            return;
        }
        self.id = id.to_string();
        self.confirming_delete = false;
        self.load(ctx);
    }

    pub fn retry(&mut self, ctx: &Context<'_>) {
        self.load(ctx);
    }

    fn load(&mut self, ctx: &Context<'_>) {
        let posts = ctx.services.posts.clone();
        let id = self.id.clone();
        self.post
            .start(ctx.executor(), move |_| posts.load_post(&id));
    }

    pub fn poll(&mut self, ctx: &Context<'_>) -> Polled {
        let loaded = self.post.poll();
        let Some(outcome) = self.delete.poll() else {
            return Polled::changed(loaded);
        };
        match outcome {
            Ok(true) => {
                tracing::info!(id = %self.id, "post deleted");
                ctx.flash(DELETED_MESSAGE);
                return Polled::redirect(Route::profile(&ctx.state.user.username));
            }
            Ok(false) => {
                tracing::warn!(id = %self.id, "backend refused to delete post");
                ctx.flash(DELETE_REFUSED_MESSAGE);
            }
            Err(reason) => ctx.flash(format!("{DELETE_REFUSED_MESSAGE} {reason}")),
        }
        Polled::changed(true)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> &Phase<Option<Post>> {
        self.post.phase()
    }

    pub fn post(&self) -> Option<&Post> {
        self.post.phase().loaded().and_then(Option::as_ref)
    }

    pub fn is_loading(&self) -> bool {
        self.post.is_pending()
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.post.phase(), Phase::Loaded(None))
    }

    pub fn is_owner(&self, state: &AppState) -> bool {
        self.post()
            .is_some_and(|post| state.is_user(&post.author.username))
    }

    pub fn edit_route(&self, state: &AppState) -> Option<Route> {
        self.is_owner(state).then(|| Route::EditPost {
            id: self.id.clone(),
        })
    }

    pub fn request_delete(&mut self, state: &AppState) -> bool {
        if !self.is_owner(state) || self.delete.is_busy() {
            return false;
        }
        self.confirming_delete = true;
        true
    }

    pub fn is_confirming_delete(&self) -> bool {
        self.confirming_delete
    }

    pub fn cancel_delete(&mut self) {
        self.confirming_delete = false;
    }

    pub fn confirm_delete(&mut self, ctx: &Context<'_>) -> bool {
        if !std::mem::take(&mut self.confirming_delete) || !self.is_owner(ctx.state) {
            return false;
        }
        let posts = ctx.services.posts.clone();
        let id = self.id.clone();
        let token = ctx.state.user.token.clone();
        self.delete
            .submit(ctx.executor(), move |_| posts.delete_post(&id, &token))
    }

    pub fn is_deleting(&self) -> bool {
        self.delete.is_busy()
    }

    pub fn unmount(&mut self) {
        self.post.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PostService;
    use crate::screen::test_support::Harness;

    #[test]
    fn failed_load_recovers_on_retry() {
        let h = Harness::new();
        h.backend.add_user("ana", "pw");
        let id = h.backend.add_post("ana", "Hello", "text");
        h.backend.set_offline(true);

        let mut screen = ViewPost::new(&id);
        screen.mount(&h.ctx());
        h.exec.run_all();
        assert!(screen.poll(&h.ctx()).changed);
        assert!(matches!(screen.phase(), Phase::Failed(reason) if reason.contains("connection refused")));

        h.backend.set_offline(false);
        screen.retry(&h.ctx());
        assert!(screen.is_loading());
        h.exec.run_all();
        screen.poll(&h.ctx());
        assert!(matches!(screen.phase(), Phase::Loaded(Some(post)) if post.title == "Hello"));
    }

    #[test]
    fn loads_post_and_gates_owner_actions() {
        let mut h = Harness::new();
        let ana = h.backend.add_user("ana", "pw");
        let bob = h.backend.add_user("bob", "pw");
        let id = h.backend.add_post("ana", "Hello", "**hi**");

        let mut screen = ViewPost::new(&id);
        screen.mount(&h.ctx());
        assert!(screen.is_loading());
        h.exec.run_all();
        screen.poll(&h.ctx());
        assert_eq!(screen.post().map(|p| p.title.as_str()), Some("Hello"));

        assert!(!screen.is_owner(h.state()));
        h.login(bob);
        assert!(!screen.is_owner(h.state()));
        assert!(!screen.request_delete(h.state()));
        assert!(screen.edit_route(h.state()).is_none());

        h.login(ana);
        assert!(screen.is_owner(h.state()));
        assert_eq!(
            screen.edit_route(h.state()),
            Some(Route::EditPost { id: id.clone() })
        );
    }

    #[test]
    fn missing_post_is_not_found() {
        let h = Harness::new();
        let mut screen = ViewPost::new("nope");
        screen.mount(&h.ctx());
        h.exec.run_all();
        screen.poll(&h.ctx());
        assert!(screen.is_not_found());
    }

    #[test]
    fn rapid_id_changes_show_the_last_post() {
        let h = Harness::new();
        h.backend.add_user("ana", "pw");
        let first = h.backend.add_post("ana", "First", "a");
        let second = h.backend.add_post("ana", "Second", "b");

        let mut screen = ViewPost::new(&first);
        screen.mount(&h.ctx());
        screen.set_id(&second, &h.ctx());
        // The newer request finishes before the older one.
        h.exec.run_latest();
        screen.poll(&h.ctx());
        h.exec.run_all();
        screen.poll(&h.ctx());
        assert_eq!(screen.post().map(|p| p.title.as_str()), Some("Second"));
    }

    #[test]
    fn confirmed_delete_flashes_and_goes_to_profile() {
        let mut h = Harness::new();
        let ana = h.backend.add_user("ana", "pw");
        let id = h.backend.add_post("ana", "Doomed", "x");
        h.login(ana);

        let mut screen = ViewPost::new(&id);
        screen.mount(&h.ctx());
        h.exec.run_all();
        screen.poll(&h.ctx());

        assert!(!screen.confirm_delete(&h.ctx()));
        assert!(screen.request_delete(h.state()));
        assert!(screen.is_confirming_delete());
        assert!(screen.confirm_delete(&h.ctx()));
        assert!(screen.is_deleting());
        h.exec.run_all();
        let redirect = screen.poll(&h.ctx()).redirect;
        assert_eq!(redirect, Some(Route::profile("ana")));
        h.settle();
        assert_eq!(h.flash_texts(), [DELETED_MESSAGE]);
        assert!(h.backend.load_post(&id).unwrap().is_none());
    }

    #[test]
    fn cancelled_confirmation_sends_nothing() {
        let mut h = Harness::new();
        let ana = h.backend.add_user("ana", "pw");
        let id = h.backend.add_post("ana", "Kept", "x");
        h.login(ana);
        let mut screen = ViewPost::new(&id);
        screen.mount(&h.ctx());
        h.exec.run_all();
        screen.poll(&h.ctx());
        screen.request_delete(h.state());
        screen.cancel_delete();
        assert!(!screen.confirm_delete(&h.ctx()));
        assert_eq!(h.backend.call_count("delete_post"), 0);
    }
}
