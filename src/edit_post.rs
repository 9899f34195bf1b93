use crate::api::Post;
use crate::fetch::{Fetch, Phase, Submitter};
use crate::form::PostForm;
use crate::router::Route;
use crate::screen::{Context, Polled};

pub const NO_PERMISSION_MESSAGE: &str = "You do not have permission to edit that post";
pub const UPDATED_MESSAGE: &str = "Congrats! You successfully updated a post.";

pub struct EditPost {
    id: String,
    post: Fetch<Option<Post>>,
    form: PostForm,
    populated: bool,
    save: Submitter<()>,
    save_error: Option<String>,
}

impl EditPost {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            post: Fetch::new("edit post"),
            form: PostForm::default(),
            populated: false,
            save: Submitter::new("save post"),
            save_error: None,
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
        self.form = PostForm::default();
        self.populated = false;
        self.save_error = None;
        self.load(ctx);
    }

    // Only a failed load is fetched again; edits in progress are kept.
    pub fn retry(&mut self, ctx: &Context<'_>) {
        if self.post.phase().error().is_some() {
            self.load(ctx);
        }
    }

    fn load(&mut self, ctx: &Context<'_>) {
        let posts = ctx.services.posts.clone();
        let id = self.id.clone();
        self.post
            .start(ctx.executor(), move |_| posts.load_post(&id));
    }

    pub fn poll(&mut self, ctx: &Context<'_>) -> Polled {
        let loaded = self.post.poll();
        if loaded {
            if let Phase::Loaded(Some(post)) = self.post.phase() {
                if !ctx.state.is_user(&post.author.username) {
                    tracing::info!(id = %self.id, "edit refused for non-author");
                    ctx.flash(NO_PERMISSION_MESSAGE);
                    return Polled::redirect(Route::Home);
                }
                if !self.populated {
                    self.form = PostForm::with_values(&post.title, &post.body);
                    self.populated = true;
                }
            }
        }
        match self.save.poll() {
            Some(Ok(())) => {
                self.save_error = None;
                ctx.flash(UPDATED_MESSAGE);
            }
            Some(Err(reason)) => self.save_error = Some(reason),
            None => return Polled::changed(loaded),
        }
        Polled::changed(true)
    }

    pub fn submit(&mut self, ctx: &Context<'_>) -> bool {
        if self.save.is_busy() || !self.populated {
            return false;
        }
        if !self.form.validate() {
            return false;
        }
        let posts = ctx.services.posts.clone();
        let id = self.id.clone();
        let title = self.form.title.clone();
        let body = self.form.body.clone();
        let token = ctx.state.user.token.clone();
        self.save.submit(ctx.executor(), move |_| {
            posts.edit_post(&id, &title, &body, &token)
        })
    }

    pub fn form(&self) -> &PostForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut PostForm {
        &mut self.form
    }

    pub fn phase(&self) -> &Phase<Option<Post>> {
        self.post.phase()
    }

    pub fn is_loading(&self) -> bool {
        self.post.is_pending()
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.post.phase(), Phase::Loaded(None))
    }

    pub fn is_saving(&self) -> bool {
        self.save.is_busy()
    }

    pub fn save_error(&self) -> Option<&str> {
        self.save_error.as_deref()
    }

    pub fn button_label(&self) -> &'static str {
        if self.save.is_busy() {
            "Saving..."
        } else {
            "Save Updates"
        }
    }

    pub fn unmount(&mut self) {
        self.post.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PostService;
    use crate::form::{BODY_REQUIRED, TITLE_REQUIRED};
    use crate::screen::test_support::Harness;

    fn mounted(h: &Harness, id: &str) -> EditPost {
        let mut screen = EditPost::new(id);
        screen.mount(&h.ctx());
        h.exec.run_all();
        screen.poll(&h.ctx());
        screen
    }

    #[test]
    fn retry_after_a_failed_load_fills_the_form() {
        let mut h = Harness::new();
        let ana = h.backend.add_user("ana", "pw");
        let id = h.backend.add_post("ana", "Draft", "Body");
        h.login(ana);
        h.backend.set_offline(true);
        let mut screen = mounted(&h, &id);
        assert!(matches!(screen.phase(), Phase::Failed(_)));
        assert!(!screen.submit(&h.ctx()));

        h.backend.set_offline(false);
        screen.retry(&h.ctx());
        assert!(screen.is_loading());
        h.exec.run_all();
        assert!(screen.poll(&h.ctx()).changed);
        assert_eq!(screen.form().title, "Draft");
        assert_eq!(screen.form().body, "Body");
    }

    #[test]
    fn retry_keeps_edits_once_loaded() {
        let mut h = Harness::new();
        let ana = h.backend.add_user("ana", "pw");
        let id = h.backend.add_post("ana", "Draft", "Body");
        h.login(ana);
        let mut screen = mounted(&h, &id);
        screen.form_mut().title = "Half typed".into();

        screen.retry(&h.ctx());
        assert_eq!(h.exec.pending(), 0);
        assert_eq!(screen.form().title, "Half typed");
        assert_eq!(h.backend.call_count("load_post"), 1);
    }

    #[test]
    fn author_gets_a_populated_form() {
        let mut h = Harness::new();
        let ana = h.backend.add_user("ana", "pw");
        let id = h.backend.add_post("ana", "Draft", "Body");
        h.login(ana);
        let screen = mounted(&h, &id);
        assert_eq!(screen.form().title, "Draft");
        assert_eq!(screen.form().body, "Body");
        assert_eq!(screen.button_label(), "Save Updates");
    }

    #[test]
    fn non_author_is_redirected_home_with_flash() {
        let mut h = Harness::new();
        h.backend.add_user("ana", "pw");
        let bob = h.backend.add_user("bob", "pw");
        let id = h.backend.add_post("ana", "Not yours", "x");
        h.login(bob);

        let mut screen = EditPost::new(&id);
        screen.mount(&h.ctx());
        h.exec.run_all();
        assert_eq!(screen.poll(&h.ctx()).redirect, Some(Route::Home));
        h.settle();
        assert_eq!(h.flash_texts(), [NO_PERMISSION_MESSAGE]);
    }

    #[test]
    fn empty_title_blocks_the_save() {
        let mut h = Harness::new();
        let ana = h.backend.add_user("ana", "pw");
        let id = h.backend.add_post("ana", "Draft", "Body");
        h.login(ana);
        let mut screen = mounted(&h, &id);

        screen.form_mut().title.clear();
        assert!(!screen.submit(&h.ctx()));
        assert_eq!(screen.form().title_error, Some(TITLE_REQUIRED));
        assert_eq!(h.exec.pending(), 0);
        assert_eq!(h.backend.call_count("edit_post"), 0);

        screen.form_mut().body = "  ".into();
        screen.form_mut().title = "Fixed".into();
        assert!(!screen.submit(&h.ctx()));
        assert_eq!(screen.form().title_error, None);
        assert_eq!(screen.form().body_error, Some(BODY_REQUIRED));
    }

    #[test]
    fn save_sends_once_and_flashes() {
        let mut h = Harness::new();
        let ana = h.backend.add_user("ana", "pw");
        let id = h.backend.add_post("ana", "Draft", "Body");
        h.login(ana);
        let mut screen = mounted(&h, &id);

        screen.form_mut().title = "Final".into();
        assert!(screen.submit(&h.ctx()));
        assert_eq!(screen.button_label(), "Saving...");
        assert!(!screen.submit(&h.ctx()));
        h.exec.run_all();
        let polled = screen.poll(&h.ctx());
        assert!(polled.changed);
        assert_eq!(polled.redirect, None);
        assert!(!screen.is_saving());
        h.settle();
        assert_eq!(h.flash_texts(), [UPDATED_MESSAGE]);
        assert_eq!(h.backend.call_count("edit_post"), 1);
        assert_eq!(h.backend.load_post(&id).unwrap().unwrap().title, "Final");
    }

    #[test]
    fn failed_save_is_reported_on_the_form() {
        let mut h = Harness::new();
        let ana = h.backend.add_user("ana", "pw");
        let id = h.backend.add_post("ana", "Draft", "Body");
        h.login(ana);
        let mut screen = mounted(&h, &id);
        h.backend.set_offline(true);
        assert!(screen.submit(&h.ctx()));
        h.exec.run_all();
        screen.poll(&h.ctx());
        assert!(screen.save_error().is_some());
        h.settle();
        assert!(h.flash_texts().is_empty());
    }
}
