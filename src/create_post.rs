use crate::fetch::Submitter;
use crate::form::PostForm;
use crate::router::Route;
use crate::screen::{Context, Polled};

pub const CREATED_MESSAGE: &str = "Congrats! You successfully created a post.";
pub const LOGIN_REQUIRED: &str = "Log in to publish a post.";

pub struct CreatePost {
    form: PostForm,
    save: Submitter<String>,
    save_error: Option<String>,
}

impl Default for CreatePost {
    fn default() -> Self {
        Self::new()
    }
}

impl CreatePost {
    pub fn new() -> Self {
        Self {
            form: PostForm::default(),
            save: Submitter::new("create post"),
            save_error: None,
        }
    }

    pub fn submit(&mut self, ctx: &Context<'_>) -> bool {
        if self.save.is_busy() {
            return false;
        }
        let Some(token) = ctx.state.token().map(str::to_string) else {
            self.save_error = Some(LOGIN_REQUIRED.to_string());
            return false;
        };
        if !self.form.validate() {
            return false;
        }
        let posts = ctx.services.posts.clone();
        let title = self.form.title.clone();
        let body = self.form.body.clone();
        self.save.submit(ctx.executor(), move |_| {
            posts.create_post(&title, &body, &token)
        })
    }

    pub fn poll(&mut self, ctx: &Context<'_>) -> Polled {
        match self.save.poll() {
            Some(Ok(id)) => {
                tracing::info!(%id, "post created");
                ctx.flash(CREATED_MESSAGE);
                Polled::redirect(Route::ViewPost { id })
            }
            Some(Err(reason)) => {
                self.save_error = Some(reason);
                Polled::changed(true)
            }
            None => Polled::default(),
        }
    }

    pub fn form(&self) -> &PostForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut PostForm {
        &mut self.form
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
            "Save New Post"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PostService;
    use crate::form::TITLE_REQUIRED;
    use crate::screen::test_support::Harness;

    #[test]
    fn created_post_flashes_and_opens() {
        let mut h = Harness::new();
        let ana = h.backend.add_user("ana", "pw");
        h.login(ana);
        let mut screen = CreatePost::new();
        screen.form_mut().title = "Fresh".into();
        screen.form_mut().body = "Words".into();
        assert!(screen.submit(&h.ctx()));
        assert_eq!(screen.button_label(), "Saving...");
        h.exec.run_all();
        let route = screen.poll(&h.ctx()).redirect;
        let Some(Route::ViewPost { id }) = route else {
            panic!("expected post route, got {route:?}");
        };
        h.settle();
        assert_eq!(h.flash_texts(), [CREATED_MESSAGE]);
        let post = h.backend.load_post(&id).unwrap().unwrap();
        assert_eq!(post.author.username, "ana");
    }

    #[test]
    fn blank_title_is_blocked() {
        let mut h = Harness::new();
        let ana = h.backend.add_user("ana", "pw");
        h.login(ana);
        let mut screen = CreatePost::new();
        screen.form_mut().body = "Words".into();
        assert!(!screen.submit(&h.ctx()));
        assert_eq!(screen.form().title_error, Some(TITLE_REQUIRED));
        assert_eq!(h.exec.pending(), 0);
    }

    #[test]
    fn guests_cannot_publish() {
        let h = Harness::new();
        let mut screen = CreatePost::new();
        screen.form_mut().title = "t".into();
        screen.form_mut().body = "b".into();
        assert!(!screen.submit(&h.ctx()));
        assert_eq!(screen.save_error(), Some(LOGIN_REQUIRED));
    }
}
