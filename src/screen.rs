use crate::create_post::CreatePost;
use crate::data::Services;
use crate::edit_post::EditPost;
use crate::fetch::{Executor, Phase};
use crate::home::HomeScreen;
use crate::profile::ProfileScreen;
use crate::router::{Route, Router};
use crate::state::{AppState, Dispatcher};
use crate::view_post::ViewPost;

pub struct Context<'a> {
    pub state: &'a AppState,
    pub dispatcher: &'a Dispatcher,
    pub services: &'a Services,
}

impl<'a> Context<'a> {
    pub fn executor(&self) -> &'a dyn Executor {
        self.services.executor.as_ref()
    }

    pub fn flash<S: Into<String>>(&self, text: S) {
        self.dispatcher.flash(text);
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Polled {
    pub changed: bool,
    pub redirect: Option<Route>,
}

impl Polled {
    pub fn changed(changed: bool) -> Self {
        Self {
            changed,
            redirect: None,
        }
    }

    pub fn redirect(route: Route) -> Self {
        Self {
            changed: true,
            redirect: Some(route),
        }
    }
}

pub enum Screen {
    Home(HomeScreen),
    Profile(ProfileScreen),
    CreatePost(CreatePost),
    ViewPost(ViewPost),
    EditPost(EditPost),
    About,
    Terms,
    NotFound { path: String },
}

impl Screen {
    pub fn mount(route: &Route, ctx: &Context<'_>) -> Self {
        tracing::debug!(route = %route.path(), "mount screen");
        match route {
            Route::Home => {
                let mut screen = HomeScreen::new();
                screen.mount(ctx);
                Screen::Home(screen)
            }
            Route::Profile { username, tab } => {
                let mut screen = ProfileScreen::new(username, *tab);
                screen.mount(ctx);
                Screen::Profile(screen)
            }
            Route::CreatePost => Screen::CreatePost(CreatePost::new()),
            Route::ViewPost { id } => {
                let mut screen = ViewPost::new(id);
                screen.mount(ctx);
                Screen::ViewPost(screen)
            }
            Route::EditPost { id } => {
                let mut screen = EditPost::new(id);
                screen.mount(ctx);
                Screen::EditPost(screen)
            }
            Route::About => Screen::About,
            Route::Terms => Screen::Terms,
            Route::NotFound { path } => Screen::NotFound { path: path.clone() },
        }
    }

    pub fn follow(&mut self, route: &Route, ctx: &Context<'_>) -> bool {
        match (self, route) {
            (Screen::Profile(screen), Route::Profile { username, tab }) => {
                screen.set_route(username, *tab, ctx);
                true
            }
            (Screen::ViewPost(screen), Route::ViewPost { id }) => {
                screen.set_id(id, ctx);
                true
            }
            (Screen::EditPost(screen), Route::EditPost { id }) => {
                screen.set_id(id, ctx);
                true
            }
            _ => false,
        }
    }

    pub fn poll(&mut self, ctx: &Context<'_>) -> Polled {
        match self {
            Screen::Home(screen) => screen.poll(ctx),
            Screen::Profile(screen) => screen.poll(ctx),
            Screen::CreatePost(screen) => screen.poll(ctx),
            Screen::ViewPost(screen) => screen.poll(ctx),
            Screen::EditPost(screen) => screen.poll(ctx),
            Screen::About | Screen::Terms | Screen::NotFound { .. } => Polled::default(),
        }
    }

    pub fn retry(&mut self, ctx: &Context<'_>) {
        match self {
            Screen::Home(screen) => screen.retry(ctx),
            Screen::Profile(screen) => screen.retry(ctx),
            Screen::ViewPost(screen) => screen.retry(ctx),
            Screen::EditPost(screen) => screen.retry(ctx),
            _ => {}
        }
    }

    pub fn unmount(&mut self) {
        match self {
            Screen::Home(screen) => screen.unmount(),
            Screen::Profile(screen) => screen.unmount(),
            Screen::ViewPost(screen) => screen.unmount(),
            Screen::EditPost(screen) => screen.unmount(),
            _ => {}
        }
    }

    pub fn is_loading(&self) -> bool {
        match self {
            Screen::Home(screen) => screen.is_loading(),
            Screen::Profile(screen) => screen.is_loading(),
            Screen::CreatePost(screen) => screen.is_saving(),
            Screen::ViewPost(screen) => screen.is_loading() || screen.is_deleting(),
            Screen::EditPost(screen) => screen.is_loading() || screen.is_saving(),
            _ => false,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Screen::Home(screen) => screen.feed().error(),
            Screen::Profile(screen) => match screen.profile_phase() {
                Phase::Failed(reason) => Some(reason.as_str()),
                _ => None,
            },
            Screen::ViewPost(screen) => screen.phase().error(),
            Screen::EditPost(screen) => screen.phase().error(),
            _ => None,
        }
    }

    pub fn title(&self, state: &AppState) -> String {
        match self {
            Screen::Home(_) if state.logged_in => "Your Feed".to_string(),
            Screen::Home(_) => "Welcome!".to_string(),
            Screen::Profile(_) => "Profile Screen".to_string(),
            Screen::CreatePost(_) => "Create New Post".to_string(),
            Screen::ViewPost(screen) => screen
                .post()
                .map(|post| post.title.clone())
                .unwrap_or_else(|| "...".to_string()),
            Screen::EditPost(_) => "Edit Post".to_string(),
            Screen::About => "About Us".to_string(),
            Screen::Terms => "Terms and Conditions".to_string(),
            Screen::NotFound { .. } => "Not Found".to_string(),
        }
    }
}

pub struct Shell {
    router: Router,
    screen: Screen,
}

impl Shell {
    pub fn new(initial: Route, ctx: &Context<'_>) -> Self {
        let screen = Screen::mount(&initial, ctx);
        Self {
            router: Router::new(initial),
            screen,
        }
    }

    pub fn route(&self) -> &Route {
        self.router.current()
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn screen_mut(&mut self) -> &mut Screen {
        &mut self.screen
    }

    pub fn navigate(&mut self, route: Route, ctx: &Context<'_>) {
        if self.router.navigate(route) {
            self.enter_current(ctx);
        }
    }

    pub fn back(&mut self, ctx: &Context<'_>) -> bool {
        if !self.router.back() {
            return false;
        }
        self.enter_current(ctx);
        true
    }

    fn enter_current(&mut self, ctx: &Context<'_>) {
        let route = self.router.current().clone();
        if !self.screen.follow(&route, ctx) {
            self.screen.unmount();
            self.screen = Screen::mount(&route, ctx);
        }
    }

    pub fn poll(&mut self, ctx: &Context<'_>) -> bool {
        let polled = self.screen.poll(ctx);
        if let Some(route) = polled.redirect {
            self.navigate(route, ctx);
        }
        polled.changed
    }

    pub fn retry(&mut self, ctx: &Context<'_>) {
        self.screen.retry(ctx);
    }

    pub fn unmount(&mut self) {
        self.screen.unmount();
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::Harness;
    use super::*;
    use crate::router::ProfileTab;

    #[test]
    fn redirect_from_edit_lands_home() {
        let mut h = Harness::new();
        h.backend.add_user("ana", "pw");
        let bob = h.backend.add_user("bob", "pw");
        let id = h.backend.add_post("ana", "Hers", "x");
        h.login(bob);

        let mut shell = Shell::new(Route::EditPost { id }, &h.ctx());
        h.exec.run_all();
        assert!(shell.poll(&h.ctx()));
        assert_eq!(shell.route(), &Route::Home);
        assert!(matches!(shell.screen(), Screen::Home(_)));
    }

    #[test]
    fn same_screen_routes_reuse_the_mounted_screen() {
        let h = Harness::new();
        h.backend.add_user("ana", "pw");
        let mut shell = Shell::new(Route::profile("ana"), &h.ctx());
        shell.navigate(
            Route::Profile {
                username: "ana".into(),
                tab: ProfileTab::Following,
            },
            &h.ctx(),
        );
        let Screen::Profile(profile) = shell.screen() else {
            panic!("profile screen expected");
        };
        assert_eq!(profile.tab(), ProfileTab::Following);
        h.exec.run_all();
        assert_eq!(h.backend.call_count("load_profile"), 1);
    }

    #[test]
    fn leaving_a_screen_cancels_its_fetch() {
        let h = Harness::new();
        h.backend.add_user("ana", "pw");
        let id = h.backend.add_post("ana", "t", "b");
        let mut shell = Shell::new(Route::ViewPost { id }, &h.ctx());
        shell.navigate(Route::About, &h.ctx());
        h.exec.run_all();
        assert_eq!(h.backend.call_count("load_post"), 0);
        assert!(shell.back(&h.ctx()));
        assert!(matches!(shell.screen(), Screen::ViewPost(_)));
    }

    #[test]
    fn unknown_route_mounts_not_found() {
        let h = Harness::new();
        let shell = Shell::new(Route::parse("/nowhere"), &h.ctx());
        assert_eq!(shell.screen().title(h.state()), "Not Found");
    }
}
