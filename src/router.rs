use percent_encoding::percent_decode_str;

use crate::api;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfileTab {
    #[default]
    Posts,
    Followers,
    Following,
}

impl ProfileTab {
    pub fn label(self) -> &'static str {
        match self {
            ProfileTab::Posts => "Posts",
            ProfileTab::Followers => "Followers",
            ProfileTab::Following => "Following",
        }
    }

    pub fn next(self) -> Self {
        match self {
            ProfileTab::Posts => ProfileTab::Followers,
            ProfileTab::Followers => ProfileTab::Following,
            ProfileTab::Following => ProfileTab::Posts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Profile { username: String, tab: ProfileTab },
    CreatePost,
    ViewPost { id: String },
    EditPost { id: String },
    About,
    Terms,
    NotFound { path: String },
}

impl Route {
    pub fn parse(raw: &str) -> Route {
        let path = raw
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim();
        let segments: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
            .collect();
        let parts: Vec<&str> = segments.iter().map(String::as_str).collect();

        match parts.as_slice() {
            [] => Route::Home,
            ["profile", username] => Route::Profile {
                username: username.to_string(),
                tab: ProfileTab::Posts,
            },
            ["profile", username, "followers"] => Route::Profile {
                username: username.to_string(),
                tab: ProfileTab::Followers,
            },
            ["profile", username, "following"] => Route::Profile {
                username: username.to_string(),
                tab: ProfileTab::Following,
            },
            ["create-post", ..] => Route::CreatePost,
            ["post", id] => Route::ViewPost { id: id.to_string() },
            ["post", id, "edit"] => Route::EditPost { id: id.to_string() },
            ["about-us", ..] => Route::About,
            ["terms", ..] => Route::Terms,
            _ => Route::NotFound {
                path: if path.starts_with('/') {
                    path.to_string()
                } else {
                    format!("/{path}")
                },
            },
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::Profile { username, tab } => {
                let base = format!("/profile/{}", api::segment(username));
                match tab {
                    ProfileTab::Posts => base,
                    ProfileTab::Followers => format!("{base}/followers"),
                    ProfileTab::Following => format!("{base}/following"),
                }
            }
            Route::CreatePost => "/create-post".to_string(),
            Route::ViewPost { id } => format!("/post/{}", api::segment(id)),
            Route::EditPost { id } => format!("/post/{}/edit", api::segment(id)),
            Route::About => "/about-us".to_string(),
            Route::Terms => "/terms".to_string(),
            Route::NotFound { path } => path.clone(),
        }
    }

    pub fn profile(username: &str) -> Route {
        Route::Profile {
            username: username.to_string(),
            tab: ProfileTab::Posts,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Router {
    current: Route,
    history: Vec<Route>,
}

impl Router {
    pub fn new(initial: Route) -> Self {
        Self {
            current: initial,
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> &Route {
        &self.current
    }

    pub fn navigate(&mut self, route: Route) -> bool {
        if route == self.current {
            return false;
        }
        tracing::debug!(from = %self.current.path(), to = %route.path(), "navigate");
        let previous = std::mem::replace(&mut self.current, route);
        self.history.push(previous);
        true
    }

    pub fn back(&mut self) -> bool {
        match self.history.pop() {
            Some(route) => {
                self.current = route;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_route_table() {
        assert_eq!(Route::parse("/"), Route::Home);
        assert_eq!(Route::parse(""), Route::Home);
        assert_eq!(Route::parse("/profile/ana"), Route::profile("ana"));
        assert_eq!(
            Route::parse("/profile/ana/followers"),
            Route::Profile {
                username: "ana".into(),
                tab: ProfileTab::Followers
            }
        );
        assert_eq!(
            Route::parse("/profile/ana/following/"),
            Route::Profile {
                username: "ana".into(),
                tab: ProfileTab::Following
            }
        );
        assert_eq!(Route::parse("/create-post"), Route::CreatePost);
        assert_eq!(Route::parse("/post/abc"), Route::ViewPost { id: "abc".into() });
        assert_eq!(
            Route::parse("/post/abc/edit?x=1"),
            Route::EditPost { id: "abc".into() }
        );
        assert_eq!(Route::parse("/about-us"), Route::About);
        assert_eq!(Route::parse("/terms"), Route::Terms);
    }

    #[test]
    fn unknown_paths_fall_through_to_not_found() {
        assert_eq!(
            Route::parse("/post/abc/comments"),
            Route::NotFound {
                path: "/post/abc/comments".into()
            }
        );
        assert_eq!(
            Route::parse("nowhere"),
            Route::NotFound {
                path: "/nowhere".into()
            }
        );
    }

    #[test]
    fn path_round_trips_encoded_usernames() {
        let route = Route::Profile {
            username: "two words".into(),
            tab: ProfileTab::Followers,
        };
        assert_eq!(route.path(), "/profile/two%20words/followers");
        assert_eq!(Route::parse(&route.path()), route);
    }

    #[test]
    fn history_goes_back() {
        let mut router = Router::new(Route::Home);
        assert!(!router.navigate(Route::Home));
        assert!(router.navigate(Route::About));
        assert!(router.navigate(Route::Terms));
        assert!(router.back());
        assert_eq!(router.current(), &Route::About);
        assert!(router.back());
        assert!(!router.back());
        assert_eq!(router.current(), &Route::Home);
    }
}
