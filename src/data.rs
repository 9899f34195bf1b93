use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use parking_lot::Mutex;

use crate::api::{self, Author, Counts, FollowEntry, Post, ProfileSummary, Session};
use crate::fetch::{Executor, ThreadExecutor};

pub trait AuthService: Send + Sync {
    fn check_token(&self, token: &str) -> Result<bool>;
    fn login(&self, username: &str, password: &str) -> Result<Option<Session>>;
    fn register(&self, username: &str, email: &str, password: &str) -> Result<Session>;
}

pub trait PostService: Send + Sync {
    fn home_feed(&self, token: &str) -> Result<Vec<Post>>;
    fn create_post(&self, title: &str, body: &str, token: &str) -> Result<String>;
    fn load_post(&self, id: &str) -> Result<Option<Post>>;
    fn edit_post(&self, id: &str, title: &str, body: &str, token: &str) -> Result<()>;
    fn delete_post(&self, id: &str, token: &str) -> Result<bool>;
    fn search(&self, term: &str) -> Result<Vec<Post>>;
}

pub trait ProfileService: Send + Sync {
    fn load_profile(&self, username: &str, token: Option<&str>) -> Result<Option<ProfileSummary>>;
    fn profile_posts(&self, username: &str) -> Result<Vec<Post>>;
    fn followers(&self, username: &str) -> Result<Vec<FollowEntry>>;
    fn following(&self, username: &str) -> Result<Vec<FollowEntry>>;
    fn follow(&self, username: &str, token: &str) -> Result<()>;
    fn unfollow(&self, username: &str, token: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct Services {
    pub auth: Arc<dyn AuthService>,
    pub posts: Arc<dyn PostService>,
    pub profiles: Arc<dyn ProfileService>,
    pub executor: Arc<dyn Executor>,
}

impl Services {
    pub fn from_client(client: Arc<api::Client>) -> Self {
        Self {
            auth: Arc::new(ApiAuthService::new(client.clone())),
            posts: Arc::new(ApiPostService::new(client.clone())),
            profiles: Arc::new(ApiProfileService::new(client)),
            executor: Arc::new(ThreadExecutor),
        }
    }

    pub fn mock(backend: Arc<MockBackend>, executor: Arc<dyn Executor>) -> Self {
        Self {
            auth: backend.clone(),
            posts: backend.clone(),
            profiles: backend,
            executor,
        }
    }
}

pub struct ApiAuthService {
    client: Arc<api::Client>,
}

impl ApiAuthService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl AuthService for ApiAuthService {
    fn check_token(&self, token: &str) -> Result<bool> {
        self.client.check_token(token).context("check session token")
    }

    fn login(&self, username: &str, password: &str) -> Result<Option<Session>> {
        self.client.login(username, password).context("log in")
    }

    fn register(&self, username: &str, email: &str, password: &str) -> Result<Session> {
        self.client
            .register(username, email, password)
            .context("register account")
    }
}

pub struct ApiPostService {
    client: Arc<api::Client>,
}

impl ApiPostService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl PostService for ApiPostService {
    fn home_feed(&self, token: &str) -> Result<Vec<Post>> {
        self.client.home_feed(token).context("fetch home feed")
    }

    fn create_post(&self, title: &str, body: &str, token: &str) -> Result<String> {
        self.client
            .create_post(title, body, token)
            .context("create post")
    }

    fn load_post(&self, id: &str) -> Result<Option<Post>> {
        self.client.post(id).context("fetch post")
    }

    fn edit_post(&self, id: &str, title: &str, body: &str, token: &str) -> Result<()> {
        self.client
            .edit_post(id, title, body, token)
            .context("save post")
    }

    fn delete_post(&self, id: &str, token: &str) -> Result<bool> {
        self.client.delete_post(id, token).context("delete post")
    }

    fn search(&self, term: &str) -> Result<Vec<Post>> {
        self.client.search(term).context("search posts")
    }
}

pub struct ApiProfileService {
    client: Arc<api::Client>,
}

impl ApiProfileService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl ProfileService for ApiProfileService {
    fn load_profile(&self, username: &str, token: Option<&str>) -> Result<Option<ProfileSummary>> {
        self.client.profile(username, token).context("fetch profile")
    }

    fn profile_posts(&self, username: &str) -> Result<Vec<Post>> {
        self.client
            .profile_posts(username)
            .context("fetch profile posts")
    }

    fn followers(&self, username: &str) -> Result<Vec<FollowEntry>> {
        self.client.followers(username).context("fetch followers")
    }

    fn following(&self, username: &str) -> Result<Vec<FollowEntry>> {
        self.client.following(username).context("fetch following")
    }

    fn follow(&self, username: &str, token: &str) -> Result<()> {
        self.client.add_follow(username, token).context("follow user")
    }

    fn unfollow(&self, username: &str, token: &str) -> Result<()> {
        self.client
            .remove_follow(username, token)
            .context("unfollow user")
    }
}

#[derive(Default)]
struct MockState {
    users: BTreeMap<String, MockUser>,
    posts: Vec<Post>,
    follows: BTreeSet<(String, String)>,
    next_id: u64,
    offline: bool,
    calls: BTreeMap<String, usize>,
}

struct MockUser {
    email: String,
    password: String,
    avatar: String,
}

#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded() -> Self {
        let backend = Self::new();
        backend.add_user("complexapp", "qwertyqwerty");
        backend.add_user("learner", "qwertyqwerty");
        backend.add_post(
            "complexapp",
            "Welcome to ComplexApp",
            "This is an **offline** preview.\n\n- Press / to search\n- Press c to chat\n- Press n to write a post",
        );
        backend.add_post(
            "learner",
            "Notes on ownership",
            "# Borrowing\n\nEvery value has a *single* owner.",
        );
        backend
    }

    pub fn add_user(&self, username: &str, password: &str) -> Session {
        let mut state = self.state.lock();
        let avatar = format!("https://gravatar.com/avatar/{username}?s=128");
        state.users.insert(
            username.to_string(),
            MockUser {
                email: format!("{username}@example.com"),
                password: password.to_string(),
                avatar: avatar.clone(),
            },
        );
        Session {
            token: token_for(username),
            username: username.to_string(),
            avatar,
        }
    }

    pub fn add_post(&self, author: &str, title: &str, body: &str) -> String {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = format!("post{}", state.next_id);
        let avatar = state
            .users
            .get(author)
            .map(|user| user.avatar.clone())
            .unwrap_or_default();
        state.posts.push(Post {
            id: id.clone(),
            title: title.to_string(),
            body: body.to_string(),
            created_date: Utc::now().to_rfc3339(),
            author: Author {
                username: author.to_string(),
                avatar,
            },
            is_visitor_owner: false,
        });
        id
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.state.lock().calls.get(name).copied().unwrap_or(0)
    }

    fn enter(&self, name: &str) -> Result<parking_lot::MutexGuard<'_, MockState>> {
        let mut state = self.state.lock();
        *state.calls.entry(name.to_string()).or_default() += 1;
        if state.offline {
            bail!("mock backend: {name}: connection refused");
        }
        Ok(state)
    }
}

fn token_for(username: &str) -> String {
    format!("token-{username}")
}

fn user_for_token<'a>(state: &'a MockState, token: &str) -> Option<&'a str> {
    let username = token.strip_prefix("token-")?;
    state
        .users
        .get_key_value(username)
        .map(|(name, _)| name.as_str())
}

fn follow_entries<'a, I>(state: &MockState, names: I) -> Vec<FollowEntry>
where
    I: Iterator<Item = &'a String>,
{
    names
        .map(|name| FollowEntry {
            username: name.clone(),
            avatar: state
                .users
                .get(name)
                .map(|user| user.avatar.clone())
                .unwrap_or_default(),
        })
        .collect()
}

impl AuthService for MockBackend {
    fn check_token(&self, token: &str) -> Result<bool> {
        let state = self.enter("check_token")?;
        Ok(user_for_token(&state, token).is_some())
    }

    fn login(&self, username: &str, password: &str) -> Result<Option<Session>> {
        let state = self.enter("login")?;
        Ok(state
            .users
            .get(username)
            .filter(|user| user.password == password)
            .map(|user| Session {
                token: token_for(username),
                username: username.to_string(),
                avatar: user.avatar.clone(),
            }))
    }

    fn register(&self, username: &str, email: &str, password: &str) -> Result<Session> {
        let mut state = self.enter("register")?;
        if state.users.contains_key(username) {
            bail!("mock backend: that username is already taken");
        }
        if state.users.values().any(|user| user.email == email) {
            bail!("mock backend: that email is already being used");
        }
        let avatar = format!("https://gravatar.com/avatar/{username}?s=128");
        state.users.insert(
            username.to_string(),
            MockUser {
                email: email.to_string(),
                password: password.to_string(),
                avatar: avatar.clone(),
            },
        );
        Ok(Session {
            token: token_for(username),
            username: username.to_string(),
            avatar,
        })
    }
}

impl PostService for MockBackend {
    fn home_feed(&self, token: &str) -> Result<Vec<Post>> {
        let state = self.enter("home_feed")?;
        let Some(me) = user_for_token(&state, token) else {
            bail!("mock backend: invalid token");
        };
        let mut feed: Vec<Post> = state
            .posts
            .iter()
            .filter(|post| {
                state
                    .follows
                    .contains(&(me.to_string(), post.author.username.clone()))
            })
            .cloned()
            .collect();
        feed.reverse();
        Ok(feed)
    }

    fn create_post(&self, title: &str, body: &str, token: &str) -> Result<String> {
        let author = {
            let state = self.enter("create_post")?;
            match user_for_token(&state, token) {
                Some(name) => name.to_string(),
                None => bail!("mock backend: invalid token"),
            }
        };
        Ok(self.add_post(&author, title, body))
    }

    fn load_post(&self, id: &str) -> Result<Option<Post>> {
        let state = self.enter("load_post")?;
        Ok(state.posts.iter().find(|post| post.id == id).cloned())
    }

    fn edit_post(&self, id: &str, title: &str, body: &str, token: &str) -> Result<()> {
        let mut state = self.enter("edit_post")?;
        let me = user_for_token(&state, token).map(str::to_string);
        let Some(post) = state.posts.iter_mut().find(|post| post.id == id) else {
            bail!("mock backend: no such post");
        };
        if me.as_deref() != Some(post.author.username.as_str()) {
            bail!("mock backend: you do not have permission to perform that action");
        }
        post.title = title.to_string();
        post.body = body.to_string();
        Ok(())
    }

    fn delete_post(&self, id: &str, token: &str) -> Result<bool> {
        let mut state = self.enter("delete_post")?;
        let me = user_for_token(&state, token).map(str::to_string);
        let before = state.posts.len();
        state
            .posts
            .retain(|post| !(post.id == id && Some(&post.author.username) == me.as_ref()));
        Ok(state.posts.len() < before)
    }

    fn search(&self, term: &str) -> Result<Vec<Post>> {
        let state = self.enter("search")?;
        let needle = term.trim().to_lowercase();
        Ok(state
            .posts
            .iter()
            .filter(|post| {
                post.title.to_lowercase().contains(&needle)
                    || post.body.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }
}

impl ProfileService for MockBackend {
    fn load_profile(&self, username: &str, token: Option<&str>) -> Result<Option<ProfileSummary>> {
        let state = self.enter("load_profile")?;
        let Some(user) = state.users.get(username) else {
            return Ok(None);
        };
        let visitor = token.and_then(|token| user_for_token(&state, token));
        let is_following = visitor
            .map(|me| state.follows.contains(&(me.to_string(), username.to_string())))
            .unwrap_or(false);
        Ok(Some(ProfileSummary {
            username: username.to_string(),
            avatar: user.avatar.clone(),
            is_following,
            counts: Counts {
                post_count: state
                    .posts
                    .iter()
                    .filter(|post| post.author.username == username)
                    .count() as i64,
                follower_count: state.follows.iter().filter(|(_, to)| to == username).count()
                    as i64,
                following_count: state
                    .follows
                    .iter()
                    .filter(|(from, _)| from == username)
                    .count() as i64,
            },
        }))
    }

    fn profile_posts(&self, username: &str) -> Result<Vec<Post>> {
        let state = self.enter("profile_posts")?;
        Ok(state
            .posts
            .iter()
            .filter(|post| post.author.username == username)
            .rev()
            .cloned()
            .collect())
    }

    fn followers(&self, username: &str) -> Result<Vec<FollowEntry>> {
        let state = self.enter("followers")?;
        let names = state
            .follows
            .iter()
            .filter(|(_, to)| to == username)
            .map(|(from, _)| from);
        Ok(follow_entries(&state, names))
    }

    fn following(&self, username: &str) -> Result<Vec<FollowEntry>> {
        let state = self.enter("following")?;
        let names = state
            .follows
            .iter()
            .filter(|(from, _)| from == username)
            .map(|(_, to)| to);
        Ok(follow_entries(&state, names))
    }

    fn follow(&self, username: &str, token: &str) -> Result<()> {
        let mut state = self.enter("follow")?;
        let Some(me) = user_for_token(&state, token).map(str::to_string) else {
            bail!("mock backend: invalid token");
        };
        if me == username || !state.users.contains_key(username) {
            bail!("mock backend: you cannot follow that user");
        }
        state.follows.insert((me, username.to_string()));
        Ok(())
    }

    fn unfollow(&self, username: &str, token: &str) -> Result<()> {
        let mut state = self.enter("unfollow")?;
        let Some(me) = user_for_token(&state, token).map(str::to_string) else {
            bail!("mock backend: invalid token");
        };
        state.follows.remove(&(me, username.to_string()));
        Ok(())
    }
}
