use std::io::Read;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, FixedOffset, Local, TimeZone};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::USER_AGENT;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://react-app-backend-api.herokuapp.com/";

const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("complexapp: unauthorized")]
    Unauthorized,
    #[error("complexapp: not found")]
    NotFound,
    #[error("complexapp: api error {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("complexapp: request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("complexapp: decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("complexapp: invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("complexapp: read response: {0}")]
    Io(#[from] std::io::Error),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub base_url: Option<String>,
    pub user_agent: String,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Session {
    pub token: String,
    pub username: String,
    #[serde(default)]
    pub avatar: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Author {
    pub username: String,
    #[serde(default)]
    pub avatar: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, rename = "createdDate")]
    pub created_date: String,
    pub author: Author,
    #[serde(default, rename = "isVisitorOwner")]
    pub is_visitor_owner: bool,
}

impl Post {
    pub fn created_at(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.created_date).ok()
    }

    pub fn date_label(&self) -> String {
        self.date_label_in(&Local)
    }

    pub fn date_label_in<Tz: TimeZone>(&self, tz: &Tz) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        self.created_at()
            .map(|dt| dt.with_timezone(tz).format("%-m/%-d/%Y").to_string())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Counts {
    #[serde(default)]
    pub post_count: i64,
    #[serde(default)]
    pub follower_count: i64,
    #[serde(default)]
    pub following_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    #[serde(rename = "profileUsername")]
    pub username: String,
    #[serde(default, rename = "profileAvatar")]
    pub avatar: String,
    #[serde(default, rename = "isFollowing")]
    pub is_following: bool,
    #[serde(default)]
    pub counts: Counts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowEntry {
    pub username: String,
    #[serde(default)]
    pub avatar: String,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("complexapp client user agent required");
        }
        let mut base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(20)))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn check_token(&self, token: &str) -> ApiResult<bool> {
        let value = self.call(Method::POST, "checkToken", Some(json!({ "token": token })))?;
        Ok(truthy(&value))
    }

    pub fn login(&self, username: &str, password: &str) -> ApiResult<Option<Session>> {
        let value = self.call(
            Method::POST,
            "login",
            Some(json!({ "username": username, "password": password })),
        )?;
        decode_optional(value)
    }

    pub fn register(&self, username: &str, email: &str, password: &str) -> ApiResult<Session> {
        let value = self.call(
            Method::POST,
            "register",
            Some(json!({ "username": username, "email": email, "password": password })),
        )?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn home_feed(&self, token: &str) -> ApiResult<Vec<Post>> {
        self.call_json(Method::POST, "getHomeFeed", Some(json!({ "token": token })))
    }

    pub fn create_post(&self, title: &str, body: &str, token: &str) -> ApiResult<String> {
        let value = self.call(
            Method::POST,
            "create-post",
            Some(json!({ "title": title, "body": body, "token": token })),
        )?;
        match value {
            Value::String(id) => Ok(id),
            other => Ok(serde_json::from_value::<String>(other)?),
        }
    }

    pub fn post(&self, id: &str) -> ApiResult<Option<Post>> {
        let value = self.call(Method::GET, &format!("post/{}", segment(id)), None)?;
        decode_optional(value)
    }

    pub fn edit_post(&self, id: &str, title: &str, body: &str, token: &str) -> ApiResult<()> {
        self.call(
            Method::POST,
            &format!("post/{}/edit", segment(id)),
            Some(json!({ "title": title, "body": body, "token": token })),
        )?;
        Ok(())
    }

    pub fn delete_post(&self, id: &str, token: &str) -> ApiResult<bool> {
        let value = self.call(
            Method::DELETE,
            &format!("post/{}", segment(id)),
            Some(json!({ "token": token })),
        )?;
        Ok(value.as_str() == Some("Success"))
    }

    pub fn profile(&self, username: &str, token: Option<&str>) -> ApiResult<Option<ProfileSummary>> {
        let value = self.call(
            Method::POST,
            &format!("profile/{}", segment(username)),
            Some(json!({ "token": token })),
        )?;
        decode_optional(value)
    }

    pub fn profile_posts(&self, username: &str) -> ApiResult<Vec<Post>> {
        self.call_json(
            Method::GET,
            &format!("profile/{}/posts", segment(username)),
            None,
        )
    }

    pub fn followers(&self, username: &str) -> ApiResult<Vec<FollowEntry>> {
        self.call_json(
            Method::GET,
            &format!("profile/{}/followers", segment(username)),
            None,
        )
    }

    pub fn following(&self, username: &str) -> ApiResult<Vec<FollowEntry>> {
        self.call_json(
            Method::GET,
            &format!("profile/{}/following", segment(username)),
            None,
        )
    }

    pub fn add_follow(&self, username: &str, token: &str) -> ApiResult<()> {
        self.call(
            Method::POST,
            &format!("addFollow/{}", segment(username)),
            Some(json!({ "token": token })),
        )?;
        Ok(())
    }

    pub fn remove_follow(&self, username: &str, token: &str) -> ApiResult<()> {
        self.call(
            Method::POST,
            &format!("removeFollow/{}", segment(username)),
            Some(json!({ "token": token })),
        )?;
        Ok(())
    }

    pub fn search(&self, term: &str) -> ApiResult<Vec<Post>> {
        self.call_json(Method::POST, "search", Some(json!({ "searchTerm": term })))
    }

    fn call_json<T>(&self, method: Method, path: &str, body: Option<Value>) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        let value = self.call(method, path, body)?;
        Ok(serde_json::from_value(value)?)
    }

    fn call(&self, method: Method, path: &str, body: Option<Value>) -> ApiResult<Value> {
        let mut resp = self.request(method, path, body)?;
        let mut text = String::new();
        resp.read_to_string(&mut text)?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        match serde_json::from_str(&text) {
            Ok(value) => Ok(value),
            // Some endpoints answer with a bare, unquoted word such as `Success`.
            Err(_) => Ok(Value::String(text.trim().to_string())),
        }
    }

    fn request(&self, method: Method, path: &str, body: Option<Value>) -> ApiResult<Response> {
        let url = self.base_url.join(path)?;
        tracing::debug!(%method, %url, "backend request");

        let mut req = self.http.request(method, url);
        req = req.header(USER_AGENT, self.user_agent.clone());
        if let Some(payload) = body {
            req = req.json(&payload);
        }

        let resp = req.send()?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            match status.as_u16() {
                401 | 403 => Err(ApiError::Unauthorized),
                404 => Err(ApiError::NotFound),
                _ => Err(ApiError::Status { status, body }),
            }
        }
    }
}

pub(crate) fn segment(raw: &str) -> String {
    utf8_percent_encode(raw, SEGMENT).to_string()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Null => false,
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// The backend answers `false`, `null` or an empty body for missing records.
fn decode_optional<T>(value: Value) -> ApiResult<Option<T>>
where
    T: DeserializeOwned,
{
    if !truthy(&value) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tiny_http::{Header, Response as HttpResponse, Server};

    struct Seen {
        method: String,
        url: String,
        body: String,
    }

    fn serve_once(status: u16, body: &'static str) -> (String, thread::JoinHandle<Seen>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        let handle = thread::spawn(move || {
            let mut request = server.recv().unwrap();
            let mut received = String::new();
            request.as_reader().read_to_string(&mut received).unwrap();
            let seen = Seen {
                method: request.method().to_string(),
                url: request.url().to_string(),
                body: received,
            };
            let header = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
            let response = HttpResponse::from_string(body)
                .with_status_code(status)
                .with_header(header);
            request.respond(response).unwrap();
            seen
        });
        (format!("http://127.0.0.1:{port}"), handle)
    }

    fn client_for(base: String) -> Client {
        Client::new(ClientConfig {
            base_url: Some(base),
            user_agent: "complexapp-tui/test".into(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn check_token_posts_token_and_reads_boolean() {
        let (base, handle) = serve_once(200, "false");
        let valid = client_for(base).check_token("abc").unwrap();
        let seen = handle.join().unwrap();
        assert!(!valid);
        assert_eq!(seen.method, "POST");
        assert_eq!(seen.url, "/checkToken");
        let body: Value = serde_json::from_str(&seen.body).unwrap();
        assert_eq!(body["token"], "abc");
    }

    #[test]
    fn missing_post_decodes_as_none() {
        let (base, handle) = serve_once(200, "false");
        let post = client_for(base).post("123").unwrap();
        assert!(post.is_none());
        assert_eq!(handle.join().unwrap().url, "/post/123");
    }

    #[test]
    fn post_payload_decodes_author_and_date() {
        let (base, handle) = serve_once(
            200,
            r#"{"_id":"p1","title":"Hello","body":"**hi**","createdDate":"2021-03-04T10:00:00.000Z","author":{"username":"ana","avatar":"https://gravatar.com/a"},"isVisitorOwner":false}"#,
        );
        let post = client_for(base).post("p1").unwrap().unwrap();
        handle.join().unwrap();
        assert_eq!(post.author.username, "ana");
        assert_eq!(post.date_label_in(&chrono::Utc), "3/4/2021");
    }

    #[test]
    fn date_label_follows_the_local_calendar() {
        let post = Post {
            id: "p1".into(),
            title: "Late".into(),
            body: String::new(),
            created_date: "2024-03-01T02:00:00.000Z".into(),
            author: Author::default(),
            is_visitor_owner: false,
        };
        let new_york = FixedOffset::west_opt(5 * 3600).unwrap();
        assert_eq!(post.date_label_in(&new_york), "2/29/2024");
        assert_eq!(post.date_label_in(&chrono::Utc), "3/1/2024");
        let unparsable = Post {
            created_date: "yesterday".into(),
            ..post
        };
        assert_eq!(unparsable.date_label(), "");
    }

    #[test]
    fn profile_username_is_percent_encoded() {
        let (base, handle) = serve_once(
            200,
            r#"{"profileUsername":"a b","profileAvatar":"","isFollowing":true,"counts":{"postCount":1,"followerCount":2,"followingCount":3}}"#,
        );
        let profile = client_for(base).profile("a b", None).unwrap().unwrap();
        let seen = handle.join().unwrap();
        assert_eq!(seen.url, "/profile/a%20b");
        assert!(profile.is_following);
        assert_eq!(profile.counts.follower_count, 2);
    }

    #[test]
    fn delete_reports_success_acknowledgement() {
        let (base, handle) = serve_once(200, "\"Success\"");
        assert!(client_for(base).delete_post("p1", "tok").unwrap());
        let seen = handle.join().unwrap();
        assert_eq!(seen.method, "DELETE");
        let body: Value = serde_json::from_str(&seen.body).unwrap();
        assert_eq!(body["token"], "tok");
    }

    #[test]
    fn search_sends_search_term() {
        let (base, handle) = serve_once(200, "[]");
        let results = client_for(base).search("rust").unwrap();
        assert!(results.is_empty());
        let body: Value = serde_json::from_str(&handle.join().unwrap().body).unwrap();
        assert_eq!(body["searchTerm"], "rust");
    }

    #[test]
    fn unauthorized_status_maps_to_error() {
        let (base, handle) = serve_once(401, "\"nope\"");
        let err = client_for(base).home_feed("tok").unwrap_err();
        handle.join().unwrap();
        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[test]
    fn requires_user_agent() {
        assert!(Client::new(ClientConfig::default()).is_err());
    }
}
