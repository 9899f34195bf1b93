use once_cell::sync::Lazy;
use regex::Regex;

use crate::api::Session;
use crate::fetch::Submitter;
use crate::screen::Context;
use crate::state::Action;

pub const LOGGED_IN_MESSAGE: &str = "You have successfully logged in.";
pub const INVALID_LOGIN_MESSAGE: &str = "Invalid username / password.";
pub const WELCOME_MESSAGE: &str = "Congrats! Welcome to your new account.";

pub const USERNAME_TOO_SHORT: &str = "Username must be at least 3 characters.";
pub const USERNAME_TOO_LONG: &str = "Username cannot exceed 30 characters.";
pub const USERNAME_NOT_ALNUM: &str = "Username can only contain letters and numbers.";
pub const EMAIL_INVALID: &str = "You must provide a valid email address.";
pub const PASSWORD_TOO_SHORT: &str = "Password must be at least 12 characters.";
pub const PASSWORD_TOO_LONG: &str = "Password cannot exceed 50 characters.";

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\S+@\S+\.\S+$").expect("valid email regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginField {
    #[default]
    Username,
    Password,
}

pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub focus: LoginField,
    request: Submitter<Option<Session>>,
}

impl Default for LoginForm {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginForm {
    pub fn new() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            focus: LoginField::Username,
            request: Submitter::new("login"),
        }
    }

    fn active_value_mut(&mut self) -> &mut String {
        match self.focus {
            LoginField::Username => &mut self.username,
            LoginField::Password => &mut self.password,
        }
    }

    pub fn insert_char(&mut self, ch: char) {
        self.active_value_mut().push(ch);
    }

    pub fn backspace(&mut self) {
        self.active_value_mut().pop();
    }

    pub fn next_field(&mut self) {
        self.focus = match self.focus {
            LoginField::Username => LoginField::Password,
            LoginField::Password => LoginField::Username,
        };
    }

    pub fn masked_password(&self) -> String {
        "*".repeat(self.password.chars().count())
    }

    pub fn submit(&mut self, ctx: &Context<'_>) -> bool {
        if self.request.is_busy() || self.username.trim().is_empty() || self.password.is_empty() {
            return false;
        }
        let auth = ctx.services.auth.clone();
        let username = self.username.trim().to_string();
        let password = self.password.clone();
        self.request
            .submit(ctx.executor(), move |_| auth.login(&username, &password))
    }

    pub fn poll(&mut self, ctx: &Context<'_>) -> bool {
        match self.request.poll() {
            Some(Ok(Some(session))) => {
                tracing::info!(username = %session.username, "logged in");
                ctx.dispatcher.dispatch(Action::Login(session));
                ctx.flash(LOGGED_IN_MESSAGE);
                self.username.clear();
                self.password.clear();
                self.focus = LoginField::Username;
                true
            }
            Some(Ok(None)) => {
                ctx.flash(INVALID_LOGIN_MESSAGE);
                false
            }
            Some(Err(reason)) => {
                ctx.flash(format!("Could not log in: {reason}"));
                false
            }
            None => false,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.request.is_busy()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegisterField {
    #[default]
    Username,
    Email,
    Password,
}

impl RegisterField {
    pub fn title(self) -> &'static str {
        match self {
            RegisterField::Username => "Username",
            RegisterField::Email => "Email",
            RegisterField::Password => "Password",
        }
    }

    pub fn next(self) -> Self {
        match self {
            RegisterField::Username => RegisterField::Email,
            RegisterField::Email => RegisterField::Password,
            RegisterField::Password => RegisterField::Username,
        }
    }
}

pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub focus: RegisterField,
    pub username_error: Option<&'static str>,
    pub email_error: Option<&'static str>,
    pub password_error: Option<&'static str>,
    submit_error: Option<String>,
    request: Submitter<Session>,
}

impl Default for RegisterForm {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterForm {
    pub fn new() -> Self {
        Self {
            username: String::new(),
            email: String::new(),
            password: String::new(),
            focus: RegisterField::Username,
            username_error: None,
            email_error: None,
            password_error: None,
            submit_error: None,
            request: Submitter::new("register"),
        }
    }

    pub fn value(&self, field: RegisterField) -> &str {
        match field {
            RegisterField::Username => &self.username,
            RegisterField::Email => &self.email,
            RegisterField::Password => &self.password,
        }
    }

    pub fn error(&self, field: RegisterField) -> Option<&'static str> {
        match field {
            RegisterField::Username => self.username_error,
            RegisterField::Email => self.email_error,
            RegisterField::Password => self.password_error,
        }
    }

    pub fn insert_char(&mut self, ch: char) {
        match self.focus {
            RegisterField::Username => {
                self.username.push(ch);
                self.username_error = None;
            }
            RegisterField::Email => {
                self.email.push(ch);
                self.email_error = None;
            }
            RegisterField::Password => {
                self.password.push(ch);
                self.password_error = None;
            }
        }
    }

    pub fn backspace(&mut self) {
        match self.focus {
            RegisterField::Username => {
                self.username.pop();
            }
            RegisterField::Email => {
                self.email.pop();
            }
            RegisterField::Password => {
                self.password.pop();
            }
        }
    }

    pub fn next_field(&mut self) {
        self.focus = self.focus.next();
    }

    pub fn validate(&mut self) -> bool {
        self.username_error = username_rule(&self.username);
        self.email_error = (!EMAIL_RE.is_match(self.email.trim())).then_some(EMAIL_INVALID);
        let len = self.password.chars().count();
        self.password_error = if len < 12 {
            Some(PASSWORD_TOO_SHORT)
        } else if len > 50 {
            Some(PASSWORD_TOO_LONG)
        } else {
            None
        };
        self.username_error.is_none() && self.email_error.is_none() && self.password_error.is_none()
    }

    pub fn submit(&mut self, ctx: &Context<'_>) -> bool {
        if self.request.is_busy() || !self.validate() {
            return false;
        }
        self.submit_error = None;
        let auth = ctx.services.auth.clone();
        let username = self.username.clone();
        let email = self.email.trim().to_string();
        let password = self.password.clone();
        self.request.submit(ctx.executor(), move |_| {
            auth.register(&username, &email, &password)
        })
    }

    pub fn poll(&mut self, ctx: &Context<'_>) -> bool {
        match self.request.poll() {
            Some(Ok(session)) => {
                tracing::info!(username = %session.username, "account registered");
                ctx.dispatcher.dispatch(Action::Login(session));
                ctx.flash(WELCOME_MESSAGE);
                true
            }
            Some(Err(reason)) => {
                self.submit_error = Some(reason);
                false
            }
            None => false,
        }
    }

    pub fn submit_error(&self) -> Option<&str> {
        self.submit_error.as_deref()
    }

    pub fn is_busy(&self) -> bool {
        self.request.is_busy()
    }
}

fn username_rule(username: &str) -> Option<&'static str> {
    let len = username.chars().count();
    if !username.is_empty() && !username.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(USERNAME_NOT_ALNUM)
    } else if len < 3 {
        Some(USERNAME_TOO_SHORT)
    } else if len > 30 {
        Some(USERNAME_TOO_LONG)
    } else {
        None
    }
}
