use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Padding, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use textwrap::wrap;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::api::Post;
use crate::auth::{LoginField, LoginForm, RegisterField, RegisterForm};
use crate::chat::{ChatConnection, ChatPanel};
use crate::data::Services;
use crate::fetch::Phase;
use crate::form::{PostField, PostForm};
use crate::home::{HomeScreen, FEED_HEADING};
use crate::keys::{KeyListener, KeyListeners};
use crate::markdown;
use crate::profile::ProfileScreen;
use crate::router::{ProfileTab, Route};
use crate::screen::{Context, Screen, Shell};
use crate::search::{self, SearchOverlay, Show, NO_RESULTS_MESSAGE};
use crate::state::{Action, AppState, Dispatcher, StateContainer, LOGGED_OUT_MESSAGE};
use crate::view_post::{ViewPost, DELETE_PROMPT};

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_PANEL_FOCUSED_BG: Color = Color::Rgb(49, 50, 68);
const COLOR_PANEL_SELECTED_BG: Color = Color::Rgb(69, 71, 90);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_BORDER_FOCUSED: Color = Color::Rgb(137, 180, 250);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const MAX_FLASH_LINES: usize = 3;
const CHAT_PANEL_WIDTH: u16 = 42;

const LOGIN_LISTENER: &str = "login";
const CHAT_LISTENER: &str = "chat";
const COMPOSE_LISTENER: &str = "compose";
const CONFIRM_LISTENER: &str = "confirm";

const GUEST_PITCH: &str = "Are you sick of short tweets and impersonal shared posts? \
We believe getting back to actually writing is the key to enjoying the internet again.";
const ABOUT_TEXT: [&str; 3] = [
    "ComplexApp is a small place for long-form writing.",
    "Follow the people whose posts you want in your feed, search everything that has been \
published, and talk to whoever is online in the chat.",
    "Posts support a little formatting: paragraphs, headings, lists, bold and italics.",
];
const TERMS_TEXT: [&str; 3] = [
    "By using ComplexApp you agree to publish only content you have the right to share.",
    "Accounts that harass other members or post spam may be removed without notice.",
    "Chat messages are not stored; posts stay up until their author deletes them.",
];

macro_rules! context {
    ($model:ident) => {
        Context {
            state: $model.container.snapshot(),
            dispatcher: &$model.dispatcher,
            services: &$model.services,
        }
    };
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let percent_x = percent_x.min(100);
    let percent_y = percent_y.min(100);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage(100 - percent_x - (100 - percent_x) / 2),
        ])
        .split(area);
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage(100 - percent_y - (100 - percent_y) / 2),
        ])
        .split(horizontal[1]);
    vertical[1]
}

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

fn truncate(text: &str, width: usize) -> String {
    if UnicodeWidthStr::width(text) <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

fn heading_line(text: &str) -> Line<'static> {
    Line::from(Span::styled(
        text.to_string(),
        Style::default()
            .fg(COLOR_ACCENT)
            .add_modifier(Modifier::BOLD),
    ))
}

fn secondary_line(text: impl Into<String>) -> Line<'static> {
    Line::from(Span::styled(
        text.into(),
        Style::default().fg(COLOR_TEXT_SECONDARY),
    ))
}

fn error_line(text: impl Into<String>) -> Line<'static> {
    Line::from(Span::styled(text.into(), Style::default().fg(COLOR_ERROR)))
}

fn error_lines(reason: &str) -> Vec<Line<'static>> {
    vec![
        error_line(format!("Something went wrong: {reason}")),
        secondary_line("Press r to try again."),
    ]
}

fn loading_line(spinner: &Spinner, what: &str) -> Line<'static> {
    secondary_line(format!("{} Loading {what}…", spinner.frame()))
}

fn not_found_lines() -> Vec<Line<'static>> {
    vec![
        heading_line("Whoops, we cannot find that page."),
        Line::default(),
        secondary_line("You can always visit the homepage (h) to get a fresh start."),
    ]
}

fn post_row(post: &Post, selected: bool, width: usize) -> Line<'static> {
    let marker = if selected { "› " } else { "  " };
    let byline = format!(" by {} on {}", post.author.username, post.date_label());
    let room = width.saturating_sub(marker.len() + UnicodeWidthStr::width(byline.as_str()));
    let mut title_style = Style::default()
        .fg(COLOR_TEXT_PRIMARY)
        .add_modifier(Modifier::BOLD);
    if selected {
        title_style = title_style.bg(COLOR_PANEL_SELECTED_BG);
    }
    Line::from(vec![
        Span::styled(marker.to_string(), Style::default().fg(COLOR_ACCENT)),
        Span::styled(truncate(&post.title, room.max(8)), title_style),
        Span::styled(byline, Style::default().fg(COLOR_TEXT_SECONDARY)),
    ])
}

fn field_line(label: &str, value: &str, focused: bool) -> Line<'static> {
    let marker = if focused { "› " } else { "  " };
    let cursor = if focused { "_" } else { "" };
    let label_style = if focused {
        Style::default()
            .fg(COLOR_ACCENT)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(COLOR_TEXT_SECONDARY)
    };
    Line::from(vec![
        Span::styled(format!("{marker}{label}: "), label_style),
        Span::styled(
            format!("{value}{cursor}"),
            Style::default().fg(COLOR_TEXT_PRIMARY),
        ),
    ])
}

fn button_line(label: &str, busy: bool) -> Line<'static> {
    let style = if busy {
        Style::default().fg(COLOR_TEXT_SECONDARY)
    } else {
        Style::default()
            .fg(COLOR_BG)
            .bg(COLOR_SUCCESS)
            .add_modifier(Modifier::BOLD)
    };
    Line::from(Span::styled(format!(" {label} "), style))
}

fn post_form_lines(form: &PostForm) -> Vec<Line<'static>> {
    let mut lines = vec![field_line(
        PostField::Title.title(),
        &form.title,
        form.focus == PostField::Title,
    )];
    if let Some(err) = form.title_error {
        lines.push(error_line(format!("    {err}")));
    }
    lines.push(Line::default());
    lines.push(field_line(
        PostField::Body.title(),
        "",
        form.focus == PostField::Body,
    ));
    let cursor = if form.focus == PostField::Body { "_" } else { "" };
    let body = format!("{}{cursor}", form.body);
    for raw in body.split('\n') {
        lines.push(Line::from(Span::styled(
            format!("    {raw}"),
            Style::default().fg(COLOR_TEXT_PRIMARY),
        )));
    }
    if let Some(err) = form.body_error {
        lines.push(error_line(format!("    {err}")));
    }
    lines.push(Line::default());
    lines
}

fn edit_post_form(form: &mut PostForm, key: KeyEvent) {
    match key.code {
        KeyCode::Tab | KeyCode::BackTab => form.toggle_focus(),
        KeyCode::Enter if form.focus == PostField::Title => form.toggle_focus(),
        KeyCode::Enter => form.insert_char('\n'),
        KeyCode::Backspace => form.backspace(),
        KeyCode::Char(ch) => form.insert_char(ch),
        _ => {}
    }
}

fn sync_guard(
    slot: &mut Option<KeyListener>,
    wanted: bool,
    listeners: &KeyListeners,
    name: &'static str,
) {
    match (wanted, slot.is_some()) {
        (true, false) => *slot = Some(listeners.subscribe(name)),
        (false, true) => *slot = None,
        _ => {}
    }
}

struct LoginPopup {
    form: LoginForm,
    _listener: KeyListener,
}

pub struct Options {
    pub container: StateContainer,
    pub services: Services,
    pub initial_route: Route,
    pub chat_url: Option<String>,
    pub search_debounce: Duration,
    pub status_message: String,
}

pub struct Model {
    container: StateContainer,
    dispatcher: Dispatcher,
    services: Services,
    shell: Shell,
    search: SearchOverlay,
    search_debounce: Duration,
    chat: ChatPanel,
    chat_url: Option<String>,
    chat_owner: Option<String>,
    listeners: KeyListeners,
    login: Option<LoginPopup>,
    chat_listener: Option<KeyListener>,
    compose_listener: Option<KeyListener>,
    confirm_listener: Option<KeyListener>,
    editing_register: bool,
    renderer: markdown::Renderer,
    content_scroll: u16,
    status_message: String,
    spinner: Spinner,
    needs_redraw: bool,
}

impl Model {
    pub fn new(options: Options) -> Self {
        let Options {
            container,
            services,
            initial_route,
            chat_url,
            search_debounce,
            status_message,
        } = options;
        let dispatcher = container.dispatcher();
        let shell = {
            let ctx = Context {
                state: container.snapshot(),
                dispatcher: &dispatcher,
                services: &services,
            };
            Shell::new(initial_route, &ctx)
        };

        let mut model = Self {
            container,
            dispatcher,
            services,
            shell,
            search: SearchOverlay::new(search_debounce),
            search_debounce,
            chat: ChatPanel::new(),
            chat_url,
            chat_owner: None,
            listeners: KeyListeners::new(),
            login: None,
            chat_listener: None,
            compose_listener: None,
            confirm_listener: None,
            editing_register: false,
            renderer: markdown::Renderer::new(),
            content_scroll: 0,
            status_message,
            spinner: Spinner::new(),
            needs_redraw: true,
        };
        model.sync_chat_connection();
        model.sync_listeners();
        model
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        self.shutdown();
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);

        loop {
            if self.step(Instant::now()) {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                tracing::warn!(error = %format!("{err:#}"), "key handler failed");
                                self.status_message = format!("Error: {}", err);
                                self.mark_dirty();
                            }
                        }
                    }
                    Event::Resize(_, _) => self.mark_dirty(),
                    _ => {}
                }
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                if self.is_loading() {
                    if self.spinner.advance() {
                        self.mark_dirty();
                    }
                } else {
                    self.spinner.reset();
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn shutdown(&mut self) {
        self.search.unmount();
        self.chat.detach();
        self.shell.unmount();
        self.container.teardown();
    }

    fn is_loading(&self) -> bool {
        self.shell.screen().is_loading()
            || *self.search.show() == Show::Loading
            || self.login.as_ref().is_some_and(|popup| popup.form.is_busy())
            || self.container.is_validating()
    }

    fn step(&mut self, now: Instant) -> bool {
        let mut changed = self.container.tick(now);
        self.sync_chat_connection();
        self.sync_listeners();

        let mut close_login = false;
        {
            let ctx = context!(self);
            changed |= self.search.tick(now, &ctx);
            changed |= self.search.poll();
            changed |= self.chat.poll(&ctx);
            self.chat.sync_visibility(&ctx);
            if let Some(popup) = self.login.as_mut() {
                close_login = popup.form.poll(&ctx);
                changed |= close_login;
            }
            changed |= self.shell.poll(&ctx);
        }
        if close_login {
            self.login = None;
        }

        changed |= self.container.apply_pending();
        self.sync_chat_connection();
        self.sync_listeners();
        changed
    }

    fn sync_chat_connection(&mut self) {
        let state = self.container.snapshot();
        let owner = state.logged_in.then(|| state.user.username.clone());
        if owner == self.chat_owner {
            return;
        }
        self.chat.detach();
        if owner.is_some() {
            if let Some(url) = self.chat_url.as_deref() {
                self.chat.attach(ChatConnection::connect(url));
            }
        }
        self.chat_owner = owner;
    }

    fn sync_listeners(&mut self) {
        let state = self.container.snapshot();
        if state.logged_in {
            self.login = None;
        }

        if state.is_search_open && !self.search.is_mounted() {
            self.search.mount(&self.listeners);
        } else if !state.is_search_open && self.search.is_mounted() {
            self.search.unmount();
            self.search = SearchOverlay::new(self.search_debounce);
        }

        sync_guard(
            &mut self.chat_listener,
            state.is_chat_open && state.logged_in,
            &self.listeners,
            CHAT_LISTENER,
        );

        let composing = match self.shell.screen() {
            Screen::CreatePost(_) | Screen::EditPost(_) => true,
            Screen::Home(home) => home.is_guest() && self.editing_register,
            _ => false,
        };
        if !composing {
            self.editing_register = false;
        }
        sync_guard(
            &mut self.compose_listener,
            composing,
            &self.listeners,
            COMPOSE_LISTENER,
        );

        let confirming = matches!(self.shell.screen(), Screen::ViewPost(view) if view.is_confirming_delete());
        sync_guard(
            &mut self.confirm_listener,
            confirming,
            &self.listeners,
            CONFIRM_LISTENER,
        );
    }

    fn navigate(&mut self, route: Route) {
        {
            let ctx = context!(self);
            self.shell.navigate(route, &ctx);
        }
        self.content_scroll = 0;
        self.editing_register = false;
    }

    fn go_back(&mut self) {
        let moved = {
            let ctx = context!(self);
            self.shell.back(&ctx)
        };
        if moved {
            self.content_scroll = 0;
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Ok(true);
        }

        let quit = match self.listeners.top() {
            Some(LOGIN_LISTENER) => {
                self.handle_login_key(key);
                false
            }
            Some(search::LISTENER_NAME) => {
                self.handle_search_key(key);
                false
            }
            Some(CONFIRM_LISTENER) => {
                self.handle_confirm_key(key);
                false
            }
            Some(CHAT_LISTENER) => {
                self.handle_chat_key(key);
                false
            }
            Some(COMPOSE_LISTENER) => {
                self.handle_compose_key(key);
                false
            }
            _ => self.handle_browse_key(key)?,
        };

        self.container.apply_pending();
        self.sync_chat_connection();
        self.sync_listeners();
        self.mark_dirty();
        Ok(quit)
    }

    fn handle_browse_key(&mut self, key: KeyEvent) -> Result<bool> {
        let logged_in = self.container.snapshot().logged_in;
        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Char('/') => self.dispatcher.dispatch(Action::OpenSearch),
            KeyCode::Char('c') if logged_in => self.dispatcher.dispatch(Action::ToggleChat),
            KeyCode::Char('n') => self.navigate(Route::CreatePost),
            KeyCode::Char('h') => self.navigate(Route::Home),
            KeyCode::Char('a') => self.navigate(Route::About),
            KeyCode::Char('t') => self.navigate(Route::Terms),
            KeyCode::Char('p') if logged_in => {
                let me = self.container.snapshot().user.username.clone();
                self.navigate(Route::profile(&me));
            }
            KeyCode::Char('l') if !logged_in => {
                self.login = Some(LoginPopup {
                    form: LoginForm::new(),
                    _listener: self.listeners.subscribe(LOGIN_LISTENER),
                });
            }
            KeyCode::Char('o') if logged_in => {
                tracing::info!("logging out");
                self.dispatcher.dispatch(Action::Logout);
                self.dispatcher.flash(LOGGED_OUT_MESSAGE);
            }
            KeyCode::Char('r') => {
                let ctx = context!(self);
                self.shell.retry(&ctx);
            }
            KeyCode::Char('i') if matches!(self.shell.screen(), Screen::Home(home) if home.is_guest()) => {
                self.editing_register = true;
            }
            KeyCode::Char('b') | KeyCode::Backspace => self.go_back(),
            KeyCode::Char('j') | KeyCode::Down => self.select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.select_previous(),
            KeyCode::PageDown => self.content_scroll = self.content_scroll.saturating_add(10),
            KeyCode::PageUp => self.content_scroll = self.content_scroll.saturating_sub(10),
            KeyCode::Enter => {
                let target = match self.shell.screen() {
                    Screen::Home(home) => home.selected_route(),
                    Screen::Profile(profile) => profile.selected_route(),
                    Screen::NotFound { .. } => Some(Route::Home),
                    _ => None,
                };
                if let Some(route) = target {
                    self.navigate(route);
                }
            }
            KeyCode::Left | KeyCode::Right => {
                let forward = key.code == KeyCode::Right;
                let target = match self.shell.screen() {
                    Screen::Profile(profile) => {
                        let tab = if forward {
                            profile.tab().next()
                        } else {
                            profile.tab().next().next()
                        };
                        Some(profile.tab_route(tab))
                    }
                    _ => None,
                };
                if let Some(route) = target {
                    self.navigate(route);
                }
            }
            KeyCode::Char('f') => {
                let ctx = context!(self);
                if let Screen::Profile(profile) = self.shell.screen_mut() {
                    if profile.show_follow(ctx.state) {
                        profile.start_following(&ctx);
                    } else if profile.show_stop_following(ctx.state) {
                        profile.stop_following(&ctx);
                    }
                }
            }
            KeyCode::Char('e') => {
                let target = match self.shell.screen() {
                    Screen::ViewPost(view) => view.edit_route(self.container.snapshot()),
                    _ => None,
                };
                if let Some(route) = target {
                    self.navigate(route);
                }
            }
            KeyCode::Char('d') => {
                let state = self.container.snapshot();
                if let Screen::ViewPost(view) = self.shell.screen_mut() {
                    view.request_delete(state);
                }
            }
            _ => {}
        }
        Ok(false)
    }

    fn select_next(&mut self) {
        match self.shell.screen_mut() {
            Screen::Home(home) => home.select_next(),
            Screen::Profile(profile) => profile.select_next(),
            _ => self.content_scroll = self.content_scroll.saturating_add(1),
        }
    }

    fn select_previous(&mut self) {
        match self.shell.screen_mut() {
            Screen::Home(home) => home.select_previous(),
            Screen::Profile(profile) => profile.select_previous(),
            _ => self.content_scroll = self.content_scroll.saturating_sub(1),
        }
    }

    fn handle_login_key(&mut self, key: KeyEvent) {
        let ctx = context!(self);
        let Some(popup) = self.login.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Esc => {
                self.login = None;
            }
            KeyCode::Tab | KeyCode::BackTab => popup.form.next_field(),
            KeyCode::Enter => {
                if popup.form.focus == LoginField::Username {
                    popup.form.next_field();
                } else {
                    popup.form.submit(&ctx);
                }
            }
            KeyCode::Backspace => popup.form.backspace(),
            KeyCode::Char(ch) => popup.form.insert_char(ch),
            _ => {}
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) {
        let now = Instant::now();
        match key.code {
            KeyCode::Esc => self.search.close(&self.dispatcher),
            KeyCode::Down => self.search.select_next(),
            KeyCode::Up => self.search.select_previous(),
            KeyCode::Enter => {
                if let Some(route) = self.search.open_selected(&self.dispatcher) {
                    self.navigate(route);
                }
            }
            KeyCode::Backspace => self.search.backspace(now),
            KeyCode::Char(ch) => self.search.push_char(ch, now),
            _ => {}
        }
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) {
        let ctx = context!(self);
        let Screen::ViewPost(view) = self.shell.screen_mut() else {
            return;
        };
        match key.code {
            KeyCode::Char('y') | KeyCode::Enter => {
                view.confirm_delete(&ctx);
            }
            KeyCode::Char('n') | KeyCode::Esc => view.cancel_delete(),
            _ => {}
        }
    }

    fn handle_chat_key(&mut self, key: KeyEvent) {
        let ctx = context!(self);
        match key.code {
            KeyCode::Esc => self.chat.close(&self.dispatcher),
            KeyCode::Enter => {
                self.chat.send(&ctx);
            }
            KeyCode::Backspace => self.chat.backspace(),
            KeyCode::Char(ch) => self.chat.insert_char(ch),
            _ => {}
        }
    }

    fn handle_compose_key(&mut self, key: KeyEvent) {
        let submit =
            key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('s');
        if key.code == KeyCode::Esc {
            if matches!(self.shell.screen(), Screen::Home(_)) {
                self.editing_register = false;
            } else {
                self.go_back();
            }
            return;
        }

        let ctx = context!(self);
        match self.shell.screen_mut() {
            Screen::CreatePost(create) if submit => {
                create.submit(&ctx);
            }
            Screen::CreatePost(create) => edit_post_form(create.form_mut(), key),
            Screen::EditPost(edit) if submit => {
                edit.submit(&ctx);
            }
            Screen::EditPost(edit) => edit_post_form(edit.form_mut(), key),
            Screen::Home(home) => {
                let form = home.register_mut();
                match key.code {
                    KeyCode::Tab | KeyCode::BackTab => form.next_field(),
                    KeyCode::Enter => {
                        form.submit(&ctx);
                    }
                    KeyCode::Backspace => form.backspace(),
                    KeyCode::Char(ch) => form.insert_char(ch),
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), full);

        let state = self.container.snapshot();
        let flash_height = state.flash_messages.len().min(MAX_FLASH_LINES) as u16;
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(flash_height),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(full);

        frame.render_widget(
            Paragraph::new(self.header_line(state))
                .style(Style::default().bg(COLOR_PANEL_FOCUSED_BG)),
            layout[0],
        );
        if flash_height > 0 {
            self.draw_flash(frame, layout[1], state);
        }

        let chat_open = state.is_chat_open && state.logged_in;
        let body = if chat_open {
            let split = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Min(0), Constraint::Length(CHAT_PANEL_WIDTH)])
                .split(layout[2]);
            self.draw_chat(frame, split[1]);
            split[0]
        } else {
            layout[2]
        };
        self.draw_screen(frame, body, state);

        let footer = Paragraph::new(self.footer_text())
            .style(
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .bg(COLOR_PANEL_BG)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(footer, layout[3]);

        if state.is_search_open {
            self.draw_search(frame, layout[2]);
        }
        if let Screen::ViewPost(view) = self.shell.screen() {
            if view.is_confirming_delete() {
                self.draw_confirm(frame, layout[2], view);
            }
        }
        if let Some(popup) = &self.login {
            self.draw_login(frame, layout[2], &popup.form);
        }
    }

    fn header_line(&self, state: &AppState) -> Line<'static> {
        let bar = Style::default().bg(COLOR_PANEL_FOCUSED_BG);
        let mut spans = vec![Span::styled(
            " ComplexApp ",
            bar.fg(COLOR_ACCENT).add_modifier(Modifier::BOLD),
        )];
        if self.is_loading() {
            spans.push(Span::styled(
                format!("{} ", self.spinner.frame()),
                bar.fg(COLOR_TEXT_SECONDARY),
            ));
        }
        spans.push(Span::styled(
            format!("{} ", self.shell.route().path()),
            bar.fg(COLOR_TEXT_SECONDARY),
        ));
        if state.logged_in {
            spans.push(Span::styled(
                format!("@{} ", state.user.username),
                bar.fg(COLOR_TEXT_PRIMARY).add_modifier(Modifier::BOLD),
            ));
            let chat_style = if state.unread_chat_count > 0 {
                bar.fg(COLOR_ERROR).add_modifier(Modifier::BOLD)
            } else {
                bar.fg(COLOR_TEXT_PRIMARY)
            };
            let badge = state
                .unread_badge()
                .map(|badge| format!(" ({badge})"))
                .unwrap_or_default();
            spans.push(Span::styled(format!("· chat{badge} "), chat_style));
        } else {
            spans.push(Span::styled(
                "guest · l to log in ",
                bar.fg(COLOR_TEXT_PRIMARY),
            ));
        }
        if !self.status_message.is_empty() {
            spans.push(Span::styled(
                format!("· {}", self.status_message),
                bar.fg(COLOR_TEXT_SECONDARY),
            ));
        }
        Line::from(spans)
    }

    fn draw_flash(&self, frame: &mut Frame<'_>, area: Rect, state: &AppState) {
        let skip = state.flash_messages.len().saturating_sub(MAX_FLASH_LINES);
        let lines: Vec<Line<'static>> = state
            .flash_messages
            .iter()
            .skip(skip)
            .map(|msg| Line::from(msg.text.clone()))
            .collect();
        let banner = Paragraph::new(lines)
            .style(
                Style::default()
                    .fg(COLOR_BG)
                    .bg(COLOR_SUCCESS)
                    .add_modifier(Modifier::BOLD),
            )
            .alignment(Alignment::Center);
        frame.render_widget(banner, area);
    }

    fn screen_block(&self, title: String, focused: bool) -> Block<'static> {
        let border = if focused {
            COLOR_BORDER_FOCUSED
        } else {
            COLOR_BORDER_IDLE
        };
        Block::default()
            .title(Span::styled(
                title,
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border))
            .style(Style::default().bg(COLOR_PANEL_BG))
            .padding(Padding::uniform(1))
    }

    fn draw_screen(&self, frame: &mut Frame<'_>, area: Rect, state: &AppState) {
        let screen = self.shell.screen();
        let focused = self.listeners.top().map_or(true, |top| top == COMPOSE_LISTENER);
        let block = self.screen_block(screen.title(state), focused);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        let text = self.screen_text(screen, state, inner.width as usize);
        let body = Paragraph::new(text)
            .style(Style::default().fg(COLOR_TEXT_PRIMARY))
            .wrap(Wrap { trim: false })
            .scroll((self.content_scroll, 0));
        frame.render_widget(body, inner);
    }

    fn screen_text(&self, screen: &Screen, state: &AppState, width: usize) -> Text<'static> {
        let lines = match screen {
            Screen::Home(home) if home.is_guest() => self.guest_home_lines(home.register()),
            Screen::Home(home) => self.feed_lines(home, state, width),
            Screen::Profile(profile) => self.profile_lines(profile, state, width),
            Screen::ViewPost(view) => return self.view_post_text(view, state),
            Screen::CreatePost(create) => {
                let mut lines = post_form_lines(create.form());
                if let Some(err) = create.save_error() {
                    lines.push(error_line(err.to_string()));
                }
                lines.push(button_line(create.button_label(), create.is_saving()));
                lines
            }
            Screen::EditPost(edit) => {
                if edit.is_not_found() {
                    not_found_lines()
                } else if let Some(reason) = edit.phase().error() {
                    error_lines(reason)
                } else if edit.is_loading() {
                    vec![loading_line(&self.spinner, "post")]
                } else {
                    let mut lines = vec![secondary_line("« b back to post permalink"), Line::default()];
                    lines.extend(post_form_lines(edit.form()));
                    if let Some(err) = edit.save_error() {
                        lines.push(error_line(err.to_string()));
                    }
                    lines.push(button_line(edit.button_label(), edit.is_saving()));
                    lines
                }
            }
            Screen::About => ABOUT_TEXT
                .iter()
                .flat_map(|para| [Line::from(*para), Line::default()])
                .collect(),
            Screen::Terms => TERMS_TEXT
                .iter()
                .flat_map(|para| [Line::from(*para), Line::default()])
                .collect(),
            Screen::NotFound { path } => {
                let mut lines = not_found_lines();
                lines.push(secondary_line(format!("(nothing lives at {path})")));
                lines
            }
        };
        Text::from(lines)
    }

    fn guest_home_lines(&self, form: &RegisterForm) -> Vec<Line<'static>> {
        let mut lines = vec![
            heading_line("Remember Writing?"),
            Line::from(GUEST_PITCH),
            Line::default(),
        ];
        let mut field = RegisterField::Username;
        loop {
            let value = if field == RegisterField::Password {
                "*".repeat(form.password.chars().count())
            } else {
                form.value(field).to_string()
            };
            let focused = self.editing_register && form.focus == field;
            lines.push(field_line(field.title(), &value, focused));
            if let Some(err) = form.error(field) {
                lines.push(error_line(format!("    {err}")));
            }
            field = field.next();
            if field == RegisterField::Username {
                break;
            }
        }
        lines.push(Line::default());
        if let Some(err) = form.submit_error() {
            lines.push(error_line(err.to_string()));
        }
        let label = if form.is_busy() {
            "Signing up..."
        } else {
            "Sign up for ComplexApp"
        };
        lines.push(button_line(label, form.is_busy()));
        lines
    }

    fn feed_lines(&self, home: &HomeScreen, state: &AppState, width: usize) -> Vec<Line<'static>> {
        match home.feed() {
            Phase::Idle | Phase::Pending => vec![loading_line(&self.spinner, "your feed")],
            Phase::Failed(reason) => error_lines(reason),
            Phase::Cancelled => Vec::new(),
            Phase::Loaded(posts) if posts.is_empty() => vec![
                heading_line(&HomeScreen::empty_feed_message(&state.user.username)),
                Line::default(),
                Line::from(
                    "Your feed displays the latest posts from the people you follow. \
Use the search (/) to find content written by people with similar interests and then follow them.",
                ),
            ],
            Phase::Loaded(posts) => {
                let mut lines = vec![heading_line(FEED_HEADING), Line::default()];
                lines.extend(
                    posts
                        .iter()
                        .enumerate()
                        .map(|(idx, post)| post_row(post, idx == home.selected(), width)),
                );
                lines
            }
        }
    }

    fn profile_lines(
        &self,
        profile: &ProfileScreen,
        state: &AppState,
        width: usize,
    ) -> Vec<Line<'static>> {
        if profile.is_not_found() {
            return not_found_lines();
        }
        if let Phase::Failed(reason) = profile.profile_phase() {
            return error_lines(reason);
        }

        let mut title = vec![Span::styled(
            profile.display_username().to_string(),
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .add_modifier(Modifier::BOLD),
        )];
        let follow_label = if profile.show_follow(state) {
            Some("Follow")
        } else if profile.show_stop_following(state) {
            Some("Stop Following")
        } else {
            None
        };
        if let Some(label) = follow_label {
            let busy = profile.follow_action_loading();
            title.push(Span::raw("  "));
            title.push(Span::styled(
                format!("[f] {label}{}", if busy { "…" } else { "" }),
                Style::default().fg(if busy { COLOR_TEXT_SECONDARY } else { COLOR_SUCCESS }),
            ));
        }
        let mut lines = vec![Line::from(title), Line::default()];

        let counts = profile.counts().copied().unwrap_or_default();
        let tabs: Vec<Span<'static>> = [
            (ProfileTab::Posts, counts.post_count),
            (ProfileTab::Followers, counts.follower_count),
            (ProfileTab::Following, counts.following_count),
        ]
        .into_iter()
        .map(|(tab, count)| {
            let style = if tab == profile.tab() {
                Style::default()
                    .fg(COLOR_ACCENT)
                    .bg(COLOR_PANEL_SELECTED_BG)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(COLOR_TEXT_SECONDARY)
            };
            Span::styled(format!(" {}: {count} ", tab.label()), style)
        })
        .collect();
        lines.push(Line::from(tabs));
        lines.push(Line::default());

        match profile.tab() {
            ProfileTab::Posts => match profile.posts() {
                Phase::Idle | Phase::Pending => lines.push(loading_line(&self.spinner, "posts")),
                Phase::Failed(reason) => lines.extend(error_lines(reason)),
                Phase::Cancelled => {}
                Phase::Loaded(posts) if posts.is_empty() => {
                    lines.push(secondary_line("No posts yet."));
                }
                Phase::Loaded(posts) => lines.extend(
                    posts
                        .iter()
                        .enumerate()
                        .map(|(idx, post)| post_row(post, idx == profile.selected(), width)),
                ),
            },
            tab => match profile.follow_list() {
                Phase::Idle | Phase::Pending => {
                    lines.push(loading_line(&self.spinner, &tab.label().to_lowercase()))
                }
                Phase::Failed(reason) => lines.extend(error_lines(reason)),
                Phase::Cancelled => {}
                Phase::Loaded(entries) if entries.is_empty() => {
                    lines.push(secondary_line("Nobody here yet."));
                }
                Phase::Loaded(entries) => {
                    lines.extend(entries.iter().enumerate().map(|(idx, entry)| {
                        let selected = idx == profile.selected();
                        let marker = if selected { "› " } else { "  " };
                        let mut style = Style::default().fg(COLOR_TEXT_PRIMARY);
                        if selected {
                            style = style.bg(COLOR_PANEL_SELECTED_BG);
                        }
                        Line::from(vec![
                            Span::styled(marker, Style::default().fg(COLOR_ACCENT)),
                            Span::styled(entry.username.clone(), style),
                        ])
                    }));
                }
            },
        }
        lines
    }

    fn view_post_text(&self, view: &ViewPost, state: &AppState) -> Text<'static> {
        let lines = match view.phase() {
            Phase::Idle | Phase::Pending => vec![loading_line(&self.spinner, "post")],
            Phase::Failed(reason) => error_lines(reason),
            Phase::Cancelled => Vec::new(),
            Phase::Loaded(None) => not_found_lines(),
            Phase::Loaded(Some(post)) => {
                let mut lines = vec![
                    heading_line(&post.title),
                    secondary_line(format!(
                        "Posted by {} on {}",
                        post.author.username,
                        post.date_label()
                    )),
                ];
                if view.is_owner(state) {
                    let hint = if view.is_deleting() {
                        "Deleting…"
                    } else {
                        "[e] edit · [d] delete"
                    };
                    lines.push(Line::from(Span::styled(
                        hint,
                        Style::default().fg(COLOR_SUCCESS),
                    )));
                }
                lines.push(Line::default());
                lines.extend(self.renderer.render(&post.body).lines);
                lines
            }
        };
        Text::from(lines)
    }

    fn overlay_block(title: &str) -> Block<'static> {
        Block::default()
            .title(Span::styled(
                title.to_string(),
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(COLOR_ACCENT))
            .style(Style::default().bg(COLOR_PANEL_BG))
            .padding(Padding::horizontal(1))
    }

    fn draw_search(&self, frame: &mut Frame<'_>, area: Rect) {
        let popup_area = centered_rect(80, 80, area);
        frame.render_widget(Clear, popup_area);
        let block = Self::overlay_block("Search");
        let width = block.inner(popup_area).width as usize;

        let mut lines = vec![
            field_line("Search", self.search.term(), true),
            Line::default(),
        ];
        match self.search.show() {
            Show::Neither => lines.push(secondary_line("Type a few words to search every post.")),
            Show::Loading => lines.push(secondary_line(format!(
                "{} Searching…",
                self.spinner.frame()
            ))),
            Show::Failed(reason) => lines.extend(error_lines(reason)),
            Show::Results => match self.search.header() {
                Some(header) => {
                    lines.push(heading_line(&header));
                    lines.extend(self.search.results().iter().enumerate().map(
                        |(idx, post)| post_row(post, idx == self.search.selected(), width),
                    ));
                }
                None => lines.push(secondary_line(NO_RESULTS_MESSAGE)),
            },
        }

        let search = Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: false });
        frame.render_widget(search, popup_area);
    }

    fn draw_chat(&self, frame: &mut Frame<'_>, area: Rect) {
        let block = Self::overlay_block("Chat");
        let inner = block.inner(area);
        frame.render_widget(block, area);
        let parts = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(inner);

        let width = (parts[0].width as usize).max(8);
        let mut lines: Vec<Line<'static>> = Vec::new();
        for message in self.chat.messages() {
            lines.push(Line::from(Span::styled(
                format!("{}:", message.username),
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD),
            )));
            for piece in wrap(&message.message, width.saturating_sub(2)) {
                lines.push(Line::from(format!("  {piece}")));
            }
        }
        if let Some(status) = self.chat.status() {
            lines.push(error_line(status.to_string()));
        }
        let visible = parts[0].height as usize;
        let skip = lines.len().saturating_sub(visible);
        let log = Paragraph::new(lines.into_iter().skip(skip).collect::<Vec<_>>())
            .style(Style::default().fg(COLOR_TEXT_PRIMARY));
        frame.render_widget(log, parts[0]);

        let input = Paragraph::new(Line::from(vec![
            Span::styled("› ", Style::default().fg(COLOR_ACCENT)),
            Span::styled(
                format!("{}_", self.chat.input()),
                Style::default().fg(COLOR_TEXT_PRIMARY),
            ),
        ]));
        frame.render_widget(input, parts[1]);
    }

    fn draw_confirm(&self, frame: &mut Frame<'_>, area: Rect, view: &ViewPost) {
        let popup_area = centered_rect(50, 25, area);
        frame.render_widget(Clear, popup_area);
        let mut lines = vec![Line::from(DELETE_PROMPT), Line::default()];
        if view.is_deleting() {
            lines.push(secondary_line(format!("{} Deleting…", self.spinner.frame())));
        } else {
            lines.push(secondary_line("y / Enter delete · n / Esc keep"));
        }
        let confirm = Paragraph::new(lines)
            .block(Self::overlay_block("Delete Post"))
            .wrap(Wrap { trim: true });
        frame.render_widget(confirm, popup_area);
    }

    fn draw_login(&self, frame: &mut Frame<'_>, area: Rect, form: &LoginForm) {
        let popup_area = centered_rect(50, 40, area);
        frame.render_widget(Clear, popup_area);
        let mut lines = vec![
            field_line("Username", &form.username, form.focus == LoginField::Username),
            field_line(
                "Password",
                &form.masked_password(),
                form.focus == LoginField::Password,
            ),
            Line::default(),
        ];
        lines.push(if form.is_busy() {
            secondary_line(format!("{} Signing in…", self.spinner.frame()))
        } else {
            button_line("Sign In", false)
        });
        let login = Paragraph::new(lines)
            .block(Self::overlay_block("Log In"))
            .wrap(Wrap { trim: false });
        frame.render_widget(login, popup_area);
    }

    fn footer_text(&self) -> String {
        match self.listeners.top() {
            Some(LOGIN_LISTENER) => {
                return "Log in: Tab switch field · Enter submit · Esc cancel".to_string()
            }
            Some(search::LISTENER_NAME) => {
                return "Search: type to search · ↑/↓ move · Enter open · Esc close".to_string()
            }
            Some(CONFIRM_LISTENER) => return "Confirm: y delete · n keep".to_string(),
            Some(CHAT_LISTENER) => {
                return "Chat: type a message · Enter send · Esc close".to_string()
            }
            Some(COMPOSE_LISTENER) => {
                return match self.shell.screen() {
                    Screen::Home(_) => {
                        "Sign up: Tab next field · Enter submit · Esc stop typing".to_string()
                    }
                    _ => "Editor: Tab switch field · Ctrl+S save · Esc back".to_string(),
                };
            }
            _ => {}
        }

        let state = self.container.snapshot();
        let mut parts: Vec<String> = Vec::new();
        match self.shell.screen() {
            Screen::Home(home) if home.is_guest() => parts.push("i sign up".to_string()),
            Screen::Home(_) => parts.push("j/k move, Enter open".to_string()),
            Screen::Profile(profile) => {
                parts.push("j/k move, Enter open".to_string());
                parts.push("←/→ tabs".to_string());
                if profile.show_follow(state) || profile.show_stop_following(state) {
                    parts.push("f follow".to_string());
                }
            }
            Screen::ViewPost(view) if view.is_owner(state) => {
                parts.push("e edit, d delete".to_string());
            }
            _ => {}
        }
        if self.shell.screen().error().is_some() {
            parts.push("r retry".to_string());
        }
        parts.push("/ search".to_string());
        if state.logged_in {
            parts.push("c chat".to_string());
            parts.push("n new post".to_string());
            parts.push("p profile".to_string());
            parts.push("o log out".to_string());
        } else {
            parts.push("l log in".to_string());
        }
        parts.push("b back".to_string());
        parts.push("q quit".to_string());
        parts.join(" · ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ratatui::backend::TestBackend;

    use crate::data::MockBackend;
    use crate::fetch::QueuedExecutor;
    use crate::session::Persistence;
    use crate::storage;

    struct Fixture {
        model: Model,
        backend: Arc<MockBackend>,
        exec: QueuedExecutor,
    }

    fn fixture(route: Route) -> Fixture {
        let backend = Arc::new(MockBackend::new());
        let exec = QueuedExecutor::new();
        let services = Services::mock(backend.clone(), Arc::new(exec.clone()));
        let store = storage::Store::open(storage::Options {
            in_memory: true,
            ..Default::default()
        })
        .unwrap();
        let container = StateContainer::new(Persistence::new(Arc::new(store)), None).unwrap();
        let model = Model::new(Options {
            container,
            services,
            initial_route: route,
            chat_url: None,
            search_debounce: Duration::ZERO,
            status_message: String::new(),
        });
        Fixture {
            model,
            backend,
            exec,
        }
    }

    fn press(model: &mut Model, code: KeyCode) -> bool {
        model
            .handle_key(KeyEvent::new(code, KeyModifiers::NONE))
            .unwrap()
    }

    fn type_text(model: &mut Model, text: &str) {
        for ch in text.chars() {
            press(model, KeyCode::Char(ch));
        }
    }

    fn settle(f: &mut Fixture) {
        f.exec.run_all();
        f.model.step(Instant::now());
    }

    fn rendered(model: &mut Model) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|frame| model.draw(frame)).unwrap();
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn truncate_respects_width() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer title", 6), "a lon…");
    }

    #[test]
    fn login_popup_signs_in_and_closes() {
        let mut f = fixture(Route::Home);
        f.backend.add_user("ana", "pw");
        press(&mut f.model, KeyCode::Char('l'));
        assert_eq!(f.model.listeners.top(), Some(LOGIN_LISTENER));
        type_text(&mut f.model, "ana");
        press(&mut f.model, KeyCode::Enter);
        type_text(&mut f.model, "pw");
        press(&mut f.model, KeyCode::Enter);
        settle(&mut f);

        assert!(f.model.login.is_none());
        assert!(f.model.container.snapshot().is_user("ana"));
        let screen = rendered(&mut f.model);
        assert!(screen.contains("@ana"));
        assert!(screen.contains("You have successfully logged in."));
    }

    #[test]
    fn escape_goes_to_the_newest_listener() {
        let mut f = fixture(Route::About);
        let ana = f.backend.add_user("ana", "pw");
        f.model.dispatcher.dispatch(Action::Login(ana));
        f.model.step(Instant::now());

        press(&mut f.model, KeyCode::Char('c'));
        assert_eq!(f.model.listeners.top(), Some(CHAT_LISTENER));
        type_text(&mut f.model, "q");
        assert_eq!(f.model.chat.input(), "q");

        press(&mut f.model, KeyCode::Esc);
        assert!(!f.model.container.snapshot().is_chat_open);
        assert!(f.model.listeners.is_empty());
    }

    #[test]
    fn search_opens_types_and_navigates() {
        let mut f = fixture(Route::Home);
        f.backend.add_user("ana", "pw");
        let id = f.backend.add_post("ana", "Borrow checker notes", "body");
        press(&mut f.model, KeyCode::Char('/'));
        assert_eq!(f.model.listeners.top(), Some(search::LISTENER_NAME));
        type_text(&mut f.model, "borrow");
        f.model.step(Instant::now());
        settle(&mut f);
        assert!(rendered(&mut f.model).contains("Search Results (1 item found)"));

        press(&mut f.model, KeyCode::Enter);
        assert_eq!(f.model.shell.route(), &Route::ViewPost { id });
        assert!(!f.model.container.snapshot().is_search_open);
        assert!(!f.model.listeners.is_subscribed(search::LISTENER_NAME));
    }

    #[test]
    fn owner_can_delete_after_confirming() {
        let mut f = fixture(Route::Home);
        let ana = f.backend.add_user("ana", "pw");
        let id = f.backend.add_post("ana", "Mine", "text");
        f.model.dispatcher.dispatch(Action::Login(ana));
        f.model.step(Instant::now());
        f.model.navigate(Route::ViewPost { id });
        settle(&mut f);

        press(&mut f.model, KeyCode::Char('d'));
        assert_eq!(f.model.listeners.top(), Some(CONFIRM_LISTENER));
        assert!(rendered(&mut f.model).contains(DELETE_PROMPT));
        press(&mut f.model, KeyCode::Char('y'));
        settle(&mut f);
        assert_eq!(f.model.shell.route(), &Route::profile("ana"));
        assert_eq!(f.backend.call_count("delete_post"), 1);
    }

    #[test]
    fn create_post_editor_saves_with_ctrl_s() {
        let mut f = fixture(Route::Home);
        let ana = f.backend.add_user("ana", "pw");
        f.model.dispatcher.dispatch(Action::Login(ana));
        f.model.step(Instant::now());

        press(&mut f.model, KeyCode::Char('n'));
        assert_eq!(f.model.listeners.top(), Some(COMPOSE_LISTENER));
        type_text(&mut f.model, "Hello");
        press(&mut f.model, KeyCode::Enter);
        type_text(&mut f.model, "First post");
        f.model
            .handle_key(KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL))
            .unwrap();
        settle(&mut f);
        assert!(matches!(f.model.shell.route(), Route::ViewPost { .. }));
        assert!(f.model.listeners.is_empty());
    }

    #[test]
    fn finished_follow_asks_for_a_redraw() {
        let mut f = fixture(Route::Home);
        let ana = f.backend.add_user("ana", "pw");
        f.backend.add_user("bob", "pw");
        f.model.dispatcher.dispatch(Action::Login(ana));
        f.model.step(Instant::now());
        f.model.navigate(Route::profile("bob"));
        settle(&mut f);
        assert!(rendered(&mut f.model).contains("[f] Follow"));

        press(&mut f.model, KeyCode::Char('f'));
        f.exec.run_all();
        assert!(f.model.step(Instant::now()));
        let Screen::Profile(profile) = f.model.shell.screen() else {
            panic!("expected the profile screen");
        };
        assert_eq!(profile.counts().map(|c| c.follower_count), Some(1));
        assert!(rendered(&mut f.model).contains("[f] Stop Following"));
    }

    #[test]
    fn failed_sign_up_asks_for_a_redraw() {
        let mut f = fixture(Route::Home);
        f.backend.add_user("ana", "pw");
        press(&mut f.model, KeyCode::Char('i'));
        assert_eq!(f.model.listeners.top(), Some(COMPOSE_LISTENER));
        type_text(&mut f.model, "ana");
        press(&mut f.model, KeyCode::Tab);
        type_text(&mut f.model, "ana@example.com");
        press(&mut f.model, KeyCode::Tab);
        type_text(&mut f.model, "long enough password");
        press(&mut f.model, KeyCode::Enter);
        assert_eq!(f.backend.call_count("register"), 0);

        f.exec.run_all();
        assert!(f.model.step(Instant::now()));
        assert_eq!(f.backend.call_count("register"), 1);
        assert!(rendered(&mut f.model).contains("already taken"));
    }

    #[test]
    fn r_retries_a_failed_screen() {
        let mut f = fixture(Route::Home);
        f.backend.add_user("ana", "pw");
        let id = f.backend.add_post("ana", "Recovered", "text");
        f.backend.set_offline(true);
        f.model.navigate(Route::ViewPost { id });
        settle(&mut f);
        let screen = rendered(&mut f.model);
        assert!(screen.contains("Something went wrong"));
        assert!(screen.contains("Press r to try again."));

        f.backend.set_offline(false);
        press(&mut f.model, KeyCode::Char('r'));
        settle(&mut f);
        let screen = rendered(&mut f.model);
        assert!(screen.contains("Recovered"));
        assert!(!screen.contains("Something went wrong"));
    }

    #[test]
    fn static_pages_render_titles() {
        let mut f = fixture(Route::Terms);
        assert!(rendered(&mut f.model).contains("Terms and Conditions"));
        press(&mut f.model, KeyCode::Char('a'));
        assert!(rendered(&mut f.model).contains("About Us"));
        assert!(press(&mut f.model, KeyCode::Char('q')));
    }
}
