use std::io::{self, ErrorKind};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context as _, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::fetch::CancelHandle;
use crate::screen::Context;
use crate::state::{Action, Dispatcher};

const READ_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub username: String,
    pub avatar: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Frame {
    #[serde(rename = "chatFromBrowser")]
    FromBrowser { message: String, token: String },
    #[serde(rename = "chatFromServer")]
    FromServer(ChatMessage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Message(ChatMessage),
    Disconnected(String),
}

pub struct ChatConnection {
    outbound: Sender<Frame>,
    inbound: Receiver<ChatEvent>,
    cancel: CancelHandle,
}

pub struct ChatPeer {
    pub inbound: Sender<ChatEvent>,
    pub outbound: Receiver<Frame>,
}

impl ChatConnection {
    pub fn connect(url: &str) -> Self {
        let (connection, peer) = Self::pair();
        let cancel = connection.cancel.clone();
        let url = url.to_string();
        thread::spawn(move || {
            if let Err(err) = socket_loop(&url, &peer, &cancel) {
                let reason = format!("{err:#}");
                tracing::warn!(%url, %reason, "chat connection ended");
                let _ = peer.inbound.send(ChatEvent::Disconnected(reason));
            }
        });
        connection
    }

    pub fn pair() -> (Self, ChatPeer) {
        let (out_tx, out_rx) = unbounded();
        let (in_tx, in_rx) = unbounded();
        (
            Self {
                outbound: out_tx,
                inbound: in_rx,
                cancel: CancelHandle::new(),
            },
            ChatPeer {
                inbound: in_tx,
                outbound: out_rx,
            },
        )
    }

    pub fn send(&self, frame: Frame) -> Result<()> {
        self.outbound
            .send(frame)
            .map_err(|_| anyhow!("chat connection is closed"))
    }

    pub fn try_recv(&self) -> Option<ChatEvent> {
        self.inbound.try_recv().ok()
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ChatConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn socket_loop(url: &str, peer: &ChatPeer, cancel: &CancelHandle) -> Result<()> {
    let (mut socket, _) =
        tungstenite::connect(url).with_context(|| format!("connect chat socket {url}"))?;
    set_read_timeout(&socket, Some(READ_POLL_INTERVAL)).context("configure chat socket")?;
    tracing::info!(%url, "chat connected");

    while !cancel.is_cancelled() {
        while let Ok(frame) = peer.outbound.try_recv() {
            let text = serde_json::to_string(&frame).context("encode chat frame")?;
            socket.send(Message::Text(text)).context("send chat frame")?;
        }
        match socket.read() {
            Ok(Message::Text(text)) => match serde_json::from_str::<Frame>(&text) {
                Ok(Frame::FromServer(message)) => {
                    if peer.inbound.send(ChatEvent::Message(message)).is_err() {
                        break;
                    }
                }
                Ok(Frame::FromBrowser { .. }) => {}
                Err(err) => tracing::debug!(%err, "ignoring unexpected chat frame"),
            },
            Ok(Message::Close(_)) => bail!("chat server closed the connection"),
            Ok(_) => {}
            Err(tungstenite::Error::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(err) => return Err(err).context("read chat socket"),
        }
    }
    let _ = socket.close(None);
    tracing::info!("chat disconnected");
    Ok(())
}

fn set_read_timeout(
    socket: &WebSocket<MaybeTlsStream<TcpStream>>,
    timeout: Option<Duration>,
) -> io::Result<()> {
    match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(timeout),
        MaybeTlsStream::Rustls(stream) => stream.get_ref().set_read_timeout(timeout),
        _ => Ok(()),
    }
}

#[derive(Default)]
pub struct ChatPanel {
    messages: Vec<ChatMessage>,
    input: String,
    connection: Option<ChatConnection>,
    was_open: bool,
    status: Option<String>,
}

impl ChatPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, connection: ChatConnection) {
        self.connection = Some(connection);
        self.status = None;
    }

    pub fn detach(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        self.messages.clear();
        self.input.clear();
        self.was_open = false;
        self.status = None;
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn sync_visibility(&mut self, ctx: &Context<'_>) {
        let open = ctx.state.is_chat_open;
        if open && !self.was_open {
            ctx.dispatcher.dispatch(Action::ClearUnreadChatCount);
        }
        self.was_open = open;
    }

    pub fn poll(&mut self, ctx: &Context<'_>) -> bool {
        let mut changed = false;
        loop {
            let Some(event) = self.connection.as_ref().and_then(ChatConnection::try_recv) else {
                break;
            };
            changed = true;
            match event {
                ChatEvent::Message(message) => {
                    self.messages.push(message);
                    if !ctx.state.is_chat_open {
                        ctx.dispatcher.dispatch(Action::IncrementUnreadChatCount);
                    }
                }
                ChatEvent::Disconnected(reason) => {
                    self.status = Some(reason);
                    self.connection = None;
                }
            }
        }
        changed
    }

    pub fn insert_char(&mut self, ch: char) {
        self.input.push(ch);
    }

    pub fn backspace(&mut self) {
        self.input.pop();
    }

    pub fn send(&mut self, ctx: &Context<'_>) -> bool {
        let message = self.input.trim().to_string();
        if message.is_empty() || !ctx.state.logged_in {
            return false;
        }
        if let Some(connection) = &self.connection {
            let frame = Frame::FromBrowser {
                message: message.clone(),
                token: ctx.state.user.token.clone(),
            };
            if let Err(err) = connection.send(frame) {
                self.status = Some(format!("{err:#}"));
            }
        }
        self.messages.push(ChatMessage {
            username: ctx.state.user.username.clone(),
            avatar: ctx.state.user.avatar.clone(),
            message,
        });
        self.input.clear();
        true
    }

    pub fn close(&self, dispatcher: &Dispatcher) {
        dispatcher.dispatch(Action::CloseChat);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}
