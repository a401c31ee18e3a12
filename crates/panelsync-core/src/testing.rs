//! In-memory collaborators for exercising the synchronizer without a network.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::a2s::{QueryError, ServerQuery};
use crate::render::PanelEmbed;
use crate::sink::{ChannelInfo, ChannelKind, ChatMessage, ChatSink, SinkError};
use crate::status::ServerStatus;

#[derive(Default)]
pub struct FakeQuery {
    answers: Mutex<HashMap<(String, u16), Result<(u32, u32), ()>>>,
    calls: Mutex<HashMap<(String, u16), usize>>,
}

impl FakeQuery {
    pub fn set(&self, host: &str, port: u16, answer: Result<(u32, u32), ()>) {
        self.answers
            .lock()
            .expect("answers lock")
            .insert((host.to_string(), port), answer);
    }

    pub fn calls(&self, host: &str, port: u16) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .get(&(host.to_string(), port))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ServerQuery for FakeQuery {
    async fn query(
        &self,
        host: &str,
        port: u16,
        _timeout: Duration,
    ) -> Result<ServerStatus, QueryError> {
        let key = (host.to_string(), port);
        *self.calls.lock().expect("calls lock").entry(key.clone()).or_default() += 1;
        match self.answers.lock().expect("answers lock").get(&key).copied() {
            Some(Ok((online, max))) => Ok(ServerStatus {
                online,
                max,
                name: format!("{host} server"),
                map: "de_dust2".to_string(),
            }),
            Some(Err(())) => Err(QueryError::Timeout),
            None => Err(QueryError::Io("unreachable".to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Send,
    Edit,
    Rename,
    Delete,
    FetchMessage,
    FetchRecent,
}

#[derive(Default)]
struct SinkState {
    next_id: u64,
    channels: HashMap<u64, ChannelInfo>,
    messages: HashMap<u64, Vec<ChatMessage>>,
    failures: HashMap<Op, VecDeque<SinkError>>,
    attempts: HashMap<Op, usize>,
    writes: Vec<(Op, u64)>,
}

pub struct FakeSink {
    pub bot_id: u64,
    state: Mutex<SinkState>,
}

impl Default for FakeSink {
    fn default() -> Self {
        Self {
            bot_id: 4242,
            state: Mutex::new(SinkState {
                next_id: 1000,
                ..SinkState::default()
            }),
        }
    }
}

impl FakeSink {
    pub fn with_channel(self, id: u64, kind: ChannelKind, name: &str) -> Self {
        self.state.lock().expect("state lock").channels.insert(
            id,
            ChannelInfo {
                id,
                kind,
                name: name.to_string(),
            },
        );
        self
    }

    /// Queues errors returned by the next calls of `op`, before normal behaviour resumes.
    pub fn fail_next(&self, op: Op, errors: impl IntoIterator<Item = SinkError>) {
        self.state
            .lock()
            .expect("state lock")
            .failures
            .entry(op)
            .or_default()
            .extend(errors);
    }

    pub fn writes(&self) -> Vec<(Op, u64)> {
        self.state.lock().expect("state lock").writes.clone()
    }

    pub fn write_count(&self, op: Op) -> usize {
        self.writes().iter().filter(|(o, _)| *o == op).count()
    }

    pub fn attempts(&self, op: Op) -> usize {
        self.state
            .lock()
            .expect("state lock")
            .attempts
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    pub fn channel_name(&self, id: u64) -> Option<String> {
        self.state
            .lock()
            .expect("state lock")
            .channels
            .get(&id)
            .map(|c| c.name.clone())
    }

    pub fn messages(&self, channel_id: u64) -> Vec<ChatMessage> {
        self.state
            .lock()
            .expect("state lock")
            .messages
            .get(&channel_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Posts a message as someone (or something) other than the synchronizer.
    pub fn post_foreign(&self, channel_id: u64, author_id: u64, embeds: Vec<PanelEmbed>) -> u64 {
        let mut state = self.state.lock().expect("state lock");
        state.next_id += 1;
        let id = state.next_id;
        state.messages.entry(channel_id).or_default().push(ChatMessage {
            id,
            channel_id,
            author_id,
            embeds,
        });
        id
    }

    /// Rewrites a message behind the synchronizer's back.
    pub fn edit_out_of_band(&self, channel_id: u64, message_id: u64, panel: PanelEmbed) {
        let mut state = self.state.lock().expect("state lock");
        if let Some(msg) = state
            .messages
            .get_mut(&channel_id)
            .and_then(|msgs| msgs.iter_mut().find(|m| m.id == message_id))
        {
            msg.embeds = vec![panel];
        }
    }

    pub fn rename_out_of_band(&self, channel_id: u64, name: &str) {
        if let Some(channel) = self
            .state
            .lock()
            .expect("state lock")
            .channels
            .get_mut(&channel_id)
        {
            channel.name = name.to_string();
        }
    }

    fn begin(&self, op: Op) -> Result<(), SinkError> {
        let mut state = self.state.lock().expect("state lock");
        *state.attempts.entry(op).or_default() += 1;
        match state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChatSink for FakeSink {
    async fn current_user_id(&self) -> Result<u64, SinkError> {
        Ok(self.bot_id)
    }

    async fn fetch_channel(&self, channel_id: u64) -> Result<ChannelInfo, SinkError> {
        self.state
            .lock()
            .expect("state lock")
            .channels
            .get(&channel_id)
            .cloned()
            .ok_or(SinkError::NotFound)
    }

    async fn fetch_message(
        &self,
        channel_id: u64,
        message_id: u64,
    ) -> Result<ChatMessage, SinkError> {
        self.begin(Op::FetchMessage)?;
        self.messages(channel_id)
            .into_iter()
            .find(|m| m.id == message_id)
            .ok_or(SinkError::NotFound)
    }

    async fn fetch_recent_messages(
        &self,
        channel_id: u64,
        limit: u8,
    ) -> Result<Vec<ChatMessage>, SinkError> {
        self.begin(Op::FetchRecent)?;
        Ok(self
            .messages(channel_id)
            .into_iter()
            .rev()
            .take(limit.into())
            .collect())
    }

    async fn send_message(
        &self,
        channel_id: u64,
        panel: &PanelEmbed,
    ) -> Result<ChatMessage, SinkError> {
        self.begin(Op::Send)?;
        let id = self.post_foreign(channel_id, self.bot_id, vec![panel.clone()]);
        self.state.lock().expect("state lock").writes.push((Op::Send, id));
        Ok(ChatMessage {
            id,
            channel_id,
            author_id: self.bot_id,
            embeds: vec![panel.clone()],
        })
    }

    async fn edit_message(
        &self,
        channel_id: u64,
        message_id: u64,
        panel: &PanelEmbed,
    ) -> Result<ChatMessage, SinkError> {
        self.begin(Op::Edit)?;
        let mut state = self.state.lock().expect("state lock");
        let msg = state
            .messages
            .get_mut(&channel_id)
            .and_then(|msgs| msgs.iter_mut().find(|m| m.id == message_id))
            .ok_or(SinkError::NotFound)?;
        msg.embeds = vec![panel.clone()];
        let out = msg.clone();
        state.writes.push((Op::Edit, message_id));
        Ok(out)
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), SinkError> {
        self.begin(Op::Delete)?;
        let mut state = self.state.lock().expect("state lock");
        let msgs = state.messages.entry(channel_id).or_default();
        let before = msgs.len();
        msgs.retain(|m| m.id != message_id);
        if msgs.len() == before {
            return Err(SinkError::NotFound);
        }
        state.writes.push((Op::Delete, message_id));
        Ok(())
    }

    async fn rename_channel(&self, channel_id: u64, name: &str) -> Result<(), SinkError> {
        self.begin(Op::Rename)?;
        let mut state = self.state.lock().expect("state lock");
        let channel = state.channels.get_mut(&channel_id).ok_or(SinkError::NotFound)?;
        channel.name = name.to_string();
        state.writes.push((Op::Rename, channel_id));
        Ok(())
    }
}
