use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    domain::{ChannelId, MessageId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{MessagingCapabilities, SummaryContent},
    },
    Error, Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Send(String),
    Edit(String, String),
    List(String, u8),
    Delete(String, String),
}

/// In-memory messenger: tracks live messages per channel and records calls.
#[derive(Default)]
pub struct FakeMessenger {
    pub(crate) next_id: Mutex<u32>,
    pub(crate) live: Mutex<Vec<MessageRef>>,
    pub(crate) calls: Mutex<Vec<Call>>,

    pub fail_send: bool,
    pub fail_edit: bool,
    pub fail_list: bool,
    pub fail_delete: bool,
}

impl FakeMessenger {
    /// Seed a message that already exists remotely (not recorded as a call).
    pub fn seed(&self, channel: &str, message: &str) {
        self.live
            .lock()
            .unwrap()
            .push(MessageRef::new(channel.into(), message.into()));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn sends(&self) -> usize {
        self.count(|c| matches!(c, Call::Send(_)))
    }

    pub fn edits(&self) -> usize {
        self.count(|c| matches!(c, Call::Edit(..)))
    }

    pub fn deletes(&self) -> usize {
        self.count(|c| matches!(c, Call::Delete(..)))
    }

    pub fn live_in(&self, channel: &str) -> Vec<String> {
        self.live
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.channel_id.0 == channel)
            .map(|m| m.message_id.0.clone())
            .collect()
    }

    fn alloc(&self) -> MessageId {
        let mut guard = self.next_id.lock().unwrap();
        *guard += 1;
        MessageId(format!("N{}", *guard))
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_fields: 25,
            max_field_value_len: 1024,
            max_list_limit: 100,
        }
    }

    async fn send_summary(
        &self,
        channel_id: &ChannelId,
        _summary: &SummaryContent,
    ) -> Result<MessageRef> {
        self.record(Call::Send(channel_id.0.clone()));
        if self.fail_send {
            return Err(Error::External("send failed".to_string()));
        }
        let msg = MessageRef::new(channel_id.clone(), self.alloc());
        self.live.lock().unwrap().push(msg.clone());
        Ok(msg)
    }

    async fn edit_summary(&self, msg: &MessageRef, _summary: &SummaryContent) -> Result<MessageRef> {
        self.record(Call::Edit(msg.channel_id.0.clone(), msg.message_id.0.clone()));
        if self.fail_edit {
            return Err(Error::External("503 Service Unavailable".to_string()));
        }
        if !self.live.lock().unwrap().contains(msg) {
            return Err(Error::message_not_found(msg));
        }
        Ok(msg.clone())
    }

    async fn list_recent(&self, channel_id: &ChannelId, limit: u8) -> Result<Vec<MessageRef>> {
        self.record(Call::List(channel_id.0.clone(), limit));
        if self.fail_list {
            return Err(Error::External("list failed".to_string()));
        }
        Ok(self
            .live
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|m| &m.channel_id == channel_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn delete_message(&self, msg: &MessageRef) -> Result<()> {
        self.record(Call::Delete(msg.channel_id.0.clone(), msg.message_id.0.clone()));
        if self.fail_delete {
            return Err(Error::External("missing permissions".to_string()));
        }
        self.live.lock().unwrap().retain(|m| m != msg);
        Ok(())
    }
}
