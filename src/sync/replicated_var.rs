//! Typed wrappers over the raw replication channels.
//!
//! Both wrappers keep a local mirror of the replicated value. Writes land in
//! the mirror immediately and queue a command; the echo of a participant's
//! own write is recognised by its origin and ignored.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::errors::SyncError;
use crate::sync::transport::{ChannelId, NetCommand, NetEvent, ObjectId, ParticipantId};

/// A replicated scalar with change detection.
#[derive(Debug, Clone)]
pub struct ReplicatedVar<T> {
    object: ObjectId,
    channel: ChannelId,
    value: T,
    dirty: bool,
}

impl<T> ReplicatedVar<T>
where
    T: Serialize + DeserializeOwned + PartialEq + Clone,
{
    pub fn new(object: ObjectId, channel: ChannelId, initial: T) -> Self {
        Self {
            object,
            channel,
            value: initial,
            dirty: false,
        }
    }

    #[inline]
    pub fn get(&self) -> &T {
        &self.value
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Owner-side write. Returns whether the value changed.
    pub fn set(&mut self, value: T) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        self.dirty = true;
        true
    }

    /// Replace the mirror without replicating anything.
    pub fn overwrite(&mut self, value: T) {
        self.value = value;
        self.dirty = false;
    }

    /// The pending write, if the value changed since the last call.
    pub fn take_command(&mut self) -> Result<Option<NetCommand>, SyncError> {
        if !self.dirty {
            return Ok(None);
        }
        self.dirty = false;
        Ok(Some(NetCommand::SetVar {
            object: self.object,
            channel: self.channel,
            payload: serde_json::to_vec(&self.value)?,
        }))
    }

    /// Fold a replicated change into the mirror. Returns the new value when
    /// it differs from what the mirror held.
    pub fn apply_event(
        &mut self,
        local_id: ParticipantId,
        event: &NetEvent,
    ) -> Result<Option<T>, SyncError> {
        let NetEvent::VarChanged {
            object,
            channel,
            origin,
            payload,
        } = event
        else {
            return Ok(None);
        };
        if *object != self.object || *channel != self.channel || *origin == local_id {
            return Ok(None);
        }

        let value: T = serde_json::from_slice(payload)?;
        if value == self.value {
            return Ok(None);
        }
        self.value = value.clone();
        self.dirty = false;
        Ok(Some(value))
    }
}

/// What changed in a replicated list, from an observer's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListDelta {
    Added { index: usize, value: u16 },
    Removed { index: usize, value: u16 },
    Cleared,
    Full(Vec<u16>),
}

/// A replicated ordered list of `u16` values.
#[derive(Debug, Clone)]
pub struct ReplicatedMoveList {
    object: ObjectId,
    channel: ChannelId,
    values: Vec<u16>,
    outbox: Vec<NetCommand>,
}

impl ReplicatedMoveList {
    pub fn new(object: ObjectId, channel: ChannelId) -> Self {
        Self {
            object,
            channel,
            values: Vec::new(),
            outbox: Vec::new(),
        }
    }

    #[inline]
    pub fn values(&self) -> &[u16] {
        &self.values
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn push(&mut self, value: u16) {
        self.outbox.push(NetCommand::ListAdd {
            object: self.object,
            channel: self.channel,
            index: self.values.len() as u32,
            value,
        });
        self.values.push(value);
    }

    pub fn remove_last(&mut self) -> Option<u16> {
        let value = self.values.pop()?;
        self.outbox.push(NetCommand::ListRemoveAt {
            object: self.object,
            channel: self.channel,
            index: self.values.len() as u32,
        });
        Some(value)
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.outbox.push(NetCommand::ListClear {
            object: self.object,
            channel: self.channel,
        });
    }

    pub fn drain_commands(&mut self) -> Vec<NetCommand> {
        std::mem::take(&mut self.outbox)
    }

    pub fn apply_event(&mut self, local_id: ParticipantId, event: &NetEvent) -> Option<ListDelta> {
        match event {
            NetEvent::ListAdd {
                object,
                channel,
                origin,
                index,
                value,
            } if self.matches(*object, *channel) && *origin != local_id => {
                let index = *index as usize;
                if index != self.values.len() {
                    warn!(index, len = self.values.len(), "replicated list add out of order");
                }
                let at = index.min(self.values.len());
                self.values.insert(at, *value);
                Some(ListDelta::Added {
                    index,
                    value: *value,
                })
            }
            NetEvent::ListRemoveAt {
                object,
                channel,
                origin,
                index,
                value,
            } if self.matches(*object, *channel) && *origin != local_id => {
                let at = *index as usize;
                if at < self.values.len() {
                    self.values.remove(at);
                }
                Some(ListDelta::Removed {
                    index: at,
                    value: *value,
                })
            }
            NetEvent::ListClear {
                object,
                channel,
                origin,
            } if self.matches(*object, *channel) && *origin != local_id => {
                self.values.clear();
                Some(ListDelta::Cleared)
            }
            NetEvent::ListFull {
                object,
                channel,
                values,
            } if self.matches(*object, *channel) => {
                self.values = values.clone();
                Some(ListDelta::Full(values.clone()))
            }
            _ => None,
        }
    }

    #[inline]
    fn matches(&self, object: ObjectId, channel: ChannelId) -> bool {
        self.object == object && self.channel == channel
    }
}
