//! Message log - bounded publish/subscribe history with per-consumer cursors

mod payload;

use std::{
    collections::{BTreeMap, VecDeque},
    fmt,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use payload::{
    AlertPayload, AllocPayload, Coverage, MilestonePayload, PhaseChangePayload, PlanPayload,
    PlannedRoute, ReconCompletePayload, ReconPayload, RepairAllocPayload, RepairStatusPayload,
    RouteStatus, Severity, StepEstimate,
};

pub const DEFAULT_RETENTION: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Alert,
    Recon,
    ReconComplete,
    Plan,
    Alloc,
    RepairStatus,
    RepairAlloc,
    Milestone,
    PhaseChange,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Alert => "alert",
            MessageKind::Recon => "recon",
            MessageKind::ReconComplete => "recon_complete",
            MessageKind::Plan => "plan",
            MessageKind::Alloc => "alloc",
            MessageKind::RepairStatus => "repair_status",
            MessageKind::RepairAlloc => "repair_alloc",
            MessageKind::Milestone => "milestone",
            MessageKind::PhaseChange => "phase_change",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed payload; serialises as `{"type": ..., "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MessageBody {
    Alert(AlertPayload),
    Recon(ReconPayload),
    ReconComplete(ReconCompletePayload),
    Plan(PlanPayload),
    Alloc(AllocPayload),
    RepairStatus(RepairStatusPayload),
    RepairAlloc(RepairAllocPayload),
    Milestone(MilestonePayload),
    PhaseChange(PhaseChangePayload),
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Alert(_) => MessageKind::Alert,
            MessageBody::Recon(_) => MessageKind::Recon,
            MessageBody::ReconComplete(_) => MessageKind::ReconComplete,
            MessageBody::Plan(_) => MessageKind::Plan,
            MessageBody::Alloc(_) => MessageKind::Alloc,
            MessageBody::RepairStatus(_) => MessageKind::RepairStatus,
            MessageBody::RepairAlloc(_) => MessageKind::RepairAlloc,
            MessageBody::Milestone(_) => MessageKind::Milestone,
            MessageBody::PhaseChange(_) => MessageKind::PhaseChange,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: String,
    #[serde(flatten)]
    pub body: MessageBody,
    pub priority: u8,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }
}

/// Append-only history bounded to `retention` entries.
///
/// Ids keep increasing across evictions, so a consumer whose cursor points at an
/// evicted id simply sees the surviving tail on its next read.
#[derive(Debug)]
pub struct MessageLog {
    messages: VecDeque<Message>,
    retention: usize,
    last_id: u64,
    cursors: BTreeMap<String, MessageId>,
}

impl MessageLog {
    pub fn new(retention: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            retention: retention.max(1),
            last_id: 0,
            cursors: BTreeMap::new(),
        }
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Id of the newest message ever sent, 0 before the first send.
    pub fn head_id(&self) -> MessageId {
        MessageId(self.last_id)
    }

    pub fn send(
        &mut self,
        sender: &str,
        body: MessageBody,
        priority: u8,
        timestamp: Option<DateTime<Utc>>,
    ) -> MessageId {
        self.last_id += 1;
        let id = MessageId(self.last_id);
        self.messages.push_back(Message {
            id,
            sender: sender.to_string(),
            body,
            priority,
            timestamp: timestamp.unwrap_or_else(Utc::now),
        });
        while self.messages.len() > self.retention {
            self.messages.pop_front();
        }
        id
    }

    /// Messages newer than the consumer's cursor, oldest first.
    ///
    /// With `clear` the cursor jumps to the head and nothing is returned.
    pub fn read_all(&mut self, consumer: &str, clear: bool) -> Vec<Message> {
        if clear {
            self.cursors.insert(consumer.to_string(), self.head_id());
            return Vec::new();
        }
        let cursor = self.cursors.get(consumer).copied().unwrap_or_default();
        let fresh: Vec<Message> = self.since(cursor).cloned().collect();
        if let Some(last) = fresh.last() {
            self.cursors.insert(consumer.to_string(), last.id);
        }
        fresh
    }

    /// Last `count` messages without touching any cursor.
    pub fn read_recent(&self, count: usize) -> Vec<Message> {
        let skip = self.messages.len().saturating_sub(count);
        self.messages.iter().skip(skip).cloned().collect()
    }

    /// Messages with an id above `id`, oldest first. Pure read.
    pub fn since(&self, id: MessageId) -> impl Iterator<Item = &Message> + '_ {
        let start = self.messages.partition_point(|message| message.id <= id);
        self.messages.range(start..)
    }

    /// Keeps only the newest `keep_recent` messages. Cursors are left alone.
    pub fn clear_old_messages(&mut self, keep_recent: usize) {
        while self.messages.len() > keep_recent {
            self.messages.pop_front();
        }
    }

    pub fn reset(&mut self) {
        self.messages.clear();
        self.cursors.clear();
        self.last_id = 0;
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}
