//! Brainstorm relay: hands a panel's completed reply to its sibling panels as
//! their next prompt.
//!
//! The coordinator never touches panel state. [`RelayCoordinator::relay`]
//! turns a committed assistant message into [`Delivery`] values and
//! [`RelayCoordinator::accept`] decides, per receiver, whether a delivery
//! becomes a submission. Each `(message, receiver)` pair is consumed the first
//! time it is looked at, so a duplicated delivery can never submit twice.
//!
//! Once every receiver a reply was relayed to has decided, the per-receiver
//! entries for that message are dropped and only its id is remembered, in a
//! window of the most recently settled messages.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::ids::{MessageId, PanelId};
use crate::core::message::Message;

const DEFAULT_ITERATION_LIMIT: u32 = 3;

/// Maximum hop count a relayed message may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "IterationLimitRepr", into = "IterationLimitRepr")]
pub enum IterationLimit {
    Finite(NonZeroU32),
    Infinite,
}

impl IterationLimit {
    /// `None` for zero, which is not a valid limit.
    pub fn finite(limit: u32) -> Option<Self> {
        NonZeroU32::new(limit).map(Self::Finite)
    }

    pub fn allows(&self, iteration_count: u32) -> bool {
        match self {
            IterationLimit::Finite(limit) => iteration_count <= limit.get(),
            IterationLimit::Infinite => true,
        }
    }
}

impl Default for IterationLimit {
    fn default() -> Self {
        Self::finite(DEFAULT_ITERATION_LIMIT).unwrap_or(Self::Infinite)
    }
}

impl fmt::Display for IterationLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IterationLimit::Finite(limit) => write!(f, "{limit}"),
            IterationLimit::Infinite => f.write_str("infinite"),
        }
    }
}

impl FromStr for IterationLimit {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("infinite") {
            return Ok(Self::Infinite);
        }
        let limit = value
            .parse::<u32>()
            .map_err(|_| format!("expected a positive number or \"infinite\", got {value:?}"))?;
        Self::finite(limit).ok_or_else(|| "iteration limit must be at least 1".to_string())
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum IterationLimitRepr {
    Count(u32),
    Word(String),
}

impl TryFrom<IterationLimitRepr> for IterationLimit {
    type Error = String;

    fn try_from(repr: IterationLimitRepr) -> Result<Self, String> {
        match repr {
            IterationLimitRepr::Count(limit) => {
                Self::finite(limit).ok_or_else(|| "iteration limit must be at least 1".to_string())
            }
            IterationLimitRepr::Word(word) => word.parse(),
        }
    }
}

impl From<IterationLimit> for IterationLimitRepr {
    fn from(limit: IterationLimit) -> Self {
        match limit {
            IterationLimit::Finite(limit) => IterationLimitRepr::Count(limit.get()),
            IterationLimit::Infinite => IterationLimitRepr::Word("infinite".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaySettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub iteration_limit: IterationLimit,
}

impl RelaySettings {
    pub fn enabled(iteration_limit: IterationLimit) -> Self {
        Self {
            enabled: true,
            iteration_limit,
        }
    }
}

/// A committed reply addressed to one receiving panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message_id: MessageId,
    pub from: PanelId,
    pub to: PanelId,
    pub content: String,
    pub iteration_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayDecision {
    Submit,
    AlreadyProcessed,
    SelfLoop,
    Disabled,
    IterationLimit,
    Busy,
}

impl RelayDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            RelayDecision::Submit => "submit",
            RelayDecision::AlreadyProcessed => "already-processed",
            RelayDecision::SelfLoop => "self-loop",
            RelayDecision::Disabled => "disabled",
            RelayDecision::IterationLimit => "iteration-limit",
            RelayDecision::Busy => "busy",
        }
    }
}

/// Settled message ids kept for duplicate detection.
const SETTLED_WINDOW: usize = 1024;

#[derive(Debug, Default)]
pub struct RelayCoordinator {
    panels: Vec<(PanelId, RelaySettings)>,
    consumed: HashSet<(MessageId, PanelId)>,
    /// Receivers a relayed message still waits on.
    outstanding: HashMap<MessageId, HashSet<PanelId>>,
    settled: VecDeque<MessageId>,
    settled_ids: HashSet<MessageId>,
}

impl RelayCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a panel, or replace the settings of one already registered.
    pub fn register(&mut self, panel: PanelId, settings: RelaySettings) {
        if !self.set_settings(&panel, settings) {
            self.panels.push((panel, settings));
        }
    }

    pub fn unregister(&mut self, panel: &PanelId) {
        self.panels.retain(|(id, _)| id != panel);
        self.consumed.retain(|(_, receiver)| receiver != panel);

        let emptied: Vec<MessageId> = self
            .outstanding
            .iter_mut()
            .filter_map(|(message_id, waiting)| {
                (waiting.remove(panel) && waiting.is_empty()).then(|| message_id.clone())
            })
            .collect();
        for message_id in emptied {
            self.settle(message_id);
        }
    }

    pub fn set_settings(&mut self, panel: &PanelId, settings: RelaySettings) -> bool {
        match self.panels.iter_mut().find(|(id, _)| id == panel) {
            Some((_, current)) => {
                *current = settings;
                true
            }
            None => false,
        }
    }

    pub fn settings(&self, panel: &PanelId) -> Option<RelaySettings> {
        self.panels
            .iter()
            .find(|(id, _)| id == panel)
            .map(|(_, settings)| *settings)
    }

    fn is_enabled(&self, panel: &PanelId) -> bool {
        self.settings(panel).is_some_and(|settings| settings.enabled)
    }

    /// Deliveries for a reply `from` just committed: one per other enabled
    /// panel, one hop further along than the message itself.
    pub fn relay(&mut self, from: &PanelId, message: &Message) -> Vec<Delivery> {
        if !message.is_assistant() || !self.is_enabled(from) {
            return Vec::new();
        }
        if self.settled_ids.contains(message.id()) || self.outstanding.contains_key(message.id()) {
            debug!(from = %from, "reply already relayed");
            return Vec::new();
        }

        let iteration_count = message.iteration_count().saturating_add(1);
        let deliveries: Vec<Delivery> = self
            .panels
            .iter()
            .filter(|(id, settings)| id != from && settings.enabled)
            .map(|(id, _)| Delivery {
                message_id: message.id().clone(),
                from: from.clone(),
                to: id.clone(),
                content: message.content().to_string(),
                iteration_count,
            })
            .collect();

        if !deliveries.is_empty() {
            self.outstanding.insert(
                message.id().clone(),
                deliveries.iter().map(|delivery| delivery.to.clone()).collect(),
            );
        }
        deliveries
    }

    /// Decide whether `receiver` should submit `delivery`.
    ///
    /// The pair is marked consumed before any other check, so whatever the
    /// outcome the same delivery is never considered again for this receiver.
    pub fn accept(
        &mut self,
        receiver: &PanelId,
        delivery: &Delivery,
        receiver_busy: bool,
    ) -> RelayDecision {
        let decision = if self.settled_ids.contains(&delivery.message_id)
            || !self
                .consumed
                .insert((delivery.message_id.clone(), receiver.clone()))
        {
            RelayDecision::AlreadyProcessed
        } else if &delivery.from == receiver {
            RelayDecision::SelfLoop
        } else if !self.is_enabled(receiver) {
            RelayDecision::Disabled
        } else if !self
            .settings(receiver)
            .is_some_and(|settings| settings.iteration_limit.allows(delivery.iteration_count))
        {
            RelayDecision::IterationLimit
        } else if receiver_busy {
            RelayDecision::Busy
        } else {
            RelayDecision::Submit
        };

        if decision != RelayDecision::Submit {
            debug!(
                receiver = %receiver,
                from = %delivery.from,
                iteration = delivery.iteration_count,
                decision = decision.as_str(),
                "relay delivery dropped"
            );
        }
        self.mark_decided(&delivery.message_id, receiver);
        decision
    }

    fn mark_decided(&mut self, message_id: &MessageId, receiver: &PanelId) {
        let Some(waiting) = self.outstanding.get_mut(message_id) else {
            return;
        };
        waiting.remove(receiver);
        if waiting.is_empty() {
            self.settle(message_id.clone());
        }
    }

    fn settle(&mut self, message_id: MessageId) {
        self.outstanding.remove(&message_id);
        self.consumed.retain(|(id, _)| id != &message_id);
        if self.settled_ids.insert(message_id.clone()) {
            self.settled.push_back(message_id);
        }
        while self.settled.len() > SETTLED_WINDOW {
            if let Some(oldest) = self.settled.pop_front() {
                self.settled_ids.remove(&oldest);
            }
        }
    }
}
