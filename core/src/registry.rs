use std::collections::HashSet;

use dashmap::DashMap;
use prost_types::Timestamp;

use crate::proto::AgentCard;
use crate::time::now_timestamp;

/// A registered agent: its capability card plus broker-side bookkeeping.
#[derive(Debug, Clone)]
pub struct RegisteredAgent {
    pub card: AgentCard,
    /// Task-type tags the agent asked to be routed (optional).
    pub subscription_tags: Vec<String>,
    pub registered_at: Timestamp,
}

/// Thread-safe, in-memory registry of agent capability cards.
///
/// Registration is keyed by `AgentCard.name` (the agent id) and outlives any
/// subscription stream: an agent stays registered across reconnects until it
/// explicitly unregisters. A skill-tag index supports capability lookup for
/// routing and orchestration.
///
/// # Examples
///
/// ```
/// use agenthub_core::AgentRegistry;
/// use agenthub_proto::AgentCard;
///
/// let registry = AgentRegistry::new();
/// let created = registry.register(
///     AgentCard { name: "translator".into(), ..Default::default() },
///     vec!["translate".into()],
/// );
/// assert!(created);
/// assert!(registry.get("translator").is_some());
/// ```
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: DashMap<String, RegisteredAgent>,
    skill_tag_index: DashMap<String, HashSet<String>>, // tag -> agent ids
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update an agent card.
    ///
    /// Returns `true` when the agent was not previously registered. On
    /// re-registration the old skill-tag index entries are removed before the
    /// new ones are added, so registry contents are idempotent with respect
    /// to identical cards.
    pub fn register(&self, card: AgentCard, subscription_tags: Vec<String>) -> bool {
        let id = card.name.clone();
        let existed = if let Some(old) = self.agents.get(&id) {
            for tag in old.card.skills.iter().flat_map(|s| s.tags.iter()) {
                if let Some(mut set) = self.skill_tag_index.get_mut(tag) {
                    set.remove(&id);
                }
            }
            true
        } else {
            false
        };
        for tag in card.skills.iter().flat_map(|s| s.tags.iter()) {
            self.skill_tag_index
                .entry(tag.clone())
                .or_default()
                .insert(id.clone());
        }
        self.agents.insert(
            id,
            RegisteredAgent {
                card,
                subscription_tags,
                registered_at: now_timestamp(),
            },
        );
        !existed
    }

    /// Remove an agent. Returns the removed card, if any.
    pub fn unregister(&self, agent_id: &str) -> Option<AgentCard> {
        let (_, old) = self.agents.remove(agent_id)?;
        for tag in old.card.skills.iter().flat_map(|s| s.tags.iter()) {
            if let Some(mut set) = self.skill_tag_index.get_mut(tag) {
                set.remove(agent_id);
            }
        }
        Some(old.card)
    }

    pub fn get(&self, agent_id: &str) -> Option<RegisteredAgent> {
        self.agents.get(agent_id).map(|e| e.clone())
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }

    /// Agent ids advertising a skill with the given tag.
    ///
    /// ```
    /// use agenthub_core::AgentRegistry;
    /// use agenthub_proto::{AgentCard, AgentSkill};
    ///
    /// let registry = AgentRegistry::new();
    /// registry.register(
    ///     AgentCard {
    ///         name: "translator".into(),
    ///         skills: vec![AgentSkill { tags: vec!["translate".into()], ..Default::default() }],
    ///         ..Default::default()
    ///     },
    ///     vec![],
    /// );
    /// assert_eq!(registry.by_skill_tag("translate"), vec!["translator".to_string()]);
    /// ```
    pub fn by_skill_tag(&self, tag: &str) -> Vec<String> {
        self.skill_tag_index
            .get(tag)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of all registered cards. Order is undefined.
    pub fn all(&self) -> Vec<AgentCard> {
        self.agents.iter().map(|e| e.card.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
