//! Per-slot agent session.
//!
//! A session exists for every configured participant. Only sessions whose
//! endpoint validated hold a transport; the others describe engine-AI slots
//! and never exchange anything.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use crate::config::AgentSettings;
use crate::engine::{Difficulty, Participant, Race};
use crate::protocol::{AgentAction, AgentContext, AgentStats};
use crate::transport::{AgentTransport, TransportFactory};

/// Orchestrator-side record for one participant slot.
pub struct AgentSession {
    slot: usize,
    participant_id: String,
    race: Race,
    difficulty: Difficulty,
    endpoint: Option<Url>,
    transport: Option<Arc<dyn AgentTransport>>,
    stats: Option<AgentStats>,
    context: Option<AgentContext>,
}

impl AgentSession {
    /// Build the session for `settings` at `slot`.
    ///
    /// A missing, malformed or unopenable endpoint produces an engine-AI
    /// session instead of an error.
    pub fn create(settings: &AgentSettings, slot: usize, factory: &dyn TransportFactory) -> Self {
        let endpoint = settings.endpoint.as_deref().and_then(|raw| match Url::parse(raw) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(slot, endpoint = raw, error = %e, "Invalid agent endpoint, slot falls back to engine AI");
                None
            }
        });

        let transport = endpoint.as_ref().and_then(|url| {
            match factory.open(url, settings.token.as_deref()) {
                Ok(transport) => Some(transport),
                Err(e) => {
                    warn!(slot, endpoint = %url, error = %e, "Failed to open agent transport");
                    None
                }
            }
        });

        debug!(slot, race = %settings.race, agent = transport.is_some(), "Agent session created");

        Self {
            slot,
            participant_id: format!("{}#{}", settings.race, slot),
            race: settings.race,
            difficulty: settings.difficulty.unwrap_or_default(),
            endpoint: if transport.is_some() { endpoint } else { None },
            transport,
            stats: None,
            context: None,
        }
    }

    /// Reset statistics and context when the match begins for this slot.
    pub fn on_session_start(&mut self, reward_dims: usize) {
        if self.transport.is_none() {
            return;
        }
        self.stats = Some(AgentStats::zeroed(reward_dims));
        self.context = None;
    }

    /// Record a successful exchange.
    ///
    /// The context is replaced by whatever the agent returned, `None`
    /// included. No-op for sessions without a transport or before
    /// [`Self::on_session_start`].
    pub fn record_exchange(
        &mut self,
        action: AgentAction,
        context: Option<AgentContext>,
        reward: &[f64],
        score: Option<f64>,
    ) {
        if self.transport.is_none() {
            return;
        }
        let Some(stats) = self.stats.as_mut() else {
            warn!(slot = self.slot, "Exchange before session start, ignoring");
            return;
        };
        stats.last_action = Some(action);
        stats.accumulate(reward);
        if let Some(score) = score {
            stats.score = score;
        }
        stats.steps += 1;
        self.context = context;
    }

    /// Engine participant for this slot.
    #[must_use]
    pub fn participant(&self) -> Participant {
        if self.transport.is_some() {
            Participant::Agent {
                slot: self.slot,
                race: self.race,
            }
        } else {
            Participant::Computer {
                slot: self.slot,
                race: self.race,
                difficulty: self.difficulty,
            }
        }
    }

    /// Player slot.
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Participant designation (race and slot).
    #[must_use]
    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    /// Validated endpoint, present iff the session has a transport.
    #[must_use]
    pub fn endpoint(&self) -> Option<&Url> {
        self.endpoint.as_ref()
    }

    /// Whether this slot is played by a remote agent.
    #[must_use]
    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// Transport handle.
    #[must_use]
    pub fn transport(&self) -> Option<&Arc<dyn AgentTransport>> {
        self.transport.as_ref()
    }

    /// Running statistics, once the match has started.
    #[must_use]
    pub fn stats(&self) -> Option<&AgentStats> {
        self.stats.as_ref()
    }

    /// Context returned by the agent on the last exchange.
    #[must_use]
    pub fn context(&self) -> Option<&AgentContext> {
        self.context.as_ref()
    }
}

impl fmt::Debug for AgentSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSession")
            .field("slot", &self.slot)
            .field("participant_id", &self.participant_id)
            .field("endpoint", &self.endpoint.as_ref().map(Url::as_str))
            .field("has_transport", &self.transport.is_some())
            .field("stats", &self.stats)
            .field("context", &self.context)
            .finish()
    }
}
