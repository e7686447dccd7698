use tracing::{info, warn};

use crate::{RouterError, TaskRouter, flatten_history};
use vox_db::{AgentStatus, Database, SharedDatabase};

pub const NO_AGENT_REPLY: &str =
    "I'm sorry, I can't find an agent configured for your account.";
pub const PAUSED_REPLY: &str =
    "This agent is currently paused. Please resume it from the dashboard.";
/// Most recent turns kept when building model history.
pub const HISTORY_LIMIT: usize = 10;

/// One chat turn end to end: resolve the agent, apply the guardrail
/// short-circuits, route to a model, and log the exchange.
pub struct ProcessMessage {
    router: TaskRouter,
    db: SharedDatabase,
    history_limit: usize,
}

impl ProcessMessage {
    pub fn new(router: TaskRouter, db: SharedDatabase) -> Self {
        Self {
            router,
            db,
            history_limit: HISTORY_LIMIT,
        }
    }

    pub async fn execute(&self, user_id: &str, query: &str) -> Result<String, RouterError> {
        let Some(agent) = self.db.agent_for_user(user_id).await? else {
            info!(user_id, "no agent configured, returning fixed reply");
            return Ok(NO_AGENT_REPLY.to_string());
        };

        if agent.status == AgentStatus::Paused {
            info!(user_id, agent_id = %agent.id, "agent paused, returning fixed reply");
            self.log_turn(&agent.id, user_id, query, PAUSED_REPLY).await;
            return Ok(PAUSED_REPLY.to_string());
        }

        let turns = self
            .db
            .conversation_history(&agent.id, user_id, self.history_limit)
            .await?;
        let history = flatten_history(&turns);

        let reply = self
            .router
            .route(user_id, query, &history, agent.task(), &agent)
            .await?;

        self.log_turn(&agent.id, user_id, query, &reply).await;
        Ok(reply)
    }

    /// Best-effort: a logging failure never fails the turn.
    async fn log_turn(&self, agent_id: &str, user_id: &str, query: &str, reply: &str) {
        if let Err(err) = self.db.log_turn(agent_id, user_id, query, reply).await {
            warn!(user_id, agent_id, error = %err, "failed to log conversation turn");
        }
    }
}
