use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use tracing::{debug, error, info};

use super::context::{compose_system_prompt, CalendarContext};
use crate::calendar::{EventCache, IntentClassifier, TemporalFilter};
use crate::error::AssistantError;
use crate::memory::{ConversationMemory, ConversationTurn, HistoryStore};
use crate::services::llm::{CompletionRequest, CompletionService};

/// Turns one line of user text into a reply, with calendar context and
/// per-session history.
pub struct ResponseOrchestrator {
    persona: String,
    completion: Arc<dyn CompletionService>,
    events: EventCache,
    classifier: IntentClassifier,
    filter: TemporalFilter,
    memory: ConversationMemory,
}

impl ResponseOrchestrator {
    pub fn new(
        persona: impl Into<String>,
        completion: Arc<dyn CompletionService>,
        events: EventCache,
        classifier: IntentClassifier,
        filter: TemporalFilter,
    ) -> Self {
        Self {
            persona: persona.into(),
            completion,
            events,
            classifier,
            filter,
            memory: ConversationMemory::new(),
        }
    }

    pub fn with_memory(mut self, memory: ConversationMemory) -> Self {
        self.memory = memory;
        self
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn event_cache(&self) -> &EventCache {
        &self.events
    }

    pub async fn respond(&mut self, user_input: &str, session_id: &str) -> Result<String, AssistantError> {
        self.respond_at(user_input, session_id, Utc::now()).await
    }

    /// Same as `respond`, evaluated as if the current time were `now`.
    ///
    /// On a completion failure nothing is appended to the session history.
    pub async fn respond_at(
        &mut self,
        user_input: &str,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<String, AssistantError> {
        let context = self.calendar_context(user_input, now).await;
        let system = compose_system_prompt(&self.persona, &context, user_input);
        let history = self.memory.get_or_create(session_id).clone();

        let request = CompletionRequest {
            system,
            history,
            user: user_input.to_string(),
        };

        let reply = self.completion.complete(&request).await.map_err(|e| {
            error!("Completion failed for session {}: {:#}", session_id, e);
            AssistantError::CompletionService(e)
        })?;

        self.memory.append(session_id, ConversationTurn::human(user_input));
        self.memory.append(session_id, ConversationTurn::assistant(reply.clone()));
        info!(
            "Session {} now holds {} turns",
            session_id,
            self.memory.history(session_id).map_or(0, |h| h.len())
        );

        Ok(reply)
    }

    /// Looks up calendar context, but only for inputs that mention scheduling.
    pub async fn calendar_context(&self, user_input: &str, now: DateTime<Utc>) -> CalendarContext {
        if !self.classifier.mentions_calendar(user_input) {
            return CalendarContext::NotRequested;
        }

        let year = now.with_timezone(&self.filter.timezone()).year();
        let intent = self.classifier.classify_in_year(user_input, year);
        debug!("Detected calendar intent {:?}", intent);

        let events = self.events.get_events().await;
        CalendarContext::from_filter_result(self.filter.filter(intent, &events, &now))
    }
}
