//! Agent state and the updates nodes produce

use crate::models::openai::OpenAIMessage;

/// Conversation of one thread plus the loop counter of the current run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentState {
    /// Append-only message history
    pub messages: Vec<OpenAIMessage>,
    /// LLM node executions in the current invocation
    pub loop_count: u32,
}

/// What a node returns: messages to append and an optional new counter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub messages: Vec<OpenAIMessage>,
    pub loop_count: Option<u32>,
}

impl AgentState {
    #[cfg(test)]
    pub fn new(messages: Vec<OpenAIMessage>) -> Self {
        Self {
            messages,
            loop_count: 0,
        }
    }

    /// Merge a node update: messages append, the counter is replaced
    pub fn apply(&mut self, update: StateUpdate) {
        self.messages.extend(update.messages);
        if let Some(count) = update.loop_count {
            self.loop_count = count;
        }
    }

    pub fn last_message(&self) -> Option<&OpenAIMessage> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_appends_and_replaces_counter() {
        let mut state = AgentState::new(vec![OpenAIMessage::user("hi")]);
        state.apply(StateUpdate {
            messages: vec![OpenAIMessage::assistant("hello")],
            loop_count: Some(1),
        });
        state.apply(StateUpdate::default());

        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.loop_count, 1);
        assert_eq!(state.last_message().unwrap().text(), "hello");
    }
}
