//! State owned by a single upstream round.

use crate::accumulator::ToolCallAccumulator;
use crate::delta::{Delta, FinishReason};
use crate::event::ClientEvent;

/// Built at round start, consumed at round end.
#[derive(Debug, Default)]
pub(crate) struct Round {
    /// Content streamed during the round.
    pub(crate) text: String,
    pub(crate) accumulator: ToolCallAccumulator,
    pub(crate) finish: Option<FinishReason>,
}

impl Round {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Folds one delta into the round and returns the event to forward.
    pub(crate) fn observe(&mut self, delta: Delta) -> Option<ClientEvent> {
        match delta {
            Delta::Content(text) => {
                self.text.push_str(&text);
                Some(ClientEvent::Content { text })
            }
            Delta::Reasoning(text) => Some(ClientEvent::Reasoning { text }),
            Delta::ToolCall(fragment) => {
                self.accumulator.apply(&fragment);
                Some(ClientEvent::ToolCallProgress {
                    index: fragment.index,
                    id: fragment.id,
                    name: fragment.name,
                    arguments: fragment.arguments,
                })
            }
            Delta::Finish { reason } => {
                self.finish = Some(reason);
                None
            }
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finish.is_some()
    }
}
