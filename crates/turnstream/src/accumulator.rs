//! Per-round reassembly of fragmented tool calls.
//!
//! Upstreams stream a tool call as many small [`ToolCallDelta`]s that share
//! an index. A [`ToolCallAccumulator`] concatenates the fragments in arrival
//! order and, once the round is over, [`finish`](ToolCallAccumulator::finish)
//! consumes it and splits the entries into well-formed calls and abandoned
//! ones. Arguments are only parsed at that point; a partial argument string
//! is never looked at.
//!
//! A fresh accumulator is built for every round, so indices from one round
//! can never leak into the next.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::chat::ToolCall;
use crate::delta::ToolCallDelta;

#[derive(Debug, Default)]
struct Entry {
    id: String,
    name: String,
    arguments: String,
}

/// Reassembles one round's tool calls, keyed by index.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    entries: BTreeMap<u32, Entry>,
}

impl ToolCallAccumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one delta's fragments to the entry at its index.
    pub fn apply(&mut self, delta: &ToolCallDelta) {
        let entry = self.entries.entry(delta.index).or_default();
        if let Some(id) = &delta.id {
            entry.id.push_str(id);
        }
        if let Some(name) = &delta.name {
            entry.name.push_str(name);
        }
        if let Some(arguments) = &delta.arguments {
            entry.arguments.push_str(arguments);
        }
    }

    /// Whether no tool-call delta arrived this round.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct indices seen.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Ends the round: parses every entry and sorts it into `calls` or
    /// `malformed`, both in ascending index order.
    pub fn finish(self) -> RoundToolCalls {
        let mut round = RoundToolCalls::default();
        for (index, entry) in self.entries {
            match validate(index, entry) {
                Ok(call) => round.calls.push(call),
                Err(malformed) => round.malformed.push(malformed),
            }
        }
        round
    }
}

fn validate(index: u32, entry: Entry) -> Result<CompletedToolCall, MalformedToolCall> {
    let id = if entry.id.is_empty() {
        format!("call_{index}")
    } else {
        entry.id
    };
    let name = entry.name.trim();

    let reason = if name.is_empty() {
        Some(MalformedReason::MissingName)
    } else if entry.arguments.trim().is_empty() {
        Some(MalformedReason::EmptyArguments)
    } else {
        None
    };
    if let Some(reason) = reason {
        return Err(MalformedToolCall {
            index,
            id,
            name: (!name.is_empty()).then(|| name.to_owned()),
            reason,
        });
    }

    match serde_json::from_str::<Value>(&entry.arguments) {
        Ok(arguments) => Ok(CompletedToolCall {
            index,
            call: ToolCall {
                id,
                name: name.to_owned(),
                arguments,
            },
        }),
        Err(e) => Err(MalformedToolCall {
            index,
            id,
            name: Some(name.to_owned()),
            reason: MalformedReason::InvalidArguments(e.to_string()),
        }),
    }
}

/// The outcome of one round's tool calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundToolCalls {
    /// Calls ready to execute, by ascending index.
    pub calls: Vec<CompletedToolCall>,
    /// Calls that were abandoned, by ascending index.
    pub malformed: Vec<MalformedToolCall>,
}

/// A well-formed call together with its index in the round.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedToolCall {
    /// Index the fragments were keyed by.
    pub index: u32,
    /// The reassembled call.
    pub call: ToolCall,
}

/// A call that could not be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedToolCall {
    /// Index the fragments were keyed by.
    pub index: u32,
    /// The call id, or a synthesized `call_<index>` if none arrived.
    pub id: String,
    /// The tool name, if one arrived.
    pub name: Option<String>,
    /// What was wrong with it.
    pub reason: MalformedReason,
}

/// Why a call was abandoned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedReason {
    /// No name fragment, or only whitespace.
    #[error("tool call has no name")]
    MissingName,
    /// A name arrived but no arguments did.
    #[error("tool call has empty arguments")]
    EmptyArguments,
    /// The concatenated arguments are not valid JSON.
    #[error("tool call arguments are not valid JSON: {0}")]
    InvalidArguments(String),
}
