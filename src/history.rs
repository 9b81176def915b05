//! Conversation history: backend records and their pairing into turns.

use crate::error::{HugError, Result};
use serde::{Deserialize, Serialize};

/// Message shown when the history endpoint returns something other than an array.
pub const HISTORY_FORMAT_HINT: &str =
    "Backend should return an array like [{role:'child'|'grandpa', message:'...'}]";

/// One record as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HistoryRecord {
    pub role: String,
    pub message: String,
}

impl HistoryRecord {
    pub fn new(role: &str, message: &str) -> Self {
        Self {
            role: role.to_string(),
            message: message.to_string(),
        }
    }
}

/// A child's utterance and Grandpa's reply, if one followed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub child: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grandpa: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Child,
    Grandpa,
    Other,
}

impl Role {
    fn parse(role: &str) -> Self {
        match role.to_lowercase().as_str() {
            "child" => Role::Child,
            "grandpa" => Role::Grandpa,
            _ => Role::Other,
        }
    }
}

/// Decode the history endpoint's JSON body.
///
/// # Errors
/// `MalformedResponse` when the body is not a JSON array. Elements that are
/// not objects, or lack fields, become records with empty strings.
pub fn parse_history(value: serde_json::Value) -> Result<Vec<HistoryRecord>> {
    let serde_json::Value::Array(items) = value else {
        return Err(HugError::MalformedResponse {
            message: HISTORY_FORMAT_HINT.to_string(),
        });
    };

    Ok(items
        .into_iter()
        .map(|item| {
            let field = |name: &str| {
                item.get(name)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            HistoryRecord {
                role: field("role"),
                message: field("message"),
            }
        })
        .collect())
}

/// Fold flat records into child/grandpa turns.
///
/// A `child` record opens a turn; a `grandpa` record answers the latest turn,
/// opening an empty-child turn when there is none. Records with an empty
/// message or an unknown role are skipped, and turns with nothing but
/// whitespace on both sides are dropped.
pub fn pair_conversation(records: &[HistoryRecord]) -> Vec<Turn> {
    let mut turns: Vec<Turn> = Vec::new();

    for record in records {
        if record.message.is_empty() {
            continue;
        }
        match Role::parse(&record.role) {
            Role::Child => turns.push(Turn {
                child: record.message.clone(),
                grandpa: None,
            }),
            Role::Grandpa => {
                if turns.is_empty() {
                    turns.push(Turn {
                        child: String::new(),
                        grandpa: None,
                    });
                }
                if let Some(last) = turns.last_mut() {
                    last.grandpa = Some(record.message.clone());
                }
            }
            Role::Other => {}
        }
    }

    turns
        .into_iter()
        .filter(|turn| {
            !turn.child.trim().is_empty()
                || turn
                    .grandpa
                    .as_deref()
                    .is_some_and(|reply| !reply.trim().is_empty())
        })
        .collect()
}
