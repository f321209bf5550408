//! Conversion between caller-supplied conversation turns and the
//! model-native content representation

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::ChatError;
use crate::gemini::{Content, Part, Role};

/// Wire format of one conversation step, as the caller sends and
/// receives it. `content` is free text for `user`/`model` roles and a
/// structured payload for `functionCall`/`functionResponse` roles.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct TurnRecord {
    pub role: String,
    pub content: Value,
}

/// One role-tagged step in a conversation. Immutable once created; the
/// chat loop only ever appends new turns.
#[derive(Clone, Debug, PartialEq)]
pub enum Turn {
    User(String),
    Model(String),
    FunctionCall {
        name: String,
        args: Map<String, Value>,
    },
    FunctionResponse {
        name: String,
        result: String,
    },
}

impl TryFrom<&TurnRecord> for Turn {
    type Error = ChatError;

    fn try_from(record: &TurnRecord) -> Result<Self, ChatError> {
        let text = |content: &Value, role: &str| {
            content
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| ChatError::MalformedTurn(format!("`{}` turn content must be text", role)))
        };
        let name = |content: &Value, role: &str| {
            content
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ChatError::MalformedTurn(format!("`{}` turn missing `name`", role)))
        };

        match record.role.as_str() {
            "user" => Ok(Turn::User(text(&record.content, "user")?)),
            "model" => Ok(Turn::Model(text(&record.content, "model")?)),
            "functionCall" => Ok(Turn::FunctionCall {
                name: name(&record.content, "functionCall")?,
                args: record
                    .content
                    .get("args")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
            }),
            "functionResponse" => Ok(Turn::FunctionResponse {
                name: name(&record.content, "functionResponse")?,
                result: record
                    .content
                    .get("result")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            other => Err(ChatError::MalformedTurn(format!(
                "unrecognized role `{}`",
                other
            ))),
        }
    }
}

impl From<&Turn> for TurnRecord {
    fn from(turn: &Turn) -> Self {
        match turn {
            Turn::User(text) => TurnRecord {
                role: String::from("user"),
                content: Value::String(text.clone()),
            },
            Turn::Model(text) => TurnRecord {
                role: String::from("model"),
                content: Value::String(text.clone()),
            },
            Turn::FunctionCall { name, args } => TurnRecord {
                role: String::from("functionCall"),
                content: json!({ "name": name, "args": args }),
            },
            Turn::FunctionResponse { name, result } => TurnRecord {
                role: String::from("functionResponse"),
                content: json!({ "name": name, "result": result }),
            },
        }
    }
}

/// Parse caller records into turns, rejecting anything with an
/// unrecognized role rather than silently dropping it.
pub fn parse_turns(records: &[TurnRecord]) -> Result<Vec<Turn>, ChatError> {
    records.iter().map(Turn::try_from).collect()
}

/// Encode a turn list into model-native content blocks.
///
/// User and model text each get their own block. Function calls and
/// function responses coalesce into the trailing block when it already
/// has the matching role (model for calls, user for responses), which
/// mirrors how the model API groups consecutive same-role actions into
/// one turn.
pub fn encode(turns: &[Turn]) -> Vec<Content> {
    let mut contents: Vec<Content> = Vec::new();
    for turn in turns {
        match turn {
            Turn::User(text) => contents.push(Content::new(Role::User, vec![Part::text(text)])),
            Turn::Model(text) => contents.push(Content::new(Role::Model, vec![Part::text(text)])),
            Turn::FunctionCall { name, args } => {
                let part = Part::function_call(name, args.clone());
                match contents.last_mut() {
                    Some(block) if block.role == Role::Model => block.parts.push(part),
                    _ => contents.push(Content::new(Role::Model, vec![part])),
                }
            }
            Turn::FunctionResponse { name, result } => {
                let part = Part::function_response(name, result);
                match contents.last_mut() {
                    Some(block) if block.role == Role::User => block.parts.push(part),
                    _ => contents.push(Content::new(Role::User, vec![part])),
                }
            }
        }
    }
    contents
}

/// Map content blocks back into turns, splitting coalesced blocks into
/// one turn per part.
pub fn decode(contents: &[Content]) -> Vec<Turn> {
    let mut turns = Vec::new();
    for block in contents {
        for part in &block.parts {
            if let Some(text) = &part.text {
                turns.push(match block.role {
                    Role::User => Turn::User(text.clone()),
                    Role::Model => Turn::Model(text.clone()),
                });
            } else if let Some(call) = &part.function_call {
                turns.push(Turn::FunctionCall {
                    name: call.name.clone(),
                    args: call.args.clone(),
                });
            } else if let Some(resp) = &part.function_response {
                let result = resp
                    .response
                    .get("result")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                turns.push(Turn::FunctionResponse {
                    name: resp.name.clone(),
                    result,
                });
            }
        }
    }
    turns
}

/// A tool request pulled out of model output. Lives only for the loop
/// iteration that created it.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub args: Map<String, Value>,
}

/// Returns the first function-call part of a content block, if any.
pub fn decode_function_call(content: &Content) -> Option<ToolInvocation> {
    content.parts.iter().find_map(|part| {
        part.function_call.as_ref().map(|call| ToolInvocation {
            name: call.name.clone(),
            args: call.args.clone(),
        })
    })
}
