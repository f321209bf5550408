//! Maps model tool requests onto the mail search gateway

use serde_json::{Map, Value};

use crate::codec::ToolInvocation;
use crate::error::ChatError;
use crate::gmail::{EmailRecord, MailSearch};

pub const SEARCH_EMAILS_TOOL: &str = "search_emails";

const MIN_SEARCH_RESULTS: i64 = 3;
const MAX_SEARCH_RESULTS: i64 = 25;
const DEFAULT_SEARCH_RESULTS: i64 = 10;

/// What a tool invocation produced: text fed back to the model and the
/// records accumulated for the caller.
#[derive(Debug)]
pub struct ToolReply {
    pub text: String,
    pub emails: Vec<EmailRecord>,
}

impl ToolReply {
    fn text_only(text: &str) -> Self {
        Self {
            text: text.to_string(),
            emails: Vec::new(),
        }
    }
}

/// Coerce the model-supplied result count: absent defaults, out of
/// range clamps, non-numeric fails the request rather than masking the
/// model's mistake.
fn result_count(args: &Map<String, Value>) -> Result<i64, ChatError> {
    let count = match args.get("num_search_results") {
        None | Some(Value::Null) => DEFAULT_SEARCH_RESULTS,
        Some(Value::Number(n)) => match n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)) {
            Some(count) => count,
            None => {
                return Err(ChatError::InvalidArgument {
                    argument: "num_search_results",
                    value: n.to_string(),
                });
            }
        },
        Some(Value::String(s)) => s.parse::<i64>().map_err(|_| ChatError::InvalidArgument {
            argument: "num_search_results",
            value: s.clone(),
        })?,
        Some(other) => {
            return Err(ChatError::InvalidArgument {
                argument: "num_search_results",
                value: other.to_string(),
            });
        }
    };
    Ok(count.clamp(MIN_SEARCH_RESULTS, MAX_SEARCH_RESULTS))
}

/// Execute a tool invocation against the registered tool set.
///
/// An unknown tool name and a missing required argument are not error
/// paths: the fallback text is fed back to the model as the tool result
/// so it can recover. The same goes for gateway failures.
pub async fn dispatch<G>(
    gateway: &G,
    token: &str,
    invocation: &ToolInvocation,
) -> Result<ToolReply, ChatError>
where
    G: MailSearch + Sync + ?Sized,
{
    if invocation.name != SEARCH_EMAILS_TOOL {
        tracing::warn!("Model requested an unregistered tool: {}", invocation.name);
        return Ok(ToolReply::text_only("Tool not found."));
    }

    let Some(operator) = invocation.args.get("search_operator").and_then(Value::as_str) else {
        return Ok(ToolReply::text_only("Please provide a search operator."));
    };
    let limit = result_count(&invocation.args)?;

    match gateway.search(token, operator, limit as usize).await {
        Ok(outcome) => Ok(ToolReply {
            text: outcome.rendered,
            emails: outcome.records,
        }),
        Err(e) => {
            tracing::error!("Email search failed: {}", e);
            Ok(ToolReply::text_only(&format!(
                "An error occurred: {}. If the query is incorrect, try again by correcting the query.",
                e
            )))
        }
    }
}
