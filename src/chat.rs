use crate::codec::{Turn, decode_function_call, encode};
use crate::dispatch::dispatch;
use crate::error::ChatError;
use crate::gemini::GenerateContent;
use crate::gmail::{EmailRecord, MailSearch};

/// Everything one loop execution produced: the final answer, the full
/// turn log (input turns plus generated ones), and every email record
/// surfaced by tool calls along the way.
#[derive(Debug)]
pub struct ChatOutcome {
    pub answer: String,
    pub turns: Vec<Turn>,
    pub emails: Vec<EmailRecord>,
}

/// Drives the conversation until the model answers in plain text.
///
/// Each iteration encodes the transcript and sends it to the model. A
/// function-call response is dispatched and folded back into the
/// transcript as a functionCall/functionResponse turn pair; a text
/// response terminates the loop. `max_tool_calls` bounds the number of
/// round trips against a model that never stops calling the tool. A
/// failed model call aborts the whole request; a failed tool execution
/// does not (the model sees it as tool output and can recover).
pub async fn run_chat<M, G>(
    model: &M,
    gateway: &G,
    token: &str,
    mut turns: Vec<Turn>,
    max_tool_calls: usize,
) -> Result<ChatOutcome, ChatError>
where
    M: GenerateContent + Sync + ?Sized,
    G: MailSearch + Sync + ?Sized,
{
    let mut emails: Vec<EmailRecord> = Vec::new();
    let mut tool_calls = 0;

    loop {
        let contents = encode(&turns);
        let response = model.generate(&contents).await?;

        let Some(invocation) = decode_function_call(&response) else {
            let answer = response
                .parts
                .iter()
                .filter_map(|part| part.text.as_deref())
                .collect::<Vec<_>>()
                .join("");
            turns.push(Turn::Model(answer.clone()));
            return Ok(ChatOutcome {
                answer,
                turns,
                emails,
            });
        };

        // Refuse the call that would exceed the budget rather than
        // executing it
        if tool_calls == max_tool_calls {
            return Err(ChatError::LoopBudgetExceeded(max_tool_calls));
        }
        tool_calls += 1;

        tracing::debug!(
            "Tool call: {} args: {}",
            invocation.name,
            serde_json::Value::Object(invocation.args.clone())
        );
        let reply = dispatch(gateway, token, &invocation).await?;
        emails.extend(reply.emails);
        turns.push(Turn::FunctionCall {
            name: invocation.name.clone(),
            args: invocation.args,
        });
        turns.push(Turn::FunctionResponse {
            name: invocation.name,
            result: reply.text,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Error, Result, anyhow};
    use async_trait::async_trait;
    use serde_json::{Map, Value, json};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use crate::gemini::{Content, Part, Role};
    use crate::gmail::SearchOutcome;

    /// Replays a fixed sequence of model responses.
    struct ScriptedModel {
        responses: Mutex<VecDeque<Content>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<Content>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl GenerateContent for ScriptedModel {
        async fn generate(&self, _contents: &[Content]) -> Result<Content, ChatError> {
            self.responses
                .lock()
                .expect("Lock poisoned")
                .pop_front()
                .ok_or_else(|| ChatError::ModelInvocation(anyhow!("script exhausted")))
        }
    }

    struct StubGateway;

    #[async_trait]
    impl MailSearch for StubGateway {
        async fn search(
            &self,
            _token: &str,
            _query: &str,
            _limit: usize,
        ) -> Result<SearchOutcome, Error> {
            Ok(SearchOutcome {
                rendered: String::from(
                    "<From>alice@example.com</From>\n<Subject>Hi</Subject>\n<Date>Mon</Date>\n<Body>Hello</Body>",
                ),
                records: vec![EmailRecord {
                    message_id: String::from("m1"),
                    from_email: String::from("alice@example.com"),
                    subject: String::from("Hi"),
                    date: String::from("Mon"),
                }],
            })
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().expect("Expected a JSON object").clone()
    }

    fn function_call_response(name: &str, call_args: Value) -> Content {
        Content::new(Role::Model, vec![Part::function_call(name, args(call_args))])
    }

    fn text_response(text: &str) -> Content {
        Content::new(Role::Model, vec![Part::text(text)])
    }

    #[tokio::test]
    async fn it_runs_a_search_then_answers() {
        let model = ScriptedModel::new(vec![
            function_call_response(
                "search_emails",
                json!({ "search_operator": "from:alice@example.com" }),
            ),
            text_response("Found 1 email from Alice."),
        ]);

        let turns = vec![Turn::User(String::from("find emails from alice@example.com"))];
        let outcome = run_chat(&model, &StubGateway, "test-token", turns, 10)
            .await
            .expect("Chat failed");

        assert_eq!(outcome.answer, "Found 1 email from Alice.");
        assert_eq!(outcome.turns.len(), 4);
        assert!(matches!(outcome.turns[0], Turn::User(_)));
        assert!(matches!(outcome.turns[1], Turn::FunctionCall { .. }));
        assert!(matches!(outcome.turns[2], Turn::FunctionResponse { .. }));
        assert!(matches!(outcome.turns[3], Turn::Model(_)));
        assert_eq!(outcome.emails.len(), 1);
        assert_eq!(outcome.emails[0].message_id, "m1");
    }

    #[tokio::test]
    async fn it_feeds_tool_not_found_back_to_the_model() {
        let model = ScriptedModel::new(vec![
            function_call_response("delete_emails", json!({})),
            text_response("Sorry, I can't do that."),
        ]);

        let turns = vec![Turn::User(String::from("delete everything from bob"))];
        let outcome = run_chat(&model, &StubGateway, "test-token", turns, 10)
            .await
            .expect("Chat failed");

        let Turn::FunctionResponse { result, .. } = &outcome.turns[2] else {
            panic!("Expected a functionResponse turn");
        };
        assert_eq!(result, "Tool not found.");
        assert!(outcome.emails.is_empty());
    }

    #[tokio::test]
    async fn it_answers_directly_without_tool_calls() {
        let model = ScriptedModel::new(vec![text_response("Hello! How can I help?")]);

        let turns = vec![Turn::User(String::from("hi"))];
        let outcome = run_chat(&model, &StubGateway, "test-token", turns, 10)
            .await
            .expect("Chat failed");

        assert_eq!(outcome.answer, "Hello! How can I help?");
        assert_eq!(outcome.turns.len(), 2);
        assert!(outcome.emails.is_empty());
    }

    #[tokio::test]
    async fn it_stops_a_model_that_never_answers() {
        let responses = (0..5)
            .map(|_| {
                function_call_response("search_emails", json!({ "search_operator": "from:me" }))
            })
            .collect();
        let model = ScriptedModel::new(responses);

        let turns = vec![Turn::User(String::from("search forever"))];
        let result = run_chat(&model, &StubGateway, "test-token", turns, 3).await;

        assert!(matches!(result, Err(ChatError::LoopBudgetExceeded(3))));
    }

    #[tokio::test]
    async fn it_propagates_model_failures() {
        let model = ScriptedModel::new(vec![]);

        let turns = vec![Turn::User(String::from("hi"))];
        let result = run_chat(&model, &StubGateway, "test-token", turns, 10).await;

        assert!(matches!(result, Err(ChatError::ModelInvocation(_))));
    }

    #[tokio::test]
    async fn it_accumulates_emails_across_tool_calls() {
        let model = ScriptedModel::new(vec![
            function_call_response("search_emails", json!({ "search_operator": "from:alice" })),
            function_call_response("search_emails", json!({ "search_operator": "from:bob" })),
            text_response("Found 2 emails."),
        ]);

        let turns = vec![Turn::User(String::from("find emails from alice and bob"))];
        let outcome = run_chat(&model, &StubGateway, "test-token", turns, 10)
            .await
            .expect("Chat failed");

        assert_eq!(outcome.turns.len(), 6);
        assert_eq!(outcome.emails.len(), 2);
    }
}
