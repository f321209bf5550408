/// Process-wide configuration. Built once at startup and read-only
/// afterwards, so it can be shared across requests without locking.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub gemini_api_hostname: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gmail_api_hostname: String,
    /// Upper bound on tool-call round trips within one request
    pub max_tool_calls: usize,
    /// Deadline for the whole request, spanning every model and tool call
    pub request_deadline_secs: u64,
}
