use std::env;

use clap::Parser;

use mailpilot::config::AppConfig;
use mailpilot::server;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Run the server
    #[arg(short, long, action)]
    serve: bool,

    /// Set the server host address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Set the server port
    #[arg(long, default_value = "1234")]
    port: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if args.serve {
        let config = AppConfig {
            gemini_api_hostname: env::var("MAILPILOT_GEMINI_API_HOSTNAME")
                .unwrap_or_else(|_| String::from("https://generativelanguage.googleapis.com")),
            gemini_api_key: env::var("GEMINI_API_KEY").expect("Missing env var GEMINI_API_KEY"),
            gemini_model: env::var("MAILPILOT_GEMINI_MODEL")
                .unwrap_or_else(|_| String::from("gemini-1.5-flash")),
            gmail_api_hostname: env::var("MAILPILOT_GMAIL_API_HOSTNAME")
                .unwrap_or_else(|_| String::from("https://gmail.googleapis.com")),
            max_tool_calls: env::var("MAILPILOT_MAX_TOOL_CALLS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            request_deadline_secs: env::var("MAILPILOT_REQUEST_DEADLINE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
        };
        server::serve(args.host, args.port, config).await;
    }
}
