//! Stream a messages response and print text as it arrives.
//!
//! Run with: ANTHROPIC_API_KEY=sk-... cargo run --example stream_messages

use anthropic_stream::stream::Delta;
use anthropic_stream::*;
use std::io::Write;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let api_key = std::env::var("ANTHROPIC_API_KEY").expect("Set ANTHROPIC_API_KEY");
    let client = Client::new(ClientConfig::new(api_key));

    let request = MessagesRequest {
        model: "claude-3-5-sonnet-20240620".into(),
        messages: vec![Message::user("What is Rust's ownership model in 2 sentences?")],
        max_tokens: 512,
        ..Default::default()
    };

    // Ctrl-C cancels the stream between frames.
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let result = client
        .create_messages_stream(
            MessagesStreamRequest::new(request)
                .on_content_block_delta(|event| {
                    if let Delta::TextDelta { text } = &event.delta {
                        print!("{}", text);
                        let _ = std::io::stdout().flush();
                    }
                })
                .on_error(|e| eprintln!("\nserver error: {}", e.error)),
            cancel,
        )
        .await;

    match result {
        Ok(message) => println!(
            "\n\n--- Done ({:?}, {} output tokens) ---",
            message.stop_reason, message.usage.output_tokens
        ),
        Err(StreamError::Cancelled) => println!("\n\n--- Cancelled ---"),
        Err(e) if e.is_retryable() => eprintln!("\n\nTransient failure, try again: {}", e),
        Err(e) => eprintln!("\n\nStream failed: {}", e),
    }
}
