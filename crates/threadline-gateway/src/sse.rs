// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-Sent Events (SSE) streaming for conversation turns.
//!
//! When clients ask for a stream, the gateway forwards runner chunks as they
//! arrive.
//!
//! SSE event format:
//! ```text
//! event: text_delta
//! data: {"text": "partial content here"}
//!
//! event: message_stop
//! data: {"content": "full content", "conversation_id": "...", "finish_reason": "end_turn"}
//! ```
//!
//! A runner failure mid-stream ends the stream with an `error` event.

use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use serde_json::json;
use threadline_core::{ChunkStream, ConversationId};

struct Relay {
    inner: ChunkStream,
    conversation_id: ConversationId,
    text: String,
    finish_reason: Option<String>,
    done: bool,
}

/// Maps a chunk stream onto SSE events.
pub fn chunk_events(
    conversation_id: ConversationId,
    stream: ChunkStream,
) -> impl Stream<Item = Result<Event, Infallible>> + Send {
    let relay = Relay {
        inner: stream,
        conversation_id,
        text: String::new(),
        finish_reason: None,
        done: false,
    };
    futures::stream::unfold(relay, |mut st| async move {
        if st.done {
            return None;
        }
        let event = match st.inner.next().await {
            Some(Ok(chunk)) => {
                if chunk.finish_reason.is_some() {
                    st.finish_reason = chunk.finish_reason;
                }
                st.text.push_str(&chunk.content);
                Event::default()
                    .event("text_delta")
                    .data(json!({ "text": chunk.content }).to_string())
            }
            Some(Err(e)) => {
                st.done = true;
                tracing::warn!(conversation_id = %st.conversation_id, error = %e, "stream ended with error");
                Event::default()
                    .event("error")
                    .data(json!({ "error": e.to_string() }).to_string())
            }
            None => {
                st.done = true;
                Event::default().event("message_stop").data(
                    json!({
                        "content": st.text,
                        "conversation_id": st.conversation_id,
                        "finish_reason": st.finish_reason,
                    })
                    .to_string(),
                )
            }
        };
        Some((Ok(event), st))
    })
}

/// Wraps a chunk stream in an SSE response.
pub fn stream_reply(
    conversation_id: ConversationId,
    stream: ChunkStream,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send> {
    Sse::new(chunk_events(conversation_id, stream)).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use threadline_core::ThreadlineError;
    use threadline_core::types::StreamChunk;

    use super::*;

    fn chunks(items: Vec<Result<StreamChunk, ThreadlineError>>) -> ChunkStream {
        Box::pin(futures::stream::iter(items))
    }

    #[tokio::test]
    async fn emits_deltas_then_stop() {
        let stream = chunks(vec![
            Ok(StreamChunk::text("a")),
            Ok(StreamChunk::text("b")),
        ]);
        let events: Vec<_> = chunk_events(ConversationId::from("c1"), stream)
            .collect()
            .await;
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn error_terminates_stream() {
        let stream = chunks(vec![
            Ok(StreamChunk::text("a")),
            Err(ThreadlineError::execution("boom")),
            Ok(StreamChunk::text("never")),
        ]);
        let events: Vec<_> = chunk_events(ConversationId::from("c1"), stream)
            .collect()
            .await;
        // delta + error, no stop
        assert_eq!(events.len(), 2);
    }
}
