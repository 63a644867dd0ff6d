// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decoding of the Messages API event stream.
//!
//! Framing is handled by `eventsource-stream`; each frame's `data` carries
//! its own `type` tag, which selects the [`StreamEvent`] variant.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use threadline_core::ThreadlineError;

use crate::types::{ApiErrorDetail, ApiUsage, BlockDelta, ResponseContentBlock};

/// One decoded stream event.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart,
    ContentBlockStart {
        index: usize,
        content_block: ResponseContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: Option<ApiUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: ApiErrorDetail,
    },
    /// Event types added after this client was written.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageDeltaBody {
    pub stop_reason: Option<String>,
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ThreadlineError>> + Send>>;

/// Decodes one frame. Unknown event types yield `None`.
pub fn parse_event(event: &str, data: &str) -> Option<Result<StreamEvent, ThreadlineError>> {
    match serde_json::from_str::<StreamEvent>(data) {
        Ok(StreamEvent::Unknown) => None,
        Ok(parsed) => Some(Ok(parsed)),
        Err(e) => Some(Err(ThreadlineError::Execution {
            message: format!("failed to parse {event} event: {e}"),
            source: Some(Box::new(e)),
        })),
    }
}

/// Turns a streaming HTTP response into decoded events.
pub fn parse_sse_stream(response: reqwest::Response) -> EventStream {
    let events = response
        .bytes_stream()
        .eventsource()
        .filter_map(|frame| async move {
            match frame {
                Ok(frame) => parse_event(&frame.event, &frame.data),
                Err(e) => Some(Err(ThreadlineError::execution(format!(
                    "event stream broke: {e}"
                )))),
            }
        });
    Box::pin(events)
}
