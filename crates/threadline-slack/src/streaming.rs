// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Accumulation buffers for edit-in-place streaming.
//!
//! `chat.update` replaces the whole message text, so every chunk is appended
//! to a per-message buffer and the full buffer is pushed. A buffer is opened
//! with the text of the initial post, keyed by its `ts`, and dropped when the
//! stream finishes or is abandoned.

use dashmap::DashMap;

#[derive(Debug, Clone)]
struct StreamBuffer {
    channel: String,
    text: String,
}

#[derive(Debug, Default)]
pub struct StreamBuffers {
    buffers: DashMap<String, StreamBuffer>,
}

impl StreamBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a buffer for a message already posted with `text`. Reopening
    /// an id replaces its buffer.
    pub fn begin(&self, message_id: &str, channel: &str, text: &str) {
        self.buffers.insert(
            message_id.to_string(),
            StreamBuffer {
                channel: channel.to_string(),
                text: text.to_string(),
            },
        );
    }

    /// Appends `chunk` and returns the channel and the full text to push, or
    /// `None` when no stream is open for `message_id`.
    pub fn append(&self, message_id: &str, chunk: &str) -> Option<(String, String)> {
        let mut buffer = self.buffers.get_mut(message_id)?;
        buffer.text.push_str(chunk);
        Some((buffer.channel.clone(), buffer.text.clone()))
    }

    /// Drops the buffer, returning the accumulated text.
    pub fn finish(&self, message_id: &str) -> Option<String> {
        self.buffers.remove(message_id).map(|(_, b)| b.text)
    }

    pub fn in_flight(&self) -> usize {
        self.buffers.len()
    }
}
