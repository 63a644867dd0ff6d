// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel adapter trait and its optional capability facets.
//!
//! Every channel implements [`ChannelAdapter`]. Streaming updates, rich
//! content, interactive elements, and reactions are separate facet traits.
//! An adapter exposes a facet through the matching accessor and advertises it
//! in [`ChannelCapabilities`]; callers must check the descriptor flag before
//! reaching for the accessor.

use async_trait::async_trait;

use crate::capability::ChannelCapabilities;
use crate::error::ThreadlineError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    ConversationId, InteractionResponse, InteractiveMessage, RawRequest, ReceivedMessage,
    RichMessage,
};

/// Adapter for an external messaging surface (chat platform, email).
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// Returns the capabilities supported by this channel.
    fn capabilities(&self) -> ChannelCapabilities;

    /// Normalizes a verified inbound event.
    ///
    /// Fails with [`ThreadlineError::Parse`] when the event shape is not one
    /// this channel understands.
    fn receive_message(&self, request: &RawRequest) -> Result<ReceivedMessage, ThreadlineError>;

    /// Checks the request signature and freshness.
    ///
    /// Returns `false` on any malformed input instead of erroring.
    fn verify_request(&self, request: &RawRequest) -> bool;

    /// Sends a complete message and returns the adapter-native message id.
    async fn send_message(
        &self,
        text: &str,
        conversation_id: &ConversationId,
        thread_id: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<String, ThreadlineError>;

    /// Streaming-update facet, if implemented.
    fn streaming(&self) -> Option<&dyn StreamingDelivery> {
        None
    }

    /// Rich-content facet, if implemented.
    fn rich(&self) -> Option<&dyn RichDelivery> {
        None
    }

    /// Interactive-element facet, if implemented.
    fn interactive(&self) -> Option<&dyn InteractiveDelivery> {
        None
    }

    /// Reaction facet, if implemented.
    fn reactions(&self) -> Option<&dyn ReactionDelivery> {
        None
    }
}

/// Incremental delivery of a streamed reply.
#[async_trait]
pub trait StreamingDelivery: Send + Sync {
    /// Opens a stream on the already-sent message `message_id`, whose body
    /// is `initial_text`.
    async fn begin_stream(
        &self,
        message_id: &str,
        initial_text: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<(), ThreadlineError>;

    /// Appends `chunk` to a stream opened with [`Self::begin_stream`].
    async fn stream_message_chunk(
        &self,
        chunk: &str,
        message_id: &str,
        conversation_id: &ConversationId,
        metadata: Option<&serde_json::Value>,
    ) -> Result<(), ThreadlineError>;

    /// Releases any accumulation state held for `message_id`. Called once
    /// per opened stream, whether it ended cleanly or not.
    async fn finish_stream(&self, _message_id: &str) -> Result<(), ThreadlineError> {
        Ok(())
    }
}

/// Delivery of structured content with a plain-text fallback.
#[async_trait]
pub trait RichDelivery: Send + Sync {
    async fn send_rich_message(
        &self,
        message: &RichMessage,
        conversation_id: &ConversationId,
        thread_id: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<String, ThreadlineError>;
}

/// Delivery of interactive elements and handling of the resulting callbacks.
#[async_trait]
pub trait InteractiveDelivery: Send + Sync {
    async fn send_interactive_message(
        &self,
        message: &InteractiveMessage,
        conversation_id: &ConversationId,
        thread_id: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<String, ThreadlineError>;

    /// Extracts the conversation, action, value, and acting user from a callback.
    fn handle_interaction(
        &self,
        request: &RawRequest,
    ) -> Result<InteractionResponse, ThreadlineError>;
}

/// Adding and removing emoji-style reactions on sent messages.
#[async_trait]
pub trait ReactionDelivery: Send + Sync {
    async fn add_reaction(
        &self,
        message_id: &str,
        reaction: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<(), ThreadlineError>;

    async fn remove_reaction(
        &self,
        message_id: &str,
        reaction: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<(), ThreadlineError>;
}
