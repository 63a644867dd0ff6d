// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability-gated access to optional channel facets.
//!
//! Callers outside this module never touch a facet accessor directly: an
//! adapter that implements a facet but advertises the flag as `false` is
//! treated as not having it.

use threadline_core::{
    ChannelAdapter, InteractiveDelivery, ReactionDelivery, RichDelivery, StreamingDelivery,
};

pub fn channel_streaming(adapter: &dyn ChannelAdapter) -> Option<&dyn StreamingDelivery> {
    if adapter.capabilities().supports_streaming {
        adapter.streaming()
    } else {
        None
    }
}

pub fn channel_rich(adapter: &dyn ChannelAdapter) -> Option<&dyn RichDelivery> {
    if adapter.capabilities().supports_rich_formatting {
        adapter.rich()
    } else {
        None
    }
}

pub fn channel_interactive(adapter: &dyn ChannelAdapter) -> Option<&dyn InteractiveDelivery> {
    if adapter.capabilities().supports_interactive_elements {
        adapter.interactive()
    } else {
        None
    }
}

pub fn channel_reactions(adapter: &dyn ChannelAdapter) -> Option<&dyn ReactionDelivery> {
    if adapter.capabilities().supports_reactions {
        adapter.reactions()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use threadline_core::{ChannelCapabilities, MessageStyle};
    use threadline_test_utils::MockChannel;

    use super::*;

    fn capabilities() -> impl Strategy<Value = ChannelCapabilities> {
        (
            any::<[bool; 7]>(),
            prop_oneof![
                Just(MessageStyle::Conversational),
                Just(MessageStyle::Comprehensive)
            ],
            proptest::option::of(1usize..10_000),
        )
            .prop_map(|(flags, message_style, max_message_length)| ChannelCapabilities {
                supports_streaming: flags[0],
                supports_threading: flags[1],
                supports_rich_formatting: flags[2],
                supports_interactive_elements: flags[3],
                supports_reactions: flags[4],
                supports_editing: flags[5],
                supports_attachments: flags[6],
                message_style,
                max_message_length,
            })
    }

    proptest! {
        #[test]
        fn facet_reachable_only_when_advertised(caps in capabilities()) {
            // The mock implements every facet, so the flag alone decides.
            let channel = MockChannel::with_capabilities("sampled", caps);
            prop_assert_eq!(channel_streaming(&channel).is_some(), caps.supports_streaming);
            prop_assert_eq!(channel_rich(&channel).is_some(), caps.supports_rich_formatting);
            prop_assert_eq!(
                channel_interactive(&channel).is_some(),
                caps.supports_interactive_elements
            );
            prop_assert_eq!(channel_reactions(&channel).is_some(), caps.supports_reactions);
        }
    }

    #[test]
    fn advertised_flag_without_facet_is_still_none() {
        struct BareChannel;

        #[async_trait::async_trait]
        impl threadline_core::PluginAdapter for BareChannel {
            fn name(&self) -> &str {
                "bare"
            }
            fn version(&self) -> semver::Version {
                semver::Version::new(0, 1, 0)
            }
            fn adapter_type(&self) -> threadline_core::AdapterType {
                threadline_core::AdapterType::Channel
            }
            async fn health_check(
                &self,
            ) -> Result<threadline_core::HealthStatus, threadline_core::ThreadlineError> {
                Ok(threadline_core::HealthStatus::Healthy)
            }
            async fn shutdown(&self) -> Result<(), threadline_core::ThreadlineError> {
                Ok(())
            }
        }

        #[async_trait::async_trait]
        impl ChannelAdapter for BareChannel {
            fn capabilities(&self) -> ChannelCapabilities {
                ChannelCapabilities {
                    supports_streaming: true,
                    supports_reactions: true,
                    ..ChannelCapabilities::minimal()
                }
            }
            fn receive_message(
                &self,
                _request: &threadline_core::types::RawRequest,
            ) -> Result<threadline_core::types::ReceivedMessage, threadline_core::ThreadlineError>
            {
                Err(threadline_core::ThreadlineError::Validation("unused".into()))
            }
            fn verify_request(&self, _request: &threadline_core::types::RawRequest) -> bool {
                false
            }
            async fn send_message(
                &self,
                _text: &str,
                _conversation_id: &threadline_core::ConversationId,
                _thread_id: Option<&str>,
                _metadata: Option<&serde_json::Value>,
            ) -> Result<String, threadline_core::ThreadlineError> {
                Ok("1".into())
            }
        }

        assert!(channel_streaming(&BareChannel).is_none());
        assert!(channel_reactions(&BareChannel).is_none());
    }
}
