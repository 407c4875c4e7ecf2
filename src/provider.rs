//! The opaque provider boundary the call wrapper dispatches through.
//!
//! Generalizes the teacher's `LlmProvider` trait down to the minimal shape
//! spec.md needs: one method for a non-streaming call, one that returns a
//! stream of chunks. Provider SDK internals stay outside this crate.

use crate::error::GatewayResult;
use crate::messages::UnifiedMessage;
use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// Token usage as reported by a provider response, when present.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportedUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
    pub reasoning_tokens: Option<u32>,
}

/// Result of a non-streaming provider call.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: String,
    pub usage: Option<ReportedUsage>,
}

/// One chunk of a streamed provider response (§4.8 step 4, streaming branch).
///
/// Chunks are never reordered; ordering within a single call's stream is
/// the caller's responsibility to preserve, since it comes straight from the
/// provider's own wire order.
#[derive(Debug, Clone, Default)]
pub struct ProviderChunk {
    pub delta_text: Option<String>,
    pub delta_tokens: Option<u32>,
    pub delta_reasoning_tokens: Option<u32>,
}

/// Embedding vector plus optional usage, returned by [`EmbedCallable`].
#[derive(Debug, Clone)]
pub struct EmbeddingResponse {
    pub vector: Vec<f32>,
    pub usage: Option<ReportedUsage>,
}

/// Opaque provider SDK boundary for text/chat calls (spec.md §1, §6).
#[async_trait]
pub trait ProviderCallable: Send + Sync {
    /// Non-streaming call: returns the full response in one shot.
    async fn call(&self, messages: &[UnifiedMessage]) -> GatewayResult<ProviderResponse>;

    /// Streaming call: returns a sequence of chunks, consumed in order.
    async fn call_stream(
        &self,
        messages: &[UnifiedMessage],
    ) -> GatewayResult<BoxStream<'static, GatewayResult<ProviderChunk>>>;
}

/// Opaque provider SDK boundary for embedding calls.
#[async_trait]
pub trait EmbedCallable: Send + Sync {
    async fn embed(&self, text: &str) -> GatewayResult<EmbeddingResponse>;
}
