//! Upper-cases every text response, streaming or not — the simplest
//! non-trivial `SimplePolicy`, useful for confirming the passthrough/replace
//! split in [`crate::policy::SimplePolicyAdapter`] behaves as expected.

use crate::api::Api;
use crate::assembler::ToolCallStreamBlock;
use crate::error::Result;
use crate::policy::{Policy, SimplePolicy, SimplePolicyAdapter};
use crate::transaction::TransactionContext;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, Default)]
pub struct UppercasePolicyImpl;

#[async_trait]
impl<A: Api> SimplePolicy<A> for UppercasePolicyImpl {
    async fn on_response_content(&self, text: String, _ctx: &TransactionContext) -> Result<String> {
        Ok(text.to_uppercase())
    }

    async fn on_response_tool_call(
        &self,
        call: ToolCallStreamBlock,
        _ctx: &TransactionContext,
    ) -> Result<ToolCallStreamBlock> {
        Ok(call)
    }
}

/// `SimplePolicyAdapter<A, UppercasePolicyImpl>` under a shorter, stable
/// name — the shape an integrator actually imports and hands to
/// [`crate::orchestrator::PolicyOrchestrator`].
pub type UppercasePolicy<A> = SimplePolicyAdapter<A, UppercasePolicyImpl>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::OpenAiApi;
    use crate::sinks::SinkRouter;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_uppercases_response_content() {
        let policy = UppercasePolicyImpl;
        let router = Arc::new(SinkRouter::builder().build());
        let ctx = TransactionContext::new(router);
        let out = <UppercasePolicyImpl as SimplePolicy<OpenAiApi>>::on_response_content(
            &policy,
            "hello".into(),
            &ctx,
        )
        .await
        .unwrap();
        assert_eq!(out, "HELLO");
    }
}
