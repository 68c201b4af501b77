//! The identity policy: every hook keeps its default body. Useful as a
//! baseline for exercising the orchestrator/assembler plumbing without any
//! policy-specific behavior in the way.

use crate::api::Api;
use crate::policy::Policy;

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPolicy;

impl<A: Api> Policy<A> for NoopPolicy {}
