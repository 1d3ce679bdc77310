//! Work planner port - splits a locked intent into partitions.

use async_trait::async_trait;

use crate::domain::errors::BuildResult;
use crate::domain::models::{BuildRequest, ImplementationPlan, IntentContract};

/// Produces the implementation plan that INITIALIZATION partitions.
#[async_trait]
pub trait WorkPlanner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Plan the work for a request. An empty plan falls back to one
    /// partition per success criterion.
    async fn plan(&self, request: &BuildRequest, contract: &IntentContract) -> BuildResult<ImplementationPlan>;
}
