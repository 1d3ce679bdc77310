//! Default work planner: one partition per success criterion.

use async_trait::async_trait;

use crate::domain::errors::BuildResult;
use crate::domain::models::{
    BuildRequest, CriterionCheck, ImplementationPlan, IntentContract, PlanFeature, WorkPartition,
};
use crate::domain::ports::WorkPlanner;

#[derive(Debug, Clone, Copy, Default)]
pub struct CriteriaPlanner;

impl CriteriaPlanner {
    pub fn plan_for(contract: &IntentContract) -> ImplementationPlan {
        let features = contract
            .criteria()
            .iter()
            .enumerate()
            .map(|(idx, criterion)| PlanFeature {
                id: Some(criterion.id.to_lowercase()),
                name: Some(criterion.description.clone()),
                description: criterion.description.clone(),
                files: match &criterion.check {
                    CriterionCheck::FileExists { path } => vec![path.clone()],
                    _ => Vec::new(),
                },
                priority: u32::try_from(idx).ok(),
            })
            .collect();
        ImplementationPlan {
            phases: Vec::new(),
            features,
        }
    }
}

#[async_trait]
impl WorkPlanner for CriteriaPlanner {
    fn name(&self) -> &'static str {
        "criteria"
    }

    async fn plan(&self, _request: &BuildRequest, contract: &IntentContract) -> BuildResult<ImplementationPlan> {
        Ok(Self::plan_for(contract))
    }
}

/// Partition a plan, falling back to one partition per criterion when the
/// plan is empty.
pub fn partitions_for(plan: &ImplementationPlan, contract: &IntentContract) -> Vec<WorkPartition> {
    let partitions = WorkPartition::from_plan(plan);
    if partitions.is_empty() {
        WorkPartition::from_plan(&CriteriaPlanner::plan_for(contract))
    } else {
        partitions
    }
}
