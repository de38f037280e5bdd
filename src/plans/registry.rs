//! Plan registry: validation and instantiation on top of a catalog.

use std::collections::HashMap;
use std::sync::Arc;

use super::{FileListing, PlanCatalog, PlanSignature, PlanStub};
use crate::error::PlanError;
use crate::ledger::JobSpec;

/// Resolves plan ids and checks inputs before anything touches a ledger.
pub struct PlanRegistry {
    catalog: Arc<dyn PlanCatalog>,
}

impl PlanRegistry {
    pub fn new(catalog: Arc<dyn PlanCatalog>) -> Self {
        Self { catalog }
    }

    pub async fn list(&self) -> Result<Vec<PlanSignature>, PlanError> {
        self.catalog.list_plans().await
    }

    pub async fn files(&self) -> Result<FileListing, PlanError> {
        self.catalog.list_files().await
    }

    pub async fn create_stub(&self, name: &str) -> Result<PlanStub, PlanError> {
        self.catalog.create_stub(name).await
    }

    /// Look up a plan and check every required input is supplied.
    pub async fn validate(
        &self,
        plan_id: &str,
        inputs: &HashMap<String, String>,
    ) -> Result<PlanSignature, PlanError> {
        let plan = self
            .list()
            .await?
            .into_iter()
            .find(|p| p.id == plan_id)
            .ok_or_else(|| PlanError::InvalidPlan {
                plan_id: plan_id.to_string(),
            })?;

        let missing = plan.inputs.iter().find(|input| {
            input.required
                && inputs
                    .get(&input.name)
                    .is_none_or(|path| path.trim().is_empty())
        });
        if let Some(input) = missing {
            return Err(PlanError::MissingInput {
                plan_id: plan_id.to_string(),
                input: input.name.clone(),
            });
        }

        Ok(plan)
    }

    /// Expand an already-validated plan into job specs.
    pub async fn instantiate(
        &self,
        plan: &PlanSignature,
        inputs: &HashMap<String, String>,
    ) -> Result<Vec<JobSpec>, PlanError> {
        self.catalog.instantiate(plan, inputs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StaticCatalog;

    fn inputs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn unknown_plan_is_invalid() {
        let registry = PlanRegistry::new(StaticCatalog::with_lines(3));
        assert!(matches!(
            registry.validate("nope", &inputs(&[("corpus", "c.jsonl")])).await,
            Err(PlanError::InvalidPlan { .. })
        ));
    }

    #[tokio::test]
    async fn missing_or_blank_input_is_rejected() {
        let registry = PlanRegistry::new(StaticCatalog::with_lines(3));
        for given in [inputs(&[]), inputs(&[("corpus", "  ")]), inputs(&[("other", "x")])] {
            match registry.validate("p1", &given).await {
                Err(PlanError::MissingInput { input, .. }) => assert_eq!(input, "corpus"),
                other => panic!("expected MissingInput, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn valid_inputs_instantiate() {
        let registry = PlanRegistry::new(StaticCatalog::with_lines(3));
        let given = inputs(&[("corpus", "c.jsonl")]);
        let plan = registry.validate("p1", &given).await.unwrap();
        assert_eq!(registry.instantiate(&plan, &given).await.unwrap().len(), 3);
    }
}
