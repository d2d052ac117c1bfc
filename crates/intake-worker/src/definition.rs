//! Workflow definitions and the registry that holds them

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use intake_core::models::FailureBehavior;
use intake_core::{AppError, AppResult};

use crate::handler::StepHandler;

/// One named step of a workflow
#[derive(Clone)]
pub struct StepDefinition {
    pub name: String,
    pub handler: Arc<dyn StepHandler>,
    pub failure_behavior: FailureBehavior,
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("name", &self.name)
            .field("failure_behavior", &self.failure_behavior)
            .finish()
    }
}

/// Ordered, immutable list of steps. Built once at startup.
#[derive(Debug)]
pub struct WorkflowDefinition {
    name: String,
    steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    pub fn builder(name: impl Into<String>) -> WorkflowDefinitionBuilder {
        WorkflowDefinitionBuilder {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }
}

pub struct WorkflowDefinitionBuilder {
    name: String,
    steps: Vec<StepDefinition>,
}

impl WorkflowDefinitionBuilder {
    pub fn step(
        mut self,
        name: impl Into<String>,
        handler: Arc<dyn StepHandler>,
        failure_behavior: FailureBehavior,
    ) -> Self {
        self.steps.push(StepDefinition {
            name: name.into(),
            handler,
            failure_behavior,
        });
        self
    }

    /// Steps must be non-empty and uniquely named.
    pub fn build(self) -> AppResult<WorkflowDefinition> {
        if self.name.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Workflow name must not be empty".to_string(),
            ));
        }
        if self.steps.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "Workflow {} has no steps",
                self.name
            )));
        }

        {
            let mut seen = HashSet::new();
            for step in &self.steps {
                if !seen.insert(step.name.as_str()) {
                    return Err(AppError::InvalidInput(format!(
                        "Workflow {} declares step {} twice",
                        self.name, step.name
                    )));
                }
            }
        }

        Ok(WorkflowDefinition {
            name: self.name,
            steps: self.steps,
        })
    }
}

/// Workflow definitions by name
#[derive(Debug, Default)]
pub struct WorkflowRegistry {
    definitions: HashMap<String, Arc<WorkflowDefinition>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: WorkflowDefinition) -> AppResult<()> {
        if self.definitions.contains_key(definition.name()) {
            return Err(AppError::InvalidInput(format!(
                "Workflow {} is already registered",
                definition.name()
            )));
        }
        tracing::debug!(
            workflow = %definition.name(),
            steps = definition.steps().len(),
            "Workflow registered"
        );
        self.definitions
            .insert(definition.name().to_string(), Arc::new(definition));
        Ok(())
    }

    pub fn get(&self, name: &str) -> AppResult<Arc<WorkflowDefinition>> {
        self.definitions
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::UnknownWorkflow(name.to_string()))
    }
}
