//! In-process store, the default when `DATABASE_URL` is absent.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::model::workflow::WorkflowUpdate;
use crate::model::{Credential, Edge, Step, StepExecution, Workflow, WorkflowExecution};

use super::{Store, StoreResult};

#[derive(Default)]
pub struct MemoryStore {
    workflows: RwLock<HashMap<String, Workflow>>,
    steps: RwLock<HashMap<String, Vec<Step>>>,
    edges: RwLock<HashMap<String, Vec<Edge>>>,
    executions: RwLock<HashMap<String, WorkflowExecution>>,
    step_executions: RwLock<HashMap<String, Vec<StepExecution>>>,
    credentials: RwLock<HashMap<String, Credential>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sort_steps(steps: &mut [Step]) {
    steps.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_workflow(&self, id: &str) -> StoreResult<Option<Workflow>> {
        Ok(self.workflows.read().get(id).cloned())
    }

    async fn list_workflows(&self) -> StoreResult<Vec<Workflow>> {
        let mut all: Vec<Workflow> = self.workflows.read().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn create_workflow(&self, workflow: Workflow) -> StoreResult<Workflow> {
        self.workflows
            .write()
            .insert(workflow.id.clone(), workflow.clone());
        Ok(workflow)
    }

    async fn update_workflow(
        &self,
        id: &str,
        update: WorkflowUpdate,
    ) -> StoreResult<Option<Workflow>> {
        let mut workflows = self.workflows.write();
        let Some(workflow) = workflows.get_mut(id) else {
            return Ok(None);
        };
        if let Some(name) = update.name {
            workflow.name = name;
        }
        if let Some(description) = update.description {
            workflow.description = Some(description);
        }
        if let Some(is_active) = update.is_active {
            workflow.is_active = is_active;
        }
        workflow.updated_at = Utc::now();
        Ok(Some(workflow.clone()))
    }

    async fn delete_workflow(&self, id: &str) -> StoreResult<bool> {
        let existed = self.workflows.write().remove(id).is_some();
        if existed {
            self.steps.write().remove(id);
            self.edges.write().remove(id);
            let run_ids: Vec<String> = {
                let mut executions = self.executions.write();
                let ids: Vec<String> = executions
                    .values()
                    .filter(|e| e.workflow_id == id)
                    .map(|e| e.id.clone())
                    .collect();
                for run_id in &ids {
                    executions.remove(run_id);
                }
                ids
            };
            let mut step_executions = self.step_executions.write();
            for run_id in run_ids {
                step_executions.remove(&run_id);
            }
        }
        Ok(existed)
    }

    async fn get_steps(&self, workflow_id: &str) -> StoreResult<Vec<Step>> {
        let mut steps = self
            .steps
            .read()
            .get(workflow_id)
            .cloned()
            .unwrap_or_default();
        sort_steps(&mut steps);
        Ok(steps)
    }

    async fn get_edges(&self, workflow_id: &str) -> StoreResult<Vec<Edge>> {
        Ok(self
            .edges
            .read()
            .get(workflow_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_graph(
        &self,
        workflow_id: &str,
        steps: Vec<Step>,
        edges: Vec<Edge>,
    ) -> StoreResult<()> {
        // Both maps swapped under the same critical section: readers never see
        // edges pointing at a half-replaced step set.
        let mut step_map = self.steps.write();
        let mut edge_map = self.edges.write();
        edge_map.remove(workflow_id);
        step_map.insert(workflow_id.to_string(), steps);
        edge_map.insert(workflow_id.to_string(), edges);
        Ok(())
    }

    async fn create_execution(&self, execution: WorkflowExecution) -> StoreResult<()> {
        self.executions
            .write()
            .insert(execution.id.clone(), execution);
        Ok(())
    }

    async fn update_execution(&self, execution: &WorkflowExecution) -> StoreResult<()> {
        self.executions
            .write()
            .insert(execution.id.clone(), execution.clone());
        Ok(())
    }

    async fn get_execution(&self, id: &str) -> StoreResult<Option<WorkflowExecution>> {
        Ok(self.executions.read().get(id).cloned())
    }

    async fn list_executions(&self, workflow_id: &str) -> StoreResult<Vec<WorkflowExecution>> {
        let mut runs: Vec<WorkflowExecution> = self
            .executions
            .read()
            .values()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.start_time.cmp(&a.start_time).then_with(|| b.id.cmp(&a.id)));
        Ok(runs)
    }

    async fn create_step_execution(&self, record: StepExecution) -> StoreResult<()> {
        self.step_executions
            .write()
            .entry(record.workflow_execution_id.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn update_step_execution(&self, record: &StepExecution) -> StoreResult<()> {
        let mut map = self.step_executions.write();
        if let Some(records) = map.get_mut(&record.workflow_execution_id) {
            if let Some(existing) = records.iter_mut().find(|r| r.id == record.id) {
                *existing = record.clone();
            }
        }
        Ok(())
    }

    async fn list_step_executions(&self, execution_id: &str) -> StoreResult<Vec<StepExecution>> {
        Ok(self
            .step_executions
            .read()
            .get(execution_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_credentials(&self) -> StoreResult<Vec<Credential>> {
        let mut all: Vec<Credential> = self.credentials.read().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn create_credential(&self, credential: Credential) -> StoreResult<Credential> {
        self.credentials
            .write()
            .insert(credential.id.clone(), credential.clone());
        Ok(credential)
    }

    async fn delete_credential(&self, id: &str) -> StoreResult<bool> {
        Ok(self.credentials.write().remove(id).is_some())
    }
}
