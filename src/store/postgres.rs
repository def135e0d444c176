//! Postgres-backed store, selected by `DATABASE_URL`.
//!
//! Column layout follows the data model one-to-one, with JSONB columns for
//! `position`, `config`, `outputs`, `input`, and `output`. Graph replacement
//! runs inside a transaction, deleting edges before steps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::model::workflow::WorkflowUpdate;
use crate::model::{
    Credential, Edge, ExecutionStatus, Step, StepExecution, StepKind, StepStatus, Workflow,
    WorkflowExecution,
};

use super::{Store, StoreError, StoreResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS workflows (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT,
    is_active   BOOLEAN NOT NULL DEFAULT TRUE,
    created_at  TIMESTAMPTZ NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL
);
CREATE TABLE IF NOT EXISTS steps (
    id          TEXT PRIMARY KEY,
    workflow_id TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
    kind        TEXT NOT NULL,
    label       TEXT NOT NULL DEFAULT '',
    position    JSONB,
    config      JSONB,
    step_order  INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS edges (
    id          TEXT PRIMARY KEY,
    workflow_id TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
    source_id   TEXT NOT NULL REFERENCES steps(id) ON DELETE CASCADE,
    target_id   TEXT NOT NULL REFERENCES steps(id) ON DELETE CASCADE,
    label       TEXT
);
CREATE TABLE IF NOT EXISTS workflow_executions (
    id          TEXT PRIMARY KEY,
    workflow_id TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
    status      TEXT NOT NULL,
    start_time  TIMESTAMPTZ NOT NULL,
    end_time    TIMESTAMPTZ,
    error       TEXT,
    outputs     JSONB NOT NULL DEFAULT '{}'::jsonb
);
CREATE TABLE IF NOT EXISTS step_executions (
    id                    TEXT PRIMARY KEY,
    workflow_execution_id TEXT NOT NULL REFERENCES workflow_executions(id) ON DELETE CASCADE,
    step_id               TEXT NOT NULL,
    status                TEXT NOT NULL,
    start_time            TIMESTAMPTZ NOT NULL,
    end_time              TIMESTAMPTZ,
    error                 TEXT,
    input                 JSONB,
    output                JSONB
);
CREATE TABLE IF NOT EXISTS credentials (
    id              TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    credential_type TEXT NOT NULL,
    data            JSONB,
    created_at      TIMESTAMPTZ NOT NULL
);
"#;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        let store = PgStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn parse_tag<T: serde::de::DeserializeOwned>(tag: &str) -> StoreResult<T> {
    serde_json::from_value(Value::String(tag.to_string()))
        .map_err(|e| StoreError::Backend(format!("invalid stored tag '{tag}': {e}")))
}

fn tag_of<T: serde::Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(Value::String(s)) => s,
        _ => String::new(),
    }
}

fn workflow_from_row(row: &PgRow) -> StoreResult<Workflow> {
    Ok(Workflow {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn step_from_row(row: &PgRow) -> StoreResult<Step> {
    let kind: String = row.try_get("kind")?;
    Ok(Step {
        id: row.try_get("id")?,
        workflow_id: row.try_get("workflow_id")?,
        kind: parse_tag::<StepKind>(&kind)?,
        label: row.try_get("label")?,
        position: row.try_get::<Option<Value>, _>("position")?.unwrap_or(Value::Null),
        config: row.try_get::<Option<Value>, _>("config")?.unwrap_or(Value::Null),
        order: row.try_get("step_order")?,
    })
}

fn edge_from_row(row: &PgRow) -> StoreResult<Edge> {
    Ok(Edge {
        id: row.try_get("id")?,
        workflow_id: row.try_get("workflow_id")?,
        source_id: row.try_get("source_id")?,
        target_id: row.try_get("target_id")?,
        label: row.try_get("label")?,
    })
}

fn execution_from_row(row: &PgRow) -> StoreResult<WorkflowExecution> {
    let status: String = row.try_get("status")?;
    let outputs: Value = row.try_get("outputs")?;
    Ok(WorkflowExecution {
        id: row.try_get("id")?,
        workflow_id: row.try_get("workflow_id")?,
        status: parse_tag::<ExecutionStatus>(&status)?,
        start_time: row.try_get::<DateTime<Utc>, _>("start_time")?,
        end_time: row.try_get::<Option<DateTime<Utc>>, _>("end_time")?,
        error: row.try_get("error")?,
        outputs: serde_json::from_value(outputs)
            .map_err(|e| StoreError::Backend(format!("invalid outputs column: {e}")))?,
    })
}

fn step_execution_from_row(row: &PgRow) -> StoreResult<StepExecution> {
    let status: String = row.try_get("status")?;
    Ok(StepExecution {
        id: row.try_get("id")?,
        workflow_execution_id: row.try_get("workflow_execution_id")?,
        step_id: row.try_get("step_id")?,
        status: parse_tag::<StepStatus>(&status)?,
        start_time: row.try_get::<DateTime<Utc>, _>("start_time")?,
        end_time: row.try_get::<Option<DateTime<Utc>>, _>("end_time")?,
        error: row.try_get("error")?,
        input: row.try_get::<Option<Value>, _>("input")?.unwrap_or(Value::Null),
        output: row.try_get::<Option<Value>, _>("output")?.unwrap_or(Value::Null),
    })
}

fn credential_from_row(row: &PgRow) -> StoreResult<Credential> {
    Ok(Credential {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        credential_type: row.try_get("credential_type")?,
        data: row.try_get::<Option<Value>, _>("data")?.unwrap_or(Value::Null),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn get_workflow(&self, id: &str) -> StoreResult<Option<Workflow>> {
        let row = sqlx::query("SELECT * FROM workflows WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(workflow_from_row).transpose()
    }

    async fn list_workflows(&self) -> StoreResult<Vec<Workflow>> {
        let rows = sqlx::query("SELECT * FROM workflows ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(workflow_from_row).collect()
    }

    async fn create_workflow(&self, workflow: Workflow) -> StoreResult<Workflow> {
        sqlx::query(
            "INSERT INTO workflows (id, name, description, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&workflow.id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.is_active)
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(workflow)
    }

    async fn update_workflow(
        &self,
        id: &str,
        update: WorkflowUpdate,
    ) -> StoreResult<Option<Workflow>> {
        let row = sqlx::query(
            "UPDATE workflows SET \
               name = COALESCE($2, name), \
               description = COALESCE($3, description), \
               is_active = COALESCE($4, is_active), \
               updated_at = $5 \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(update.name)
        .bind(update.description)
        .bind(update.is_active)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(workflow_from_row).transpose()
    }

    async fn delete_workflow(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_steps(&self, workflow_id: &str) -> StoreResult<Vec<Step>> {
        let rows = sqlx::query(
            "SELECT * FROM steps WHERE workflow_id = $1 ORDER BY step_order, id",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(step_from_row).collect()
    }

    async fn get_edges(&self, workflow_id: &str) -> StoreResult<Vec<Edge>> {
        let rows = sqlx::query("SELECT * FROM edges WHERE workflow_id = $1 ORDER BY id")
            .bind(workflow_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(edge_from_row).collect()
    }

    async fn replace_graph(
        &self,
        workflow_id: &str,
        steps: Vec<Step>,
        edges: Vec<Edge>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM edges WHERE workflow_id = $1")
            .bind(workflow_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM steps WHERE workflow_id = $1")
            .bind(workflow_id)
            .execute(&mut *tx)
            .await?;
        for step in &steps {
            sqlx::query(
                "INSERT INTO steps (id, workflow_id, kind, label, position, config, step_order) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(&step.id)
            .bind(workflow_id)
            .bind(tag_of(&step.kind))
            .bind(&step.label)
            .bind(&step.position)
            .bind(&step.config)
            .bind(step.order)
            .execute(&mut *tx)
            .await?;
        }
        for edge in &edges {
            sqlx::query(
                "INSERT INTO edges (id, workflow_id, source_id, target_id, label) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&edge.id)
            .bind(workflow_id)
            .bind(&edge.source_id)
            .bind(&edge.target_id)
            .bind(&edge.label)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn create_execution(&self, execution: WorkflowExecution) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO workflow_executions \
               (id, workflow_id, status, start_time, end_time, error, outputs) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&execution.id)
        .bind(&execution.workflow_id)
        .bind(tag_of(&execution.status))
        .bind(execution.start_time)
        .bind(execution.end_time)
        .bind(&execution.error)
        .bind(serde_json::to_value(&execution.outputs).unwrap_or(Value::Null))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_execution(&self, execution: &WorkflowExecution) -> StoreResult<()> {
        sqlx::query(
            "UPDATE workflow_executions SET \
               status = $2, end_time = $3, error = $4, outputs = $5 \
             WHERE id = $1",
        )
        .bind(&execution.id)
        .bind(tag_of(&execution.status))
        .bind(execution.end_time)
        .bind(&execution.error)
        .bind(serde_json::to_value(&execution.outputs).unwrap_or(Value::Null))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_execution(&self, id: &str) -> StoreResult<Option<WorkflowExecution>> {
        let row = sqlx::query("SELECT * FROM workflow_executions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(execution_from_row).transpose()
    }

    async fn list_executions(&self, workflow_id: &str) -> StoreResult<Vec<WorkflowExecution>> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_executions WHERE workflow_id = $1 \
             ORDER BY start_time DESC, id DESC",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(execution_from_row).collect()
    }

    async fn create_step_execution(&self, record: StepExecution) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO step_executions \
               (id, workflow_execution_id, step_id, status, start_time, end_time, error, input, output) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&record.id)
        .bind(&record.workflow_execution_id)
        .bind(&record.step_id)
        .bind(tag_of(&record.status))
        .bind(record.start_time)
        .bind(record.end_time)
        .bind(&record.error)
        .bind(&record.input)
        .bind(&record.output)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_step_execution(&self, record: &StepExecution) -> StoreResult<()> {
        sqlx::query(
            "UPDATE step_executions SET \
               status = $2, end_time = $3, error = $4, output = $5 \
             WHERE id = $1",
        )
        .bind(&record.id)
        .bind(tag_of(&record.status))
        .bind(record.end_time)
        .bind(&record.error)
        .bind(&record.output)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_step_executions(&self, execution_id: &str) -> StoreResult<Vec<StepExecution>> {
        let rows = sqlx::query(
            "SELECT * FROM step_executions WHERE workflow_execution_id = $1 \
             ORDER BY start_time, id",
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(step_execution_from_row).collect()
    }

    async fn list_credentials(&self) -> StoreResult<Vec<Credential>> {
        let rows = sqlx::query("SELECT * FROM credentials ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(credential_from_row).collect()
    }

    async fn create_credential(&self, credential: Credential) -> StoreResult<Credential> {
        sqlx::query(
            "INSERT INTO credentials (id, name, credential_type, data, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&credential.id)
        .bind(&credential.name)
        .bind(&credential.credential_type)
        .bind(&credential.data)
        .bind(credential.created_at)
        .execute(&self.pool)
        .await?;
        Ok(credential)
    }

    async fn delete_credential(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM credentials WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
