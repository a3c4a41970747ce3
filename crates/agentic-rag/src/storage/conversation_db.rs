//! SQLite store for conversations, messages, and execution traces

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::providers::{ConversationStore, ExecutionLog};
use crate::types::{
    AgentExecution, Conversation, ConversationStatus, ExecutionStatus, Message, Metadata,
    NewMessage, Outcome, ToolInvocation, DEFAULT_CONVERSATION_TITLE,
};
use crate::util::duration_millis;

use super::columns::{
    enum_from_sql, json_from_sql, metadata_from_sql, micros_from_sql, time_from_sql,
    time_to_sql, uuid_from_sql,
};

/// SQLite-backed conversation store
///
/// All access goes through one connection. Async callers reach it via the
/// blocking pool.
#[derive(Clone)]
pub struct ConversationDb {
    conn: Arc<Mutex<Connection>>,
}

impl ConversationDb {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        tracing::info!("Conversation database ready at {}", path.display());
        Ok(db)
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
            PRAGMA busy_timeout=5000;
        "#,
        )?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                user_id TEXT,
                title TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                message_seq INTEGER NOT NULL DEFAULT 0,
                last_message_us INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_conversations_user_id ON conversations(user_id);

            -- Append-only transcript; (seq, ts_us) increase together per conversation
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                ts_us INTEGER NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
                UNIQUE(conversation_id, seq)
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts ON messages(conversation_id, ts_us);

            CREATE TABLE IF NOT EXISTS agent_executions (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                agent_type TEXT NOT NULL,
                input_data TEXT,
                output_data TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                started_at TEXT NOT NULL,
                completed_at TEXT,
                error_message TEXT,
                execution_time_ms INTEGER,
                FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_agent_executions_conversation ON agent_executions(conversation_id);

            CREATE TABLE IF NOT EXISTS tool_invocations (
                id TEXT PRIMARY KEY,
                execution_id TEXT NOT NULL,
                tool_name TEXT NOT NULL,
                input_params TEXT,
                output_result TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                started_at TEXT NOT NULL,
                completed_at TEXT,
                error_message TEXT,
                execution_time_ms INTEGER,
                FOREIGN KEY (execution_id) REFERENCES agent_executions(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_tool_invocations_execution ON tool_invocations(execution_id);
        "#,
        )?;

        Ok(())
    }

    // ---- conversations ----

    /// Look up a conversation
    pub fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let conn = self.conn.lock();
        let conversation = conn
            .query_row(
                "SELECT id, user_id, title, status, metadata, created_at, updated_at
                 FROM conversations WHERE id = ?1",
                params![id.to_string()],
                row_to_conversation,
            )
            .optional()?;
        Ok(conversation)
    }

    /// Insert a new active conversation
    pub fn create_conversation(&self, user_id: Option<String>) -> Result<Conversation> {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            user_id,
            title: DEFAULT_CONVERSATION_TITLE.to_string(),
            status: ConversationStatus::Active,
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO conversations (id, user_id, title, status, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                conversation.id.to_string(),
                conversation.user_id,
                conversation.title,
                conversation.status.as_str(),
                serde_json::to_string(&conversation.metadata)?,
                time_to_sql(&now),
                time_to_sql(&now),
            ],
        )?;

        Ok(conversation)
    }

    /// Append a message, allocating the next sequence number and a timestamp
    /// strictly after the previous message in one transaction
    pub fn insert_message(&self, conversation_id: Uuid, message: NewMessage) -> Result<Message> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let cursor: Option<(i64, i64)> = tx
            .query_row(
                "SELECT message_seq, last_message_us FROM conversations WHERE id = ?1",
                params![conversation_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (last_seq, last_us) =
            cursor.ok_or_else(|| Error::not_found("Conversation", conversation_id))?;

        let now = Utc::now();
        let ts_us = now.timestamp_micros().max(last_us + 1);
        let seq = last_seq + 1;
        let timestamp = micros_from_sql(0, ts_us)?;
        let id = Uuid::new_v4();

        tx.execute(
            "INSERT INTO messages (id, conversation_id, seq, role, content, token_count, ts_us, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id.to_string(),
                conversation_id.to_string(),
                seq,
                message.role.as_str(),
                message.content,
                message.token_count as i64,
                ts_us,
                serde_json::to_string(&message.metadata)?,
            ],
        )?;
        tx.execute(
            "UPDATE conversations SET message_seq = ?1, last_message_us = ?2, updated_at = ?3
             WHERE id = ?4",
            params![seq, ts_us, time_to_sql(&timestamp), conversation_id.to_string()],
        )?;
        tx.commit()?;

        Ok(Message {
            id,
            conversation_id,
            role: message.role,
            content: message.content,
            token_count: message.token_count,
            timestamp,
            sequence: seq as u64,
            metadata: message.metadata,
        })
    }

    /// Messages in timestamp order, insertion order on ties
    pub fn get_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, role, content, token_count, ts_us, seq, metadata
             FROM messages WHERE conversation_id = ?1
             ORDER BY ts_us ASC, seq ASC",
        )?;
        let messages = stmt
            .query_map(params![conversation_id.to_string()], row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    /// Number of messages in a conversation
    pub fn message_count(&self, conversation_id: Uuid) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            params![conversation_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Delete a conversation and everything hanging off it.
    ///
    /// Returns the number of messages removed.
    pub fn delete_conversation(&self, id: Uuid) -> Result<u64> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let messages: i64 = tx.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        let deleted = tx.execute(
            "DELETE FROM conversations WHERE id = ?1",
            params![id.to_string()],
        )?;
        if deleted == 0 {
            return Err(Error::not_found("Conversation", id));
        }
        tx.commit()?;

        Ok(messages as u64)
    }

    // ---- execution trace ----

    /// Open a pending execution
    pub fn insert_execution(
        &self,
        conversation_id: Uuid,
        agent_type: &str,
        input: &Value,
    ) -> Result<AgentExecution> {
        let execution = AgentExecution {
            id: Uuid::new_v4(),
            conversation_id,
            agent_type: agent_type.to_string(),
            input_data: input.clone(),
            output_data: None,
            status: ExecutionStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
            execution_time_ms: None,
            tool_invocations: Vec::new(),
        };

        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT INTO agent_executions (id, conversation_id, agent_type, input_data, status, started_at)
             SELECT ?1, id, ?3, ?4, ?5, ?6 FROM conversations WHERE id = ?2",
            params![
                execution.id.to_string(),
                conversation_id.to_string(),
                execution.agent_type,
                serde_json::to_string(&execution.input_data)?,
                execution.status.as_str(),
                time_to_sql(&execution.started_at),
            ],
        )?;
        if inserted == 0 {
            return Err(Error::not_found("Conversation", conversation_id));
        }

        Ok(execution)
    }

    /// Move an execution from pending to running
    pub fn set_execution_running(&self, execution_id: Uuid) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let (status, _) = current_state(&tx, "agent_executions", "AgentExecution", execution_id)?;
        check_transition("AgentExecution", execution_id, status, ExecutionStatus::Running)?;

        tx.execute(
            "UPDATE agent_executions SET status = ?1 WHERE id = ?2",
            params![ExecutionStatus::Running.as_str(), execution_id.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Close an execution
    pub fn complete_execution(&self, execution_id: Uuid, outcome: &Outcome) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        finish_row(&tx, "agent_executions", "output_data", "AgentExecution", execution_id, outcome)?;
        tx.commit()?;
        Ok(())
    }

    /// Open a pending tool invocation
    pub fn insert_tool_invocation(
        &self,
        execution_id: Uuid,
        tool_name: &str,
        input: &Value,
    ) -> Result<ToolInvocation> {
        let invocation = ToolInvocation {
            id: Uuid::new_v4(),
            execution_id,
            tool_name: tool_name.to_string(),
            input_params: input.clone(),
            output_result: None,
            status: ExecutionStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
            execution_time_ms: None,
        };

        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT INTO tool_invocations (id, execution_id, tool_name, input_params, status, started_at)
             SELECT ?1, id, ?3, ?4, ?5, ?6 FROM agent_executions WHERE id = ?2",
            params![
                invocation.id.to_string(),
                execution_id.to_string(),
                invocation.tool_name,
                serde_json::to_string(&invocation.input_params)?,
                invocation.status.as_str(),
                time_to_sql(&invocation.started_at),
            ],
        )?;
        if inserted == 0 {
            return Err(Error::not_found("AgentExecution", execution_id));
        }

        Ok(invocation)
    }

    /// Close a tool invocation
    pub fn complete_tool_invocation(&self, invocation_id: Uuid, outcome: &Outcome) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        finish_row(&tx, "tool_invocations", "output_result", "ToolInvocation", invocation_id, outcome)?;
        tx.commit()?;
        Ok(())
    }

    /// Executions with their tool invocations, oldest first
    pub fn get_executions(&self, conversation_id: Uuid) -> Result<Vec<AgentExecution>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, agent_type, input_data, output_data, status,
                    started_at, completed_at, error_message, execution_time_ms
             FROM agent_executions WHERE conversation_id = ?1
             ORDER BY started_at ASC, rowid ASC",
        )?;
        let mut executions = stmt
            .query_map(params![conversation_id.to_string()], row_to_execution)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut tools = conn.prepare(
            "SELECT id, execution_id, tool_name, input_params, output_result, status,
                    started_at, completed_at, error_message, execution_time_ms
             FROM tool_invocations WHERE execution_id = ?1
             ORDER BY started_at ASC, rowid ASC",
        )?;
        for execution in &mut executions {
            execution.tool_invocations = tools
                .query_map(params![execution.id.to_string()], row_to_tool_invocation)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
        }

        Ok(executions)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<ConversationDbStats> {
        let conn = self.conn.lock();
        let count = |sql: &str| -> Result<u64> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as u64)
        };

        Ok(ConversationDbStats {
            conversations: count("SELECT COUNT(*) FROM conversations")?,
            messages: count("SELECT COUNT(*) FROM messages")?,
            executions: count("SELECT COUNT(*) FROM agent_executions")?,
            failed_executions: count(
                "SELECT COUNT(*) FROM agent_executions WHERE status = 'failed'",
            )?,
        })
    }

    /// `stats` on the blocking pool, for async callers
    pub async fn stats_blocking(&self) -> Result<ConversationDbStats> {
        self.blocking(|db| db.stats()).await
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&ConversationDb) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }
}

/// Row counts across the conversation tables
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ConversationDbStats {
    pub conversations: u64,
    pub messages: u64,
    pub executions: u64,
    pub failed_executions: u64,
}

fn current_state(
    conn: &Connection,
    table: &str,
    resource: &'static str,
    id: Uuid,
) -> Result<(ExecutionStatus, chrono::DateTime<Utc>)> {
    let row: Option<(String, String)> = conn
        .query_row(
            &format!("SELECT status, started_at FROM {} WHERE id = ?1", table),
            params![id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let (status, started_at) = row.ok_or_else(|| Error::not_found(resource, id))?;
    Ok((status.parse()?, time_from_sql(1, &started_at)?))
}

fn check_transition(
    resource: &str,
    id: Uuid,
    from: ExecutionStatus,
    to: ExecutionStatus,
) -> Result<()> {
    if !from.can_transition_to(to) {
        return Err(Error::conflict(format!(
            "{} {} cannot move from {} to {}",
            resource,
            id,
            from.as_str(),
            to.as_str()
        )));
    }
    Ok(())
}

/// Shared terminal update for executions and tool invocations
fn finish_row(
    conn: &Connection,
    table: &str,
    output_column: &str,
    resource: &'static str,
    id: Uuid,
    outcome: &Outcome,
) -> Result<()> {
    let (status, started_at) = current_state(conn, table, resource, id)?;
    let next = outcome.status();
    check_transition(resource, id, status, next)?;

    let completed_at = Utc::now();
    let elapsed_ms = (completed_at - started_at)
        .to_std()
        .map(duration_millis)
        .unwrap_or(0);
    let (output, error_message) = match outcome {
        Outcome::Completed(value) => (Some(serde_json::to_string(value)?), None),
        Outcome::Failed(message) => (None, Some(message.clone())),
    };

    conn.execute(
        &format!(
            "UPDATE {} SET status = ?1, {} = ?2, error_message = ?3, completed_at = ?4,
             execution_time_ms = ?5 WHERE id = ?6",
            table, output_column
        ),
        params![
            next.as_str(),
            output,
            error_message,
            time_to_sql(&completed_at),
            elapsed_ms as i64,
            id.to_string(),
        ],
    )?;
    Ok(())
}

fn row_to_conversation(row: &rusqlite::Row) -> rusqlite::Result<Conversation> {
    let id: String = row.get(0)?;
    let status: String = row.get(3)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;

    Ok(Conversation {
        id: uuid_from_sql(0, &id)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        status: enum_from_sql(3, &status)?,
        metadata: metadata_from_sql(row.get(4)?),
        created_at: time_from_sql(5, &created_at)?,
        updated_at: time_from_sql(6, &updated_at)?,
    })
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    let id: String = row.get(0)?;
    let conversation_id: String = row.get(1)?;
    let role: String = row.get(2)?;
    let token_count: i64 = row.get(4)?;
    let ts_us: i64 = row.get(5)?;
    let seq: i64 = row.get(6)?;

    Ok(Message {
        id: uuid_from_sql(0, &id)?,
        conversation_id: uuid_from_sql(1, &conversation_id)?,
        role: enum_from_sql(2, &role)?,
        content: row.get(3)?,
        token_count: token_count as u32,
        timestamp: micros_from_sql(5, ts_us)?,
        sequence: seq as u64,
        metadata: metadata_from_sql(row.get(7)?),
    })
}

fn row_to_execution(row: &rusqlite::Row) -> rusqlite::Result<AgentExecution> {
    let id: String = row.get(0)?;
    let conversation_id: String = row.get(1)?;
    let status: String = row.get(5)?;
    let started_at: String = row.get(6)?;
    let completed_at: Option<String> = row.get(7)?;
    let execution_time_ms: Option<i64> = row.get(9)?;

    Ok(AgentExecution {
        id: uuid_from_sql(0, &id)?,
        conversation_id: uuid_from_sql(1, &conversation_id)?,
        agent_type: row.get(2)?,
        input_data: json_from_sql(row.get(3)?).unwrap_or(Value::Null),
        output_data: json_from_sql(row.get(4)?),
        status: enum_from_sql(5, &status)?,
        started_at: time_from_sql(6, &started_at)?,
        completed_at: completed_at.map(|s| time_from_sql(7, &s)).transpose()?,
        error_message: row.get(8)?,
        execution_time_ms: execution_time_ms.map(|ms| ms as u64),
        tool_invocations: Vec::new(),
    })
}

fn row_to_tool_invocation(row: &rusqlite::Row) -> rusqlite::Result<ToolInvocation> {
    let id: String = row.get(0)?;
    let execution_id: String = row.get(1)?;
    let status: String = row.get(5)?;
    let started_at: String = row.get(6)?;
    let completed_at: Option<String> = row.get(7)?;
    let execution_time_ms: Option<i64> = row.get(9)?;

    Ok(ToolInvocation {
        id: uuid_from_sql(0, &id)?,
        execution_id: uuid_from_sql(1, &execution_id)?,
        tool_name: row.get(2)?,
        input_params: json_from_sql(row.get(3)?).unwrap_or(Value::Null),
        output_result: json_from_sql(row.get(4)?),
        status: enum_from_sql(5, &status)?,
        started_at: time_from_sql(6, &started_at)?,
        completed_at: completed_at.map(|s| time_from_sql(7, &s)).transpose()?,
        error_message: row.get(8)?,
        execution_time_ms: execution_time_ms.map(|ms| ms as u64),
    })
}

#[async_trait]
impl ConversationStore for ConversationDb {
    async fn get(&self, id: Uuid) -> Result<Option<Conversation>> {
        self.blocking(move |db| db.get_conversation(id)).await
    }

    async fn create(&self, user_id: Option<String>) -> Result<Conversation> {
        self.blocking(move |db| db.create_conversation(user_id)).await
    }

    async fn append_message(&self, conversation_id: Uuid, message: NewMessage) -> Result<Message> {
        self.blocking(move |db| db.insert_message(conversation_id, message))
            .await
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        self.blocking(move |db| db.get_messages(conversation_id)).await
    }

    async fn count_messages(&self, conversation_id: Uuid) -> Result<u64> {
        self.blocking(move |db| db.message_count(conversation_id)).await
    }

    async fn delete(&self, id: Uuid) -> Result<u64> {
        self.blocking(move |db| db.delete_conversation(id)).await
    }

    async fn health_check(&self) -> Result<bool> {
        self.blocking(|db| {
            let conn = db.conn.lock();
            let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
            Ok(one == 1)
        })
        .await
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[async_trait]
impl ExecutionLog for ConversationDb {
    async fn create_execution(
        &self,
        conversation_id: Uuid,
        agent_type: &str,
        input: Value,
    ) -> Result<AgentExecution> {
        let agent_type = agent_type.to_string();
        self.blocking(move |db| db.insert_execution(conversation_id, &agent_type, &input))
            .await
    }

    async fn mark_running(&self, execution_id: Uuid) -> Result<()> {
        self.blocking(move |db| db.set_execution_running(execution_id))
            .await
    }

    async fn finish_execution(&self, execution_id: Uuid, outcome: Outcome) -> Result<()> {
        self.blocking(move |db| db.complete_execution(execution_id, &outcome))
            .await
    }

    async fn start_tool(
        &self,
        execution_id: Uuid,
        tool_name: &str,
        input: Value,
    ) -> Result<ToolInvocation> {
        let tool_name = tool_name.to_string();
        self.blocking(move |db| db.insert_tool_invocation(execution_id, &tool_name, &input))
            .await
    }

    async fn finish_tool(&self, invocation_id: Uuid, outcome: Outcome) -> Result<()> {
        self.blocking(move |db| db.complete_tool_invocation(invocation_id, &outcome))
            .await
    }

    async fn list_executions(&self, conversation_id: Uuid) -> Result<Vec<AgentExecution>> {
        self.blocking(move |db| db.get_executions(conversation_id))
            .await
    }
}
