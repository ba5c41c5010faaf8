//! Transactional persistence for every entity and relation.
//!
//! One SQLite connection behind a mutex is the per-process serialisation
//! point. Multi-row changes that touch the state machine (assign, start,
//! PR-created, complete, release) run inside a single transaction and
//! validate every edge through [`crate::transitions`] before writing, so an
//! external reader never observes a partial transition.

use crate::error::{Result, TaskctlError};
use crate::id::{short, Clock};
use crate::model::{Plan, Project, PullRequest, Slot, Task, TaskDependency};
use crate::transitions;
use crate::types::{Entity, PlanStatus, PrStatus, SlotStatus, TaskStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("schema.sql");

const TASK_COLUMNS: &str = "t.id, t.plan_id, t.title, t.description, t.status, t.level, \
     t.estimated_lines, t.branch_name, \
     (SELECT s.id FROM slots s WHERE s.task_id = t.id) AS slot_id, \
     t.session_id, t.created_at, t.updated_at";

pub struct Store {
    conn: Mutex<Connection>,
    clock: Clock,
}

/// Task fields the planner persistence pass supplies; ids are assigned here.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub estimated_lines: Option<u32>,
    pub level: u32,
}

/// PR fields captured from the forge at creation time.
#[derive(Debug, Clone)]
pub struct NewPullRequest {
    pub number: i64,
    pub url: String,
    pub status: PrStatus,
    pub base_branch: String,
    pub head_branch: String,
}

// ── Row mappers ───────────────────────────────────────────────────────────

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_status<T>(idx: usize, s: String) -> rusqlite::Result<T>
where
    T: FromStr<Err = TaskctlError>,
{
    s.parse().map_err(|e: TaskctlError| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        repo_path: row.get(2)?,
        remote_url: row.get(3)?,
        main_branch: row.get(4)?,
        max_concurrent: row.get(5)?,
        created_at: parse_ts(&row.get::<_, String>(6)?),
        updated_at: parse_ts(&row.get::<_, String>(7)?),
    })
}

fn row_to_plan(row: &rusqlite::Row<'_>) -> rusqlite::Result<Plan> {
    Ok(Plan {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        source_branch: row.get(4)?,
        status: parse_status(5, row.get(5)?)?,
        created_at: parse_ts(&row.get::<_, String>(6)?),
        updated_at: parse_ts(&row.get::<_, String>(7)?),
    })
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        plan_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status: parse_status(4, row.get(4)?)?,
        level: row.get(5)?,
        estimated_lines: row.get(6)?,
        branch_name: row.get(7)?,
        slot_id: row.get(8)?,
        session_id: row.get(9)?,
        created_at: parse_ts(&row.get::<_, String>(10)?),
        updated_at: parse_ts(&row.get::<_, String>(11)?),
    })
}

fn row_to_slot(row: &rusqlite::Row<'_>) -> rusqlite::Result<Slot> {
    Ok(Slot {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        path: row.get(3)?,
        branch: row.get(4)?,
        status: parse_status(5, row.get(5)?)?,
        task_id: row.get(6)?,
        created_at: parse_ts(&row.get::<_, String>(7)?),
        updated_at: parse_ts(&row.get::<_, String>(8)?),
    })
}

fn row_to_pr(row: &rusqlite::Row<'_>) -> rusqlite::Result<PullRequest> {
    Ok(PullRequest {
        id: row.get(0)?,
        task_id: row.get(1)?,
        number: row.get(2)?,
        url: row.get(3)?,
        status: parse_status(4, row.get(4)?)?,
        base_branch: row.get(5)?,
        head_branch: row.get(6)?,
        created_at: parse_ts(&row.get::<_, String>(7)?),
        updated_at: parse_ts(&row.get::<_, String>(8)?),
    })
}

fn not_found(entity: Entity, id: &str) -> TaskctlError {
    TaskctlError::NotFound {
        entity: entity.as_str(),
        id: id.to_string(),
    }
}

impl Store {
    // ── Lifecycle ─────────────────────────────────────────────────────────

    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock: Clock::new(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Projects ──────────────────────────────────────────────────────────

    pub fn create_project(
        &self,
        name: &str,
        repo_path: &str,
        remote_url: Option<&str>,
        main_branch: &str,
        max_concurrent: Option<u32>,
    ) -> Result<Project> {
        let conn = self.lock();
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM projects WHERE repo_path = ?1",
                params![repo_path],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Err(TaskctlError::AlreadyExists {
                entity: Entity::Project.as_str(),
                id,
            });
        }
        let id = self.clock.new_id();
        let now = self.clock.timestamp();
        conn.execute(
            "INSERT INTO projects (id, name, repo_path, remote_url, main_branch, max_concurrent, \
             created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![id, name, repo_path, remote_url, main_branch, max_concurrent, now],
        )?;
        drop(conn);
        self.get_project(&id)
    }

    pub fn get_project(&self, id: &str) -> Result<Project> {
        self.lock()
            .query_row(
                "SELECT id, name, repo_path, remote_url, main_branch, max_concurrent, \
                 created_at, updated_at FROM projects WHERE id = ?1",
                params![id],
                row_to_project,
            )
            .optional()?
            .ok_or_else(|| not_found(Entity::Project, id))
    }

    pub fn get_project_by_path(&self, repo_path: &str) -> Result<Option<Project>> {
        Ok(self
            .lock()
            .query_row(
                "SELECT id, name, repo_path, remote_url, main_branch, max_concurrent, \
                 created_at, updated_at FROM projects WHERE repo_path = ?1",
                params![repo_path],
                row_to_project,
            )
            .optional()?)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, repo_path, remote_url, main_branch, max_concurrent, \
             created_at, updated_at FROM projects ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([], row_to_project)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Cascades to plans (and their tasks, deps, PRs) and slots.
    pub fn delete_project(&self, id: &str) -> Result<()> {
        let n = self
            .lock()
            .execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(not_found(Entity::Project, id));
        }
        Ok(())
    }

    // ── Plans ─────────────────────────────────────────────────────────────

    pub fn create_plan(
        &self,
        project_id: &str,
        title: &str,
        description: Option<&str>,
        source_branch: &str,
    ) -> Result<Plan> {
        let id = self.clock.new_id();
        let now = self.clock.timestamp();
        self.lock().execute(
            "INSERT INTO plans (id, project_id, title, description, source_branch, status, \
             created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, 'draft', ?6, ?6)",
            params![id, project_id, title, description, source_branch, now],
        )?;
        self.get_plan(&id)
    }

    pub fn get_plan(&self, id: &str) -> Result<Plan> {
        self.lock()
            .query_row(
                "SELECT id, project_id, title, description, source_branch, status, \
                 created_at, updated_at FROM plans WHERE id = ?1",
                params![id],
                row_to_plan,
            )
            .optional()?
            .ok_or_else(|| not_found(Entity::Plan, id))
    }

    pub fn list_plans(
        &self,
        project_id: Option<&str>,
        status: Option<PlanStatus>,
    ) -> Result<Vec<Plan>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, title, description, source_branch, status, \
             created_at, updated_at FROM plans \
             WHERE (?1 IS NULL OR project_id = ?1) AND (?2 IS NULL OR status = ?2) \
             ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(
                params![project_id, status.map(PlanStatus::as_str)],
                row_to_plan,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Validated status change; same-status is a no-op.
    pub fn set_plan_status(&self, id: &str, to: PlanStatus) -> Result<Plan> {
        let plan = self.get_plan(id)?;
        if plan.status != to {
            transitions::plan_transition(plan.status, to)?;
            self.lock().execute(
                "UPDATE plans SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![to.as_str(), self.clock.timestamp(), id],
            )?;
        }
        self.get_plan(id)
    }

    /// Cascades to tasks, dependencies, and PRs.
    pub fn delete_plan(&self, id: &str) -> Result<()> {
        let n = self
            .lock()
            .execute("DELETE FROM plans WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(not_found(Entity::Plan, id));
        }
        Ok(())
    }

    // ── Tasks ─────────────────────────────────────────────────────────────

    pub fn get_task(&self, id: &str) -> Result<Task> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE t.id = ?1");
        self.lock()
            .query_row(&sql, params![id], row_to_task)
            .optional()?
            .ok_or_else(|| not_found(Entity::Task, id))
    }

    pub fn list_tasks(
        &self,
        plan_id: Option<&str>,
        status: Option<TaskStatus>,
        level: Option<u32>,
    ) -> Result<Vec<Task>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks t \
             WHERE (?1 IS NULL OR t.plan_id = ?1) \
             AND (?2 IS NULL OR t.status = ?2) \
             AND (?3 IS NULL OR t.level = ?3) \
             ORDER BY t.level ASC, t.id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![plan_id, status.map(TaskStatus::as_str), level],
                row_to_task,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_plan_tasks(&self, plan_id: &str) -> Result<Vec<Task>> {
        self.list_tasks(Some(plan_id), None, None)
    }

    pub fn get_task_by_branch_name(&self, branch: &str) -> Result<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE t.branch_name = ?1");
        Ok(self
            .lock()
            .query_row(&sql, params![branch], row_to_task)
            .optional()?)
    }

    pub fn get_task_by_session_id(&self, session_id: &str) -> Result<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE t.session_id = ?1");
        Ok(self
            .lock()
            .query_row(&sql, params![session_id], row_to_task)
            .optional()?)
    }

    /// Delete one task. Cascades to the dependency edges on either side and
    /// to its PR row. An active task holds a branch and a slot, so it must
    /// be released first.
    pub fn delete_task(&self, id: &str) -> Result<()> {
        let task = self.get_task(id)?;
        if task.status.is_active() {
            return Err(TaskctlError::Invalid(format!(
                "task {} is {} and cannot be removed; release it first",
                short(&task.id),
                task.status
            )));
        }
        self.lock()
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Attach or clear the implementer-session annotation.
    pub fn set_task_session(&self, task_id: &str, session_id: Option<&str>) -> Result<Task> {
        self.get_task(task_id)?;
        self.lock().execute(
            "UPDATE tasks SET session_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![session_id, self.clock.timestamp(), task_id],
        )?;
        self.get_task(task_id)
    }

    // ── Dependencies ──────────────────────────────────────────────────────

    pub fn get_dependencies(&self, task_id: &str) -> Result<Vec<Task>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks t \
             JOIN task_deps d ON d.depends_on_id = t.id \
             WHERE d.task_id = ?1 ORDER BY t.id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![task_id], row_to_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn get_dependents(&self, task_id: &str) -> Result<Vec<Task>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks t \
             JOIN task_deps d ON d.task_id = t.id \
             WHERE d.depends_on_id = ?1 ORDER BY t.id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![task_id], row_to_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_plan_edges(&self, plan_id: &str) -> Result<Vec<TaskDependency>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT d.task_id, d.depends_on_id FROM task_deps d \
             JOIN tasks t ON t.id = d.task_id \
             WHERE t.plan_id = ?1 ORDER BY d.task_id ASC, d.depends_on_id ASC",
        )?;
        let rows = stmt
            .query_map(params![plan_id], |row| {
                Ok(TaskDependency {
                    task_id: row.get(0)?,
                    depends_on_id: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Planner persistence ───────────────────────────────────────────────

    /// Insert a planner result in one transaction: every task (level-0 tasks
    /// start `ready`, the rest `pending`), then every edge. `edges` are
    /// index pairs `(task, depends_on)` into `new_tasks`. Returns inserted
    /// tasks in input order.
    pub fn insert_plan_tasks(
        &self,
        plan_id: &str,
        new_tasks: &[NewTask],
        edges: &[(usize, usize)],
    ) -> Result<Vec<Task>> {
        self.get_plan(plan_id)?;
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(new_tasks.len());
        for task in new_tasks {
            let id = self.clock.new_id();
            let now = self.clock.timestamp();
            let status = if task.level == 0 {
                TaskStatus::Ready
            } else {
                TaskStatus::Pending
            };
            tx.execute(
                "INSERT INTO tasks (id, plan_id, title, description, status, level, \
                 estimated_lines, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    id,
                    plan_id,
                    task.title,
                    task.description,
                    status.as_str(),
                    task.level,
                    task.estimated_lines,
                    now
                ],
            )?;
            ids.push(id);
        }
        for (task_idx, dep_idx) in edges {
            tx.execute(
                "INSERT INTO task_deps (task_id, depends_on_id) VALUES (?1, ?2)",
                params![ids[*task_idx], ids[*dep_idx]],
            )?;
        }
        tx.commit()?;
        drop(conn);

        ids.iter().map(|id| self.get_task(id)).collect()
    }

    // ── Slots ─────────────────────────────────────────────────────────────

    pub fn create_slot(&self, project_id: &str, name: &str, path: &str) -> Result<Slot> {
        let id = self.clock.new_id();
        let now = self.clock.timestamp();
        self.lock().execute(
            "INSERT INTO slots (id, project_id, name, path, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, 'available', ?5, ?5)",
            params![id, project_id, name, path, now],
        )?;
        self.get_slot(&id)
    }

    pub fn get_slot(&self, id: &str) -> Result<Slot> {
        self.lock()
            .query_row(
                "SELECT id, project_id, name, path, branch, status, task_id, \
                 created_at, updated_at FROM slots WHERE id = ?1",
                params![id],
                row_to_slot,
            )
            .optional()?
            .ok_or_else(|| not_found(Entity::Slot, id))
    }

    pub fn list_slots(&self, project_id: &str, status: Option<SlotStatus>) -> Result<Vec<Slot>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, name, path, branch, status, task_id, \
             created_at, updated_at FROM slots \
             WHERE project_id = ?1 AND (?2 IS NULL OR status = ?2) \
             ORDER BY name ASC",
        )?;
        let rows = stmt
            .query_map(params![project_id, status.map(SlotStatus::as_str)], row_to_slot)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn delete_slot(&self, id: &str) -> Result<()> {
        let slot = self.get_slot(id)?;
        if slot.status.is_active() {
            return Err(TaskctlError::Invalid(format!(
                "slot {} is {} and cannot be removed",
                short(&slot.id),
                slot.status
            )));
        }
        self.lock()
            .execute("DELETE FROM slots WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn set_slot_error(&self, id: &str) -> Result<Slot> {
        let slot = self.get_slot(id)?;
        transitions::slot_transition(slot.status, SlotStatus::Error)?;
        self.lock().execute(
            "UPDATE slots SET status = 'error', updated_at = ?1 WHERE id = ?2",
            params![self.clock.timestamp(), id],
        )?;
        self.get_slot(id)
    }

    pub fn reset_slot(&self, id: &str) -> Result<Slot> {
        let slot = self.get_slot(id)?;
        transitions::slot_transition(slot.status, SlotStatus::Available)?;
        self.lock().execute(
            "UPDATE slots SET status = 'available', task_id = NULL, branch = NULL, \
             updated_at = ?1 WHERE id = ?2",
            params![self.clock.timestamp(), id],
        )?;
        self.get_slot(id)
    }

    // ── Pull requests ─────────────────────────────────────────────────────

    pub fn get_pr_by_task(&self, task_id: &str) -> Result<Option<PullRequest>> {
        Ok(self
            .lock()
            .query_row(
                "SELECT id, task_id, number, url, status, base_branch, head_branch, \
                 created_at, updated_at FROM prs WHERE task_id = ?1",
                params![task_id],
                row_to_pr,
            )
            .optional()?)
    }

    pub fn list_plan_prs(&self, plan_id: &str) -> Result<Vec<PullRequest>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT p.id, p.task_id, p.number, p.url, p.status, p.base_branch, p.head_branch, \
             p.created_at, p.updated_at FROM prs p \
             JOIN tasks t ON t.id = p.task_id \
             WHERE t.plan_id = ?1 ORDER BY p.number ASC",
        )?;
        let rows = stmt
            .query_map(params![plan_id], row_to_pr)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── State-machine operations (transactional) ──────────────────────────

    /// Pair a ready task with an available slot: both sides flip to
    /// `assigned` in one transaction, the task records its branch, the slot
    /// records task and branch. Ready gating and branch ownership are
    /// re-checked inside the transaction.
    pub fn assign_task(&self, task_id: &str, slot_id: &str, branch: &str) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let task = tx_get_task(&tx, task_id)?;
        transitions::task_transition(task.status, TaskStatus::Assigned)?;

        let unmet: i64 = tx.query_row(
            "SELECT COUNT(*) FROM task_deps d JOIN tasks x ON x.id = d.depends_on_id \
             WHERE d.task_id = ?1 AND x.status != 'completed'",
            params![task_id],
            |r| r.get(0),
        )?;
        if unmet > 0 {
            let dep: String = tx.query_row(
                "SELECT x.id FROM task_deps d JOIN tasks x ON x.id = d.depends_on_id \
                 WHERE d.task_id = ?1 AND x.status != 'completed' ORDER BY x.id LIMIT 1",
                params![task_id],
                |r| r.get(0),
            )?;
            return Err(TaskctlError::DependencyUnmet {
                task: task_id.to_string(),
                dependency: dep,
            });
        }

        let slot = tx_get_slot(&tx, slot_id)?;
        transitions::slot_transition(slot.status, SlotStatus::Assigned)?;

        let owner: Option<String> = tx
            .query_row(
                "SELECT id FROM tasks WHERE branch_name = ?1 AND id != ?2",
                params![branch, task_id],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(owner) = owner {
            return Err(TaskctlError::Conflict(format!(
                "branch '{branch}' already belongs to task {}",
                short(&owner)
            )));
        }

        let now = self.clock.timestamp();
        tx.execute(
            "UPDATE tasks SET status = 'assigned', branch_name = ?1, updated_at = ?2 WHERE id = ?3",
            params![branch, now, task_id],
        )?;
        tx.execute(
            "UPDATE slots SET status = 'assigned', task_id = ?1, branch = ?2, updated_at = ?3 \
             WHERE id = ?4",
            params![task_id, branch, now, slot_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Task and its slot move `assigned → in_progress` together.
    pub fn start_task(&self, task_id: &str) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let task = tx_get_task(&tx, task_id)?;
        transitions::task_transition(task.status, TaskStatus::InProgress)?;

        let now = self.clock.timestamp();
        if let Some(slot) = tx_slot_of_task(&tx, task_id)? {
            transitions::slot_transition(slot.status, SlotStatus::InProgress)?;
            tx.execute(
                "UPDATE slots SET status = 'in_progress', updated_at = ?1 WHERE id = ?2",
                params![now, slot.id],
            )?;
        }
        tx.execute(
            "UPDATE tasks SET status = 'in_progress', updated_at = ?1 WHERE id = ?2",
            params![now, task_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Record the forge-created PR: task → `pr_created`, slot → `pr_pending`,
    /// PR row inserted — one transaction. The PR's head must equal the
    /// task's branch.
    pub fn mark_task_pr_created(&self, task_id: &str, pr: &NewPullRequest) -> Result<PullRequest> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let task = tx_get_task(&tx, task_id)?;
        transitions::task_transition(task.status, TaskStatus::PrCreated)?;

        if task.branch_name.as_deref() != Some(pr.head_branch.as_str()) {
            return Err(TaskctlError::Invalid(format!(
                "PR head branch '{}' does not match task branch '{}'",
                pr.head_branch,
                task.branch_name.as_deref().unwrap_or("(none)")
            )));
        }

        let now = self.clock.timestamp();
        let pr_id = self.clock.new_id();
        tx.execute(
            "INSERT INTO prs (id, task_id, number, url, status, base_branch, head_branch, \
             created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                pr_id,
                task_id,
                pr.number,
                pr.url,
                pr.status.as_str(),
                pr.base_branch,
                pr.head_branch,
                now
            ],
        )?;
        tx.execute(
            "UPDATE tasks SET status = 'pr_created', updated_at = ?1 WHERE id = ?2",
            params![now, task_id],
        )?;
        if let Some(slot) = tx_slot_of_task(&tx, task_id)? {
            transitions::slot_transition(slot.status, SlotStatus::PrPending)?;
            tx.execute(
                "UPDATE slots SET status = 'pr_pending', updated_at = ?1 WHERE id = ?2",
                params![now, slot.id],
            )?;
        }
        tx.commit()?;
        drop(conn);
        self.get_pr_by_task(task_id)?
            .ok_or_else(|| not_found(Entity::PullRequest, task_id))
    }

    /// Apply a forge-reported PR status. Merging completes the task.
    /// Entering review promotes a `pr_created` task to `in_review`.
    pub fn apply_pr_status(&self, task_id: &str, to: PrStatus) -> Result<()> {
        let pr = self
            .get_pr_by_task(task_id)?
            .ok_or_else(|| not_found(Entity::PullRequest, task_id))?;
        if pr.status != to {
            transitions::pr_transition(pr.status, to)?;
            self.lock().execute(
                "UPDATE prs SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![to.as_str(), self.clock.timestamp(), pr.id],
            )?;
        }
        match to {
            PrStatus::Merged => self.complete_task(task_id, false),
            PrStatus::InReview | PrStatus::Approved => {
                let task = self.get_task(task_id)?;
                if task.status == TaskStatus::PrCreated {
                    self.lock().execute(
                        "UPDATE tasks SET status = 'in_review', updated_at = ?1 WHERE id = ?2",
                        params![self.clock.timestamp(), task_id],
                    )?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Finish a task: status → `completed`, branch cleared, slot freed
    /// (`completed` then immediately `available`), and every dependent whose
    /// dependencies are now all complete is promoted `pending → ready` — all
    /// in one transaction. Without `force` the task must hold a merged PR.
    pub fn complete_task(&self, task_id: &str, force: bool) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let task = tx_get_task(&tx, task_id)?;

        if force {
            transitions::task_force_complete(task.status)?;
        } else {
            transitions::task_transition(task.status, TaskStatus::Completed)?;
            let merged: Option<String> = tx
                .query_row(
                    "SELECT status FROM prs WHERE task_id = ?1",
                    params![task_id],
                    |r| r.get(0),
                )
                .optional()?;
            if merged.as_deref() != Some("merged") {
                return Err(TaskctlError::Invalid(format!(
                    "task {} has no merged PR; use force to override",
                    short(task_id)
                )));
            }
        }

        let now = self.clock.timestamp();
        tx.execute(
            "UPDATE tasks SET status = 'completed', branch_name = NULL, updated_at = ?1 \
             WHERE id = ?2",
            params![now, task_id],
        )?;
        if let Some(slot) = tx_slot_of_task(&tx, task_id)? {
            if !slot.status.is_active() {
                return Err(TaskctlError::InvalidTransition {
                    entity: "slot",
                    from: slot.status.to_string(),
                    to: SlotStatus::Available.to_string(),
                });
            }
            tx.execute(
                "UPDATE slots SET status = 'available', task_id = NULL, branch = NULL, \
                 updated_at = ?1 WHERE id = ?2",
                params![now, slot.id],
            )?;
        }

        // Promote dependents whose last unmet dependency just completed.
        let dependents: Vec<String> = {
            let mut stmt =
                tx.prepare("SELECT task_id FROM task_deps WHERE depends_on_id = ?1")?;
            let rows = stmt
                .query_map(params![task_id], |r| r.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            rows
        };
        for dependent in dependents {
            let unmet: i64 = tx.query_row(
                "SELECT COUNT(*) FROM task_deps d JOIN tasks x ON x.id = d.depends_on_id \
                 WHERE d.task_id = ?1 AND x.status != 'completed'",
                params![dependent],
                |r| r.get(0),
            )?;
            if unmet == 0 {
                tx.execute(
                    "UPDATE tasks SET status = 'ready', updated_at = ?1 \
                     WHERE id = ?2 AND status = 'pending'",
                    params![now, dependent],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Administrative release: an active task returns to the ready pool,
    /// its branch reference is cleared, and its slot is freed.
    pub fn release_task(&self, task_id: &str) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let task = tx_get_task(&tx, task_id)?;
        transitions::task_transition(task.status, TaskStatus::Ready)?;

        let now = self.clock.timestamp();
        tx.execute(
            "UPDATE tasks SET status = 'ready', branch_name = NULL, updated_at = ?1 WHERE id = ?2",
            params![now, task_id],
        )?;
        if let Some(slot) = tx_slot_of_task(&tx, task_id)? {
            transitions::slot_transition(slot.status, SlotStatus::Available)?;
            tx.execute(
                "UPDATE slots SET status = 'available', task_id = NULL, branch = NULL, \
                 updated_at = ?1 WHERE id = ?2",
                params![now, slot.id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn block_task(&self, task_id: &str) -> Result<()> {
        let task = self.get_task(task_id)?;
        transitions::task_transition(task.status, TaskStatus::Blocked)?;
        self.lock().execute(
            "UPDATE tasks SET status = 'blocked', updated_at = ?1 WHERE id = ?2",
            params![self.clock.timestamp(), task_id],
        )?;
        Ok(())
    }

    pub fn unblock_task(&self, task_id: &str) -> Result<()> {
        let task = self.get_task(task_id)?;
        transitions::task_transition(task.status, TaskStatus::Pending)?;
        self.lock().execute(
            "UPDATE tasks SET status = 'pending', updated_at = ?1 WHERE id = ?2",
            params![self.clock.timestamp(), task_id],
        )?;
        Ok(())
    }

    /// Repair partial assignments left by a crash between the git step and
    /// the store step: a slot that references a task which is still
    /// schedulable is re-promoted to `assigned` on both sides. Returns the
    /// repaired task ids.
    pub fn reconcile_assignments(&self, project_id: &str) -> Result<Vec<String>> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let stale: Vec<(String, String, Option<String>)> = {
            let mut stmt = tx.prepare(
                "SELECT s.id, s.task_id, s.branch FROM slots s \
                 JOIN tasks t ON t.id = s.task_id \
                 WHERE s.project_id = ?1 AND t.status IN ('pending', 'ready')",
            )?;
            let rows = stmt
                .query_map(params![project_id], |r| {
                    Ok((r.get(0)?, r.get(1)?, r.get(2)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        let now = self.clock.timestamp();
        let mut repaired = Vec::new();
        for (slot_id, task_id, branch) in stale {
            tx.execute(
                "UPDATE tasks SET status = 'assigned', branch_name = ?1, updated_at = ?2 \
                 WHERE id = ?3",
                params![branch, now, task_id],
            )?;
            tx.execute(
                "UPDATE slots SET status = 'assigned', updated_at = ?1 WHERE id = ?2",
                params![now, slot_id],
            )?;
            repaired.push(task_id);
        }
        tx.commit()?;
        Ok(repaired)
    }

    // ── Prefix lookup ─────────────────────────────────────────────────────

    /// Resolve a (possibly partial) identity to the unique full id.
    pub fn find_by_prefix(&self, entity: Entity, prefix: &str) -> Result<String> {
        if prefix.is_empty() {
            return Err(not_found(entity, prefix));
        }
        let conn = self.lock();
        let sql = format!(
            "SELECT id FROM {} WHERE id LIKE ?1 || '%' ORDER BY id ASC LIMIT 16",
            entity.table()
        );
        let mut stmt = conn.prepare(&sql)?;
        let matches = stmt
            .query_map(params![prefix], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        match matches.len() {
            0 => Err(not_found(entity, prefix)),
            1 => Ok(matches.into_iter().next().expect("one match")),
            _ => Err(TaskctlError::Ambiguous {
                entity: entity.as_str(),
                prefix: prefix.to_string(),
                matches: matches.iter().map(|id| short(id).to_string()).collect(),
            }),
        }
    }
}

// ── Transaction-scoped readers ────────────────────────────────────────────

fn tx_get_task(tx: &Transaction<'_>, id: &str) -> Result<Task> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE t.id = ?1");
    tx.query_row(&sql, params![id], row_to_task)
        .optional()?
        .ok_or_else(|| not_found(Entity::Task, id))
}

fn tx_get_slot(tx: &Transaction<'_>, id: &str) -> Result<Slot> {
    tx.query_row(
        "SELECT id, project_id, name, path, branch, status, task_id, created_at, updated_at \
         FROM slots WHERE id = ?1",
        params![id],
        row_to_slot,
    )
    .optional()?
    .ok_or_else(|| not_found(Entity::Slot, id))
}

fn tx_slot_of_task(tx: &Transaction<'_>, task_id: &str) -> Result<Option<Slot>> {
    Ok(tx
        .query_row(
            "SELECT id, project_id, name, path, branch, status, task_id, created_at, updated_at \
             FROM slots WHERE task_id = ?1",
            params![task_id],
            row_to_slot,
        )
        .optional()?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
