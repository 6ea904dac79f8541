//! Scheduled tasks and their execution history.
//!
//! Task ids are sequential (`max + 1`) so admins can refer to them by
//! number. Runs are kept most recent first and outlive the task they belong
//! to.

use chrono::Utc;

use super::engine::Store;
use super::error::StoreError;
use super::retention::trim_head;
use super::types::{new_id, next_seq_id, ScheduleRun, ScheduledTask};

impl Store {
    pub fn add_scheduled_task(
        &self,
        name: impl Into<String>,
        command: impl Into<String>,
        schedule: impl Into<String>,
    ) -> ScheduledTask {
        let (name, command, schedule) = (name.into(), command.into(), schedule.into());

        self.update(|doc| {
            let task = ScheduledTask {
                id: next_seq_id(doc.scheduled_tasks.iter().map(|t| t.id)),
                name,
                command,
                schedule,
                enabled: true,
                last_run: None,
                created_at: Utc::now(),
            };
            doc.scheduled_tasks.push(task.clone());
            task
        })
    }

    pub fn scheduled_tasks(&self) -> Vec<ScheduledTask> {
        self.read(|doc| doc.scheduled_tasks.clone())
    }

    pub fn get_scheduled_task(&self, id: u64) -> Option<ScheduledTask> {
        self.read(|doc| doc.scheduled_tasks.iter().find(|t| t.id == id).cloned())
    }

    /// Edit a task in place. The id cannot be changed.
    pub fn update_scheduled_task(
        &self,
        id: u64,
        edit: impl FnOnce(&mut ScheduledTask),
    ) -> Result<ScheduledTask, StoreError> {
        self.try_update(|doc| {
            let task = doc
                .scheduled_tasks
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| StoreError::not_found("Scheduled task", id))?;
            edit(task);
            task.id = id;
            Ok(task.clone())
        })
    }

    pub fn set_task_enabled(&self, id: u64, enabled: bool) -> Result<(), StoreError> {
        self.update_scheduled_task(id, |task| task.enabled = enabled)
            .map(|_| ())
    }

    pub fn delete_scheduled_task(&self, id: u64) -> Result<(), StoreError> {
        self.try_update(|doc| {
            let before = doc.scheduled_tasks.len();
            doc.scheduled_tasks.retain(|t| t.id != id);
            if doc.scheduled_tasks.len() == before {
                return Err(StoreError::not_found("Scheduled task", id));
            }
            Ok(())
        })
    }

    /// Record one execution: stamps the task's `last_run` and prepends a run
    /// to the schedule history.
    pub fn record_task_run(
        &self,
        id: u64,
        success: bool,
        output: Option<String>,
    ) -> Result<ScheduleRun, StoreError> {
        let cap = self.config().retention.schedule_history;

        self.try_update(|doc| {
            let task = doc
                .scheduled_tasks
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| StoreError::not_found("Scheduled task", id))?;

            let now = Utc::now();
            task.last_run = Some(now);
            let run = ScheduleRun {
                id: new_id(),
                task_id: id,
                task_name: task.name.clone(),
                success,
                output,
                created_at: now,
            };

            doc.schedule_history.insert(0, run.clone());
            trim_head(&mut doc.schedule_history, cap);
            Ok(run)
        })
    }

    /// Runs, most recent first, optionally for a single task.
    pub fn schedule_history(&self, task_id: Option<u64>, limit: Option<usize>) -> Vec<ScheduleRun> {
        self.read(|doc| {
            doc.schedule_history
                .iter()
                .filter(|run| task_id.map_or(true, |id| run.task_id == id))
                .take(limit.unwrap_or(usize::MAX))
                .cloned()
                .collect()
        })
    }
}
