//! Weighted aggregation of concurrent load tasks.
//!
//! Any number of loads can be in flight at once; the UI wants a single
//! completion fraction plus "the task to talk about". Tasks live in
//! registration order so primary-task ties resolve the same way every run.

use std::rc::Rc;

use log::warn;
use serde::Serialize;

use crate::error::RuntimeError;
use crate::provider::{EventBus, RuntimeEvent};

#[derive(Debug, Clone)]
pub struct LoadTask {
    id: String,
    display_name: String,
    weight: f32,
    progress: f32,
    completed: bool,
}

impl LoadTask {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn completed(&self) -> bool {
        self.completed
    }
}

/// Derived view over all registered tasks; recomputed on every mutation and
/// pushed to subscribers, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub total_progress: f32,
    pub primary_task: Option<String>,
    pub primary_progress: f32,
    pub active_tasks: usize,
    pub all_completed: bool,
}

pub struct ProgressAggregator {
    tasks: Vec<LoadTask>,
    bus: Option<Rc<dyn EventBus>>,
    announced_all_completed: bool,
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            bus: None,
            announced_all_completed: false,
        }
    }

    pub fn with_bus(bus: Rc<dyn EventBus>) -> Self {
        Self {
            tasks: Vec::new(),
            bus: Some(bus),
            announced_all_completed: false,
        }
    }

    /// Adds a task at zero progress. Returns `false` (and changes nothing)
    /// if the id is already taken; callers that only want to refresh the
    /// label use [`ProgressAggregator::rename_task`] instead.
    pub fn register_task(&mut self, id: &str, display_name: &str, weight: f32) -> bool {
        if self.tasks.iter().any(|task| task.id == id) {
            warn!(
                "{}",
                RuntimeError::DuplicateTaskId { id: id.to_string() }
            );
            return false;
        }
        let weight = if weight > 0.0 {
            weight
        } else {
            warn!("task {id} registered with non-positive weight, using 1");
            1.0
        };
        self.tasks.push(LoadTask {
            id: id.to_string(),
            display_name: display_name.to_string(),
            weight,
            progress: 0.0,
            completed: false,
        });
        // New work re-arms the all-completed announcement.
        self.announced_all_completed = false;
        self.notify();
        true
    }

    pub fn rename_task(&mut self, id: &str, display_name: &str) {
        if let Some(task) = self.tasks.iter_mut().find(|task| task.id == id) {
            task.display_name = display_name.to_string();
            self.notify();
        }
    }

    /// Pushes a new progress value, clamped into `[0, 1]`.
    ///
    /// While a task is incomplete its progress only moves forward; a lower
    /// value is floored at the current fraction. Once a task has reached 1
    /// its `completed` flag latches for good, and from then on a later call
    /// may lower `progress` without un-completing it. Save-menu consumers
    /// key off `completed`, not the raw fraction.
    pub fn update_task_progress(&mut self, id: &str, value: f32) {
        let Some(task) = self.tasks.iter_mut().find(|task| task.id == id) else {
            warn!("progress update for unknown task {id}, ignoring");
            return;
        };
        let value = value.clamp(0.0, 1.0);
        let value = if task.completed {
            value
        } else {
            value.max(task.progress)
        };
        task.progress = value;
        if value >= 1.0 && !task.completed {
            task.completed = true;
        }
        self.notify();
    }

    pub fn complete_task(&mut self, id: &str) {
        self.update_task_progress(id, 1.0);
    }

    pub fn unregister_task(&mut self, id: &str) {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != id);
        if self.tasks.len() != before {
            self.notify();
        }
    }

    pub fn clear(&mut self) {
        let had_tasks = !self.tasks.is_empty();
        self.tasks.clear();
        self.announced_all_completed = false;
        if had_tasks {
            self.notify();
        }
    }

    /// Weighted mean completion over every registered task. An empty
    /// workload is done, so this is `1.0` with nothing registered.
    pub fn total_progress(&self) -> f32 {
        if self.tasks.is_empty() {
            return 1.0;
        }
        let total_weight: f32 = self.tasks.iter().map(|task| task.weight).sum();
        let weighted: f32 = self
            .tasks
            .iter()
            .map(|task| task.progress * task.weight)
            .sum();
        weighted / total_weight
    }

    /// The incomplete task with the highest progress; ties go to the task
    /// registered first so the UI label does not flicker between runs.
    pub fn current_main_task(&self) -> Option<&LoadTask> {
        let mut best: Option<&LoadTask> = None;
        for task in self.tasks.iter().filter(|task| !task.completed) {
            match best {
                Some(current) if task.progress <= current.progress => {}
                _ => best = Some(task),
            }
        }
        best
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let primary = self.current_main_task();
        ProgressSnapshot {
            total_progress: self.total_progress(),
            primary_task: primary.map(|task| task.display_name.clone()),
            primary_progress: primary.map_or(0.0, |task| task.progress),
            active_tasks: self.tasks.iter().filter(|task| !task.completed).count(),
            all_completed: self.tasks.iter().all(|task| task.completed),
        }
    }

    fn notify(&mut self) {
        let snapshot = self.snapshot();
        let finished = snapshot.all_completed && !self.tasks.is_empty();
        if let Some(bus) = self.bus.as_ref() {
            bus.publish(RuntimeEvent::Progress { snapshot });
            if finished && !self.announced_all_completed {
                bus.publish(RuntimeEvent::AllLoadsCompleted);
            }
        }
        if finished {
            self.announced_all_completed = true;
        }
    }
}

impl Default for ProgressAggregator {
    fn default() -> Self {
        Self::new()
    }
}
