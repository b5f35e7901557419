//! Asynchronous resource acquisition, polled once per tick.
//!
//! A load is a ticket that the owning task polls every scheduling point
//! until the provider answers. Loads always finish: success, an explicit
//! not-found, or (when a bound is configured) a timeout that degrades to
//! not-found rather than stalling the task forever. A missing resource is
//! logged and absorbed; it must never abort the session.

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, warn};

use crate::error::RuntimeError;
use crate::pool::ResourceKey;
use crate::progress::ProgressAggregator;
use crate::provider::{LoadPoll, ProviderTicket, ResourceId, ResourceProvider};

/// Final answer for one load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadStatus {
    Pending,
    Ready(ResourceId),
    NotFound,
}

/// One in-flight load. Owned by the task that asked for it.
pub struct LoadTicket {
    key: ResourceKey,
    ticket: ProviderTicket,
    progress_task: Option<String>,
    progress: Option<Rc<RefCell<ProgressAggregator>>>,
    polls: u32,
    settled: bool,
}

impl LoadTicket {
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }
}

/// A ticket dropped before it settled (its owning task was cancelled)
/// completes its progress task on the way out, so an abandoned load can
/// never strand the aggregator below full completion.
impl Drop for LoadTicket {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let (Some(task_id), Some(progress)) =
            (self.progress_task.as_deref(), self.progress.as_ref())
        {
            debug!("load of {} abandoned, completing task {task_id}", self.key);
            progress.borrow_mut().complete_task(task_id);
        }
    }
}

/// Front door to the provider's async loading, with optional progress
/// tracking and an optional per-load timeout.
#[derive(Clone)]
pub struct ResourceLoader {
    provider: Rc<dyn ResourceProvider>,
    progress: Rc<RefCell<ProgressAggregator>>,
    timeout_ticks: Option<u32>,
}

impl ResourceLoader {
    pub fn new(
        provider: Rc<dyn ResourceProvider>,
        progress: Rc<RefCell<ProgressAggregator>>,
    ) -> Self {
        Self {
            provider,
            progress,
            timeout_ticks: None,
        }
    }

    /// Bounds every subsequent load to `ticks` polls; a load still pending
    /// after that resolves as not-found instead of stalling its task.
    pub fn with_timeout(mut self, ticks: u32) -> Self {
        self.timeout_ticks = Some(ticks);
        self
    }

    /// Starts a load with no progress reporting.
    pub fn begin(&self, key: &ResourceKey) -> LoadTicket {
        LoadTicket {
            key: key.clone(),
            ticket: self.provider.begin_load(key),
            progress_task: None,
            progress: None,
            polls: 0,
            settled: false,
        }
    }

    /// Starts a load that feeds the progress aggregator.
    ///
    /// The task id is registered exactly once; asking again with an id that
    /// is already tracked only refreshes its display name. At least one
    /// progress update lands before the load completes.
    pub fn begin_tracked(
        &self,
        key: &ResourceKey,
        task_id: &str,
        display_name: &str,
        weight: f32,
    ) -> LoadTicket {
        let mut progress = self.progress.borrow_mut();
        if !progress.register_task(task_id, display_name, weight) {
            progress.rename_task(task_id, display_name);
        }
        // First observation up front, so subscribers see the task even if
        // the provider answers on the first poll.
        progress.update_task_progress(task_id, 0.0);
        drop(progress);

        LoadTicket {
            key: key.clone(),
            ticket: self.provider.begin_load(key),
            progress_task: Some(task_id.to_string()),
            progress: Some(self.progress.clone()),
            polls: 0,
            settled: false,
        }
    }

    /// One observation of the load; call once per tick from the suspended
    /// task.
    pub fn poll(&self, ticket: &mut LoadTicket) -> LoadStatus {
        if ticket.settled {
            // A settled ticket stays settled; the provider is not consulted
            // again.
            return LoadStatus::NotFound;
        }
        ticket.polls += 1;

        match self.provider.poll_load(&ticket.ticket) {
            LoadPoll::Pending(fraction) => {
                if let Some(task_id) = ticket.progress_task.as_deref() {
                    self.progress
                        .borrow_mut()
                        .update_task_progress(task_id, fraction);
                }
                if let Some(bound) = self.timeout_ticks {
                    if ticket.polls >= bound {
                        warn!(
                            "load of {} still pending after {} ticks, giving up",
                            ticket.key, ticket.polls
                        );
                        self.settle(ticket);
                        return LoadStatus::NotFound;
                    }
                }
                LoadStatus::Pending
            }
            LoadPoll::Ready(resource) => {
                debug!("load of {} ready", ticket.key);
                self.settle(ticket);
                LoadStatus::Ready(resource)
            }
            LoadPoll::NotFound => {
                warn!(
                    "{}",
                    RuntimeError::ResourceNotFound {
                        key: ticket.key.to_string(),
                    }
                );
                self.settle(ticket);
                LoadStatus::NotFound
            }
        }
    }

    fn settle(&self, ticket: &mut LoadTicket) {
        ticket.settled = true;
        if let Some(task_id) = ticket.progress_task.as_deref() {
            self.progress.borrow_mut().complete_task(task_id);
        }
    }
}
