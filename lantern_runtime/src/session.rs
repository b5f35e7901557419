//! One running playback session.
//!
//! The session is the explicit context object for one run: constructed
//! once, handed to whoever needs it, and gone when the run ends. Nothing
//! here is a global. It owns the pool, the
//! effect registry, the progress aggregator, the loader, and the scheduler,
//! and it is the only dispatch point for commands.
//!
//! Everything here runs on one logical thread; the shared pieces are
//! `Rc<RefCell<_>>` handles so suspended tasks can reach them between ticks.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use log::{debug, warn};

use crate::command::effect_commands::{
    EffectBurstCommand, EffectClearCommand, EffectOffCommand, EffectOnCommand, ToggleControl,
};
use crate::command::{CommandHandler, ExecutionMode};
use crate::effects::EffectRegistry;
use crate::loader::ResourceLoader;
use crate::pool::{HandleId, PoolRegistry, ResourceKey};
use crate::progress::ProgressAggregator;
use crate::provider::{ConfigProvider, EventBus, ResourceProvider, RuntimeEvent};
use crate::save::SaveState;
use crate::scheduler::Scheduler;

pub struct Session {
    pool: Rc<RefCell<PoolRegistry>>,
    effects: Rc<RefCell<EffectRegistry>>,
    progress: Rc<RefCell<ProgressAggregator>>,
    scheduler: Scheduler,
    loader: ResourceLoader,
    provider: Rc<dyn ResourceProvider>,
    config: Rc<dyn ConfigProvider>,
    bus: Rc<dyn EventBus>,
    commands: BTreeMap<String, Rc<dyn CommandHandler>>,
    toggles: BTreeMap<String, ToggleControl>,
    cursor: usize,
}

impl Session {
    /// Builds a session with the stock effect command set registered.
    pub fn new(
        provider: Rc<dyn ResourceProvider>,
        config: Rc<dyn ConfigProvider>,
        bus: Rc<dyn EventBus>,
    ) -> Self {
        let progress = Rc::new(RefCell::new(ProgressAggregator::with_bus(bus.clone())));
        let loader = ResourceLoader::new(provider.clone(), progress.clone());
        let mut session = Self {
            pool: Rc::new(RefCell::new(PoolRegistry::new())),
            effects: Rc::new(RefCell::new(EffectRegistry::new())),
            progress,
            scheduler: Scheduler::new(),
            loader,
            provider,
            config,
            bus,
            commands: BTreeMap::new(),
            toggles: BTreeMap::new(),
            cursor: 0,
        };
        session.register_command(Rc::new(EffectOnCommand));
        session.register_command(Rc::new(EffectOffCommand::default()));
        session.register_command(Rc::new(EffectBurstCommand::default()));
        session.register_command(Rc::new(EffectClearCommand::default()));
        session
    }

    /// Bounds every load to `ticks` polls (see [`ResourceLoader::with_timeout`]).
    pub fn with_load_timeout(mut self, ticks: u32) -> Self {
        self.loader = self.loader.clone().with_timeout(ticks);
        self
    }

    /// Registers (or replaces) a command handler under its own name.
    pub fn register_command(&mut self, handler: Rc<dyn CommandHandler>) {
        self.commands.insert(handler.name().to_string(), handler);
    }

    /// Routes one command through the chosen path. Returns `false` when the
    /// command is unknown or rejected its arguments; either way nothing has
    /// been mutated in that case.
    pub fn dispatch(&mut self, name: &str, args: &str, mode: ExecutionMode) -> bool {
        let Some(handler) = self.commands.get(name).cloned() else {
            warn!("no handler for command {name}, skipping");
            return false;
        };
        match mode {
            ExecutionMode::Execute => handler.execute(args, self),
            ExecutionMode::Simulate => {
                handler.simulate(args, self);
                true
            }
        }
    }

    /// One scheduling point: advances every suspended task and due
    /// continuation.
    pub fn tick(&mut self) {
        self.scheduler.tick();
    }

    /// Runs a fixed number of ticks; the drain budget after a script ends.
    pub fn run_ticks(&mut self, count: u32) {
        for _ in 0..count {
            self.tick();
        }
    }

    // ---- persistent effect state -------------------------------------

    /// Registry mutation plus broadcast; shared by both execution paths so
    /// they cannot drift apart.
    pub fn activate_effect(&mut self, name: &str) -> bool {
        let newly = self.effects.borrow_mut().activate(name);
        if newly {
            self.bus.publish(RuntimeEvent::EffectActivated {
                name: name.to_string(),
            });
        }
        newly
    }

    pub fn deactivate_effect(&mut self, name: &str) -> bool {
        let removed = self.effects.borrow_mut().deactivate(name);
        if removed {
            self.bus.publish(RuntimeEvent::EffectDeactivated {
                name: name.to_string(),
            });
        } else {
            debug!("deactivate of {name} was a no-op");
        }
        removed
    }

    // ---- pooled resources --------------------------------------------

    pub fn pool_acquire(&mut self, key: &ResourceKey) -> Option<HandleId> {
        self.pool.borrow_mut().acquire(key, self.provider.as_ref())
    }

    pub fn pool_release(&mut self, key: &ResourceKey, handle: HandleId) {
        self.pool
            .borrow_mut()
            .release(key, handle, self.provider.as_ref());
    }

    /// Resolves a logical effect name to its loadable key, falling back to
    /// the name itself when configuration has no entry.
    pub fn resource_key_for(&self, logical_name: &str) -> ResourceKey {
        match self.config.lookup(logical_name) {
            Some(path) => ResourceKey::new(path),
            None => ResourceKey::new(logical_name),
        }
    }

    // ---- save state ---------------------------------------------------

    /// Snapshot of the replayable state: the effect registry and the script
    /// cursor. Pooled visuals are a rebuildable cache and stay out.
    pub fn save_state(&self) -> SaveState {
        SaveState {
            effects: self.effects.borrow().clone(),
            cursor: self.cursor,
        }
    }

    /// Restores a snapshot. The pool is left alone; visuals rebuild on
    /// demand as commands run.
    pub fn restore(&mut self, save: SaveState) {
        *self.effects.borrow_mut() = save.effects;
        self.cursor = save.cursor;
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn set_cursor(&mut self, cursor: usize) {
        self.cursor = cursor;
    }

    pub fn advance_cursor(&mut self) {
        self.cursor += 1;
    }

    /// Session teardown: cancels live toggles, forgets the pool, clears
    /// tracked progress. Persistent effect state is untouched (it belongs
    /// to the save, not to this process).
    pub fn teardown(&mut self) {
        for (_, control) in std::mem::take(&mut self.toggles) {
            control.cancel.cancel();
        }
        self.pool.borrow_mut().clear();
        self.progress.borrow_mut().clear();
    }

    // ---- shared handles ----------------------------------------------

    pub fn pool(&self) -> &Rc<RefCell<PoolRegistry>> {
        &self.pool
    }

    pub fn effects(&self) -> &Rc<RefCell<EffectRegistry>> {
        &self.effects
    }

    pub fn progress(&self) -> &Rc<RefCell<ProgressAggregator>> {
        &self.progress
    }

    pub fn provider(&self) -> &Rc<dyn ResourceProvider> {
        &self.provider
    }

    pub fn loader(&self) -> &ResourceLoader {
        &self.loader
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn bus(&self) -> &Rc<dyn EventBus> {
        &self.bus
    }

    pub(crate) fn track_toggle(&mut self, name: &str, control: ToggleControl) {
        self.toggles.insert(name.to_string(), control);
    }

    pub(crate) fn untrack_toggle(&mut self, name: &str) -> Option<ToggleControl> {
        self.toggles.remove(name)
    }
}
