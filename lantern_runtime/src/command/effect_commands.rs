//! The spatial effect command family.
//!
//! `effect_on` / `effect_off` drive toggled looping effects (weather, ambient
//! animations); `effect_burst` fires a one-shot effect that waits out its own
//! animation; `effect_clear` tears down every active toggle at once.
//!
//! All of them mutate the effect registry first and unconditionally, before
//! any resource work, so the state-only path stays equivalent to full
//! playback even when a load fails. Visual teardown always goes through a
//! grace-period continuation so a fade-out has time to play.

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, warn};

use crate::loader::{LoadStatus, LoadTicket, ResourceLoader};
use crate::pool::{HandleId, PoolRegistry, ResourceKey};
use crate::provider::{ResourceId, ResourceProvider};
use crate::scheduler::{CancelToken, PlaybackTask, TaskPoll, WaitReason};
use crate::session::Session;

use super::position::{resolve_position, Position};
use super::{parse_effect_args, reject, CommandHandler};

/// Scene layer spatial effects are placed under.
pub const EFFECT_LAYER: &str = "effects";

/// Where a toggled effect's pooled handle ends up once its load lands.
/// Shared between the playback task (which fills it) and the deactivate path
/// (which schedules its release).
#[derive(Debug)]
pub struct ToggleSlot {
    pub key: ResourceKey,
    pub handle: Option<HandleId>,
}

/// Deactivation handle for one live toggled effect.
pub struct ToggleControl {
    pub cancel: CancelToken,
    pub slot: Rc<RefCell<ToggleSlot>>,
}

/// Builds the grace-period continuation that returns a toggle's handle to
/// its bucket. Deactivation may run before the load has landed, so the slot
/// is read at fire time, not at schedule time.
pub(crate) fn release_slot_later(
    pool: Rc<RefCell<PoolRegistry>>,
    provider: Rc<dyn ResourceProvider>,
    slot: Rc<RefCell<ToggleSlot>>,
) -> Box<dyn FnOnce()> {
    Box::new(move || {
        let slot = slot.borrow();
        if let Some(handle) = slot.handle {
            pool.borrow_mut().release(&slot.key, handle, provider.as_ref());
        }
    })
}

enum TogglePhase {
    Loading(LoadTicket),
    Looping,
}

/// Keeps a toggled effect alive until it is cancelled: finishes the load if
/// one is needed, places the visual, then idles at the signal suspension
/// point for as long as the effect stays on.
pub struct ToggleEffectTask {
    effect: String,
    key: ResourceKey,
    position: Position,
    phase: TogglePhase,
    slot: Rc<RefCell<ToggleSlot>>,
    loader: ResourceLoader,
    pool: Rc<RefCell<PoolRegistry>>,
    provider: Rc<dyn ResourceProvider>,
}

impl PlaybackTask for ToggleEffectTask {
    fn name(&self) -> &str {
        &self.effect
    }

    fn step(&mut self) -> TaskPoll {
        match &mut self.phase {
            TogglePhase::Loading(ticket) => match self.loader.poll(ticket) {
                LoadStatus::Pending => TaskPoll::Pending(WaitReason::Load),
                LoadStatus::NotFound => {
                    // Visual portion aborts; the registry entry stays, by
                    // contract with the state-only path.
                    warn!("effect {} has no visual, task ending", self.effect);
                    TaskPoll::Complete
                }
                LoadStatus::Ready(resource) => {
                    let handle = self.pool.borrow_mut().insert(&self.key, resource);
                    self.provider.place_under_layer(resource, EFFECT_LAYER);
                    self.provider.show(resource, self.position);
                    self.slot.borrow_mut().handle = Some(handle);
                    self.phase = TogglePhase::Looping;
                    TaskPoll::Pending(WaitReason::Signal)
                }
            },
            TogglePhase::Looping => TaskPoll::Pending(WaitReason::Signal),
        }
    }
}

enum BurstPhase {
    Loading(LoadTicket),
    Playing {
        resource: ResourceId,
        handle: HandleId,
    },
}

/// One-shot effect: load or reuse a pooled instance, play it, wait for the
/// externally reported animation length, then drop the transient marker and
/// hand the visual back after a grace period.
pub struct BurstEffectTask {
    effect: String,
    key: ResourceKey,
    position: Position,
    phase: BurstPhase,
    grace_ticks: u32,
    loader: ResourceLoader,
    pool: Rc<RefCell<PoolRegistry>>,
    provider: Rc<dyn ResourceProvider>,
    effects: Rc<RefCell<crate::effects::EffectRegistry>>,
}

impl PlaybackTask for BurstEffectTask {
    fn name(&self) -> &str {
        &self.effect
    }

    fn step(&mut self) -> TaskPoll {
        match &mut self.phase {
            BurstPhase::Loading(ticket) => match self.loader.poll(ticket) {
                LoadStatus::Pending => TaskPoll::Pending(WaitReason::Load),
                LoadStatus::NotFound => {
                    warn!("burst {} has no visual, dropping marker", self.effect);
                    self.effects.borrow_mut().pop_transient(&self.effect);
                    TaskPoll::Complete
                }
                LoadStatus::Ready(resource) => {
                    let handle = self.pool.borrow_mut().insert(&self.key, resource);
                    self.provider.place_under_layer(resource, EFFECT_LAYER);
                    self.provider.show(resource, self.position);
                    self.phase = BurstPhase::Playing { resource, handle };
                    TaskPoll::Pending(WaitReason::Signal)
                }
            },
            BurstPhase::Playing { resource, handle } => {
                if !self.provider.animation_finished(*resource) {
                    return TaskPoll::Pending(WaitReason::Signal);
                }
                // Marker drops the moment the animation lands; only the
                // visual release waits out the grace period.
                self.effects.borrow_mut().pop_transient(&self.effect);
                let pool = self.pool.clone();
                let provider = self.provider.clone();
                let key = self.key.clone();
                let handle = *handle;
                TaskPoll::CompleteAfter {
                    grace_ticks: self.grace_ticks,
                    release: Box::new(move || {
                        pool.borrow_mut().release(&key, handle, provider.as_ref());
                    }),
                }
            }
        }
    }
}

/// Turns a toggled looping effect on.
pub struct EffectOnCommand;

impl CommandHandler for EffectOnCommand {
    fn name(&self) -> &str {
        "effect_on"
    }

    fn execute(&self, args: &str, session: &mut Session) -> bool {
        let Some(parsed) = parse_effect_args(args) else {
            return reject(self.name(), args);
        };
        // Persistent state first; everything after this line is visual.
        if !session.activate_effect(&parsed.name) {
            debug!("effect {} already on, confirming only", parsed.name);
            return true;
        }

        let key = session.resource_key_for(&parsed.name);
        let position = resolve_position(&parsed.position, session.provider().as_ref());
        let slot = Rc::new(RefCell::new(ToggleSlot {
            key: key.clone(),
            handle: None,
        }));
        let cancel = CancelToken::new();

        let pooled = session
            .pool()
            .borrow_mut()
            .acquire(&key, session.provider().as_ref());
        let phase = match pooled {
            Some(handle) => {
                if let Some(resource) = session.pool().borrow().resource_for(&key, handle) {
                    session.provider().show(resource, position);
                }
                slot.borrow_mut().handle = Some(handle);
                TogglePhase::Looping
            }
            None => {
                let ticket = session.loader().begin_tracked(
                    &key,
                    &format!("effect:{}", parsed.name),
                    &parsed.name,
                    1.0,
                );
                TogglePhase::Loading(ticket)
            }
        };

        let task = ToggleEffectTask {
            effect: parsed.name.clone(),
            key,
            position,
            phase,
            slot: slot.clone(),
            loader: session.loader().clone(),
            pool: session.pool().clone(),
            provider: session.provider().clone(),
        };
        session.track_toggle(
            &parsed.name,
            ToggleControl {
                cancel: cancel.clone(),
                slot,
            },
        );
        session.scheduler_mut().spawn(Box::new(task), cancel);
        true
    }

    fn simulate(&self, args: &str, session: &mut Session) {
        if let Some(parsed) = parse_effect_args(args) {
            session.activate_effect(&parsed.name);
        }
    }
}

/// Turns a toggled effect off: registry entry and task go synchronously,
/// the pooled handle goes back after the grace period.
pub struct EffectOffCommand {
    pub grace_ticks: u32,
}

impl Default for EffectOffCommand {
    fn default() -> Self {
        Self { grace_ticks: 10 }
    }
}

impl CommandHandler for EffectOffCommand {
    fn name(&self) -> &str {
        "effect_off"
    }

    fn execute(&self, args: &str, session: &mut Session) -> bool {
        let Some(name) = parse_effect_name(args) else {
            return reject(self.name(), args);
        };
        session.deactivate_effect(&name);
        if let Some(control) = session.untrack_toggle(&name) {
            control.cancel.cancel();
            let release = release_slot_later(
                session.pool().clone(),
                session.provider().clone(),
                control.slot,
            );
            session.scheduler_mut().after_ticks(self.grace_ticks, release);
        }
        true
    }

    fn simulate(&self, args: &str, session: &mut Session) {
        if let Some(name) = parse_effect_name(args) {
            session.deactivate_effect(&name);
        }
    }
}

/// Fires a one-shot spatial effect.
pub struct EffectBurstCommand {
    pub grace_ticks: u32,
}

impl Default for EffectBurstCommand {
    fn default() -> Self {
        Self { grace_ticks: 5 }
    }
}

impl CommandHandler for EffectBurstCommand {
    fn name(&self) -> &str {
        "effect_burst"
    }

    fn execute(&self, args: &str, session: &mut Session) -> bool {
        let Some(parsed) = parse_effect_args(args) else {
            return reject(self.name(), args);
        };
        // Transient marker rides along with the burst so a save taken
        // mid-flight replays it; it is gone once the animation lands.
        session.effects().borrow_mut().push_transient(&parsed.name);

        let key = session.resource_key_for(&parsed.name);
        let position = resolve_position(&parsed.position, session.provider().as_ref());
        let pooled = session
            .pool()
            .borrow_mut()
            .acquire(&key, session.provider().as_ref());
        let phase = match pooled {
            Some(handle) => {
                let resource = session.pool().borrow().resource_for(&key, handle);
                match resource {
                    Some(resource) => {
                        session.provider().show(resource, position);
                        BurstPhase::Playing { resource, handle }
                    }
                    None => {
                        // Bucket lost the entry between acquire and lookup;
                        // fall back to a fresh load.
                        let ticket = session.loader().begin_tracked(
                            &key,
                            &format!("burst:{}", parsed.name),
                            &parsed.name,
                            1.0,
                        );
                        BurstPhase::Loading(ticket)
                    }
                }
            }
            None => {
                let ticket = session.loader().begin_tracked(
                    &key,
                    &format!("burst:{}", parsed.name),
                    &parsed.name,
                    1.0,
                );
                BurstPhase::Loading(ticket)
            }
        };

        let task = BurstEffectTask {
            effect: parsed.name,
            key,
            position,
            phase,
            grace_ticks: self.grace_ticks,
            loader: session.loader().clone(),
            pool: session.pool().clone(),
            provider: session.provider().clone(),
            effects: session.effects().clone(),
        };
        session.scheduler_mut().spawn(Box::new(task), CancelToken::new());
        true
    }

    fn simulate(&self, args: &str, _session: &mut Session) {
        // A burst's registry footprint is net zero once it lands, so the
        // state-only path applies nothing; parsing still gates on validity.
        let _ = parse_effect_args(args);
    }
}

/// Stops every active toggled effect (scene-change cleanup).
pub struct EffectClearCommand {
    pub grace_ticks: u32,
}

impl Default for EffectClearCommand {
    fn default() -> Self {
        Self { grace_ticks: 10 }
    }
}

impl CommandHandler for EffectClearCommand {
    fn name(&self) -> &str {
        "effect_clear"
    }

    fn execute(&self, _args: &str, session: &mut Session) -> bool {
        let names = session.effects().borrow().toggled_names();
        for name in names {
            session.deactivate_effect(&name);
            if let Some(control) = session.untrack_toggle(&name) {
                control.cancel.cancel();
                let release = release_slot_later(
                    session.pool().clone(),
                    session.provider().clone(),
                    control.slot,
                );
                session.scheduler_mut().after_ticks(self.grace_ticks, release);
            }
        }
        true
    }

    fn simulate(&self, _args: &str, session: &mut Session) {
        let names = session.effects().borrow().toggled_names();
        for name in names {
            session.deactivate_effect(&name);
        }
    }
}

/// Reads the effect name off an argument string, tolerating stray trailing
/// fields.
fn parse_effect_name(raw: &str) -> Option<String> {
    let stripped: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let name = stripped.split(',').next().unwrap_or("");
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_name_parser_takes_the_first_field() {
        assert_eq!(parse_effect_name(" Snow , fade "), Some("Snow".to_string()));
        assert_eq!(parse_effect_name("Snow"), Some("Snow".to_string()));
        assert_eq!(parse_effect_name(""), None);
        assert_eq!(parse_effect_name(",x"), None);
    }
}
