//! Playback core for a visual-novel style scripted engine.
//!
//! The crate keeps two views of "what is on screen" deliberately separate:
//! the effect registry records which toggled effects are logically active
//! (persistent, replayable, serialized into saves), while the pool registry
//! caches the expensive visual instances behind them (transient, rebuilt on
//! demand, never saved). Commands run either as full playback or as
//! state-only replay over the registry, and a cooperative tick scheduler
//! drives the suspended tasks playback leaves behind.

pub mod command;
pub mod effects;
pub mod error;
pub mod loader;
pub mod pool;
pub mod progress;
pub mod provider;
pub mod save;
pub mod scheduler;
pub mod session;

pub use command::{CommandHandler, ExecutionMode};
pub use effects::EffectRegistry;
pub use error::RuntimeError;
pub use pool::{HandleId, HandleState, PoolRegistry, ResourceKey};
pub use progress::{ProgressAggregator, ProgressSnapshot};
pub use provider::{ConfigProvider, EventBus, ResourceProvider, RuntimeEvent};
pub use save::SaveState;
pub use scheduler::{CancelToken, PlaybackTask, Scheduler, TaskPoll, WaitReason};
pub use session::Session;
