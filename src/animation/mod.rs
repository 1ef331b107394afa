pub mod scheduler;

pub use scheduler::{
    AnimationScheduler, EntryStats, FrameContext, Priority, RateTable, Registration,
    SchedulerHandle,
};
