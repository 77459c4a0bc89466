//! Analyses consumed by the continuation-state builder.

pub mod cfg;
pub mod crossing;
pub mod dataflow;
pub mod dominance;
pub mod liveness;
pub mod loops;
pub mod stack_lifetime;

pub use cfg::Cfg;
pub use crossing::{
    AllocaCandidate, ConstMaterializable, CrossingOracle, LivenessCrossing, Materializable,
    SuspendCandidates,
};
pub use dominance::DomTree;
pub use loops::{LoopId, LoopInfo};
pub use stack_lifetime::{MarkerLifetime, StackLifetime};
