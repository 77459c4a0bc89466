//! IR rewrites the continuation-state builder relies on.

pub mod preheader;
pub mod remat;
pub mod ssa_update;

pub use preheader::insert_missing_preheaders;
pub use remat::rematerialize;
pub use ssa_update::SsaUpdater;
