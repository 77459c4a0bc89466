//! Continuation-state frame builder.
//!
//! Every value and stack buffer that must survive a suspend point gets a
//! byte range in one per-function frame. The build runs in strict phases:
//!
//! 1. `prepare_cfg`: check suspend shapes, rematerialize cheap values and
//!    add the loop pre-headers spills may be hoisted to.
//! 2. `build_layout`: rows, per-suspend structs, offsets.
//! 3. `insert_spills_and_reloads`: stores and loads through a placeholder
//!    address.
//! 4. `repair_uses`: uses read the definition or reload reaching them.
//! 5. `materialize`: frame allocation, real addresses, dead code removal.
//!
//! Any error leaves the function half rewritten; callers drop it.

pub mod check;
pub mod config;
pub mod conflict;
pub mod dump;
pub mod error;
pub mod gaps;
pub mod layout;
pub mod materialize;
pub mod repair;
pub mod row;
pub mod spill;
pub mod stats;

pub use config::{BuilderMode, ConfigError, FrameBuilderConfig, InlineStorage};
pub use error::FrameBuildError;
pub use layout::{FrameField, FrameLayout, FrameStruct, LayoutDriver};
pub use materialize::MaterializedFrame;
pub use row::{FrameRow, RowId, RowTable};
pub use stats::FrameStats;

use crate::analysis::{
    Cfg, ConstMaterializable, CrossingOracle, DomTree, LivenessCrossing, LoopInfo,
    Materializable, MarkerLifetime, StackLifetime,
};
use crate::ir::{
    DefTable, Function, IdAllocator, IrTypeCache, SuspendPoint, ValueId, verify_function,
};
use crate::transform::{insert_missing_preheaders, rematerialize};
use spill::SpillContext;

/// Builds the continuation state of one function with the liveness oracle,
/// constant rematerialization and marker-based buffer lifetimes.
pub fn build_cont_state(
    func: &mut Function,
    types: &mut IrTypeCache,
    config: &FrameBuilderConfig,
) -> Result<FrameStats, FrameBuildError> {
    ContStateBuilder::new(func, types, config).run()
}

pub struct ContStateBuilder<'a> {
    func: &'a mut Function,
    types: &'a mut IrTypeCache,
    config: &'a FrameBuilderConfig,
    oracle: &'a dyn CrossingOracle,
    materializable: &'a dyn Materializable,
    lifetime: Option<&'a dyn StackLifetime>,
    ids: IdAllocator,
    suspends: Vec<SuspendPoint>,
    /// Address operand of spills and reloads until the frame exists.
    placeholder: ValueId,
    layout: Option<FrameLayout>,
    frame: Option<MaterializedFrame>,
}

impl<'a> ContStateBuilder<'a> {
    pub fn new(
        func: &'a mut Function,
        types: &'a mut IrTypeCache,
        config: &'a FrameBuilderConfig,
    ) -> Self {
        let mut ids = IdAllocator::for_function(func);
        let placeholder = ids.value();
        let suspends = func.suspends();
        Self {
            func,
            types,
            config,
            oracle: &LivenessCrossing,
            materializable: &ConstMaterializable,
            lifetime: None,
            ids,
            suspends,
            placeholder,
            layout: None,
            frame: None,
        }
    }

    pub fn with_oracle(mut self, oracle: &'a dyn CrossingOracle) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn with_materializable(mut self, materializable: &'a dyn Materializable) -> Self {
        self.materializable = materializable;
        self
    }

    /// Replaces the marker-based lifetime analysis of stack buffers.
    pub fn with_stack_lifetime(mut self, lifetime: &'a dyn StackLifetime) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn layout(&self) -> Option<&FrameLayout> {
        self.layout.as_ref()
    }

    /// The frame allocation, once `materialize` has created one.
    pub fn frame(&self) -> Option<&MaterializedFrame> {
        self.frame.as_ref()
    }

    pub fn suspends(&self) -> &[SuspendPoint] {
        &self.suspends
    }

    pub fn run(mut self) -> Result<FrameStats, FrameBuildError> {
        self.prepare_cfg()?;
        self.build_layout()?;
        self.insert_spills_and_reloads()?;
        self.repair_uses()?;
        self.materialize()
    }

    pub fn prepare_cfg(&mut self) -> Result<(), FrameBuildError> {
        let cfg = Cfg::new(self.func);
        for suspend in &self.suspends {
            check_suspend(self.func, &cfg, suspend)?;
        }

        let cloned = rematerialize(self.func, &mut self.ids, &self.suspends, self.materializable);
        if cloned > 0 {
            log::debug!("{}: rematerialized {} values", self.func.name, cloned);
        }

        // Only spills placed at suspends are hoisted out of loops.
        if self.config.mode.evicts_unused()
            || self.config.mode.spill_timing() == config::SpillTiming::OnSuspend
        {
            let added = insert_missing_preheaders(self.func, &mut self.ids);
            if !added.is_empty() {
                log::debug!("{}: added {} loop pre-headers", self.func.name, added.len());
            }
        }
        self.suspends = self.func.suspends();
        Ok(())
    }

    pub fn build_layout(&mut self) -> Result<&FrameLayout, FrameBuildError> {
        log::debug!(
            "{}: building frame for {} suspends ({})",
            self.func.name,
            self.suspends.len(),
            self.config.mode
        );
        let candidates = self.oracle.candidates(self.func, &self.suspends);
        let defs = DefTable::build(self.func);

        let marker;
        let lifetime: &dyn StackLifetime = match self.lifetime {
            Some(lifetime) => lifetime,
            None => {
                marker = MarkerLifetime::analyze(self.func, &Cfg::new(self.func));
                &marker
            }
        };

        let driver = LayoutDriver::new(self.config.mode, self.config.checks_layout(), Some(lifetime));
        let layout = driver.run(&defs, self.types, &self.suspends, candidates)?;
        Ok(self.layout.insert(layout))
    }

    pub fn insert_spills_and_reloads(&mut self) -> Result<(), FrameBuildError> {
        let layout = self.layout.as_mut().ok_or_else(not_laid_out)?;
        let cfg = Cfg::new(self.func);
        let dom = DomTree::new(&cfg);
        let loops = LoopInfo::new(&cfg, &dom);
        let defs = DefTable::build(self.func);
        let cx = SpillContext {
            cfg: &cfg,
            dom: &dom,
            loops: &loops,
            defs: &defs,
            mode: self.config.mode,
            placeholder: self.placeholder,
        };

        let reloads = spill::insert_reloads(self.func, layout, &mut self.ids, &cx);
        let spills = spill::insert_spills(self.func, layout, &mut self.ids, &cx)?;
        log::debug!(
            "{}: inserted {} spills and {} reloads",
            self.func.name,
            spills,
            reloads
        );
        Ok(())
    }

    pub fn repair_uses(&mut self) -> Result<(), FrameBuildError> {
        let layout = self.layout.as_ref().ok_or_else(not_laid_out)?;
        repair::repair_uses(self.func, layout, &mut self.ids)?;
        Ok(())
    }

    pub fn materialize(&mut self) -> Result<FrameStats, FrameBuildError> {
        let layout = self.layout.as_mut().ok_or_else(not_laid_out)?;
        self.frame =
            materialize::materialize(self.func, self.types, layout, &mut self.ids, self.placeholder)?;

        if self.config.verify_ir {
            verify_function(self.func, self.types)?;
        }

        let stats = FrameStats::collect(self.func, layout, self.config.inline_storage);
        log::debug!("{}: {}", self.func.name, stats);
        if self.config.report_access_counts {
            stats.report_access_counts(&self.func.name);
        }
        Ok(stats)
    }
}

/// A suspend must resume in a block of its own: reached only from the
/// suspending block and taking no arguments.
fn check_suspend(func: &Function, cfg: &Cfg, suspend: &SuspendPoint) -> Result<(), FrameBuildError> {
    let malformed = |reason: &str| FrameBuildError::MalformedSuspend {
        block: suspend.block,
        reason: reason.to_string(),
    };
    if suspend.resume == suspend.block {
        return Err(malformed("resumes into its own block"));
    }
    if cfg.preds(suspend.resume) != [suspend.block] {
        return Err(malformed("resume block has other predecessors"));
    }
    if !func.block(suspend.resume).params.is_empty() {
        return Err(malformed("resume block takes parameters"));
    }
    Ok(())
}

fn not_laid_out() -> FrameBuildError {
    FrameBuildError::InvariantViolation {
        message: "frame layout has not been built".to_string(),
        dump: String::new(),
    }
}

#[cfg(test)]
#[path = "../tests/contstate/t_builder.rs"]
mod tests;
