//! Continuation-state frame builder.
//!
//! Assigns storage in a per-function coroutine frame to every value and stack
//! buffer that must survive a suspend point, then rewrites the function to
//! spill into and reload from that frame. See [`contstate::build_cont_state`].

pub mod analysis;
pub mod contstate;
pub mod ir;
pub mod transform;
