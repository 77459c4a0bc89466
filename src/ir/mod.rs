//! SSA IR consumed and rewritten by the continuation-state builder.

pub mod builder;
pub mod format;
pub mod layout;
pub mod model;
pub mod types;
pub mod uses;
pub mod verify;

pub use builder::FunctionBuilder;
pub use format::{format_func, format_type};
pub use layout::{IrLayout, LayoutError, align_to};
pub use model::*;
pub use types::{IrStructField, IrTypeCache, IrTypeId, IrTypeInfo, IrTypeKind};
pub use uses::*;
pub use verify::{VerifyIrError, verify_function};
