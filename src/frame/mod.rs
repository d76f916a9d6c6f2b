pub mod expr;
#[allow(clippy::module_inception)]
pub mod frame;
pub mod join;
pub mod lazy;

pub use expr::{CmpOp, Literal, Predicate};
pub use frame::{Column, Frame, Schema};
pub use join::{JoinCache, JoinHow, JoinManager, JoinStrategy};
pub use lazy::{LazyFrame, Plan};
