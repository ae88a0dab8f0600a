//! Reloadable node modules loaded from files on disk.

pub mod expression;

pub use expression::{ExpressionModule, ModuleFile, NodeDef};
