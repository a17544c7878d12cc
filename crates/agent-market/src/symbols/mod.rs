//! Company-name to trading-code resolution

pub mod resolver;
pub mod similarity;
pub mod table;

pub use resolver::{MAPPING_FAILED, SymbolRef, SymbolResolver};
pub use table::{SymbolEntry, SymbolTable};
