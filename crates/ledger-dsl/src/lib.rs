pub mod ast;
pub mod parser;
pub mod validate;

pub use ast::{AssetRate, AstEntry, TransferAst};
pub use parser::parse_transfer_dsl;
pub use validate::validate_plan;
