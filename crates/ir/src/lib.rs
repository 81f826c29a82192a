pub mod builder;
pub mod cfg;
pub mod error;
pub mod function;
pub mod inst;
pub mod ir_writer;
pub mod module;
pub mod types;
pub mod value;

pub use cfg::{split_function, BasicBlock, BlockId, CfgConfig, ControlFlowGraph};
pub use error::{ErrorKind, IrError};
pub use function::{Argument, Function};
pub use inst::{Instruction, Opcode, Operation};
pub use module::Program;
pub use types::Type;
pub use value::{Literal, LiteralKey};
