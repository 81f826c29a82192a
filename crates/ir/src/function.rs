use serde::{Deserialize, Serialize};

use crate::{Instruction, Operation, Type};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Argument>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub ret_ty: Option<Type>,
    #[serde(default)]
    pub instrs: Vec<Instruction>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            ret_ty: None,
            instrs: Vec::new(),
        }
    }

    /// Iterates over all non-label instructions in program order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.instrs.iter().filter_map(Instruction::as_operation)
    }

    pub fn operations_mut(&mut self) -> impl Iterator<Item = &mut Operation> {
        self.instrs.iter_mut().filter_map(Instruction::as_operation_mut)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.instrs.iter().filter_map(Instruction::as_label)
    }

    pub fn has_phi(&self) -> bool {
        self.operations().any(Operation::is_phi)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
}

impl Argument {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}
