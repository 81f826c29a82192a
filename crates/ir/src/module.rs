use serde::{Deserialize, Serialize};

use crate::{error::IrError, Function};

/// A whole program: an ordered list of independent functions.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub functions: Vec<Function>,
}

impl Program {
    pub fn new(functions: Vec<Function>) -> Self {
        Self { functions }
    }

    /// Parses a program from its JSON form.
    pub fn from_json(s: &str) -> Result<Self, IrError> {
        serde_json::from_str(s).map_err(IrError::Json)
    }

    pub fn from_reader(r: impl std::io::Read) -> Result<Self, IrError> {
        serde_json::from_reader(r).map_err(IrError::Json)
    }

    pub fn to_json(&self) -> String {
        // Serializing plain data with string keys can't fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|func| func.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|func| func.name == name)
    }
}
