//! This module contains the value types of the IR.
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Type {
    Int,
    Bool,
    Float,
    #[serde(rename = "ptr")]
    Ptr(Box<Type>),
}

impl Type {
    pub fn is_integral(&self) -> bool {
        matches!(self, Self::Int)
    }

    pub fn ptr_to(pointee: Type) -> Self {
        Self::Ptr(Box::new(pointee))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, "int"),
            Self::Bool => write!(f, "bool"),
            Self::Float => write!(f, "float"),
            Self::Ptr(pointee) => write!(f, "ptr<{pointee}>"),
        }
    }
}
