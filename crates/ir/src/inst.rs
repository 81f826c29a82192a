//! Instructions of the three-address-code IR.
//!
//! A function body is a flat list of [`Instruction`]s. Labels are markers that
//! start a new basic block; everything else is an [`Operation`].
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Literal, Type};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Instruction {
    Label { label: String },
    Operation(Operation),
}

impl Instruction {
    pub fn label(name: impl Into<String>) -> Self {
        Self::Label { label: name.into() }
    }

    pub fn as_label(&self) -> Option<&str> {
        match self {
            Self::Label { label } => Some(label),
            Self::Operation(_) => None,
        }
    }

    pub fn as_operation(&self) -> Option<&Operation> {
        match self {
            Self::Operation(op) => Some(op),
            Self::Label { .. } => None,
        }
    }

    pub fn as_operation_mut(&mut self) -> Option<&mut Operation> {
        match self {
            Self::Operation(op) => Some(op),
            Self::Label { .. } => None,
        }
    }
}

impl From<Operation> for Instruction {
    fn from(op: Operation) -> Self {
        Self::Operation(op)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Operation {
    pub op: Opcode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<Type>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Literal>,
    /// Branch targets. `[target]` for `jmp`, `[false_target, true_target]` for `br`.
    /// For `phi`, the incoming block of each argument.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub funcs: Vec<String>,
}

impl Operation {
    pub fn new(op: Opcode) -> Self {
        Self {
            op,
            dest: None,
            ty: None,
            args: Vec::new(),
            value: None,
            labels: Vec::new(),
            funcs: Vec::new(),
        }
    }

    pub fn with_dest(mut self, dest: impl Into<String>, ty: Type) -> Self {
        self.dest = Some(dest.into());
        self.ty = Some(ty);
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_value(mut self, value: impl Into<Literal>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_funcs<I, S>(mut self, funcs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.funcs = funcs.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_terminator(&self) -> bool {
        self.op.is_terminator()
    }

    pub fn is_phi(&self) -> bool {
        self.op == Opcode::Phi
    }

    /// Returns the branch destinations of a `jmp` or `br`. Empty for everything else.
    pub fn branch_dests(&self) -> &[String] {
        match self.op {
            Opcode::Jmp | Opcode::Br => &self.labels,
            _ => &[],
        }
    }

    /// Returns `(arg, incoming_label)` pairs of a phi.
    pub fn phi_incomings(&self) -> impl Iterator<Item = (&str, &str)> {
        debug_assert!(self.is_phi());
        self.args
            .iter()
            .zip(self.labels.iter())
            .map(|(arg, label)| (arg.as_str(), label.as_str()))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Opcode {
    // Arithmetic.
    Add,
    Sub,
    Mul,
    Div,
    // Comparison.
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logic.
    And,
    Or,
    Not,
    // Control flow.
    Jmp,
    Br,
    Ret,
    // Data.
    Const,
    Id,
    Phi,
    // Effects.
    Call,
    Print,
    Nop,
}

impl Opcode {
    pub fn is_terminator(self) -> bool {
        matches!(self, Self::Jmp | Self::Br | Self::Ret)
    }

    pub fn is_arith(self) -> bool {
        matches!(self, Self::Add | Self::Sub | Self::Mul | Self::Div)
    }

    pub fn is_cmp(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }

    pub fn is_logic(self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Not)
    }

    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Mul | Self::Eq | Self::Ne | Self::And | Self::Or
        )
    }

    /// Returns `true` if the operation only computes its destination.
    /// Such operations can be removed when the destination is dead.
    pub fn is_pure(self) -> bool {
        self.is_arith()
            || self.is_cmp()
            || self.is_logic()
            || matches!(self, Self::Const | Self::Id | Self::Phi)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
            Self::Jmp => "jmp",
            Self::Br => "br",
            Self::Ret => "ret",
            Self::Const => "const",
            Self::Id => "id",
            Self::Phi => "phi",
            Self::Call => "call",
            Self::Print => "print",
            Self::Nop => "nop",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_and_operation_are_distinguished() {
        let insts: Vec<Instruction> = serde_json::from_str(
            r#"[
                {"label": "loop"},
                {"op": "br", "args": ["c"], "labels": ["exit", "loop"]},
                {"op": "const", "dest": "x", "type": "int", "value": 4}
            ]"#,
        )
        .unwrap();

        assert_eq!(insts[0].as_label(), Some("loop"));

        let br = insts[1].as_operation().unwrap();
        assert_eq!(br.op, Opcode::Br);
        assert_eq!(br.branch_dests(), ["exit", "loop"]);
        assert!(br.is_terminator());

        let cst = insts[2].as_operation().unwrap();
        assert_eq!(cst.value, Some(Literal::Int(4)));
        assert_eq!(cst.ty, Some(Type::Int));
    }

    #[test]
    fn empty_fields_are_not_serialized() {
        let op = Operation::new(Opcode::Ret);
        assert_eq!(serde_json::to_string(&op).unwrap(), r#"{"op":"ret"}"#);
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        assert!(serde_json::from_str::<Instruction>(r#"{"op": "frobnicate"}"#).is_err());
    }
}
