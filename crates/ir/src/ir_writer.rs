//! Textual form of the IR.
//!
//! ```text
//! @main(n: int): int {
//! .entry:
//!   one: int = const 1;
//!   m: int = add n one;
//!   ret m;
//! }
//! ```
use std::{fmt, io};

use crate::{Function, Instruction, Operation, Program};

pub struct ProgramWriter<'a> {
    program: &'a Program,
}

impl<'a> ProgramWriter<'a> {
    pub fn new(program: &'a Program) -> Self {
        Self { program }
    }

    pub fn write(&self, mut w: impl io::Write) -> io::Result<()> {
        write!(w, "{self}")
    }

    pub fn dump_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ProgramWriter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, func) in self.program.functions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            FuncWriter::new(func).fmt(f)?;
        }
        Ok(())
    }
}

pub struct FuncWriter<'a> {
    func: &'a Function,
}

impl<'a> FuncWriter<'a> {
    pub fn new(func: &'a Function) -> Self {
        Self { func }
    }

    pub fn write(&self, mut w: impl io::Write) -> io::Result<()> {
        write!(w, "{self}")
    }

    pub fn dump_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FuncWriter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let func = self.func;
        write!(f, "@{}", func.name)?;
        if !func.args.is_empty() {
            f.write_str("(")?;
            for (i, arg) in func.args.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}: {}", arg.name, arg.ty)?;
            }
            f.write_str(")")?;
        }
        if let Some(ty) = &func.ret_ty {
            write!(f, ": {ty}")?;
        }
        writeln!(f, " {{")?;

        for inst in &func.instrs {
            match inst {
                Instruction::Label { label } => writeln!(f, ".{label}:")?,
                Instruction::Operation(op) => writeln!(f, "  {};", DisplayOperation(op))?,
            }
        }

        writeln!(f, "}}")
    }
}

pub struct DisplayOperation<'a>(pub &'a Operation);

impl fmt::Display for DisplayOperation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.0;
        if let Some(dest) = &op.dest {
            write!(f, "{dest}")?;
            if let Some(ty) = &op.ty {
                write!(f, ": {ty}")?;
            }
            f.write_str(" = ")?;
        }

        write!(f, "{}", op.op)?;
        if let Some(value) = &op.value {
            write!(f, " {value}")?;
        }
        for func in &op.funcs {
            write!(f, " @{func}")?;
        }
        for arg in &op.args {
            write!(f, " {arg}")?;
        }
        for label in &op.labels {
            write!(f, " .{label}")?;
        }
        Ok(())
    }
}
