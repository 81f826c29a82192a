mod func_builder;

pub use func_builder::FunctionBuilder;

pub mod test_util {
    use crate::{ir_writer::FuncWriter, Function, Program};

    pub fn dump_func(func: &Function) -> String {
        FuncWriter::new(func).dump_string()
    }

    /// Parses a program from JSON, panicking with the parse error on failure.
    pub fn parse_program(src: &str) -> Program {
        match Program::from_json(src) {
            Ok(program) => program,
            Err(err) => panic!("{err}"),
        }
    }
}
