use tacit_ir::{Literal, Opcode};

/// Evaluates `code` over `args`, where `None` stands for an operand whose value is
/// unknown. Returns `None` if the result can't be known at compile time.
///
/// Integer arithmetic wraps. Division by zero is never folded.
pub(super) fn fold_constant(code: Opcode, args: &[Option<Literal>]) -> Option<Literal> {
    match (code, args) {
        (Opcode::Not, [Some(arg)]) => Some((!arg.as_bool()?).into()),

        // `and` with false and `or` with true don't depend on the other operand.
        (Opcode::And, [lhs, rhs]) => {
            let lhs = lhs.and_then(|lit| lit.as_bool());
            let rhs = rhs.and_then(|lit| lit.as_bool());
            match (lhs, rhs) {
                (Some(false), _) | (_, Some(false)) => Some(false.into()),
                (Some(lhs), Some(rhs)) => Some((lhs && rhs).into()),
                _ => None,
            }
        }
        (Opcode::Or, [lhs, rhs]) => {
            let lhs = lhs.and_then(|lit| lit.as_bool());
            let rhs = rhs.and_then(|lit| lit.as_bool());
            match (lhs, rhs) {
                (Some(true), _) | (_, Some(true)) => Some(true.into()),
                (Some(lhs), Some(rhs)) => Some((lhs || rhs).into()),
                _ => None,
            }
        }

        (code, [Some(lhs), Some(rhs)]) if code.is_arith() => {
            let (lhs, rhs) = (lhs.as_int()?, rhs.as_int()?);
            let value = match code {
                Opcode::Add => lhs.wrapping_add(rhs),
                Opcode::Sub => lhs.wrapping_sub(rhs),
                Opcode::Mul => lhs.wrapping_mul(rhs),
                Opcode::Div => lhs.checked_div(rhs)?,
                _ => return None,
            };
            Some(value.into())
        }

        (code, [Some(lhs), Some(rhs)]) if code.is_cmp() => fold_cmp(code, *lhs, *rhs).map(Into::into),

        _ => None,
    }
}

fn fold_cmp(code: Opcode, lhs: Literal, rhs: Literal) -> Option<bool> {
    match (lhs, rhs) {
        (Literal::Int(lhs), Literal::Int(rhs)) => Some(match code {
            Opcode::Eq => lhs == rhs,
            Opcode::Ne => lhs != rhs,
            Opcode::Lt => lhs < rhs,
            Opcode::Le => lhs <= rhs,
            Opcode::Gt => lhs > rhs,
            Opcode::Ge => lhs >= rhs,
            _ => return None,
        }),
        (Literal::Bool(lhs), Literal::Bool(rhs)) => match code {
            Opcode::Eq => Some(lhs == rhs),
            Opcode::Ne => Some(lhs != rhs),
            _ => None,
        },
        _ => None,
    }
}

/// Folds a comparison of a value with itself. Only sound for integers and booleans.
pub(super) fn fold_self_cmp(code: Opcode) -> Option<Literal> {
    match code {
        Opcode::Eq | Opcode::Le | Opcode::Ge => Some(true.into()),
        Opcode::Ne | Opcode::Lt | Opcode::Gt => Some(false.into()),
        _ => None,
    }
}
