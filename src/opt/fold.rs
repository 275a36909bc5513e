use crate::ir::{BinOp, Op, UnaryOp};

/// Fold an arithmetic operation whose arguments are all literal constants.
/// Arrays, element access and external calls are never folded.
pub fn fold(op: &Op, constants: &[f64]) -> Option<f64> {
    match (op, constants) {
        (Op::Unary(u), [x]) => Some(apply_unary(*u, *x)),
        (Op::Binary(b), [l, r]) => Some(apply_binary(*b, *l, *r)),
        _ => None,
    }
}

pub fn apply_unary(op: UnaryOp, x: f64) -> f64 {
    match op {
        UnaryOp::Neg => -x,
        UnaryOp::Abs => x.abs(),
        UnaryOp::Sign => {
            if x > 0.0 {
                1.0
            } else if x < 0.0 {
                -1.0
            } else {
                0.0
            }
        }
        UnaryOp::Exp => x.exp(),
        UnaryOp::Log => x.ln(),
        UnaryOp::Sqrt => x.sqrt(),
        UnaryOp::Sin => x.sin(),
        UnaryOp::Cos => x.cos(),
        UnaryOp::Tan => x.tan(),
        UnaryOp::Asin => x.asin(),
        UnaryOp::Acos => x.acos(),
        UnaryOp::Atan => x.atan(),
        UnaryOp::Sinh => x.sinh(),
        UnaryOp::Cosh => x.cosh(),
        UnaryOp::Tanh => x.tanh(),
    }
}

pub fn apply_binary(op: BinOp, l: f64, r: f64) -> f64 {
    match op {
        BinOp::Add => l + r,
        BinOp::Sub => l - r,
        BinOp::Mul => l * r,
        BinOp::Div => l / r,
        BinOp::Pow => l.powf(r),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_of_zero_is_zero() {
        assert_eq!(apply_unary(UnaryOp::Sign, 0.0), 0.0);
        assert_eq!(apply_unary(UnaryOp::Sign, -0.0), 0.0);
        assert_eq!(apply_unary(UnaryOp::Sign, -3.5), -1.0);
    }

    #[test]
    fn only_arithmetic_folds() {
        assert_eq!(fold(&Op::Binary(BinOp::Pow), &[2.0, 10.0]), Some(1024.0));
        assert_eq!(fold(&Op::Array, &[1.0, 2.0]), None);
        assert_eq!(fold(&Op::Call("f".into()), &[1.0]), None);
    }
}
