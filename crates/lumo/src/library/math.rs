//! `math`: numeric functions over floats.

use super::{ret, CallArgs, Exports, Library};
use crate::error::Result;
use crate::value::RawValue;

#[derive(Debug, Default)]
pub struct MathLib;

type Ret = Result<Option<RawValue>>;

macro_rules! unary {
    ($exports:ident, $($name:literal => $f:expr),* $(,)?) => {
        $(
            $exports.func($name, |_, args| {
                let f: fn(f64) -> f64 = $f;
                ret(f(args.num(0)?))
            });
        )*
    };
}

impl Library for MathLib {
    const NAME: &'static str = "math";

    fn register(exports: &mut Exports<Self>) {
        exports
            .func("e", |_, _| ret(std::f64::consts::E))
            .func("pi", |_, _| ret(std::f64::consts::PI));
        unary!(exports,
            "abs" => f64::abs,
            "acos" => f64::acos,
            "acosh" => f64::acosh,
            "asin" => f64::asin,
            "asinh" => f64::asinh,
            "atan" => f64::atan,
        );
        exports.func("atan2", |_, args| ret(args.num(0)?.atan2(args.num(1)?)));
        unary!(exports,
            "atanh" => f64::atanh,
            "cbrt" => f64::cbrt,
            "ceil" => f64::ceil,
        );
        exports.func("clz32", |_, args| ret(to_uint32(args.num(0)?).leading_zeros() as i32));
        unary!(exports,
            "cos" => f64::cos,
            "cosh" => f64::cosh,
            "exp" => f64::exp,
            "expm1" => f64::exp_m1,
            "floor" => f64::floor,
            "fround" => |x| x as f32 as f64,
        );
        exports.func("imul", |_, args| {
            let a = to_uint32(args.num(0)?) as i32;
            let b = to_uint32(args.num(1)?) as i32;
            ret(a.wrapping_mul(b))
        });
        unary!(exports,
            "log" => f64::ln,
            "log10" => f64::log10,
            "log1p" => f64::ln_1p,
            "log2" => f64::log2,
        );
        exports.func("pow", |_, args| ret(args.num(0)?.powf(args.num(1)?)));
        unary!(exports,
            "rad" => f64::to_radians,
            "round" => round_half_up,
            "sign" => sign,
            "sin" => f64::sin,
            "sinh" => f64::sinh,
            "sqrt" => f64::sqrt,
        );
        exports.func("sum_precise", sum_precise);
        unary!(exports,
            "tan" => f64::tan,
            "tanh" => f64::tanh,
            "trunc" => f64::trunc,
        );
    }
}

fn sum_precise(_: &mut MathLib, args: &mut CallArgs<'_>) -> Ret {
    let items = args.opt_num_array(0)?.unwrap_or_default();
    ret(neumaier_sum(&items))
}

/// Wrap to an unsigned 32-bit integer, non-finite values become 0.
fn to_uint32(x: f64) -> u32 {
    if !x.is_finite() {
        return 0;
    }
    x.trunc().rem_euclid(4294967296.0) as u32
}

/// Round to the nearest integer, halves toward positive infinity.
fn round_half_up(x: f64) -> f64 {
    if !x.is_finite() || x.fract() == 0.0 {
        return x;
    }
    (x + 0.5).floor()
}

/// Sign of `x`: zero stays zero, NaN stays NaN.
fn sign(x: f64) -> f64 {
    if x == 0.0 || x.is_nan() {
        x
    } else {
        x.signum()
    }
}

/// Compensated summation.
fn neumaier_sum(items: &[f64]) -> f64 {
    let mut sum = 0.0f64;
    let mut compensation = 0.0f64;
    for &x in items {
        let t = sum + x;
        if sum.abs() >= x.abs() {
            compensation += (sum - t) + x;
        } else {
            compensation += (x - t) + sum;
        }
        sum = t;
    }
    sum + compensation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::descriptor::TypeDescriptor;
    use crate::library::testing::call;
    use crate::library::{Capability, LibraryCell};
    use crate::memory::LinearBuffer;
    use crate::value::Value;

    fn num(lib: &mut LibraryCell<MathLib>, name: &str, args: &[RawValue]) -> f64 {
        let mut mem = LinearBuffer::default();
        call(lib, &mut mem, name, args).unwrap().unwrap().as_f64()
    }

    #[test]
    fn registers_every_function_once() {
        let lib = LibraryCell::new(MathLib).unwrap();
        assert_eq!(lib.function_names().len(), 35);
        assert!(lib.function("f16round").is_none());
    }

    #[test]
    fn constants_and_unary_functions() {
        let mut lib = LibraryCell::new(MathLib).unwrap();
        assert_eq!(num(&mut lib, "pi", &[]), std::f64::consts::PI);
        assert_eq!(num(&mut lib, "sqrt", &[RawValue::F32(16.0)]), 4.0);
        assert_eq!(num(&mut lib, "abs", &[RawValue::I32(-3)]), 3.0);
        assert!((num(&mut lib, "rad", &[RawValue::F64(180.0)]) - std::f64::consts::PI).abs() < 1e-12);
        assert_eq!(num(&mut lib, "atan2", &[RawValue::F64(1.0), RawValue::F64(1.0)]), 1f64.atan2(1.0));
        assert_eq!(num(&mut lib, "pow", &[RawValue::F64(2.0), RawValue::F64(10.0)]), 1024.0);
    }

    #[test]
    fn rounding_follows_half_up() {
        assert_eq!(round_half_up(2.5), 3.0);
        assert_eq!(round_half_up(-2.5), -2.0);
        assert_eq!(round_half_up(-2.6), -3.0);
        assert_eq!(sign(-0.0).to_bits(), (-0.0f64).to_bits());
        assert_eq!(sign(-7.0), -1.0);
    }

    #[test]
    fn integer_functions() {
        let mut lib = LibraryCell::new(MathLib).unwrap();
        let mut mem = LinearBuffer::default();
        assert_eq!(call(&mut lib, &mut mem, "clz32", &[RawValue::F64(1.0)]).unwrap(), Some(RawValue::I32(31)));
        assert_eq!(call(&mut lib, &mut mem, "clz32", &[RawValue::F64(0.0)]).unwrap(), Some(RawValue::I32(32)));
        assert_eq!(
            call(&mut lib, &mut mem, "imul", &[RawValue::F64(4294967295.0), RawValue::F64(5.0)]).unwrap(),
            Some(RawValue::I32(-5))
        );
    }

    #[test]
    fn sum_precise_compensates() {
        let mut lib = LibraryCell::new(MathLib).unwrap();
        let mut mem = LinearBuffer::default();
        let items = Value::from(vec![1.0, 1e8, -1e8]);
        let raw = codec::encode(&mut mem, &TypeDescriptor::array(TypeDescriptor::Num), &items).unwrap();
        let sum = call(&mut lib, &mut mem, "sum_precise", &[raw]).unwrap().unwrap();
        assert_eq!(sum.as_f64(), 1.0);
        assert_eq!(neumaier_sum(&[1e100, 1.0, -1e100]), 1.0);
    }
}
