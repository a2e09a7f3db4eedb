//! Compile-time binding of caller arguments to a declared callee signature.
//!
//! A bare `fn`-pointer type describes the callee: `fn(u32, f64) -> u64` is a
//! two-parameter signature returning a 64-bit integer. The declared parameter
//! types drive argument classification; the caller's values only have to
//! convert into them, so passing `5u8` for a `u32` parameter still produces a
//! 32-bit slot. Arity mismatches and inconvertible arguments fail to compile.

use super::args::CallArg;
use super::result::RetValue;

/// A callee signature described by a `fn`-pointer type.
pub trait Signature {
    /// Declared return type.
    type Ret: RetValue;
    /// Declared parameter count.
    const ARITY: usize;
}

/// Value tuples accepted as the argument pack for the signature `S`.
///
/// Implemented for tuples whose element `i` converts into the declared
/// parameter type at position `i`. Each value is converted to the declared
/// type first and classified afterwards, so the resulting tags reflect the
/// signature rather than the caller's incidental types.
pub trait Args<S: Signature> {
    fn classify(self) -> Vec<CallArg>;
}

macro_rules! signatures {
    ($( $arity:literal => ( $( $param:ident $value:ident $idx:tt ),* ) );* $(;)?) => {$(
        impl<Ret, $($param,)*> Signature for fn($($param,)*) -> Ret
        where
            Ret: RetValue,
            $($param: Into<CallArg>,)*
        {
            type Ret = Ret;
            const ARITY: usize = $arity;
        }

        impl<Ret, $($param, $value,)*> Args<fn($($param,)*) -> Ret> for ($($value,)*)
        where
            Ret: RetValue,
            $($param: Into<CallArg>,)*
            $($value: Into<$param>,)*
        {
            fn classify(self) -> Vec<CallArg> {
                vec![$({
                    let declared: $param = self.$idx.into();
                    declared.into()
                }),*]
            }
        }
    )*};
}

signatures! {
    0 => ();
    1 => (P0 A0 0);
    2 => (P0 A0 0, P1 A1 1);
    3 => (P0 A0 0, P1 A1 1, P2 A2 2);
    4 => (P0 A0 0, P1 A1 1, P2 A2 2, P3 A3 3);
    5 => (P0 A0 0, P1 A1 1, P2 A2 2, P3 A3 3, P4 A4 4);
    6 => (P0 A0 0, P1 A1 1, P2 A2 2, P3 A3 3, P4 A4 4, P5 A5 5);
    7 => (P0 A0 0, P1 A1 1, P2 A2 2, P3 A3 3, P4 A4 4, P5 A5 5, P6 A6 6);
    8 => (P0 A0 0, P1 A1 1, P2 A2 2, P3 A3 3, P4 A4 4, P5 A5 5, P6 A6 6, P7 A7 7);
    9 => (P0 A0 0, P1 A1 1, P2 A2 2, P3 A3 3, P4 A4 4, P5 A5 5, P6 A6 6, P7 A7 7, P8 A8 8);
    10 => (P0 A0 0, P1 A1 1, P2 A2 2, P3 A3 3, P4 A4 4, P5 A5 5, P6 A6 6, P7 A7 7, P8 A8 8, P9 A9 9);
}
