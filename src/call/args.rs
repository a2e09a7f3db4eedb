//! Tagged argument values handed to the stub emitters.

/// A single remote-call argument.
///
/// The variant is fixed when the value is converted and never changes
/// afterwards; the emitters route arguments purely by tag. Pointers classify
/// as integers of machine pointer width, so a pointer built on a 64-bit host
/// lands in [`CallArg::I64`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CallArg {
    /// 32-bit integer slot. Narrower host integers are zero- or sign-extended
    /// into 32 bits according to their signedness.
    I32(u32),
    /// 64-bit integer slot.
    I64(u64),
    /// Single-precision float.
    F32(f32),
    /// Double-precision float.
    F64(f64),
}

impl CallArg {
    /// The raw 64-bit payload, for emitters that load every argument through
    /// a 64-bit immediate. Integer slots are zero-extended, floats contribute
    /// their bit pattern.
    pub(crate) fn bits64(&self) -> u64 {
        match *self {
            CallArg::I32(value) => u64::from(value),
            CallArg::I64(value) => value,
            CallArg::F32(value) => u64::from(value.to_bits()),
            CallArg::F64(value) => value.to_bits(),
        }
    }
}

// `as u32` sign-extends signed sources and zero-extends unsigned ones, which
// is exactly the slot encoding the callee expects for narrow operands.
macro_rules! narrow_int_arg {
    ($($ty:ty),*) => {$(
        impl From<$ty> for CallArg {
            fn from(value: $ty) -> Self {
                CallArg::I32(value as u32)
            }
        }
    )*};
}

macro_rules! wide_int_arg {
    ($($ty:ty),*) => {$(
        impl From<$ty> for CallArg {
            fn from(value: $ty) -> Self {
                CallArg::I64(value as u64)
            }
        }
    )*};
}

narrow_int_arg!(i8, u8, i16, u16, i32, u32);
wide_int_arg!(i64, u64);

#[cfg(target_pointer_width = "64")]
wide_int_arg!(isize, usize);
#[cfg(target_pointer_width = "32")]
narrow_int_arg!(isize, usize);

impl From<f32> for CallArg {
    fn from(value: f32) -> Self {
        CallArg::F32(value)
    }
}

impl From<f64> for CallArg {
    fn from(value: f64) -> Self {
        CallArg::F64(value)
    }
}

impl<T> From<*const T> for CallArg {
    fn from(value: *const T) -> Self {
        CallArg::from(value as usize)
    }
}

impl<T> From<*mut T> for CallArg {
    fn from(value: *mut T) -> Self {
        CallArg::from(value as usize)
    }
}
