//! Marker for values that cross the invocation log.

/// Values that may be appended to an invocation log and byte-compared by the
/// validator.
///
/// # Safety
///
/// Implementors must be `Copy` with a fully initialized representation: no
/// padding bytes, and byte equality must coincide with logical equality.
pub unsafe trait Plain: Copy + 'static {}

unsafe impl Plain for () {}
unsafe impl Plain for bool {}
unsafe impl Plain for u8 {}
unsafe impl Plain for u16 {}
unsafe impl Plain for u32 {}
unsafe impl Plain for u64 {}
unsafe impl Plain for usize {}
unsafe impl Plain for i8 {}
unsafe impl Plain for i16 {}
unsafe impl Plain for i32 {}
unsafe impl Plain for i64 {}
unsafe impl Plain for isize {}

unsafe impl<T: Plain, const N: usize> Plain for [T; N] {}

unsafe impl<T: 'static> Plain for *const T {}
unsafe impl<T: 'static> Plain for *mut T {}
unsafe impl<T: Sync + 'static> Plain for &'static T {}
