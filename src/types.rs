pub use units::plain::*;

pub type Index2 = [usize; 2];
pub type Shape2 = [usize; 2];

/// Pair of values for the (low, high) energy channels, or for the two basis
/// materials of a decomposition, depending on context.
pub type Pair<T> = [T; 2];

/// Reference distance at which source output is specified
pub const REFERENCE_SID_CM: Cmf64 = 100.0;
