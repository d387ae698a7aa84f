mod display_bounded;

pub(crate) use display_bounded::DisplayBounded;
pub(crate) use display_bounded::DisplayBoundedExt;
