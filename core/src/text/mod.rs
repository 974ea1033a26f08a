mod boundary;
mod lookahead;

pub use boundary::{is_boundary, is_standalone_newline, BOUNDARY_CHARS};
pub use lookahead::{trim_seam, Drained, LookaheadBuffer, Token};
