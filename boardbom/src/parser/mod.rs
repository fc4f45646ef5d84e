pub mod pcb;
pub mod pcb_schema;
pub mod sexp;

// Re-export for convenience
pub use pcb::PcbParser;
pub use pcb_schema::*;
pub use sexp::{ParseError, ParseErrorKind, Position, SExp, SExpParser};
