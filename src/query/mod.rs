//! From generator text to tabular data: literal parsing, query recovery,
//! stage guarding, execution and flattening.

pub mod executor;
pub mod flatten;
pub mod guard;
pub mod literal;
pub mod parser;
pub mod tabular;

pub use executor::QueryExecutor;
pub use flatten::{FlatRecord, flatten_document, titleize};
pub use guard::{GuardViolation, StagePolicy};
pub use literal::{LiteralError, parse_literal};
pub use parser::{CandidateQuery, parse_candidate, strip_code_fences};
pub use tabular::TabularResult;
