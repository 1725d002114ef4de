//! Prescreening of leads before research.

mod chains;
mod parser;
mod stage;

pub use chains::{match_chain, KNOWN_CHAINS};
pub use parser::{parse_prescreen_lines, parse_single_verdict, Confidence, PrescreenLine};
pub use stage::{apply_verdict, PrescreenStage, PrescreenVerdict, VerdictSource};
