//! Built-in core operators.

pub use features::Features;
pub use merge::Merge;
pub use model::Model;
pub use score_formula::ScoreFormula;
pub use sourcer::Sourcer;

mod features;
mod merge;
mod model;
mod score_formula;
mod sourcer;
