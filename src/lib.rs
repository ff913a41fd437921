mod attribute_value;
mod condition;
mod error;
mod experiment;
mod feature;
mod gate;
mod matcher;
mod payload;
mod prerequisite;
mod rule;
mod satisfiability;
mod saved_group;
mod store;
mod test_common;
mod util;
mod value;
mod version;

pub use attribute_value::*;
pub use condition::*;
pub use error::*;
pub use experiment::*;
pub use feature::*;
pub use payload::*;
pub use prerequisite::*;
pub use rule::*;
pub use satisfiability::*;
pub use saved_group::*;
pub use store::*;
pub use value::*;
pub use version::*;
