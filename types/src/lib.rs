pub mod binding;
pub mod broker;
pub mod catalog;
pub mod conditions;
pub mod instance;
pub mod parameters;
pub mod patch;

pub use binding::*;
pub use broker::*;
pub use catalog::*;
pub use conditions::*;
pub use instance::*;
pub use parameters::*;
pub use patch::*;
