mod agent;
pub use agent::*;
