mod account;
mod relation;

pub use account::*;
pub use relation::*;
