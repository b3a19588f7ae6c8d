pub mod constants;
pub mod errors;
pub mod pari_mutuel;
pub mod types;

pub use constants::*;
pub use types::*;
