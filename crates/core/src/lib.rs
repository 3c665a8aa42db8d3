pub mod enums;
pub mod error;
pub mod form;
pub mod ids;
pub mod reputation;
pub mod task;
pub mod time;

pub use error::HustleError;
