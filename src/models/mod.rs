pub mod phone_number;
pub mod user;

pub use phone_number::*;
pub use user::*;
