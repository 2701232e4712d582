mod entry;
mod follow;
mod source;
mod user;

pub use entry::{Entry, NewEntry};
pub use follow::Follow;
pub use source::{NewSource, Source};
pub use user::User;
