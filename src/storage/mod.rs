mod engagement;
mod guest;
mod kv;
mod schema;
mod types;

pub use engagement::{EngagementStorage, LocalEngagementStore, LIKED_KEY, SAVED_KEY};
pub use schema::Database;
pub use types::{DatabaseError, GuestPreferences};
