pub mod errors;
pub mod models;
pub mod protocol;
pub mod views;

pub use errors::*;
pub use models::*;
pub use protocol::*;
pub use views::*;

pub type SyncResult<T> = Result<T, SyncError>;
