pub mod alerts;
pub mod badge;
pub mod client;
pub mod composer;
pub mod error;
pub mod unread;
pub mod view;

pub use alerts::{Alert, AlertCenter};
pub use badge::UnreadBadge;
pub use client::CommsClient;
pub use composer::Composer;
pub use error::CommsError;
pub use unread::UnreadState;
pub use view::CommsView;

use std::sync::Arc;

use dockline_store::Database;
use error::CommsError as Error;

/// Run a store call off the async runtime. rusqlite is blocking, so
/// every query from async code goes through here.
pub(crate) async fn run_blocking<T, F>(db: &Arc<Database>, f: F) -> Result<T, Error>
where
    F: FnOnce(&Database) -> dockline_store::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| Error::Runtime(e.to_string()))?
        .map_err(Error::from)
}
