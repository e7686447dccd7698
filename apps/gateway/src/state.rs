use std::sync::Arc;

use vox_core::Settings;
use vox_db::SharedDatabase;
use vox_storage::SharedBlobStore;
use vox_stream::SharedStreamStore;

/// Shared handles for every request handler. Everything inside is cheap to
/// clone and safe for concurrent use.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: SharedStreamStore,
    pub db: SharedDatabase,
    pub blob: SharedBlobStore,
}

impl AppState {
    pub fn new(
        settings: Settings,
        store: SharedStreamStore,
        db: SharedDatabase,
        blob: SharedBlobStore,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            store,
            db,
            blob,
        }
    }
}
