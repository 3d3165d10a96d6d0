//! Attaching a user-supplied file to the session.

use std::sync::Arc;

use flowchat_core::{BlobError, BlobErrorKind, BlobStore, FlowError, StoredObject};
use tracing::{info, warn};

use crate::session::Session;

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub object: StoredObject,
    /// Set when the public-visibility toggle failed. The upload itself and
    /// the session reference are unaffected.
    pub visibility_warning: Option<FlowError>,
}

impl UploadReceipt {
    #[must_use]
    pub fn object_id(&self) -> &str {
        &self.object.id
    }
}

pub struct UploadHandler {
    session: Arc<Session>,
    store: Arc<dyn BlobStore>,
    prefix: Option<String>,
    make_public: bool,
}

impl UploadHandler {
    pub fn new(session: Arc<Session>, store: Arc<dyn BlobStore>) -> Self {
        Self {
            session,
            store,
            prefix: None,
            make_public: false,
        }
    }

    /// Store uploads under `prefix` (a folder id for the Drive store).
    #[must_use]
    pub fn with_prefix(mut self, prefix: Option<String>) -> Self {
        self.prefix = prefix.filter(|p| !p.trim().is_empty());
        self
    }

    #[must_use]
    pub const fn with_public_visibility(mut self, make_public: bool) -> Self {
        self.make_public = make_public;
        self
    }

    /// Upload `bytes` as `name` and point the session at the new object.
    ///
    /// On failure the session keeps whatever file it referenced before.
    pub async fn handle_upload(
        &self,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadReceipt, FlowError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FlowError::Upload(BlobError::new(
                BlobErrorKind::Other,
                "file name is empty",
            )));
        }

        let size = bytes.len();
        let object = match self.store.upload(name, bytes, self.prefix.as_deref()).await {
            Ok(object) => object,
            Err(e) => {
                warn!("Upload of {name} ({size} bytes) failed: {e}");
                return Err(FlowError::Upload(e));
            }
        };
        info!("Uploaded {name} ({size} bytes) as {}", object.id);
        self.session.set_file(object.id.clone());

        let visibility_warning = if self.make_public {
            self.store
                .try_set_public(&object.id)
                .await
                .err()
                .map(|e| {
                    warn!("Could not make {} public: {e}", object.id);
                    FlowError::PublicVisibility(e)
                })
        } else {
            None
        };

        Ok(UploadReceipt {
            object,
            visibility_warning,
        })
    }
}
