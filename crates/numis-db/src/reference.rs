//! # Reference Attachment
//!
//! A reference either sits next to the collection as its own file or is
//! embedded in the collection's `attachments` table under the name
//! `reference`. Never both: attaching takes the bytes in, detaching gives
//! the exact same bytes back and removes the embedded copy.
//!
//! ```text
//!   reference.json ──attach──►  attachments["reference"]
//!                  ◄──detach──
//!                              create → empty scaffold embedded
//!                              clear  → embedded copy dropped
//! ```
//!
//! Every change goes through a savepoint, so a failed operation leaves the
//! store as it was. Changes become durable on [`Store::save`].

use std::path::{Path, PathBuf};

use numis_core::Reference;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::AttachmentRepository;
use crate::store::Store;

/// Attachment name of the embedded reference.
pub const REFERENCE_ATTACHMENT: &str = "reference";

/// Errors that keep their own identity instead of becoming an
/// attach/detach/clear failure.
fn passthrough(err: &DbError) -> bool {
    matches!(
        err,
        DbError::ReadOnly
            | DbError::Closed
            | DbError::AttachFailed(_)
            | DbError::DetachFailed(_)
            | DbError::ClearFailed(_)
    )
}

fn wrap(err: DbError, kind: fn(String) -> DbError) -> DbError {
    if passthrough(&err) {
        err
    } else {
        kind(err.to_string())
    }
}

/// Reference operations on one store.
///
/// ## Usage
/// ```rust,ignore
/// let bytes = tokio::fs::read("reference.json").await?;
/// store.reference().attach(&bytes).await?;
/// store.save().await?;
/// ```
#[derive(Debug)]
pub struct ReferenceAttachments<'s> {
    store: &'s mut Store,
}

impl<'s> ReferenceAttachments<'s> {
    pub(crate) fn new(store: &'s mut Store) -> Self {
        ReferenceAttachments { store }
    }

    pub async fn is_attached(&mut self) -> DbResult<bool> {
        AttachmentRepository::new(self.store.connection()?)
            .exists(REFERENCE_ATTACHMENT)
            .await
    }

    /// Raw bytes of the embedded reference.
    pub async fn embedded_bytes(&mut self) -> DbResult<Option<Vec<u8>>> {
        AttachmentRepository::new(self.store.connection()?)
            .get(REFERENCE_ATTACHMENT)
            .await
    }

    /// Parsed embedded reference, for populating pick-lists.
    pub async fn embedded(&mut self) -> DbResult<Option<Reference>> {
        match self.embedded_bytes().await? {
            Some(bytes) => Ok(Some(Reference::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Embeds a copy of serialized reference bytes.
    ///
    /// Fails with `AttachFailed` if the bytes are not a reference or a
    /// reference is already attached.
    pub async fn attach(&mut self, bytes: &[u8]) -> DbResult<()> {
        self.try_attach(bytes)
            .await
            .map_err(|e| wrap(e, DbError::AttachFailed))?;
        info!(bytes = bytes.len(), "Reference attached");
        Ok(())
    }

    /// Reads a reference file and embeds it.
    pub async fn attach_file(&mut self, path: impl AsRef<Path>) -> DbResult<()> {
        let bytes = tokio::fs::read(path.as_ref())
            .await
            .map_err(|e| DbError::AttachFailed(format!("{}: {}", path.as_ref().display(), e)))?;
        self.attach(&bytes).await
    }

    async fn try_attach(&mut self, bytes: &[u8]) -> DbResult<()> {
        Reference::from_bytes(bytes)?;

        let mut tx = self.store.transaction().await?;
        if tx.has_attachment(REFERENCE_ATTACHMENT).await? {
            return Err(DbError::AttachFailed("a reference is already attached".to_string()));
        }
        tx.put_attachment(REFERENCE_ATTACHMENT, bytes).await?;
        tx.commit().await
    }

    /// Removes the embedded reference and returns its bytes.
    pub async fn detach(&mut self) -> DbResult<Vec<u8>> {
        let bytes = self
            .try_detach(None)
            .await
            .map_err(|e| wrap(e, DbError::DetachFailed))?;
        info!(bytes = bytes.len(), "Reference detached");
        Ok(bytes)
    }

    /// Writes the embedded reference to `path`, then removes it from the store.
    ///
    /// If the file cannot be written the reference stays embedded.
    pub async fn detach_to(&mut self, path: impl AsRef<Path>) -> DbResult<()> {
        let path = path.as_ref();
        self.try_detach(Some(path))
            .await
            .map_err(|e| wrap(e, DbError::DetachFailed))?;
        info!(path = %path.display(), "Reference detached to file");
        Ok(())
    }

    async fn try_detach(&mut self, target: Option<&Path>) -> DbResult<Vec<u8>> {
        let mut tx = self.store.transaction().await?;
        let bytes = tx
            .attachment(REFERENCE_ATTACHMENT)
            .await?
            .ok_or_else(|| DbError::DetachFailed("no reference attached".to_string()))?;
        if let Some(path) = target {
            tokio::fs::write(path, &bytes).await?;
        }
        tx.remove_attachment(REFERENCE_ATTACHMENT).await?;
        tx.commit().await?;
        Ok(bytes)
    }

    /// Embeds an empty reference with the standard sections and returns it.
    pub async fn create(&mut self) -> DbResult<Reference> {
        let reference = Reference::scaffold();
        let bytes = reference.to_bytes()?;
        self.attach(&bytes).await?;
        Ok(reference)
    }

    /// Drops the embedded reference. Nothing attached is not an error.
    pub async fn clear(&mut self) -> DbResult<()> {
        let removed = async {
            let mut tx = self.store.transaction().await?;
            let removed = tx.remove_attachment(REFERENCE_ATTACHMENT).await?;
            tx.commit().await?;
            Ok::<_, DbError>(removed)
        }
        .await
        .map_err(|e| wrap(e, DbError::ClearFailed))?;

        debug!(removed, "Reference cleared");
        Ok(())
    }
}

/// A detached reference on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceFile {
    pub path: PathBuf,
    pub reference: Reference,
}

impl ReferenceFile {
    pub fn new(path: impl Into<PathBuf>, reference: Reference) -> Self {
        ReferenceFile {
            path: path.into(),
            reference,
        }
    }

    pub async fn load(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let reference = Reference::from_bytes(&bytes)?;
        Ok(ReferenceFile::new(path, reference))
    }

    pub async fn save(&self) -> DbResult<()> {
        let bytes = self.reference.to_bytes()?;
        tokio::fs::write(&self.path, bytes).await?;
        debug!(path = %self.path.display(), "Reference file written");
        Ok(())
    }
}
