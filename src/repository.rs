use crate::error::AppError;
use crate::metadata::{ImageInfo, ImageRecord};
use async_trait::async_trait;

/// Durable store of annotations keyed by catalog-relative file path.
///
/// Implementations must make `upsert` a single atomic write per key: a reader
/// never sees a record mixing fields of two annotations.
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    async fn ensure_schema(&self) -> Result<(), AppError>;
    /// `Ok(None)` means "not annotated yet"; errors are reserved for an unusable store.
    async fn lookup(&self, file_path: &str) -> Result<Option<ImageInfo>, AppError>;
    async fn get(&self, file_path: &str) -> Result<Option<ImageRecord>, AppError>;
    /// Inserts or replaces every mutable field; `created_at` survives, `updated_at` is refreshed.
    async fn upsert(&self, record: ImageRecord) -> Result<(), AppError>;
    async fn count(&self) -> Result<u64, AppError>;
}
