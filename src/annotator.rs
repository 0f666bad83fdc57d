use crate::config::AppConfig;
use crate::error::AppError;
use crate::metadata::{AnnotationResult, ImageInformation, ImageRecord};
use crate::ollama::OllamaClient;
use crate::repository::MetadataRepository;
use crate::sniffer;
use crate::tags::normalize_tags;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Annotates single catalog images through the vision model and stores the result.
pub struct Annotator {
    catalog_root: PathBuf,
    client: OllamaClient,
    repository: Arc<dyn MetadataRepository>,
}

impl Annotator {
    pub fn new(
        config: &AppConfig,
        repository: Arc<dyn MetadataRepository>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            catalog_root: config.catalog_root.clone(),
            client: OllamaClient::new(config)?,
            repository,
        })
    }

    /// Runs read, sniff, encode, request, validate and store for `image_name`.
    ///
    /// Aborts on the first failure; nothing is written unless the model's answer validated.
    pub async fn annotate(&self, image_name: &str) -> Result<AnnotationResult, AppError> {
        let full_path = resolve_image_path(&self.catalog_root, image_name)?;
        log::info!("Patching meta of file {:?}", full_path);

        let stat = tokio::fs::metadata(&full_path).await?;
        let filesize = stat.len();
        let modified: DateTime<Utc> = DateTime::<Utc>::from(stat.modified()?).trunc_subsecs(0);
        log::debug!("Size of file {:?}: {}", full_path, filesize);
        log::debug!("Change date of file {:?}: {}", full_path, modified);

        let image_data = tokio::fs::read(&full_path).await?;
        let mime = sniffer::detect_bytes(&image_data);
        log::debug!("Mime of file {:?}: {}", full_path, mime);
        if !sniffer::is_image(&mime) {
            return Err(AppError::NotAnImage {
                name: image_name.to_string(),
                mime: mime.to_string(),
            });
        }

        let encoded = base64::engine::general_purpose::STANDARD.encode(&image_data);
        drop(image_data);

        let answer = self.client.generate(encoded).await?;
        log::debug!(
            "Model '{}' described {:?} as {:?}",
            self.client.model(),
            full_path,
            answer.image_information.title
        );

        let result = clean_result(image_name, filesize, modified, answer);
        let info = &result.image_information;
        self.repository
            .upsert(ImageRecord {
                file_path: image_name.to_string(),
                title: info.title.clone(),
                description: info.detailed_description.clone(),
                tags: info.tags.clone(),
                last_filesize: filesize,
                last_modified: modified,
                created_at: None,
                updated_at: None,
            })
            .await?;

        log::info!("Stored new metadata for {:?}", full_path);
        Ok(result)
    }
}

/// Replaces whatever file facts the model echoed with the captured ones and canonicalizes text.
fn clean_result(
    image_name: &str,
    filesize: u64,
    modified: DateTime<Utc>,
    answer: AnnotationResult,
) -> AnnotationResult {
    let info = answer.image_information;
    AnnotationResult {
        filename: image_name.to_string(),
        filesize,
        file_modification_time: modified.to_rfc3339_opts(SecondsFormat::Secs, true),
        image_information: ImageInformation {
            title: info.title.trim().to_string(),
            detailed_description: info.detailed_description.trim().to_string(),
            tags: normalize_tags(&info.tags),
        },
    }
}

/// Joins a request's image name onto the catalog root.
///
/// Only a single plain path component is accepted.
pub fn resolve_image_path(catalog_root: &Path, image_name: &str) -> Result<PathBuf, AppError> {
    let mut components = Path::new(image_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if !image_name.contains(['/', '\\']) => {
            Ok(catalog_root.join(name))
        }
        _ => Err(AppError::InvalidImageName(image_name.to_string())),
    }
}
