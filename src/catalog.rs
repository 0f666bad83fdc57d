use crate::error::AppError;
use crate::metadata::{CatalogEntry, ImageInfo};
use crate::repository::MetadataRepository;
use crate::sniffer;
use crate::tags::normalize_tags;
use std::fs::File;
use std::path::Path;
use walkdir::WalkDir;

/// Lists the image files directly under `catalog_root` together with their stored metadata.
///
/// Files that cannot be opened or sniffed are skipped, non-images are dropped even when
/// a stale record exists. A repository failure fails the whole listing.
pub async fn list_catalog(
    catalog_root: &Path,
    repository: &dyn MetadataRepository,
) -> Result<Vec<CatalogEntry>, AppError> {
    let root = catalog_root.to_path_buf();
    let names = tokio::task::spawn_blocking(move || scan_images(&root)).await??;

    let mut entries = Vec::with_capacity(names.len());
    for name in names {
        let info = repository.lookup(&name).await?.map(render_info);
        entries.push(CatalogEntry {
            url: format!("/api/images/{}", urlencoding::encode(&name)),
            name,
            info,
        });
    }

    log::debug!("Catalog listing produced {} entries", entries.len());
    Ok(entries)
}

/// Names of the directory's files whose content sniffs as an image, in listing order.
fn scan_images(catalog_root: &Path) -> Result<Vec<String>, AppError> {
    log::debug!("Scanning catalog directory {:?}", catalog_root);
    // the root itself has to be readable, individual entries do not
    std::fs::read_dir(catalog_root)?;

    let mut names = Vec::new();
    for entry in WalkDir::new(catalog_root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_dir() {
            log::trace!("Skipping directory: {:?}", entry.path());
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            log::warn!("Skipping file with non UTF-8 name: {:?}", entry.path());
            continue;
        };

        match sniff_file(entry.path()) {
            Ok(mime) if sniffer::is_image(&mime) => names.push(name.to_string()),
            Ok(mime) => log::trace!("Skipping non-image file {:?} ({})", entry.path(), mime),
            Err(e) => log::warn!("Skipping unreadable file {:?}: {}", entry.path(), e),
        }
    }
    Ok(names)
}

fn sniff_file(path: &Path) -> std::io::Result<mime::Mime> {
    let mut file = File::open(path)?;
    sniffer::detect(&mut file)
}

fn render_info(info: ImageInfo) -> ImageInfo {
    ImageInfo {
        title: info.title.trim().to_string(),
        description: info.description.trim().to_string(),
        tags: normalize_tags(&info.tags),
    }
}
