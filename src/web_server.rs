use crate::annotator::{resolve_image_path, Annotator};
use crate::catalog::list_catalog;
use crate::config::AppConfig;
use crate::error::{AppError, WriteError};
use crate::metadata::CatalogEntry;
use crate::repository::MetadataRepository;
use crate::sniffer;
use actix_files::NamedFile;
use actix_web::{web, App, HttpResponse, HttpServer};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize, Debug)]
struct ImagesResponse {
    images: Vec<CatalogEntry>,
}

async fn get_images(
    config: web::Data<AppConfig>,
    repository: web::Data<Arc<dyn MetadataRepository>>,
) -> Result<HttpResponse, AppError> {
    log::debug!("Received request for image listing");
    let images = list_catalog(&config.catalog_root, repository.get_ref().as_ref()).await?;
    Ok(HttpResponse::Ok().json(ImagesResponse { images }))
}

async fn get_image(
    path: web::Path<String>,
    config: web::Data<AppConfig>,
) -> Result<NamedFile, AppError> {
    let image_name = path.into_inner();
    let full_path = resolve_image_path(&config.catalog_root, &image_name)?;
    log::debug!("Serving image file: {:?}", full_path);

    let open_path = full_path.clone();
    let (file, mime) = web::block(move || {
        let mut file = std::fs::File::open(&open_path)?;
        let mime = sniffer::detect(&mut file)?;
        Ok::<_, std::io::Error>((file, mime))
    })
    .await
    .map_err(|e| AppError::Generic(e.to_string()))??;

    Ok(NamedFile::from_file(file, full_path)?.set_content_type(mime))
}

async fn update_image_meta(
    path: web::Path<String>,
    annotator: web::Data<Annotator>,
) -> Result<HttpResponse, WriteError> {
    let image_name = path.into_inner();
    let result = annotator.annotate(&image_name).await.map_err(|e| {
        log::error!("Annotation of '{}' failed: {}", image_name, e);
        WriteError(e)
    })?;
    Ok(HttpResponse::Ok().json(result))
}

/// Registers the gallery API on an actix-web app.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/images").route(web::get().to(get_images)))
        .service(web::resource("/api/images/{imagename}").route(web::get().to(get_image)))
        .service(
            web::resource("/api/images/{imagename}/meta").route(web::patch().to(update_image_meta)),
        );
}

pub async fn start_web_server(
    config: Arc<AppConfig>,
    repository: Arc<dyn MetadataRepository>,
    annotator: Arc<Annotator>,
) -> std::io::Result<()> {
    let address = (config.bind_address.clone(), config.web_port);
    let config_data = web::Data::from(config);
    let repository_data = web::Data::new(repository);
    let annotator_data = web::Data::from(annotator);

    log::info!("Starting web server on {}:{}", address.0, address.1);

    HttpServer::new(move || {
        App::new()
            .app_data(config_data.clone())
            .app_data(repository_data.clone())
            .app_data(annotator_data.clone())
            .configure(configure)
    })
    .bind(address)?
    .run()
    .await
}
