use crate::{services::images::ImageService, store::ImageStore};
use actix_web::{
    HttpRequest, HttpResponse, Responder,
    http::header::{self, ContentType},
    web,
};
use log::{debug, error};

pub const UPLOAD_SUCCEEDED: &str = "Image uploaded successfully";
pub const UPLOAD_FAILED: &str = "Error saving image";
pub const NOT_FOUND: &str = "Not found";

#[derive(Clone)]
pub struct ImageApi<Store>
where
    Store: ImageStore,
{
    pub image_store: Store,
}

impl<Store> ImageApi<Store>
where
    Store: ImageStore + 'static,
{
    pub fn new(image_store: Store) -> Self {
        ImageApi { image_store }
    }

    pub fn configure(cfg: &mut web::ServiceConfig) {
        cfg.service(
            web::resource("/upload")
                .guard(actix_web::guard::Post())
                .to(Self::upload),
        );
    }

    pub async fn upload(req: HttpRequest, body: web::Bytes, api: web::Data<Self>) -> impl Responder {
        debug!("upload() called with {} bytes", body.len());

        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());

        match ImageService::store_image(&api.image_store, body.to_vec(), content_type).await {
            Ok(_) => HttpResponse::Ok()
                .content_type(ContentType::plaintext())
                .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
                .body(UPLOAD_SUCCEEDED),
            Err(e) => {
                error!("upload failed: {e:#}");
                HttpResponse::InternalServerError()
                    .content_type(ContentType::plaintext())
                    .body(UPLOAD_FAILED)
            }
        }
    }

    pub async fn not_found(req: HttpRequest) -> impl Responder {
        debug!("no route for {} {}", req.method(), req.path());

        HttpResponse::NotFound()
            .content_type(ContentType::plaintext())
            .body(NOT_FOUND)
    }
}
