use actix_web::{web, HttpResponse};

use super::ApiError;
use crate::pipeline::ReadPath;

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// GET /order/{order_uid}
pub async fn get_order(path: web::Path<String>, reads: web::Data<ReadPath>) -> Result<HttpResponse, ApiError> {
    let order_uid = path.into_inner();
    let order_uid = order_uid.trim();
    if order_uid.is_empty() {
        return Err(ApiError::BadRequest("order_uid must not be empty"));
    }

    match reads.lookup(order_uid).await? {
        Some(order) => Ok(HttpResponse::Ok().json(&*order)),
        None => {
            tracing::debug!(order_uid = %order_uid, "Order not found");
            Err(ApiError::NotFound)
        }
    }
}

/// GET /
pub async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(INDEX_HTML)
}
