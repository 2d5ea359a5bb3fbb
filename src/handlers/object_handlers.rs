//! Handlers for the five routes in spec.md §6: bucket listing, file
//! listing, object/thumbnail streaming, batch upload, and delete.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Multipart, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::envelope;
use crate::errors::AppError;
use crate::path_clean;
use crate::state::AppState;
use crate::thumbnail::ThumbnailBody;
use crate::upload::{self, UploadOutcome, UploadParams};

/// `GET /api/buckets`
pub async fn list_buckets(State(state): State<AppState>) -> impl IntoResponse {
    let bucket_list = state.registry.get_bucket_list().await;
    envelope::ok(serde_json::json!({ "bucket_list": bucket_list }))
}

#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    pub bucket: String,
    pub location: Option<String>,
}

/// `GET /api/files?bucket=&location=`
pub async fn list_files(
    State(state): State<AppState>,
    Query(q): Query<ListFilesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let prefix = path_clean::clean(q.location.as_deref().unwrap_or(""));
    let provider = state
        .registry
        .get_bucket(&q.bucket)
        .await
        .map_err(|_| AppError::BucketNotFound)?;
    let file_list = provider.get_file_list(&prefix).await?;
    Ok(envelope::ok(serde_json::json!({ "file_list": file_list })))
}

#[derive(Debug, Deserialize)]
pub struct GetFileQuery {
    pub bucket: String,
    pub object_key: String,
    #[serde(default)]
    pub thumbnail: bool,
}

/// `GET /api/file?bucket=&object_key=&thumbnail=` — streams the raw object,
/// or (if `thumbnail=true`) the cached/regenerated JPEG thumbnail with
/// conditional-GET support.
///
/// `ResourceNotExists` is rendered as a genuine 404 here (unlike every other
/// endpoint, which wraps it in a 200 envelope): this is the one read path
/// meant to be linked directly, e.g. from an `<img>` tag, so a missing
/// object or an undecodable thumbnail source needs a router-level 404.
pub async fn get_file(State(state): State<AppState>, Query(q): Query<GetFileQuery>, headers: HeaderMap) -> Response {
    match get_file_inner(state, q, headers).await {
        Ok(response) => response,
        Err(AppError::ResourceNotExists) => AppError::ResourceNotExists.into_not_found_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_file_inner(state: AppState, q: GetFileQuery, headers: HeaderMap) -> Result<Response, AppError> {
    let object_key = path_clean::clean(&q.object_key);
    if object_key.is_empty() {
        return Err(AppError::ParamError);
    }

    if q.thumbnail {
        return get_thumbnail(state, &q.bucket, &object_key, headers).await;
    }

    let provider = state
        .registry
        .get_bucket(&q.bucket)
        .await
        .map_err(|_| AppError::BucketNotFound)?;
    let (body, info) = provider.get_object(&object_key).await?;
    let stream = ReaderStream::new(body);

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    let resp_headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&info.content_type) {
        resp_headers.insert(header::CONTENT_TYPE, value);
    }
    resp_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(info.content_length.max(0) as u64));
    Ok(response)
}

async fn get_thumbnail(state: AppState, bucket: &str, object_key: &str, headers: HeaderMap) -> Result<Response, AppError> {
    let oss = &state.config.oss;
    let (body, info) = state
        .thumbnails
        .get(
            &state.registry,
            bucket,
            object_key,
            oss.thumbnail_long_edge,
            oss.thumbnail_quality,
            state.buffers.clone(),
        )
        .await?;

    if let Some(if_modified_since) = parse_if_modified_since(&headers) {
        if crate::thumbnail::not_modified_since(if_modified_since, info.last_modified) {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::NOT_MODIFIED;
            set_thumbnail_headers(response.headers_mut(), &info);
            return Ok(response);
        }
    }

    let body = match body {
        ThumbnailBody::File(file) => Body::from_stream(ReaderStream::new(file)),
        ThumbnailBody::Bytes(bytes) => Body::from(bytes),
    };

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_thumbnail_headers(response.headers_mut(), &info);
    Ok(response)
}

fn set_thumbnail_headers(headers: &mut HeaderMap, info: &crate::thumbnail::ThumbnailInfo) {
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/jpeg"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(info.content_length));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000"),
    );
    if let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(info.last_modified.into())) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}

fn parse_if_modified_since(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let raw = headers.get(header::IF_MODIFIED_SINCE)?.to_str().ok()?;
    let system_time = httpdate::parse_http_date(raw).ok()?;
    Some(DateTime::<Utc>::from(system_time))
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub bucket: String,
    pub object_key: String,
}

/// `DELETE /api/delete?bucket=&object_key=`
pub async fn delete_object(
    State(state): State<AppState>,
    Query(q): Query<DeleteQuery>,
) -> Result<impl IntoResponse, AppError> {
    let object_key = path_clean::clean(&q.object_key);
    if object_key.is_empty() {
        return Err(AppError::ParamError);
    }
    let provider = state
        .registry
        .get_bucket(&q.bucket)
        .await
        .map_err(|_| AppError::BucketNotFound)?;
    provider.delete_object(&object_key).await?;
    Ok(envelope::ok(serde_json::json!({})))
}

/// `POST /api/upload` — multipart `files[]`, `bucket`, `location?`,
/// `convert_webp?`, `use_uuid?`.
pub async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Result<impl IntoResponse, AppError> {
    let mut bucket: Option<String> = None;
    let mut location = String::new();
    let mut convert_webp = false;
    let mut use_uuid = false;
    let mut files: Vec<(String, Bytes)> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|_| AppError::ParamError)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "bucket" => bucket = Some(field.text().await.map_err(|_| AppError::ParamError)?),
            "location" => location = field.text().await.map_err(|_| AppError::ParamError)?,
            "convert_webp" => convert_webp = parse_bool(&field.text().await.map_err(|_| AppError::ParamError)?),
            "use_uuid" => use_uuid = parse_bool(&field.text().await.map_err(|_| AppError::ParamError)?),
            _ => {
                let filename = field.file_name().unwrap_or("file").to_string();
                let data = field.bytes().await.map_err(|_| AppError::UploadFile)?;
                files.push((filename, data));
            }
        }
    }

    let bucket = bucket.ok_or(AppError::ParamError)?;
    if files.is_empty() {
        return Err(AppError::ParamError);
    }

    let params = UploadParams {
        bucket,
        location,
        convert_webp,
        use_uuid,
    };

    let results: Vec<UploadOutcome> = upload::upload_batch(
        state.registry.clone(),
        Arc::new(state.config.oss.clone()),
        state.buffers.clone(),
        params,
        files,
    )
    .await;

    Ok(envelope::ok(serde_json::json!({ "results": results })))
}

fn parse_bool(s: &str) -> bool {
    matches!(s, "1" | "true" | "TRUE" | "True")
}

/// Router-level not-found fallback: HTTP 404 (the only non-200 status in
/// this API), wrapping the `200404` envelope.
pub async fn route_not_found() -> AppError {
    AppError::RouteNotFound
}
