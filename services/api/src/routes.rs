//! API service routes

use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use crate::{
    contact::{self, ContactRequest},
    error::ApiResult,
    extract::{Params, Payload, Segment},
    middleware::{CurrentPrincipal, resolve_principal},
    models::{
        Article, Career, ContentPatch, ContentSchema, DEFAULT_ADMIN_LIMIT, DEFAULT_PUBLIC_LIMIT,
        ListQuery, MAX_LIMIT, NewContent,
    },
    state::{AppState, ContentHandles, HasContent},
};

const DEFAULT_FEATURED_LIMIT: i64 = 6;

#[derive(Debug, Default, Deserialize)]
pub struct FeaturedQuery {
    pub limit: Option<i64>,
}

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let admin = admin_routes::<Article>("/admin/articles")
        .merge(admin_routes::<Career>("/admin/careers"))
        .route_layer(middleware::from_fn_with_state(state.clone(), resolve_principal));

    Router::new()
        .route("/health", get(health_check))
        .route("/articles", get(list_published::<Article>))
        .route("/articles/featured", get(featured::<Article>))
        .route("/articles/recent", get(recent_articles))
        .route("/articles/:slug", get(get_published::<Article>))
        .route("/careers", get(list_published::<Career>))
        .route("/careers/featured", get(featured::<Career>))
        .route("/careers/:slug", get(get_published::<Career>))
        .route("/contact", post(submit_contact))
        .merge(admin)
        .with_state(state)
}

fn admin_routes<S: ContentSchema>(base: &str) -> Router<AppState>
where
    AppState: HasContent<S>,
{
    Router::new()
        .route(base, get(admin_list::<S>).post(admin_create::<S>))
        .route(
            &format!("{base}/:id"),
            get(admin_get::<S>)
                .patch(admin_update::<S>)
                .delete(admin_delete::<S>),
        )
        .route(
            &format!("{base}/:id/toggle-publish"),
            post(admin_toggle_publish::<S>),
        )
        .route(
            &format!("{base}/:id/toggle-featured"),
            post(admin_toggle_featured::<S>),
        )
}

fn content<S: ContentSchema>(state: &AppState) -> &ContentHandles<S>
where
    AppState: HasContent<S>,
{
    <AppState as HasContent<S>>::content(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match common::database::health_check(&state.db_pool).await {
        Ok(healthy) => healthy,
        Err(e) => {
            error!("Database health check failed: {}", e);
            false
        }
    };
    let cache = state.cache.health_check().await.unwrap_or(false);

    let status = if database && cache {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "ok" } else { "degraded" },
            "service": "api-service",
            "database": database,
            "cache": cache,
        })),
    )
}

pub async fn list_published<S: ContentSchema>(
    State(state): State<AppState>,
    Params(query): Params<ListQuery>,
) -> ApiResult<impl IntoResponse>
where
    AppState: HasContent<S>,
{
    let page = content::<S>(&state)
        .catalog
        .list_published(query.into_filter(DEFAULT_PUBLIC_LIMIT))
        .await?;
    Ok(Json(page))
}

pub async fn featured<S: ContentSchema>(
    State(state): State<AppState>,
    Params(query): Params<FeaturedQuery>,
) -> ApiResult<impl IntoResponse>
where
    AppState: HasContent<S>,
{
    let limit = query
        .limit
        .unwrap_or(DEFAULT_FEATURED_LIMIT)
        .clamp(1, MAX_LIMIT);
    let items = content::<S>(&state).catalog.featured(limit).await?;
    Ok(Json(json!({ "items": items })))
}

pub async fn recent_articles(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let items = state.articles.catalog.recent().await?;
    Ok(Json(json!({ "items": items })))
}

pub async fn get_published<S: ContentSchema>(
    State(state): State<AppState>,
    Segment(slug): Segment<String>,
) -> ApiResult<impl IntoResponse>
where
    AppState: HasContent<S>,
{
    let record = content::<S>(&state).catalog.get_by_slug(&slug).await?;
    Ok(Json(record))
}

pub async fn submit_contact(
    State(state): State<AppState>,
    Payload(payload): Payload<ContactRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = contact::submit(
        state.mailer.as_ref(),
        &state.site_name,
        &state.contact_recipient,
        payload,
    )
    .await?;
    Ok(Json(json!({ "success": true, "id": id })))
}

pub async fn admin_list<S: ContentSchema>(
    State(state): State<AppState>,
    Extension(principal): Extension<CurrentPrincipal>,
    Params(query): Params<ListQuery>,
) -> ApiResult<impl IntoResponse>
where
    AppState: HasContent<S>,
{
    let page = content::<S>(&state)
        .lifecycle
        .list_admin(principal.get(), query.into_filter(DEFAULT_ADMIN_LIMIT))
        .await?;
    Ok(Json(json!({
        "success": true,
        "items": page.items,
        "total": page.total,
        "limit": page.limit,
        "offset": page.offset,
    })))
}

pub async fn admin_create<S: ContentSchema>(
    State(state): State<AppState>,
    Extension(principal): Extension<CurrentPrincipal>,
    Payload(payload): Payload<NewContent<S::Draft>>,
) -> ApiResult<impl IntoResponse>
where
    AppState: HasContent<S>,
{
    let record = content::<S>(&state)
        .lifecycle
        .create(principal.get(), payload)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "id": record.id,
            "slug": record.slug,
            "item": record,
        })),
    ))
}

pub async fn admin_get<S: ContentSchema>(
    State(state): State<AppState>,
    Extension(principal): Extension<CurrentPrincipal>,
    Segment(id): Segment<Uuid>,
) -> ApiResult<impl IntoResponse>
where
    AppState: HasContent<S>,
{
    let record = content::<S>(&state)
        .lifecycle
        .get_for_admin(principal.get(), id)
        .await?;
    Ok(Json(json!({ "success": true, "item": record })))
}

pub async fn admin_update<S: ContentSchema>(
    State(state): State<AppState>,
    Extension(principal): Extension<CurrentPrincipal>,
    Segment(id): Segment<Uuid>,
    Payload(payload): Payload<ContentPatch<S::Patch>>,
) -> ApiResult<impl IntoResponse>
where
    AppState: HasContent<S>,
{
    let record = content::<S>(&state)
        .lifecycle
        .update(principal.get(), id, payload)
        .await?;
    Ok(Json(json!({ "success": true, "item": record })))
}

pub async fn admin_delete<S: ContentSchema>(
    State(state): State<AppState>,
    Extension(principal): Extension<CurrentPrincipal>,
    Segment(id): Segment<Uuid>,
) -> ApiResult<impl IntoResponse>
where
    AppState: HasContent<S>,
{
    content::<S>(&state)
        .lifecycle
        .delete(principal.get(), id)
        .await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn admin_toggle_publish<S: ContentSchema>(
    State(state): State<AppState>,
    Extension(principal): Extension<CurrentPrincipal>,
    Segment(id): Segment<Uuid>,
) -> ApiResult<impl IntoResponse>
where
    AppState: HasContent<S>,
{
    let record = content::<S>(&state)
        .lifecycle
        .toggle_publish_status(principal.get(), id)
        .await?;
    Ok(Json(json!({ "success": true, "item": record })))
}

pub async fn admin_toggle_featured<S: ContentSchema>(
    State(state): State<AppState>,
    Extension(principal): Extension<CurrentPrincipal>,
    Segment(id): Segment<Uuid>,
) -> ApiResult<impl IntoResponse>
where
    AppState: HasContent<S>,
{
    let record = content::<S>(&state)
        .lifecycle
        .toggle_featured(principal.get(), id)
        .await?;
    Ok(Json(json!({ "success": true, "item": record })))
}
