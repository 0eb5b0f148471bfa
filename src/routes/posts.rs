/// Post Routes
///
/// Any authenticated user can read posts; only the author can change them.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::TokenClaims;
use crate::error::AppError;
use crate::models::PostChanges;
use crate::pagination::PageParams;
use crate::response::{ApiResponse, Paginated};
use crate::services::{CreatePostRequest, PostService};

/// `GET /posts` query string
#[derive(Debug, Deserialize)]
pub struct PostListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub author_id: Option<Uuid>,
    /// Only published posts when true
    #[serde(default)]
    pub published: bool,
}

impl PostListQuery {
    fn page_params(&self) -> PageParams {
        PageParams {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// POST /api/v1/posts
pub async fn create_post(
    claims: web::ReqData<TokenClaims>,
    body: web::Json<CreatePostRequest>,
    posts: web::Data<PostService>,
) -> Result<HttpResponse, AppError> {
    let post = posts.create_post(claims.user_id, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(ApiResponse::with_message("Post created successfully", post)))
}

/// GET /api/v1/posts?page=&per_page=&author_id=&published=
pub async fn list_posts(
    query: web::Query<PostListQuery>,
    posts: web::Data<PostService>,
) -> Result<HttpResponse, AppError> {
    let page = query.page_params();
    let (items, meta) = if query.published {
        posts.list_published(page).await?
    } else {
        posts.list_posts(page, query.author_id).await?
    };
    Ok(HttpResponse::Ok().json(Paginated::new(items, meta)))
}

/// GET /api/v1/posts/{id}
pub async fn get_post(
    path: web::Path<Uuid>,
    posts: web::Data<PostService>,
) -> Result<HttpResponse, AppError> {
    let post = posts.get_post(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::data(post)))
}

/// PUT /api/v1/posts/{id}
///
/// # Errors
/// - 403: caller is not the author
/// - 404: no such post
pub async fn update_post(
    claims: web::ReqData<TokenClaims>,
    path: web::Path<Uuid>,
    body: web::Json<PostChanges>,
    posts: web::Data<PostService>,
) -> Result<HttpResponse, AppError> {
    let post = posts
        .update_post(path.into_inner(), claims.user_id, body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::with_message("Post updated successfully", post)))
}

/// DELETE /api/v1/posts/{id}
pub async fn delete_post(
    claims: web::ReqData<TokenClaims>,
    path: web::Path<Uuid>,
    posts: web::Data<PostService>,
) -> Result<HttpResponse, AppError> {
    posts.delete_post(path.into_inner(), claims.user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::message("Post deleted successfully")))
}

/// PUT /api/v1/posts/{id}/publish
pub async fn publish_post(
    claims: web::ReqData<TokenClaims>,
    path: web::Path<Uuid>,
    posts: web::Data<PostService>,
) -> Result<HttpResponse, AppError> {
    let post = posts.publish_post(path.into_inner(), claims.user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::with_message("Post published successfully", post)))
}

/// PUT /api/v1/posts/{id}/unpublish
pub async fn unpublish_post(
    claims: web::ReqData<TokenClaims>,
    path: web::Path<Uuid>,
    posts: web::Data<PostService>,
) -> Result<HttpResponse, AppError> {
    let post = posts.unpublish_post(path.into_inner(), claims.user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::with_message("Post unpublished successfully", post)))
}
