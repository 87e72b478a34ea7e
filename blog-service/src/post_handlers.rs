use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use common_auth::{authorize, Action, AuthContext, Decision, Resource};
use common_http_errors::ApiError;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::content::{Comment, Post, PostChanges, PostFilter};
use crate::error::ServiceResult;
use crate::extractors::ActiveUser;
use crate::user_handlers::MessageResponse;
use crate::AppState;

const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Deserialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Deserialize)]
pub struct PostUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Deserialize, Default)]
pub struct PostQuery {
    pub keyword: Option<String>,
    pub author_id: Option<Uuid>,
    pub tag: Option<String>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Deserialize, Default)]
pub struct PageQuery {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl PageQuery {
    fn bounds(&self) -> (usize, usize) {
        (
            self.skip.unwrap_or(0),
            self.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE),
        )
    }
}

#[derive(Deserialize)]
pub struct NewComment {
    pub content: String,
}

/// Gate an action on an existing record. A missing record is 404 unless the
/// caller's role could never perform the action, in which case it is 403 and
/// a forbidden action does not reveal whether the record exists.
fn authorize_target<T>(
    state: &AppState,
    auth: &AuthContext,
    resource: Resource,
    action: Action,
    target: Option<T>,
    owner: fn(&T) -> Uuid,
    missing: &'static str,
) -> ServiceResult<T> {
    let policy = state.access.as_ref();
    match target {
        Some(item) => {
            authorize(policy, auth, resource, action, Some(owner(&item)))?;
            Ok(item)
        }
        None => {
            if policy.decide(auth.claims.role, resource, action) == Decision::Deny {
                authorize(policy, auth, resource, action, None)?;
            }
            Err(ApiError::not_found(missing).into())
        }
    }
}

fn non_blank(field: &'static str, value: String) -> ServiceResult<String> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request("blank_field", format!("{field} must not be empty")).into());
    }
    Ok(value)
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = tags
        .into_iter()
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect();
    cleaned.sort();
    cleaned.dedup();
    cleaned
}

pub async fn create_post(
    State(state): State<AppState>,
    ActiveUser { auth, .. }: ActiveUser,
    Json(new_post): Json<NewPost>,
) -> ServiceResult<(StatusCode, Json<Post>)> {
    authorize(state.access.as_ref(), &auth, Resource::Post, Action::Create, None)?;
    let title = non_blank("title", new_post.title)?;
    let content = non_blank("content", new_post.content)?;

    let post = state
        .content
        .create_post(auth.claims.subject, title, content, clean_tags(new_post.tags))
        .await;
    info!(post_id = %post.id, author_id = %post.author_id, "post created");
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn list_posts(
    State(state): State<AppState>,
    ActiveUser { auth, .. }: ActiveUser,
    Query(query): Query<PostQuery>,
) -> ServiceResult<Json<Vec<Post>>> {
    authorize(state.access.as_ref(), &auth, Resource::Post, Action::Read, None)?;
    let (skip, limit) = PageQuery {
        skip: query.skip,
        limit: query.limit,
    }
    .bounds();
    let filter = PostFilter {
        keyword: query.keyword.filter(|value| !value.trim().is_empty()),
        author_id: query.author_id,
        tag: query.tag,
        skip,
        limit,
    };
    Ok(Json(state.content.list_posts(&filter).await))
}

pub async fn get_post(
    State(state): State<AppState>,
    ActiveUser { auth, .. }: ActiveUser,
    Path(post_id): Path<Uuid>,
) -> ServiceResult<Json<Post>> {
    authorize(state.access.as_ref(), &auth, Resource::Post, Action::Read, None)?;
    let post = state
        .content
        .post(post_id)
        .await
        .ok_or_else(|| ApiError::not_found("post_not_found"))?;
    Ok(Json(post))
}

pub async fn update_post(
    State(state): State<AppState>,
    ActiveUser { auth, .. }: ActiveUser,
    Path(post_id): Path<Uuid>,
    Json(update): Json<PostUpdate>,
) -> ServiceResult<Json<Post>> {
    let existing = state.content.post(post_id).await;
    authorize_target(
        &state,
        &auth,
        Resource::Post,
        Action::Update,
        existing,
        |post: &Post| post.author_id,
        "post_not_found",
    )?;

    let changes = PostChanges {
        title: update.title.map(|title| non_blank("title", title)).transpose()?,
        content: update
            .content
            .map(|content| non_blank("content", content))
            .transpose()?,
        tags: update.tags.map(clean_tags),
    };
    let post = state
        .content
        .update_post(post_id, changes)
        .await
        .ok_or_else(|| ApiError::not_found("post_not_found"))?;
    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    ActiveUser { auth, .. }: ActiveUser,
    Path(post_id): Path<Uuid>,
) -> ServiceResult<Json<MessageResponse>> {
    let existing = state.content.post(post_id).await;
    authorize_target(
        &state,
        &auth,
        Resource::Post,
        Action::Delete,
        existing,
        |post: &Post| post.author_id,
        "post_not_found",
    )?;

    state
        .content
        .delete_post(post_id)
        .await
        .ok_or_else(|| ApiError::not_found("post_not_found"))?;
    info!(post_id = %post_id, deleted_by = %auth.claims.subject, "post deleted");
    Ok(Json(MessageResponse {
        message: "Post deleted successfully",
    }))
}

pub async fn create_comment(
    State(state): State<AppState>,
    ActiveUser { auth, .. }: ActiveUser,
    Path(post_id): Path<Uuid>,
    Json(new_comment): Json<NewComment>,
) -> ServiceResult<(StatusCode, Json<Comment>)> {
    authorize(state.access.as_ref(), &auth, Resource::Comment, Action::Create, None)?;
    let content = non_blank("content", new_comment.content)?;
    let comment = state
        .content
        .add_comment(post_id, auth.claims.subject, content)
        .await
        .ok_or_else(|| ApiError::not_found("post_not_found"))?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn list_comments(
    State(state): State<AppState>,
    ActiveUser { auth, .. }: ActiveUser,
    Path(post_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> ServiceResult<Json<Vec<Comment>>> {
    authorize(state.access.as_ref(), &auth, Resource::Comment, Action::Read, None)?;
    let (skip, limit) = page.bounds();
    let comments = state
        .content
        .comments_for(post_id, skip, limit)
        .await
        .ok_or_else(|| ApiError::not_found("post_not_found"))?;
    Ok(Json(comments))
}

pub async fn get_comment(
    State(state): State<AppState>,
    ActiveUser { auth, .. }: ActiveUser,
    Path(comment_id): Path<Uuid>,
) -> ServiceResult<Json<Comment>> {
    authorize(state.access.as_ref(), &auth, Resource::Comment, Action::Read, None)?;
    let comment = state
        .content
        .comment(comment_id)
        .await
        .ok_or_else(|| ApiError::not_found("comment_not_found"))?;
    Ok(Json(comment))
}

pub async fn update_comment(
    State(state): State<AppState>,
    ActiveUser { auth, .. }: ActiveUser,
    Path(comment_id): Path<Uuid>,
    Json(update): Json<NewComment>,
) -> ServiceResult<Json<Comment>> {
    let existing = state.content.comment(comment_id).await;
    authorize_target(
        &state,
        &auth,
        Resource::Comment,
        Action::Update,
        existing,
        |comment: &Comment| comment.author_id,
        "comment_not_found",
    )?;

    let content = non_blank("content", update.content)?;
    let comment = state
        .content
        .update_comment(comment_id, content)
        .await
        .ok_or_else(|| ApiError::not_found("comment_not_found"))?;
    Ok(Json(comment))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    ActiveUser { auth, .. }: ActiveUser,
    Path(comment_id): Path<Uuid>,
) -> ServiceResult<Json<MessageResponse>> {
    let existing = state.content.comment(comment_id).await;
    authorize_target(
        &state,
        &auth,
        Resource::Comment,
        Action::Delete,
        existing,
        |comment: &Comment| comment.author_id,
        "comment_not_found",
    )?;

    state
        .content
        .delete_comment(comment_id)
        .await
        .ok_or_else(|| ApiError::not_found("comment_not_found"))?;
    Ok(Json(MessageResponse {
        message: "Comment deleted successfully",
    }))
}
