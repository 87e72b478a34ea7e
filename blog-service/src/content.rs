//! In-memory post and comment registry. Only as much storage as the access
//! gate needs: every record carries the owner the ownership check compares
//! against.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone)]
pub struct PostFilter {
    pub keyword: Option<String>,
    pub author_id: Option<Uuid>,
    pub tag: Option<String>,
    pub skip: usize,
    pub limit: usize,
}

impl PostFilter {
    fn matches(&self, post: &Post) -> bool {
        if let Some(author) = self.author_id {
            if post.author_id != author {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !post.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                return false;
            }
        }
        if let Some(keyword) = &self.keyword {
            let needle = keyword.to_lowercase();
            if !post.title.to_lowercase().contains(&needle)
                && !post.content.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Default)]
struct Tables {
    posts: HashMap<Uuid, Post>,
    comments: HashMap<Uuid, Comment>,
}

#[derive(Clone, Default)]
pub struct ContentStore {
    inner: Arc<RwLock<Tables>>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_post(
        &self,
        author_id: Uuid,
        title: String,
        content: String,
        tags: Vec<String>,
    ) -> Post {
        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4(),
            author_id,
            title,
            content,
            tags,
            created_at: now,
            updated_at: now,
        };
        self.inner.write().await.posts.insert(post.id, post.clone());
        post
    }

    pub async fn post(&self, id: Uuid) -> Option<Post> {
        self.inner.read().await.posts.get(&id).cloned()
    }

    /// Newest first.
    pub async fn list_posts(&self, filter: &PostFilter) -> Vec<Post> {
        let tables = self.inner.read().await;
        let mut posts: Vec<Post> = tables
            .posts
            .values()
            .filter(|post| filter.matches(post))
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        posts
            .into_iter()
            .skip(filter.skip)
            .take(filter.limit)
            .collect()
    }

    pub async fn update_post(&self, id: Uuid, changes: PostChanges) -> Option<Post> {
        let mut tables = self.inner.write().await;
        let post = tables.posts.get_mut(&id)?;
        if let Some(title) = changes.title {
            post.title = title;
        }
        if let Some(content) = changes.content {
            post.content = content;
        }
        if let Some(tags) = changes.tags {
            post.tags = tags;
        }
        post.updated_at = Utc::now();
        Some(post.clone())
    }

    /// Removes the post and its comments.
    pub async fn delete_post(&self, id: Uuid) -> Option<Post> {
        let mut tables = self.inner.write().await;
        let removed = tables.posts.remove(&id)?;
        tables.comments.retain(|_, comment| comment.post_id != id);
        Some(removed)
    }

    /// `None` when the post does not exist.
    pub async fn add_comment(&self, post_id: Uuid, author_id: Uuid, content: String) -> Option<Comment> {
        let mut tables = self.inner.write().await;
        if !tables.posts.contains_key(&post_id) {
            return None;
        }
        let comment = Comment {
            id: Uuid::new_v4(),
            post_id,
            author_id,
            content,
            created_at: Utc::now(),
        };
        tables.comments.insert(comment.id, comment.clone());
        Some(comment)
    }

    pub async fn comment(&self, id: Uuid) -> Option<Comment> {
        self.inner.read().await.comments.get(&id).cloned()
    }

    /// Oldest first, one page at a time. `None` when the post does not exist.
    pub async fn comments_for(&self, post_id: Uuid, skip: usize, limit: usize) -> Option<Vec<Comment>> {
        let tables = self.inner.read().await;
        if !tables.posts.contains_key(&post_id) {
            return None;
        }
        let mut comments: Vec<Comment> = tables
            .comments
            .values()
            .filter(|comment| comment.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by_key(|comment| (comment.created_at, comment.id));
        Some(comments.into_iter().skip(skip).take(limit).collect())
    }

    pub async fn update_comment(&self, id: Uuid, content: String) -> Option<Comment> {
        let mut tables = self.inner.write().await;
        let comment = tables.comments.get_mut(&id)?;
        comment.content = content;
        Some(comment.clone())
    }

    pub async fn delete_comment(&self, id: Uuid) -> Option<Comment> {
        self.inner.write().await.comments.remove(&id)
    }
}
