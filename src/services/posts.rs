use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{AuthorSummary, Post, PostChanges, PostFilter};
use crate::pagination::{PageParams, PaginationMeta};
use crate::store::{PostStore, UserStore};
use crate::validators::{is_valid_post_content, is_valid_post_title};

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub is_published: bool,
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostStore>,
    users: Arc<dyn UserStore>,
}

fn not_found() -> AppError {
    AppError::NotFound("Post not found".to_string())
}

impl PostService {
    pub fn new(posts: Arc<dyn PostStore>, users: Arc<dyn UserStore>) -> Self {
        Self { posts, users }
    }

    /// # Errors
    /// `NotFound` if the author no longer exists
    pub async fn create_post(
        &self,
        author_id: Uuid,
        request: CreatePostRequest,
    ) -> Result<Post, AppError> {
        let title = is_valid_post_title(&request.title)?;
        let content = is_valid_post_content(&request.content)?;

        let author = self
            .users
            .get_by_id(author_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let mut post = Post::new(author_id, title, content, request.is_published);
        self.posts.create(&post).await?;

        tracing::info!(post_id = %post.id, author_id = %author_id, "Post created");
        post.author = Some(AuthorSummary::from(&author));
        Ok(post)
    }

    pub async fn get_post(&self, id: Uuid) -> Result<Post, AppError> {
        let post = self.posts.get_by_id(id).await?.ok_or_else(not_found)?;
        let mut posts = self.attach_authors(vec![post]).await?;
        posts.pop().ok_or_else(not_found)
    }

    /// All posts, optionally of one author, newest first
    pub async fn list_posts(
        &self,
        page: PageParams,
        author_id: Option<Uuid>,
    ) -> Result<(Vec<Post>, PaginationMeta), AppError> {
        self.list(
            page,
            PostFilter {
                author_id,
                published_only: false,
            },
        )
        .await
    }

    pub async fn list_published(
        &self,
        page: PageParams,
    ) -> Result<(Vec<Post>, PaginationMeta), AppError> {
        self.list(
            page,
            PostFilter {
                author_id: None,
                published_only: true,
            },
        )
        .await
    }

    async fn list(
        &self,
        page: PageParams,
        filter: PostFilter,
    ) -> Result<(Vec<Post>, PaginationMeta), AppError> {
        let posts = self.posts.list(filter, page.limit(), page.offset()).await?;
        let total = self.posts.count(filter).await?;
        Ok((self.attach_authors(posts).await?, page.meta(total)))
    }

    /// # Errors
    /// - `NotFound` if the post does not exist
    /// - `Forbidden` unless `author_id` wrote the post
    pub async fn update_post(
        &self,
        id: Uuid,
        author_id: Uuid,
        changes: PostChanges,
    ) -> Result<Post, AppError> {
        let mut post = self.owned(id, author_id).await?;

        let changes = PostChanges {
            title: changes.title.as_deref().map(is_valid_post_title).transpose()?,
            content: changes
                .content
                .as_deref()
                .map(is_valid_post_content)
                .transpose()?,
            is_published: changes.is_published,
        };
        changes.apply(&mut post);

        if !self.posts.update(&post).await? {
            return Err(not_found());
        }
        tracing::info!(post_id = %id, author_id = %author_id, "Post updated");
        self.get_post(id).await
    }

    pub async fn delete_post(&self, id: Uuid, author_id: Uuid) -> Result<(), AppError> {
        self.owned(id, author_id).await?;
        if !self.posts.delete(id).await? {
            return Err(not_found());
        }
        tracing::info!(post_id = %id, author_id = %author_id, "Post deleted");
        Ok(())
    }

    pub async fn publish_post(&self, id: Uuid, author_id: Uuid) -> Result<Post, AppError> {
        self.set_published(id, author_id, true).await
    }

    pub async fn unpublish_post(&self, id: Uuid, author_id: Uuid) -> Result<Post, AppError> {
        self.set_published(id, author_id, false).await
    }

    async fn set_published(
        &self,
        id: Uuid,
        author_id: Uuid,
        is_published: bool,
    ) -> Result<Post, AppError> {
        self.update_post(
            id,
            author_id,
            PostChanges {
                is_published: Some(is_published),
                ..PostChanges::default()
            },
        )
        .await
    }

    async fn owned(&self, id: Uuid, author_id: Uuid) -> Result<Post, AppError> {
        let post = self.posts.get_by_id(id).await?.ok_or_else(not_found)?;
        if post.author_id != author_id {
            tracing::warn!(post_id = %id, user_id = %author_id, "Post modification by non-author");
            return Err(AppError::Forbidden(
                "Only the author can modify this post".to_string(),
            ));
        }
        Ok(post)
    }

    async fn attach_authors(&self, mut posts: Vec<Post>) -> Result<Vec<Post>, AppError> {
        let mut authors: HashMap<Uuid, Option<AuthorSummary>> = HashMap::new();
        for post in posts.iter_mut() {
            if !authors.contains_key(&post.author_id) {
                let author = self.users.get_by_id(post.author_id).await?;
                authors.insert(post.author_id, author.as_ref().map(AuthorSummary::from));
            }
            post.author = authors.get(&post.author_id).cloned().flatten();
        }
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use crate::store::{InMemoryPostStore, InMemoryUserStore};

    async fn harness() -> (PostService, User, User) {
        let users = Arc::new(InMemoryUserStore::new());
        let alice = User::new("alice".to_string(), "alice@x.com".to_string(), "h".to_string());
        let bob = User::new("bob".to_string(), "bob@x.com".to_string(), "h".to_string());
        users.create(&alice).await.unwrap();
        users.create(&bob).await.unwrap();

        let service = PostService::new(Arc::new(InMemoryPostStore::new()), users);
        (service, alice, bob)
    }

    fn draft(title: &str) -> CreatePostRequest {
        CreatePostRequest {
            title: title.to_string(),
            content: "Body text".to_string(),
            is_published: false,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_with_author() {
        let (service, alice, _) = harness().await;
        let created = service.create_post(alice.id, draft("Hello")).await.unwrap();
        let fetched = service.get_post(created.id).await.unwrap();

        assert_eq!(fetched.title, "Hello");
        assert!(!fetched.is_published);
        assert_eq!(fetched.author.unwrap().username, "alice");
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let (service, alice, _) = harness().await;

        let long_title = draft(&"t".repeat(201));
        let empty_content = CreatePostRequest {
            content: "  ".to_string(),
            ..draft("Title")
        };

        assert!(matches!(
            service.create_post(alice.id, long_title).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.create_post(alice.id, empty_content).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.create_post(Uuid::new_v4(), draft("Orphan")).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_only_author_may_modify() {
        let (service, alice, bob) = harness().await;
        let post = service.create_post(alice.id, draft("Mine")).await.unwrap();

        let changes = PostChanges {
            title: Some("Stolen".to_string()),
            ..PostChanges::default()
        };
        assert!(matches!(
            service.update_post(post.id, bob.id, changes).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.delete_post(post.id, bob.id).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.publish_post(post.id, bob.id).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_unpublish_and_listing() {
        let (service, alice, bob) = harness().await;
        let first = service.create_post(alice.id, draft("First")).await.unwrap();
        service.create_post(bob.id, draft("Second")).await.unwrap();

        let published = service.publish_post(first.id, alice.id).await.unwrap();
        assert!(published.is_published);

        let (items, meta) = service.list_published(PageParams::default()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(meta.total, 1);

        let (items, meta) = service.list_posts(PageParams::new(1, 1), None).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(meta.total, 2);
        assert_eq!(meta.total_pages, 2);

        let (items, _) = service
            .list_posts(PageParams::default(), Some(bob.id))
            .await
            .unwrap();
        assert_eq!(items[0].author.as_ref().unwrap().username, "bob");

        let unpublished = service.unpublish_post(first.id, alice.id).await.unwrap();
        assert!(!unpublished.is_published);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_post() {
        let (service, alice, _) = harness().await;
        let id = Uuid::new_v4();

        assert!(matches!(
            service.update_post(id, alice.id, PostChanges::default()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.delete_post(id, alice.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_post() {
        let (service, alice, _) = harness().await;
        let post = service.create_post(alice.id, draft("Bye")).await.unwrap();

        service.delete_post(post.id, alice.id).await.unwrap();
        assert!(matches!(service.get_post(post.id).await, Err(AppError::NotFound(_))));
    }
}
