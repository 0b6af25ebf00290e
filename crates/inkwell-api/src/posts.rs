//! Blog posts
//!
//! Only users with an author record may publish. A `PostCreated` event is
//! published after the post is stored; publication is best effort and at
//! most once, so a failed publish is logged and the post stands.

use crate::auth::Identity;
use crate::error::AppError;
use inkwell_core::{AuthorStore, BlogPost, EventPublisher, NewPost, PostCreated, PostStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Page size cap for listings
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListPostsQuery {
    /// Maximum posts to return (default 20, max 100)
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Clone)]
pub struct PostService {
    authors: Arc<dyn AuthorStore>,
    posts: Arc<dyn PostStore>,
    events: Arc<dyn EventPublisher>,
}

impl PostService {
    pub fn new(
        authors: Arc<dyn AuthorStore>,
        posts: Arc<dyn PostStore>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            authors,
            posts,
            events,
        }
    }

    pub async fn create_post(
        &self,
        identity: &Identity,
        request: CreatePostRequest,
    ) -> Result<BlogPost, AppError> {
        let request = CreatePostRequest {
            title: request.title.trim().to_string(),
            content: request.content,
        };
        request
            .validate()
            .map_err(|_| AppError::BadRequest("Title must be 1-200 characters".to_string()))?;

        // The author record, not the token role, decides.
        let author = self
            .authors
            .find_by_user_id(identity.subject_id)
            .await?
            .ok_or(AppError::Forbidden)?;

        let post = self
            .posts
            .create_post(NewPost {
                author_id: author.id,
                title: request.title,
                content: request.content,
            })
            .await?;

        let event = PostCreated::new(&post, &author);
        if let Err(e) = self.events.publish(&event).await {
            tracing::warn!(post_id = post.id, error = %e, "Failed to publish {}", PostCreated::ROUTING_KEY);
        }

        Ok(post)
    }

    pub async fn get_post(&self, id: u64) -> Result<BlogPost, AppError> {
        self.posts
            .find_post(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Post".to_string()))
    }

    pub async fn list_posts(&self, query: &ListPostsQuery) -> Result<Vec<BlogPost>, AppError> {
        let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
        Ok(self.posts.list_posts(limit, query.offset).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use inkwell_core::{
        AuthorStore, CredentialStore, InkwellError, MemoryEventBus, MemoryStore, NewUser, Role,
    };

    struct FailingPublisher;

    #[async_trait]
    impl EventPublisher for FailingPublisher {
        async fn publish(&self, _event: &PostCreated) -> inkwell_core::Result<()> {
            Err(InkwellError::Unavailable("event stream".to_string()))
        }
    }

    async fn author_identity(store: &MemoryStore) -> Identity {
        let user = store
            .create_user(NewUser {
                email: "author@b.com".to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap();
        store.promote(user.id).await.unwrap();
        Identity {
            subject_id: user.id,
            role: Role::Author,
            jti: "jti".to_string(),
        }
    }

    fn request(title: &str) -> CreatePostRequest {
        CreatePostRequest {
            title: title.to_string(),
            content: "body".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_post_publishes_once() {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(MemoryEventBus::default());
        let service = PostService::new(store.clone(), store.clone(), bus.clone());
        let identity = author_identity(&store).await;

        let post = service.create_post(&identity, request("Hello")).await.unwrap();

        let published = bus.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].post_id, post.id);
        assert_eq!(published[0].user_id, identity.subject_id);
        assert!(store.find_post(post.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_post() {
        let store = Arc::new(MemoryStore::new());
        let service = PostService::new(store.clone(), store.clone(), Arc::new(FailingPublisher));
        let identity = author_identity(&store).await;

        let post = service.create_post(&identity, request("Hello")).await.unwrap();
        assert_eq!(service.get_post(post.id).await.unwrap().title, "Hello");
    }

    #[tokio::test]
    async fn test_requires_author_record() {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(MemoryEventBus::default());
        let service = PostService::new(store.clone(), store.clone(), bus.clone());

        // token claims AUTHOR but there is no author record
        let identity = Identity {
            subject_id: 77,
            role: Role::Author,
            jti: "jti".to_string(),
        };
        assert!(matches!(
            service.create_post(&identity, request("Hello")).await,
            Err(AppError::Forbidden)
        ));
        assert!(bus.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_title_rejected() {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(MemoryEventBus::default());
        let service = PostService::new(store.clone(), store.clone(), bus);
        let identity = author_identity(&store).await;

        assert!(matches!(
            service.create_post(&identity, request("   ")).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_list_clamps_limit() {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(MemoryEventBus::default());
        let service = PostService::new(store.clone(), store.clone(), bus);
        let identity = author_identity(&store).await;

        for i in 0..3 {
            service
                .create_post(&identity, request(&format!("post {i}")))
                .await
                .unwrap();
        }

        let posts = service
            .list_posts(&ListPostsQuery { limit: 0, offset: 0 })
            .await
            .unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "post 2");
    }

    #[tokio::test]
    async fn test_get_missing_post() {
        let store = Arc::new(MemoryStore::new());
        let service = PostService::new(
            store.clone(),
            store.clone(),
            Arc::new(MemoryEventBus::default()),
        );
        assert!(matches!(
            service.get_post(1).await,
            Err(AppError::NotFound(_))
        ));
    }
}
