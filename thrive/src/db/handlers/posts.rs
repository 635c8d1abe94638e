//! Database repository for community posts and flags.

use crate::types::{abbrev_uuid, PostId, UserId};
use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::posts::{PostCreateDBRequest, PostDBResponse, PostUpdateDBRequest},
};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing posts
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub skip: i64,
    pub limit: i64,
    pub author_id: Option<UserId>,
    /// When false, hidden posts are excluded (member view)
    pub include_hidden: bool,
    /// Only posts with at least one flag (moderation queue)
    pub flagged_only: bool,
}

const SELECT_POST: &str = r#"
    SELECT p.id, p.author_id, u.username AS author_username, u.display_name AS author_display_name,
           p.body, p.is_hidden,
           (SELECT COUNT(*) FROM post_flags f WHERE f.post_id = p.id) AS flag_count,
           p.created_at, p.updated_at
    FROM community_posts p
    JOIN users u ON u.id = p.author_id
"#;

pub struct Posts<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Posts<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Flag a post for moderation. Idempotent per user: flagging twice is a no-op.
    #[instrument(skip(self), fields(post_id = %abbrev_uuid(&post_id), user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn flag(&mut self, post_id: PostId, user_id: UserId) -> Result<i64> {
        sqlx::query("INSERT INTO post_flags (post_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(post_id)
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;

        let flag_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM post_flags WHERE post_id = $1")
            .bind(post_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(flag_count)
    }

    /// Hide or unhide a post (moderation). Unhiding also clears its flags.
    #[instrument(skip(self), fields(post_id = %abbrev_uuid(&id)), err)]
    pub async fn set_hidden(&mut self, id: PostId, hidden: bool) -> Result<PostDBResponse> {
        sqlx::query("UPDATE community_posts SET is_hidden = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(hidden)
            .execute(&mut *self.db)
            .await?;

        if !hidden {
            sqlx::query("DELETE FROM post_flags WHERE post_id = $1")
                .bind(id)
                .execute(&mut *self.db)
                .await?;
        }

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &PostFilter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM community_posts p
            WHERE ($1::uuid IS NULL OR p.author_id = $1)
              AND (NOT p.is_hidden OR $2)
              AND (NOT $3 OR EXISTS (SELECT 1 FROM post_flags f WHERE f.post_id = p.id))
            "#,
        )
        .bind(filter.author_id)
        .bind(filter.include_hidden)
        .bind(filter.flagged_only)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(count)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Posts<'c> {
    type CreateRequest = PostCreateDBRequest;
    type UpdateRequest = PostUpdateDBRequest;
    type Response = PostDBResponse;
    type Id = PostId;
    type Filter = PostFilter;

    #[instrument(skip(self, request), fields(author_id = %abbrev_uuid(&request.author_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let post_id = Uuid::new_v4();

        sqlx::query("INSERT INTO community_posts (id, author_id, body) VALUES ($1, $2, $3)")
            .bind(post_id)
            .bind(request.author_id)
            .bind(&request.body)
            .execute(&mut *self.db)
            .await?;

        self.get_by_id(post_id).await?.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), fields(post_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let post = sqlx::query_as::<_, PostDBResponse>(&format!("{SELECT_POST} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(post)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<PostId>) -> Result<std::collections::HashMap<Self::Id, PostDBResponse>> {
        if ids.is_empty() {
            return Ok(std::collections::HashMap::new());
        }

        let posts = sqlx::query_as::<_, PostDBResponse>(&format!("{SELECT_POST} WHERE p.id = ANY($1)"))
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(posts.into_iter().map(|p| (p.id, p)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let posts = sqlx::query_as::<_, PostDBResponse>(&format!(
            r#"
            {SELECT_POST}
            WHERE ($1::uuid IS NULL OR p.author_id = $1)
              AND (NOT p.is_hidden OR $2)
              AND (NOT $3 OR EXISTS (SELECT 1 FROM post_flags f WHERE f.post_id = p.id))
            ORDER BY p.created_at DESC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(filter.author_id)
        .bind(filter.include_hidden)
        .bind(filter.flagged_only)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(posts)
    }

    #[instrument(skip(self), fields(post_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM community_posts WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(post_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let updated = sqlx::query(
            r#"
            UPDATE community_posts SET
                body = COALESCE($2, body),
                is_hidden = COALESCE($3, is_hidden),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&request.body)
        .bind(request.is_hidden)
        .execute(&mut *self.db)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::models::users::Role,
        db::{handlers::Users, models::users::UserCreateDBRequest},
    };
    use sqlx::PgPool;

    async fn seed_user(conn: &mut PgConnection, username: &str) -> UserId {
        let mut users = Users::new(conn);
        users
            .create(&UserCreateDBRequest {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                display_name: None,
                role: Role::Member,
                jlpt_goal: None,
                password_hash: None,
            })
            .await
            .unwrap()
            .id
    }

    #[sqlx::test]
    async fn test_create_and_list_posts(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let author_id = seed_user(&mut conn, "poster").await;

        let mut repo = Posts::new(&mut conn);
        let post = repo
            .create(&PostCreateDBRequest {
                author_id,
                body: "今日は漢字を10個覚えました!".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(post.author_username, "poster");
        assert_eq!(post.flag_count, 0);
        assert!(!post.is_hidden);

        let posts = repo
            .list(&PostFilter {
                skip: 0,
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(posts.len(), 1);
    }

    #[sqlx::test]
    async fn test_flag_is_idempotent_per_user(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let author_id = seed_user(&mut conn, "author").await;
        let flagger = seed_user(&mut conn, "flagger").await;

        let mut repo = Posts::new(&mut conn);
        let post = repo
            .create(&PostCreateDBRequest {
                author_id,
                body: "spam".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(repo.flag(post.id, flagger).await.unwrap(), 1);
        assert_eq!(repo.flag(post.id, flagger).await.unwrap(), 1);

        let other = seed_user(&mut conn, "other").await;
        let mut repo = Posts::new(&mut conn);
        assert_eq!(repo.flag(post.id, other).await.unwrap(), 2);
    }

    #[sqlx::test]
    async fn test_hidden_posts_excluded_from_member_view(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let author_id = seed_user(&mut conn, "author").await;

        let mut repo = Posts::new(&mut conn);
        let post = repo
            .create(&PostCreateDBRequest {
                author_id,
                body: "borderline".to_string(),
            })
            .await
            .unwrap();

        let flagger = seed_user(&mut conn, "flagger").await;
        let mut repo = Posts::new(&mut conn);
        repo.flag(post.id, flagger).await.unwrap();
        repo.set_hidden(post.id, true).await.unwrap();

        let member_view = repo
            .list(&PostFilter {
                skip: 0,
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(member_view.is_empty());

        let staff_view = repo
            .list(&PostFilter {
                skip: 0,
                limit: 10,
                include_hidden: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(staff_view.len(), 1);

        // Unhiding clears the flags
        let restored = repo.set_hidden(post.id, false).await.unwrap();
        assert!(!restored.is_hidden);
        assert_eq!(restored.flag_count, 0);
    }
}
