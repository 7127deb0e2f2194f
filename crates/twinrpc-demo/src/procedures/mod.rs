//! The `user` and `post` procedure groups.
//!
//! Both transports serve the same groups; only the [`Bases`] they are built
//! from differ (middleware stages and declared errors).

pub mod post;
pub mod user;

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use regex::Regex;
use twinrpc_core::FieldErrors;
use twinrpc_router::{ProcedureBuilder, Router, RouterError};

use crate::records::{seed_posts, seed_users, Post, User};
use crate::store::{InMemoryRepository, Repository};
use crate::uploads::FileStore;

/// Shared user repository.
pub type Users = Arc<dyn Repository<User>>;

/// Shared post repository.
pub type Posts = Arc<dyn Repository<Post>>;

/// Everything the handlers need, injected when the routers are built.
#[derive(Clone)]
pub struct Services {
    /// User records.
    pub users: Users,
    /// Post records.
    pub posts: Posts,
    /// Upload storage.
    pub files: FileStore,
}

impl Services {
    /// Wires explicit repositories.
    pub fn new(users: Users, posts: Posts, files: FileStore) -> Self {
        Self {
            users,
            posts,
            files,
        }
    }

    /// Fresh in-memory repositories holding the seed records.
    pub fn seeded(files: FileStore) -> Self {
        Self::new(
            Arc::new(InMemoryRepository::seeded("User", seed_users(Utc::now()))),
            Arc::new(InMemoryRepository::seeded("Post", seed_posts())),
            files,
        )
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("users", &self.users.list().len())
            .field("posts", &self.posts.list().len())
            .field("files", &self.files)
            .finish()
    }
}

/// The two procedure bases of one transport.
#[derive(Debug, Clone)]
pub struct Bases {
    /// Base of public procedures.
    pub public: ProcedureBuilder,
    /// `public` plus authorization.
    pub protected: ProcedureBuilder,
}

/// Merges the `user` and `post` groups into one router.
pub fn router(bases: &Bases, services: &Services) -> Result<Router, RouterError> {
    Router::builder()
        .merge("user", user::group(bases, services))
        .merge("post", post::group(bases, services))
        .build()
}

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

fn is_email(candidate: &str) -> bool {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(EMAIL_PATTERN).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(candidate))
}

fn check_email(issues: &mut FieldErrors, field: &str, email: &str) {
    if !is_email(email) {
        issues.add(field, "Invalid email");
    }
}

fn check_not_empty(issues: &mut FieldErrors, field: &str, value: &str) {
    if value.is_empty() {
        issues.add(field, "String must contain at least 1 character(s)");
    }
}

fn into_result(issues: FieldErrors) -> Result<(), FieldErrors> {
    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_email() {
        assert!(is_email("john@example.com"));
        assert!(is_email("a.b+c@sub.example.org"));
        assert!(!is_email("john"));
        assert!(!is_email("john@example"));
        assert!(!is_email("jo hn@example.com"));
    }

    #[test]
    fn test_into_result() {
        let mut issues = FieldErrors::new();
        assert!(into_result(issues.clone()).is_ok());
        check_not_empty(&mut issues, "title", "");
        assert_eq!(into_result(issues).unwrap_err().len(), 1);
    }
}
