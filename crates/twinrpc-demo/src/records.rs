//! User and post records.
//!
//! Records keep their tags and likes as insertion-ordered sets and their
//! metadata as an ordered map, so they convert into [`Value`]s whose sets and
//! maps survive both wire formats.

use chrono::{DateTime, Duration, TimeZone, Utc};
use indexmap::{IndexMap, IndexSet};
use twinrpc_core::Value;

use crate::store::Record;

/// Free-form metadata attached to a record.
///
/// Entries are tagged values, so a date or set stored here keeps its type on
/// the wire.
pub type Metadata = IndexMap<String, Value>;

/// A user account.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// Numeric id.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last login (or last update) time.
    pub last_login_at: DateTime<Utc>,
    /// Tags, unique.
    pub tags: IndexSet<String>,
    /// Preferences such as theme or language.
    pub metadata: Metadata,
    /// Stored avatar file name.
    pub profile_image: Option<String>,
}

impl Record for User {
    fn id(&self) -> u64 {
        self.id
    }
}

impl From<&User> for Value {
    fn from(user: &User) -> Self {
        Value::object([
            ("id", Value::from(user.id)),
            ("name", Value::from(user.name.as_str())),
            ("email", Value::from(user.email.as_str())),
            ("createdAt", Value::from(user.created_at)),
            ("lastLoginAt", Value::from(user.last_login_at)),
            ("tags", Value::set(user.tags.iter())),
            ("metadata", metadata_value(&user.metadata)),
            ("profileImage", Value::from(user.profile_image.clone())),
        ])
    }
}

impl From<User> for Value {
    fn from(user: User) -> Self {
        Value::from(&user)
    }
}

/// A blog post.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    /// Numeric id.
    pub id: u64,
    /// Title.
    pub title: String,
    /// Body text.
    pub content: String,
    /// Id of the authoring user.
    pub author_id: u64,
    /// Publication time.
    pub published_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Tags, unique.
    pub tags: IndexSet<String>,
    /// View counter.
    pub view_count: u64,
    /// Ids of users who liked the post.
    pub likes: IndexSet<u64>,
    /// Reading time, difficulty and similar.
    pub metadata: Metadata,
    /// Stored attachment file names.
    pub attachments: Vec<String>,
}

impl Record for Post {
    fn id(&self) -> u64 {
        self.id
    }
}

impl From<&Post> for Value {
    fn from(post: &Post) -> Self {
        Value::object([
            ("id", Value::from(post.id)),
            ("title", Value::from(post.title.as_str())),
            ("content", Value::from(post.content.as_str())),
            ("authorId", Value::from(post.author_id)),
            ("publishedAt", Value::from(post.published_at)),
            ("updatedAt", Value::from(post.updated_at)),
            ("tags", Value::set(post.tags.iter())),
            ("viewCount", Value::from(post.view_count)),
            ("likes", Value::set(post.likes.iter().copied())),
            ("metadata", metadata_value(&post.metadata)),
            (
                "attachments",
                Value::Array(post.attachments.iter().map(Value::from).collect()),
            ),
        ])
    }
}

impl From<Post> for Value {
    fn from(post: Post) -> Self {
        Value::from(&post)
    }
}

fn metadata_value(metadata: &Metadata) -> Value {
    Value::map(
        metadata
            .iter()
            .map(|(key, value)| (key.as_str(), value.clone())),
    )
}

fn day(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

fn tags<const N: usize>(names: [&str; N]) -> IndexSet<String> {
    names.into_iter().map(str::to_string).collect()
}

fn metadata<const N: usize>(entries: [(&str, Value); N]) -> Metadata {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// The two users every fresh store starts with.
pub fn seed_users(now: DateTime<Utc>) -> Vec<User> {
    vec![
        User {
            id: 1,
            name: "John Doe".to_string(),
            email: "john@example.com".to_string(),
            created_at: day(2023, 1, 15),
            last_login_at: now,
            tags: tags(["admin", "premium", "early-adopter"]),
            metadata: metadata([
                ("theme", "dark".into()),
                ("language", "en".into()),
                ("notifications", true.into()),
            ]),
            profile_image: None,
        },
        User {
            id: 2,
            name: "Jane Smith".to_string(),
            email: "jane@example.com".to_string(),
            created_at: day(2023, 3, 20),
            last_login_at: now - Duration::days(1),
            tags: tags(["user", "beta-tester"]),
            metadata: metadata([
                ("theme", "light".into()),
                ("language", "zh".into()),
                ("notifications", false.into()),
            ]),
            profile_image: None,
        },
    ]
}

/// The two posts every fresh store starts with.
pub fn seed_posts() -> Vec<Post> {
    vec![
        Post {
            id: 1,
            title: "Getting Started with tRPC".to_string(),
            content: "tRPC is a great tool for building type-safe APIs...".to_string(),
            author_id: 1,
            published_at: day(2023, 12, 1),
            updated_at: day(2023, 12, 15),
            tags: tags(["typescript", "trpc", "tutorial"]),
            view_count: 1250,
            likes: [1, 2, 3, 4, 5].into_iter().collect(),
            metadata: metadata([
                ("readingTime", 5_i64.into()),
                ("difficulty", "beginner".into()),
                ("featured", true.into()),
            ]),
            attachments: Vec::new(),
        },
        Post {
            id: 2,
            title: "Advanced TypeScript Patterns".to_string(),
            content: "Exploring advanced TypeScript features...".to_string(),
            author_id: 2,
            published_at: day(2023, 11, 20),
            updated_at: day(2023, 11, 25),
            tags: tags(["typescript", "advanced", "patterns"]),
            view_count: 890,
            likes: [1, 3, 5].into_iter().collect(),
            metadata: metadata([
                ("readingTime", 12_i64.into()),
                ("difficulty", "advanced".into()),
                ("featured", false.into()),
            ]),
            attachments: Vec::new(),
        },
    ]
}
