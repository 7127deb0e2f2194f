//! The `post` group.

use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexMap;
use serde::Deserialize;
use twinrpc_core::{BinaryInput, FieldErrors, FormData, ProcedureError, ProcedureResult, Value};
use twinrpc_router::{ProcedureGroup, Validate};

use super::user::ById;
use super::{check_not_empty, into_result, Bases, Posts, Services};
use crate::records::{Metadata, Post};
use crate::uploads::{extension_of, Category, FileName, FileStore, StoredFile};

/// Largest page `getPosts` serves.
pub const MAX_PAGE_SIZE: u64 = 50;

/// Number of entries `getPopularTags` returns.
pub const POPULAR_TAG_COUNT: usize = 10;

/// The post binary uploads attach to.
const SINGLE_FILE_POST_ID: u64 = 1;

const OCTET_STREAM: &str = "application/octet-stream";

/// Paging and filters of `getPosts`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPosts {
    /// 1-based page.
    #[serde(default = "default_page")]
    pub page: u64,
    /// Page size.
    #[serde(default = "default_limit")]
    pub limit: u64,
    /// Only posts carrying this tag.
    pub tag: Option<String>,
    /// Only posts by this author.
    pub author_id: Option<u64>,
}

const fn default_page() -> u64 {
    1
}

const fn default_limit() -> u64 {
    10
}

impl Default for ListPosts {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
            tag: None,
            author_id: None,
        }
    }
}

impl Validate for ListPosts {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut issues = FieldErrors::new();
        if self.page == 0 {
            issues.add("page", "Number must be greater than or equal to 1");
        }
        if self.limit == 0 {
            issues.add("limit", "Number must be greater than or equal to 1");
        }
        if self.limit > MAX_PAGE_SIZE {
            issues.add(
                "limit",
                format!("Number must be less than or equal to {MAX_PAGE_SIZE}"),
            );
        }
        into_result(issues)
    }
}

/// A new post.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePost {
    /// Title, non-empty.
    pub title: String,
    /// Body, non-empty.
    pub content: String,
    /// Author id.
    pub author_id: u64,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Validate for CreatePost {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut issues = FieldErrors::new();
        check_not_empty(&mut issues, "title", &self.title);
        check_not_empty(&mut issues, "content", &self.content);
        into_result(issues)
    }
}

/// `{postId, userId}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleLike {
    /// Post to like or unlike.
    pub post_id: u64,
    /// Acting user.
    pub user_id: u64,
}

impl Validate for ToggleLike {}

/// A base64 attachment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAttachment {
    /// Owning post.
    pub post_id: u64,
    /// Client file name.
    pub file_name: String,
    /// Base64 contents.
    pub file_data: String,
    /// Declared MIME type.
    pub file_type: String,
}

impl Validate for UploadAttachment {}

/// One image of `uploadImages`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUpload {
    /// Client file name.
    pub file_name: String,
    /// Base64 contents.
    pub file_data: String,
    /// Alternative text.
    pub alt: Option<String>,
}

/// Several base64 images for one post.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadImages {
    /// Owning post.
    pub post_id: u64,
    /// Images in upload order.
    pub images: Vec<ImageUpload>,
}

impl Validate for UploadImages {}

/// Builds the group.
pub fn group(bases: &Bases, services: &Services) -> ProcedureGroup {
    let posts = &services.posts;
    let files = &services.files;
    let public = &bases.public;

    ProcedureGroup::new()
        .procedure("getPost", {
            let posts = Arc::clone(posts);
            public
                .clone()
                .input::<ById>()
                .query(move |_ctx, input: ById| find_post(Arc::clone(&posts), input.id))
        })
        .procedure("getPosts", {
            let posts = Arc::clone(posts);
            bases
                .protected
                .clone()
                .input::<Option<ListPosts>>()
                .query(move |_ctx, input: Option<ListPosts>| {
                    list_posts(Arc::clone(&posts), input.unwrap_or_default())
                })
        })
        .procedure("createPost", {
            let posts = Arc::clone(posts);
            public
                .clone()
                .input::<CreatePost>()
                .mutation(move |_ctx, input: CreatePost| insert_post(Arc::clone(&posts), input))
        })
        .procedure("toggleLike", {
            let posts = Arc::clone(posts);
            public
                .clone()
                .input::<ToggleLike>()
                .mutation(move |_ctx, input: ToggleLike| toggle_like(Arc::clone(&posts), input))
        })
        .procedure("uploadAttachment", {
            let (posts, files) = (Arc::clone(posts), files.clone());
            public
                .clone()
                .input::<UploadAttachment>()
                .mutation(move |_ctx, input: UploadAttachment| {
                    attach_base64(Arc::clone(&posts), files.clone(), input)
                })
        })
        .procedure("uploadAttachmentFormData", {
            let (posts, files) = (Arc::clone(posts), files.clone());
            public.clone().form_mutation(move |_ctx, form: FormData| {
                attach_form(Arc::clone(&posts), files.clone(), form)
            })
        })
        .procedure("uploadSingleFile", {
            let (posts, files) = (Arc::clone(posts), files.clone());
            public.clone().binary_mutation(move |_ctx, body: BinaryInput| {
                attach_binary(Arc::clone(&posts), files.clone(), body)
            })
        })
        .procedure("uploadBinaryData", {
            let files = files.clone();
            public
                .clone()
                .binary_mutation(move |_ctx, body: BinaryInput| store_binary(files.clone(), body))
        })
        .procedure("getPopularTags", {
            let posts = Arc::clone(posts);
            public
                .clone()
                .query(move |_ctx| popular_tags(Arc::clone(&posts)))
        })
        .procedure("uploadImages", {
            let (posts, files) = (Arc::clone(posts), files.clone());
            public
                .clone()
                .input::<UploadImages>()
                .mutation(move |_ctx, input: UploadImages| {
                    store_images(Arc::clone(&posts), files.clone(), input)
                })
        })
}

async fn find_post(posts: Posts, id: u64) -> ProcedureResult<Value> {
    Ok(Value::from(posts.require(id)?))
}

async fn list_posts(posts: Posts, query: ListPosts) -> ProcedureResult<Value> {
    let matching: Vec<Post> = posts
        .list()
        .into_iter()
        .filter(|post| query.tag.as_ref().map_or(true, |tag| post.tags.contains(tag)))
        .filter(|post| query.author_id.map_or(true, |author| post.author_id == author))
        .collect();

    let total = matching.len() as u64;
    let start = usize::try_from((query.page - 1).saturating_mul(query.limit)).unwrap_or(usize::MAX);
    let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);
    let page: Vec<Value> = matching
        .iter()
        .skip(start)
        .take(limit)
        .map(Value::from)
        .collect();

    Ok(Value::object([
        ("posts", Value::Array(page)),
        (
            "pagination",
            Value::object([
                ("page", query.page),
                ("limit", query.limit),
                ("total", total),
                ("totalPages", total.div_ceil(query.limit)),
            ]),
        ),
        ("queryTime", Value::from(Utc::now())),
    ]))
}

async fn insert_post(posts: Posts, input: CreatePost) -> ProcedureResult<Value> {
    let now = Utc::now();
    let post = Post {
        id: posts.next_id(),
        title: input.title,
        content: input.content,
        author_id: input.author_id,
        published_at: now,
        updated_at: now,
        tags: input.tags.into_iter().collect(),
        view_count: 0,
        likes: indexmap::IndexSet::new(),
        metadata: input.metadata,
        attachments: Vec::new(),
    };
    posts.put(post.clone());
    tracing::info!(post_id = post.id, "post created");
    Ok(Value::from(post))
}

async fn toggle_like(posts: Posts, input: ToggleLike) -> ProcedureResult<Value> {
    let mut post = posts.require(input.post_id)?;

    let liked = if post.likes.shift_remove(&input.user_id) {
        false
    } else {
        post.likes.insert(input.user_id);
        true
    };
    let now = Utc::now();
    post.updated_at = now;
    let total_likes = post.likes.len();
    posts.put(post);

    Ok(Value::object([
        ("postId", Value::from(input.post_id)),
        ("liked", Value::from(liked)),
        ("totalLikes", Value::from(total_likes)),
        ("actionTime", Value::from(now)),
    ]))
}

/// Records stored attachments on a post and saves it.
fn attach(posts: &Posts, mut post: Post, stored: &[&StoredFile]) -> Post {
    post.attachments
        .extend(stored.iter().map(|file| file.file_name.clone()));
    post.updated_at = Utc::now();
    posts.put(post.clone());
    post
}

async fn attach_base64(
    posts: Posts,
    files: FileStore,
    input: UploadAttachment,
) -> ProcedureResult<Value> {
    let post = posts.require(input.post_id)?;
    let prefix = format!("post_{}", input.post_id);
    let name = FileName {
        prefix: &prefix,
        extension: extension_of(&input.file_name),
        index: None,
    };
    let stored = files
        .save_base64(Category::Attachments, name, &input.file_data)
        .await?;
    let post = attach(&posts, post, &[&stored]);

    Ok(Value::object([
        ("message", Value::from("Attachment uploaded successfully")),
        ("fileName", Value::from(stored.file_name.as_str())),
        ("filePath", Value::from(stored.file_path.as_str())),
        ("mimeType", Value::from(input.file_type)),
        ("uploadedAt", Value::from(Utc::now())),
        ("fileSize", Value::from(stored.size)),
        ("post", Value::from(post)),
    ]))
}

async fn attach_form(posts: Posts, files: FileStore, form: FormData) -> ProcedureResult<Value> {
    let (Some(post_id), Some(file)) = (form.field("postId"), form.file("file")) else {
        return Err(ProcedureError::bad_request("Post ID and file are required"));
    };
    let post_id: u64 = post_id
        .trim()
        .parse()
        .map_err(|_| ProcedureError::bad_request(format!("invalid post id `{post_id}`")))?;
    let post = posts.require(post_id)?;

    let original_name = file.file_name.clone().unwrap_or_default();
    let prefix = format!("post_{post_id}");
    let name = FileName {
        prefix: &prefix,
        extension: extension_of(&original_name),
        index: None,
    };
    let stored = files.save(Category::Attachments, name, &file.bytes).await?;
    let post = attach(&posts, post, &[&stored]);

    Ok(Value::object([
        ("message", Value::from("Attachment uploaded successfully via FormData")),
        ("fileName", Value::from(stored.file_name.as_str())),
        ("originalName", Value::from(original_name)),
        ("filePath", Value::from(stored.file_path.as_str())),
        ("uploadedAt", Value::from(Utc::now())),
        ("fileSize", Value::from(stored.size)),
        (
            "mimeType",
            Value::from(file.content_type.as_deref().unwrap_or(OCTET_STREAM)),
        ),
        ("post", Value::from(post)),
    ]))
}

async fn attach_binary(posts: Posts, files: FileStore, body: BinaryInput) -> ProcedureResult<Value> {
    let post = posts.require(SINGLE_FILE_POST_ID)?;
    let prefix = format!("post_{SINGLE_FILE_POST_ID}");
    let name = FileName {
        prefix: &prefix,
        extension: ".bin",
        index: None,
    };
    let stored = files.save(Category::Files, name, &body.bytes).await?;
    let post = attach(&posts, post, &[&stored]);

    Ok(Value::object([
        ("message", Value::from("File uploaded successfully via binary stream")),
        ("fileName", Value::from(stored.file_name.as_str())),
        ("filePath", Value::from(stored.file_path.as_str())),
        ("uploadedAt", Value::from(Utc::now())),
        ("fileSize", Value::from(stored.size)),
        (
            "mimeType",
            Value::from(body.content_type.as_deref().unwrap_or(OCTET_STREAM)),
        ),
        ("post", Value::from(post)),
    ]))
}

async fn store_binary(files: FileStore, body: BinaryInput) -> ProcedureResult<Value> {
    let name = FileName {
        prefix: "binary",
        extension: ".bin",
        index: None,
    };
    let stored = files.save(Category::Binary, name, &body.bytes).await?;

    Ok(Value::object([
        ("message", Value::from("Binary data uploaded successfully")),
        ("fileName", Value::from(stored.file_name.as_str())),
        ("filePath", Value::from(stored.file_path.as_str())),
        ("uploadedAt", Value::from(Utc::now())),
        ("fileSize", Value::from(stored.size)),
    ]))
}

async fn popular_tags(posts: Posts) -> ProcedureResult<Value> {
    let mut counts: IndexMap<String, u64> = IndexMap::new();
    for post in posts.list() {
        for tag in post.tags {
            *counts.entry(tag).or_insert(0) += 1;
        }
    }
    let unique = counts.len();

    let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(POPULAR_TAG_COUNT);

    Ok(Value::object([
        (
            "tags",
            Value::Array(
                ranked
                    .into_iter()
                    .map(|(tag, count)| Value::Array(vec![Value::from(tag), Value::from(count)]))
                    .collect(),
            ),
        ),
        ("generatedAt", Value::from(Utc::now())),
        ("totalUniqueTags", Value::from(unique)),
    ]))
}

async fn store_images(
    posts: Posts,
    files: FileStore,
    input: UploadImages,
) -> ProcedureResult<Value> {
    let post = posts.require(input.post_id)?;
    let prefix = format!("post_{}", input.post_id);

    let mut stored = Vec::with_capacity(input.images.len());
    for (index, image) in input.images.iter().enumerate() {
        let name = FileName {
            prefix: &prefix,
            extension: extension_of(&image.file_name),
            index: Some(index),
        };
        let file = files
            .save_base64(Category::Images, name, &image.file_data)
            .await?;
        stored.push(file);
    }

    let refs: Vec<&StoredFile> = stored.iter().collect();
    let post = attach(&posts, post, &refs);

    let uploaded: Vec<Value> = input
        .images
        .iter()
        .zip(&stored)
        .map(|(image, file)| {
            Value::object([
                ("originalName", Value::from(image.file_name.as_str())),
                ("fileName", Value::from(file.file_name.as_str())),
                ("filePath", Value::from(file.file_path.as_str())),
                ("alt", Value::from(image.alt.clone())),
                ("size", Value::from(file.size)),
            ])
        })
        .collect();

    Ok(Value::object([
        (
            "message",
            Value::from(format!("{} images uploaded successfully", input.images.len())),
        ),
        ("uploadedImages", Value::Array(uploaded)),
        ("uploadedAt", Value::from(Utc::now())),
        ("post", Value::from(post)),
    ]))
}
