//! The `user` group.

use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexSet;
use serde::Deserialize;
use twinrpc_core::{FieldErrors, ProcedureResult, Value};
use twinrpc_router::{Procedure, ProcedureGroup, Validate};

use super::{check_email, into_result, Bases, Services, Users};
use crate::records::{Metadata, User};
use crate::uploads::{extension_of, Category, FileName, FileStore};

/// `{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ById {
    /// Record id.
    pub id: u64,
}

impl Validate for ById {}

/// Partial update of a user.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateUser {
    /// User to update.
    pub id: u64,
    /// New name.
    pub name: Option<String>,
    /// New email.
    pub email: Option<String>,
    /// Replacement tags.
    pub tags: Option<Vec<String>>,
    /// Replacement metadata.
    pub metadata: Option<Metadata>,
}

impl Validate for UpdateUser {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut issues = FieldErrors::new();
        if let Some(email) = &self.email {
            check_email(&mut issues, "email", email);
        }
        into_result(issues)
    }
}

/// A new user.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Preferences.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Validate for CreateUser {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut issues = FieldErrors::new();
        check_email(&mut issues, "email", &self.email);
        into_result(issues)
    }
}

/// A base64 avatar.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAvatar {
    /// Owner.
    pub user_id: u64,
    /// Client file name; only its extension is kept.
    pub file_name: String,
    /// Base64 file contents.
    pub file_data: String,
    /// Declared MIME type.
    pub file_type: String,
}

impl Validate for UploadAvatar {}

/// Builds the group.
pub fn group(bases: &Bases, services: &Services) -> ProcedureGroup {
    ProcedureGroup::new()
        .procedure("getUser", get_user(bases, services))
        .procedure("getAllUsers", get_all_users(bases, services))
        .procedure("updateUser", update_user(bases, services))
        .procedure("uploadAvatar", upload_avatar(bases, services))
        .procedure("createUser", create_user(bases, services))
}

fn get_user(bases: &Bases, services: &Services) -> Procedure {
    let users = Arc::clone(&services.users);
    bases
        .public
        .clone()
        .input::<ById>()
        .query(move |_ctx, input: ById| find_user(Arc::clone(&users), input.id))
}

async fn find_user(users: Users, id: u64) -> ProcedureResult<Value> {
    Ok(Value::from(users.require(id)?))
}

fn get_all_users(bases: &Bases, services: &Services) -> Procedure {
    let users = Arc::clone(&services.users);
    bases.public.clone().query(move |_ctx| {
        let users = Arc::clone(&users);
        async move { Ok(Value::from(users.list())) }
    })
}

fn update_user(bases: &Bases, services: &Services) -> Procedure {
    let users = Arc::clone(&services.users);
    bases
        .public
        .clone()
        .input::<UpdateUser>()
        .mutation(move |_ctx, input: UpdateUser| apply_update(Arc::clone(&users), input))
}

async fn apply_update(users: Users, input: UpdateUser) -> ProcedureResult<Value> {
    let mut user = users.require(input.id)?;

    if let Some(name) = input.name.filter(|n| !n.is_empty()) {
        user.name = name;
    }
    if let Some(email) = input.email.filter(|e| !e.is_empty()) {
        user.email = email;
    }
    if let Some(tags) = input.tags {
        user.tags = tags.into_iter().collect();
    }
    if let Some(metadata) = input.metadata {
        user.metadata = metadata;
    }
    user.last_login_at = Utc::now();

    users.put(user.clone());
    tracing::debug!(user_id = user.id, "user updated");
    Ok(Value::from(user))
}

fn upload_avatar(bases: &Bases, services: &Services) -> Procedure {
    let users = Arc::clone(&services.users);
    let files = services.files.clone();
    bases
        .public
        .clone()
        .input::<UploadAvatar>()
        .mutation(move |_ctx, input: UploadAvatar| {
            store_avatar(Arc::clone(&users), files.clone(), input)
        })
}

async fn store_avatar(users: Users, files: FileStore, input: UploadAvatar) -> ProcedureResult<Value> {
    let mut user = users.require(input.user_id)?;

    let prefix = input.user_id.to_string();
    let name = FileName {
        prefix: &prefix,
        extension: extension_of(&input.file_name),
        index: None,
    };
    let stored = files
        .save_base64(Category::Avatars, name, &input.file_data)
        .await?;

    let now = Utc::now();
    user.profile_image = Some(stored.file_name.clone());
    user.last_login_at = now;
    users.put(user.clone());

    Ok(Value::object([
        ("message", Value::from("Avatar uploaded successfully")),
        ("fileName", Value::from(stored.file_name.as_str())),
        ("filePath", Value::from(stored.file_path.as_str())),
        ("fileType", Value::from(input.file_type)),
        ("size", Value::from(stored.size)),
        ("uploadedAt", Value::from(now)),
        ("user", Value::from(user)),
    ]))
}

fn create_user(bases: &Bases, services: &Services) -> Procedure {
    let users = Arc::clone(&services.users);
    bases
        .public
        .clone()
        .input::<CreateUser>()
        .mutation(move |_ctx, input: CreateUser| insert_user(Arc::clone(&users), input))
}

async fn insert_user(users: Users, input: CreateUser) -> ProcedureResult<Value> {
    let now = Utc::now();
    let user = User {
        id: users.next_id(),
        name: input.name,
        email: input.email,
        created_at: now,
        last_login_at: now,
        tags: input.tags.into_iter().collect::<IndexSet<_>>(),
        metadata: input.metadata,
        profile_image: None,
    };
    users.put(user.clone());
    tracing::info!(user_id = user.id, "user created");
    Ok(Value::from(user))
}
