//! The demo procedures driven end to end through both transports.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, COOKIE};
use http::{Request, StatusCode};
use http_body_util::{BodyExt, Full};
use tempfile::TempDir;
use twinrpc_config::AppConfig;
use twinrpc_core::{CompactMetaTransformer, PathMapTransformer, Transformer, Value};
use twinrpc_demo::layers::{bases, Transport};
use twinrpc_demo::procedures::{post, user, Services};
use twinrpc_demo::{build_app, FileStore};
use twinrpc_router::{Router, RouterError};
use twinrpc_server::App;

struct Fixture {
    app: App,
    uploads: TempDir,
}

fn fixture_with(configure: impl FnOnce(&mut AppConfig)) -> Fixture {
    let uploads = TempDir::new().unwrap();
    let mut config = AppConfig::default();
    config.uploads.root = uploads.path().to_path_buf();
    configure(&mut config);

    let services = Services::seeded(FileStore::new(uploads.path()));
    let app = build_app(&config, services).unwrap();
    Fixture { app, uploads }
}

fn fixture() -> Fixture {
    fixture_with(|_| {})
}

async fn send(app: &App, request: Request<Full<Bytes>>) -> (StatusCode, serde_json::Value) {
    let response = app.handle(request, None).await;
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, body)
}

fn legacy_get(path: &str, input: Option<serde_json::Value>) -> Request<Full<Bytes>> {
    let uri = match input {
        Some(input) => {
            let query = serde_urlencoded::to_string([("input", input.to_string())]).unwrap();
            format!("/trpc/{path}?{query}")
        }
        None => format!("/trpc/{path}"),
    };
    Request::get(uri).body(Full::new(Bytes::new())).unwrap()
}

fn json_post(uri: &str, body: serde_json::Value) -> Request<Full<Bytes>> {
    Request::post(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

fn legacy_data(body: &serde_json::Value) -> Value {
    PathMapTransformer::new()
        .decode(body["result"]["data"].clone())
        .unwrap()
}

#[tokio::test]
async fn test_get_post_seeded_and_missing() {
    let Fixture { app, .. } = fixture();

    let (status, body) = send(&app, legacy_get("getPost", Some(serde_json::json!({"id": 1})))).await;
    assert_eq!(status, StatusCode::OK);
    let post = legacy_data(&body);
    assert_eq!(post.get("title").and_then(Value::as_str), Some("Getting Started with tRPC"));
    assert!(post.get("publishedAt").unwrap().as_date().is_some());
    assert_eq!(post.get("likes"), Some(&Value::set([1_u64, 2, 3, 4, 5])));

    let (status, body) =
        send(&app, legacy_get("getPost", Some(serde_json::json!({"id": 999})))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["json"]["message"], "Post not found");
    assert_eq!(body["error"]["json"]["data"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_toggle_like_twice() {
    let Fixture { app, .. } = fixture();
    let input = serde_json::json!({"postId": 1, "userId": 9});

    let (status, body) = send(&app, json_post("/trpc/toggleLike", input.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let first = legacy_data(&body);
    assert_eq!(first.get("liked").and_then(Value::as_bool), Some(true));
    assert_eq!(first.get("totalLikes").and_then(Value::as_i64), Some(6));

    let (_, body) = send(&app, json_post("/trpc/toggleLike", input)).await;
    let second = legacy_data(&body);
    assert_eq!(second.get("liked").and_then(Value::as_bool), Some(false));
    assert_eq!(second.get("totalLikes").and_then(Value::as_i64), Some(5));
}

#[tokio::test]
async fn test_get_posts_requires_cookie_on_legacy_only() {
    let Fixture { app, .. } = fixture();

    let (status, body) = send(&app, legacy_get("getPosts", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["json"]["code"], -32001);

    let request = Request::get("/trpc/getPosts")
        .header(COOKIE, "__id_token=abc")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let page = legacy_data(&body);
    let pagination = page.get("pagination").unwrap();
    assert_eq!(pagination.get("total").and_then(Value::as_i64), Some(2));
    assert_eq!(pagination.get("totalPages").and_then(Value::as_i64), Some(1));

    let (status, body) = send(
        &app,
        json_post("/rpc/post/getPosts", serde_json::json!({"json": {"tag": "advanced"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["json"]["posts"].as_array().unwrap().len(), 1);
    assert_eq!(body["json"]["posts"][0]["id"], 2);
}

#[tokio::test]
async fn test_get_posts_rejects_oversized_page() {
    let Fixture { app, .. } = fixture_with(|config| config.security.enforce_legacy_auth = false);

    let (status, body) =
        send(&app, legacy_get("getPosts", Some(serde_json::json!({"limit": 51})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["json"]["data"]["issues"]["limit"].is_array());
}

#[tokio::test]
async fn test_create_user_validates_email_and_assigns_next_id() {
    let Fixture { app, .. } = fixture();

    let (status, body) = send(
        &app,
        json_post(
            "/rpc/user/createUser",
            serde_json::json!({"json": {"name": "Ann", "email": "not-an-email"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["json"]["code"], "BAD_REQUEST");

    let (status, body) = send(
        &app,
        json_post(
            "/rpc/user/createUser",
            serde_json::json!({"json": {"name": "Ann", "email": "ann@example.com", "tags": ["a", "a", "b"]}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let created = CompactMetaTransformer::new().decode(body).unwrap();
    assert_eq!(created.get("id").and_then(Value::as_i64), Some(3));
    assert_eq!(created.get("tags"), Some(&Value::set(["a", "b"])));
}

#[tokio::test]
async fn test_update_user_replaces_metadata() {
    let Fixture { app, .. } = fixture();

    let (status, body) = send(
        &app,
        json_post(
            "/trpc/updateUser",
            serde_json::json!({"id": 2, "name": "Jane S.", "metadata": {"theme": "solarized"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let user = legacy_data(&body);
    assert_eq!(user.get("name").and_then(Value::as_str), Some("Jane S."));
    assert_eq!(user.get("email").and_then(Value::as_str), Some("jane@example.com"));
    assert_eq!(
        user.get("metadata"),
        Some(&Value::map([("theme", "solarized")]))
    );
}

#[tokio::test]
async fn test_metadata_dates_and_sets_survive_an_update() {
    let Fixture { app, .. } = fixture();
    let seen = chrono::DateTime::parse_from_rfc3339("2024-02-03T04:05:06.789123Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let input = Value::object([
        ("id", Value::from(1_i64)),
        (
            "metadata",
            Value::object([
                ("lastSeenAt", Value::from(seen)),
                ("devices", Value::set(["laptop", "phone"])),
            ]),
        ),
    ]);

    let (status, body) = send(
        &app,
        json_post("/trpc/updateUser", PathMapTransformer::new().encode(&input)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let metadata = legacy_data(&body).get("metadata").cloned().unwrap();
    assert_eq!(
        metadata.map_get(&Value::from("lastSeenAt")),
        Some(&Value::from(seen))
    );
    assert_eq!(
        metadata.map_get(&Value::from("devices")),
        Some(&Value::set(["phone", "laptop"]))
    );
}

#[tokio::test]
async fn test_popular_tags_ranked_by_count() {
    let Fixture { app, .. } = fixture();

    let (status, body) = send(&app, legacy_get("getPopularTags", None)).await;
    assert_eq!(status, StatusCode::OK);
    let tags = legacy_data(&body);
    assert_eq!(tags.get("totalUniqueTags").and_then(Value::as_i64), Some(5));
    let ranked = tags.get("tags").and_then(Value::as_slice).unwrap();
    assert_eq!(
        ranked[0],
        Value::Array(vec![Value::from("typescript"), Value::from(2_u64)])
    );
}

#[tokio::test]
async fn test_avatar_upload_is_stored_and_served() {
    let Fixture { app, uploads } = fixture();

    let (status, body) = send(
        &app,
        json_post(
            "/rpc/user/uploadAvatar",
            serde_json::json!({"json": {
                "userId": 1,
                "fileName": "me.png",
                "fileData": "iVBORw0K",
                "fileType": "image/png",
            }}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let file_name = body["json"]["fileName"].as_str().unwrap().to_string();
    assert!(file_name.starts_with("1_") && file_name.ends_with(".png"));
    assert_eq!(body["json"]["user"]["profileImage"], file_name.as_str());
    assert!(uploads.path().join("avatars").join(&file_name).exists());

    let file_path = body["json"]["filePath"].as_str().unwrap();
    let request = Request::get(file_path).body(Full::new(Bytes::new())).unwrap();
    let response = app.handle(request, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "image/png");
}

#[tokio::test]
async fn test_bad_base64_is_bad_request() {
    let Fixture { app, .. } = fixture();

    let (status, body) = send(
        &app,
        json_post(
            "/trpc/uploadAttachment",
            serde_json::json!({"postId": 1, "fileName": "a.txt", "fileData": "@@@", "fileType": "text/plain"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["json"]["code"], -32600);
}

#[tokio::test]
async fn test_multipart_attachment() {
    let Fixture { app, uploads } = fixture();
    let form = concat!(
        "--B\r\n",
        "Content-Disposition: form-data; name=\"postId\"\r\n\r\n",
        "2\r\n",
        "--B\r\n",
        "Content-Disposition: form-data; name=\"file\"; filename=\"notes.md\"\r\n",
        "Content-Type: text/markdown\r\n\r\n",
        "# notes\r\n",
        "--B--\r\n",
    );
    let request = Request::post("/trpc/uploadAttachmentFormData")
        .header(CONTENT_TYPE, "multipart/form-data; boundary=B")
        .body(Full::new(Bytes::from(form)))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let result = legacy_data(&body);
    assert_eq!(result.get("originalName").and_then(Value::as_str), Some("notes.md"));
    assert_eq!(result.get("mimeType").and_then(Value::as_str), Some("text/markdown"));
    let file_name = result.get("fileName").and_then(Value::as_str).unwrap();
    assert!(file_name.starts_with("post_2_"));
    assert_eq!(
        std::fs::read(uploads.path().join("attachments").join(file_name)).unwrap(),
        b"# notes"
    );
}

#[tokio::test]
async fn test_octet_stream_uploads() {
    let Fixture { app, uploads } = fixture();

    let request = Request::post("/trpc/uploadBinaryData")
        .header(CONTENT_TYPE, "application/octet-stream")
        .body(Full::new(Bytes::from_static(b"\x00\x01\x02")))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let result = legacy_data(&body);
    assert_eq!(result.get("fileSize").and_then(Value::as_i64), Some(3));
    let file_name = result.get("fileName").and_then(Value::as_str).unwrap();
    assert!(uploads.path().join("binary").join(file_name).exists());

    let request = Request::post("/rpc/post/uploadSingleFile")
        .header(CONTENT_TYPE, "application/pdf")
        .body(Full::new(Bytes::from_static(b"%PDF")))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["json"]["mimeType"], "application/pdf");
    assert_eq!(body["json"]["post"]["attachments"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_upload_images_indexes_names() {
    let Fixture { app, .. } = fixture();

    let (status, body) = send(
        &app,
        json_post(
            "/rpc/post/uploadImages",
            serde_json::json!({"json": {"postId": 1, "images": [
                {"fileName": "a.jpg", "fileData": "AAAA", "alt": "first"},
                {"fileName": "b.jpg", "fileData": "AAAA"},
            ]}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["json"]["message"], "2 images uploaded successfully");
    let images = body["json"]["uploadedImages"].as_array().unwrap();
    assert!(images[0]["fileName"].as_str().unwrap().ends_with("_0.jpg"));
    assert!(images[1]["fileName"].as_str().unwrap().ends_with("_1.jpg"));
    assert_eq!(images[0]["alt"], "first");
    assert!(images[1]["alt"].is_null());
}

#[tokio::test]
async fn test_contract_batch_across_groups() {
    let Fixture { app, .. } = fixture();

    let calls = serde_json::json!([
        {"path": "user.getUser", "input": {"json": {"id": 2}}},
        {"path": "post.getPost", "input": {"json": {"id": 42}}},
        {"path": "post.getPopularTags"},
    ]);
    let (status, body) = send(&app, json_post("/rpc/__batch__", calls)).await;
    assert_eq!(status, StatusCode::OK);

    let items = body.as_array().unwrap();
    assert_eq!(items[0]["status"], 200);
    assert_eq!(items[0]["body"]["json"]["name"], "Jane Smith");
    assert_eq!(items[1]["status"], 404);
    assert_eq!(items[1]["body"]["json"]["defined"], true);
    assert_eq!(items[2]["status"], 200);
}

#[tokio::test]
async fn test_quota_saturates() {
    let Fixture { app, .. } = fixture_with(|config| {
        config.quota.enabled = true;
        config.quota.limit = 1;
    });

    let call = || json_post("/rpc/user/getAllUsers", serde_json::Value::Null);
    let (status, _) = send(&app, call()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, call()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["json"]["code"], "TOO_MANY_REQUESTS");
    assert_eq!(body["json"]["defined"], true);
}

#[test]
fn test_duplicate_procedure_names_fail_at_build() {
    let dir = TempDir::new().unwrap();
    let services = Services::seeded(FileStore::new(dir.path()));
    let base = bases(Transport::Contract, &Default::default(), None);

    let result = Router::builder()
        .merge("user", user::group(&base, &services))
        .merge("people", user::group(&base, &services))
        .build();
    assert!(matches!(
        result,
        Err(RouterError::DuplicateProcedure { ref name, .. }) if name == "getUser"
    ));

    let result = Router::builder()
        .merge("user", user::group(&base, &services))
        .merge("post", post::group(&base, &services))
        .build();
    assert_eq!(result.unwrap().len(), 15);
}

#[tokio::test]
async fn test_index_lists_features() {
    let Fixture { app, .. } = fixture();
    let (status, body) = send(
        &app,
        Request::get("/").body(Full::new(Bytes::new())).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "twinrpc API server");
    assert_eq!(body["features"].as_array().unwrap().len(), twinrpc_demo::FEATURES.len());
}
