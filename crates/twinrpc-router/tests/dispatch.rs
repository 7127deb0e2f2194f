//! Dispatch through a merged router with a shared middleware base.

use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use twinrpc_core::{kinds, Context, ErrorSet, Input, Invocation, ProcedureError, ProcedureResult, Value};
use twinrpc_middleware::{BoxFuture, Middleware, Next};
use twinrpc_router::{ProcedureBuilder, ProcedureGroup, Router, RouterError, Validate};

/// Records the path of every call it sees.
#[derive(Default)]
struct Tracker {
    seen: Mutex<Vec<String>>,
}

struct Tracking(Arc<Tracker>);

impl Middleware for Tracking {
    fn name(&self) -> &'static str {
        "tracking"
    }

    fn handle<'a>(
        &'a self,
        ctx: Context,
        invocation: &'a Invocation,
        next: Next<'a>,
    ) -> BoxFuture<'a, ProcedureResult<Value>> {
        self.0.seen.lock().push(invocation.path().to_string());
        Box::pin(next.run(ctx))
    }
}

#[derive(Deserialize)]
struct ById {
    id: u64,
}

impl Validate for ById {}

fn groups(base: &ProcedureBuilder) -> (ProcedureGroup, ProcedureGroup) {
    let users = ProcedureGroup::new().procedure(
        "getUser",
        base.clone().input::<ById>().query(|_ctx, input: ById| async move {
            if input.id == 1 {
                Ok(Value::object([("id", Value::from(1_i64)), ("name", Value::from("John Doe"))]))
            } else {
                Err(ProcedureError::not_found(format!("User {} not found", input.id)))
            }
        }),
    );
    let posts = ProcedureGroup::new().procedure(
        "getPopularTags",
        base.clone().query(|_ctx| async { Ok(Value::set(["rust", "rpc"])) }),
    );
    (users, posts)
}

fn router(tracker: &Arc<Tracker>) -> Router {
    let base = ProcedureBuilder::new()
        .errors(ErrorSet::standard())
        .use_middleware(Tracking(tracker.clone()));
    let (users, posts) = groups(&base);
    Router::builder()
        .merge("user", users)
        .merge("post", posts)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_dispatch_runs_middleware_and_body() {
    let tracker = Arc::new(Tracker::default());
    let router = router(&tracker);

    let user = router
        .call(
            "user.getUser",
            Context::new(),
            Input::Json(Value::object([("id", 1_i64)])),
        )
        .await
        .unwrap();
    assert_eq!(user.get("name").and_then(Value::as_str), Some("John Doe"));

    let tags = router
        .call("getPopularTags", Context::new(), Input::none())
        .await
        .unwrap();
    assert_eq!(tags, Value::set(["rpc", "rust"]));

    assert_eq!(
        *tracker.seen.lock(),
        vec!["user.getUser".to_string(), "post.getPopularTags".to_string()]
    );
}

#[tokio::test]
async fn test_declared_error_from_body() {
    let tracker = Arc::new(Tracker::default());
    let router = router(&tracker);

    let err = router
        .call(
            "user/getUser",
            Context::new(),
            Input::Json(Value::object([("id", 999_i64)])),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), kinds::NOT_FOUND);
    let entry = router.resolve("user/getUser").unwrap();
    assert!(entry.invocation().errors().is_declared(&err));
}

#[tokio::test]
async fn test_undefined_path_skips_middleware() {
    let tracker = Arc::new(Tracker::default());
    let router = router(&tracker);

    let err = router
        .call("user.deleteEverything", Context::new(), Input::none())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), kinds::NOT_FOUND);
    assert!(tracker.seen.lock().is_empty());
}

#[test]
fn test_merging_groups_sharing_a_name_fails_at_build() {
    let base = ProcedureBuilder::new();
    let (users, _) = groups(&base);
    let (more_users, _) = groups(&base);

    let result = Router::builder()
        .merge("user", users)
        .merge("legacyUser", more_users)
        .build();

    assert!(matches!(
        result,
        Err(RouterError::DuplicateProcedure { ref name, .. }) if name == "getUser"
    ));
}
