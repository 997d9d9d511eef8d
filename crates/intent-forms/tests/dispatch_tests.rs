//! Integration tests for the submission dispatcher
//!
//! Covers the envelope returned for each outcome:
//! - success, validation failure and unhandled intents
//! - handler errors downgraded to 500
//! - multipart limits enforced before any handler runs
//! - hooks short-circuiting and overriding replies

use axum::body::Body;
use axum::http::{Request, StatusCode, Uri};
use axum::response::{IntoResponse, Redirect};
use intent_forms::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn schema() -> Schema {
    Schema::intents([
        ("createUser", Schema::object([("name", Schema::string())])),
        ("deleteUser", Schema::object([("id", Schema::integer())])),
    ])
}

fn post(fields: &[(&str, &str)]) -> FormRequest {
    FormRequest::post(Uri::from_static("/users"), fields.iter().copied().collect())
}

fn envelope(reply: Reply) -> serde_json::Value {
    serde_json::to_value(reply.envelope().expect("envelope reply")).unwrap()
}

#[tokio::test]
async fn test_dispatch_success() {
    let dispatcher = FormDispatcher::new(schema()).on("createUser", |_submission: Submission| async move {
        Ok::<_, Thrown>(None)
    });

    let reply = dispatcher
        .dispatch(post(&[("_intent", "createUser"), ("name", "Ada")]))
        .await
        .unwrap();

    assert_eq!(
        envelope(reply),
        json!({
            "intent": "createUser",
            "message": "Success",
            "payload": null,
            "status": 200,
            "validation": {"success": true, "data": {"name": "Ada"}}
        })
    );
}

#[tokio::test]
async fn test_dispatch_validation_failure() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();

    let dispatcher = FormDispatcher::new(schema()).on("createUser", move |submission: Submission| {
        let seen = seen.clone();
        async move {
            seen.fetch_add(1, Ordering::SeqCst);
            assert!(!submission.validation.is_success());
            Ok::<_, Thrown>(None)
        }
    });

    let reply = dispatcher.dispatch(post(&[("_intent", "createUser")])).await.unwrap();
    let envelope = reply.into_envelope().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!envelope.validation.is_success());

    let name = Path::parse("name").unwrap();
    assert_eq!(envelope.validation.error().unwrap().issues_at(&name).len(), 1);
    assert_eq!(envelope.validation.issues()[0].path.as_str(), "name");
}

#[tokio::test]
async fn test_dispatch_unhandled_intent() {
    let dispatcher = FormDispatcher::new(schema()).on("createUser", |_submission: Submission| async move {
        Ok::<_, Thrown>(None)
    });

    let reply = dispatcher.dispatch(post(&[("_intent", "doesNotExist")])).await.unwrap();
    let envelope = reply.into_envelope().unwrap();

    assert_eq!(envelope.status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(envelope.message, "Not Implemented");
    assert_eq!(envelope.intent, "doesNotExist");
}

#[tokio::test]
async fn test_dispatch_handler_error() {
    let dispatcher = FormDispatcher::new(schema()).on("createUser", |_submission: Submission| async move {
        Err::<Option<Reply>, _>(Thrown::from(anyhow::anyhow!("database unavailable")))
    });

    let reply = dispatcher
        .dispatch(post(&[("_intent", "createUser"), ("name", "Ada")]))
        .await
        .unwrap();
    let envelope = reply.into_envelope().unwrap();

    assert_eq!(envelope.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(envelope.message, "Error");
    assert_eq!(envelope.payload.as_error().unwrap().to_string(), "database unavailable");
    assert!(envelope.validation.is_success());
}

#[tokio::test]
async fn test_dispatch_handler_reply_replaces_envelope() {
    let dispatcher = FormDispatcher::new(schema()).on("createUser", |submission: Submission| async move {
        let created = submission
            .response
            .with_status(StatusCode::CREATED)
            .with_payload(json!({"id": 1}));
        Ok::<_, Thrown>(Some(created.into()))
    });

    let reply = dispatcher
        .dispatch(post(&[("_intent", "createUser"), ("name", "Ada")]))
        .await
        .unwrap();

    let json = envelope(reply);
    assert_eq!(json["status"], json!(201));
    assert_eq!(json["payload"], json!({"id": 1}));
}

#[tokio::test]
async fn test_dispatch_thrown_redirect_passes_through() {
    let dispatcher = FormDispatcher::new(schema()).on("createUser", |_submission: Submission| async move {
        Err::<Option<Reply>, _>(Thrown::redirect("/users/1"))
    });

    let reply = dispatcher
        .dispatch(post(&[("_intent", "createUser"), ("name", "Ada")]))
        .await
        .unwrap();

    assert!(reply.envelope().is_none());
    assert_eq!(reply.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_multipart_file_limit_before_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();

    let dispatcher = FormDispatcher::new(schema())
        .config(FormsConfig::default().with_limits(UploadLimits::default().with_max_files(1)))
        .on("createUser", move |_submission: Submission| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Thrown>(None)
            }
        });

    let body = concat!(
        "--XYZ\r\n",
        "Content-Disposition: form-data; name=\"_intent\"\r\n\r\n",
        "createUser\r\n",
        "--XYZ\r\n",
        "Content-Disposition: form-data; name=\"a\"; filename=\"a.txt\"\r\n\r\n",
        "a\r\n",
        "--XYZ\r\n",
        "Content-Disposition: form-data; name=\"b\"; filename=\"b.txt\"\r\n\r\n",
        "b\r\n",
        "--XYZ--\r\n",
    );

    let request = Request::builder()
        .method("POST")
        .uri("/users")
        .header("content-type", "multipart/form-data; boundary=XYZ")
        .body(Body::from(body))
        .unwrap();

    let err = dispatcher.dispatch(FormRequest::from_axum(request)).await.unwrap_err();

    assert!(matches!(
        err,
        FormError::UploadLimitExceeded {
            limit: UploadLimit::FileCount,
            max: 1
        }
    ));
    assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_multipart_submission_reaches_handler() {
    let dispatcher = FormDispatcher::new(schema()).on("createUser", |submission: Submission| async move {
        assert_eq!(submission.data.get("name").and_then(Value::as_str), Some("Ada"));
        Ok::<_, Thrown>(None)
    });

    let body = concat!(
        "--XYZ\r\n",
        "Content-Disposition: form-data; name=\"_intent\"\r\n\r\n",
        "createUser\r\n",
        "--XYZ\r\n",
        "Content-Disposition: form-data; name=\"name\"\r\n\r\n",
        "Ada\r\n",
        "--XYZ--\r\n",
    );

    let request = FormRequest::with_body(Uri::from_static("/users"), "multipart/form-data; boundary=XYZ", body);
    let reply = dispatcher.dispatch(request).await.unwrap();

    assert_eq!(reply.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_before_hook_short_circuits() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();

    let dispatcher = FormDispatcher::new(schema())
        .hooks(Hooks::new().before(|form: &FormData| {
            if form.has("honeypot") {
                return Err(Redirect::to("/").into_response().into());
            }
            Ok(())
        }))
        .on("createUser", move |_submission: Submission| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Thrown>(None)
            }
        });

    let reply = dispatcher
        .dispatch(post(&[("_intent", "createUser"), ("name", "Ada"), ("honeypot", "1")]))
        .await
        .unwrap();

    assert_eq!(reply.status(), StatusCode::SEE_OTHER);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_after_hook_runs_and_overrides() {
    let dispatcher = FormDispatcher::new(schema())
        .hooks(Hooks::new().after(|_form: &FormData| {
            Err(FormResponse::new("createUser", "Overridden")
                .with_status(StatusCode::ACCEPTED)
                .into())
        }))
        .on("createUser", |_submission: Submission| async move {
            Err::<Option<Reply>, _>(Thrown::from(anyhow::anyhow!("boom")))
        });

    let reply = dispatcher
        .dispatch(post(&[("_intent", "createUser"), ("name", "Ada")]))
        .await
        .unwrap();
    let envelope = reply.into_envelope().unwrap();

    assert_eq!(envelope.status, StatusCode::ACCEPTED);
    assert_eq!(envelope.message, "Overridden");
}

#[tokio::test]
async fn test_after_validate_replaces_result() {
    let dispatcher = FormDispatcher::new(schema())
        .hooks(Hooks::new().after_validate(|validation: &Validation| {
            Ok(Some(Validation::Success {
                data: validation.data().clone(),
            }))
        }))
        .on("createUser", |submission: Submission| async move {
            assert!(submission.validation.is_success());
            Ok::<_, Thrown>(None)
        });

    let reply = dispatcher.dispatch(post(&[("_intent", "createUser")])).await.unwrap();
    assert!(reply.envelope().unwrap().validation.is_success());
}

#[tokio::test]
async fn test_default_handler_gets_whole_schema() {
    let dispatcher = FormDispatcher::new(schema()).default(|submission: Submission| async move {
        assert_eq!(submission.intent, "default");
        assert!(submission.schema.intent("createUser").is_some());
        assert!(submission.validation.issues().is_empty());
        Ok::<_, Thrown>(None)
    });

    let reply = dispatcher.dispatch(post(&[("name", "Ada")])).await.unwrap();
    let json = envelope(reply);

    assert_eq!(json["intent"], json!("default"));
    assert_eq!(json["status"], json!(200));
    assert_eq!(
        json["validation"],
        json!({"success": false, "input": {"name": "Ada"}, "error": {"issues": []}})
    );
}

#[tokio::test]
async fn test_urlencoded_body_nested_fields() {
    let dispatcher = FormDispatcher::new(Schema::intents([(
        "order",
        Schema::object([(
            "items",
            Schema::array(Schema::object([
                ("sku", Schema::string()),
                ("qty", Schema::integer()),
            ])),
        )]),
    )]))
    .on("order", |submission: Submission| async move {
        assert_eq!(
            submission.validation.data().to_json(),
            json!({"items": [{"sku": "A1", "qty": 2}, {"sku": "B2", "qty": 1}]})
        );
        Ok::<_, Thrown>(None)
    });

    let request = FormRequest::with_body(
        Uri::from_static("/orders"),
        "application/x-www-form-urlencoded",
        "_intent=order&items%5B0%5D.sku=A1&items%5B0%5D.qty=2&items%5B1%5D.sku=B2&items%5B1%5D.qty=1",
    );

    let reply = dispatcher.dispatch(request).await.unwrap();
    assert_eq!(reply.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_reply_into_axum_response() {
    let dispatcher = FormDispatcher::new(schema());
    let reply = dispatcher.dispatch(post(&[("_intent", "createUser")])).await.unwrap();

    let response = reply.into_response();
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["message"], json!("Not Implemented"));
}
