use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use intent_forms::{FieldAttrs, FormDispatcher, FormRequest, FormsConfig, Reply, Schema, Submission, Thrown};
use maud::{html, Markup, DOCTYPE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Inputs of the create form: field name and input type
const CREATE_FIELDS: &[(&str, &str)] = &[
    ("name", "text"),
    ("email", "email"),
    ("age", "number"),
    ("tags[]", "text"),
];

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub age: Option<i64>,
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct NewUser {
    name: String,
    email: String,
    age: Option<i64>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DeleteUser {
    id: u64,
}

#[derive(Debug, Default)]
struct UserStore {
    users: Vec<User>,
    next_id: u64,
}

type Store = Arc<RwLock<UserStore>>;

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    dispatcher: Arc<FormDispatcher>,
    store: Store,
}

pub fn user_schema() -> Schema {
    Schema::intents([
        (
            "createUser",
            Schema::object([
                ("name", Schema::string().min_length(2).max_length(80).describe("Full name")),
                ("email", Schema::email()),
                ("age", Schema::integer().min(18.0).optional()),
                ("tags", Schema::array(Schema::string().max_length(20)).max(3.0).optional()),
            ]),
        ),
        ("deleteUser", Schema::object([("id", Schema::integer().min(1.0))])),
    ])
}

pub fn app(config: FormsConfig) -> Router {
    let store = Store::default();

    let dispatcher = FormDispatcher::new(user_schema())
        .config(config)
        .on("createUser", {
            let store = store.clone();
            move |submission| create_user(store.clone(), submission)
        })
        .on("deleteUser", {
            let store = store.clone();
            move |submission| delete_user(store.clone(), submission)
        });

    let state = AppState {
        dispatcher: Arc::new(dispatcher),
        store,
    };

    Router::new()
        .route("/users", get(users_page).post(submit_users))
        .with_state(state)
}

async fn create_user(store: Store, submission: Submission) -> Result<Option<Reply>, Thrown> {
    if !submission.validation.is_success() {
        return Ok(Some(
            submission
                .response
                .with_status(StatusCode::UNPROCESSABLE_ENTITY)
                .with_message("Please correct the highlighted fields")
                .into(),
        ));
    }

    let new_user: NewUser = submission.parse()?;

    let user = {
        let mut store = store.write().await;
        store.next_id += 1;
        let user = User {
            id: store.next_id,
            name: new_user.name,
            email: new_user.email,
            age: new_user.age,
            tags: new_user.tags,
        };
        store.users.push(user.clone());
        user
    };

    info!(id = user.id, name = %user.name, "created user");

    let payload = serde_json::to_value(&user).map_err(anyhow::Error::from)?;
    Ok(Some(
        submission
            .response
            .with_status(StatusCode::CREATED)
            .with_payload(payload)
            .into(),
    ))
}

async fn delete_user(store: Store, submission: Submission) -> Result<Option<Reply>, Thrown> {
    if !submission.validation.is_success() {
        return Ok(Some(
            submission
                .response
                .with_status(StatusCode::UNPROCESSABLE_ENTITY)
                .into(),
        ));
    }

    let DeleteUser { id } = submission.parse()?;

    let mut store = store.write().await;
    let before = store.users.len();
    store.users.retain(|user| user.id != id);

    if store.users.len() == before {
        return Ok(Some(
            submission
                .response
                .with_status(StatusCode::NOT_FOUND)
                .with_message(format!("No user with id {}", id))
                .into(),
        ));
    }

    info!(id, "deleted user");
    Ok(None)
}

async fn submit_users(State(state): State<AppState>, request: FormRequest) -> Response {
    match state.dispatcher.dispatch(request).await {
        Ok(reply) => reply.into_response(),
        Err(err) => {
            warn!(error = %err, "rejected submission");
            err.into_response()
        }
    }
}

async fn users_page(State(state): State<AppState>) -> Html<String> {
    let store = state.store.read().await;
    let schema = state.dispatcher.schema();

    let markup = html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                title { "Users" }
            }
            body {
                h1 { "Users" }
                ul {
                    @for user in &store.users {
                        li {
                            (user.name) " (" (user.email) ")"
                            form method="post" action="/users" {
                                input type="hidden" name="_intent" value="deleteUser";
                                input type="hidden" name="id" value=(user.id);
                                button type="submit" { "Delete" }
                            }
                        }
                    }
                }
                form method="post" action="/users" {
                    input type="hidden" name="_intent" value="createUser";
                    @if let Some(create) = schema.intent("createUser") {
                        @for (name, input_type) in CREATE_FIELDS {
                            (field(create, name, input_type))
                        }
                    }
                    button type="submit" { "Create" }
                }
            }
        }
    };

    Html(markup.into_string())
}

fn field(schema: &Schema, name: &str, input_type: &str) -> Markup {
    match FieldAttrs::derive(name, schema, input_type) {
        Ok(attrs) => {
            let attrs = attrs.with_attr("id", name);
            html! {
                div class="field" {
                    (attrs.label_for())
                    (attrs.input())
                }
            }
        }
        Err(err) => {
            warn!(field = name, error = %err, "skipping field with malformed name");
            html! {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::{json, Value as JsonValue};
    use tower::ServiceExt;

    fn form_post(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/users")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> JsonValue {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_users_page_renders_constraints() {
        let response = app(FormsConfig::default())
            .oneshot(Request::builder().uri("/users").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let page = String::from_utf8(bytes.to_vec()).unwrap();

        assert!(page.contains(r#"name="name""#));
        assert!(page.contains(r#"minlength="2""#));
        assert!(page.contains(r#"min="18""#));
        assert!(page.contains("Full name"));
        assert!(page.contains(r#"value="createUser""#));
    }

    #[tokio::test]
    async fn test_create_user() {
        let response = app(FormsConfig::default())
            .oneshot(form_post(
                "_intent=createUser&name=Ada+Lovelace&email=ada%40example.com&tags%5B%5D=math",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);

        let json = json_body(response).await;
        assert_eq!(json["intent"], json!("createUser"));
        assert_eq!(
            json["payload"],
            json!({"id": 1, "name": "Ada Lovelace", "email": "ada@example.com", "age": null, "tags": ["math"]})
        );
    }

    #[rstest]
    #[case("_intent=createUser&name=A&email=nope", StatusCode::UNPROCESSABLE_ENTITY)]
    #[case("_intent=deleteUser&id=42", StatusCode::NOT_FOUND)]
    #[case("_intent=archiveUser", StatusCode::NOT_IMPLEMENTED)]
    #[tokio::test]
    async fn test_submission_status(#[case] body: &str, #[case] status: StatusCode) {
        let response = app(FormsConfig::default()).oneshot(form_post(body)).await.unwrap();
        assert_eq!(response.status(), status);

        let json = json_body(response).await;
        assert_eq!(json["status"], json!(status.as_u16()));
    }

    #[tokio::test]
    async fn test_invalid_submission_reports_issues() {
        let response = app(FormsConfig::default())
            .oneshot(form_post("_intent=createUser&name=A&email=nope"))
            .await
            .unwrap();

        let json = json_body(response).await;
        let paths: Vec<&JsonValue> = json["validation"]["error"]["issues"]
            .as_array()
            .unwrap()
            .iter()
            .map(|issue| &issue["path"])
            .collect();

        assert_eq!(paths, vec![&json!(["name"]), &json!(["email"])]);
        assert!(json["validation"].get("data").is_none());
        assert_eq!(json["validation"]["input"], json!({"name": "A", "email": "nope"}));
    }

    #[tokio::test]
    async fn test_multipart_limit_rejected() {
        let config = FormsConfig::default()
            .with_limits(intent_forms::UploadLimits::default().with_max_file_size(3));

        let body = concat!(
            "--XYZ\r\n",
            "Content-Disposition: form-data; name=\"avatar\"; filename=\"a.png\"\r\n\r\n",
            "0123456789\r\n",
            "--XYZ--\r\n",
        );

        let request = Request::builder()
            .method("POST")
            .uri("/users")
            .header("content-type", "multipart/form-data; boundary=XYZ")
            .body(Body::from(body))
            .unwrap();

        let response = app(config).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
