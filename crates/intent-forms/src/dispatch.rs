// File: src/dispatch.rs
// Purpose: Multi-intent submission dispatcher

use crate::config::FormsConfig;
use crate::error::{FormError, Thrown};
use crate::form_data::{FormData, FormValue};
use crate::multipart::read_body;
use crate::request::FormRequest;
use crate::response::{FormResponse, Payload, Reply};
use crate::schema::{Schema, Validation, DEFAULT_INTENT, INTENT_FIELD};
use crate::upload::{FileUpload, UploadHandler};
use crate::value::Value;
use anyhow::{bail, Context};
use async_trait::async_trait;
use axum::http::{Method, StatusCode, Uri};
use futures::stream::{self, StreamExt};
use intent_forms_path::Segment;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error};

/// What an intent handler receives
#[derive(Debug, Clone)]
pub struct Submission {
    /// Nested value tree, after `before_validate`
    pub data: Value,
    /// Flattened fields, without the intent field
    pub form_data: FormData,
    pub intent: String,
    /// The envelope returned when the handler returns `None`
    pub response: FormResponse,
    pub validation: Validation,
    /// The intent's sub-schema, or the whole schema on the default path
    pub schema: Arc<Schema>,
}

impl Submission {
    /// Deserializes the validated data
    pub fn parse<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        match &self.validation {
            Validation::Success { data } => serde_json::from_value(data.to_json())
                .with_context(|| format!("failed to deserialize '{}' submission", self.intent)),
            Validation::Failure(error) => bail!("'{}' submission is not valid: {}", self.intent, error),
        }
    }
}

/// Handles one intent
///
/// `Ok(None)` keeps the default success envelope, `Ok(Some(reply))`
/// replaces it.
#[async_trait]
pub trait IntentHandler: Send + Sync {
    async fn handle(&self, submission: Submission) -> Result<Option<Reply>, Thrown>;
}

#[async_trait]
impl<F, Fut> IntentHandler for F
where
    F: Fn(Submission) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Reply>, Thrown>> + Send,
{
    async fn handle(&self, submission: Submission) -> Result<Option<Reply>, Thrown> {
        (self)(submission).await
    }
}

type FormHook = Arc<dyn Fn(&FormData) -> Result<(), Thrown> + Send + Sync>;
type UploadHook = Arc<dyn Fn(&FileUpload) -> Result<(), Thrown> + Send + Sync>;
type DataHook = Arc<dyn Fn(&Value) -> Result<Option<Value>, Thrown> + Send + Sync>;
type ValidationHook = Arc<dyn Fn(&Validation) -> Result<Option<Validation>, Thrown> + Send + Sync>;
type Transform = Arc<dyn Fn(&str, &FormValue, &[Segment]) -> Option<Value> + Send + Sync>;

/// Lifecycle hooks
///
/// Returning `Err(Thrown::Reply(..))` from any hook ends the dispatch with
/// that reply. Any other error propagates out of [`FormDispatcher::dispatch`].
#[derive(Clone, Default)]
pub struct Hooks {
    before: Option<FormHook>,
    before_upload: Option<UploadHook>,
    after_upload: Option<FormHook>,
    before_validate: Option<DataHook>,
    after_validate: Option<ValidationHook>,
    after: Option<FormHook>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs on the flattened fields, before the intent is read
    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: Fn(&FormData) -> Result<(), Thrown> + Send + Sync + 'static,
    {
        self.before = Some(Arc::new(hook));
        self
    }

    /// Runs for each file part before the upload handler sees it
    pub fn before_upload<F>(mut self, hook: F) -> Self
    where
        F: Fn(&FileUpload) -> Result<(), Thrown> + Send + Sync + 'static,
    {
        self.before_upload = Some(Arc::new(hook));
        self
    }

    /// Runs once every file part is resolved
    pub fn after_upload<F>(mut self, hook: F) -> Self
    where
        F: Fn(&FormData) -> Result<(), Thrown> + Send + Sync + 'static,
    {
        self.after_upload = Some(Arc::new(hook));
        self
    }

    /// May replace the nested value tree before validation
    pub fn before_validate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Value) -> Result<Option<Value>, Thrown> + Send + Sync + 'static,
    {
        self.before_validate = Some(Arc::new(hook));
        self
    }

    /// May replace the validation result
    pub fn after_validate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Validation) -> Result<Option<Validation>, Thrown> + Send + Sync + 'static,
    {
        self.after_validate = Some(Arc::new(hook));
        self
    }

    /// Runs after the handler, whatever its outcome
    pub fn after<F>(mut self, hook: F) -> Self
    where
        F: Fn(&FormData) -> Result<(), Thrown> + Send + Sync + 'static,
    {
        self.after = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("before", &self.before.is_some())
            .field("before_upload", &self.before_upload.is_some())
            .field("after_upload", &self.after_upload.is_some())
            .field("before_validate", &self.before_validate.is_some())
            .field("after_validate", &self.after_validate.is_some())
            .field("after", &self.after.is_some())
            .finish()
    }
}

/// How a dispatch stops early: a reply that short-circuits, or a failure
enum Exit {
    Reply(Reply),
    Fail(FormError),
}

impl From<Thrown> for Exit {
    fn from(thrown: Thrown) -> Self {
        match thrown {
            Thrown::Reply(reply) => Exit::Reply(reply),
            Thrown::Error(error) => Exit::Fail(FormError::Hook(error)),
            Thrown::Abort(error) => Exit::Fail(FormError::Aborted(error)),
        }
    }
}

impl From<FormError> for Exit {
    fn from(error: FormError) -> Self {
        Exit::Fail(error)
    }
}

/// Parses, validates and routes submissions by intent
///
/// ```no_run
/// use intent_forms::{FormDispatcher, FormRequest, Schema, Submission, Thrown};
///
/// # async fn run(request: FormRequest) -> Result<(), intent_forms::FormError> {
/// let schema = Schema::intents([("createUser", Schema::object([("name", Schema::string())]))]);
///
/// let dispatcher = FormDispatcher::new(schema).on("createUser", |submission: Submission| async move {
///     tracing::info!(data = %submission.data, "creating user");
///     Ok::<_, Thrown>(None)
/// });
///
/// let reply = dispatcher.dispatch(request).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FormDispatcher {
    schema: Arc<Schema>,
    /// Sub-schemas of intents with a registered handler
    intent_schemas: HashMap<String, Arc<Schema>>,
    handlers: HashMap<String, Arc<dyn IntentHandler>>,
    default: Option<Arc<dyn IntentHandler>>,
    hooks: Hooks,
    config: FormsConfig,
    upload_handler: Option<Arc<dyn UploadHandler>>,
    transform: Option<Transform>,
}

impl FormDispatcher {
    /// Dispatcher for an intent-keyed schema (see [`Schema::intents`])
    pub fn new(schema: Schema) -> Self {
        Self {
            schema: Arc::new(schema),
            intent_schemas: HashMap::new(),
            handlers: HashMap::new(),
            default: None,
            hooks: Hooks::default(),
            config: FormsConfig::default(),
            upload_handler: None,
            transform: None,
        }
    }

    /// Registers the handler for `intent`
    pub fn on<F, Fut>(self, intent: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Submission) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Reply>, Thrown>> + Send + 'static,
    {
        self.on_handler(intent, handler)
    }

    pub fn on_handler(mut self, intent: impl Into<String>, handler: impl IntentHandler + 'static) -> Self {
        let intent = intent.into();
        if let Some(schema) = self.schema.intent(&intent) {
            self.intent_schemas.insert(intent.clone(), Arc::new(schema.clone()));
        }
        self.handlers.insert(intent, Arc::new(handler));
        self
    }

    /// Handler for submissions whose intent is `default` or unmatched
    pub fn default<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Submission) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Reply>, Thrown>> + Send + 'static,
    {
        self.default = Some(Arc::new(handler));
        self
    }

    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn config(mut self, config: FormsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn upload_handler(mut self, handler: impl UploadHandler + 'static) -> Self {
        self.upload_handler = Some(Arc::new(handler));
        self
    }

    /// Rewrites flattened values as they are placed in the value tree
    pub fn transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&str, &FormValue, &[Segment]) -> Option<Value> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Runs one submission through parsing, hooks, validation and its handler
    pub async fn dispatch(&self, request: FormRequest) -> Result<Reply, FormError> {
        let FormRequest {
            method,
            uri,
            headers,
            body,
        } = request;

        let form_data = read_body(&headers, body, &self.config.limits).await?;

        match self.run(form_data, &method, &uri).await {
            Ok(reply) | Err(Exit::Reply(reply)) => Ok(reply),
            Err(Exit::Fail(error)) => Err(error),
        }
    }

    async fn run(&self, form_data: FormData, method: &Method, uri: &Uri) -> Result<Reply, Exit> {
        let mut form_data = self.resolve_uploads(form_data).await?;

        if let Some(hook) = &self.hooks.after_upload {
            hook(&form_data)?;
        }
        if let Some(hook) = &self.hooks.before {
            hook(&form_data)?;
        }

        let intent = form_data
            .remove(INTENT_FIELD)
            .and_then(FormValue::into_text)
            .filter(|intent| !intent.is_empty())
            .unwrap_or_else(|| DEFAULT_INTENT.to_string());

        let data = match &self.transform {
            Some(transform) => form_data.to_object_with(|key, value, segments| transform(key, value, segments)),
            None => form_data.to_object(),
        }
        .map_err(FormError::from)?;

        let target = (intent != DEFAULT_INTENT)
            .then(|| self.intent_schemas.get(&intent).zip(self.handlers.get(&intent)))
            .flatten();

        if let Some((schema, handler)) = target {
            debug!(intent = %intent, "dispatching intent");
            let data = self.before_validate(data)?;
            let validation = schema.validate_async(&data).await;
            debug!(intent = %intent, success = validation.is_success(), "validated submission");
            let validation = self.after_validate(validation)?;

            return self
                .invoke(handler.as_ref(), schema.clone(), intent, data, form_data, validation)
                .await;
        }

        if let Some(handler) = &self.default {
            debug!(intent = %intent, "dispatching to default handler");
            let data = self.before_validate(data)?;
            let validation = self.after_validate(Validation::placeholder(data.clone()))?;

            return self
                .invoke(handler.as_ref(), self.schema.clone(), intent, data, form_data, validation)
                .await;
        }

        error!(intent = %intent, method = %method, uri = %uri, "no handler registered for submitted intent");

        Ok(FormResponse::new(intent, self.config.messages.not_implemented.clone())
            .with_status(StatusCode::NOT_IMPLEMENTED)
            .with_validation(Validation::placeholder(data))
            .into())
    }

    async fn invoke(
        &self,
        handler: &dyn IntentHandler,
        schema: Arc<Schema>,
        intent: String,
        data: Value,
        form_data: FormData,
        validation: Validation,
    ) -> Result<Reply, Exit> {
        let response = FormResponse::new(intent.clone(), self.config.messages.success.clone())
            .with_validation(validation.clone());

        let submission = Submission {
            data,
            form_data: form_data.clone(),
            intent: intent.clone(),
            response: response.clone(),
            validation,
            schema,
        };

        let outcome = match handler.handle(submission).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Ok(response.into()),
            Err(Thrown::Reply(reply)) => Ok(reply),
            Err(Thrown::Error(err)) => {
                error!(intent = %intent, error = %format!("{:#}", err), "form handler failed");
                Ok(response
                    .with_status(StatusCode::INTERNAL_SERVER_ERROR)
                    .with_message(self.config.messages.error.clone())
                    .with_payload(Payload::error(err))
                    .into())
            }
            Err(Thrown::Abort(err)) => Err(Exit::Fail(FormError::Aborted(err))),
        };

        if let Some(hook) = &self.hooks.after {
            hook(&form_data)?;
        }

        outcome
    }

    fn before_validate(&self, data: Value) -> Result<Value, Exit> {
        match &self.hooks.before_validate {
            Some(hook) => Ok(hook(&data)?.unwrap_or(data)),
            None => Ok(data),
        }
    }

    fn after_validate(&self, validation: Validation) -> Result<Validation, Exit> {
        match &self.hooks.after_validate {
            Some(hook) => Ok(hook(&validation)?.unwrap_or(validation)),
            None => Ok(validation),
        }
    }

    /// Runs file parts through `before_upload` and the upload handler
    ///
    /// Parts resolve concurrently but are reassembled in submission order.
    async fn resolve_uploads(&self, form_data: FormData) -> Result<FormData, Exit> {
        let has_files = form_data.iter().any(|(_, value)| value.as_file().is_some());
        if !has_files || (self.upload_handler.is_none() && self.hooks.before_upload.is_none()) {
            return Ok(form_data);
        }

        let resolved: Vec<Result<(String, FormValue), Thrown>> = stream::iter(form_data)
            .map(|(key, value)| async move {
                match value {
                    FormValue::File(upload) => self.resolve_upload(upload).await.map(|value| (key, value)),
                    text => Ok((key, text)),
                }
            })
            .buffered(self.config.upload_concurrency.max(1))
            .collect()
            .await;

        let form_data = resolved.into_iter().collect::<Result<FormData, Thrown>>()?;
        debug!(fields = form_data.len(), "resolved file uploads");
        Ok(form_data)
    }

    async fn resolve_upload(&self, upload: FileUpload) -> Result<FormValue, Thrown> {
        if let Some(hook) = &self.hooks.before_upload {
            hook(&upload)?;
        }

        match &self.upload_handler {
            Some(handler) => handler.handle(upload).await,
            None => Ok(FormValue::File(upload)),
        }
    }
}

impl fmt::Debug for FormDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut intents: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        intents.sort_unstable();

        f.debug_struct("FormDispatcher")
            .field("intents", &intents)
            .field("default", &self.default.is_some())
            .field("hooks", &self.hooks)
            .field("config", &self.config)
            .field("upload_handler", &self.upload_handler.is_some())
            .finish()
    }
}
