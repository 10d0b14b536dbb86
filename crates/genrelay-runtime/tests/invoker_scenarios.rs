//! End-to-end invoker behavior against a scripted provider.
//!
//! All tests run on a paused tokio clock, so backoff sleeps complete
//! instantly while `Instant` still advances by the exact slept amount.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use genrelay_core::{
    AttemptResult, Capability, FailureKind, FailureReason, GenerationSettings, InlineBlob,
    Payload, RequestSpec, ResponseEnvelope, ResponsePart, RetryPolicy, UserMessage,
};
use genrelay_runtime::{CancellationToken, GenerativeProvider, ProviderError, ResilientInvoker};

type Reply = Result<ResponseEnvelope, ProviderError>;
type Script = dyn Fn(&str, usize) -> Reply + Send + Sync;

#[derive(Debug, Clone)]
struct Call {
    model: String,
    at: Instant,
}

/// Provider whose replies come from a closure of `(model, nth call to that model)`.
struct ScriptedProvider {
    script: Box<Script>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedProvider {
    fn new(script: impl Fn(&str, usize) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn models_called(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.model).collect()
    }

    fn gaps(&self) -> Vec<Duration> {
        self.calls()
            .windows(2)
            .map(|w| w[1].at.duration_since(w[0].at))
            .collect()
    }
}

#[async_trait]
impl GenerativeProvider for ScriptedProvider {
    async fn generate(&self, model: &str, _spec: &RequestSpec) -> Reply {
        let nth = {
            let mut calls = self.calls.lock();
            let nth = calls.iter().filter(|c| c.model == model).count();
            calls.push(Call {
                model: model.to_string(),
                at: Instant::now(),
            });
            nth
        };
        (self.script)(model, nth)
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn text(body: &str) -> Reply {
    Ok(ResponseEnvelope::from_parts(vec![ResponsePart::Text(
        body.to_string(),
    )]))
}

fn png() -> Reply {
    Ok(ResponseEnvelope::from_parts(vec![
        ResponsePart::Text("Here you go".into()),
        ResponsePart::InlineData(InlineBlob::new("image/png", vec![0x89, 0x50, 0x4e, 0x47])),
    ]))
}

fn unavailable() -> Reply {
    Err(ProviderError::Api {
        status: 503,
        code: Some("UNAVAILABLE".into()),
        message: "The model is overloaded. Please try again later.".into(),
    })
}

fn bad_request() -> Reply {
    Err(ProviderError::Api {
        status: 400,
        code: Some("INVALID_ARGUMENT".into()),
        message: "Invalid value at 'contents[0].parts[0]'".into(),
    })
}

fn entity_not_found() -> Reply {
    Err(ProviderError::Api {
        status: 404,
        code: Some("NOT_FOUND".into()),
        message: "Requested entity was not found.".into(),
    })
}

fn text_spec(models: &[&str]) -> RequestSpec {
    RequestSpec::builder(Capability::Text)
        .models(models.iter().copied())
        .prompt("Describe the Eiffel Tower")
        .build()
        .unwrap()
}

fn image_spec(models: &[&str]) -> RequestSpec {
    RequestSpec::builder(Capability::Image)
        .models(models.iter().copied())
        .prompt("A watercolor postcard")
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn all_transient_tries_every_model_in_order_within_budget() {
    let provider = ScriptedProvider::new(|_, _| unavailable());
    let invoker = ResilientInvoker::new(provider.clone());

    let err = invoker
        .invoke(&text_spec(&["a", "b", "c"]))
        .await
        .unwrap_err();

    assert_eq!(err.kind, FailureKind::Exhausted);
    assert_eq!(err.message, UserMessage::Generic);
    assert_eq!(err.last_reason, Some(FailureReason::Unavailable));
    assert_eq!(
        provider.models_called(),
        vec!["a", "a", "a", "b", "b", "b", "c", "c", "c"]
    );
    for model in ["a", "b", "c"] {
        assert_eq!(err.attempts_for(model), 3);
    }
}

#[tokio::test(start_paused = true)]
async fn backoff_delays_are_exact() {
    let provider = ScriptedProvider::new(|_, _| unavailable());
    let invoker = ResilientInvoker::new(provider.clone());

    let err = invoker.invoke(&text_spec(&["only"])).await.unwrap_err();

    assert_eq!(
        provider.gaps(),
        vec![Duration::from_millis(1000), Duration::from_millis(2000)]
    );
    let backoffs: Vec<Option<Duration>> = err.attempts.iter().map(|a| a.backoff).collect();
    assert_eq!(
        backoffs,
        vec![
            Some(Duration::from_millis(1000)),
            Some(Duration::from_millis(2000)),
            None
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn primary_exhausted_then_fallback_succeeds() {
    let provider = ScriptedProvider::new(|model, _| match model {
        "primary" => unavailable(),
        _ => text("Built in 1889."),
    });
    let invoker = ResilientInvoker::new(provider.clone());
    let started = Instant::now();

    let generation = invoker
        .invoke(&text_spec(&["primary", "fallback"]))
        .await
        .unwrap();

    assert_eq!(generation.model, "fallback");
    assert_eq!(generation.content.as_text(), Some("Built in 1889."));
    assert_eq!(generation.attempts_for("primary"), 3);
    assert_eq!(generation.attempts_for("fallback"), 1);
    // Two backoff sleeps on primary, none before switching models
    assert_eq!(started.elapsed(), Duration::from_millis(3000));
    assert_eq!(
        provider.gaps(),
        vec![
            Duration::from_millis(1000),
            Duration::from_millis(2000),
            Duration::ZERO
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn permanent_failure_skips_backoff() {
    let provider = ScriptedProvider::new(|model, _| match model {
        "strict" => bad_request(),
        _ => png(),
    });
    let invoker = ResilientInvoker::new(provider.clone());
    let started = Instant::now();

    let generation = invoker
        .invoke(&image_spec(&["strict", "lenient"]))
        .await
        .unwrap();

    assert_eq!(generation.model, "lenient");
    assert_eq!(generation.attempts_for("strict"), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(
        generation.content.to_data_url().as_deref(),
        Some("data:image/png;base64,iVBORw==")
    );
}

#[tokio::test(start_paused = true)]
async fn permanent_failure_on_last_model_uses_reason_message() {
    let provider = ScriptedProvider::new(|_, _| {
        Err(ProviderError::Api {
            status: 400,
            code: Some("INVALID_ARGUMENT".into()),
            message: "Request blocked due to SAFETY".into(),
        })
    });
    let invoker = ResilientInvoker::new(provider.clone());

    let err = invoker.invoke(&image_spec(&["a", "b"])).await.unwrap_err();

    assert_eq!(err.kind, FailureKind::Permanent);
    assert_eq!(err.message, UserMessage::ContentBlocked);
    assert_eq!(provider.models_called(), vec!["a", "b"]);
}

#[tokio::test(start_paused = true)]
async fn zero_matching_parts_is_a_failure() {
    // Text-only answers to an image request
    let provider = ScriptedProvider::new(|_, _| text("I cannot draw that"));
    let invoker = ResilientInvoker::new(provider.clone());

    let err = invoker.invoke(&image_spec(&["img"])).await.unwrap_err();

    assert_eq!(err.kind, FailureKind::Exhausted);
    assert_eq!(err.last_reason, Some(FailureReason::EmptyResponse));
    assert_eq!(provider.calls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn empty_candidates_then_content_recovers() {
    let provider = ScriptedProvider::new(|_, nth| match nth {
        0 => Ok(ResponseEnvelope::default()),
        _ => png(),
    });
    let invoker = ResilientInvoker::new(provider.clone());

    let generation = invoker.invoke(&image_spec(&["img"])).await.unwrap();

    assert_eq!(generation.attempts.len(), 2);
    assert!(matches!(
        generation.attempts[0].result,
        AttemptResult::Failed {
            reason: FailureReason::EmptyResponse,
            ..
        }
    ));
    assert_eq!(generation.attempts[1].result, AttemptResult::Succeeded);
}

#[tokio::test(start_paused = true)]
async fn empty_model_list_makes_no_calls() {
    let provider = ScriptedProvider::new(|_, _| text("unused"));
    let invoker = ResilientInvoker::new(provider.clone());
    let spec = RequestSpec {
        capability: Capability::Text,
        models: Vec::new(),
        payload: Payload {
            prompt: "hello".into(),
            ..Default::default()
        },
        settings: GenerationSettings::default(),
        retry: RetryPolicy::default(),
    };

    let err = invoker.invoke(&spec).await.unwrap_err();

    assert!(matches!(err.kind, FailureKind::InvalidConfiguration(_)));
    assert!(err.attempts.is_empty());
    assert!(provider.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn entity_not_found_is_credential_invalid_without_fallback() {
    let provider = ScriptedProvider::new(|_, _| entity_not_found());
    let invoker = ResilientInvoker::new(provider.clone());

    let err = invoker.invoke(&text_spec(&["a", "b"])).await.unwrap_err();

    assert!(err.is_credential_invalid());
    assert_eq!(err.message, UserMessage::ReconnectCredential);
    assert_ne!(err.message, UserMessage::Generic);
    assert_eq!(provider.models_called(), vec!["a"]);
}

#[tokio::test(start_paused = true)]
async fn repeated_invocations_are_independent() {
    let provider = ScriptedProvider::new(|_, _| text("ok"));
    let invoker = ResilientInvoker::new(provider.clone());
    let spec = text_spec(&["m"]);

    let first = invoker.invoke(&spec).await.unwrap();
    let second = invoker.invoke(&spec).await.unwrap();

    assert_eq!(first.attempts.len(), 1);
    assert_eq!(second.attempts.len(), 1);
    assert_eq!(provider.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn earlier_failures_do_not_leak_into_next_invocation() {
    // First invocation burns all attempts; the next one starts from scratch
    let provider = ScriptedProvider::new(|_, nth| if nth < 3 { unavailable() } else { text("ok") });
    let invoker = ResilientInvoker::new(provider.clone());
    let spec = text_spec(&["m"]);

    assert!(invoker.invoke(&spec).await.is_err());
    let generation = invoker.invoke(&spec).await.unwrap();

    assert_eq!(generation.attempts.len(), 1);
    assert_eq!(generation.attempts[0].attempt, 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_invocations_do_not_interact() {
    let provider = ScriptedProvider::new(|model, _| match model {
        "flaky" => unavailable(),
        _ => text("steady"),
    });
    let invoker = Arc::new(ResilientInvoker::new(provider.clone()));

    let flaky_spec = text_spec(&["flaky"]);
    let steady_spec = text_spec(&["steady"]);
    let (failed, succeeded) = tokio::join!(
        invoker.invoke(&flaky_spec),
        invoker.invoke(&steady_spec),
    );

    assert_eq!(failed.unwrap_err().attempts.len(), 3);
    assert_eq!(succeeded.unwrap().attempts.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn vendor_text_never_reaches_user_message() {
    let secret = "project-4711 quota bucket zeta";
    let provider = ScriptedProvider::new(move |_, _| {
        Err(ProviderError::Api {
            status: 500,
            code: None,
            message: secret.to_string(),
        })
    });
    let invoker = ResilientInvoker::new(provider);

    let err = invoker.invoke(&text_spec(&["m"])).await.unwrap_err();

    assert!(!err.to_string().contains(secret));
    assert!(!err.user_message().contains("4711"));
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_backoff_stops_attempts() {
    let provider = ScriptedProvider::new(|_, _| unavailable());
    let invoker = ResilientInvoker::new(provider.clone());
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        canceller.cancel();
    });

    let err = invoker
        .invoke_with_cancel(&text_spec(&["a", "b"]), &token)
        .await
        .unwrap_err();

    assert_eq!(err.kind, FailureKind::Cancelled);
    assert_eq!(err.message, UserMessage::Cancelled);
    assert_eq!(provider.calls().len(), 1);
    assert_eq!(err.last_reason, Some(FailureReason::Unavailable));
}

#[tokio::test(start_paused = true)]
async fn pre_cancelled_token_makes_no_calls() {
    let provider = ScriptedProvider::new(|_, _| text("unused"));
    let invoker = ResilientInvoker::new(provider.clone());
    let token = CancellationToken::new();
    token.cancel();

    let err = invoker
        .invoke_with_cancel(&text_spec(&["m"]), &token)
        .await
        .unwrap_err();

    assert_eq!(err.kind, FailureKind::Cancelled);
    assert!(provider.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn custom_policy_is_respected() {
    let provider = ScriptedProvider::new(|_, _| {
        Err(ProviderError::Timeout(Duration::from_secs(30)))
    });
    let invoker = ResilientInvoker::new(provider.clone());
    let spec = RequestSpec::builder(Capability::Text)
        .model("m")
        .prompt("hi")
        .retry(
            RetryPolicy::default()
                .with_max_attempts(5)
                .with_base_delay(Duration::from_millis(100))
                .with_max_delay(Duration::from_millis(300)),
        )
        .build()
        .unwrap();

    let err = invoker.invoke(&spec).await.unwrap_err();

    assert_eq!(err.last_reason, Some(FailureReason::Timeout));
    assert_eq!(
        provider.gaps(),
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(300),
            Duration::from_millis(300),
        ]
    );
}
