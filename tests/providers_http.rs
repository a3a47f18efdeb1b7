// tests/providers_http.rs
//
// Provider HTTP contracts against local mock servers bound to 127.0.0.1:0,
// and the fallback chain when providers misbehave or are unreachable.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};

use feed_summarizer::cache::{MemoryCache, SharedCache};
use feed_summarizer::clock::ManualClock;
use feed_summarizer::logging::{EventLog, LogLevel, LogQuery};
use feed_summarizer::rate_limit::RateLimiter;
use feed_summarizer::summarize::text::word_count;
use feed_summarizer::summarize::{
    ClaudeProvider, OpenAiProvider, ProviderOutcome, Summarizer, SummaryProvider, SummarySource,
};

#[derive(Clone, Default)]
struct Seen {
    headers: Arc<Mutex<Vec<HeaderMap>>>,
    bodies: Arc<Mutex<Vec<Value>>>,
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve mock");
    });
    addr
}

fn mock(status: StatusCode, reply: Value) -> (Router, Seen) {
    let seen = Seen::default();
    let app = Router::new()
        .route(
            "/v1",
            post(
                move |State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>| {
                    let reply = reply.clone();
                    async move {
                        seen.headers.lock().unwrap().push(headers);
                        seen.bodies.lock().unwrap().push(body);
                        (status, Json(reply))
                    }
                },
            ),
        )
        .with_state(seen.clone());
    (app, seen)
}

fn summarizer(providers: Vec<Box<dyn SummaryProvider>>) -> (Summarizer, Arc<EventLog>) {
    let clock = Arc::new(ManualClock::new(1_749_600_000));
    let cache: SharedCache = Arc::new(MemoryCache::new(clock.clone()).with_sweep_one_in(0));
    let log = Arc::new(EventLog::new(clock.clone()));
    let s = Summarizer::new(
        providers,
        Arc::new(RateLimiter::with_defaults(clock)),
        cache,
        log.clone(),
    );
    (s, log)
}

const ARTICLE: &str = "Officials confirmed the attack. Security was raised at stations. Trains ran normally by evening.";

#[tokio::test]
async fn openai_request_shape_and_response() {
    let (app, seen) = mock(
        StatusCode::OK,
        json!({"choices":[{"message":{"role":"assistant","content":"Attack confirmed; security raised"}}]}),
    );
    let addr = spawn(app).await;
    let p = OpenAiProvider::new("sk-test", "gpt-3.5-turbo")
        .unwrap()
        .with_endpoint(format!("http://{addr}/v1"));

    let out = p.summarize(ARTICLE, 200).await;
    assert_eq!(
        out,
        ProviderOutcome::Success("Attack confirmed; security raised".into())
    );

    let headers = seen.headers.lock().unwrap();
    assert_eq!(headers[0]["authorization"], "Bearer sk-test");
    assert!(headers[0]["user-agent"]
        .to_str()
        .unwrap()
        .starts_with("feed-summarizer/"));
    let body = &seen.bodies.lock().unwrap()[0];
    assert_eq!(body["model"], "gpt-3.5-turbo");
    assert_eq!(body["max_tokens"], 300);
    assert_eq!(body["messages"][0]["role"], "system");
    assert!(body["messages"][1]["content"]
        .as_str()
        .unwrap()
        .starts_with("Summarize the following article in approximately 200 words."));
}

#[tokio::test]
async fn claude_request_shape_and_response() {
    let (app, seen) = mock(
        StatusCode::OK,
        json!({"content":[{"type":"text","text":"Stations secured."}]}),
    );
    let addr = spawn(app).await;
    let p = ClaudeProvider::new("ck-test", "claude-3-sonnet-20240229")
        .unwrap()
        .with_endpoint(format!("http://{addr}/v1"));

    assert_eq!(
        p.summarize(ARTICLE, 700).await,
        ProviderOutcome::Success("Stations secured.".into())
    );
    let headers = seen.headers.lock().unwrap();
    assert_eq!(headers[0]["x-api-key"], "ck-test");
    assert_eq!(headers[0]["anthropic-version"], "2023-06-01");
    let body = &seen.bodies.lock().unwrap()[0];
    assert_eq!(body["max_tokens"], 1_400);
    assert_eq!(body["messages"][0]["role"], "user");
}

#[tokio::test]
async fn server_error_falls_through_to_next_provider() {
    let (bad, _) = mock(StatusCode::INTERNAL_SERVER_ERROR, json!({"error":"boom"}));
    let (good, _) = mock(
        StatusCode::OK,
        json!({"content":[{"type":"text","text":"Second provider answer"}]}),
    );
    let bad = spawn(bad).await;
    let good = spawn(good).await;

    let (s, log) = summarizer(vec![
        Box::new(
            OpenAiProvider::new("k", "m")
                .unwrap()
                .with_endpoint(format!("http://{bad}/v1")),
        ),
        Box::new(
            ClaudeProvider::new("k", "m")
                .unwrap()
                .with_endpoint(format!("http://{good}/v1")),
        ),
    ]);
    let out = s.summarize_labeled(ARTICLE, 100, "Station alert").await;
    assert_eq!(out.source, SummarySource::Provider("claude"));
    assert_eq!(out.text, "Second provider answer.");

    let errors = log.query(&LogQuery {
        level: Some(LogLevel::Error),
        ..LogQuery::default()
    });
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.starts_with("openai error: HTTP 500"));
    assert!(errors[0].message.contains("Station alert"));
}

#[tokio::test]
async fn unreachable_providers_give_deterministic_local_summary() {
    // Grab a free port and close it again so nothing is listening there.
    let closed = {
        let l = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap()
    };
    let make = || -> Vec<Box<dyn SummaryProvider>> {
        vec![
            Box::new(
                OpenAiProvider::new("k", "m")
                    .unwrap()
                    .with_endpoint(format!("http://{closed}/v1")),
            ),
            Box::new(
                ClaudeProvider::new("k", "m")
                    .unwrap()
                    .with_endpoint(format!("http://{closed}/v1")),
            ),
        ]
    };

    let (a, _) = summarizer(make());
    let (b, _) = summarizer(make());
    let sa = a.summarize_labeled(ARTICLE, 100, "").await;
    let sb = b.summarize_labeled(ARTICLE, 100, "").await;
    assert_eq!(sa.source, SummarySource::Fallback);
    assert_eq!(sa.text, sb.text);
    assert_eq!(sa.text, ARTICLE);
}

#[tokio::test]
async fn long_provider_answer_is_cut_to_the_word_limit() {
    let limit = 120;
    let long: String = (0..limit + 5)
        .map(|i| format!("word{i}"))
        .collect::<Vec<_>>()
        .join(" ");
    let (app, _) = mock(
        StatusCode::OK,
        json!({"choices":[{"message":{"content": long}}]}),
    );
    let addr = spawn(app).await;
    let (s, _) = summarizer(vec![Box::new(
        OpenAiProvider::new("k", "m")
            .unwrap()
            .with_endpoint(format!("http://{addr}/v1")),
    )]);

    let out = s.summarize(ARTICLE, limit).await;
    assert_eq!(word_count(&out), limit);
    assert!(out.ends_with("word119."));
}

#[tokio::test]
async fn malformed_json_is_a_failure() {
    let app = Router::new().route("/v1", post(|| async { "<html>gateway</html>" }));
    let addr = spawn(app).await;
    let p = OpenAiProvider::new("k", "m")
        .unwrap()
        .with_endpoint(format!("http://{addr}/v1"));
    assert!(matches!(
        p.summarize(ARTICLE, 100).await,
        ProviderOutcome::Failure(_)
    ));
}
