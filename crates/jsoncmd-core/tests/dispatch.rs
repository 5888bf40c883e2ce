//! End-to-end dispatch scenarios against an in-memory registry.

use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flate2::read::GzDecoder;
use jsoncmd_core::{
    DispatchConfig, Dispatcher, Envelope, OperationError, OperationPolicy, RawResponse, Reply,
    RequestContext, RequestHead, RequestMethod, StaticRegistry, TargetType, TransportRequest,
};
use serde_json::{json, Value};

#[derive(Default)]
struct Greeter {
    calls: AtomicUsize,
}

impl Greeter {
    fn say_hello(&self, name: &str) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        format!("Hello, {}", name)
    }
}

struct Internal;

fn greeter_type() -> Arc<TargetType> {
    TargetType::builder::<Greeter>("Greeter")
        .operation("sayHello", 1, |g, args| async move {
            let name: String = args.get(0)?;
            Ok(g.say_hello(&name))
        })
        .operation("repeat", 2, |_g, args| async move {
            let text: String = args.get(0)?;
            let times: usize = args.get(1)?;
            Ok(text.repeat(times))
        })
        .operation("nothing", 0, |_g, _args| async move { Ok(Value::Null) })
        .operation_with("shutdown", 0, OperationPolicy::disallowed(), |_g, _args| async move {
            Ok(true)
        })
        .operation_with("report", 0, OperationPolicy::self_handling(), |_g, _args| async move {
            let cx = RequestContext::current().ok_or("no request context")?;
            let body = format!("path={}", cx.request().path);
            cx.response().write(
                RawResponse::new(200)
                    .header("Content-Type", "text/plain")
                    .body(body),
            );
            Ok(())
        })
        .operation("whereAmI", 0, |_g, _args| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let cx = RequestContext::current().ok_or("no request context")?;
            Ok(cx.request().path.clone())
        })
        .operation("fail", 1, |_g, args| async move {
            let reason: String = args.get(0)?;
            Err::<(), _>(OperationError::with_kind("IllegalStateException", reason))
        })
        .operation("slow", 0, |_g, _args| async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok("done")
        })
        .operation("slowEcho", 1, |_g, args| async move {
            let text: String = args.get(0)?;
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(text.len())
        })
        .build()
        .unwrap()
}

fn setup() -> (Dispatcher, Arc<Greeter>) {
    setup_with(DispatchConfig::default())
}

fn setup_with(config: DispatchConfig) -> (Dispatcher, Arc<Greeter>) {
    let greeter = Arc::new(Greeter::default());
    let registry = StaticRegistry::new();
    registry
        .register("Greeter", Arc::clone(&greeter), greeter_type())
        .unwrap();
    let internal = TargetType::builder::<Internal>("Internal")
        .not_controller()
        .operation("secret", 0, |_i, _a| async move { Ok("hidden") })
        .build()
        .unwrap();
    registry.register("Internal", Arc::new(Internal), internal).unwrap();
    (Dispatcher::new(Arc::new(registry)).with_config(config), greeter)
}

fn get(path: &str, json: Option<&str>) -> TransportRequest {
    TransportRequest::get(
        RequestHead::new(RequestMethod::Get, path),
        json.map(str::to_string),
    )
}

fn post(path: &str, body: &str) -> TransportRequest {
    TransportRequest::post(
        RequestHead::new(RequestMethod::Post, path),
        Some(body.len() as u64),
        Ok(body.as_bytes().to_vec()),
    )
}

fn body_text(reply: &Reply) -> String {
    match reply {
        Reply::Encoded(encoded) => String::from_utf8(encoded.body.clone()).unwrap(),
        other => panic!("expected an encoded reply, got {:?}", other),
    }
}

// ── Test 1 ──
#[tokio::test]
async fn get_say_hello() {
    let (d, _) = setup();
    let reply = d.handle(get("/Greeter/sayHello", Some(r#"["World"]"#))).await;
    assert_eq!(body_text(&reply), r#"{"data":"Hello, World","status":true}"#);
}

// ── Test 2 ──
#[tokio::test]
async fn post_wrong_arity_is_method_not_found() {
    let (d, greeter) = setup();
    let reply = d.handle(post("/Greeter/sayHello", "[]")).await;
    assert_eq!(
        body_text(&reply),
        r#"{"data":"error: Method not found: Greeter.sayHello.0","status":false}"#
    );
    assert_eq!(greeter.calls.load(Ordering::SeqCst), 0);
}

// ── Test 3 ──
#[tokio::test]
async fn get_without_json_parameter() {
    let (d, _) = setup();
    for json in [None, Some(""), Some("   ")] {
        let reply = d.handle(get("/Greeter/sayHello", json)).await;
        assert_eq!(
            body_text(&reply),
            r#"{"data":"error: HTTP-GET had empty or no 'json' parameter.","status":false}"#
        );
    }
}

// ── Test 4 ──
#[tokio::test]
async fn disallowed_operation() {
    let (d, _) = setup();
    let reply = d.handle(post("/Greeter/shutdown", "[]")).await;
    assert_eq!(
        reply.envelope(),
        Some(Envelope::failure(
            "error: Method 'shutdown' is not allowed to be called via HTTP Request."
        ))
    );
    // Still refused the second time; disallowed entries are never cached.
    let again = d.handle(post("/Greeter/shutdown", "null")).await;
    assert_eq!(again.envelope().map(|e| e.status), Some(false));
    assert_eq!(d.resolver().cached_len(), 0);
}

// ── Test 5 ──
#[tokio::test]
async fn non_array_payloads_never_invoke() {
    let (d, greeter) = setup();
    for body in [r#"{"name":"World"}"#, r#""World""#, "1", "false"] {
        let reply = d.handle(post("/Greeter/sayHello", body)).await;
        let envelope = reply.envelope().unwrap();
        assert!(!envelope.status);
        assert_eq!(envelope.data, json!("error: Arguments must be either null or a JSON array"));
    }
    assert_eq!(greeter.calls.load(Ordering::SeqCst), 0);
}

// ── Test 6 ──
#[tokio::test]
async fn unknown_and_ineligible_targets() {
    let (d, _) = setup();
    let reply = d.handle(post("/Nobody/sayHello", "[]")).await;
    assert_eq!(
        reply.envelope(),
        Some(Envelope::failure("error: Invalid target 'Nobody'."))
    );

    let reply = d.handle(post("/Internal/secret", "[]")).await;
    assert_eq!(
        reply.envelope(),
        Some(Envelope::failure(
            "error: target 'Internal' is not marked as a controller."
        ))
    );
}

// ── Test 7 ──
#[tokio::test]
async fn operation_failure_reports_kind_and_message() {
    let (d, _) = setup();
    let reply = d.handle(post("/Greeter/fail", r#"["bad state"]"#)).await;
    assert_eq!(
        reply.envelope(),
        Some(Envelope::failure(
            "error: 'fail' failed with the following error: IllegalStateException bad state"
        ))
    );
}

// ── Test 8 ──
#[tokio::test]
async fn argument_type_mismatch_is_operation_failure() {
    let (d, greeter) = setup();
    let reply = d.handle(post("/Greeter/sayHello", "[42]")).await;
    let envelope = reply.envelope().unwrap();
    assert!(!envelope.status);
    let text = envelope.data.as_str().unwrap();
    assert!(text.starts_with("error: 'sayHello' failed with the following error: InvalidArgument argument 0:"));
    assert_eq!(greeter.calls.load(Ordering::SeqCst), 0);
}

// ── Test 9 ──
#[tokio::test]
async fn small_payloads_never_compressed() {
    let (d, _) = setup();
    let head = RequestHead::new(RequestMethod::Post, "/Greeter/repeat")
        .with_header("Accept-Encoding", "gzip, deflate");
    let reply = d
        .handle(TransportRequest::post(head, Some(11), Ok(br#"["ab", 100]"#.to_vec())))
        .await;
    let Reply::Encoded(encoded) = reply else {
        panic!("expected encoded reply");
    };
    assert!(encoded.body.len() <= 512);
    assert_eq!(encoded.content_encoding, None);
}

// ── Test 10 ──
#[tokio::test]
async fn large_payloads_compressed_when_accepted() {
    let (d, _) = setup();
    let body = r#"["ab", 2000]"#;
    let head = RequestHead::new(RequestMethod::Post, "/Greeter/repeat")
        .with_header("Accept-Encoding", "gzip, deflate");
    let reply = d
        .handle(TransportRequest::post(
            head,
            Some(body.len() as u64),
            Ok(body.as_bytes().to_vec()),
        ))
        .await;
    let Reply::Encoded(encoded) = &reply else {
        panic!("expected encoded reply");
    };
    assert_eq!(encoded.content_encoding, Some("gzip"));

    let mut plain = String::new();
    GzDecoder::new(encoded.body.as_slice())
        .read_to_string(&mut plain)
        .unwrap();
    assert!(plain.len() > encoded.body.len());
    assert_eq!(
        serde_json::from_str::<Envelope>(&plain).unwrap(),
        Envelope::success(json!("ab".repeat(2000)))
    );

    // Same call without gzip support comes back plain.
    let reply = d.handle(post("/Greeter/repeat", body)).await;
    let Reply::Encoded(encoded) = reply else {
        panic!("expected encoded reply");
    };
    assert_eq!(encoded.content_encoding, None);
}

// ── Test 11 ──
#[tokio::test]
async fn self_handling_operation_bypasses_envelope() {
    let (d, _) = setup();
    let reply = d.handle(post("/Greeter/report/ignored", "[]")).await;
    match reply {
        Reply::Raw(raw) => {
            assert_eq!(raw.status, 200);
            assert_eq!(raw.body, b"path=/Greeter/report/ignored");
            assert!(raw
                .headers
                .contains(&("Content-Type".to_string(), "text/plain".to_string())));
        }
        other => panic!("expected raw reply, got {:?}", other),
    }
}

// ── Test 12 ──
#[tokio::test]
async fn resolution_is_cached_and_idempotent() {
    let (d, greeter) = setup();
    for _ in 0..3 {
        let reply = d.handle(get("/Greeter/sayHello", Some(r#"["again"]"#))).await;
        assert_eq!(
            reply.envelope(),
            Some(Envelope::success(json!("Hello, again")))
        );
    }
    assert_eq!(d.resolver().scan_count(), 1);
    assert_eq!(d.resolver().cached_len(), 1);
    assert_eq!(greeter.calls.load(Ordering::SeqCst), 3);
}

// ── Test 13 ──
#[tokio::test]
async fn concurrent_requests_see_their_own_context() {
    let (d, _) = setup();
    let d = Arc::new(d);
    let mut handles = Vec::new();
    for i in 0..24 {
        let d = Arc::clone(&d);
        handles.push(tokio::spawn(async move {
            let path = format!("/Greeter/whereAmI/{i}");
            let reply = d.handle(post(&path, "[]")).await;
            (path, reply.envelope())
        }));
    }
    for handle in handles {
        let (path, envelope) = handle.await.unwrap();
        assert_eq!(envelope, Some(Envelope::success(json!(path))));
    }
    assert!(RequestContext::current().is_none());
}

// ── Test 14 ──
#[tokio::test]
async fn slow_calls_are_advisory_only() {
    let config = DispatchConfig {
        slow_call_threshold_ms: 1,
        ..DispatchConfig::default()
    };
    let (d, _) = setup_with(config);
    let reply = d.handle(post("/Greeter/slow", "[]")).await;
    assert_eq!(reply.envelope(), Some(Envelope::success(json!("done"))));
}

/// Collects formatted log output for assertions.
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ── Test 15 ──
#[tokio::test]
async fn slow_api_event_logs_clipped_payload() {
    let capture = LogCapture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let config = DispatchConfig {
        slow_call_threshold_ms: 1,
        ..DispatchConfig::default()
    };
    let (d, _) = setup_with(config);
    let long = "x".repeat(400);
    let body = format!(r#"["{}"]"#, long);
    let reply = d.handle(post("/Greeter/slowEcho", &body)).await;
    assert_eq!(reply.envelope(), Some(Envelope::success(json!(400))));

    let logs = capture.contents();
    let line = logs
        .lines()
        .find(|l| l.contains("[Dispatcher] Slow API: "))
        .expect("slow API event");
    let preview = line
        .split("Slow API: ")
        .nth(1)
        .and_then(|rest| rest.split(" took ").next())
        .unwrap();
    assert_eq!(preview.chars().count(), 255);
    assert_eq!(preview, &body[..255]);
    assert!(line.ends_with(" ms"));
}
