use serde_json::json;
use std::sync::{Arc, Mutex};
use tabrec_engine::browser::RouteTable;
use tabrec_engine::formatter::JsValue;
use tabrec_engine::interceptor::{InstallOutcome, Interceptor, InterceptorInjector, ScriptInjector};
use tabrec_engine::page::{ConsoleApi, FetchRequest, InterceptorState, PageContext};
use tabrec_engine::protocol::{
    LogLevel, PageMessage, PagePayload, ResponseHeaders, ResponseStatus, Transport,
};
use tokio::sync::broadcast;

#[derive(Default)]
struct CapturingConsole {
    calls: Mutex<Vec<(LogLevel, usize)>>,
}

impl ConsoleApi for CapturingConsole {
    fn call(&self, level: LogLevel, args: &[JsValue]) {
        self.calls.lock().unwrap().push((level, args.len()));
    }
}

fn drain(rx: &mut broadcast::Receiver<PageMessage>) -> Vec<PageMessage> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message);
    }
    out
}

fn network_page() -> (PageContext, RouteTable) {
    let routes = RouteTable::new();
    let page = PageContext::builder("https://example.com/app")
        .fetcher(Arc::new(routes.clone()))
        .xhr(Arc::new(routes.clone()))
        .build();
    (page, routes)
}

#[test]
fn test_install_is_idempotent() {
    let page = PageContext::new("https://example.com/");
    assert_eq!(Interceptor::install(&page), InstallOutcome::Installed);
    assert_eq!(page.interceptor_state(), InterceptorState::Installed);
    assert_eq!(Interceptor::install(&page), InstallOutcome::AlreadyInstalled);

    // A second install must not stack a second wrapper.
    let mut rx = page.subscribe();
    page.console().log(&["once".into()]);
    assert_eq!(drain(&mut rx).len(), 1);
}

#[test]
fn test_console_wrapper_calls_original_then_broadcasts() {
    let original = Arc::new(CapturingConsole::default());
    let page = PageContext::builder("https://example.com/")
        .console(original.clone())
        .build();
    Interceptor::install(&page);
    let mut rx = page.subscribe();

    let console = page.console();
    console.log(&["a".into(), JsValue::from(json!({"k": 1}))]);
    console.error(&["b".into()]);
    console.warn(&[]);
    console.info(&[JsValue::from(2i64)]);
    console.debug(&[JsValue::Opaque("[object Window]".into())]);

    assert_eq!(
        *original.calls.lock().unwrap(),
        vec![
            (LogLevel::Log, 2),
            (LogLevel::Error, 1),
            (LogLevel::Warn, 0),
            (LogLevel::Info, 1),
            (LogLevel::Debug, 1),
        ]
    );

    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![
            PageMessage::console(LogLevel::Log, r#"a {"k":1}"#),
            PageMessage::console(LogLevel::Error, "b"),
            PageMessage::console(LogLevel::Warn, ""),
            PageMessage::console(LogLevel::Info, "2"),
            PageMessage::console(LogLevel::Debug, "[object Window]"),
        ]
    );
}

#[test]
fn test_console_before_install_is_not_broadcast() {
    let page = PageContext::new("https://example.com/");
    let mut rx = page.subscribe();
    page.console().log(&["early".into()]);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_fetch_success_is_captured_and_returned_unchanged() {
    let (page, routes) = network_page();
    routes.respond("https://example.com/api", 200, "hello");
    Interceptor::install(&page);
    let mut rx = page.subscribe();

    let response = page
        .fetch(FetchRequest::new("post", "https://example.com/api").with_body("x=1"))
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "hello");

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    let PagePayload::Network(capture) = &events[0].payload else {
        panic!("expected a network event");
    };
    let entry = &capture.entry;
    assert_eq!(entry.transport, Transport::Fetch);
    assert_eq!(entry.method, "POST");
    assert_eq!(entry.status, ResponseStatus::Code(200));
    assert_eq!(entry.response_body, "hello");
    assert!(entry.response_time >= entry.request_time);
    match &entry.headers {
        ResponseHeaders::Map(map) => assert_eq!(map.get("content-type").unwrap(), "text/plain"),
        other => panic!("unexpected headers: {:?}", other),
    }
}

#[tokio::test]
async fn test_fetch_rejection_emits_error_entry_and_propagates() {
    let (page, routes) = network_page();
    routes.fail("https://down.test/", "TypeError: Failed to fetch");
    Interceptor::install(&page);
    let mut rx = page.subscribe();

    let err = page
        .fetch(FetchRequest::get("https://down.test/"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "TypeError: Failed to fetch");

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    let PagePayload::Network(capture) = &events[0].payload else {
        panic!("expected a network event");
    };
    assert_eq!(capture.entry.status, ResponseStatus::Error);
    assert_eq!(capture.entry.response_body, "TypeError: Failed to fetch");
}

#[tokio::test]
async fn test_xhr_emits_on_completion_regardless_of_status() {
    let (page, routes) = network_page();
    routes.respond("https://example.com/missing", 500, "oops");
    routes.fail("https://down.test/", "net::ERR_NAME_NOT_RESOLVED");
    Interceptor::install(&page);
    let mut rx = page.subscribe();

    let mut xhr = page.new_xhr();
    xhr.open("get", "https://example.com/missing");
    let completion = xhr.send(None).await;
    assert_eq!(completion.status, 500);

    let mut xhr = page.new_xhr();
    xhr.open("PUT", "https://down.test/");
    assert_eq!(xhr.send(Some("{}".into())).await.status, 0);

    let entries: Vec<_> = drain(&mut rx)
        .into_iter()
        .map(|m| match m.payload {
            PagePayload::Network(capture) => capture.entry,
            other => panic!("unexpected payload {:?}", other),
        })
        .collect();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].transport, Transport::Xhr);
    assert_eq!(entries[0].method, "GET");
    assert_eq!(entries[0].status, ResponseStatus::Code(500));
    assert_eq!(entries[0].response_body, "oops");
    assert_eq!(
        entries[0].headers,
        ResponseHeaders::Raw("content-type: text/plain\r\n".into())
    );
    assert_eq!(entries[1].method, "PUT");
    assert_eq!(entries[1].status, ResponseStatus::Code(0));
}

#[tokio::test]
async fn test_script_injector_respects_blocked_pages() {
    let page = PageContext::builder("https://strict.test/")
        .block_scripts(true)
        .build();
    let err = ScriptInjector.inject(&page).await.unwrap_err();
    assert_eq!(err.code(), "INJECTION_FAILED");
    assert_eq!(page.interceptor_state(), InterceptorState::Uninstalled);

    page.set_scripts_blocked(false);
    assert_eq!(
        ScriptInjector.inject(&page).await.unwrap(),
        InstallOutcome::Installed
    );
    assert_eq!(
        ScriptInjector.inject(&page).await.unwrap(),
        InstallOutcome::AlreadyInstalled
    );
}
