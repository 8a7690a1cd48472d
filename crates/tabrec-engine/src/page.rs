//! The page realm: one document's globals, its same-document broadcast
//! channel and its unload signal.
//!
//! Page code never holds a primitive directly. It looks the current one up on
//! every call (`page.console()`, `page.fetch(..)`, `page.new_xhr()`), so a
//! decorator installed later takes effect for all subsequent calls.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tabrec_common::formatter::{JsValue, format_console_args};
use tabrec_common::protocol::{LogLevel, PageMessage};
use thiserror::Error;
use tokio::sync::{broadcast, watch};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) tabrec/0.1";

const BROADCAST_CAPACITY: usize = 4096;

// ============================================================
// Primitives
// ============================================================

pub trait ConsoleApi: Send + Sync {
    fn call(&self, level: LogLevel, args: &[JsValue]);
}

impl dyn ConsoleApi {
    pub fn log(&self, args: &[JsValue]) {
        self.call(LogLevel::Log, args)
    }

    pub fn error(&self, args: &[JsValue]) {
        self.call(LogLevel::Error, args)
    }

    pub fn warn(&self, args: &[JsValue]) {
        self.call(LogLevel::Warn, args)
    }

    pub fn info(&self, args: &[JsValue]) {
        self.call(LogLevel::Info, args)
    }

    pub fn debug(&self, args: &[JsValue]) {
        self.call(LogLevel::Debug, args)
    }
}

/// The browser's own console: output goes to the host's tracing log.
pub struct NativeConsole;

impl ConsoleApi for NativeConsole {
    fn call(&self, level: LogLevel, args: &[JsValue]) {
        tracing::debug!(target: "page_console", %level, "{}", format_console_args(args));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: String,
    pub url: String,
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
            body: None,
        }
    }

    pub fn get(url: &str) -> Self {
        Self::new("GET", url)
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Rejection of the request-initiation primitive (no response at all).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct FetchError(pub String);

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// What a request object exposes once it reaches its terminal lifecycle signal.
/// A transport failure shows up as status 0, as it does in browsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XhrCompletion {
    pub status: u16,
    pub response_text: String,
    pub raw_headers: String,
}

#[async_trait]
pub trait XhrRequest: Send {
    /// The "configure" step.
    fn open(&mut self, method: &str, url: &str);

    /// The "finalize" step. Resolves when the request object signals `loadend`.
    async fn send(&mut self, body: Option<String>) -> XhrCompletion;
}

pub trait XhrFactory: Send + Sync {
    fn create(&self) -> Box<dyn XhrRequest>;
}

/// Network stack of a page with no connectivity.
pub struct OfflineNetwork;

#[async_trait]
impl Fetcher for OfflineNetwork {
    async fn fetch(&self, _request: FetchRequest) -> Result<FetchResponse, FetchError> {
        Err(FetchError("TypeError: Failed to fetch".into()))
    }
}

struct OfflineXhr;

#[async_trait]
impl XhrRequest for OfflineXhr {
    fn open(&mut self, _method: &str, _url: &str) {}

    async fn send(&mut self, _body: Option<String>) -> XhrCompletion {
        XhrCompletion {
            status: 0,
            response_text: String::new(),
            raw_headers: String::new(),
        }
    }
}

impl XhrFactory for OfflineNetwork {
    fn create(&self) -> Box<dyn XhrRequest> {
        Box::new(OfflineXhr)
    }
}

// ============================================================
// Broadcast
// ============================================================

/// Same-document broadcast. No acknowledgment; a message posted while nobody
/// listens is gone.
#[derive(Clone)]
pub struct PageChannel {
    tx: broadcast::Sender<PageMessage>,
}

impl PageChannel {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    pub fn post(&self, message: PageMessage) {
        if self.tx.send(message).is_err() {
            tracing::trace!("page broadcast dropped: no listener attached");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PageMessage> {
        self.tx.subscribe()
    }
}

// ============================================================
// Page globals
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptorState {
    Uninstalled,
    Installed,
}

pub struct PageGlobals {
    pub console: Arc<dyn ConsoleApi>,
    pub fetch: Arc<dyn Fetcher>,
    pub xhr: Arc<dyn XhrFactory>,
    pub interceptor: InterceptorState,
    relay_attached: bool,
}

struct PageInner {
    url: String,
    user_agent: String,
    channel: PageChannel,
    globals: Mutex<PageGlobals>,
    scripts_blocked: AtomicBool,
    unload_tx: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct PageContext {
    inner: Arc<PageInner>,
}

pub struct PageBuilder {
    url: String,
    user_agent: String,
    console: Arc<dyn ConsoleApi>,
    fetch: Arc<dyn Fetcher>,
    xhr: Arc<dyn XhrFactory>,
    scripts_blocked: bool,
}

impl PageBuilder {
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn console(mut self, console: Arc<dyn ConsoleApi>) -> Self {
        self.console = console;
        self
    }

    pub fn fetcher(mut self, fetch: Arc<dyn Fetcher>) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn xhr(mut self, xhr: Arc<dyn XhrFactory>) -> Self {
        self.xhr = xhr;
        self
    }

    /// Reject script injection, as a strict content security policy would.
    pub fn block_scripts(mut self, blocked: bool) -> Self {
        self.scripts_blocked = blocked;
        self
    }

    pub fn build(self) -> PageContext {
        let (unload_tx, _) = watch::channel(false);
        PageContext {
            inner: Arc::new(PageInner {
                url: self.url,
                user_agent: self.user_agent,
                channel: PageChannel::new(),
                globals: Mutex::new(PageGlobals {
                    console: self.console,
                    fetch: self.fetch,
                    xhr: self.xhr,
                    interceptor: InterceptorState::Uninstalled,
                    relay_attached: false,
                }),
                scripts_blocked: AtomicBool::new(self.scripts_blocked),
                unload_tx,
            }),
        }
    }
}

impl PageContext {
    pub fn builder(url: impl Into<String>) -> PageBuilder {
        let offline = Arc::new(OfflineNetwork);
        PageBuilder {
            url: url.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            console: Arc::new(NativeConsole),
            fetch: offline.clone(),
            xhr: offline,
            scripts_blocked: false,
        }
    }

    pub fn new(url: impl Into<String>) -> Self {
        Self::builder(url).build()
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn user_agent(&self) -> &str {
        &self.inner.user_agent
    }

    pub fn globals(&self) -> MutexGuard<'_, PageGlobals> {
        self.inner
            .globals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn console(&self) -> Arc<dyn ConsoleApi> {
        self.globals().console.clone()
    }

    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let fetcher = self.globals().fetch.clone();
        fetcher.fetch(request).await
    }

    pub fn new_xhr(&self) -> Box<dyn XhrRequest> {
        let factory = self.globals().xhr.clone();
        factory.create()
    }

    pub fn interceptor_state(&self) -> InterceptorState {
        self.globals().interceptor
    }

    pub fn channel(&self) -> PageChannel {
        self.inner.channel.clone()
    }

    pub fn post_message(&self, message: PageMessage) {
        self.inner.channel.post(message);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PageMessage> {
        self.inner.channel.subscribe()
    }

    pub fn scripts_blocked(&self) -> bool {
        self.inner.scripts_blocked.load(Ordering::SeqCst)
    }

    pub fn set_scripts_blocked(&self, blocked: bool) {
        self.inner.scripts_blocked.store(blocked, Ordering::SeqCst);
    }

    /// Marks the isolated relay as present. Returns false when one already is.
    pub fn claim_relay_slot(&self) -> bool {
        let mut globals = self.globals();
        if globals.relay_attached {
            return false;
        }
        globals.relay_attached = true;
        true
    }

    /// Fires the unload signal. The document is gone afterwards.
    pub fn unload(&self) {
        self.inner.unload_tx.send_replace(true);
    }

    pub fn is_unloaded(&self) -> bool {
        *self.inner.unload_tx.borrow()
    }

    pub fn unload_signal(&self) -> watch::Receiver<bool> {
        self.inner.unload_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_page_defaults() {
        let page = PageContext::new("https://example.com/");
        assert_eq!(page.interceptor_state(), InterceptorState::Uninstalled);
        assert_eq!(page.user_agent(), DEFAULT_USER_AGENT);

        let err = page.fetch(FetchRequest::get("/api")).await.unwrap_err();
        assert_eq!(err.to_string(), "TypeError: Failed to fetch");

        let mut xhr = page.new_xhr();
        xhr.open("GET", "/api");
        assert_eq!(xhr.send(None).await.status, 0);
    }

    #[test]
    fn test_broadcast_without_listener_is_dropped() {
        let page = PageContext::new("https://example.com/");
        page.post_message(PageMessage::console(LogLevel::Log, "nobody hears this"));

        let mut rx = page.subscribe();
        page.post_message(PageMessage::console(LogLevel::Log, "heard"));
        let received = rx.try_recv().unwrap();
        assert_eq!(received, PageMessage::console(LogLevel::Log, "heard"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_relay_slot_is_claimed_once() {
        let page = PageContext::new("https://example.com/");
        assert!(page.claim_relay_slot());
        assert!(!page.claim_relay_slot());
    }

    #[test]
    fn test_unload_signal() {
        let page = PageContext::new("https://example.com/");
        let signal = page.unload_signal();
        assert!(!*signal.borrow());
        page.unload();
        assert!(page.is_unloaded());
        assert!(*signal.borrow());
    }
}
