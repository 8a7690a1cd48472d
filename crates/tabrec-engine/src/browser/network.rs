use crate::page::{
    FetchError, FetchRequest, FetchResponse, Fetcher, XhrCompletion, XhrFactory, XhrRequest,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Respond {
        status: u16,
        headers: BTreeMap<String, String>,
        body: String,
    },
    /// The request never gets a response (DNS failure, connection refused).
    Fail(String),
}

/// The host's network: canned responses keyed by URL. Unknown URLs get a 404.
#[derive(Clone, Default)]
pub struct RouteTable {
    routes: Arc<Mutex<HashMap<String, Route>>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "text/plain".to_string());
        self.set(
            url,
            Route::Respond {
                status,
                headers,
                body: body.to_string(),
            },
        );
    }

    pub fn fail(&self, url: &str, message: &str) {
        self.set(url, Route::Fail(message.to_string()));
    }

    pub fn set(&self, url: &str, route: Route) {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), route);
    }

    pub fn lookup(&self, url: &str) -> Route {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
            .unwrap_or_else(|| Route::Respond {
                status: 404,
                headers: BTreeMap::new(),
                body: "Not Found".to_string(),
            })
    }
}

#[async_trait]
impl Fetcher for RouteTable {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        tokio::task::yield_now().await;
        match self.lookup(&request.url) {
            Route::Respond {
                status,
                headers,
                body,
            } => Ok(FetchResponse {
                status,
                headers,
                body,
            }),
            Route::Fail(message) => Err(FetchError(message)),
        }
    }
}

impl XhrFactory for RouteTable {
    fn create(&self) -> Box<dyn XhrRequest> {
        Box::new(RoutedXhr {
            routes: self.clone(),
            url: String::new(),
        })
    }
}

struct RoutedXhr {
    routes: RouteTable,
    url: String,
}

#[async_trait]
impl XhrRequest for RoutedXhr {
    fn open(&mut self, _method: &str, url: &str) {
        self.url = url.to_string();
    }

    async fn send(&mut self, _body: Option<String>) -> XhrCompletion {
        tokio::task::yield_now().await;
        match self.routes.lookup(&self.url) {
            Route::Respond {
                status,
                headers,
                body,
            } => XhrCompletion {
                status,
                response_text: body,
                raw_headers: headers
                    .iter()
                    .map(|(name, value)| format!("{}: {}\r\n", name, value))
                    .collect(),
            },
            Route::Fail(_) => XhrCompletion {
                status: 0,
                response_text: String::new(),
                raw_headers: String::new(),
            },
        }
    }
}
