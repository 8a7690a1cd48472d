use crate::page::{
    FetchError, FetchRequest, FetchResponse, Fetcher, PageChannel, XhrCompletion, XhrFactory,
    XhrRequest,
};
use async_trait::async_trait;
use std::sync::Arc;
use tabrec_common::protocol::{
    NetworkLogEntry, PageMessage, ResponseHeaders, ResponseStatus, Transport, now,
};

/// Wraps the request-initiation primitive. The caller gets exactly what the
/// original returned, rejection included.
pub struct InterceptedFetch {
    original: Arc<dyn Fetcher>,
    channel: PageChannel,
}

impl InterceptedFetch {
    pub fn new(original: Arc<dyn Fetcher>, channel: PageChannel) -> Self {
        Self { original, channel }
    }
}

#[async_trait]
impl Fetcher for InterceptedFetch {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let method = request.method.clone();
        let url = request.url.clone();
        let request_time = now();

        let result = self.original.fetch(request).await;

        let (status, response_body, headers) = match &result {
            Ok(response) => (
                ResponseStatus::Code(response.status),
                response.body.clone(),
                ResponseHeaders::Map(response.headers.clone()),
            ),
            Err(err) => (
                ResponseStatus::Error,
                err.to_string(),
                ResponseHeaders::default(),
            ),
        };

        self.channel.post(PageMessage::network(NetworkLogEntry {
            transport: Transport::Fetch,
            method,
            url,
            status,
            request_time,
            response_time: now(),
            response_body,
            headers,
        }));

        result
    }
}

/// Wraps the request-object constructor.
pub struct InterceptedXhrFactory {
    original: Arc<dyn XhrFactory>,
    channel: PageChannel,
}

impl InterceptedXhrFactory {
    pub fn new(original: Arc<dyn XhrFactory>, channel: PageChannel) -> Self {
        Self { original, channel }
    }
}

impl XhrFactory for InterceptedXhrFactory {
    fn create(&self) -> Box<dyn XhrRequest> {
        Box::new(InterceptedXhr {
            inner: self.original.create(),
            channel: self.channel.clone(),
            method: String::new(),
            url: String::new(),
        })
    }
}

struct InterceptedXhr {
    inner: Box<dyn XhrRequest>,
    channel: PageChannel,
    method: String,
    url: String,
}

#[async_trait]
impl XhrRequest for InterceptedXhr {
    fn open(&mut self, method: &str, url: &str) {
        self.method = method.to_ascii_uppercase();
        self.url = url.to_string();
        self.inner.open(method, url);
    }

    async fn send(&mut self, body: Option<String>) -> XhrCompletion {
        let request_time = now();
        let completion = self.inner.send(body).await;

        self.channel.post(PageMessage::network(NetworkLogEntry {
            transport: Transport::Xhr,
            method: self.method.clone(),
            url: self.url.clone(),
            status: ResponseStatus::Code(completion.status),
            request_time,
            response_time: now(),
            response_body: completion.response_text.clone(),
            headers: ResponseHeaders::Raw(completion.raw_headers.clone()),
        }));

        completion
    }
}
