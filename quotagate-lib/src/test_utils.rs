use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use url::Url;

use crate::Exchange;
use crate::transport::{Transport, TransportError};

/// One scripted answer of a [`ScriptedTransport`]
#[derive(Debug, Clone)]
pub(crate) struct Reply {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: String,
}

impl Reply {
    pub(crate) fn header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_str(value).unwrap(),
        );
        self
    }

    pub(crate) fn body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }
}

/// Answer with the given status code
pub(crate) fn reply(status: u16) -> Reply {
    Reply {
        status: Some(StatusCode::from_u16(status).unwrap()),
        headers: HeaderMap::new(),
        body: String::new(),
    }
}

/// Fail without any response
pub(crate) fn no_response() -> Reply {
    Reply {
        status: None,
        headers: HeaderMap::new(),
        body: String::new(),
    }
}

/// A [`Transport`] which plays back a fixed list of replies in order and
/// records the headers of every exchange
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    sent: Mutex<Vec<HeaderMap>>,
}

impl ScriptedTransport {
    pub(crate) fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            sent: Mutex::default(),
        })
    }

    /// Headers of all exchanges so far
    pub(crate) fn sent(&self) -> Vec<HeaderMap> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &Url, headers: HeaderMap) -> Result<Exchange, TransportError> {
        self.sent.lock().push(headers);
        let reply = self
            .replies
            .lock()
            .pop_front()
            .ok_or("no more scripted replies")?;
        let status = reply.status.ok_or("connection reset by peer")?;
        Ok(Exchange {
            status,
            headers: reply.headers,
            body: reply.body,
            url: url.clone(),
        })
    }
}
