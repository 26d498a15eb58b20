use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use wreq::{Client, Method};

use aar_providers::{Headers, HttpMethod, UpstreamRequest};

/// Streamed body chunks; an `Err` marks an abnormal upstream termination so
/// downstream framing can omit the `[DONE]` terminator.
pub type ByteStream = tokio::sync::mpsc::Receiver<Result<Bytes, String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Other,
}

#[derive(Debug)]
pub enum UpstreamFailure {
    /// Transport-level failure; no HTTP response was received.
    Transport {
        kind: TransportErrorKind,
        message: String,
    },
    /// HTTP error response captured as bytes.
    Http {
        status: u16,
        headers: Headers,
        body: Bytes,
    },
}

#[derive(Debug)]
pub enum UpstreamBody {
    Bytes(Bytes),
    Stream(ByteStream),
}

#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: UpstreamBody,
}

pub trait UpstreamClient: Send + Sync {
    fn send<'a>(
        &'a self,
        request: UpstreamRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamResponse, UpstreamFailure>> + Send + 'a>>;
}

#[derive(Clone)]
pub struct WreqUpstreamClient {
    client: Client,
    stream_idle_timeout: Duration,
}

impl WreqUpstreamClient {
    pub fn new(
        connect_timeout: Duration,
        stream_idle_timeout: Duration,
    ) -> Result<Self, wreq::Error> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(stream_idle_timeout)
            .build()?;
        Ok(Self {
            client,
            stream_idle_timeout,
        })
    }

    pub fn http_client(&self) -> Client {
        self.client.clone()
    }
}

impl UpstreamClient for WreqUpstreamClient {
    fn send<'a>(
        &'a self,
        request: UpstreamRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamResponse, UpstreamFailure>> + Send + 'a>>
    {
        Box::pin(async move {
            let method = match request.method {
                HttpMethod::Get => Method::GET,
                HttpMethod::Post => Method::POST,
            };
            let mut builder = self.client.request(method, &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(map_wreq_error)?;
            convert_response(response, request.is_stream, self.stream_idle_timeout).await
        })
    }
}

async fn convert_response(
    response: wreq::Response,
    want_stream: bool,
    stream_idle_timeout: Duration,
) -> Result<UpstreamResponse, UpstreamFailure> {
    let status = response.status().as_u16();
    let headers = headers_to_vec(response.headers());

    // Error responses are read whole regardless of streaming intent, so the
    // engine can classify them before any bytes reach the client.
    let is_success = (200..300).contains(&status);
    if !is_success || !want_stream {
        let body = response.bytes().await.map_err(map_wreq_error)?;
        return Ok(UpstreamResponse {
            status,
            headers,
            body: UpstreamBody::Bytes(body),
        });
    }

    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, String>>(16);
    tokio::spawn(async move {
        let mut stream = response.bytes_stream();
        loop {
            let next = tokio::time::timeout(stream_idle_timeout, stream.next()).await;
            let item = match next {
                Ok(item) => item,
                Err(_) => {
                    let _ = tx.send(Err("upstream stream idle timeout".to_string())).await;
                    break;
                }
            };
            let Some(item) = item else {
                break;
            };
            match item {
                Ok(chunk) => {
                    if tx.send(Ok(chunk)).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    let _ = tx.send(Err(err.to_string())).await;
                    break;
                }
            }
        }
    });

    Ok(UpstreamResponse {
        status,
        headers,
        body: UpstreamBody::Stream(rx),
    })
}

fn headers_to_vec(map: &wreq::header::HeaderMap) -> Headers {
    let mut out = Vec::new();
    for (name, value) in map {
        if let Ok(value) = value.to_str() {
            out.push((name.as_str().to_string(), value.to_string()));
        }
    }
    out
}

fn map_wreq_error(err: wreq::Error) -> UpstreamFailure {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() || err.is_connection_reset() {
        TransportErrorKind::Connect
    } else {
        TransportErrorKind::Other
    };
    UpstreamFailure::Transport {
        kind,
        message: err.to_string(),
    }
}
