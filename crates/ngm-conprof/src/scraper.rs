//! HTTP fetch of a single profile.
//!
//! A [`Scraper`] performs one GET against its [`Target`] per call and writes
//! the whole response body to the caller's sink.

use std::borrow::Cow;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, USER_AGENT};
use http::{HeaderMap, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Empty};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use ngm_core::ConfigHandle;

use crate::error::ScrapeError;
use crate::target::Target;

/// HTTP client shared by every scraper of a manager.
pub type HttpClient = Client<HttpConnector, Empty<Bytes>>;

const DEFAULT_USER_AGENT: &str = concat!("ngm-conprof/", env!("CARGO_PKG_VERSION"));

/// Build a plain-HTTP client with connection pooling.
pub fn http_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build_http()
}

/// Method, URI and headers of the request sent every cycle.
#[derive(Debug, Clone)]
struct RequestTemplate {
    uri: Uri,
    headers: HeaderMap,
}

impl RequestTemplate {
    fn build(target: &Target) -> Result<Self, ScrapeError> {
        let uri: Uri = target
            .url_string()
            .parse()
            .map_err(|e: http::uri::InvalidUri| ScrapeError::InvalidRequest(e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        for (k, v) in target.header() {
            let name = HeaderName::try_from(k.as_str())
                .map_err(|e| ScrapeError::InvalidRequest(format!("header {k}: {e}")))?;
            let value = HeaderValue::try_from(v.as_str())
                .map_err(|e| ScrapeError::InvalidRequest(format!("header {k}: {e}")))?;
            headers.insert(name, value);
        }

        Ok(Self { uri, headers })
    }

    fn request(&self) -> Request<Empty<Bytes>> {
        let mut req = Request::new(Empty::new());
        *req.uri_mut() = self.uri.clone();
        *req.headers_mut() = self.headers.clone();
        req
    }
}

/// Fetches profiles from one target.
pub struct Scraper {
    target: Arc<Target>,
    client: HttpClient,
    config: ConfigHandle,
    gzip: bool,
    template: Option<RequestTemplate>,
}

impl Scraper {
    pub fn new(target: Arc<Target>, client: HttpClient, config: ConfigHandle) -> Self {
        Self {
            target,
            client,
            config,
            gzip: false,
            template: None,
        }
    }

    /// Try to gunzip response bodies before handing them to the sink.
    pub fn with_gzip(mut self, gzip: bool) -> Self {
        self.gzip = gzip;
        self
    }

    pub fn target(&self) -> &Arc<Target> {
        &self.target
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Fetch one profile into `sink`.
    ///
    /// Returns `Ok(())` without touching the network when continuous
    /// profiling is disabled. The request is abandoned as soon as `scope`
    /// is cancelled or `timeout` elapses.
    pub async fn scrape<W: Write>(
        &mut self,
        scope: &CancellationToken,
        timeout: Duration,
        sink: &mut W,
    ) -> Result<(), ScrapeError> {
        if !self.config.is_enabled() {
            return Ok(());
        }

        let template = match self.template.take() {
            Some(template) => template,
            None => RequestTemplate::build(&self.target)?,
        };
        let req = template.request();
        self.template = Some(template);

        let client = &self.client;
        let fetch = async move {
            let resp = client.request(req).await?;
            let status = resp.status();
            if status != StatusCode::OK {
                return Err(ScrapeError::Status(status.to_string()));
            }
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(ScrapeError::Body)?
                .to_bytes();
            Ok::<Bytes, ScrapeError>(body)
        };

        let body = tokio::select! {
            _ = scope.cancelled() => return Err(ScrapeError::Cancelled),
            res = tokio::time::timeout(timeout, fetch) => {
                res.map_err(|_| ScrapeError::Timeout(timeout))??
            }
        };

        debug!(target_url = %self.target.url(), bytes = body.len(), "scrape fetched");

        let data = if self.gzip {
            try_unzip(&body)
        } else {
            Cow::Borrowed(body.as_ref())
        };
        sink.write_all(&data)?;
        Ok(())
    }
}

/// Gunzip `data`, or hand it back unchanged if it is not valid gzip.
pub fn try_unzip(data: &[u8]) -> Cow<'_, [u8]> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut out = Vec::new();
    match decoder.read_to_end(&mut out) {
        Ok(_) => Cow::Owned(out),
        Err(_) => Cow::Borrowed(data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use ngm_core::{ContinuousProfilingConfig, ProfilingPathConfig};
    use std::collections::BTreeMap;

    fn test_target(header: &[(&str, &str)]) -> Arc<Target> {
        let cfg = ProfilingPathConfig {
            path: "/debug/pprof/heap".to_string(),
            params: BTreeMap::new(),
            seconds: 0,
            header: header
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        Arc::new(Target::new("tidb", "127.0.0.1:1", "127.0.0.1:1", "heap", "http", &cfg).unwrap())
    }

    #[test]
    fn unzip_decodes_gzip() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"profile bytes").unwrap();
        let gz = encoder.finish().unwrap();

        assert_eq!(try_unzip(&gz).as_ref(), b"profile bytes");
    }

    #[test]
    fn unzip_returns_raw_bytes_on_failure() {
        let raw = b"not gzip at all";
        let out = try_unzip(raw);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out.as_ref(), raw);
    }

    #[test]
    fn unzip_returns_raw_bytes_on_truncated_stream() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[7u8; 4096]).unwrap();
        let gz = encoder.finish().unwrap();
        let truncated = &gz[..gz.len() / 2];

        assert_eq!(try_unzip(truncated).as_ref(), truncated);
    }

    #[test]
    fn template_carries_target_headers() {
        let target = test_target(&[("authorization", "Bearer abc")]);
        let template = RequestTemplate::build(&target).unwrap();
        let req = template.request();

        assert_eq!(req.method(), http::Method::GET);
        assert_eq!(req.uri().path(), "/debug/pprof/heap");
        assert_eq!(req.headers()["authorization"], "Bearer abc");
        assert!(req.headers().contains_key(USER_AGENT));
    }

    #[test]
    fn template_rejects_invalid_header_name() {
        let target = test_target(&[("bad header", "x")]);
        assert!(matches!(
            RequestTemplate::build(&target),
            Err(ScrapeError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn disabled_scrape_is_a_silent_noop() {
        let config = ConfigHandle::new(ContinuousProfilingConfig::default());
        let mut scraper = Scraper::new(test_target(&[]), http_client(), config);
        let mut buf = Vec::new();

        // Port 1 is closed; a real request would fail.
        let result = scraper
            .scrape(&CancellationToken::new(), Duration::from_secs(1), &mut buf)
            .await;
        assert!(result.is_ok());
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn closed_port_is_a_transport_error() {
        let config = ConfigHandle::new(ContinuousProfilingConfig {
            enable: true,
            ..Default::default()
        });
        let mut scraper = Scraper::new(test_target(&[]), http_client(), config);
        let mut buf = Vec::new();

        let result = scraper
            .scrape(&CancellationToken::new(), Duration::from_secs(2), &mut buf)
            .await;
        assert!(matches!(result, Err(ScrapeError::Transport(_))), "{result:?}");
    }
}
