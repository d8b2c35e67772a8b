//! Rate-limited document submission client.

use tracing::{debug, instrument, warn};

use super::encoder::{Document, Encoder};
use super::transport::{HttpTransport, Method, OutboundRequest, Transport, TransportResponse};
use crate::config::CrptConfig;
use crate::error::{GateError, Result};
use crate::ratelimit::{AdmissionGate, TimeUnit};

/// Path of the "introduce goods produced in the Russian Federation" workflow.
pub const INTRODUCE_GOODS_PATH: &str = "/api/v3/lk/documents/create";

const ACCEPT: &str = "*/*";
const CONTENT_TYPE: &str = "application/json;charset=UTF-8";

/// Client that submits documents through an [`AdmissionGate`].
///
/// Every submission takes one slot from the gate before the request is
/// sent, so at most `limit` requests leave this client per window no matter
/// how many tasks share it. Responses are returned as received, including
/// non-2xx statuses.
pub struct SubmissionClient<T: Transport = HttpTransport> {
    /// Base URL without a trailing slash
    base_url: String,
    /// Bearer token, if any
    auth_token: Option<String>,
    /// Gate every submission passes through
    gate: AdmissionGate,
    /// Encoder for structured documents
    encoder: Encoder,
    /// Performs the network call
    transport: T,
}

impl SubmissionClient<HttpTransport> {
    /// Create a client over HTTP admitting `request_limit` submissions per `unit`.
    pub fn new(
        base_url: &str,
        auth_token: Option<String>,
        unit: TimeUnit,
        request_limit: usize,
    ) -> Result<Self> {
        let gate = AdmissionGate::per_unit(request_limit, unit)?;
        Self::with_transport(base_url, auth_token, gate, HttpTransport::new()?)
    }

    /// Create a client over HTTP from configuration.
    pub fn from_config(config: &CrptConfig) -> Result<Self> {
        let gate = AdmissionGate::per_unit(
            config.rate_limiting.request_limit,
            config.rate_limiting.unit,
        )?;
        let transport = HttpTransport::with_timeouts(
            config.client.connect_timeout(),
            config.client.request_timeout(),
        )?;
        Self::with_transport(
            &config.client.base_url,
            config.client.auth_token.clone(),
            gate,
            transport,
        )
    }
}

impl<T: Transport> SubmissionClient<T> {
    /// Create a client with an explicit gate and transport.
    pub fn with_transport(
        base_url: &str,
        auth_token: Option<String>,
        gate: AdmissionGate,
        transport: T,
    ) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(GateError::InvalidArgument(
                "base URL must not be empty".to_string(),
            ));
        }

        Ok(Self {
            base_url: base_url.to_string(),
            auth_token: auth_token.filter(|token| !token.is_empty()),
            gate,
            encoder: Encoder::default(),
            transport,
        })
    }

    /// Replace the encoder used for structured documents.
    pub fn with_encoder(mut self, encoder: Encoder) -> Self {
        self.encoder = encoder;
        self
    }

    /// Get the normalized base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the admission gate.
    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Submit a document to `path` under the rate limit.
    ///
    /// Invalid arguments and encoding failures are reported before a slot is
    /// taken. The call then waits for a slot for as long as it takes. The
    /// transport's status and body are returned untouched.
    #[instrument(skip_all, fields(path = %path))]
    pub async fn submit(
        &self,
        path: &str,
        document: &Document,
        signature: &str,
    ) -> Result<TransportResponse> {
        validate_submission(path, document, signature)?;
        let body = self.encoder.encode_envelope(document, signature)?;

        self.gate.acquire().await;

        let request = self.build_request(path, body);
        debug!(
            url = %request.url,
            body_len = request.body.len(),
            "Sending document"
        );

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            warn!(status = response.status, "Document API returned non-success status");
        }

        Ok(response)
    }

    /// Submit a document to the "introduce goods" workflow.
    pub async fn submit_introduce_goods(
        &self,
        document: &Document,
        signature: &str,
    ) -> Result<TransportResponse> {
        self.submit(INTRODUCE_GOODS_PATH, document, signature).await
    }

    fn build_request(&self, path: &str, body: String) -> OutboundRequest {
        let mut headers = vec![
            ("Accept".to_string(), ACCEPT.to_string()),
            ("Content-Type".to_string(), CONTENT_TYPE.to_string()),
        ];
        if let Some(token) = &self.auth_token {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }

        OutboundRequest {
            method: Method::Post,
            url: format!("{}{}", self.base_url, path),
            headers,
            body,
        }
    }
}

impl<T: Transport> std::fmt::Debug for SubmissionClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.auth_token.is_some())
            .field("gate", &self.gate)
            .field("encoder", &self.encoder)
            .finish()
    }
}

fn validate_submission(path: &str, document: &Document, signature: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(GateError::InvalidArgument(format!(
            "path must start with '/', got '{}'",
            path
        )));
    }
    document.validate()?;
    if signature.is_empty() {
        return Err(GateError::InvalidArgument(
            "signature must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Records every request and answers with a fixed response.
    struct RecordingTransport {
        sent: Mutex<Vec<(Instant, OutboundRequest)>>,
        response: TransportResponse,
    }

    impl RecordingTransport {
        fn new(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                response: TransportResponse {
                    status,
                    body: body.to_string(),
                },
            })
        }

        fn requests(&self) -> Vec<OutboundRequest> {
            self.sent.lock().iter().map(|(_, r)| r.clone()).collect()
        }

        fn sent_at(&self) -> Vec<Instant> {
            self.sent.lock().iter().map(|(t, _)| *t).collect()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, request: OutboundRequest) -> Result<TransportResponse> {
            self.sent.lock().push((Instant::now(), request));
            Ok(self.response.clone())
        }
    }

    struct RefusingTransport;

    #[async_trait]
    impl Transport for RefusingTransport {
        async fn send(&self, _request: OutboundRequest) -> Result<TransportResponse> {
            Err(GateError::TransportFailure(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))))
        }
    }

    fn test_client(
        token: Option<&str>,
        limit: usize,
    ) -> (SubmissionClient<Arc<RecordingTransport>>, Arc<RecordingTransport>) {
        let transport = RecordingTransport::new(200, r#"{"value":"ok"}"#);
        let gate = AdmissionGate::new(limit, Duration::from_secs(1)).unwrap();
        let client = SubmissionClient::with_transport(
            "https://ismp.crpt.ru/",
            token.map(str::to_string),
            gate,
            transport.clone(),
        )
        .unwrap();
        (client, transport)
    }

    fn goods_document() -> Document {
        Document::Structured(json!({
            "doc_type": "LP_INTRODUCE_GOODS",
            "participant_inn": "1234567890",
        }))
    }

    #[tokio::test]
    async fn test_submit_builds_request() {
        let (client, transport) = test_client(Some("token-123"), 5);

        let response = client
            .submit("/api/v3/lk/documents/send", &goods_document(), "c2ln")
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, r#"{"value":"ok"}"#);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.url, "https://ismp.crpt.ru/api/v3/lk/documents/send");
        assert_eq!(request.header("Accept"), Some("*/*"));
        assert_eq!(
            request.header("Content-Type"),
            Some("application/json;charset=UTF-8")
        );
        assert_eq!(request.header("Authorization"), Some("Bearer token-123"));

        let body: Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(body["document"]["doc_type"], "LP_INTRODUCE_GOODS");
        assert_eq!(body["signature"], "c2ln");
    }

    #[tokio::test]
    async fn test_no_authorization_without_token() {
        for token in [None, Some("")] {
            let (client, transport) = test_client(token, 5);
            client
                .submit("/post", &goods_document(), "sig")
                .await
                .unwrap();
            assert_eq!(transport.requests()[0].header("Authorization"), None);
        }
    }

    #[tokio::test]
    async fn test_introduce_goods_matches_explicit_path() {
        let (client, transport) = test_client(Some("t"), 5);
        let document = goods_document();

        client.submit_introduce_goods(&document, "sig").await.unwrap();
        client
            .submit("/api/v3/lk/documents/create", &document, "sig")
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], requests[1]);
        assert_eq!(
            requests[0].url,
            format!("https://ismp.crpt.ru{}", INTRODUCE_GOODS_PATH)
        );
    }

    #[tokio::test]
    async fn test_invalid_path_consumes_nothing() {
        let (client, transport) = test_client(None, 2);

        for path in ["", "api/v3/lk/documents/create"] {
            let result = client.submit(path, &goods_document(), "sig").await;
            assert!(matches!(result, Err(GateError::InvalidArgument(_))));
        }

        assert!(transport.requests().is_empty());
        assert_eq!(client.gate().available(), 2);
    }

    #[tokio::test]
    async fn test_null_document_and_empty_signature_rejected() {
        let (client, transport) = test_client(None, 2);

        let result = client
            .submit("/post", &Document::Structured(Value::Null), "sig")
            .await;
        assert!(matches!(result, Err(GateError::InvalidArgument(_))));

        let result = client.submit("/post", &goods_document(), "").await;
        assert!(matches!(result, Err(GateError::InvalidArgument(_))));

        assert!(transport.requests().is_empty());
        assert_eq!(client.gate().available(), 2);
    }

    #[tokio::test]
    async fn test_malformed_serialized_document_consumes_nothing() {
        let (client, transport) = test_client(None, 2);

        for text in ["", "{not json"] {
            let document = Document::Serialized(text.to_string());
            let result = client.submit("/post", &document, "sig").await;
            assert!(matches!(result, Err(GateError::InvalidArgument(_))));
        }

        assert!(transport.requests().is_empty());
        assert_eq!(client.gate().available(), 2);
    }

    #[tokio::test]
    async fn test_missing_encoder_consumes_nothing() {
        let (client, transport) = test_client(None, 2);
        let client = client.with_encoder(Encoder::Disabled);

        let result = client.submit("/post", &goods_document(), "sig").await;

        assert!(matches!(result, Err(GateError::NoEncoderAvailable)));
        assert!(transport.requests().is_empty());
        assert_eq!(client.gate().available(), 2);
    }

    #[tokio::test]
    async fn test_serialized_document_without_encoder() {
        let (client, transport) = test_client(None, 2);
        let client = client.with_encoder(Encoder::Disabled);
        let document = Document::from_json_text(r#"{"doc_type":"LP_INTRODUCE_GOODS"}"#).unwrap();

        client.submit("/post", &document, "sig").await.unwrap();

        assert_eq!(
            transport.requests()[0].body,
            r#"{"document":{"doc_type":"LP_INTRODUCE_GOODS"},"signature":"sig"}"#
        );
    }

    #[tokio::test]
    async fn test_non_success_status_returned_verbatim() {
        let transport = RecordingTransport::new(403, "access denied");
        let gate = AdmissionGate::new(1, Duration::from_secs(1)).unwrap();
        let client =
            SubmissionClient::with_transport("https://ismp.crpt.ru", None, gate, transport).unwrap();

        let response = client.submit("/post", &goods_document(), "sig").await.unwrap();

        assert_eq!(
            response,
            TransportResponse {
                status: 403,
                body: "access denied".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let gate = AdmissionGate::new(1, Duration::from_secs(1)).unwrap();
        let client =
            SubmissionClient::with_transport("https://ismp.crpt.ru", None, gate, RefusingTransport)
                .unwrap();

        let result = client.submit("/post", &goods_document(), "sig").await;

        assert!(matches!(result, Err(GateError::TransportFailure(_))));
        assert_eq!(client.gate().available(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submissions_are_rate_limited() {
        let (client, transport) = test_client(None, 2);
        let client = Arc::new(client);
        let start = Instant::now();

        let submissions: Vec<_> = (0..5)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move {
                    client
                        .submit_introduce_goods(&goods_document(), "sig")
                        .await
                        .map(|_| ())
                })
            })
            .collect();
        for result in futures::future::join_all(submissions).await {
            result.unwrap().unwrap();
        }

        let mut offsets: Vec<u64> = transport
            .sent_at()
            .iter()
            .map(|t| t.duration_since(start).as_secs())
            .collect();
        offsets.sort_unstable();
        assert_eq!(offsets, vec![0, 0, 1, 1, 2]);
    }

    #[test]
    fn test_base_url_normalized() {
        let gate = AdmissionGate::new(1, Duration::from_secs(1)).unwrap();
        let client = SubmissionClient::with_transport(
            "https://ismp.crpt.ru//",
            None,
            gate,
            RefusingTransport,
        )
        .unwrap();
        assert_eq!(client.base_url(), "https://ismp.crpt.ru");
    }

    #[test]
    fn test_empty_base_url_rejected() {
        let gate = AdmissionGate::new(1, Duration::from_secs(1)).unwrap();
        let result = SubmissionClient::with_transport("  ", None, gate, RefusingTransport);
        assert!(matches!(result, Err(GateError::InvalidArgument(_))));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let result = SubmissionClient::new("https://ismp.crpt.ru", None, TimeUnit::Second, 0);
        assert!(matches!(result, Err(GateError::InvalidArgument(_))));
    }

    #[test]
    fn test_from_config() {
        let mut config = CrptConfig::default();
        config.client.base_url = "https://markirovka.example/".to_string();
        config.rate_limiting.unit = TimeUnit::Minute;
        config.rate_limiting.request_limit = 7;

        let client = SubmissionClient::from_config(&config).unwrap();

        assert_eq!(client.base_url(), "https://markirovka.example");
        assert_eq!(client.gate().limit(), 7);
        assert_eq!(client.gate().window(), Duration::from_secs(60));
    }
}
