//! Client-side payment handling for reqwest.
//!
//! This module provides the [`X402Client`], which answers a `402 Payment
//! Required` by paying through a [`Wallet`], trading the transaction for a
//! proof token at a [`Verifier`], and retrying once with that proof.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use http::{Extensions, HeaderValue, StatusCode};
use nawa402::error::{Boundary, TransportError};
use nawa402::{
    PaymentError, PaymentRequest, PaymentTerms, ProofToken, VerificationRequest, Verifier, Wallet,
};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
use serde::Deserialize;
#[cfg(feature = "telemetry")]
use tracing::{debug, info, instrument, trace, warn};

use super::policy::PaymentPolicy;
use crate::constants::PAYMENT_PROOF_HEADER;
use crate::headers::decode_challenge;

/// Pays `402` challenges and retries the request with a proof.
///
/// Every call to the wallet, the verifier and the paid retry is bounded by
/// the client's timeout. The client holds no mutable state and can be shared
/// freely.
#[derive(Clone)]
#[allow(missing_debug_implementations)] // dyn trait objects do not implement Debug
pub struct X402Client {
    wallet: Arc<dyn Wallet>,
    verifier: Arc<dyn Verifier>,
    policies: Vec<Arc<dyn PaymentPolicy>>,
    timeout: Duration,
}

impl X402Client {
    /// Default bound for each external call.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a client that pays with `wallet` and obtains proofs from `verifier`.
    pub fn new<W, V>(wallet: W, verifier: V) -> Self
    where
        W: Wallet + 'static,
        V: Verifier + 'static,
    {
        Self {
            wallet: Arc::new(wallet),
            verifier: Arc::new(verifier),
            policies: Vec::new(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Sets the bound applied to each external call.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds a payment policy.
    ///
    /// Policies are checked in registration order before any money moves.
    #[must_use]
    pub fn with_policy<P: PaymentPolicy + 'static>(mut self, policy: P) -> Self {
        self.policies.push(Arc::new(policy));
        self
    }

    /// Returns the configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the paying address.
    #[must_use]
    pub fn address(&self) -> &str {
        self.wallet.address()
    }

    /// Pays `request` and returns the proof token to present on retry.
    ///
    /// # Errors
    ///
    /// - [`PaymentError::MalformedChallenge`] if the request names no recipient or no amount
    /// - [`PaymentError::ExpiredChallenge`] if its deadline has passed
    /// - [`PaymentError::PolicyRejected`] if a policy refuses it
    /// - [`PaymentError::SettlementExecutionFailed`] if the balance is short or the wallet refuses
    /// - [`PaymentError::VerificationRejected`] if the verifier refuses
    /// - [`PaymentError::TransportFailure`] if a call times out or cannot be made
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "x402.reqwest.settle_challenge",
            skip_all,
            fields(
                amount = %request.amount(),
                currency = %request.currency(),
                network = %request.network(),
            ),
            err
        )
    )]
    pub async fn settle_challenge(
        &self,
        request: &PaymentRequest,
    ) -> Result<ProofToken, PaymentError> {
        if request.recipient().is_empty() || request.amount().is_zero() {
            return Err(PaymentError::MalformedChallenge(
                "challenge names no recipient or no amount".to_owned(),
            ));
        }
        if request.is_expired() {
            return Err(PaymentError::ExpiredChallenge {
                deadline: request.deadline(),
            });
        }
        for policy in &self.policies {
            policy.check(request).map_err(PaymentError::PolicyRejected)?;
        }

        let terms = PaymentTerms::new(request.recipient(), request.amount(), request.currency());

        let balance = self
            .bounded(Boundary::Settlement, self.wallet.balance(&terms.currency))
            .await?;
        if balance < terms.amount {
            return Err(PaymentError::SettlementExecutionFailed(format!(
                "insufficient balance: {balance} {} available, {} required",
                terms.currency, terms.amount
            )));
        }

        let tx_signature = self
            .bounded(
                Boundary::Settlement,
                self.wallet.transfer(request.network(), &terms),
            )
            .await?;

        #[cfg(feature = "telemetry")]
        debug!(tx_signature = %tx_signature, "Payment settled, requesting proof");

        let verification = VerificationRequest::new(tx_signature, &terms);
        self.bounded(Boundary::Verification, self.verifier.verify(&verification))
            .await
    }

    /// Awaits `fut` under the client's timeout.
    async fn bounded<T, E, F>(&self, boundary: Boundary, fut: F) -> Result<T, PaymentError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<PaymentError>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_elapsed) => Err(TransportError::Timeout {
                boundary,
                after: self.timeout,
            }
            .into()),
        }
    }
}

/// Shape of a challenge body: only the embedded request matters here.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChallengeBody {
    payment_request: PaymentRequest,
}

/// What a `402` response turned out to carry.
#[derive(Debug)]
pub enum Challenge {
    /// A request the client can pay.
    Payable(PaymentRequest),
    /// No payable request. The response is handed back with its body intact.
    Unreadable(Response),
}

/// Extracts a payable request from a `402` response.
///
/// The `X-402-*` headers are authoritative when present. Without a version
/// header the JSON body's `paymentRequest` is tried instead. When neither
/// yields a payable request the response is handed back intact (the body is
/// buffered and reattached) so the caller sees the original `402`.
///
/// # Errors
///
/// Returns [`PaymentError::TransportFailure`] at the origin boundary if the
/// response body cannot be read.
#[cfg_attr(
    feature = "telemetry",
    instrument(name = "x402.reqwest.read_challenge", skip_all, err)
)]
pub async fn read_challenge(response: Response) -> Result<Challenge, PaymentError> {
    if let Some(decoded) = decode_challenge(response.headers()) {
        if decoded.is_usable() {
            #[cfg(feature = "telemetry")]
            debug!(defaulted = ?decoded.defaulted(), "Parsed challenge from headers");
            return Ok(Challenge::Payable(decoded.into_request()));
        }
        #[cfg(feature = "telemetry")]
        debug!("Challenge headers carry no recipient or amount, not paying");
        return Ok(Challenge::Unreadable(response));
    }

    let status = response.status();
    let version = response.version();
    let headers = response.headers().clone();
    let body = response
        .bytes()
        .await
        .map_err(|e| TransportError::Unavailable {
            boundary: Boundary::Origin,
            message: format!("failed to read challenge body: {e}"),
        })?;

    if let Ok(parsed) = serde_json::from_slice::<ChallengeBody>(&body) {
        let request = parsed.payment_request;
        if !request.recipient().is_empty() && !request.amount().is_zero() {
            #[cfg(feature = "telemetry")]
            debug!("Parsed challenge from body");
            return Ok(Challenge::Payable(request));
        }
    }

    #[cfg(feature = "telemetry")]
    debug!("Could not parse a challenge from response");

    let mut rebuilt = http::Response::new(body);
    *rebuilt.status_mut() = status;
    *rebuilt.version_mut() = version;
    *rebuilt.headers_mut() = headers;
    Ok(Challenge::Unreadable(Response::from(rebuilt)))
}

/// Runs the next middleware or HTTP client with optional telemetry instrumentation.
#[cfg_attr(
    feature = "telemetry",
    instrument(name = "x402.reqwest.next", skip_all)
)]
async fn run_next(
    next: rqm::Next<'_>,
    req: Request,
    extensions: &mut Extensions,
) -> rqm::Result<Response> {
    next.run(req, extensions).await
}

fn payment_error(err: PaymentError) -> rqm::Error {
    rqm::Error::Middleware(err.into())
}

#[async_trait::async_trait]
impl rqm::Middleware for X402Client {
    /// Handles a request, paying and retrying once on `402`.
    ///
    /// When a 402 response is received, this middleware:
    /// 1. Reads the challenge from the headers, or failing that the body
    /// 2. Pays it and obtains a proof token
    /// 3. Retries the request with `X-402-Payment-Proof`
    ///
    /// A challenge that cannot be read is not an error: the 402 is returned
    /// to the caller as received.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.reqwest.handle", skip_all, err)
    )]
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let retry_req = req.try_clone();
        let res = run_next(next.clone(), req, extensions).await?;

        if res.status() != StatusCode::PAYMENT_REQUIRED {
            #[cfg(feature = "telemetry")]
            trace!(status = ?res.status(), "No payment required, returning response");
            return Ok(res);
        }

        #[cfg(feature = "telemetry")]
        info!(url = %res.url(), "Received 402 Payment Required");

        let challenge = self
            .bounded(Boundary::Origin, read_challenge(res))
            .await
            .map_err(payment_error)?;
        let request = match challenge {
            Challenge::Payable(request) => request,
            Challenge::Unreadable(original) => return Ok(original),
        };

        let mut retry = retry_req.ok_or_else(|| payment_error(PaymentError::RequestNotCloneable))?;

        let proof = self
            .settle_challenge(&request)
            .await
            .map_err(payment_error)?;
        let proof = HeaderValue::from_str(proof.as_str()).map_err(|_| {
            payment_error(PaymentError::VerificationRejected(
                "proof token is not a valid header value".to_owned(),
            ))
        })?;
        retry.headers_mut().insert(PAYMENT_PROOF_HEADER, proof);

        #[cfg(feature = "telemetry")]
        trace!(url = %retry.url(), "Retrying request with payment proof");

        let res = tokio::time::timeout(self.timeout, run_next(next, retry, extensions))
            .await
            .map_err(|_elapsed| {
                payment_error(
                    TransportError::Timeout {
                        boundary: Boundary::Origin,
                        after: self.timeout,
                    }
                    .into(),
                )
            })??;

        if res.status() == StatusCode::PAYMENT_REQUIRED {
            #[cfg(feature = "telemetry")]
            warn!(url = %res.url(), "Paid retry was challenged again");
            return Err(payment_error(PaymentError::ChallengeRepeated));
        }
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{AllowedCurrencies, ReqwestWithPayments, ReqwestWithPaymentsBuild};
    use crate::headers::payment_headers;
    use nawa402::proof;
    use nawa402::verifier::LocalVerifier;
    use nawa402::wallet::WalletError;
    use nawa402::{Amount, BoxFuture, Network, PaymentConfig, Timestamp};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct TestWallet {
        balance: Amount,
        delay: Duration,
        transfers: Arc<AtomicUsize>,
    }

    impl TestWallet {
        fn funded(transfers: &Arc<AtomicUsize>) -> Self {
            Self {
                balance: "10".parse().unwrap(),
                delay: Duration::ZERO,
                transfers: Arc::clone(transfers),
            }
        }
    }

    impl Wallet for TestWallet {
        fn address(&self) -> &str {
            "Payer111"
        }

        fn balance<'a>(
            &'a self,
            _currency: &'a str,
        ) -> BoxFuture<'a, Result<Amount, WalletError>> {
            Box::pin(async move { Ok(self.balance) })
        }

        fn transfer<'a>(
            &'a self,
            _network: &'a Network,
            _terms: &'a PaymentTerms,
        ) -> BoxFuture<'a, Result<String, WalletError>> {
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                let n = self.transfers.fetch_add(1, Ordering::SeqCst);
                Ok(format!("sig-{n}"))
            })
        }
    }

    fn config() -> PaymentConfig {
        PaymentConfig::new("SOL", "Recipient111", "0.001".parse().unwrap())
    }

    fn challenge_template(request: &PaymentRequest) -> ResponseTemplate {
        let mut template = ResponseTemplate::new(402).set_body_json(json!({
            "error": "Payment Required",
            "paymentRequest": request,
        }));
        for (name, value) in payment_headers(request, None) {
            template = template.insert_header(name, value);
        }
        template
    }

    fn into_payment_error(err: rqm::Error) -> PaymentError {
        match err {
            rqm::Error::Middleware(e) => e
                .downcast_ref::<PaymentError>()
                .cloned()
                .expect("payment error"),
            rqm::Error::Reqwest(e) => panic!("unexpected reqwest error: {e}"),
        }
    }

    #[tokio::test]
    async fn test_non_402_is_returned_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/free"))
            .respond_with(ResponseTemplate::new(200).set_body_string("free"))
            .mount(&server)
            .await;

        let transfers = Arc::new(AtomicUsize::new(0));
        let client = reqwest::Client::new()
            .with_payments(X402Client::new(
                TestWallet::funded(&transfers),
                LocalVerifier::default(),
            ))
            .build();

        let res = client
            .get(format!("{}/free", server.uri()))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(transfers.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pays_and_retries_with_proof() {
        let server = MockServer::start().await;
        let request = PaymentRequest::new(&config());
        Mock::given(method("GET"))
            .and(path("/api/premium/data"))
            .and(header_exists(PAYMENT_PROOF_HEADER))
            .respond_with(ResponseTemplate::new(200).set_body_string("premium"))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/premium/data"))
            .respond_with(challenge_template(&request))
            .expect(1)
            .mount(&server)
            .await;

        let transfers = Arc::new(AtomicUsize::new(0));
        let client = reqwest::Client::new()
            .with_payments(X402Client::new(
                TestWallet::funded(&transfers),
                LocalVerifier::default(),
            ))
            .build();

        let res = client
            .get(format!("{}/api/premium/data", server.uri()))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.text().await.unwrap(), "premium");
        assert_eq!(transfers.load(Ordering::SeqCst), 1);

        let received = server.received_requests().await.unwrap();
        let paid = received
            .iter()
            .find_map(|r| r.headers.get(PAYMENT_PROOF_HEADER))
            .unwrap();
        let terms = PaymentTerms::new("Recipient111", "0.001".parse().unwrap(), "SOL");
        let record = proof::check(paid.to_str().unwrap(), &terms).unwrap();
        assert_eq!(record.tx_signature, "sig-0");
    }

    #[tokio::test]
    async fn test_falls_back_to_body_challenge() {
        let server = MockServer::start().await;
        let request = PaymentRequest::new(&config());
        Mock::given(method("GET"))
            .and(header_exists(PAYMENT_PROOF_HEADER))
            .respond_with(ResponseTemplate::new(200))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(402).set_body_json(json!({ "paymentRequest": request })),
            )
            .mount(&server)
            .await;

        let transfers = Arc::new(AtomicUsize::new(0));
        let client = reqwest::Client::new()
            .with_payments(X402Client::new(
                TestWallet::funded(&transfers),
                LocalVerifier::default(),
            ))
            .build();

        let res = client.get(server.uri()).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(transfers.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unusable_header_challenge_returns_original_402() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(402)
                    .insert_header("x-402-version", "1.0.0")
                    .set_body_string("pay up"),
            )
            .mount(&server)
            .await;

        let transfers = Arc::new(AtomicUsize::new(0));
        let client = reqwest::Client::new()
            .with_payments(X402Client::new(
                TestWallet::funded(&transfers),
                LocalVerifier::default(),
            ))
            .build();

        let res = client.get(server.uri()).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(res.text().await.unwrap(), "pay up");
        assert_eq!(transfers.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unreadable_body_returns_original_402() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(402)
                    .insert_header("x-custom", "kept")
                    .set_body_string("not json"),
            )
            .mount(&server)
            .await;

        let transfers = Arc::new(AtomicUsize::new(0));
        let client = reqwest::Client::new()
            .with_payments(X402Client::new(
                TestWallet::funded(&transfers),
                LocalVerifier::default(),
            ))
            .build();

        let res = client.get(server.uri()).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(res.headers()["x-custom"], "kept");
        assert_eq!(res.text().await.unwrap(), "not json");
        assert_eq!(transfers.load(Ordering::SeqCst), 0);
    }

    /// Serves one `402` that promises a longer body than it sends.
    async fn truncated_challenge_origin() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0_u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(
                    b"HTTP/1.1 402 Payment Required\r\n\
                      content-type: application/json\r\n\
                      content-length: 500\r\n\r\n{\"err",
                )
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}/premium")
    }

    #[tokio::test]
    async fn test_read_challenge_surfaces_truncated_body() {
        let url = truncated_challenge_origin().await;
        let res = reqwest::get(&url).await.unwrap();
        assert_eq!(res.status(), StatusCode::PAYMENT_REQUIRED);

        let err = read_challenge(res).await.unwrap_err();
        assert!(matches!(
            err,
            PaymentError::TransportFailure(TransportError::Unavailable {
                boundary: Boundary::Origin,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_truncated_challenge_is_transport_failure() {
        let url = truncated_challenge_origin().await;
        let transfers = Arc::new(AtomicUsize::new(0));
        let client = reqwest::Client::new()
            .with_payments(X402Client::new(
                TestWallet::funded(&transfers),
                LocalVerifier::default(),
            ))
            .build();

        let err = into_payment_error(client.get(&url).send().await.unwrap_err());
        assert!(matches!(
            err,
            PaymentError::TransportFailure(ref t) if t.boundary() == Boundary::Origin
        ));
        assert_eq!(transfers.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_second_402_is_challenge_repeated() {
        let server = MockServer::start().await;
        let request = PaymentRequest::new(&config());
        Mock::given(method("GET"))
            .respond_with(challenge_template(&request))
            .expect(2)
            .mount(&server)
            .await;

        let transfers = Arc::new(AtomicUsize::new(0));
        let client = reqwest::Client::new()
            .with_payments(X402Client::new(
                TestWallet::funded(&transfers),
                LocalVerifier::default(),
            ))
            .build();

        let err = client.get(server.uri()).send().await.unwrap_err();
        assert_eq!(into_payment_error(err), PaymentError::ChallengeRepeated);
        assert_eq!(transfers.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_policy_rejection_stops_before_payment() {
        let server = MockServer::start().await;
        let request = PaymentRequest::new(&config());
        Mock::given(method("GET"))
            .respond_with(challenge_template(&request))
            .mount(&server)
            .await;

        let transfers = Arc::new(AtomicUsize::new(0));
        let agent = X402Client::new(TestWallet::funded(&transfers), LocalVerifier::default())
            .with_policy(AllowedCurrencies::new(["USDC"]));
        let client = reqwest::Client::new().with_payments(agent).build();

        let err = client.get(server.uri()).send().await.unwrap_err();
        assert!(matches!(
            into_payment_error(err),
            PaymentError::PolicyRejected(_)
        ));
        assert_eq!(transfers.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_challenge_is_not_paid() {
        let transfers = Arc::new(AtomicUsize::new(0));
        let agent = X402Client::new(TestWallet::funded(&transfers), LocalVerifier::default());
        let issued: Timestamp = "2020-01-01T00:00:00.000Z".parse().unwrap();
        let request = PaymentRequest::new_at(&config(), issued);

        let err = agent.settle_challenge(&request).await.unwrap_err();
        assert_eq!(
            err,
            PaymentError::ExpiredChallenge {
                deadline: request.deadline()
            }
        );
        assert_eq!(transfers.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_insufficient_balance_is_settlement_failure() {
        let transfers = Arc::new(AtomicUsize::new(0));
        let wallet = TestWallet {
            balance: "0.0001".parse().unwrap(),
            ..TestWallet::funded(&transfers)
        };
        let agent = X402Client::new(wallet, LocalVerifier::default());

        let err = agent
            .settle_challenge(&PaymentRequest::new(&config()))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::SettlementExecutionFailed(_)));
        assert_eq!(transfers.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_slow_wallet_is_transport_timeout() {
        let transfers = Arc::new(AtomicUsize::new(0));
        let wallet = TestWallet {
            delay: Duration::from_millis(500),
            ..TestWallet::funded(&transfers)
        };
        let agent = X402Client::new(wallet, LocalVerifier::default())
            .with_timeout(Duration::from_millis(50));

        let err = agent
            .settle_challenge(&PaymentRequest::new(&config()))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PaymentError::TransportFailure(TransportError::Timeout {
                boundary: Boundary::Settlement,
                after: Duration::from_millis(50),
            })
        );
    }

    #[tokio::test]
    async fn test_challenge_without_recipient_is_malformed() {
        let transfers = Arc::new(AtomicUsize::new(0));
        let agent = X402Client::new(TestWallet::funded(&transfers), LocalVerifier::default());
        let config = PaymentConfig::new("SOL", "", "0.001".parse().unwrap());

        let err = agent
            .settle_challenge(&PaymentRequest::new(&config))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::MalformedChallenge(_)));
    }
}
