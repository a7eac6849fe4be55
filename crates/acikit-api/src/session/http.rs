// Request path for the session: authorization, transport retries,
// re-authentication on 403, pagination and POST.

use std::time::Duration;

use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use serde_json::Value;
use tracing::{debug, info, trace};

use super::{Session, SessionState};
use crate::auth::Credentials;
use crate::error::Error;
use crate::query;
use crate::response::{self, ApicResponse};

impl Session {
    // ── Single requests ──────────────────────────────────────────────

    /// One HTTP exchange, authorized the way the credentials require.
    pub(crate) async fn send_once(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<(u16, String), Error> {
        let sign = self.inner.config.signs_every_request();
        self.send_with(method, url, body, timeout, sign).await
    }

    /// One HTTP exchange that always carries the certificate signature.
    pub(crate) async fn send_signed(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<(u16, String), Error> {
        self.send_with(method, url, body, timeout, true).await
    }

    async fn send_with(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        timeout: Duration,
        sign: bool,
    ) -> Result<(u16, String), Error> {
        let _permit = self
            .inner
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Closed)?;

        let full = format!("{}{url}", self.inner.base_url);
        let payload = body.map(Value::to_string).unwrap_or_default();
        trace!(%method, url, "sending request");

        let mut request = self.inner.http.request(method.clone(), &full).timeout(timeout);
        if body.is_some() {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(payload.clone());
        }
        if let Some(cookie) = self.cookie_for(method.as_str(), url, &payload, sign)? {
            request = request.header(COOKIE, cookie);
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    timeout_secs: timeout.as_secs(),
                }
            } else {
                Error::Unreachable(e)
            }
        })?;
        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(Error::Unreachable)?;
        Ok((status, text))
    }

    fn cookie_for(
        &self,
        method: &str,
        url: &str,
        payload: &str,
        sign: bool,
    ) -> Result<Option<String>, Error> {
        if sign {
            if let (Credentials::Certificate { key, .. }, Some(dn)) =
                (&self.inner.config.credentials, &self.inner.cert_dn)
            {
                return key.cookie(method, url, payload, dn).map(Some);
            }
        }
        Ok(self.current_token().map(|t| t.token.cookie()))
    }

    /// Send with transport retries (jittered backoff, bounded budget).
    async fn send_with_retry(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<(u16, String), Error> {
        let policy = &self.inner.config.retry;
        let mut attempt: u32 = 0;
        loop {
            match self.send_once(method.clone(), url, body, timeout).await {
                Err(e) if e.is_transient() && !policy.exhausted(attempt) => {
                    let delay = policy.delay(attempt);
                    info!(
                        error = %e,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        url,
                        "Retrying request"
                    );
                    tokio::select! {
                        biased;
                        () = self.inner.cancel.cancelled() => return Err(Error::Closed),
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Parse a response, re-authenticating once if the token was rejected.
    async fn exchange(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        timeout: Duration,
        retry_transport: bool,
    ) -> Result<ApicResponse, Error> {
        let mut reauthenticated = false;
        loop {
            let (status, text) = if retry_transport {
                self.send_with_retry(method.clone(), url, body, timeout).await?
            } else {
                self.send_once(method.clone(), url, body, timeout).await?
            };

            if status == 403 && !reauthenticated && self.current_token().is_some() {
                info!(url, "token rejected, re-authenticating");
                reauthenticated = true;
                if let Err(e) = self.authenticate(timeout).await {
                    if matches!(e, Error::AuthFailure { .. }) {
                        self.set_state(SessionState::Failed);
                    }
                    return Err(e);
                }
                self.set_state(SessionState::LoggedIn);
                continue;
            }

            if !(200..300).contains(&status) {
                return Err(response::controller_error(status, &text));
            }

            let body: Value = serde_json::from_str(&text).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: text.clone(),
            })?;
            return ApicResponse::from_body(status, &body);
        }
    }

    // ── Public request API ───────────────────────────────────────────

    /// GET with the default timeout. See [`get_with_timeout`](Self::get_with_timeout).
    pub async fn get(&self, url: &str) -> Result<ApicResponse, Error> {
        self.get_with_timeout(url, self.inner.config.timeout).await
    }

    /// GET with automatic pagination.
    ///
    /// When the controller declares a `totalCount` larger than the items
    /// returned, the remaining pages are fetched with `page`/`page-size`
    /// and concatenated. A "dataset is too big" rejection restarts the
    /// query page by page using the configured page size.
    pub async fn get_with_timeout(&self, url: &str, timeout: Duration) -> Result<ApicResponse, Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let first = match self.exchange(Method::GET, url, None, timeout, true).await {
            Ok(resp) => resp,
            Err(e) if e.is_dataset_too_big() => {
                debug!(url, page_size = self.inner.config.page_size, "result too big, paging");
                return self
                    .get_pages(url, self.inner.config.page_size, 0, Vec::new(), timeout)
                    .await;
            }
            Err(e) => return Err(e),
        };

        let already_paged = query::param_value(url, "page").is_some();
        if already_paged || first.imdata.is_empty() || first.total_count <= first.imdata.len() {
            return Ok(first);
        }

        let page_size = first.imdata.len();
        debug!(url, total = first.total_count, page_size, "following pages");
        let mut merged = self
            .get_pages(url, page_size, 1, first.imdata, timeout)
            .await?;
        merged.status = first.status;
        merged.subscription_id = first.subscription_id;
        Ok(merged)
    }

    async fn get_pages(
        &self,
        url: &str,
        page_size: usize,
        start_page: usize,
        mut collected: Vec<Value>,
        timeout: Duration,
    ) -> Result<ApicResponse, Error> {
        let size = page_size.to_string();
        let mut page = start_page;
        let mut total: usize;
        let mut status: u16;
        let mut subscription_id = None;

        loop {
            let page_url = query::with_param(
                &query::with_param(url, "page", &page.to_string()),
                "page-size",
                &size,
            );
            let resp = self
                .exchange(Method::GET, &page_url, None, timeout, true)
                .await?;
            status = resp.status;
            total = resp.total_count;
            subscription_id = subscription_id.or(resp.subscription_id);
            if resp.imdata.is_empty() {
                break;
            }
            let received = resp.imdata.len();
            collected.extend(resp.imdata);
            if collected.len() >= total || received < page_size {
                break;
            }
            page += 1;
        }

        Ok(ApicResponse {
            status,
            total_count: total.max(collected.len()),
            imdata: collected,
            subscription_id,
        })
    }

    /// Single unpaged GET, used by the subscription engine.
    pub(crate) async fn get_single(&self, url: &str) -> Result<ApicResponse, Error> {
        self.exchange(Method::GET, url, None, self.inner.config.timeout, true)
            .await
    }

    /// POST a nested MO document. Single attempt: transport failures are
    /// returned as-is and the caller owns any retry policy.
    pub async fn push_to_apic(&self, url: &str, data: &Value) -> Result<ApicResponse, Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        debug!(url, "pushing configuration");
        self.exchange(Method::POST, url, Some(data), self.inner.config.timeout, false)
            .await
    }
}
