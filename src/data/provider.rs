use {
    crate::{
        config::{BackendApiConfig, pipeline::execution_fields},
        data::messages::{PollResponse, error_text, id_value, unwrap_envelope},
        domain::{RawExecutionRecord, RawRecord},
    },
    anyhow::{Context, Result, anyhow},
    async_trait::async_trait,
    chrono::NaiveDate,
    reqwest::{Client, Method},
    serde_json::{Value, json},
};

/// Source of full execution snapshots, polled on a fixed interval.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, execution_id: &str) -> Result<PollResponse>;
}

/// Backend actions that start or restart work.
#[async_trait]
pub trait ExecutionLauncher: Send + Sync {
    async fn launch(&self, report_date: NaiveDate) -> Result<LaunchReceipt>;

    async fn reprocess_fund(&self, execution_id: &str, fund_id: &str) -> Result<Value>;

    async fn reprocess_failed(&self, execution_id: &str) -> Result<Value>;
}

/// What the backend hands back when a run is launched.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchReceipt {
    pub execution_id: String,
    pub execution: RawExecutionRecord,
}

impl LaunchReceipt {
    pub fn from_payload(payload: Value) -> Result<Self> {
        let execution = RawRecord::from_value(payload)
            .ok_or_else(|| anyhow!("launch response carried no execution"))?;
        let execution_id = execution
            .text(execution_fields::EXECUTION_ID)
            .ok_or_else(|| anyhow!("launch response has no ID_Ejecucion"))?;
        Ok(Self {
            execution_id,
            execution,
        })
    }
}

/// REST client for the pipeline backend.
pub struct HttpBackend {
    client: Client,
    config: BackendApiConfig,
}

impl HttpBackend {
    pub fn new(config: BackendApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &BackendApiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Sends one request and returns the unwrapped payload.
    ///
    /// Transport failures (connect, timeout) are retried up to `retries` times with a fixed
    /// delay. An HTTP error status is final and never retried.
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = self.url(path);
        let mut attempt = 0;
        let response = loop {
            let mut req = self.client.request(method.clone(), &url);
            if let Some(body) = &body {
                req = req.json(body);
            }
            match req.send().await {
                Ok(resp) => break resp,
                Err(e) if attempt < self.config.retries && (e.is_timeout() || e.is_connect()) => {
                    attempt += 1;
                    log::warn!(
                        "Retry {}/{} for {} {}: {}",
                        attempt,
                        self.config.retries,
                        method,
                        url,
                        e
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => return Err(e).with_context(|| format!("{} {}", method, url)),
            }
        };

        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("reading body of {} {}", method, url))?;
        // Error pages are not always JSON.
        let parsed = serde_json::from_str::<Value>(&text);
        if !status.is_success() {
            let message = parsed
                .as_ref()
                .ok()
                .and_then(|p| p.get("error"))
                .and_then(error_text)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(anyhow!(message)).with_context(|| format!("{} {}", method, url));
        }
        let payload = parsed.with_context(|| format!("decoding body of {} {}", method, url))?;
        unwrap_envelope(payload)
    }
}

#[async_trait]
impl StatusSource for HttpBackend {
    async fn fetch_status(&self, execution_id: &str) -> Result<PollResponse> {
        let payload = self
            .request(Method::GET, &format!("/procesos/v2/ejecucion/{}", execution_id), None)
            .await?;
        PollResponse::from_body(payload)
    }
}

#[async_trait]
impl ExecutionLauncher for HttpBackend {
    async fn launch(&self, report_date: NaiveDate) -> Result<LaunchReceipt> {
        let body = json!({ "fechaReporte": report_date.format("%Y-%m-%d").to_string() });
        let payload = self
            .request(Method::POST, "/procesos/v2/ejecutar", Some(body))
            .await?;
        LaunchReceipt::from_payload(payload)
    }

    async fn reprocess_fund(&self, execution_id: &str, fund_id: &str) -> Result<Value> {
        let path = format!("/procesos/v2/ejecucion/{}/reprocesar", execution_id);
        self.request(Method::POST, &path, Some(json!({ "idFund": id_value(fund_id) })))
            .await
    }

    async fn reprocess_failed(&self, execution_id: &str) -> Result<Value> {
        let path = format!("/procesos/v2/ejecucion/{}/reprocesar-fallidos", execution_id);
        self.request(Method::POST, &path, Some(json!({}))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_receipt_requires_an_id() {
        let receipt = LaunchReceipt::from_payload(json!({"ID_Ejecucion": 88, "Estado": "INICIALIZANDO"}))
            .expect("receipt");
        assert_eq!(receipt.execution_id, "88");

        assert!(LaunchReceipt::from_payload(json!({"Estado": "INICIALIZANDO"})).is_err());
        assert!(LaunchReceipt::from_payload(Value::Null).is_err());
    }

    #[test]
    fn urls_join_base_and_path() {
        let backend = HttpBackend::new(BackendApiConfig::with_base_url("http://10.0.0.5:3001/api/"))
            .expect("client");
        assert_eq!(
            backend.url("/procesos/v2/ejecucion/4"),
            "http://10.0.0.5:3001/api/procesos/v2/ejecucion/4"
        );
    }
}
