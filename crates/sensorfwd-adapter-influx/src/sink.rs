//! HTTP sink for the InfluxDB 1.x API.

use crate::line_protocol::encode_record;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use sensorfwd_core::{Record, Sink, SinkError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// InfluxDB sink configuration.
#[derive(Debug, Clone)]
pub struct InfluxSinkConfig {
    /// Base URL of the server (e.g., <http://localhost:8086>)
    pub base_url: String,
    /// Target database, created if absent
    pub database: String,
    /// Username for basic authentication
    pub username: Option<String>,
    /// File holding the password; never the password itself
    pub password_file: Option<PathBuf>,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for InfluxSinkConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8086".to_string(),
            database: "sensors".to_string(),
            username: None,
            password_file: None,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Sink writing one point per record to InfluxDB.
pub struct InfluxSink {
    client: Client,
    config: InfluxSinkConfig,
    password: Option<String>,
    database_settled: AtomicBool,
}

impl InfluxSink {
    /// Create a new sink. The database is not touched until
    /// [`InfluxSink::ensure_database`] or the first write.
    ///
    /// # Errors
    ///
    /// Returns error if the password file cannot be read or the HTTP client
    /// cannot be created.
    pub fn new(config: InfluxSinkConfig) -> Result<Self, SinkError> {
        let password = match &config.password_file {
            Some(path) => {
                let password = std::fs::read_to_string(path).map_err(|e| {
                    SinkError::Init(format!(
                        "failed to read password file {}: {e}",
                        path.display()
                    ))
                })?;
                tracing::debug!(password_file = %path.display(), "Loaded InfluxDB password");
                Some(password.trim().to_string())
            }
            None => None,
        };

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SinkError::Init(e.to_string()))?;

        Ok(Self {
            client,
            config: InfluxSinkConfig {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                ..config
            },
            password,
            database_settled: AtomicBool::new(false),
        })
    }

    /// Create a new sink and make sure the target database exists.
    ///
    /// An unreachable server is not an error here: the failure is logged and
    /// the database is ensured again before the next write.
    ///
    /// # Errors
    ///
    /// Returns error if the sink cannot be created.
    pub async fn connect(config: InfluxSinkConfig) -> Result<Self, SinkError> {
        let sink = Self::new(config)?;
        sink.settle_database().await;
        Ok(sink)
    }

    /// Whether database creation needs no further attempts.
    ///
    /// True once the server accepted `CREATE DATABASE`, or rejected it
    /// outright (e.g. a write-only user); false while the server has not been
    /// reached.
    #[must_use]
    pub fn is_database_settled(&self) -> bool {
        self.database_settled.load(Ordering::Acquire)
    }

    /// Ensure the database, retrying later only if the server was unreachable.
    async fn settle_database(&self) {
        match self.ensure_database().await {
            Ok(()) => {}
            Err(err @ (SinkError::Unavailable(_) | SinkError::Timeout(_))) => {
                tracing::warn!(
                    url = %self.config.base_url,
                    database = %self.config.database,
                    error = %err,
                    "Could not reach InfluxDB, will ensure the database before the next write"
                );
            }
            Err(err) => {
                self.database_settled.store(true, Ordering::Release);
                tracing::warn!(
                    database = %self.config.database,
                    error = %err,
                    "InfluxDB rejected CREATE DATABASE, assuming the database exists"
                );
            }
        }
    }

    /// Target database name.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.config.database
    }

    /// Attach credentials if configured.
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.username {
            Some(username) => request.basic_auth(username, self.password.as_deref()),
            None => request,
        }
    }

    /// Create the target database if it does not exist.
    ///
    /// `CREATE DATABASE` is idempotent on the server, so calling this against a
    /// store that already has the database succeeds.
    ///
    /// # Errors
    ///
    /// Returns error if the server is unreachable or rejects the query.
    pub async fn ensure_database(&self) -> Result<(), SinkError> {
        let url = format!("{}/query", self.config.base_url);
        let query = format!("CREATE DATABASE \"{}\"", escape_identifier(&self.config.database));

        tracing::debug!(url, query, "Ensuring InfluxDB database");

        let request = self.authorize(self.client.post(&url).query(&[("q", query.as_str())]));
        let response = request
            .send()
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;
        check_status(response).await?;

        self.database_settled.store(true, Ordering::Release);
        tracing::info!(database = %self.config.database, "InfluxDB database ready");
        Ok(())
    }

    async fn write_line(&self, line: String) -> Result<(), SinkError> {
        let url = format!("{}/write", self.config.base_url);

        tracing::debug!(url, line, "Writing InfluxDB point");

        let request = self.authorize(
            self.client
                .post(&url)
                .query(&[("db", self.config.database.as_str()), ("precision", "ns")])
                .body(line),
        );

        let response = request
            .send()
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;
        check_status(response).await
    }
}

#[async_trait]
impl Sink for InfluxSink {
    fn name(&self) -> &str {
        "influxdb"
    }

    async fn store_record(&self, record: &Record) -> Result<(), SinkError> {
        if let Err(err) = record.validate() {
            tracing::warn!(
                measurement = %record.measurement,
                error = %err,
                "Skipping invalid record"
            );
            return Err(err);
        }

        if !self.is_database_settled() {
            self.settle_database().await;
        }

        let result = self.write_line(encode_record(record)).await;
        if let Err(err) = &result {
            tracing::warn!(
                database = %self.config.database,
                measurement = %record.measurement,
                error = %err,
                "InfluxDB write failed, point dropped"
            );
        }
        result
    }
}

async fn check_status(response: Response) -> Result<(), SinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    Err(SinkError::Write {
        status: status.as_u16(),
        message: response.text().await.unwrap_or_default(),
    })
}

/// Escape a double-quoted InfluxQL identifier.
fn escape_identifier(name: &str) -> String {
    name.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorfwd_core::{build_record, FieldValue, TopicRule};
    use std::io::Write;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record() -> Record {
        let rule = TopicRule::new("sensors/outside/humidity").with_tag("loc", "outside");
        build_record(&rule.topic, &rule, FieldValue::Float(54.3))
    }

    fn config(server: &MockServer) -> InfluxSinkConfig {
        InfluxSinkConfig {
            base_url: format!("{}/", server.uri()),
            database: "weathersys".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn config_default() {
        let config = InfluxSinkConfig::default();
        assert_eq!(config.base_url, "http://localhost:8086");
        assert_eq!(config.database, "sensors");
        assert!(config.username.is_none());
        assert!(config.password_file.is_none());
    }

    #[test]
    fn missing_password_file_fails() {
        let config = InfluxSinkConfig {
            password_file: Some(PathBuf::from("/nonexistent/pwd.txt")),
            ..Default::default()
        };
        let err = InfluxSink::new(config).err().unwrap();
        assert!(err.to_string().contains("sink init error"));
    }

    #[tokio::test]
    async fn ensure_database_is_idempotent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(query_param("q", "CREATE DATABASE \"weathersys\""))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"results":[{}]}"#))
            .expect(2)
            .mount(&server)
            .await;

        let first = InfluxSink::connect(config(&server)).await.unwrap();
        assert!(first.is_database_settled());

        let second = InfluxSink::connect(config(&server)).await.unwrap();
        assert!(second.is_database_settled());
    }

    #[tokio::test]
    async fn store_record_writes_line_protocol() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/write"))
            .and(query_param("db", "weathersys"))
            .and(query_param("precision", "ns"))
            .and(body_string("sensors/outside/humidity,loc=outside value=54.3"))
            .respond_with(ResponseTemplate::new(204))
            .expect(2)
            .mount(&server)
            .await;

        let sink = InfluxSink::new(config(&server)).unwrap();
        sink.store_record(&record()).await.unwrap();
        sink.store_record(&record()).await.unwrap();
    }

    #[tokio::test]
    async fn credentials_come_from_password_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "secret").unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(header("authorization", "Basic dXNlcjpzZWNyZXQ="))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = InfluxSink::new(InfluxSinkConfig {
            username: Some("user".to_string()),
            password_file: Some(file.path().to_path_buf()),
            ..config(&server)
        })
        .unwrap();
        sink.ensure_database().await.unwrap();
    }

    #[tokio::test]
    async fn rejected_write_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/write"))
            .respond_with(ResponseTemplate::new(400).set_body_string("unable to parse"))
            .mount(&server)
            .await;

        let sink = InfluxSink::new(config(&server)).unwrap();
        let err = sink.store_record(&record()).await.unwrap_err();
        assert!(matches!(err, SinkError::Write { status: 400, .. }));
    }

    #[tokio::test]
    async fn unreachable_store_is_reported() {
        let sink = InfluxSink::new(InfluxSinkConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..Default::default()
        })
        .unwrap();

        let err = sink.store_record(&record()).await.unwrap_err();
        assert!(matches!(err, SinkError::Unavailable(_)));
    }

    #[tokio::test]
    async fn rejected_create_database_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/write"))
            .respond_with(ResponseTemplate::new(204))
            .expect(3)
            .mount(&server)
            .await;

        let sink = InfluxSink::connect(config(&server)).await.unwrap();
        assert!(sink.is_database_settled());

        for _ in 0..3 {
            sink.store_record(&record()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn connect_tolerates_unreachable_store() {
        let sink = InfluxSink::connect(InfluxSinkConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

        assert!(!sink.is_database_settled());
        assert_eq!(sink.database(), "sensors");
    }

    #[tokio::test]
    async fn invalid_record_is_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let sink = InfluxSink::new(config(&server)).unwrap();
        let mut record = record();
        record.fields.clear();

        let err = sink.store_record(&record).await.unwrap_err();
        assert!(matches!(err, SinkError::InvalidRecord(_)));
    }

    #[test]
    fn identifier_escaping() {
        assert_eq!(escape_identifier(r#"we"ird"#), r#"we\"ird"#);
    }
}
