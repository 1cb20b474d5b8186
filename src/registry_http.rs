use crate::registry::{PackageMetadata, PublishRequest, PublishResponse};
use crate::{Error, Result};
use std::path::Path;
use tracing::{debug, info};

pub struct HttpRegistryClient {
    base_url: String,
    client: reqwest::blocking::Client,
    api_token: Option<String>,
}

impl HttpRegistryClient {
    pub fn new(base_url: String, api_token: Option<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("gpm/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            api_token: api_token.filter(|t| !t.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn metadata_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(name))
    }

    fn connect_error(&self, e: reqwest::Error) -> Error {
        if e.is_connect() {
            Error::Registry(format!(
                "Cannot connect to registry at {}\n\
                 Please check that the registry is running and the URL is correct.",
                self.base_url
            ))
        } else if e.is_timeout() {
            Error::Registry("Registry request timed out. Please try again.".to_string())
        } else {
            Error::Http(e)
        }
    }

    /// Get package metadata from HTTP registry
    pub fn get_metadata(&self, name: &str) -> Result<PackageMetadata> {
        let url = self.metadata_url(name);
        debug!(%url, "fetching package metadata");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .map_err(|e| self.connect_error(e))?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::PackageNotFound(format!(
                "Package '{}' not found in registry {}",
                name, self.base_url
            )));
        }

        if !status.is_success() {
            return Err(Error::Registry(status_message(status.as_u16())));
        }

        response
            .json::<PackageMetadata>()
            .map_err(|e| Error::Registry(format!("Failed to parse metadata for '{}': {}", name, e)))
    }

    /// Publish a tarball with its metadata as a multipart upload
    pub fn publish(&self, request: &PublishRequest, tarball: &Path) -> Result<PublishResponse> {
        let token = self.api_token.as_deref().ok_or_else(|| {
            Error::Registry(
                "Publishing requires an API token.\n\
                 Set auth.token in ~/.gpm/config.toml or the GPM_TOKEN environment variable."
                    .to_string(),
            )
        })?;

        let url = format!("{}/api/v1/packages", self.base_url);
        let tarball_bytes = std::fs::read(tarball)?;
        let file_name = format!("{}-{}.tgz", request.name, request.version);

        let form = reqwest::blocking::multipart::Form::new()
            .text("metadata", serde_json::to_string(request)?)
            .part(
                "tarball",
                reqwest::blocking::multipart::Part::bytes(tarball_bytes)
                    .file_name(file_name)
                    .mime_str("application/gzip")?,
            );

        debug!(%url, name = %request.name, version = %request.version, "publishing");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .map_err(|e| self.connect_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let detail = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
                .unwrap_or(body);
            let message = match status.as_u16() {
                401 | 403 => format!("Not authorized to publish {}: {}", request.name, detail),
                409 => format!(
                    "{}@{} already exists in the registry",
                    request.name, request.version
                ),
                code => format!("{}: {}", status_message(code), detail),
            };
            return Err(Error::Registry(message));
        }

        let published: PublishResponse = response
            .json()
            .map_err(|e| Error::Registry(format!("Failed to parse publish response: {}", e)))?;

        info!(name = %request.name, version = %request.version, "published");
        Ok(published)
    }
}

fn status_message(code: u16) -> String {
    match code {
        500 | 502 | 503 | 504 => format!(
            "HTTP {} server error.\n\
             The registry is experiencing issues. Please try again later.",
            code
        ),
        _ => format!("HTTP {}", code),
    }
}
