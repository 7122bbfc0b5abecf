//! [`FileStore`] backed by the GitHub repository contents API.
//!
//! Objects are files in a repository; the blob SHA GitHub returns is the
//! version token. Writes and deletes each produce one commit.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION},
    Client, RequestBuilder, Response, StatusCode,
};
use serde::{Deserialize, Serialize};

use super::{FileStore, StoreError, VersionToken, VersionedObject};
use crate::config::GitHubConfig;

const API_VERSION: &str = "2022-11-28";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";

pub struct GitHubStore {
    client: Client,
    api_url: String,
    owner: String,
    repo: String,
    branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentsFile {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    message: &'a str,
    sha: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: CommittedFile,
}

#[derive(Debug, Deserialize)]
struct CommittedFile {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl GitHubStore {
    pub fn new(config: &GitHubConfig) -> Result<Self, StoreError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| StoreError::Misconfigured("GitHub token is not a valid header value".into()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));

        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            branch: config.branch.clone(),
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_url, self.owner, self.repo, path
        )
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let req = self.client.get(self.contents_url(path));
        match &self.branch {
            Some(branch) => req.query(&[("ref", branch)]),
            None => req,
        }
    }

    async fn fetch(&self, path: &str) -> Result<ContentsFile, StoreError> {
        let resp = check(self.get(path).send().await?).await?;
        // Directories come back as a JSON array, symlinks and submodules with
        // their own `type`.
        let value: serde_json::Value = resp.json().await?;
        if value.get("type").and_then(|t| t.as_str()) != Some("file") {
            return Err(StoreError::NotAFile);
        }
        serde_json::from_value(value).map_err(|e| StoreError::InvalidContent(e.to_string()))
    }

    /// Files over 1 MB come back without inline content; ask for the raw body.
    async fn fetch_raw(&self, path: &str) -> Result<String, StoreError> {
        let resp = self
            .get(path)
            .header(ACCEPT, RAW_MEDIA_TYPE)
            .send()
            .await?;
        Ok(check(resp).await?.text().await?)
    }

    async fn put(
        &self,
        path: &str,
        content: &str,
        message: &str,
        sha: Option<&str>,
    ) -> Result<VersionToken, StoreError> {
        let body = PutRequest {
            message,
            content: STANDARD.encode(content),
            sha,
            branch: self.branch.as_deref(),
        };
        let resp = self
            .client
            .put(self.contents_url(path))
            .json(&body)
            .send()
            .await?;
        let committed: PutResponse = check(resp).await?.json().await?;
        Ok(VersionToken::new(committed.content.sha))
    }
}

async fn check(resp: Response) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let message = resp
        .json::<ErrorBody>()
        .await
        .map(|body| body.message)
        .unwrap_or_else(|_| status.to_string());

    Err(match status {
        StatusCode::NOT_FOUND => StoreError::NotFound,
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => StoreError::Conflict(message),
        _ => StoreError::Rejected {
            status: status.as_u16(),
            message,
        },
    })
}

fn decode_content(encoded: &str) -> Result<String, StoreError> {
    // GitHub wraps base64 payloads at 60 columns.
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| StoreError::InvalidContent(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| StoreError::InvalidContent(e.to_string()))
}

#[async_trait]
impl FileStore for GitHubStore {
    async fn create(
        &self,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<VersionToken, StoreError> {
        self.put(path, content, message, None).await
    }

    async fn read(&self, path: &str) -> Result<VersionedObject, StoreError> {
        let file = self.fetch(path).await?;
        let content = match (file.encoding.as_deref(), file.content.as_deref()) {
            (Some("base64"), Some(encoded)) => decode_content(encoded)?,
            (Some("none"), _) => self.fetch_raw(path).await?,
            (_, Some(plain)) => plain.to_string(),
            (_, None) => String::new(),
        };
        Ok(VersionedObject {
            content,
            version: VersionToken::new(file.sha),
        })
    }

    async fn update(
        &self,
        path: &str,
        content: &str,
        message: &str,
        expected: &VersionToken,
    ) -> Result<VersionToken, StoreError> {
        self.put(path, content, message, Some(expected.as_str())).await
    }

    async fn delete(
        &self,
        path: &str,
        message: &str,
        expected: &VersionToken,
    ) -> Result<(), StoreError> {
        let body = DeleteRequest {
            message,
            sha: expected.as_str(),
            branch: self.branch.as_deref(),
        };
        let resp = self
            .client
            .delete(self.contents_url(path))
            .json(&body)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn read_version(&self, path: &str) -> Result<Option<VersionToken>, StoreError> {
        match self.fetch(path).await {
            Ok(file) => Ok(Some(VersionToken::new(file.sha))),
            Err(StoreError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }
}
