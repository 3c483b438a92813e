//! Remote release service: the [`ReleaseApi`] seam and its GitHub REST
//! implementation.

use super::auth;
use super::models::{
    ArtifactList, ArtifactPayload, Asset, CreateReleaseRequest, GitRef, Release, RepoRef,
    WorkflowArtifact, WorkflowRun,
};
use crate::config::{GitHubCredentials, PipelineConfig};
use crate::error::{GitHubError, Result};
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use std::future::Future;

const API_VERSION: &str = "2022-11-28";
const ASSETS_PER_PAGE: u32 = 100;

/// Operations the pipeline needs from the remote release service.
///
/// Lookups return `Ok(None)` on 404; absence is a normal outcome.
pub trait ReleaseApi: Send + Sync + 'static {
    /// Release whose tag is `tag`
    fn get_release_by_tag(
        &self,
        repo: &RepoRef,
        tag: &str,
    ) -> impl Future<Output = Result<Option<Release>>> + Send;

    /// Head ref of `branch`
    fn get_branch_ref(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> impl Future<Output = Result<Option<GitRef>>> + Send;

    /// Create a release
    fn create_release(
        &self,
        repo: &RepoRef,
        request: &CreateReleaseRequest,
    ) -> impl Future<Output = Result<Release>> + Send;

    /// Assets attached to a release
    fn list_release_assets(
        &self,
        repo: &RepoRef,
        release_id: u64,
    ) -> impl Future<Output = Result<Vec<Asset>>> + Send;

    /// Delete one asset
    fn delete_release_asset(
        &self,
        repo: &RepoRef,
        asset_id: u64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Upload `content` as asset `name`
    fn upload_release_asset(
        &self,
        release: &Release,
        name: &str,
        content: Bytes,
    ) -> impl Future<Output = Result<Asset>> + Send;

    /// Download a release asset's bytes
    fn download_release_asset(
        &self,
        repo: &RepoRef,
        asset_id: u64,
    ) -> impl Future<Output = Result<Bytes>> + Send;

    /// Workflow run by id
    fn get_workflow_run(
        &self,
        repo: &RepoRef,
        run_id: u64,
    ) -> impl Future<Output = Result<Option<WorkflowRun>>> + Send;

    /// Artifacts produced by a workflow run
    fn list_workflow_run_artifacts(
        &self,
        repo: &RepoRef,
        run_id: u64,
    ) -> impl Future<Output = Result<Vec<WorkflowArtifact>>> + Send;

    /// Download an artifact's zip archive
    fn download_artifact(
        &self,
        repo: &RepoRef,
        artifact_id: u64,
    ) -> impl Future<Output = Result<ArtifactPayload>> + Send;
}

/// GitHub REST client authenticated with an installation token
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
}

impl GitHubClient {
    /// Build a client that sends `token` on every request
    pub fn with_token(api_url: &str, token: &str) -> Result<Self> {
        let mut headers = default_headers();
        let auth = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
            GitHubError::Authentication {
                reason: format!("token is not a valid header value: {e}"),
            }
        })?;
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Exchange app credentials for an installation token and build a client.
    ///
    /// Returns the token too, for authenticating git pushes.
    pub async fn connect(
        config: &PipelineConfig,
        credentials: &GitHubCredentials,
    ) -> Result<(Self, String)> {
        let bootstrap = reqwest::Client::builder()
            .default_headers(default_headers())
            .build()?;
        let token = auth::installation_token(&bootstrap, &config.api_url, credentials).await?;
        let client = Self::with_token(&config.api_url, &token.token)?;
        Ok((client, token.token))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    async fn get_optional<T: DeserializeOwned>(&self, operation: &str, path: &str) -> Result<Option<T>> {
        let url = self.url(path);
        log::debug!("GET {url}");
        let response = self.http.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check(operation, response).await?;
        Ok(Some(response.json::<T>().await?))
    }
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
    headers.insert(USER_AGENT, HeaderValue::from_static("sdk-release"));
    headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));
    headers
}

/// Turn a non-2xx response into [`GitHubError::Api`]
async fn check(operation: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    log::warn!("{operation} failed with {status}: {message}");
    Err(GitHubError::Api {
        operation: operation.to_string(),
        status: status.as_u16(),
        message,
    }
    .into())
}

impl ReleaseApi for GitHubClient {
    async fn get_release_by_tag(&self, repo: &RepoRef, tag: &str) -> Result<Option<Release>> {
        let path = format!("/repos/{}/{}/releases/tags/{}", repo.owner, repo.name, tag);
        let release: Option<Release> = self.get_optional("get_release_by_tag", &path).await?;
        Ok(release.map(|mut r| {
            r.repo = repo.clone();
            r
        }))
    }

    async fn get_branch_ref(&self, repo: &RepoRef, branch: &str) -> Result<Option<GitRef>> {
        let path = format!("/repos/{}/{}/git/ref/heads/{}", repo.owner, repo.name, branch);
        self.get_optional("get_ref", &path).await
    }

    async fn create_release(&self, repo: &RepoRef, request: &CreateReleaseRequest) -> Result<Release> {
        let url = self.url(&format!("/repos/{}/{}/releases", repo.owner, repo.name));
        log::debug!("POST {url} tag={}", request.tag_name);

        let response = self.http.post(&url).json(request).send().await?;
        let mut release: Release = check("create_release", response).await?.json().await?;
        release.repo = repo.clone();
        Ok(release)
    }

    async fn list_release_assets(&self, repo: &RepoRef, release_id: u64) -> Result<Vec<Asset>> {
        let url = self.url(&format!(
            "/repos/{}/{}/releases/{}/assets",
            repo.owner, repo.name, release_id
        ));
        let response = self
            .http
            .get(&url)
            .query(&[("per_page", ASSETS_PER_PAGE)])
            .send()
            .await?;
        Ok(check("list_release_assets", response).await?.json().await?)
    }

    async fn delete_release_asset(&self, repo: &RepoRef, asset_id: u64) -> Result<()> {
        let url = self.url(&format!(
            "/repos/{}/{}/releases/assets/{}",
            repo.owner, repo.name, asset_id
        ));
        log::debug!("DELETE {url}");
        let response = self.http.delete(&url).send().await?;
        check("delete_release_asset", response).await?;
        Ok(())
    }

    async fn upload_release_asset(&self, release: &Release, name: &str, content: Bytes) -> Result<Asset> {
        let endpoint = release.upload_endpoint().ok_or_else(|| GitHubError::Api {
            operation: "upload_release_asset".to_string(),
            status: 0,
            message: format!("release {} has no upload URL", release.tag_name),
        })?;

        log::debug!("POST {endpoint} name={name} ({} bytes)", content.len());
        let response = self
            .http
            .post(endpoint)
            .query(&[("name", name)])
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, content.len())
            .body(content)
            .send()
            .await?;

        Ok(check("upload_release_asset", response).await?.json().await?)
    }

    async fn download_release_asset(&self, repo: &RepoRef, asset_id: u64) -> Result<Bytes> {
        let url = self.url(&format!(
            "/repos/{}/{}/releases/assets/{}",
            repo.owner, repo.name, asset_id
        ));
        let response = self
            .http
            .get(&url)
            .header(ACCEPT, "application/octet-stream")
            .send()
            .await?;
        Ok(check("download_release_asset", response).await?.bytes().await?)
    }

    async fn get_workflow_run(&self, repo: &RepoRef, run_id: u64) -> Result<Option<WorkflowRun>> {
        let path = format!("/repos/{}/{}/actions/runs/{}", repo.owner, repo.name, run_id);
        self.get_optional("get_workflow_run", &path).await
    }

    async fn list_workflow_run_artifacts(&self, repo: &RepoRef, run_id: u64) -> Result<Vec<WorkflowArtifact>> {
        let url = self.url(&format!(
            "/repos/{}/{}/actions/runs/{}/artifacts",
            repo.owner, repo.name, run_id
        ));
        let response = self
            .http
            .get(&url)
            .query(&[("per_page", ASSETS_PER_PAGE)])
            .send()
            .await?;
        let list: ArtifactList = check("list_workflow_run_artifacts", response).await?.json().await?;
        Ok(list.artifacts)
    }

    async fn download_artifact(&self, repo: &RepoRef, artifact_id: u64) -> Result<ArtifactPayload> {
        let url = self.url(&format!(
            "/repos/{}/{}/actions/artifacts/{}/zip",
            repo.owner, repo.name, artifact_id
        ));
        log::debug!("GET {url}");
        let response = check("download_artifact", self.http.get(&url).send().await?).await?;
        // The endpoint redirects to short-lived blob storage
        let final_url = response.url().to_string();
        let data = response.bytes().await?;
        Ok(ArtifactPayload {
            data,
            url: final_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repo() -> RepoRef {
        RepoRef::new("statsig-io", "statsig-php-core")
    }

    #[tokio::test]
    async fn test_missing_release_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/statsig-io/statsig-php-core/releases/tags/1.0.0"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = GitHubClient::with_token(&server.uri(), "t").unwrap();
        assert!(client.get_release_by_tag(&repo(), "1.0.0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_branch_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/statsig-io/statsig-php-core/git/ref/heads/releases/1.0.0"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = GitHubClient::with_token(&server.uri(), "t").unwrap();
        assert!(
            client
                .get_branch_ref(&repo(), "releases/1.0.0")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_server_error_is_not_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = GitHubClient::with_token(&server.uri(), "t").unwrap();
        assert!(client.get_release_by_tag(&repo(), "1.0.0").await.is_err());
    }

    #[tokio::test]
    async fn test_found_release_carries_repo() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/statsig-io/statsig-php-core/releases/tags/1.0.0"))
            .and(header("authorization", "Bearer t"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 42,
                "tag_name": "1.0.0",
                "prerelease": false,
                "upload_url": "https://uploads.example/assets{?name,label}",
                "html_url": "https://github.com/statsig-io/statsig-php-core/releases/1.0.0"
            })))
            .mount(&server)
            .await;

        let client = GitHubClient::with_token(&server.uri(), "t").unwrap();
        let release = client
            .get_release_by_tag(&repo(), "1.0.0")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(release.id, 42);
        assert_eq!(release.repo, repo());
    }

    #[tokio::test]
    async fn test_upload_sends_name_and_length() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/uploads/releases/42/assets"))
            .and(query_param("name", "statsig-core-x86_64-static.zip"))
            .and(header("content-length", "5"))
            .and(header("content-type", "application/octet-stream"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": 9,
                "name": "statsig-core-x86_64-static.zip",
                "size": 5,
                "browser_download_url": "https://example/dl"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GitHubClient::with_token(&server.uri(), "t").unwrap();
        let release = Release {
            id: 42,
            tag_name: "1.0.0".to_string(),
            target_commitish: None,
            prerelease: false,
            upload_url: format!("{}/uploads/releases/42/assets{{?name,label}}", server.uri()),
            html_url: String::new(),
            repo: repo(),
        };

        let asset = client
            .upload_release_asset(&release, "statsig-core-x86_64-static.zip", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        assert_eq!(asset.id, 9);
    }

    #[tokio::test]
    async fn test_create_release_posts_prerelease_flag() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/statsig-io/statsig-php-core/releases"))
            .and(wiremock::matchers::body_json(serde_json::json!({
                "tag_name": "1.0.0-beta.1",
                "target_commitish": "abc123",
                "prerelease": true
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": 5,
                "tag_name": "1.0.0-beta.1",
                "prerelease": true,
                "upload_url": "https://uploads.example/assets{?name,label}"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GitHubClient::with_token(&server.uri(), "t").unwrap();
        let release = client
            .create_release(
                &repo(),
                &CreateReleaseRequest {
                    tag_name: "1.0.0-beta.1".to_string(),
                    target_commitish: Some("abc123".to_string()),
                    name: None,
                    prerelease: true,
                },
            )
            .await
            .unwrap();
        assert!(release.prerelease);
    }
}
