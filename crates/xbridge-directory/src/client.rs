//! The remote directory contract and its Xbox Live implementation.

use std::future::Future;

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use xbridge_protocol::{
    Achievement, AchievementList, HandleRequest, PeopleList, SessionDocument,
    SessionReference, SessionSnapshot, Xuid,
};

use crate::DirectoryError;

const CONTRACT_HEADER: &str = "x-xbl-contract-version";
/// Session directory contract version.
const MPSD_CONTRACT: &str = "107";
/// People-hub and achievements contract version.
const HUB_CONTRACT: &str = "5";

/// REST calls the bridge makes against Xbox Live.
///
/// Every call takes the `Authorization` header of the account it acts as,
/// so one client serves all managed accounts.
pub trait DirectoryClient: Send + Sync + 'static {
    /// Creates, joins or updates a session. Returns the session as the
    /// directory now sees it.
    fn put_session(
        &self,
        auth: &str,
        reference: &SessionReference,
        document: &SessionDocument,
    ) -> impl Future<Output = Result<SessionSnapshot, DirectoryError>> + Send;

    /// Points the account's activity handle at `reference`.
    fn set_activity_handle(
        &self,
        auth: &str,
        reference: &SessionReference,
    ) -> impl Future<Output = Result<(), DirectoryError>> + Send;

    /// Reads the session, which keeps the caller's membership alive.
    fn session_keep_alive(
        &self,
        auth: &str,
        reference: &SessionReference,
    ) -> impl Future<Output = Result<SessionSnapshot, DirectoryError>> + Send;

    /// Evicts the member in slot `index`.
    fn remove_member(
        &self,
        auth: &str,
        reference: &SessionReference,
        index: u32,
    ) -> impl Future<Output = Result<(), DirectoryError>> + Send;

    /// The caller's friend list.
    fn get_friends(
        &self,
        auth: &str,
    ) -> impl Future<Output = Result<PeopleList, DirectoryError>> + Send;

    /// Follows `xuid`. Following someone already followed is a no-op.
    fn add_friend(
        &self,
        auth: &str,
        xuid: &Xuid,
    ) -> impl Future<Output = Result<(), DirectoryError>> + Send;

    /// Unfollows `xuid`.
    fn remove_friend(
        &self,
        auth: &str,
        xuid: &Xuid,
    ) -> impl Future<Output = Result<(), DirectoryError>> + Send;

    /// People following the caller.
    fn get_followers(
        &self,
        auth: &str,
    ) -> impl Future<Output = Result<PeopleList, DirectoryError>> + Send;

    /// Achievements `xuid` has unlocked.
    fn get_achievements(
        &self,
        auth: &str,
        xuid: &Xuid,
    ) -> impl Future<Output = Result<Vec<Achievement>, DirectoryError>> + Send;
}

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

/// Base URLs of the services the client talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub session_directory: String,
    pub social: String,
    pub people_hub: String,
    pub achievements: String,
}

impl Endpoints {
    /// Every service served from one base URL. Handy for a mock server.
    pub fn single(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            session_directory: base.clone(),
            social: base.clone(),
            people_hub: base.clone(),
            achievements: base,
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            session_directory: "https://sessiondirectory.xboxlive.com".into(),
            social: "https://social.xboxlive.com".into(),
            people_hub: "https://peoplehub.xboxlive.com".into(),
            achievements: "https://achievements.xboxlive.com".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// XboxDirectoryClient
// ---------------------------------------------------------------------------

/// [`DirectoryClient`] backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct XboxDirectoryClient {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl XboxDirectoryClient {
    /// A client against the production services.
    pub fn new() -> Self {
        Self::default()
    }

    /// A client against custom base URLs.
    pub fn with_endpoints(endpoints: Endpoints) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoints,
        }
    }

    fn session_url(&self, reference: &SessionReference) -> String {
        format!("{}{}", self.endpoints.session_directory, reference.path())
    }

    fn mpsd(&self, method: Method, url: String, auth: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, auth)
            .header(CONTRACT_HEADER, MPSD_CONTRACT)
    }

    fn social(&self, method: Method, path: &str, auth: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.endpoints.social, path))
            .header(reqwest::header::AUTHORIZATION, auth)
    }
}

/// Sends `request` and turns transport failures and non-2xx statuses into
/// [`DirectoryError`]s.
async fn send(
    endpoint: &'static str,
    request: RequestBuilder,
) -> Result<Response, DirectoryError> {
    let response = request
        .send()
        .await
        .map_err(|source| DirectoryError::Http { endpoint, source })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(endpoint, status = status.as_u16(), %body, "directory call rejected");
        return Err(DirectoryError::Status {
            endpoint,
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Decodes a JSON body. An empty body decodes as `T::default()`.
async fn decode<T>(
    endpoint: &'static str,
    response: Response,
) -> Result<T, DirectoryError>
where
    T: DeserializeOwned + Default,
{
    let bytes = response
        .bytes()
        .await
        .map_err(|source| DirectoryError::Http { endpoint, source })?;
    if bytes.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(&bytes)
        .map_err(|source| DirectoryError::Decode { endpoint, source })
}

impl DirectoryClient for XboxDirectoryClient {
    async fn put_session(
        &self,
        auth: &str,
        reference: &SessionReference,
        document: &SessionDocument,
    ) -> Result<SessionSnapshot, DirectoryError> {
        let request = self
            .mpsd(Method::PUT, self.session_url(reference), auth)
            .json(document);
        let response = send("session", request).await?;
        decode("session", response).await
    }

    async fn set_activity_handle(
        &self,
        auth: &str,
        reference: &SessionReference,
    ) -> Result<(), DirectoryError> {
        let url = format!("{}/handles", self.endpoints.session_directory);
        let request = self
            .mpsd(Method::POST, url, auth)
            .json(&HandleRequest::activity(reference.clone()));
        send("handle", request).await?;
        Ok(())
    }

    async fn session_keep_alive(
        &self,
        auth: &str,
        reference: &SessionReference,
    ) -> Result<SessionSnapshot, DirectoryError> {
        let request = self.mpsd(Method::GET, self.session_url(reference), auth);
        let response = send("keep-alive", request).await?;
        decode("keep-alive", response).await
    }

    async fn remove_member(
        &self,
        auth: &str,
        reference: &SessionReference,
        index: u32,
    ) -> Result<(), DirectoryError> {
        let url = format!("{}/members/{index}", self.session_url(reference));
        send("remove-member", self.mpsd(Method::DELETE, url, auth)).await?;
        Ok(())
    }

    async fn get_friends(&self, auth: &str) -> Result<PeopleList, DirectoryError> {
        let response =
            send("friends", self.social(Method::GET, "/users/me/people", auth))
                .await?;
        decode("friends", response).await
    }

    async fn add_friend(&self, auth: &str, xuid: &Xuid) -> Result<(), DirectoryError> {
        let path = format!("/users/me/people/{}", xuid.url_segment());
        send("add-friend", self.social(Method::PUT, &path, auth)).await?;
        Ok(())
    }

    async fn remove_friend(
        &self,
        auth: &str,
        xuid: &Xuid,
    ) -> Result<(), DirectoryError> {
        let path = format!("/users/me/people/{}", xuid.url_segment());
        send("remove-friend", self.social(Method::DELETE, &path, auth)).await?;
        Ok(())
    }

    async fn get_followers(&self, auth: &str) -> Result<PeopleList, DirectoryError> {
        let url = format!(
            "{}/users/me/people/followers",
            self.endpoints.people_hub
        );
        let request = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, auth)
            .header(CONTRACT_HEADER, HUB_CONTRACT)
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-us");
        let response = send("followers", request).await?;
        decode("followers", response).await
    }

    async fn get_achievements(
        &self,
        auth: &str,
        xuid: &Xuid,
    ) -> Result<Vec<Achievement>, DirectoryError> {
        let url = format!(
            "{}/users/{}/achievements",
            self.endpoints.achievements,
            xuid.url_segment()
        );
        let request = self
            .http
            .get(url)
            .query(&[("unlockedOnly", "true")])
            .header(reqwest::header::AUTHORIZATION, auth)
            .header(CONTRACT_HEADER, HUB_CONTRACT);
        let response = send("achievements", request).await?;
        let list: AchievementList = decode("achievements", response).await?;
        Ok(list.achievements)
    }
}
