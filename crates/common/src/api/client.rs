use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::error::ApiError;
use super::rtt::parse_go_duration;
use super::{ClientFactory, NodeApi, NodeEndpoints, PinState, UploadOptions, USER_AGENT};
use crate::content::SwarmAddress;

const SWARM_PIN_HEADER: &str = "swarm-pin";

#[derive(Debug, Deserialize)]
struct ReferenceResponse {
    reference: SwarmAddress,
}

#[derive(Debug, Deserialize)]
struct AddressesResponse {
    overlay: SwarmAddress,
}

#[derive(Debug, Deserialize)]
struct PeersResponse {
    peers: Vec<PeerEntry>,
}

#[derive(Debug, Deserialize)]
struct PeerEntry {
    address: SwarmAddress,
}

#[derive(Debug, Deserialize)]
struct PingResponse {
    rtt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PinResponse {
    pin_counter: u64,
}

#[derive(Debug, Deserialize)]
struct BadRequestResponse {
    #[serde(default)]
    errors: Vec<String>,
}

/// HTTP client for a single node's API and debug API
#[derive(Debug, Clone)]
pub struct HttpNodeClient {
    name: String,
    api: Url,
    api_client: Client,
    debug_api: Url,
    debug_client: Client,
}

impl HttpNodeClient {
    pub fn new(endpoints: &NodeEndpoints) -> Result<Self, ApiError> {
        Ok(Self {
            name: endpoints.name.clone(),
            api: endpoints.api.clone(),
            api_client: build_client(endpoints.api_insecure_tls)?,
            debug_api: endpoints.debug_api.clone(),
            debug_client: build_client(endpoints.debug_api_insecure_tls)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the base URL for API requests
    pub fn base_url(&self) -> &Url {
        &self.api
    }

    /// Get the base URL for debug API requests
    pub fn debug_url(&self) -> &Url {
        &self.debug_api
    }

    fn api_get(&self, path: &str) -> Result<RequestBuilder, ApiError> {
        Ok(self.api_client.get(self.api.join(path)?))
    }

    fn api_post(&self, path: &str) -> Result<RequestBuilder, ApiError> {
        Ok(self.api_client.post(self.api.join(path)?))
    }

    fn debug_get(&self, path: &str) -> Result<RequestBuilder, ApiError> {
        Ok(self.debug_client.get(self.debug_api.join(path)?))
    }

    fn debug_post(&self, path: &str) -> Result<RequestBuilder, ApiError> {
        Ok(self.debug_client.post(self.debug_api.join(path)?))
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn bytes(&self, request: RequestBuilder) -> Result<Bytes, ApiError> {
        let response = send(request).await?;
        Ok(response.bytes().await?)
    }
}

fn build_client(insecure_tls: bool) -> Result<Client, ApiError> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert("Accept", HeaderValue::from_static("application/json"));
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(default_headers)
        .danger_accept_invalid_certs(insecure_tls)
        .build()?;
    Ok(client)
}

/// Send a request and map any non-success status onto [`ApiError`]
async fn send(request: RequestBuilder) -> Result<Response, ApiError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::BAD_REQUEST {
        return Err(decode_bad_request(response).await);
    }

    let text = status
        .canonical_reason()
        .map(|reason| format!("{} {}", status.as_u16(), reason))
        .unwrap_or_else(|| status.to_string());
    Err(ApiError::from_status(status, text))
}

/// A 400 response may carry a list of validation errors
async fn decode_bad_request(response: Response) -> ApiError {
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false);
    if !is_json {
        return ApiError::BadRequest(vec!["bad request".to_string()]);
    }

    match response.json::<BadRequestResponse>().await {
        Ok(body) if !body.errors.is_empty() => ApiError::BadRequest(body.errors),
        _ => ApiError::BadRequest(vec!["bad request".to_string()]),
    }
}

#[async_trait]
impl NodeApi for HttpNodeClient {
    async fn health(&self) -> Result<(), ApiError> {
        send(self.debug_get("health")?).await?;
        Ok(())
    }

    async fn overlay(&self) -> Result<SwarmAddress, ApiError> {
        let addresses: AddressesResponse = self.json(self.debug_get("addresses")?).await?;
        Ok(addresses.overlay)
    }

    async fn peers(&self) -> Result<Vec<SwarmAddress>, ApiError> {
        let peers: PeersResponse = self.json(self.debug_get("peers")?).await?;
        Ok(peers.peers.into_iter().map(|p| p.address).collect())
    }

    async fn upload_chunk(
        &self,
        data: &Bytes,
        opts: UploadOptions,
    ) -> Result<SwarmAddress, ApiError> {
        let request = self
            .api_post("chunks")?
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(SWARM_PIN_HEADER, opts.pin.to_string())
            .body(data.clone());
        let response: ReferenceResponse = self.json(request).await?;
        Ok(response.reference)
    }

    async fn download_chunk(&self, address: &SwarmAddress) -> Result<Bytes, ApiError> {
        self.bytes(self.api_get(&format!("chunks/{}", address))?)
            .await
    }

    async fn upload_file(
        &self,
        name: &str,
        data: &Bytes,
        opts: UploadOptions,
    ) -> Result<SwarmAddress, ApiError> {
        let request = self
            .api_post("files")?
            .query(&[("name", name)])
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(SWARM_PIN_HEADER, opts.pin.to_string())
            .body(data.clone());
        let response: ReferenceResponse = self.json(request).await?;
        Ok(response.reference)
    }

    async fn download_file(&self, address: &SwarmAddress) -> Result<Bytes, ApiError> {
        self.bytes(self.api_get(&format!("files/{}", address))?)
            .await
    }

    async fn pin_chunk(&self, address: &SwarmAddress) -> Result<(), ApiError> {
        send(self.api_post(&format!("pin/chunks/{}", address))?).await?;
        Ok(())
    }

    async fn pin_status(&self, address: &SwarmAddress) -> Result<PinState, ApiError> {
        match self
            .json::<PinResponse>(self.api_get(&format!("pin/chunks/{}", address))?)
            .await
        {
            Ok(pin) => Ok(PinState {
                pinned: pin.pin_counter > 0,
                counter: pin.pin_counter,
            }),
            Err(ApiError::NotFound) => Ok(PinState::default()),
            Err(e) => Err(e),
        }
    }

    async fn has_chunk(&self, address: &SwarmAddress) -> Result<bool, ApiError> {
        match send(self.debug_get(&format!("chunks/{}", address))?).await {
            Ok(_) => Ok(true),
            Err(ApiError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn ping(&self, peer: &SwarmAddress) -> Result<Duration, ApiError> {
        let pong: PingResponse = self
            .json(self.debug_post(&format!("pingpong/{}", peer))?)
            .await?;
        parse_go_duration(&pong.rtt)
            .ok_or_else(|| ApiError::Decode(format!("invalid rtt {:?}", pong.rtt)))
    }
}

/// Connects nodes over HTTP
#[derive(Debug, Clone, Default)]
pub struct HttpClientFactory;

impl ClientFactory for HttpClientFactory {
    fn connect(&self, endpoints: &NodeEndpoints) -> Result<Arc<dyn NodeApi>, ApiError> {
        Ok(Arc::new(HttpNodeClient::new(endpoints)?))
    }
}
