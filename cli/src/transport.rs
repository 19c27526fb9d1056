//! A [`Transport`] implementation backed by `reqwest::blocking` (§4.6).
//!
//! `stevedore_core` deliberately has no HTTP client of its own (§1); this is the concrete
//! collaborator every [`stevedore_core::registry::FromRegistry`] view in this binary is built
//! on. Handles the standard registry v2 anonymous-bearer-token challenge
//! (`WWW-Authenticate: Bearer realm=... service=... scope=...`) transparently, caching one
//! token per `(realm, service, scope)` for the lifetime of the transport.

use bytes::Bytes;
use color_eyre::eyre::{eyre, Context};
use reqwest::{blocking::Client, header, StatusCode};
use std::sync::{Arc, Mutex};
use stevedore_core::{
    transport::{CatalogPage, ManifestResponse, Transport},
    Error, Result,
};

/// A `reqwest::blocking`-backed [`Transport`] with anonymous bearer-token auth.
///
/// `Clone` is cheap and shares the token cache: `reqwest::Client` is itself `Arc`-backed, and
/// the cache lives behind its own `Arc` so every clone of a view's transport (e.g. the child
/// views `manifest_list::FromRegistry::resolve_all` opens per platform) reuses
/// whatever token the first request already negotiated.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
    token_cache: Arc<Mutex<Option<(String, String)>>>,
}

impl ReqwestTransport {
    /// Build a transport talking to `registry` over HTTPS.
    pub fn new(registry: &str) -> color_eyre::Result<Self> {
        let client = Client::builder()
            .user_agent(stevedore_core::USER_AGENT)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: format!("https://{registry}"),
            token_cache: Arc::new(Mutex::new(None)),
        })
    }

    fn url(&self, repository: &str, suffix: &str) -> String {
        format!("{}/v2/{repository}/{suffix}", self.base_url)
    }

    /// Issue `build`, retrying once with a bearer token if the registry challenges us.
    fn authed(&self, build: impl Fn(&Client) -> reqwest::blocking::RequestBuilder) -> Result<reqwest::blocking::Response> {
        if let Some((_scope, token)) = self.token_cache.lock().expect("lock poisoned").clone() {
            let response = build(&self.client)
                .bearer_auth(&token)
                .send()
                .map_err(Error::transport)?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }
        }

        let probe = build(&self.client).send().map_err(Error::transport)?;
        if probe.status() != StatusCode::UNAUTHORIZED {
            return Ok(probe);
        }

        let challenge = probe
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::transport(eyre!("registry returned 401 with no WWW-Authenticate header")))?;
        let token = self.fetch_token(challenge)?;
        *self.token_cache.lock().expect("lock poisoned") = Some((challenge.to_string(), token.clone()));

        build(&self.client).bearer_auth(&token).send().map_err(Error::transport)
    }

    fn fetch_token(&self, challenge: &str) -> Result<String> {
        let params = parse_bearer_challenge(challenge)
            .ok_or_else(|| Error::transport(eyre!("unsupported WWW-Authenticate challenge: {challenge}")))?;
        let mut request = self.client.get(&params.realm);
        if let Some(service) = &params.service {
            request = request.query(&[("service", service)]);
        }
        if let Some(scope) = &params.scope {
            request = request.query(&[("scope", scope)]);
        }
        let response = request
            .send()
            .map_err(Error::transport)?
            .error_for_status()
            .map_err(Error::transport)?;
        let body: TokenResponse = response.json().map_err(Error::transport)?;
        body.token
            .or(body.access_token)
            .ok_or_else(|| Error::transport(eyre!("token response had neither `token` nor `access_token`")))
    }
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

struct BearerChallenge {
    realm: String,
    service: Option<String>,
    scope: Option<String>,
}

/// Parse `Bearer realm="...",service="...",scope="..."` into its components.
fn parse_bearer_challenge(header: &str) -> Option<BearerChallenge> {
    let rest = header.strip_prefix("Bearer ")?;
    let mut realm = None;
    let mut service = None;
    let mut scope = None;
    for part in rest.split(',') {
        let (key, value) = part.trim().split_once('=')?;
        let value = value.trim_matches('"').to_string();
        match key {
            "realm" => realm = Some(value),
            "service" => service = Some(value),
            "scope" => scope = Some(value),
            _ => {}
        }
    }
    Some(BearerChallenge {
        realm: realm?,
        service,
        scope,
    })
}

impl Transport for ReqwestTransport {
    fn get_manifest(&self, repository: &str, reference: &str, accept_mimes: &[&str]) -> Result<ManifestResponse> {
        let url = self.url(repository, &format!("manifests/{reference}"));
        let accept = accept_mimes.join(", ");
        let response = self
            .authed(|client| client.get(&url).header(header::ACCEPT, &accept))?
            .error_for_status()
            .map_err(Error::transport)?;
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().map_err(Error::transport)?;
        Ok(ManifestResponse {
            body: Bytes::from(body),
            content_type,
        })
    }

    fn put_manifest(&self, repository: &str, reference: &str, media_type: &str, body: &[u8]) -> Result<()> {
        let url = self.url(repository, &format!("manifests/{reference}"));
        let body = body.to_vec();
        self.authed(|client| {
            client
                .put(&url)
                .header(header::CONTENT_TYPE, media_type)
                .body(body.clone())
        })?
        .error_for_status()
        .map_err(Error::transport)?;
        Ok(())
    }

    fn get_blob(&self, repository: &str, digest: &str) -> Result<Bytes> {
        let url = self.url(repository, &format!("blobs/{digest}"));
        let response = self.authed(|client| client.get(&url))?.error_for_status().map_err(Error::transport)?;
        Ok(Bytes::from(response.bytes().map_err(Error::transport)?))
    }

    fn head_blob_size(&self, repository: &str, digest: &str) -> Result<Option<u64>> {
        let url = self.url(repository, &format!("blobs/{digest}"));
        let response = self.authed(|client| client.head(&url))?.error_for_status().map_err(Error::transport)?;
        Ok(response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok()))
    }

    fn put_blob(&self, repository: &str, digest: &str, body: &[u8]) -> Result<()> {
        let start_url = self.url(repository, "blobs/uploads/");
        let started = self.authed(|client| client.post(&start_url))?.error_for_status().map_err(Error::transport)?;
        let location = started
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::transport(eyre!("upload session had no Location header")))?
            .to_string();
        let sep = if location.contains('?') { '&' } else { '?' };
        let upload_url = format!("{location}{sep}digest={digest}");
        let body = body.to_vec();
        self.authed(|client| {
            client
                .put(&upload_url)
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .body(body.clone())
        })?
        .error_for_status()
        .map_err(Error::transport)?;
        Ok(())
    }

    fn has_blob(&self, repository: &str, digest: &str) -> Result<bool> {
        let url = self.url(repository, &format!("blobs/{digest}"));
        let response = self.authed(|client| client.head(&url))?;
        Ok(response.status().is_success())
    }

    fn catalog_page(&self, registry: &str, page_size: u32, cursor: Option<&str>) -> Result<CatalogPage> {
        let url = format!("{}/v2/_catalog", self.base_url);
        let _ = registry;
        let mut query = vec![("n".to_string(), page_size.to_string())];
        if let Some(cursor) = cursor {
            query.push(("last".to_string(), cursor.to_string()));
        }
        let response = self
            .authed(|client| client.get(&url).query(&query))?
            .error_for_status()
            .map_err(Error::transport)?;
        let next = response.headers().get(header::LINK).and_then(|v| v.to_str().ok()).and_then(parse_link_next);
        let body: CatalogResponse = response.json().map_err(Error::transport)?;
        Ok(CatalogPage {
            repositories: body.repositories,
            next,
        })
    }

    fn manifest_not_found(&self, repository: &str, reference: &str) -> Result<bool> {
        let url = self.url(repository, &format!("manifests/{reference}"));
        let response = self.authed(|client| client.head(&url))?;
        Ok(response.status() == StatusCode::NOT_FOUND)
    }
}

#[derive(serde::Deserialize)]
struct CatalogResponse {
    repositories: Vec<String>,
}

/// Extract the opaque `last` cursor from a `Link: <...?last=X>; rel="next"` header.
fn parse_link_next(link: &str) -> Option<String> {
    let url = link.split(';').next()?.trim().trim_start_matches('<').trim_end_matches('>');
    url.split("last=").nth(1).map(|rest| rest.split('&').next().unwrap_or(rest).to_string())
}
