//! Facebook Graph API client for lead-gen forms and leads.
//!
//! Read-only: lists the configured page's lead forms and each form's
//! submissions. Cursor pagination is followed via `paging.next` until
//! exhausted, so callers always see the full result set.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Error;
use crate::sync::{LeadProvider, RemoteForm, RemoteLead};

const GRAPH_API_BASE: &str = "https://graph.facebook.com/v19.0";

/// Client for the Facebook Graph API.
#[derive(Clone)]
pub struct GraphClient {
    base_url: String,
    access_token: Option<String>,
    page_id: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("facebook api not configured: {0}")]
    Config(String),
    #[error("facebook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("facebook api error: {0}")]
    Api(String),
}

impl From<GraphError> for Error {
    fn from(e: GraphError) -> Self {
        Error::Upstream(e.to_string())
    }
}

impl GraphClient {
    pub fn new(
        access_token: Option<String>,
        page_id: Option<String>,
        base_url: Option<String>,
    ) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| GRAPH_API_BASE.to_string());
        Self {
            base_url,
            access_token,
            page_id,
            client: reqwest::Client::new(),
        }
    }

    fn token(&self) -> Result<&str, GraphError> {
        self.access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                GraphError::Config(
                    "access token not set (FACEBOOK_ACCESS_TOKEN or facebook.accessToken)"
                        .to_string(),
                )
            })
    }

    fn page_id(&self) -> Result<&str, GraphError> {
        self.page_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| GraphError::Config("page id not set (facebook.pageId)".to_string()))
    }

    /// GET /{page_id}/leadgen_forms — all lead forms of the configured page.
    pub async fn list_forms(&self) -> Result<Vec<RemoteForm>, GraphError> {
        let token = self.token()?;
        let page_id = self.page_id()?;
        let mut url = format!(
            "{}/{}/leadgen_forms?fields=id,name&access_token={}",
            self.base_url, page_id, token
        );
        let mut forms = Vec::new();
        loop {
            let page: FormsPage = self.fetch_page(&url).await?;
            forms.extend(page.data.into_iter().map(|f| RemoteForm {
                id: f.id,
                name: f.name.unwrap_or_default(),
            }));
            match page.paging.and_then(|p| p.next) {
                Some(next) => url = next,
                None => break,
            }
        }
        Ok(forms)
    }

    /// GET /{form_id}/leads — all submissions for one form. Multi-value
    /// answers (checkbox fields) are joined with ", ".
    pub async fn list_leads(&self, form_external_id: &str) -> Result<Vec<RemoteLead>, GraphError> {
        let token = self.token()?;
        let mut url = format!(
            "{}/{}/leads?fields=id,created_time,field_data&access_token={}",
            self.base_url, form_external_id, token
        );
        let mut leads = Vec::new();
        loop {
            let page: LeadsPage = self.fetch_page(&url).await?;
            for entry in page.data {
                let mut fields = serde_json::Map::new();
                for field in entry.field_data {
                    fields.insert(
                        field.name,
                        serde_json::Value::String(field.values.join(", ")),
                    );
                }
                leads.push(RemoteLead {
                    id: entry.id,
                    created_time: entry.created_time.unwrap_or_default(),
                    fields,
                });
            }
            match page.paging.and_then(|p| p.next) {
                Some(next) => url = next,
                None => break,
            }
        }
        Ok(leads)
    }

    async fn fetch_page<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, GraphError> {
        let res = self.client.get(url).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(GraphError::Api(format!("{} {}", status, body)));
        }
        Ok(res.json::<T>().await?)
    }
}

#[async_trait]
impl LeadProvider for GraphClient {
    async fn list_forms(&self) -> Result<Vec<RemoteForm>, Error> {
        GraphClient::list_forms(self).await.map_err(Error::from)
    }

    async fn list_leads(&self, form_external_id: &str) -> Result<Vec<RemoteLead>, Error> {
        GraphClient::list_leads(self, form_external_id)
            .await
            .map_err(Error::from)
    }
}

#[derive(Debug, Deserialize)]
struct FormsPage {
    #[serde(default)]
    data: Vec<FormEntry>,
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct FormEntry {
    id: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LeadsPage {
    #[serde(default)]
    data: Vec<LeadEntry>,
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct LeadEntry {
    id: String,
    created_time: Option<String>,
    #[serde(default)]
    field_data: Vec<FieldData>,
}

#[derive(Debug, Deserialize)]
struct FieldData {
    name: String,
    #[serde(default)]
    values: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    next: Option<String>,
}
