//! Blocking HTTP client for the Nacos open API.
//!
//! | Operation        | Request                                             |
//! |------------------|-----------------------------------------------------|
//! | online check     | `GET  /nacos/`                                      |
//! | namespaces       | `GET  /nacos/v1/console/namespaces`                 |
//! | get config       | `GET  /nacos/v1/cs/configs?tenant&group&dataId`     |
//! | list namespace   | `GET  /nacos/v1/cs/configs?search=accurate&pageNo…` |
//! | publish          | `POST /nacos/v1/cs/configs` (form)                  |
//! | long-poll        | `POST /nacos/v1/cs/configs/listener` (form)         |

use std::time::Duration;

use serde::Deserialize;
use ureq::{Agent, AgentBuilder, Request, Response};

use propsync_core::settings::AuthoritySettings;
use propsync_core::{AuthorityError, ConfigAuthority, NamespaceInfo, RemoteConfig};

const ONLINE_PATH: &str = "/nacos/";
const NAMESPACES_PATH: &str = "/nacos/v1/console/namespaces";
const CONFIGS_PATH: &str = "/nacos/v1/cs/configs";
const LISTENER_PATH: &str = "/nacos/v1/cs/configs/listener";

/// Extra time granted to a long-poll request beyond the server-side hold.
const LONG_POLL_GRACE: Duration = Duration::from_secs(10);

/// Field separator inside `Listening-Configs`.
const WORD_SEPARATOR: char = '\u{2}';
/// Record separator inside `Listening-Configs`.
const LINE_SEPARATOR: char = '\u{1}';

#[derive(Debug, Deserialize)]
struct NamespaceList {
    #[serde(default)]
    data: Vec<NamespaceInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigPage {
    #[serde(default)]
    total_count: usize,
    #[serde(default)]
    pages_available: usize,
    #[serde(default)]
    page_items: Vec<RemoteConfig>,
}

/// [`ConfigAuthority`] backed by a Nacos server.
#[derive(Debug, Clone)]
pub struct NacosClient {
    base_url: String,
    agent: Agent,
}

impl NacosClient {
    pub fn new(settings: &AuthoritySettings) -> Self {
        Self::with_base_url(settings.base_url(), Duration::from_secs(settings.timeout_secs))
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            agent,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send `request`; HTTP errors and transport failures become [`AuthorityError`].
    fn call(&self, url: &str, request: Request) -> Result<Response, AuthorityError> {
        request.call().map_err(|e| map_error(url, e))
    }

    fn body(url: &str, response: Response) -> Result<String, AuthorityError> {
        response.into_string().map_err(|e| AuthorityError::Decode {
            url: url.to_owned(),
            reason: e.to_string(),
        })
    }

    fn fetch_page(
        &self,
        tenant: &str,
        page_no: usize,
        page_size: usize,
    ) -> Result<ConfigPage, AuthorityError> {
        let url = self.url(CONFIGS_PATH);
        let request = self
            .agent
            .get(&url)
            .query("dataId", "")
            .query("group", "")
            .query("search", "accurate")
            .query("pageNo", &page_no.to_string())
            .query("pageSize", &page_size.to_string())
            .query("tenant", tenant);
        self.call(&url, request)?
            .into_json::<ConfigPage>()
            .map_err(|e| AuthorityError::Decode {
                url,
                reason: e.to_string(),
            })
    }
}

fn map_error(url: &str, err: ureq::Error) -> AuthorityError {
    match err {
        ureq::Error::Status(status, _) => AuthorityError::Status {
            url: url.to_owned(),
            status,
        },
        ureq::Error::Transport(t) => AuthorityError::Unreachable {
            url: url.to_owned(),
            reason: t.to_string(),
        },
    }
}

/// `dataId ^2 group ^2 md5 [^2 tenant] ^1`
pub fn listening_configs(tenant: &str, group: &str, data_id: &str, md5: &str) -> String {
    let mut line = format!("{data_id}{WORD_SEPARATOR}{group}{WORD_SEPARATOR}{md5}");
    if !tenant.is_empty() {
        line.push(WORD_SEPARATOR);
        line.push_str(tenant);
    }
    line.push(LINE_SEPARATOR);
    line
}

impl ConfigAuthority for NacosClient {
    fn is_online(&self) -> bool {
        let url = self.url(ONLINE_PATH);
        match self.agent.get(&url).call() {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("authority offline: {}", map_error(&url, e));
                false
            }
        }
    }

    fn namespaces(&self) -> Result<Vec<NamespaceInfo>, AuthorityError> {
        let url = self.url(NAMESPACES_PATH);
        let list: NamespaceList = self
            .call(&url, self.agent.get(&url))?
            .into_json()
            .map_err(|e| AuthorityError::Decode {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        tracing::debug!("{} namespace(s) listed", list.data.len());
        Ok(list.data)
    }

    fn get_config(
        &self,
        tenant: &str,
        group: &str,
        data_id: &str,
    ) -> Result<Option<String>, AuthorityError> {
        let url = self.url(CONFIGS_PATH);
        let request = self
            .agent
            .get(&url)
            .query("tenant", tenant)
            .query("group", group)
            .query("dataId", data_id);
        match request.call() {
            Ok(response) if response.status() == 200 => Ok(Some(Self::body(&url, response)?)),
            Ok(response) => {
                tracing::debug!("{group}/{data_id}@{tenant}: HTTP {}", response.status());
                Ok(None)
            }
            Err(ureq::Error::Status(status, _)) => {
                tracing::debug!("{group}/{data_id}@{tenant}: HTTP {status}");
                Ok(None)
            }
            Err(e) => Err(map_error(&url, e)),
        }
    }

    fn list_configs(
        &self,
        tenant: &str,
        page_size: usize,
    ) -> Result<Vec<RemoteConfig>, AuthorityError> {
        let page_size = page_size.max(1);
        let mut items = Vec::new();
        let mut page_no = 1;
        loop {
            let page = self.fetch_page(tenant, page_no, page_size)?;
            let received = page.page_items.len();
            items.extend(page.page_items);
            if received == 0 || items.len() >= page.total_count || page_no >= page.pages_available {
                break;
            }
            page_no += 1;
        }
        tracing::debug!("{} config(s) listed from tenant '{tenant}'", items.len());
        Ok(items)
    }

    fn publish_config(
        &self,
        tenant: &str,
        group: &str,
        data_id: &str,
        content: &str,
    ) -> Result<(), AuthorityError> {
        let url = self.url(CONFIGS_PATH);
        let response = self
            .agent
            .post(&url)
            .send_form(&[
                ("tenant", tenant),
                ("group", group),
                ("dataId", data_id),
                ("content", content),
            ])
            .map_err(|e| map_error(&url, e))?;
        let body = Self::body(&url, response)?;
        if body.trim() != "true" {
            return Err(AuthorityError::Decode {
                url,
                reason: format!("publish of {group}/{data_id} not acknowledged: {body}"),
            });
        }
        tracing::info!("published {group}/{data_id} to tenant '{tenant}'");
        Ok(())
    }

    fn listen(
        &self,
        tenant: &str,
        group: &str,
        data_id: &str,
        md5: &str,
        timeout: Duration,
    ) -> Result<bool, AuthorityError> {
        let url = self.url(LISTENER_PATH);
        let listening = listening_configs(tenant, group, data_id, md5);
        let response = self
            .agent
            .post(&url)
            .timeout(timeout + LONG_POLL_GRACE)
            .set("Long-Pulling-Timeout", &timeout.as_millis().to_string())
            .send_form(&[("Listening-Configs", listening.as_str())])
            .map_err(|e| map_error(&url, e))?;
        let changed = !Self::body(&url, response)?.trim().is_empty();
        if changed {
            tracing::debug!("change reported for {group}/{data_id}@{tenant}");
        }
        Ok(changed)
    }
}
