//! Client for the Microsoft To Do lists API.
//!
//! All calls authenticate with a bearer access token, which the caller
//! obtains from [`Credential`](crate::credential::Credential).

use std::sync::Arc;

use reqwest::{StatusCode, Url};

use crate::{
    error::{Error, Result},
    http::Client,
    protocol::{
        self,
        todo::{ListName, TaskList, TaskLists},
    },
};

/// Collection endpoint of the signed-in user's task lists.
pub const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com/v1.0/me/todo/lists";

/// Number of lists requested per page.
const PAGE_SIZE: usize = 100;

pub struct Lists {
    client: Arc<Client>,
    base: Url,
    access_token: String,
}

impl Lists {
    /// Creates a client against the Graph API.
    ///
    /// # Errors
    ///
    /// Never fails for the built-in endpoint.
    pub fn new(client: Arc<Client>, access_token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client,
            base: Url::parse(DEFAULT_BASE_URL)?,
            access_token: access_token.into(),
        })
    }

    /// Points the client at another collection endpoint.
    #[must_use]
    pub fn with_base(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    /// Fetches the user's lists.
    pub async fn index(&self) -> Result<Vec<TaskList>> {
        let mut url = self.base.clone();
        url.set_path(&format!("{}/", self.base.path().trim_end_matches('/')));
        url.set_query(Some(&format!("$top={PAGE_SIZE}")));

        let mut request = self.client.get(url);
        Client::authorize(&mut request, &self.access_token)?;

        let body = self.send(request, StatusCode::OK, "listing lists").await?;
        let page: TaskLists = protocol::json(&body, "lists")?;
        debug!("fetched {} lists", page.lists.len());

        Ok(page.lists)
    }

    /// Creates a list called `name`.
    pub async fn create(&self, name: &str) -> Result<TaskList> {
        let body = serde_json::to_vec(&ListName { display_name: name })?;

        let mut request = self.client.post_json(self.base.clone(), body);
        Client::authorize(&mut request, &self.access_token)?;

        let body = self
            .send(request, StatusCode::CREATED, "creating list")
            .await?;
        let list: TaskList = protocol::json(&body, "lists")?;
        info!("created list {}", list.id);

        Ok(list)
    }

    /// Renames the list with `id` to `name`.
    pub async fn update(&self, id: &str, name: &str) -> Result<TaskList> {
        if id.is_empty() {
            return Err(Error::invalid_argument("list id is empty"));
        }

        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::invalid_argument(format!("{} cannot be a base", self.base)))?
            .pop_if_empty()
            .push(id);

        let body = serde_json::to_vec(&ListName { display_name: name })?;
        let mut request = self.client.patch_json(url, body);
        Client::authorize(&mut request, &self.access_token)?;

        let body = self.send(request, StatusCode::OK, "updating list").await?;
        let list: TaskList = protocol::json(&body, "lists")?;
        info!("renamed list {}", list.id);

        Ok(list)
    }

    /// Executes `request` and returns the body if the status is `expected`.
    async fn send(
        &self,
        request: reqwest::Request,
        expected: StatusCode,
        action: &str,
    ) -> Result<Vec<u8>> {
        let response = self.client.execute(request).await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();

        if status != expected {
            return Err(Error::from_status(
                status,
                format!(
                    "{action} failed with {status}: {}",
                    String::from_utf8_lossy(&body)
                ),
            ));
        }

        Ok(body)
    }
}
