//! Raindrop.io bookmark import into the vector store

use crate::{log_internal, vectordb::VectorStore};
use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;

const RAINDROP_API_URL: &str = "https://api.raindrop.io/rest/v1";
/// Largest page size the Raindrop API hands out.
pub const RAINDROPS_PER_PAGE: usize = 50;
/// Pseudo-collection holding bookmarks which were never filed.
pub const UNSORTED_COLLECTION_ID: i64 = -1;
const UNSORTED_COLLECTION_TITLE: &str = "Unsorted";

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Collection {
    #[serde(rename = "_id")]
    pub id: i64,
    #[serde(default)]
    pub title: String,
}

/// A single bookmark
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Raindrop {
    #[serde(default)]
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(serde::Deserialize)]
struct ItemsResponse<T> {
    items: Vec<T>,
}

/// Where bookmarks are read from
#[serenity::async_trait]
pub trait BookmarkSource: Send + Sync {
    /// Every collection, nested ones included.  Does not include Unsorted.
    async fn collections(&self) -> Result<Vec<Collection>>;
    /// One page of bookmarks in a collection, `RAINDROPS_PER_PAGE` at most.
    async fn raindrops(&self, collection_id: i64, page: usize) -> Result<Vec<Raindrop>>;
}

/// Raindrop.io REST API client
pub struct RaindropClient {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

impl RaindropClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: RAINDROP_API_URL.to_owned(),
            token: token.into(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.api_url, path);
        self.client
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| anyhow!("Could not fetch `{}` from Raindrop: {}", url, e))?
            .json::<T>()
            .await
            .map_err(|e| anyhow!("Could not parse `{}` response from Raindrop: {}", url, e))
    }
}

#[serenity::async_trait]
impl BookmarkSource for RaindropClient {
    async fn collections(&self) -> Result<Vec<Collection>> {
        let mut collections = self
            .get::<ItemsResponse<Collection>>("/collections", &[])
            .await?
            .items;
        let children = self
            .get::<ItemsResponse<Collection>>("/collections/childrens", &[])
            .await?
            .items;
        collections.extend(children);
        Ok(collections)
    }

    async fn raindrops(&self, collection_id: i64, page: usize) -> Result<Vec<Raindrop>> {
        let path = format!("/raindrops/{}", collection_id);
        let query = [
            ("page", page.to_string()),
            ("perpage", RAINDROPS_PER_PAGE.to_string()),
        ];
        Ok(self.get::<ItemsResponse<Raindrop>>(&path, &query).await?.items)
    }
}

/// Text stored (and later handed to the LLM) for one bookmark.
pub fn format_bookmark(item: &Raindrop, collection_title: &str) -> String {
    let mut content = format!(
        "[{}]({})\n{}\nCollection: {}\n### Tags\n",
        item.title, item.link, item.excerpt, collection_title
    );
    for tag in &item.tags {
        content.push_str("  * ");
        content.push_str(tag);
        content.push('\n');
    }
    content
}

/// Tag identifying which bookmark a stored row came from.
pub fn source_tag(item: &Raindrop) -> String {
    format!("url={}", item.link)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub collections: usize,
    pub bookmarks: usize,
}

/// Copy every bookmark, filed and unsorted, into `store`.
///
/// Nothing is deduplicated: running this against a populated table adds a second copy of each
/// bookmark.  The first error aborts the import.
pub async fn import(source: &dyn BookmarkSource, store: &dyn VectorStore) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    for collection in source.collections().await? {
        log_internal!("Importing collection {}", collection.title);
        summary.bookmarks +=
            import_collection(source, store, collection.id, &collection.title).await?;
        summary.collections += 1;
    }

    log_internal!("Importing unsorted bookmarks");
    summary.bookmarks += import_collection(
        source,
        store,
        UNSORTED_COLLECTION_ID,
        UNSORTED_COLLECTION_TITLE,
    )
    .await?;

    Ok(summary)
}

async fn import_collection(
    source: &dyn BookmarkSource,
    store: &dyn VectorStore,
    collection_id: i64,
    collection_title: &str,
) -> Result<usize> {
    let mut imported = 0;
    let mut page = 0;
    loop {
        let items = source.raindrops(collection_id, page).await?;
        for item in &items {
            log_internal!("Item: {}", item.title);
            store
                .insert(&format_bookmark(item, collection_title), &[source_tag(item)])
                .await?;
            imported += 1;
        }

        if items.len() < RAINDROPS_PER_PAGE {
            return Ok(imported);
        }
        page += 1;
    }
}
