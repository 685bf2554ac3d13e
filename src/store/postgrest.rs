use super::{
    CONFIG_TABLE, ConfigRow, REAGENTS_TABLE, ReagentPatch, ReagentRow, RemoteStore,
    TRANSACTIONS_TABLE, TransactionRow, decode_rows, map_rows,
};
use crate::error::StoreError;
use crate::model::{ConfigEntry, Reagent, Transaction};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// HTTP client for a hosted PostgREST endpoint
///
/// Tables live under `{url}/rest/v1/{table}`; every request carries the
/// project key both as `apikey` and as a bearer token.
#[derive(Debug, Clone)]
pub struct PostgrestStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl PostgrestStore {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self::with_client(Client::new(), base_url, api_key)
    }

    pub fn with_client(client: Client, base_url: &str, api_key: &str) -> Self {
        PostgrestStore {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Rows of `table`, decoded one by one so a single bad row only drops itself
    async fn select<T: DeserializeOwned>(
        &self,
        table: &'static str,
        query: &str,
    ) -> Result<Vec<T>, StoreError> {
        let url = format!("{}?select=*{}", self.table_url(table), query);
        let response = self.request(Method::GET, &url).send().await?;
        let response = Self::check(response).await?;
        let rows = response.json::<Vec<serde_json::Value>>().await?;
        Ok(decode_rows(table, rows))
    }

    async fn write<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        prefer: &str,
        body: &B,
    ) -> Result<(), StoreError> {
        let response = self
            .request(method, url)
            .header("Prefer", prefer)
            .json(body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

const UPSERT: &str = "resolution=merge-duplicates,return=minimal";
const MINIMAL: &str = "return=minimal";

#[async_trait]
impl RemoteStore for PostgrestStore {
    async fn select_config(&self) -> Result<Vec<ConfigEntry>, StoreError> {
        let rows: Vec<ConfigRow> = self.select(CONFIG_TABLE, "").await?;
        Ok(rows.into_iter().map(ConfigEntry::from).collect())
    }

    async fn upsert_config(&self, entry: &ConfigEntry) -> Result<(), StoreError> {
        let url = self.table_url(CONFIG_TABLE);
        self.write(Method::POST, &url, UPSERT, &ConfigRow::from(entry))
            .await
    }

    async fn select_reagents(&self) -> Result<Vec<Reagent>, StoreError> {
        let rows: Vec<ReagentRow> = self.select(REAGENTS_TABLE, "").await?;
        Ok(map_rows(rows))
    }

    async fn upsert_reagent(&self, reagent: &Reagent) -> Result<(), StoreError> {
        let url = self.table_url(REAGENTS_TABLE);
        self.write(Method::POST, &url, UPSERT, &ReagentRow::from(reagent))
            .await
    }

    async fn update_reagent(&self, id: &str, patch: &ReagentPatch) -> Result<(), StoreError> {
        let url = format!(
            "{}?id=eq.{}",
            self.table_url(REAGENTS_TABLE),
            urlencoding::encode(id)
        );
        self.write(Method::PATCH, &url, MINIMAL, patch).await
    }

    async fn select_transactions(&self, limit: usize) -> Result<Vec<Transaction>, StoreError> {
        let query = format!("&order=timestamp.desc&limit={}", limit);
        let rows: Vec<TransactionRow> = self.select(TRANSACTIONS_TABLE, &query).await?;
        Ok(map_rows(rows))
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<(), StoreError> {
        let url = self.table_url(TRANSACTIONS_TABLE);
        self.write(Method::POST, &url, MINIMAL, &TransactionRow::from(transaction))
            .await
    }
}
