//! GraphQL client for the inventory service.

use crate::config::{AuthConfig, DashboardConfig};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use stockroom_core::{
    DateRange, InventoryService, Kpi, ProductId, ProductRecord, QueryKey, RemoteError,
    RemoteResult,
};

const PRODUCTS_QUERY: &str = r#"
query Products($search: String, $status: String, $warehouse: String) {
  products(search: $search, status: $status, warehouse: $warehouse) {
    id name sku warehouse stock demand
  }
}"#;

const KPIS_QUERY: &str = r#"
query Kpis($range: String!) {
  kpis(range: $range) { date stock demand }
}"#;

const UPDATE_DEMAND_MUTATION: &str = r#"
mutation UpdateDemand($id: ID!, $demand: Int!) {
  updateDemand(id: $id, demand: $demand) {
    id name sku warehouse stock demand
  }
}"#;

const TRANSFER_STOCK_MUTATION: &str = r#"
mutation TransferStock($id: ID!, $from: String!, $to: String!, $qty: Int!) {
  transferStock(id: $id, from: $from, to: $to, qty: $qty) {
    id name sku warehouse stock demand
  }
}"#;

#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Config error: {0}")]
    Config(String),
}

/// Product as sent over the wire. Status is derived locally.
#[derive(Debug, Clone, Deserialize)]
struct ProductNode {
    id: String,
    name: String,
    sku: String,
    warehouse: String,
    stock: i64,
    demand: u64,
}

impl From<ProductNode> for ProductRecord {
    fn from(node: ProductNode) -> Self {
        ProductRecord::new(
            node.id,
            node.name,
            node.sku,
            node.warehouse,
            node.stock,
            node.demand,
        )
    }
}

#[derive(Debug, Deserialize)]
struct ProductsData {
    products: Vec<ProductNode>,
}

#[derive(Debug, Deserialize)]
struct KpisData {
    kpis: Vec<Kpi>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateDemandData {
    update_demand: ProductNode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferStockData {
    transfer_stock: ProductNode,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphQlRequest<'a> {
    query: &'a str,
    operation_name: &'a str,
    variables: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// Unwrap a GraphQL envelope. Any reported error rejects the whole call.
fn decode_envelope<T>(operation: &str, envelope: GraphQlResponse<T>) -> RemoteResult<T> {
    if !envelope.errors.is_empty() {
        let message = envelope
            .errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(RemoteError::server(operation, message));
    }
    envelope
        .data
        .ok_or_else(|| RemoteError::server(operation, "response carried no data"))
}

fn products_variables(key: &QueryKey) -> serde_json::Value {
    let search = if key.search().is_empty() {
        None
    } else {
        Some(key.search())
    };
    json!({
        "search": search,
        "status": key.status(),
        "warehouse": key.warehouse(),
    })
}

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    endpoint: String,
    headers: HeaderMap,
}

impl ApiClient {
    pub fn new(config: &DashboardConfig) -> Result<Self, ApiClientError> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let headers = build_auth_headers(&config.auth)?;
        Ok(Self {
            client,
            endpoint: config.api_url.trim().to_string(),
            headers,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        query: &'static str,
        variables: serde_json::Value,
    ) -> RemoteResult<T> {
        let request_id = uuid::Uuid::now_v7().to_string();
        tracing::debug!(operation, request_id = %request_id, "GraphQL request");
        let body = GraphQlRequest {
            query,
            operation_name: operation,
            variables,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .header("x-request-id", request_id.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| RemoteError::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RemoteError::server(
                operation,
                format!("HTTP {}: {}", status, text.trim()),
            ));
        }
        let envelope: GraphQlResponse<T> = response
            .json()
            .await
            .map_err(|e| RemoteError::server(operation, format!("malformed response: {}", e)))?;
        decode_envelope(operation, envelope)
    }
}

#[async_trait]
impl InventoryService for ApiClient {
    async fn list_products(&self, key: &QueryKey) -> RemoteResult<Vec<ProductRecord>> {
        let data: ProductsData = self
            .execute("products", PRODUCTS_QUERY, products_variables(key))
            .await?;
        Ok(data.products.into_iter().map(ProductRecord::from).collect())
    }

    async fn list_kpis(&self, range: DateRange) -> RemoteResult<Vec<Kpi>> {
        let data: KpisData = self
            .execute("kpis", KPIS_QUERY, json!({ "range": range.as_str() }))
            .await?;
        Ok(data.kpis)
    }

    async fn update_demand(&self, id: &ProductId, demand: u64) -> RemoteResult<ProductRecord> {
        let data: UpdateDemandData = self
            .execute(
                "updateDemand",
                UPDATE_DEMAND_MUTATION,
                json!({ "id": id.as_str(), "demand": demand }),
            )
            .await?;
        Ok(data.update_demand.into())
    }

    async fn transfer_stock(
        &self,
        id: &ProductId,
        from: &str,
        to: &str,
        qty: i64,
    ) -> RemoteResult<ProductRecord> {
        let data: TransferStockData = self
            .execute(
                "transferStock",
                TRANSFER_STOCK_MUTATION,
                json!({ "id": id.as_str(), "from": from, "to": to, "qty": qty }),
            )
            .await?;
        Ok(data.transfer_stock.into())
    }
}

fn build_auth_headers(auth: &AuthConfig) -> Result<HeaderMap, ApiClientError> {
    let mut headers = HeaderMap::new();
    if let Some(api_key) = &auth.api_key {
        let value = format!("Bearer {}", api_key.trim());
        headers.insert(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&value).map_err(|e| ApiClientError::Config(e.to_string()))?,
        );
    }
    Ok(headers)
}
