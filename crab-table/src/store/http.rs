// crab-table/src/store/http.rs
// HTTP 存储客户端 - 网络通信

use super::RemoteStore;
use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::ApiResponse;
use shared::Page;
use shared::models::{Order, Table, TableSession, TableStatus};
use shared::request::{
    ClaimTableRequest, CloseTableResponse, CreateOrderRequest, CreatedOrder, OrderListQuery,
    PageQuery, SessionListQuery, SetTableStatusRequest, UpdateOrderStatusRequest,
};
use shared::types::TableNumber;
use std::time::Duration;

/// 网络存储客户端
#[derive(Debug, Clone)]
pub struct NetworkStore {
    client: Client,
    base_url: String,
}

impl NetworkStore {
    pub fn new(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// 获取基础 URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> ClientResult<T> {
        let status = response.status();
        let text = response.text().await?;

        // 尝试解析为统一响应格式
        match serde_json::from_str::<ApiResponse<T>>(&text) {
            Ok(envelope) => {
                if let Some(err) = envelope.to_error() {
                    return Err(err.into());
                }
                if !status.is_success() {
                    return Err(ClientError::Status {
                        status: status.as_u16(),
                        body: text,
                    });
                }
                envelope
                    .data
                    .ok_or_else(|| ClientError::InvalidResponse("Missing response data".into()))
            }
            // 降级到原始状态码
            Err(_) if !status.is_success() => Err(ClientError::Status {
                status: status.as_u16(),
                body: text,
            }),
            Err(e) => Err(ClientError::InvalidResponse(e.to_string())),
        }
    }

    async fn get<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
    ) -> ClientResult<T> {
        let response = self.client.get(self.url(path)).query(query).send().await?;
        self.handle_response(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        self.handle_response(response).await
    }

    async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        let response = self.client.put(self.url(path)).json(body).send().await?;
        self.handle_response(response).await
    }

    async fn put_empty<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let response = self.client.put(self.url(path)).send().await?;
        self.handle_response(response).await
    }

    /// PATCH, falling back to PUT on stores that do not route PATCH
    async fn patch_or_put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        let response = self.client.patch(self.url(path)).json(body).send().await?;
        if response.status() == StatusCode::METHOD_NOT_ALLOWED {
            tracing::debug!(path, "PATCH not allowed, retrying as PUT");
            return self.put(path, body).await;
        }
        self.handle_response(response).await
    }
}

#[async_trait]
impl RemoteStore for NetworkStore {
    async fn list_tables(&self, restaurant: &str, page: PageQuery) -> ClientResult<Page<Table>> {
        self.get(&format!("api/restaurants/{}/tables", restaurant), &page)
            .await
    }

    async fn claim_table(
        &self,
        restaurant: &str,
        table: TableNumber,
        session_id: &str,
    ) -> ClientResult<TableSession> {
        let body = ClaimTableRequest {
            session_id: session_id.to_string(),
        };
        self.post(
            &format!("api/restaurants/{}/tables/{}/claim", restaurant, table),
            &body,
        )
        .await
    }

    async fn close_table(
        &self,
        restaurant: &str,
        table: TableNumber,
    ) -> ClientResult<CloseTableResponse> {
        self.put_empty(&format!(
            "api/restaurants/{}/tables/{}/close",
            restaurant, table
        ))
        .await
    }

    async fn set_table_status(
        &self,
        restaurant: &str,
        table: TableNumber,
        status: TableStatus,
    ) -> ClientResult<Table> {
        self.put(
            &format!("api/restaurants/{}/tables/{}/status", restaurant, table),
            &SetTableStatusRequest { status },
        )
        .await
    }

    async fn list_orders(
        &self,
        restaurant: &str,
        query: &OrderListQuery,
    ) -> ClientResult<Page<Order>> {
        self.get(&format!("api/restaurants/{}/orders", restaurant), query)
            .await
    }

    async fn create_order(
        &self,
        restaurant: &str,
        request: &CreateOrderRequest,
    ) -> ClientResult<CreatedOrder> {
        self.post(&format!("api/restaurants/{}/orders", restaurant), request)
            .await
    }

    async fn update_order_status(
        &self,
        order_id: &str,
        request: &UpdateOrderStatusRequest,
    ) -> ClientResult<Order> {
        self.patch_or_put(&format!("api/orders/{}/status", order_id), request)
            .await
    }

    async fn list_sessions(
        &self,
        restaurant: &str,
        query: &SessionListQuery,
    ) -> ClientResult<Page<TableSession>> {
        self.get(&format!("api/restaurants/{}/sessions", restaurant), query)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let store = NetworkStore::new("http://localhost:3100/", Duration::from_secs(1)).unwrap();
        assert_eq!(store.base_url(), "http://localhost:3100");
        assert_eq!(
            store.url("/api/orders/o1/status"),
            "http://localhost:3100/api/orders/o1/status"
        );
    }
}
