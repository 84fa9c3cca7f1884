//! Store API Handlers

use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use shared::models::{Order, Table, TableSession};
use shared::request::{
    ClaimTableRequest, CloseTableResponse, CreateOrderRequest, CreatedOrder, OrderListQuery,
    PageQuery, SessionListQuery, SetTableStatusRequest, UpdateOrderStatusRequest,
};
use shared::types::TableNumber;
use shared::{ApiResponse, AppResult, Page};

/// GET /health
pub async fn health() -> ApiResponse<()> {
    ApiResponse::ok()
}

/// GET /api/restaurants/:slug/tables - 桌台列表
pub async fn list_tables(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(page): Query<PageQuery>,
) -> AppResult<ApiResponse<Page<Table>>> {
    Ok(ApiResponse::success(state.store.tables_page(&slug, page)?))
}

/// POST /api/restaurants/:slug/tables/:table/claim - 开台
pub async fn claim_table(
    State(state): State<AppState>,
    Path((slug, table)): Path<(String, TableNumber)>,
    Json(req): Json<ClaimTableRequest>,
) -> AppResult<ApiResponse<TableSession>> {
    let session = state.store.claim(&slug, table, &req.session_id)?;
    tracing::info!(restaurant = %slug, table, session_id = %session.id, "Table claimed");
    Ok(ApiResponse::success(session))
}

/// PUT /api/restaurants/:slug/tables/:table/close - 清台
pub async fn close_table(
    State(state): State<AppState>,
    Path((slug, table)): Path<(String, TableNumber)>,
) -> AppResult<ApiResponse<CloseTableResponse>> {
    let closed = state.store.close(&slug, table)?;
    tracing::info!(restaurant = %slug, table, closed_sessions = closed.closed_sessions, "Table closed");
    Ok(ApiResponse::success(closed))
}

/// PUT /api/restaurants/:slug/tables/:table/status - 设置桌台状态
pub async fn set_table_status(
    State(state): State<AppState>,
    Path((slug, table)): Path<(String, TableNumber)>,
    Json(req): Json<SetTableStatusRequest>,
) -> AppResult<ApiResponse<Table>> {
    Ok(ApiResponse::success(state.store.set_status(&slug, table, req.status)?))
}

/// GET /api/restaurants/:slug/orders - 订单列表
pub async fn list_orders(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<OrderListQuery>,
) -> AppResult<ApiResponse<Page<Order>>> {
    Ok(ApiResponse::success(state.store.orders_page(&slug, &query)?))
}

/// POST /api/restaurants/:slug/orders - 下单
pub async fn create_order(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(req): Json<CreateOrderRequest>,
) -> AppResult<ApiResponse<CreatedOrder>> {
    let created = state.store.create_order(&slug, &req)?;
    tracing::info!(restaurant = %slug, table = req.table, order_id = %created.id, "Order created");
    Ok(ApiResponse::success(created))
}

/// PATCH|PUT /api/orders/:id/status - 更新订单状态
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateOrderStatusRequest>,
) -> AppResult<ApiResponse<Order>> {
    Ok(ApiResponse::success(state.store.update_status(&id, &req)?))
}

/// GET /api/restaurants/:slug/sessions - 会话列表
pub async fn list_sessions(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<SessionListQuery>,
) -> AppResult<ApiResponse<Page<TableSession>>> {
    Ok(ApiResponse::success(state.store.sessions_page(&slug, &query)?))
}
