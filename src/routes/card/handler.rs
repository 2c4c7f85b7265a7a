use axum::{
    Extension,
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::model::{
    CardInfo, CreateCardRequest, FreezeCardRequest, ListCardsQuery, OperationResult,
    RenewCardRequest, TransferCardRequest, UnfreezeCardRequest,
};
use crate::AppState;
use crate::database::models::CardOperation;
use crate::error::{AppError, AppResult};
use crate::utils::{Claims, PaginatedResponse, success_to_api_response};

fn operator_id(claims: &Claims) -> AppResult<i64> {
    claims.operator_id().ok_or(AppError::Unauthorized)
}

async fn operation_result(
    state: &AppState,
    card_id: i64,
    operation: CardOperation,
) -> AppResult<OperationResult> {
    let card = state.cards.get_card(card_id).await?;
    let today = state.cards.clock().today();
    Ok(OperationResult {
        operation,
        card: CardInfo::new(card, today),
    })
}

#[axum::debug_handler]
pub async fn create_card(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCardRequest>,
) -> AppResult<impl IntoResponse> {
    let operator_id = operator_id(&claims)?;
    let card = state.cards.create_card(req.into_input(operator_id)).await?;
    let today = state.cards.clock().today();
    Ok((
        StatusCode::CREATED,
        success_to_api_response(CardInfo::new(card, today)),
    ))
}

pub async fn list_cards(
    State(state): State<AppState>,
    Query(query): Query<ListCardsQuery>,
) -> AppResult<impl IntoResponse> {
    let page = state
        .cards
        .list_cards(
            query.page.unwrap_or(1),
            query.page_size.unwrap_or(0),
            query.status,
            query.user_id,
        )
        .await?;

    let today = state.cards.clock().today();
    Ok(success_to_api_response(PaginatedResponse {
        items: page
            .items
            .into_iter()
            .map(|card| CardInfo::new(card, today))
            .collect(),
        page: page.page,
        page_size: page.page_size,
        total: page.total,
    }))
}

pub async fn get_card(
    State(state): State<AppState>,
    Path(card_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let card = state.cards.get_card(card_id).await?;
    Ok(success_to_api_response(CardInfo::new(
        card,
        state.cards.clock().today(),
    )))
}

pub async fn get_card_by_no(
    State(state): State<AppState>,
    Path(card_no): Path<String>,
) -> AppResult<impl IntoResponse> {
    let card = state.cards.get_card_by_no(&card_no).await?;
    Ok(success_to_api_response(CardInfo::new(
        card,
        state.cards.clock().today(),
    )))
}

pub async fn get_cards_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let today = state.cards.clock().today();
    let cards = state
        .cards
        .get_cards_by_user(user_id)
        .await?
        .into_iter()
        .map(|card| CardInfo::new(card, today))
        .collect::<Vec<_>>();
    Ok(success_to_api_response(cards))
}

pub async fn delete_card(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(card_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let operator_id = operator_id(&claims)?;
    state.cards.delete_card(card_id).await?;
    tracing::info!("Card {} deleted by operator {}", card_id, operator_id);
    Ok(success_to_api_response(()))
}

pub async fn get_card_operations(
    State(state): State<AppState>,
    Path(card_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    // 卡片不存在时返回 404 而不是空列表
    state.cards.get_card(card_id).await?;
    let operations = state.cards.get_card_operations(card_id).await?;
    Ok(success_to_api_response(operations))
}

#[axum::debug_handler]
pub async fn renew_card(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(card_id): Path<i64>,
    Json(req): Json<RenewCardRequest>,
) -> AppResult<impl IntoResponse> {
    let operator_id = operator_id(&claims)?;
    let months = u32::try_from(req.months)
        .map_err(|_| AppError::Validation("续费月数必须大于0".into()))?;

    let operation = state
        .cards
        .renew_card(card_id, months, req.amount, operator_id, &req.remark)
        .await?;
    Ok(success_to_api_response(
        operation_result(&state, card_id, operation).await?,
    ))
}

pub async fn freeze_card(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(card_id): Path<i64>,
    Json(req): Json<FreezeCardRequest>,
) -> AppResult<impl IntoResponse> {
    let operator_id = operator_id(&claims)?;
    let operation = state
        .cards
        .freeze_card(card_id, req.freeze_days, operator_id, &req.remark)
        .await?;
    Ok(success_to_api_response(
        operation_result(&state, card_id, operation).await?,
    ))
}

pub async fn unfreeze_card(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(card_id): Path<i64>,
    body: Option<Json<UnfreezeCardRequest>>,
) -> AppResult<impl IntoResponse> {
    let operator_id = operator_id(&claims)?;
    // 解冻无必填字段，允许空请求体
    let remark = body.map(|Json(req)| req.remark).unwrap_or_default();
    let operation = state
        .cards
        .unfreeze_card(card_id, operator_id, &remark)
        .await?;
    Ok(success_to_api_response(
        operation_result(&state, card_id, operation).await?,
    ))
}

pub async fn transfer_card(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(card_id): Path<i64>,
    Json(req): Json<TransferCardRequest>,
) -> AppResult<impl IntoResponse> {
    let operator_id = operator_id(&claims)?;
    let operation = state
        .cards
        .transfer_card(
            card_id,
            req.to_user_id,
            req.transfer_fee,
            operator_id,
            &req.remark,
        )
        .await?;
    Ok(success_to_api_response(
        operation_result(&state, card_id, operation).await?,
    ))
}
