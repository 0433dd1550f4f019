//! Job lifecycle handlers
//!
//! The ten lifecycle verbs plus reads. Party gating and state validation
//! live in the job service; handlers only translate DTOs and apply the
//! result-redaction view.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use agora_market::{AcceptInput, CounterInput, ProposalInput};
use agora_types::AgoraError;

use crate::dto::{
    AcceptRequest, CounterRequest, DeliverRequest, EscrowResponse, JobResponse, ProposeJobRequest,
    VerifyResponse,
};
use crate::error::{ApiError, ApiResult};
use crate::extractors::{MaybePrincipal, Pagination, Principal};
use crate::state::AppState;

pub async fn propose(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
    Json(request): Json<ProposeJobRequest>,
) -> ApiResult<(StatusCode, Json<JobResponse>)> {
    let job = state
        .jobs
        .propose(
            principal.agent_id,
            ProposalInput {
                seller_agent_id: request.seller_agent_id,
                listing_id: request.listing_id,
                acceptance_criteria: request.acceptance_criteria,
                requirements: request.requirements,
                max_budget: request.max_budget,
                delivery_deadline: request.delivery_deadline,
                max_rounds: request.max_rounds,
                a2a_task_id: request.a2a_task_id,
                a2a_context_id: request.a2a_context_id,
            },
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(JobResponse::for_viewer(&job, Some(principal.agent_id))),
    ))
}

pub async fn counter(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
    Path(job_id): Path<Uuid>,
    Json(request): Json<CounterRequest>,
) -> ApiResult<Json<JobResponse>> {
    let job = state
        .jobs
        .counter(
            job_id,
            principal.agent_id,
            CounterInput {
                proposed_price: request.proposed_price,
                counter_terms: request.counter_terms,
                accepted_terms: request.accepted_terms,
                message: request.message,
                delivery_deadline: request.delivery_deadline,
                requirements: request.requirements,
            },
        )
        .await?;
    Ok(Json(JobResponse::for_viewer(&job, Some(principal.agent_id))))
}

pub async fn accept(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
    Path(job_id): Path<Uuid>,
    Json(request): Json<AcceptRequest>,
) -> ApiResult<Json<JobResponse>> {
    let job = state
        .jobs
        .accept(
            job_id,
            principal.agent_id,
            AcceptInput {
                acceptance_criteria_hash: request.acceptance_criteria_hash,
            },
        )
        .await?;
    Ok(Json(JobResponse::for_viewer(&job, Some(principal.agent_id))))
}

pub async fn fund(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobResponse>> {
    let job = state.jobs.fund(job_id, principal.agent_id).await?;
    Ok(Json(JobResponse::for_viewer(&job, Some(principal.agent_id))))
}

pub async fn start(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobResponse>> {
    let job = state.jobs.start(job_id, principal.agent_id).await?;
    Ok(Json(JobResponse::for_viewer(&job, Some(principal.agent_id))))
}

pub async fn deliver(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
    Path(job_id): Path<Uuid>,
    Json(request): Json<DeliverRequest>,
) -> ApiResult<Json<JobResponse>> {
    let job = state
        .jobs
        .deliver(job_id, principal.agent_id, request.result)
        .await?;
    Ok(Json(JobResponse::for_viewer(&job, Some(principal.agent_id))))
}

pub async fn verify(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<VerifyResponse>> {
    let (job, report) = state.jobs.verify(job_id, principal.agent_id).await?;
    Ok(Json(VerifyResponse {
        job: JobResponse::for_viewer(&job, Some(principal.agent_id)),
        verification: report,
    }))
}

pub async fn complete(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobResponse>> {
    let job = state.jobs.complete(job_id, principal.agent_id).await?;
    Ok(Json(JobResponse::for_viewer(&job, Some(principal.agent_id))))
}

pub async fn fail(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobResponse>> {
    let job = state.jobs.fail(job_id, principal.agent_id).await?;
    Ok(Json(JobResponse::for_viewer(&job, Some(principal.agent_id))))
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobResponse>> {
    let job = state.jobs.cancel(job_id, principal.agent_id).await?;
    Ok(Json(JobResponse::for_viewer(&job, Some(principal.agent_id))))
}

pub async fn dispute(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobResponse>> {
    let job = state.jobs.dispute(job_id, principal.agent_id).await?;
    Ok(Json(JobResponse::for_viewer(&job, Some(principal.agent_id))))
}

/// Public job read; the result field is visible only to a party of a
/// completed job.
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    MaybePrincipal(principal): MaybePrincipal,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobResponse>> {
    let job = state.jobs.get(job_id).await?;
    let viewer = principal.map(|p| p.agent_id);
    Ok(Json(JobResponse::for_viewer(&job, viewer)))
}

pub async fn my_jobs(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
    Pagination(page): Pagination,
) -> ApiResult<Json<Vec<JobResponse>>> {
    let jobs = state
        .jobs
        .list_for_agent(principal.agent_id, page.limit(), page.offset())
        .await?;
    Ok(Json(
        jobs.iter()
            .map(|job| JobResponse::for_viewer(job, Some(principal.agent_id)))
            .collect(),
    ))
}

/// Escrow state and its append-only audit trail; parties only.
pub async fn get_escrow(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<EscrowResponse>> {
    let job = state.jobs.get(job_id).await?;
    if !job.is_party(principal.agent_id) {
        return Err(ApiError(AgoraError::Forbidden("not a party to this job".into())));
    }
    let escrow = state
        .db
        .escrow_repo()
        .find_by_job(job_id)
        .await?
        .ok_or_else(|| ApiError(AgoraError::NotFound("escrow not found for this job".into())))?;
    let audit = state.db.escrow_repo().list_audit(escrow.escrow_id).await?;
    Ok(Json(EscrowResponse::new(&escrow, &audit)))
}
