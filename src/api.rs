//! API server for form-courier.

use crate::models::{DebugReport, OutreachJob, ProcessingResult};
use crate::processor::process_job;
use crate::submitter::FormSubmitter;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::Semaphore;
use warp::{Filter, Rejection, Reply, http::StatusCode};

/// API response structure
#[derive(Serialize, Deserialize)]
struct ApiResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ProcessingResult>,
}

#[derive(Deserialize)]
struct InspectRequest {
    url: String,
}

#[derive(Serialize)]
struct InspectResponse {
    success: bool,
    report: DebugReport,
}

/// Batch API request structure
#[derive(Deserialize)]
struct BatchRequest {
    jobs: Vec<OutreachJob>,
}

/// Batch API response structure
#[derive(Serialize)]
struct BatchResponse {
    success: bool,
    message: String,
    results: Vec<ProcessingResult>,
}

/// All routes, with rejections turned into JSON responses.
pub(crate) fn routes(
    submitter: Arc<FormSubmitter>,
    max_concurrency: usize,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let submitter_filter = warp::any().map(move || submitter.clone());

    // Limit concurrent submissions
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let semaphore_filter = warp::any().map(move || semaphore.clone());

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| {
            warp::reply::json(&ApiResponse {
                success: true,
                message: "Form Courier API is running".to_string(),
                result: None,
            })
        });

    let inspect = warp::path("inspect")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(submitter_filter.clone())
        .and(semaphore_filter.clone())
        .and_then(handle_inspect);

    let submit = warp::path("submit")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(submitter_filter.clone())
        .and(semaphore_filter.clone())
        .and_then(handle_submit);

    let batch = warp::path("batch")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(submitter_filter)
        .and(semaphore_filter)
        .and_then(handle_batch);

    health
        .or(inspect)
        .or(submit)
        .or(batch)
        .with(warp::cors().allow_any_origin())
        .recover(handle_rejection)
}

/// Start the API server
pub(crate) async fn start_api_server(
    submitter: Arc<FormSubmitter>,
    max_concurrency: usize,
    port: u16,
) {
    tracing::info!("Starting API server on port {}", port);
    warp::serve(routes(submitter, max_concurrency))
        .run(([0, 0, 0, 0], port))
        .await;
}

async fn handle_inspect(
    request: InspectRequest,
    submitter: Arc<FormSubmitter>,
    semaphore: Arc<Semaphore>,
) -> Result<impl Reply, Rejection> {
    let _permit = semaphore
        .acquire()
        .await
        .map_err(|_| warp::reject::custom(ApiError))?;

    tracing::info!("Inspecting {}", request.url);
    let report = submitter.inspect(&request.url).await;
    Ok(warp::reply::json(&InspectResponse {
        success: report.error_kind.is_none(),
        report,
    }))
}

/// Handle a single submission request
async fn handle_submit(
    job: OutreachJob,
    submitter: Arc<FormSubmitter>,
    semaphore: Arc<Semaphore>,
) -> Result<impl Reply, Rejection> {
    let _permit = semaphore
        .acquire()
        .await
        .map_err(|_| warp::reject::custom(ApiError))?;

    tracing::info!("Processing single submission request");
    let result = process_job(submitter, job).await;
    let message = if result.submission_skipped {
        "Record skipped"
    } else if result.submitted {
        "Form submitted"
    } else {
        "Form not submitted"
    };

    Ok(warp::reply::json(&ApiResponse {
        success: result.submitted,
        message: message.to_string(),
        result: Some(result),
    }))
}

/// Handle a batch submission request
async fn handle_batch(
    batch: BatchRequest,
    submitter: Arc<FormSubmitter>,
    semaphore: Arc<Semaphore>,
) -> Result<impl Reply, Rejection> {
    tracing::info!("Processing batch of {} jobs", batch.jobs.len());

    let mut tasks = Vec::with_capacity(batch.jobs.len());
    for job in batch.jobs {
        let submitter = submitter.clone();
        let semaphore = semaphore.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            Some(process_job(submitter, job).await)
        }));
    }

    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        match task.await {
            Ok(Some(result)) => results.push(result),
            Ok(None) => return Err(warp::reject::custom(ApiError)),
            Err(e) => {
                tracing::error!("Batch task failed: {}", e);
                return Err(warp::reject::custom(ApiError));
            }
        }
    }

    Ok(warp::reply::json(&BatchResponse {
        success: true,
        message: format!("Processed {} jobs", results.len()),
        results,
    }))
}

/// Custom error type for API rejections
#[derive(Debug)]
struct ApiError;

impl warp::reject::Reject for ApiError {}

/// Handle API rejections
async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found".to_string())
    } else if err.find::<ApiError>().is_some() {
        (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e))
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        (StatusCode::BAD_REQUEST, "Bad request".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ApiResponse {
            success: false,
            message,
            result: None,
        }),
        status,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn submitter() -> Arc<FormSubmitter> {
        Arc::new(FormSubmitter::new(Arc::new(Config::default())).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let response = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&routes(submitter(), 2))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_submit_with_missing_fields_is_skipped() {
        let response = warp::test::request()
            .method("POST")
            .path("/submit")
            .json(&serde_json::json!({ "message_template": "hello" }))
            .reply(&routes(submitter(), 2))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["result"]["submission_skipped"], true);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let response = warp::test::request()
            .method("POST")
            .path("/inspect")
            .header("content-type", "application/json")
            .body("{not json")
            .reply(&routes(submitter(), 2))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let response = warp::test::request()
            .method("GET")
            .path("/nope")
            .reply(&routes(submitter(), 2))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
