//! Prediction request pipeline
//!
//! Submits a race identifier and the gated result depth to the backend
//! ranking capability and validates what comes back. The scoring itself
//! happens on the backend.
//!
//! # Retry policy
//!
//! Network-level failures (timeout, connection refused) are retried once
//! after a backoff. Everything else surfaces immediately; in particular a
//! response that fails validation is a contract violation and is never
//! retried.

use chrono::{DateTime, Utc};
use pitwall_common::api::{PredictRequest, PredictResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::backend::Backend;
use crate::cancel::run_cancellable;
use crate::error::{ClientError, Result};
use crate::gating::GatedParameters;
use crate::session::Actor;

/// Attempts for a network-level failure: the first try plus one retry
const MAX_ATTEMPTS: u32 = 2;

/// One ranked entry; position in [`PredictionResult::ranked`] is its rank
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedCandidate {
    pub candidate_id: i64,
    pub probability: f64,
}

/// Validated ranking for a race
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub race_id: i64,
    pub created_at: DateTime<Utc>,
    /// Rank order; probabilities are non-increasing
    pub ranked: Vec<RankedCandidate>,
}

/// Drives `POST /predict`
pub struct PredictionPipeline {
    backend: Arc<dyn Backend>,
    retry_backoff: Duration,
}

impl PredictionPipeline {
    pub fn new(backend: Arc<dyn Backend>, retry_backoff: Duration) -> Self {
        Self {
            backend,
            retry_backoff,
        }
    }

    /// Request a ranking for `race_id` at the depth allowed by `params`
    pub async fn predict(
        &self,
        actor: &Actor,
        race_id: i64,
        params: &GatedParameters,
    ) -> Result<PredictionResult> {
        self.predict_cancellable(actor, race_id, params, &CancellationToken::new())
            .await
    }

    /// [`predict`](Self::predict), abandoned when `cancel` fires
    pub async fn predict_cancellable(
        &self,
        actor: &Actor,
        race_id: i64,
        params: &GatedParameters,
        cancel: &CancellationToken,
    ) -> Result<PredictionResult> {
        let request = PredictRequest {
            race_id,
            top_n: params.result_depth,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(race_id, top_n = request.top_n, attempt, "Requesting prediction");

            let result =
                run_cancellable(cancel, self.backend.predict(actor.credential(), &request)).await;

            match result {
                Ok(body) => {
                    return validate_response(&request, body).map_err(|e| {
                        error!(race_id, error = %e, "Prediction response rejected");
                        e
                    });
                }
                Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                    warn!(
                        race_id,
                        attempt,
                        backoff_ms = self.retry_backoff.as_millis() as u64,
                        error = %e,
                        "Prediction request failed, will retry after backoff"
                    );
                    run_cancellable(cancel, async {
                        tokio::time::sleep(self.retry_backoff).await;
                        Ok(())
                    })
                    .await?;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Check a backend ranking against the request
///
/// Rejects responses that:
/// - are for a different race
/// - contain more entries than requested
/// - carry a probability outside `[0, 1]` (or NaN)
/// - are not ordered by non-increasing probability
pub fn validate_response(
    request: &PredictRequest,
    body: PredictResponse,
) -> Result<PredictionResult> {
    if body.race_id != request.race_id {
        return Err(ClientError::MalformedResponse(format!(
            "Requested race {} but got race {}",
            request.race_id, body.race_id
        )));
    }

    if body.predicted.len() > request.top_n as usize {
        return Err(ClientError::MalformedResponse(format!(
            "Requested top {} but got {} entries",
            request.top_n,
            body.predicted.len()
        )));
    }

    for (rank, entry) in body.predicted.iter().enumerate() {
        if !(0.0..=1.0).contains(&entry.probability) {
            return Err(ClientError::MalformedResponse(format!(
                "P{} probability {} outside [0, 1]",
                rank + 1,
                entry.probability
            )));
        }
    }

    if let Some(rank) = body
        .predicted
        .windows(2)
        .position(|pair| pair[1].probability > pair[0].probability)
    {
        return Err(ClientError::MalformedResponse(format!(
            "P{} ({}) ranked above P{} ({})",
            rank + 1,
            body.predicted[rank].probability,
            rank + 2,
            body.predicted[rank + 1].probability
        )));
    }

    Ok(PredictionResult {
        race_id: body.race_id,
        created_at: body.created_at,
        ranked: body
            .predicted
            .into_iter()
            .map(|p| RankedCandidate {
                candidate_id: p.driver_id,
                probability: p.probability,
            })
            .collect(),
    })
}
