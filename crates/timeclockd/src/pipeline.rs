//! The attendance decision pipeline.
//!
//! Takes a raw check request (data-URI image + optional coordinates) and
//! deterministically produces either a recorded attendance transition or a
//! rejection: geofence → payload validation → face encoding → gallery match
//! → address resolution → state transition. Every failure mode is recovered
//! into a structured response at this boundary; callers never see a raw
//! error.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use timeclock_core::{EncoderError, EuclideanMatcher, Matcher};
use timeclock_geo::{Coordinate, FenceDecision};
use timeclock_store::{Store, StoreError, TransitionAction};

use crate::engine::{EncoderHandle, EngineError};
use crate::geocode::ReverseGeocoder;

/// Inbound check-in/out request body.
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub image_data: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl CheckRequest {
    fn position(&self) -> Option<Coordinate> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)),
            _ => None,
        }
    }
}

/// Outbound result; `success: false` carries only `msg`.
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub success: bool,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<&'static str>,
}

impl CheckResponse {
    fn failure(msg: String) -> Self {
        Self { success: false, msg, employee_name: None, location: None, action: None }
    }
}

/// Everything that can end a check request early. The `Display` text is the
/// message the caller sees.
#[derive(Error, Debug)]
pub enum CheckFailure {
    #[error("{0}")]
    GeofenceViolation(String),
    #[error("Location (latitude & longitude) is required when geofencing is enabled")]
    MissingLocation,
    #[error("{0}")]
    InvalidImagePayload(&'static str),
    #[error("No face detected in image")]
    NoFaceDetected,
    #[error("Face detection failed")]
    FaceDetectionFailure,
    #[error("No employees with face encodings found")]
    NoEnrolledIdentities,
    #[error("No matching employee found")]
    NoMatch,
    #[error("Failed to record attendance")]
    PersistenceFailure(#[source] StoreError),
    #[error("System error occurred")]
    UnexpectedFailure,
}

/// Outcome of an explicit enrollment call.
#[derive(Debug, Serialize)]
pub struct EnrollResponse {
    pub success: bool,
    pub msg: String,
}

pub struct Pipeline {
    store: Arc<Store>,
    encoder: EncoderHandle,
    matcher: EuclideanMatcher,
    geocoder: ReverseGeocoder,
    match_threshold: f64,
    /// One lock per identity, created lazily; serializes the state
    /// transition so concurrent requests for the same person cannot race.
    identity_locks: tokio::sync::Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl Pipeline {
    pub fn new(
        store: Arc<Store>,
        encoder: EncoderHandle,
        geocoder: ReverseGeocoder,
        match_threshold: f64,
    ) -> Self {
        Self {
            store,
            encoder,
            matcher: EuclideanMatcher,
            geocoder,
            match_threshold,
            identity_locks: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Process one attendance request. Never returns an error; every
    /// outcome is a structured response.
    pub async fn process(&self, request: CheckRequest, scope: &str) -> CheckResponse {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("attendance_check", %request_id, scope);

        async {
            match self.run(request, scope).await {
                Ok(response) => response,
                Err(failure) => {
                    tracing::info!(failure = %failure, "attendance request rejected");
                    CheckResponse::failure(failure.to_string())
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, request: CheckRequest, scope: &str) -> Result<CheckResponse, CheckFailure> {
        let position = request.position();

        // 1. Geofence, only when zones are configured for this scope.
        let zones = self
            .store
            .zones_for_scope(scope)
            .map_err(|_| CheckFailure::UnexpectedFailure)?;
        if !zones.is_empty() {
            match timeclock_geo::evaluate(position, &zones) {
                FenceDecision::Allowed => {}
                FenceDecision::Rejected { message } => {
                    return Err(if position.filter(Coordinate::is_set).is_none() {
                        CheckFailure::MissingLocation
                    } else {
                        CheckFailure::GeofenceViolation(message)
                    });
                }
            }
        }

        // 2. Payload validation.
        let image_bytes = decode_image_payload(&request.image_data)?;

        // 3. Face encoding on the engine thread.
        let probe = self.encoder.encode(image_bytes).await.map_err(|err| match err {
            EngineError::Encoder(EncoderError::NoFaceDetected) => CheckFailure::NoFaceDetected,
            EngineError::Encoder(EncoderError::ImageDecode(_)) => {
                CheckFailure::InvalidImagePayload("Failed to process image")
            }
            EngineError::Encoder(other) => {
                tracing::error!(error = %other, "face encoding failed");
                CheckFailure::FaceDetectionFailure
            }
            EngineError::ChannelClosed => CheckFailure::UnexpectedFailure,
        })?;

        // 4. Gallery snapshot.
        let gallery = self
            .store
            .gallery(scope)
            .map_err(|_| CheckFailure::UnexpectedFailure)?;
        if gallery.is_empty() {
            return Err(CheckFailure::NoEnrolledIdentities);
        }

        // 5. Match.
        let matched = self.matcher.compare(&probe, &gallery, self.match_threshold);
        if !matched.matched {
            return Err(CheckFailure::NoMatch);
        }
        let identity_id = matched.identity_id.ok_or(CheckFailure::UnexpectedFailure)?;
        let identity_name = matched.identity_name.ok_or(CheckFailure::UnexpectedFailure)?;
        tracing::info!(identity_id, distance = matched.distance, "identity matched");

        // 6. Address resolution, before the critical section so a slow
        //    geocoder never blocks other requests for this identity.
        let address = self.geocoder.resolve(position).await;

        // 7. State transition, serialized per identity.
        let lock = self.identity_lock(identity_id).await;
        let _guard = lock.lock().await;

        let transition = self
            .store
            .transition(identity_id, Utc::now(), position, &address)
            .map_err(CheckFailure::PersistenceFailure)?;

        let at_local = transition.at.with_timezone(&Local).format("%H:%M");
        let (msg, action) = match transition.action {
            TransitionAction::CheckIn => (format!("Checked In at {at_local}"), "check_in"),
            TransitionAction::CheckOut => (format!("Checked Out at {at_local}"), "check_out"),
        };

        Ok(CheckResponse {
            success: true,
            msg,
            employee_name: Some(identity_name),
            location: Some(address),
            action: Some(action),
        })
    }

    /// Explicit enrollment: encode a reference image and store both the
    /// image and the resulting encoding on the identity. Encoding failure
    /// clears any stored encoding but leaves the identity intact.
    pub async fn enroll(&self, identity_id: i64, image_data: &str) -> EnrollResponse {
        let span = tracing::info_span!("enroll", identity_id);

        async {
            let identity = match self.store.identity(identity_id) {
                Ok(Some(identity)) => identity,
                Ok(None) => {
                    return EnrollResponse {
                        success: false,
                        msg: format!("No identity with id {identity_id}"),
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "identity lookup failed");
                    return EnrollResponse {
                        success: false,
                        msg: "System error occurred".to_string(),
                    };
                }
            };

            let image_bytes = match decode_image_payload(image_data) {
                Ok(bytes) => bytes,
                Err(failure) => {
                    return EnrollResponse { success: false, msg: failure.to_string() }
                }
            };

            if let Err(err) = self.store.set_reference_image(identity_id, &image_bytes) {
                tracing::error!(error = %err, "storing reference image failed");
                return EnrollResponse {
                    success: false,
                    msg: "Failed to store reference image".to_string(),
                };
            }

            match self.encoder.encode(image_bytes).await {
                Ok(encoding) => match self.store.store_encoding(identity_id, &encoding) {
                    Ok(()) => EnrollResponse {
                        success: true,
                        msg: format!("Face encoding generated for {}", identity.name),
                    },
                    Err(err) => {
                        tracing::error!(error = %err, "storing encoding failed");
                        EnrollResponse {
                            success: false,
                            msg: "Failed to store face encoding".to_string(),
                        }
                    }
                },
                Err(err) => {
                    tracing::warn!(error = %err, name = %identity.name, "enrollment encoding failed");
                    let _ = self.store.clear_encoding(identity_id);
                    EnrollResponse {
                        success: false,
                        msg: format!("No face encoding generated for {}: {err}", identity.name),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn identity_lock(&self, identity_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        self.identity_locks
            .lock()
            .await
            .entry(identity_id)
            .or_default()
            .clone()
    }
}

/// Validate and strip a `data:image/...;base64,` payload.
pub(crate) fn decode_image_payload(image_data: &str) -> Result<Vec<u8>, CheckFailure> {
    if image_data.is_empty() {
        return Err(CheckFailure::InvalidImagePayload("No image data received"));
    }
    if !image_data.starts_with("data:image") {
        return Err(CheckFailure::InvalidImagePayload("Invalid image format"));
    }
    let (_, payload) = image_data
        .split_once(',')
        .ok_or(CheckFailure::InvalidImagePayload("Invalid image format"))?;
    let bytes = BASE64
        .decode(payload)
        .map_err(|_| CheckFailure::InvalidImagePayload("Failed to process image"))?;
    if bytes.is_empty() {
        return Err(CheckFailure::InvalidImagePayload("Empty image received"));
    }
    Ok(bytes)
}
