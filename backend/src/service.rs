//! The prediction pipeline: validate, build the feature record, infer, format.

use std::sync::Arc;

use log::{debug, error, info, warn};
use serde_json::{Map, Value};

use crate::config::AppConfig;
use crate::error::{PredictError, PredictResult};
use crate::inference::{load_model, Predictor};
use crate::models::{ApiResponse, MetaStyle, Outcome, PriceResult, SurvivalResult};
use crate::schema::{Schema, Task, ValidatedRecord};
use crate::training::train_from_csv;

/// Request handler state. Built once at startup and shared read-only.
pub struct PredictionService {
    schema: &'static Schema,
    model: Option<Arc<dyn Predictor>>,
    meta_style: MetaStyle,
}

impl PredictionService {
    pub fn new(schema: &'static Schema, model: Option<Arc<dyn Predictor>>, meta_style: MetaStyle) -> Self {
        Self {
            schema,
            model,
            meta_style,
        }
    }

    /// Load the configured artifact, training one first if it is missing and
    /// training data is configured. A service without a model still starts;
    /// its requests report the model as unavailable.
    pub fn bootstrap(cfg: &AppConfig) -> Self {
        let model = match load_or_train(cfg) {
            Ok(model) => Some(model),
            Err(e) => {
                error!("Model unavailable: {:#}", e);
                None
            }
        };
        Self::new(cfg.schema, model, cfg.meta_style)
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    pub fn model(&self) -> Option<&Arc<dyn Predictor>> {
        self.model.as_ref()
    }

    pub fn predict(&self, body: &Map<String, Value>) -> PredictResult<Outcome> {
        let record = self.schema.validate(body)?;
        let features = record.features();
        let score = self.infer(&features)?;
        Ok(self.format(score, &record))
    }

    /// Run the pipeline and fold any failure into the error envelope.
    pub fn respond(&self, body: &Map<String, Value>) -> ApiResponse<Outcome> {
        match self.predict(body) {
            Ok(outcome) => ApiResponse::success(outcome),
            Err(e) => {
                match &e {
                    PredictError::Validation(msg) => debug!("Validation failed: {}", msg),
                    other => warn!("Prediction failed: {}", other),
                }
                ApiResponse::error(&e.client_message(self.schema.error_prefix))
            }
        }
    }

    /// Envelope for a body that never made it to a field map.
    pub fn reject(&self, err: PredictError) -> ApiResponse<Outcome> {
        warn!("Rejected request: {}", err);
        ApiResponse::error(&err.client_message(self.schema.error_prefix))
    }

    fn infer(&self, features: &[f32]) -> PredictResult<f32> {
        let model = self.model.as_ref().ok_or(PredictError::ModelUnavailable)?;
        let score = model
            .score(features)
            .map_err(|e| PredictError::Inference(format!("{:#}", e)))?;
        if !score.is_finite() {
            return Err(PredictError::Inference(format!("model returned {}", score)));
        }
        Ok(score)
    }

    fn format(&self, score: f32, record: &ValidatedRecord) -> Outcome {
        match self.schema.task {
            Task::Classification { target, threshold } => Outcome::Survival(SurvivalResult::new(
                score,
                threshold,
                self.schema.fields.len(),
                target,
                self.meta_style,
            )),
            Task::Regression { .. } => Outcome::Price(PriceResult::new(score, record.echo())),
        }
    }
}

/// Load the artifact; if it is missing or unreadable and training data is
/// configured, train a replacement once and save it in its place.
fn load_or_train(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Predictor>> {
    let data = match (&cfg.training_data, cfg.model_path.exists()) {
        (None, _) => return load_model(&cfg.model_path, cfg.schema),
        (Some(data), true) => match load_model(&cfg.model_path, cfg.schema) {
            Ok(model) => return Ok(model),
            Err(e) => {
                warn!(
                    "Cannot load {} ({:#}), retraining from {}",
                    cfg.model_path.display(),
                    e,
                    data.display()
                );
                data
            }
        },
        (Some(data), false) => {
            warn!(
                "No model at {}, training from {}",
                cfg.model_path.display(),
                data.display()
            );
            data
        }
    };

    let trained = train_from_csv(data, cfg.schema)?;
    trained.save(&cfg.model_path)?;
    info!("Saved trained model to {}", cfg.model_path.display());
    load_model(&cfg.model_path, cfg.schema)
}
