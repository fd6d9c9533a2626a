use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use log::info;
use serde::{Deserialize, Serialize};
use tract_onnx::prelude::*;

use crate::schema::{Schema, Task};

/// A loaded model. Implementations are immutable after construction and are
/// shared by every request.
pub trait Predictor: Send + Sync {
    /// Raw model output for one feature record: the positive-class
    /// probability for classifiers, the predicted value for regressors.
    fn score(&self, features: &[f32]) -> anyhow::Result<f32>;

    fn info(&self) -> ModelInfo;
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelInfo {
    pub format: String,
    pub input_shape: Vec<usize>,
    pub source: String,
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearKind {
    Logistic,
    Linear,
}

/// Standardized linear model stored as JSON. Produced by the training
/// fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub kind: LinearKind,
    pub features: Vec<String>,
    pub means: Vec<f32>,
    pub scales: Vec<f32>,
    pub weights: Vec<f32>,
    pub bias: f32,
    #[serde(default)]
    pub target_mean: f32,
    #[serde(default = "unit_scale")]
    pub target_scale: f32,
    #[serde(skip)]
    source: String,
}

fn unit_scale() -> f32 {
    1.0
}

impl LinearModel {
    pub fn new(
        kind: LinearKind,
        features: Vec<String>,
        means: Vec<f32>,
        scales: Vec<f32>,
        weights: Vec<f32>,
        bias: f32,
    ) -> Self {
        Self {
            kind,
            features,
            means,
            scales,
            weights,
            bias,
            target_mean: 0.0,
            target_scale: 1.0,
            source: String::from("memory"),
        }
    }

    pub fn with_target_scaling(mut self, mean: f32, scale: f32) -> Self {
        self.target_mean = mean;
        self.target_scale = scale;
        self
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let mut model: LinearModel = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing {}", path.display()))?;
        model.source = path.display().to_string();
        model.check_shape()?;
        Ok(model)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    fn check_shape(&self) -> anyhow::Result<()> {
        let n = self.features.len();
        if self.means.len() != n || self.scales.len() != n || self.weights.len() != n {
            bail!(
                "linear model declares {} features but carries {} means, {} scales, {} weights",
                n,
                self.means.len(),
                self.scales.len(),
                self.weights.len()
            );
        }
        Ok(())
    }

    /// Pre-activation value for a raw feature record.
    pub fn linear_term(&self, features: &[f32]) -> f32 {
        features
            .iter()
            .zip(&self.means)
            .zip(&self.scales)
            .zip(&self.weights)
            .map(|(((x, m), s), w)| w * (x - m) / s)
            .sum::<f32>()
            + self.bias
    }
}

impl Predictor for LinearModel {
    fn score(&self, features: &[f32]) -> anyhow::Result<f32> {
        if features.len() != self.weights.len() {
            bail!(
                "expected {} features, got {}",
                self.weights.len(),
                features.len()
            );
        }
        let z = self.linear_term(features);
        Ok(match self.kind {
            LinearKind::Logistic => sigmoid(z),
            LinearKind::Linear => self.target_mean + self.target_scale * z,
        })
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            format: format!("{:?}", self.kind).to_lowercase(),
            input_shape: vec![1, self.features.len()],
            source: self.source.clone(),
        }
    }
}

/// ONNX graph executed with tract.
pub struct OnnxModel {
    model: TypedRunnableModel<TypedModel>,
    n_features: usize,
    classification: bool,
    source: String,
}

impl OnnxModel {
    pub fn load<P: AsRef<Path>>(model_path: P, n_features: usize, task: Task) -> TractResult<Self> {
        let source = model_path.as_ref().display().to_string();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, n_features)),
            )?
            .into_optimized()?
            .into_runnable()?;

        Ok(Self {
            model,
            n_features,
            classification: matches!(task, Task::Classification { .. }),
            source,
        })
    }
}

/// Pick the score from a graph's outputs. Non-f32 outputs (such as the int64
/// label tensor emitted by converted sklearn classifiers) are skipped;
/// classifiers read the last f32 output, regressors the first.
pub fn select_score(classification: bool, outputs: &[TValue]) -> anyhow::Result<f32> {
    let mut floats = outputs.iter().filter(|t| t.datum_type() == DatumType::F32);
    let tensor = if classification {
        floats.last()
    } else {
        floats.next()
    }
    .ok_or_else(|| anyhow!("model produced no f32 output"))?;

    let values: Vec<f32> = tensor.to_array_view::<f32>()?.iter().copied().collect();
    match (classification, values.as_slice()) {
        (_, []) => Err(anyhow!("model produced an empty tensor")),
        // [p(negative), p(positive)]
        (true, [_, positive, ..]) => Ok(*positive),
        (true, [logit]) => Ok(sigmoid(*logit)),
        (false, [value, ..]) => Ok(*value),
    }
}

impl Predictor for OnnxModel {
    fn score(&self, features: &[f32]) -> anyhow::Result<f32> {
        let input = Tensor::from_shape(&[1, self.n_features], features)?;
        let outputs = self.model.run(tvec!(input.into()))?;
        select_score(self.classification, &outputs)
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            format: "onnx".to_string(),
            input_shape: vec![1, self.n_features],
            source: self.source.clone(),
        }
    }
}

/// Load the artifact at `path` for `schema`, choosing the loader by file
/// extension.
pub fn load_model(path: &Path, schema: &Schema) -> anyhow::Result<Arc<dyn Predictor>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let model: Arc<dyn Predictor> = match ext.as_deref() {
        Some("onnx") => {
            let model = OnnxModel::load(path, schema.fields.len(), schema.task)
                .map_err(|e| anyhow!("loading ONNX model {}: {}", path.display(), e))?;
            Arc::new(model)
        }
        Some("json") => {
            let model = LinearModel::load(path)?;
            let expected = schema.feature_names();
            if model.features != expected {
                bail!(
                    "{} was trained on {:?}, the {} schema expects {:?}",
                    path.display(),
                    model.features,
                    schema.name,
                    expected
                );
            }
            Arc::new(model)
        }
        _ => bail!("unsupported model artifact: {}", path.display()),
    };

    info!("Loaded {} model from {}", schema.name, path.display());
    Ok(model)
}
