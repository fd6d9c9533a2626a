//! One-shot fallback trainer, used when no model artifact exists at startup.
//!
//! Reads the schema's columns from a CSV file, imputes missing numeric cells
//! with the column median, standardizes, and fits a linear model by
//! full-batch gradient descent. The result is deterministic for a given file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use log::{debug, info};

use crate::inference::{LinearKind, LinearModel};
use crate::schema::{FieldKind, Schema, Task};

const EPOCHS: usize = 2_000;
const LEARNING_RATE: f32 = 0.1;
const L2: f32 = 1e-3;

/// Feature matrix plus target, rows aligned.
#[derive(Debug, Default)]
struct Dataset {
    rows: Vec<Vec<f32>>,
    targets: Vec<f32>,
}

pub fn train_from_csv<P: AsRef<Path>>(path: P, schema: &Schema) -> anyhow::Result<LinearModel> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let dataset = read_dataset(BufReader::new(file), schema)
        .with_context(|| format!("reading {}", path.display()))?;
    info!(
        "Training {} model on {} rows from {}",
        schema.name,
        dataset.rows.len(),
        path.display()
    );
    fit(&dataset, schema)
}

fn is_missing(cell: &str) -> bool {
    let cell = cell.trim();
    cell.is_empty() || cell.eq_ignore_ascii_case("na") || cell.eq_ignore_ascii_case("nan")
}

fn read_dataset<R: Read>(reader: R, schema: &Schema) -> anyhow::Result<Dataset> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| anyhow!("column '{}' not found", name))
    };

    let feature_idx = schema
        .fields
        .iter()
        .map(|f| column(f.column))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let target_idx = column(schema.task.target())?;

    // Cells are collected with NaN standing in for gaps, then imputed.
    let mut dataset = Dataset::default();
    let mut skipped = 0usize;
    'records: for record in reader.records() {
        let record = record?;
        let target = match record.get(target_idx).map(str::trim) {
            Some(t) if !is_missing(t) => match t.parse::<f32>() {
                Ok(v) => v,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            },
            _ => {
                skipped += 1;
                continue;
            }
        };

        let mut row = Vec::with_capacity(feature_idx.len());
        for (spec, &idx) in schema.fields.iter().zip(&feature_idx) {
            let cell = record.get(idx).unwrap_or_default().trim();
            let value = match spec.kind {
                FieldKind::Category(options) => {
                    let lowered = cell.to_lowercase();
                    match options.iter().position(|o| *o == lowered) {
                        Some(i) => i as f32,
                        None => {
                            skipped += 1;
                            continue 'records;
                        }
                    }
                }
                _ if is_missing(cell) => f32::NAN,
                _ => match cell.parse::<f32>() {
                    Ok(v) => v,
                    Err(_) => f32::NAN,
                },
            };
            row.push(value);
        }
        dataset.rows.push(row);
        dataset.targets.push(target);
    }

    if skipped > 0 {
        debug!("Skipped {} rows with unusable target or category", skipped);
    }
    if dataset.rows.is_empty() {
        bail!("no usable rows");
    }

    impute_medians(&mut dataset.rows);
    Ok(dataset)
}

fn median(mut values: Vec<f32>) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

fn impute_medians(rows: &mut [Vec<f32>]) {
    let width = rows.first().map(Vec::len).unwrap_or_default();
    for col in 0..width {
        let present: Vec<f32> = rows.iter().map(|r| r[col]).filter(|v| !v.is_nan()).collect();
        let fill = median(present);
        for row in rows.iter_mut() {
            if row[col].is_nan() {
                row[col] = fill;
            }
        }
    }
}

fn mean_and_scale(values: impl Iterator<Item = f32> + Clone) -> (f32, f32) {
    let n = values.clone().count().max(1) as f32;
    let mean = values.clone().sum::<f32>() / n;
    let var = values.map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    let std = var.sqrt();
    // Constant columns keep a unit scale so they contribute nothing.
    (mean, if std > f32::EPSILON { std } else { 1.0 })
}

fn fit(dataset: &Dataset, schema: &Schema) -> anyhow::Result<LinearModel> {
    let width = schema.fields.len();
    let n = dataset.rows.len() as f32;

    let (means, scales): (Vec<f32>, Vec<f32>) = (0..width)
        .map(|col| mean_and_scale(dataset.rows.iter().map(move |r| r[col])))
        .unzip();

    let standardized: Vec<Vec<f32>> = dataset
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .zip(means.iter().zip(&scales))
                .map(|(x, (m, s))| (x - m) / s)
                .collect()
        })
        .collect();

    let (kind, target_mean, target_scale) = match schema.task {
        Task::Classification { .. } => (LinearKind::Logistic, 0.0, 1.0),
        Task::Regression { .. } => {
            let (m, s) = mean_and_scale(dataset.targets.iter().copied());
            (LinearKind::Linear, m, s)
        }
    };
    let targets: Vec<f32> = dataset
        .targets
        .iter()
        .map(|y| (y - target_mean) / target_scale)
        .collect();

    let mut weights = vec![0.0f32; width];
    let mut bias = 0.0f32;
    for _ in 0..EPOCHS {
        let mut grad_w = vec![0.0f32; width];
        let mut grad_b = 0.0f32;
        for (x, y) in standardized.iter().zip(&targets) {
            let z = bias + x.iter().zip(&weights).map(|(a, w)| a * w).sum::<f32>();
            let prediction = match kind {
                LinearKind::Logistic => 1.0 / (1.0 + (-z).exp()),
                LinearKind::Linear => z,
            };
            let residual = prediction - y;
            for (g, a) in grad_w.iter_mut().zip(x) {
                *g += residual * a;
            }
            grad_b += residual;
        }
        for (w, g) in weights.iter_mut().zip(&grad_w) {
            *w -= LEARNING_RATE * (g / n + L2 * *w);
        }
        bias -= LEARNING_RATE * grad_b / n;
    }

    if weights.iter().any(|w| !w.is_finite()) || !bias.is_finite() {
        bail!("training diverged");
    }

    let features = schema.feature_names().iter().map(|s| s.to_string()).collect();
    Ok(LinearModel::new(kind, features, means, scales, weights, bias)
        .with_target_scaling(target_mean, target_scale))
}
