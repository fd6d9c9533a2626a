//! Field schemas for the two prediction variants.
//!
//! A [`Schema`] fixes the request fields, their validation rules and the
//! feature order the model was trained on. The request pipeline is written
//! once against this description.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{PredictError, PredictResult};

/// How a raw request value is coerced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Integer,
    Real,
    /// Case-insensitive text restricted to the listed options. The option
    /// index is the feature encoding.
    Category(&'static [&'static str]),
}

/// Domain rule applied after coercion. Bounds are inclusive unless noted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rule {
    Any,
    OneOf(&'static [i64]),
    Between(f64, f64),
    AtLeast(f64),
    /// Strict lower bound.
    Above(f64),
}

impl Rule {
    fn admits(&self, value: f64) -> bool {
        match *self {
            Rule::Any => true,
            Rule::OneOf(set) => set.iter().any(|&v| v as f64 == value),
            Rule::Between(min, max) => (min..=max).contains(&value),
            Rule::AtLeast(min) => value >= min,
            Rule::Above(min) => value > min,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Key in the request body.
    pub key: &'static str,
    /// Column header in the training CSV.
    pub column: &'static str,
    pub kind: FieldKind,
    pub rule: Rule,
    /// Reported when the rule (or category membership) fails.
    pub message: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Task {
    Classification { target: &'static str, threshold: f32 },
    Regression { target: &'static str },
}

impl Task {
    pub fn target(&self) -> &'static str {
        match self {
            Task::Classification { target, .. } | Task::Regression { target } => target,
        }
    }
}

#[derive(Debug)]
pub struct Schema {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
    pub task: Task,
    /// Prefix for processing faults in the error envelope.
    pub error_prefix: &'static str,
}

pub static PASSENGER: Schema = Schema {
    name: "passenger",
    fields: &[
        FieldSpec {
            key: "pclass",
            column: "Pclass",
            kind: FieldKind::Integer,
            rule: Rule::OneOf(&[1, 2, 3]),
            message: "Invalid Class selection.",
        },
        FieldSpec {
            key: "sex",
            column: "Sex",
            kind: FieldKind::Category(&["male", "female"]),
            rule: Rule::Any,
            message: "Identity must be male or female.",
        },
        FieldSpec {
            key: "age",
            column: "Age",
            kind: FieldKind::Real,
            rule: Rule::Between(0.0, 100.0),
            message: "Age must be between 0 and 100.",
        },
        FieldSpec {
            key: "fare",
            column: "Fare",
            kind: FieldKind::Real,
            rule: Rule::AtLeast(0.0),
            message: "Fare cannot be negative.",
        },
        FieldSpec {
            key: "sibsp",
            column: "SibSp",
            kind: FieldKind::Integer,
            rule: Rule::Between(0.0, 10.0),
            message: "Sibling/Spouse count out of range.",
        },
    ],
    task: Task::Classification {
        target: "Survived",
        threshold: 0.5,
    },
    error_prefix: "Processing Error",
};

pub static DWELLING: Schema = Schema {
    name: "dwelling",
    fields: &[
        FieldSpec {
            key: "overall_qual",
            column: "OverallQual",
            kind: FieldKind::Integer,
            rule: Rule::Between(1.0, 10.0),
            message: "Overall quality must be between 1 and 10.",
        },
        FieldSpec {
            key: "gr_liv_area",
            column: "GrLivArea",
            kind: FieldKind::Real,
            rule: Rule::Above(0.0),
            message: "Living area must be greater than 0.",
        },
        FieldSpec {
            key: "total_bsmt_sf",
            column: "TotalBsmtSF",
            kind: FieldKind::Real,
            rule: Rule::AtLeast(0.0),
            message: "Basement area cannot be negative.",
        },
        FieldSpec {
            key: "garage_cars",
            column: "GarageCars",
            kind: FieldKind::Integer,
            rule: Rule::Between(0.0, 5.0),
            message: "Garage capacity must be between 0 and 5.",
        },
        FieldSpec {
            key: "year_built",
            column: "YearBuilt",
            kind: FieldKind::Integer,
            rule: Rule::Between(1800.0, 2026.0),
            message: "Year built must be between 1800 and 2026.",
        },
        FieldSpec {
            key: "full_bath",
            column: "FullBath",
            kind: FieldKind::Integer,
            rule: Rule::Any,
            message: "",
        },
    ],
    task: Task::Regression {
        target: "SalePrice",
    },
    error_prefix: "System Error",
};

impl Schema {
    pub fn by_name(name: &str) -> Option<&'static Schema> {
        match name.trim().to_ascii_lowercase().as_str() {
            "passenger" | "titanic" => Some(&PASSENGER),
            "dwelling" | "house" => Some(&DWELLING),
            _ => None,
        }
    }

    pub fn feature_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.key).collect()
    }

    /// Coerce and check every field in schema order, stopping at the first
    /// failure.
    pub fn validate(&'static self, body: &Map<String, Value>) -> PredictResult<ValidatedRecord> {
        let mut values = Vec::with_capacity(self.fields.len());
        for spec in self.fields {
            let value = coerce(spec, body.get(spec.key))?;
            check(spec, &value)?;
            values.push(value);
        }
        Ok(ValidatedRecord {
            schema: self,
            values,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Real(f64),
    Text(String),
}

fn coerce(spec: &FieldSpec, raw: Option<&Value>) -> PredictResult<FieldValue> {
    let raw = match raw {
        None | Some(Value::Null) => {
            return Err(PredictError::malformed(format!("missing field '{}'", spec.key)))
        }
        Some(v) => v,
    };

    match spec.kind {
        FieldKind::Integer => {
            let parsed = match raw {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            };
            parsed.map(FieldValue::Integer).ok_or_else(|| {
                PredictError::malformed(format!(
                    "field '{}' expects an integer, got {}",
                    spec.key, raw
                ))
            })
        }
        FieldKind::Real => {
            let parsed = match raw {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            match parsed {
                Some(f) if f.is_finite() => Ok(FieldValue::Real(f)),
                // NaN fails every bound, so it reads as the field's own violation.
                Some(f) if !spec.rule.admits(f) => Err(PredictError::Validation(spec.message.to_string())),
                Some(_) => Err(PredictError::malformed(format!(
                    "field '{}' must be a finite number",
                    spec.key
                ))),
                None => Err(PredictError::malformed(format!(
                    "field '{}' expects a number, got {}",
                    spec.key, raw
                ))),
            }
        }
        FieldKind::Category(_) => match raw {
            Value::String(s) => Ok(FieldValue::Text(s.trim().to_lowercase())),
            other => Err(PredictError::malformed(format!(
                "field '{}' expects text, got {}",
                spec.key, other
            ))),
        },
    }
}

fn check(spec: &FieldSpec, value: &FieldValue) -> PredictResult<()> {
    let ok = match (spec.kind, value) {
        (FieldKind::Category(options), FieldValue::Text(s)) => options.contains(&s.as_str()),
        (_, FieldValue::Integer(i)) => spec.rule.admits(*i as f64),
        (_, FieldValue::Real(f)) => spec.rule.admits(*f),
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(PredictError::Validation(spec.message.to_string()))
    }
}

/// A request that passed validation. Values are in schema order.
#[derive(Debug, Clone)]
pub struct ValidatedRecord {
    schema: &'static Schema,
    values: Vec<FieldValue>,
}

impl ValidatedRecord {
    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    /// Feature vector in training order.
    pub fn features(&self) -> Vec<f32> {
        self.schema
            .fields
            .iter()
            .zip(&self.values)
            .map(|(spec, value)| match (spec.kind, value) {
                (FieldKind::Category(options), FieldValue::Text(s)) => {
                    options.iter().position(|o| o == s).unwrap_or_default() as f32
                }
                (_, FieldValue::Integer(i)) => *i as f32,
                (_, FieldValue::Real(f)) => *f as f32,
                _ => 0.0,
            })
            .collect()
    }

    /// Validated fields keyed by request name, in schema order.
    pub fn echo(&self) -> Map<String, Value> {
        self.schema
            .fields
            .iter()
            .zip(&self.values)
            .map(|(spec, value)| {
                let json = match value {
                    FieldValue::Integer(i) => Value::from(*i),
                    FieldValue::Real(f) => Value::from(*f),
                    FieldValue::Text(s) => Value::from(s.clone()),
                };
                (spec.key.to_string(), json)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn passenger() -> Map<String, Value> {
        body(json!({"pclass": 1, "sex": "female", "age": 29.0, "fare": 100.0, "sibsp": 0}))
    }

    fn dwelling() -> Map<String, Value> {
        body(json!({
            "overall_qual": 5, "gr_liv_area": 1500, "total_bsmt_sf": 800,
            "garage_cars": 2, "year_built": 2005, "full_bath": 2
        }))
    }

    fn rejection(schema: &'static Schema, b: &Map<String, Value>) -> PredictError {
        schema.validate(b).unwrap_err()
    }

    #[test]
    fn accepts_valid_passenger() {
        let record = PASSENGER.validate(&passenger()).unwrap();
        assert_eq!(record.features(), vec![1.0, 1.0, 29.0, 100.0, 0.0]);
    }

    #[test]
    fn sex_is_case_insensitive_and_encoded_by_position() {
        let mut b = passenger();
        b.insert("sex".into(), json!(" MALE "));
        let record = PASSENGER.validate(&b).unwrap();
        assert_eq!(record.features()[1], 0.0);
    }

    #[test]
    fn class_outside_set_is_rejected_first() {
        let mut b = passenger();
        b.insert("pclass".into(), json!(4));
        b.insert("age".into(), json!(150));
        b.remove("sibsp");
        assert_eq!(
            rejection(&PASSENGER, &b),
            PredictError::Validation("Invalid Class selection.".into())
        );
    }

    #[test]
    fn passenger_bounds() {
        let cases = [
            ("sex", json!("other"), "Identity must be male or female."),
            ("age", json!(150), "Age must be between 0 and 100."),
            ("age", json!(-0.5), "Age must be between 0 and 100."),
            ("fare", json!(-1), "Fare cannot be negative."),
            ("sibsp", json!(11), "Sibling/Spouse count out of range."),
        ];
        for (key, value, message) in cases {
            let mut b = passenger();
            b.insert(key.into(), value);
            assert_eq!(rejection(&PASSENGER, &b), PredictError::Validation(message.into()));
        }
    }

    #[test]
    fn inclusive_edges_pass() {
        let b = body(json!({"pclass": 3, "sex": "male", "age": 100, "fare": 0, "sibsp": 10}));
        assert!(PASSENGER.validate(&b).is_ok());
        let b = body(json!({"pclass": 2, "sex": "male", "age": 0, "fare": 0.0, "sibsp": 0}));
        assert!(PASSENGER.validate(&b).is_ok());
    }

    #[test]
    fn strings_are_coerced_like_form_values() {
        let b = body(json!({"pclass": "2", "sex": "female", "age": "30.5", "fare": "7.25", "sibsp": "1"}));
        let record = PASSENGER.validate(&b).unwrap();
        assert_eq!(record.features(), vec![2.0, 1.0, 30.5, 7.25, 1.0]);
    }

    #[test]
    fn fractional_integers_truncate() {
        let mut b = passenger();
        b.insert("pclass".into(), json!(2.9));
        assert_eq!(PASSENGER.validate(&b).unwrap().features()[0], 2.0);
    }

    #[test]
    fn missing_and_mistyped_fields_are_malformed() {
        let mut b = passenger();
        b.remove("pclass");
        assert_eq!(
            rejection(&PASSENGER, &b),
            PredictError::malformed("missing field 'pclass'")
        );

        let mut b = passenger();
        b.insert("age".into(), json!("old"));
        assert!(matches!(rejection(&PASSENGER, &b), PredictError::Malformed(_)));

        let mut b = passenger();
        b.insert("sex".into(), json!(1));
        assert!(matches!(rejection(&PASSENGER, &b), PredictError::Malformed(_)));

        let mut b = passenger();
        b.insert("sibsp".into(), json!("1.5"));
        assert!(matches!(rejection(&PASSENGER, &b), PredictError::Malformed(_)));

        let mut b = passenger();
        b.insert("fare".into(), json!("inf"));
        assert!(matches!(rejection(&PASSENGER, &b), PredictError::Malformed(_)));
    }

    #[test]
    fn non_finite_values_report_the_field_rule() {
        let cases = [
            ("age", json!("nan"), "Age must be between 0 and 100."),
            ("age", json!("inf"), "Age must be between 0 and 100."),
            ("fare", json!("NaN"), "Fare cannot be negative."),
            ("fare", json!("-inf"), "Fare cannot be negative."),
        ];
        for (key, value, message) in cases {
            let mut b = passenger();
            b.insert(key.into(), value);
            assert_eq!(rejection(&PASSENGER, &b), PredictError::Validation(message.into()));
        }
    }

    #[test]
    fn dwelling_quality_bounds() {
        for q in [0, 11] {
            let mut b = dwelling();
            b.insert("overall_qual".into(), json!(q));
            assert_eq!(
                rejection(&DWELLING, &b),
                PredictError::Validation("Overall quality must be between 1 and 10.".into())
            );
        }
    }

    #[test]
    fn dwelling_bounds() {
        let cases = [
            ("gr_liv_area", json!(0), "Living area must be greater than 0."),
            ("total_bsmt_sf", json!(-1), "Basement area cannot be negative."),
            ("garage_cars", json!(6), "Garage capacity must be between 0 and 5."),
            ("year_built", json!(1799), "Year built must be between 1800 and 2026."),
            ("year_built", json!(2027), "Year built must be between 1800 and 2026."),
        ];
        for (key, value, message) in cases {
            let mut b = dwelling();
            b.insert(key.into(), value);
            assert_eq!(rejection(&DWELLING, &b), PredictError::Validation(message.into()));
        }
    }

    #[test]
    fn full_bath_passes_through() {
        let mut b = dwelling();
        b.insert("full_bath".into(), json!(-3));
        let record = DWELLING.validate(&b).unwrap();
        assert_eq!(record.features()[5], -3.0);
    }

    #[test]
    fn echo_keeps_schema_order() {
        let record = DWELLING.validate(&dwelling()).unwrap();
        let keys: Vec<_> = record.echo().keys().cloned().collect();
        assert_eq!(keys, DWELLING.feature_names());
        assert_eq!(record.echo()["gr_liv_area"], json!(1500.0));
        assert_eq!(record.echo()["garage_cars"], json!(2));
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(Schema::by_name("Passenger").map(|s| s.name), Some("passenger"));
        assert_eq!(Schema::by_name("house").map(|s| s.name), Some("dwelling"));
        assert!(Schema::by_name("wine").is_none());
    }
}
