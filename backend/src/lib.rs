//! Form-driven prediction API.
//!
//! One request pipeline (validate, build the feature record, infer, format)
//! parametrized over a [`schema::Schema`]: Titanic passenger survival or
//! house sale price.

pub mod config;
pub mod error;
pub mod inference;
pub mod models;
pub mod routes;
pub mod schema;
pub mod service;
pub mod training;
