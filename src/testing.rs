//! Shared fixtures for unit tests.

use chrono::NaiveDate;
use std::sync::Arc;

use crate::config::QueryModelConfig;
use crate::db::{CellValue, MemoryStore, RawRow};
use crate::model::Snapshot;

pub(crate) const SAMPLE_MODEL: &str = include_str!("../demos/model.toml");

pub(crate) fn sample_config() -> QueryModelConfig {
    QueryModelConfig::from_toml(SAMPLE_MODEL).unwrap()
}

pub(crate) fn sample_snapshot() -> Arc<Snapshot> {
    Arc::new(Snapshot::build(&sample_config(), 1).unwrap())
}

fn date(y: i32, m: u32, d: u32) -> CellValue {
    CellValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

fn customer(
    name: &str,
    city: &str,
    age: i32,
    balance: f64,
    joined_on: CellValue,
    active: bool,
    tier: &str,
) -> RawRow {
    RawRow::new()
        .with("name", CellValue::Text(name.into()))
        .with("city", CellValue::Text(city.into()))
        .with("age", CellValue::Int32(age))
        .with("balance", CellValue::Float64(balance))
        .with("joined_on", joined_on)
        .with("active", CellValue::Bool(active))
        .with("tier", CellValue::Text(tier.into()))
}

pub(crate) fn customer_rows() -> Vec<RawRow> {
    vec![
        customer("Ada", "Springfield", 34, 1200.0, date(2016, 3, 1), true, "gold"),
        customer("Bo", "Palm springs", 41, 80.25, date(2019, 7, 15), false, "silver"),
        customer("Cy", "Oslo", 22, -20.5, CellValue::Null, true, "bronze"),
        customer("Dee", "Coldspring", 58, 300.0, date(2021, 11, 30), true, "silver"),
        customer("Ed", "Bergen", 19, 0.0, date(2015, 1, 2), false, "gold"),
    ]
}

pub(crate) fn order_rows() -> Vec<RawRow> {
    let order = |id: i64, status: &str, total: f64, placed_at: CellValue| {
        RawRow::new()
            .with("id", CellValue::Int64(id))
            .with("status", CellValue::Text(status.into()))
            .with("total", CellValue::Float64(total))
            .with("placed_at", placed_at)
    };
    vec![
        order(1, "open", 19.99, date(2024, 1, 30)),
        order(2, "shipped", 250.0, date(2024, 2, 14)),
        order(3, "cancelled", 5.5, date(2023, 12, 24)),
    ]
}

pub(crate) fn sample_store() -> MemoryStore {
    MemoryStore::new()
        .with_table("customers", customer_rows())
        .with_table("sales.orders", order_rows())
}
