//! Shared asset fixtures and a small in-memory document matcher for the
//! integration tests.

#![allow(dead_code)]

use asset_filters::{Capabilities, Field, FieldMap, Member, OutputShape};
use chrono::{DateTime, TimeZone, Utc};
use regex::RegexBuilder;
use serde_json::{Map, Value as Json};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub id: i64,
    pub name: String,
    pub serial: Option<String>,
    pub cost: f64,
    pub quantity: i64,
    pub location: Option<String>,
    pub active: bool,
    pub acquired: DateTime<Utc>,
    pub notes: String,
}

/// Projection target exposing a subset of `Asset`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AssetCard {
    pub id: i64,
    pub name: String,
    pub location: Option<String>,
    pub cost: f64,
    pub quantity: Option<f64>,
}

pub fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

/// Field map with a document property for every field except `notes`.
pub fn asset_fields() -> FieldMap<Asset> {
    FieldMap::new()
        .with(Field::new("id", |a: &Asset| a.id).property("_id"))
        .unwrap()
        .with(Field::new("name", |a: &Asset| a.name.clone()).stored_as("name"))
        .unwrap()
        .with(
            Field::new("serialNumber", |a: &Asset| a.serial.clone())
                .column("serial_number")
                .property("serialNumber"),
        )
        .unwrap()
        .with(Field::new("cost", |a: &Asset| a.cost).stored_as("cost"))
        .unwrap()
        .with(
            Field::new("quantity", |a: &Asset| a.quantity)
                .column("qty")
                .property("qty"),
        )
        .unwrap()
        .with(Field::new("location", |a: &Asset| a.location.clone()).stored_as("location"))
        .unwrap()
        .with(Field::new("active", |a: &Asset| a.active).stored_as("active"))
        .unwrap()
        .with(
            Field::new("acquiredAt", |a: &Asset| a.acquired)
                .column("acquired_at")
                .property("acquiredAt"),
        )
        .unwrap()
        .with(
            Field::new("notes", |a: &Asset| a.notes.clone())
                .capabilities(Capabilities::FILTER),
        )
        .unwrap()
}

pub fn asset_card_shape() -> OutputShape<AssetCard> {
    OutputShape::new()
        .with(Member::new("id", |c: &mut AssetCard, v: i64| c.id = v))
        .unwrap()
        .with(Member::new("name", |c: &mut AssetCard, v: String| c.name = v))
        .unwrap()
        .with(Member::new("location", |c: &mut AssetCard, v: Option<String>| c.location = v))
        .unwrap()
        .with(Member::new("cost", |c: &mut AssetCard, v: f64| c.cost = v))
        .unwrap()
        .with(Member::new("quantity", |c: &mut AssetCard, v: Option<f64>| c.quantity = v))
        .unwrap()
}

#[allow(clippy::too_many_arguments)]
fn asset(
    id: i64,
    name: &str,
    serial: Option<&str>,
    cost: f64,
    quantity: i64,
    location: Option<&str>,
    active: bool,
    acquired: DateTime<Utc>,
) -> Asset {
    Asset {
        id,
        name: name.to_string(),
        serial: serial.map(str::to_string),
        cost,
        quantity,
        location: location.map(str::to_string),
        active,
        acquired,
        notes: String::new(),
    }
}

pub fn sample_assets() -> Vec<Asset> {
    vec![
        asset(1, "Laptop Pro 14", Some("SN-0001"), 1899.0, 3, Some("HQ-2"), true, date(2024, 3, 1)),
        asset(2, "Monitor 27\"", None, 329.5, 12, Some("hq-lobby"), true, date(2024, 6, 12)),
        asset(3, "Rack Server", Some("SN-0107"), 12500.0, 1, None, true, date(2023, 11, 20)),
        asset(4, "Cable (USB-C) 2.0", None, 9.99, 240, Some("Warehouse"), true, date(2022, 1, 5)),
        asset(5, "Label printer", Some("LP.44*"), 210.0, 2, Some("Branch [East]"), false, date(2021, 8, 30)),
        asset(6, "Desk lamp", Some("sn-0002"), 45.0, 0, None, false, date(2024, 6, 12)),
        asset(7, "50% Off Chair", None, 1000.0, 7, Some("HQ-3"), true, date(2020, 2, 29)),
        asset(8, "laptop stand", Some("SN-0099"), 59.0, 15, Some("hq-2"), false, date(2025, 1, 1)),
    ]
}

/// The store-side document for `asset`; null properties are left out.
pub fn asset_document(asset: &Asset, fields: &FieldMap<Asset>) -> Map<String, Json> {
    let mut doc = Map::new();
    for field in fields.iter() {
        let Some(property) = field.property_name() else {
            continue;
        };
        let value = field.read(asset);
        if !value.is_null() {
            doc.insert(property.to_string(), value.to_json());
        }
    }
    doc
}

/// Ids of the assets a filter document selects.
pub fn document_ids(filter: &Json, assets: &[Asset], fields: &FieldMap<Asset>) -> Vec<i64> {
    assets
        .iter()
        .filter(|a| matches_document(&asset_document(a, fields), filter))
        .map(|a| a.id)
        .collect()
}

/// Evaluates a filter document the way the document store would for the
/// operators the document compiler emits. A missing property reads as null.
pub fn matches_document(doc: &Map<String, Json>, filter: &Json) -> bool {
    let Json::Object(clauses) = filter else {
        panic!("filter must be an object: {filter}");
    };
    clauses.iter().all(|(key, condition)| match key.as_str() {
        "$and" => as_array(condition).iter().all(|f| matches_document(doc, f)),
        "$or" => as_array(condition).iter().any(|f| matches_document(doc, f)),
        "$nor" => !as_array(condition).iter().any(|f| matches_document(doc, f)),
        "$expr" => condition.as_bool().expect("$expr takes a constant"),
        property => matches_condition(doc.get(property).unwrap_or(&Json::Null), condition),
    })
}

fn matches_condition(value: &Json, condition: &Json) -> bool {
    let Json::Object(operators) = condition else {
        return json_eq(value, condition);
    };
    operators.iter().all(|(op, operand)| match op.as_str() {
        "$eq" => json_eq(value, operand),
        "$ne" => !json_eq(value, operand),
        "$gt" => json_cmp(value, operand) == Some(Ordering::Greater),
        "$gte" => matches!(json_cmp(value, operand), Some(Ordering::Greater | Ordering::Equal)),
        "$lt" => json_cmp(value, operand) == Some(Ordering::Less),
        "$lte" => matches!(json_cmp(value, operand), Some(Ordering::Less | Ordering::Equal)),
        "$in" => as_array(operand).iter().any(|v| json_eq(value, v)),
        "$nin" => !as_array(operand).iter().any(|v| json_eq(value, v)),
        "$regex" => {
            let options = operators.get("$options").and_then(Json::as_str).unwrap_or("");
            let regex = RegexBuilder::new(operand.as_str().expect("$regex takes a string"))
                .case_insensitive(options.contains('i'))
                .build()
                .expect("compiled pattern must be a valid regex");
            value.as_str().is_some_and(|s| regex.is_match(s))
        }
        "$options" => true,
        "$not" => !matches_condition(value, operand),
        other => panic!("unsupported operator {other}"),
    })
}

fn as_array(value: &Json) -> &Vec<Json> {
    value.as_array().expect("expected an array operand")
}

fn as_date(value: &Json) -> Option<DateTime<Utc>> {
    let text = value.get("$date")?.as_str()?;
    DateTime::parse_from_rfc3339(text).ok().map(|d| d.with_timezone(&Utc))
}

fn json_eq(a: &Json, b: &Json) -> bool {
    match (a, b) {
        (Json::Number(_), Json::Number(_)) => json_cmp(a, b) == Some(Ordering::Equal),
        (Json::Object(_), Json::Object(_)) => match (as_date(a), as_date(b)) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        _ => a == b,
    }
}

fn json_cmp(a: &Json, b: &Json) -> Option<Ordering> {
    match (a, b) {
        (Json::Number(x), Json::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Json::String(x), Json::String(y)) => Some(x.cmp(y)),
        (Json::Object(_), Json::Object(_)) => Some(as_date(a)?.cmp(&as_date(b)?)),
        _ => None,
    }
}
