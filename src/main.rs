use anyhow::Context;
use asset_filters::{
    CallOp, CompilerConfig, DocumentCompiler, Field, FieldMap, FilterNode, Member, OutputShape,
    ProjectionCompiler, RelationalCompiler, SortCompiler, TableName,
};
use chrono::{DateTime, TimeZone, Utc};
use sea_query::{Asterisk, PostgresQueryBuilder, Query};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "filter_config.json";

struct Asset {
    id: i64,
    name: String,
    serial: Option<String>,
    cost: f64,
    location: Option<String>,
    active: bool,
    acquired: DateTime<Utc>,
}

#[derive(Default)]
struct AssetRow {
    name: String,
    location: Option<String>,
    cost: f64,
}

fn asset_fields() -> anyhow::Result<FieldMap<Asset>> {
    Ok(FieldMap::new()
        .with(Field::new("id", |a: &Asset| a.id).property("_id"))?
        .with(Field::new("name", |a: &Asset| a.name.clone()).stored_as("name"))?
        .with(
            Field::new("serialNumber", |a: &Asset| a.serial.clone())
                .column("serial_number")
                .property("serialNumber"),
        )?
        .with(Field::new("cost", |a: &Asset| a.cost).stored_as("cost"))?
        .with(Field::new("location", |a: &Asset| a.location.clone()).stored_as("location"))?
        .with(Field::new("active", |a: &Asset| a.active).stored_as("active"))?
        .with(
            Field::new("acquiredAt", |a: &Asset| a.acquired)
                .column("acquired_at")
                .property("acquiredAt"),
        )?)
}

fn asset_row_shape() -> anyhow::Result<OutputShape<AssetRow>> {
    Ok(OutputShape::new()
        .with(Member::new("name", |r: &mut AssetRow, v: String| r.name = v))?
        .with(Member::new("location", |r: &mut AssetRow, v: Option<String>| r.location = v))?
        .with(Member::new("cost", |r: &mut AssetRow, v: f64| r.cost = v))?)
}

/// 加载编译器配置，失败时使用默认配置
fn load_config() -> CompilerConfig {
    match CompilerConfig::from_json_file(CONFIG_PATH) {
        Ok(config) => {
            info!(path = CONFIG_PATH, "loaded compiler configuration");
            config
        }
        Err(e) => {
            warn!(error = %e, "falling back to default compiler configuration");
            CompilerConfig::default()
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("--- Asset Filters: 过滤条件编译演示 ---");
    let config = load_config();
    let fields = asset_fields()?;

    // active AND (location starts with "HQ" OR cost >= 1000) AND serialNumber in (...)
    let filter = FilterNode::and(
        FilterNode::and(
            FilterNode::field("active"),
            FilterNode::group(FilterNode::or(
                FilterNode::starts_with("location", "HQ"),
                FilterNode::gte("cost", 1000),
            )),
        ),
        FilterNode::list_call(CallOp::NotIn, "serialNumber", ["SN-0001", "SN-0002"])?,
    );
    println!("\n[过滤条件 AST]:\n{:#?}", filter);

    let predicate = RelationalCompiler::with_limits(config.limits.clone())
        .compile(&filter, &fields)
        .context("relational compilation failed")?;
    let sort = SortCompiler::with_limits(config.limits.clone())
        .compile("-acquiredAt,name", &fields)
        .context("sort compilation failed")?;
    let projection = ProjectionCompiler::new()
        .compile_param(Some("name,location,cost"), &fields, &asset_row_shape()?)
        .context("projection compilation failed")?;

    let mut select = Query::select();
    select
        .column(Asterisk)
        .from(TableName(config.table_name("Asset")))
        .and_where(predicate.to_condition());
    projection.apply_to(&mut select);
    sort.apply_to(&mut select);
    println!("\n[生成的 SQL]:\n{}", select.to_string(PostgresQueryBuilder));

    let document = DocumentCompiler::with_limits(config.limits.clone())
        .compile(&filter, &fields)
        .context("document compilation failed")?;
    println!("\n[集合]: {}", config.collection_name("Asset"));
    println!("[过滤文档]: {}", document);
    println!("[排序文档]: {}", sort.to_document()?);
    println!("[投影文档]: {}", projection.to_document()?);

    let mut assets = vec![
        Asset {
            id: 1,
            name: "Laptop".into(),
            serial: Some("SN-0001".into()),
            cost: 1800.0,
            location: Some("HQ-2".into()),
            active: true,
            acquired: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).single().context("invalid date")?,
        },
        Asset {
            id: 2,
            name: "Monitor".into(),
            serial: None,
            cost: 320.0,
            location: Some("hq-lobby".into()),
            active: true,
            acquired: Utc.with_ymd_and_hms(2024, 6, 12, 14, 30, 0).single().context("invalid date")?,
        },
        Asset {
            id: 3,
            name: "Server".into(),
            serial: Some("SN-0107".into()),
            cost: 12500.0,
            location: None,
            active: true,
            acquired: Utc.with_ymd_and_hms(2023, 11, 20, 8, 0, 0).single().context("invalid date")?,
        },
    ];
    sort.sort(&mut assets);

    println!("\n[内存中求值]:");
    for asset in assets.iter().filter(|a| predicate.matches(a)) {
        let row = projection.project(asset)?;
        println!(
            "  {} @ {} : {:.2}",
            row.name,
            row.location.as_deref().unwrap_or("-"),
            row.cost
        );
    }
    Ok(())
}
