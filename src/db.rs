use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, error, info};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Executor, MySqlPool, Row, Statement, TypeInfo};

use crate::config::DbTarget;
use crate::models::HeadlineMetrics;
use crate::queries;
use crate::table::{Table, Value};

pub async fn connect(target: &DbTarget) -> anyhow::Result<MySqlPool> {
    let options = MySqlConnectOptions::new()
        .host(&target.host)
        .port(target.port)
        .username(&target.user)
        .password(&target.password)
        .database(&target.database);

    let pool = MySqlPoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("failed to connect to MySQL at {}", target.redacted()))?;
    debug!("connected to {}", target.redacted());
    Ok(pool)
}

/// Opens a connection and runs a trivial query, logging the outcome.
pub async fn check_connection(target: &DbTarget) -> anyhow::Result<()> {
    let outcome = async {
        let pool = connect(target).await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        pool.close().await;
        anyhow::Ok(())
    }
    .await;

    match &outcome {
        Ok(()) => info!("connection to {} succeeded", target.redacted()),
        Err(err) => error!("connection to {} failed: {err:#}", target.redacted()),
    }
    outcome
}

async fn fetch_count(pool: &MySqlPool, sql: &str) -> anyhow::Result<i64> {
    sqlx::query_scalar::<_, i64>(sql)
        .fetch_one(pool)
        .await
        .with_context(|| format!("count query failed: {}", sql.trim()))
}

pub async fn fetch_headline_metrics(pool: &MySqlPool) -> anyhow::Result<HeadlineMetrics> {
    Ok(HeadlineMetrics {
        logins: fetch_count(pool, queries::TOTAL_LOGINS).await?,
        onboardings: fetch_count(pool, queries::TOTAL_ONBOARDINGS).await?,
        active_students: fetch_count(pool, queries::TOTAL_ACTIVE_STUDENTS).await?,
        diagnostics: fetch_count(pool, queries::TOTAL_DIAGNOSTICS).await?,
        classes: fetch_count(pool, queries::TOTAL_CLASSES).await?,
        classes_with_multiple_assessments: fetch_count(
            pool,
            queries::CLASSES_WITH_MULTIPLE_ASSESSMENTS,
        )
        .await?,
        students_with_evolution: fetch_count(pool, queries::STUDENTS_WITH_EVOLUTION).await?,
        teachers_with_multiple_classes: fetch_count(pool, queries::TEACHERS_WITH_MULTIPLE_CLASSES)
            .await?,
    })
}

/// Runs one fixed page query and loads every column into a [`Table`].
pub async fn fetch_table(
    pool: &MySqlPool,
    template: &str,
    excluded_auth_ids: &[String],
) -> anyhow::Result<Table> {
    let bound: &[String] = if queries::needs_exclusions(template) {
        excluded_auth_ids
    } else {
        &[]
    };
    let sql = queries::render(template, bound.len());

    let statement = pool
        .prepare(sql.as_str())
        .await
        .context("failed to prepare report query")?;
    let mut table = Table::new(statement.columns().iter().map(|column| column.name()));

    let mut query = statement.query();
    for id in bound {
        query = query.bind(id.as_str());
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("report query failed")?;

    for row in rows.iter() {
        let cells = (0..row.columns().len())
            .map(|index| decode_cell(row, index))
            .collect::<anyhow::Result<Vec<_>>>()?;
        table.push_row(cells)?;
    }

    info!(
        "loaded {} rows across {} columns",
        table.len(),
        table.columns().len()
    );
    Ok(table)
}

fn decode_cell(row: &MySqlRow, index: usize) -> anyhow::Result<Value> {
    let column = &row.columns()[index];
    let type_name = column.type_info().name();
    let base = type_name.trim_end_matches(" UNSIGNED");

    let value: Value = match base {
        "BOOLEAN" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            row.try_get_unchecked::<Option<i64>, _>(index)?.into()
        }
        "DOUBLE" => row.try_get::<Option<f64>, _>(index)?.into(),
        "FLOAT" => row
            .try_get::<Option<f32>, _>(index)?
            .map(f64::from)
            .into(),
        "DECIMAL" => match raw_text(row, index)? {
            Some(raw) => raw
                .parse::<f64>()
                .map(Value::Float)
                .with_context(|| format!("`{}` is not a decimal: {raw}", column.name()))?,
            None => Value::Null,
        },
        "DATETIME" | "TIMESTAMP" => row.try_get::<Option<NaiveDateTime>, _>(index)?.into(),
        "DATE" => row.try_get::<Option<NaiveDate>, _>(index)?.into(),
        _ => raw_text(row, index)?.into(),
    };
    Ok(value)
}

fn raw_text(row: &MySqlRow, index: usize) -> anyhow::Result<Option<String>> {
    let bytes = row.try_get_unchecked::<Option<Vec<u8>>, _>(index)?;
    Ok(bytes.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
}
