use std::fmt::Write;

use anyhow::Context;
use clap::ValueEnum;
use log::info;

use crate::filter::{self, FilterConfig};
use crate::models::{AssessmentEvent, HeadlineMetrics, Metric, Series};
use crate::progression::{self, Hypothesis};
use crate::queries;
use crate::table::{Crosstab, Table, Value};

const MICRODATA_PREVIEW: usize = 20;
const IMPROVEMENT_TARGET_PERCENT: f64 = 50.0;
const TOP_STATES: usize = 5;

const ANSWERED_ALL: &str = "Respondeu todas";
const ANSWERED_SOME: &str = "Não respondeu todas";
const ONBOARDING_COMPLETE: &str = "Onboarding Completo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Page {
    /// Platform totals and the students-by-class microdata
    Overview,
    /// Onboarding questionnaire answers
    Onboarding,
    /// Teacher, class and student registrations
    Teachers,
    /// Classes with students moving up a hypothesis
    ClassImprovement,
    /// Ranked hypotheses and progression funnel
    Hypotheses,
}

impl Page {
    pub fn query(self) -> &'static str {
        match self {
            Page::Overview => queries::STUDENTS_BY_CLASS,
            Page::Onboarding => queries::ONBOARDING_ANSWERS,
            Page::Teachers => queries::TEACHER_ROSTER,
            Page::ClassImprovement => queries::CLASS_IMPROVEMENT,
            Page::Hypotheses => queries::RANKED_HYPOTHESES,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Page::Overview => "Dashboard da Sondagem Diagnóstica",
            Page::Onboarding => "Dados do Onboarding dos Professores",
            Page::Teachers => "Dados de Professores",
            Page::ClassImprovement => "Dados de evidência de aprendizagem",
            Page::Hypotheses => "Hipóteses da evidência de aprendizagem",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DisplayMode {
    /// Metrics, series and a microdata preview
    Markdown,
    /// The filtered microdata only
    Csv,
}

/// Everything one page shows, before rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct PageReport {
    pub page: Page,
    pub metrics: Vec<Metric>,
    pub series: Vec<Series>,
    pub tables: Vec<(String, Table)>,
    pub microdata: Table,
}

/// Filters the page's table and renders it in `mode`.
pub fn build_report(
    page: Page,
    table: &Table,
    filters: &FilterConfig,
    mode: DisplayMode,
    headline: Option<&HeadlineMetrics>,
) -> anyhow::Result<String> {
    let source = if filters.enabled {
        filter::prepare(table)
    } else {
        table.clone()
    };
    let filtered = filter::apply_filters(&source, filters)
        .with_context(|| format!("invalid filters for the {page:?} page"))?;
    info!(
        "{page:?} page: {} of {} rows after filtering",
        filtered.len(),
        table.len()
    );

    match mode {
        DisplayMode::Markdown => {
            let report = summarize_page(page, filtered, headline)?;
            Ok(render_markdown(&report))
        }
        DisplayMode::Csv => render_csv(&filtered),
    }
}

pub fn summarize_page(
    page: Page,
    table: Table,
    headline: Option<&HeadlineMetrics>,
) -> anyhow::Result<PageReport> {
    let mut report = PageReport {
        page,
        metrics: Vec::new(),
        series: Vec::new(),
        tables: Vec::new(),
        microdata: Table::default(),
    };

    match page {
        Page::Overview => summarize_overview(&mut report, &table, headline)?,
        Page::Onboarding => summarize_onboarding(&mut report, &table)?,
        Page::Teachers => summarize_teachers(&mut report, &table)?,
        Page::ClassImprovement => summarize_class_improvement(&mut report, &table)?,
        Page::Hypotheses => summarize_hypotheses(&mut report, &table)?,
    }

    report.microdata = table;
    Ok(report)
}

fn summarize_overview(
    report: &mut PageReport,
    table: &Table,
    headline: Option<&HeadlineMetrics>,
) -> anyhow::Result<()> {
    if let Some(headline) = headline {
        report.metrics.extend([
            Metric::new("Quantidade de Logins", headline.logins),
            Metric::new("Quantidade de Onboardings", headline.onboardings),
            Metric::new("Quantidade de Sondagens", headline.diagnostics),
            Metric::new("Quantidade de Alunos Inscritos", headline.active_students),
            Metric::new("Quantidade de Turmas", headline.classes),
            Metric::new(
                "Quantidade de Turmas com Mais de 1 Sondagem",
                headline.classes_with_multiple_assessments,
            ),
            Metric::new(
                "Total de alunos distintos com evolução",
                headline.students_with_evolution,
            ),
            Metric::new(
                "Total de professores com mais de uma turma",
                headline.teachers_with_multiple_classes,
            ),
        ]);
    }

    let events = events_from_table(table, "data_criacao_avaliacao")?;
    let summary = progression::summarize(&events);
    report.series.push(Series {
        title: "Evolução dos Alunos".to_string(),
        key_label: "Aluno".to_string(),
        value_label: "Hipótese inicial → final".to_string(),
        points: summary
            .improved()
            .map(|student| {
                (
                    format!("{} ({})", student.student_name, student.student_id),
                    format!(
                        "{} → {}",
                        stage_label(student.min_ordinal),
                        stage_label(student.max_ordinal)
                    ),
                )
            })
            .collect(),
    });
    Ok(())
}

fn summarize_onboarding(report: &mut PageReport, table: &Table) -> anyhow::Result<()> {
    let status = table
        .column_index("status_resposta")
        .context("onboarding table has no `status_resposta` column")?;

    for (label, answered) in [
        ("Total de Professores Embarcando", ANSWERED_ALL),
        ("Total de Professores que não Embarcaram", ANSWERED_SOME),
    ] {
        let group = table.retain_rows(|row| row[status].as_str() == Some(answered));
        report
            .metrics
            .push(Metric::new(label, group.distinct_count("id_professor")?));

        let points = group
            .group_count(&["pergunta", "resposta"])?
            .into_iter()
            .map(|(key, count)| (format!("{} — {}", key[0], key[1]), count.to_string()))
            .collect();
        report.series.push(Series {
            title: format!("Respostas ({answered})"),
            key_label: "Pergunta — Resposta".to_string(),
            value_label: "Quantidade".to_string(),
            points,
        });
    }
    Ok(())
}

fn summarize_teachers(report: &mut PageReport, table: &Table) -> anyhow::Result<()> {
    for (label, column) in [
        ("Total Geral de Alunos Cadastrados", "id_aluno"),
        ("Total Geral de Turmas Cadastradas", "id_turma"),
        ("Total Geral de Professores", "id_professor"),
    ] {
        report
            .metrics
            .push(Metric::new(label, distinct_ids(table, column)?));
    }

    let teachers = table.distinct_count("id_professor")?;
    let onboarding = table.column_index("flag_onboarding").context("missing `flag_onboarding`")?;
    let completed = table
        .retain_rows(|row| row[onboarding].as_str() == Some(ONBOARDING_COMPLETE))
        .distinct_count("id_professor")?;
    report.metrics.push(Metric::new(
        "Taxa de Onboarding Completo",
        format!("{:.2}% ({completed} de {teachers})", percent(completed, teachers)),
    ));

    let by_day = table.derive_column("dia_cadastro_professor", "data_cadastro_professor", |value| {
        value.as_timestamp().map(|stamp| stamp.date()).into()
    })?;
    report.series.push(count_series(
        "Número de Professores cadastrados por dia",
        "Data",
        "Professores",
        by_day.group_distinct("dia_cadastro_professor", "id_professor")?,
    ));
    report.series.push(Series {
        title: "Tempo Médio de Cadastro de Professores".to_string(),
        key_label: "Data".to_string(),
        value_label: "Tempo Médio de Cadastro (minutos)".to_string(),
        points: by_day
            .group_time_span("dia_cadastro_professor", "data_cadastro_professor")?
            .into_iter()
            .map(|(day, span)| {
                let minutes = span.num_seconds() as f64 / 60.0;
                (day.to_string(), format!("{minutes:.2}"))
            })
            .collect(),
    });
    report.series.push(count_series(
        "Professores Cadastrados por Estado",
        "Estado",
        "Professores",
        table.group_distinct("estado_escola", "id_professor")?,
    ));
    report.series.push(count_series(
        "Turmas Cadastradas por Estado",
        "Estado",
        "Turmas",
        table.group_distinct("estado_escola", "id_turma")?,
    ));
    Ok(())
}

fn summarize_class_improvement(report: &mut PageReport, table: &Table) -> anyhow::Result<()> {
    let percent_column = table
        .column_index("porcentagem_melhoria")
        .context("missing `porcentagem_melhoria`")?;
    let above_target = table.retain_rows(|row| {
        row[percent_column]
            .as_f64()
            .is_some_and(|value| value >= IMPROVEMENT_TARGET_PERCENT)
    });

    report.metrics.extend([
        Metric::new(
            "Total de Alunos nas Turmas com Evid. de Aprendizagem",
            table.sum("total_alunos")?,
        ),
        Metric::new(
            "Total de Alunos com Evidência de Aprendizagem",
            table.sum("alunos_com_melhoria")?,
        ),
        Metric::new(
            "Total de Profs com Turmas Avançando",
            table.distinct_count("id_professor")?,
        ),
        Metric::new(
            "Total de Turmas Com Evidência de Aprendizagem",
            table.distinct_count("id_turma")?,
        ),
        Metric::new(
            "Profs com Turmas Evid. de Aprend. maior que 50 %",
            above_target.distinct_count("id_professor")?,
        ),
    ]);

    let monthly_rows = table
        .group_count(&["mes_sondagem"])?
        .into_iter()
        .map(|(key, count)| (key[0].clone(), count))
        .collect();
    report.series.push(month_series(
        "Número de Sondagens Realizadas",
        "Sondagens",
        monthly_rows,
    ));
    report.series.push(month_series(
        "Número de Professores(únicos) que Realizaram Sondagens",
        "Professores",
        table.group_distinct("mes_sondagem", "id_professor")?,
    ));
    report.series.push(month_series(
        "Número de Turmas que Realizaram Sondagens",
        "Turmas",
        table.group_distinct("mes_sondagem", "id_turma")?,
    ));
    report.series.push(count_series(
        "Número de Turmas que Realizaram Sondagem por Estado",
        "Estado",
        "Turmas",
        table.group_distinct("estado_escola", "id_turma")?,
    ));

    let monthly_mean = table.group_mean("mes_sondagem", "porcentagem_melhoria")?;
    report.series.push(Series {
        title: "Taxa de Melhoria ao Longo dos Meses".to_string(),
        key_label: "Mês".to_string(),
        value_label: "Melhoria média (%)".to_string(),
        points: monthly_mean
            .into_iter()
            .map(|(month, mean)| (month_label(&month), format!("{mean:.2}")))
            .collect(),
    });

    let mut by_state = table.group_mean("estado_escola", "porcentagem_melhoria")?;
    by_state.sort_by(|a, b| b.1.total_cmp(&a.1));
    by_state.truncate(TOP_STATES);
    report.series.push(Series {
        title: "5 Melhores Estados com Maior Porcentagem de Melhoria".to_string(),
        key_label: "Estado".to_string(),
        value_label: "Melhoria média (%)".to_string(),
        points: by_state
            .into_iter()
            .map(|(state, mean)| (state.to_string(), format!("{mean:.2}")))
            .collect(),
    });
    Ok(())
}

fn summarize_hypotheses(report: &mut PageReport, table: &Table) -> anyhow::Result<()> {
    report.metrics.extend([
        Metric::new("Total de Alunos", table.distinct_count("id_aluno")?),
        Metric::new("Total de Turmas", table.distinct_count("id_turma")?),
        Metric::new("Total de Escolas", table.distinct_count("cod_inep")?),
    ]);

    let crosstab = table.crosstab("num_sondagem", "nome_hipotese")?;
    report
        .tables
        .push(("Resumo de Hipóteses por Ranking".to_string(), crosstab_table(&crosstab)?));

    let events = events_from_table(table, "data_criacao_sondagem")?;
    let summary = progression::summarize(&events);
    report.metrics.push(Metric::new(
        "Total de alunos com qualquer melhoria",
        summary.improved_count(),
    ));
    let unknown: usize = summary.unknown_labels.values().sum();
    if unknown > 0 {
        report
            .metrics
            .push(Metric::new("Sondagens com hipótese desconhecida", unknown));
    }

    let funnel = progression::funnel(&summary.students);
    report.series.push(Series {
        title: "Mapa de Funil de Progressão".to_string(),
        key_label: "Etapa".to_string(),
        value_label: "Alunos que atingiram (cobertos / alcançados)".to_string(),
        points: funnel
            .iter()
            .map(|stage| {
                (
                    stage.stage.label().to_string(),
                    format!("{} / {}", stage.covered, stage.reached),
                )
            })
            .collect(),
    });

    report.series.push(Series {
        title: "Distribuição das Hipóteses dos Alunos".to_string(),
        key_label: "Hipótese".to_string(),
        value_label: "Sondagens".to_string(),
        points: progression::distribution(&events)
            .into_iter()
            .map(|(label, count)| (label, count.to_string()))
            .collect(),
    });

    let mut evolution = Table::new(["id_aluno", "nome_aluno", "num_sondagem", "nome_hipotese", "ordering", "data"]);
    for ranked in progression::improved_evolution(&events) {
        evolution.push_row(vec![
            Value::Int(ranked.event.student_id),
            ranked.event.student_name.clone().into(),
            Value::Int(i64::from(ranked.rank)),
            ranked.event.hypothesis.clone().into(),
            ranked.ordinal.map(i64::from).into(),
            ranked.event.occurred_at.into(),
        ])?;
    }
    report
        .tables
        .push(("Evolução Completa dos Alunos com Melhoria".to_string(), evolution));
    Ok(())
}

/// Builds sondagem events from a page table's `id_aluno`, `nome_aluno` and
/// `nome_hipotese` columns plus the given timestamp column. Rows without a
/// student, hypothesis or timestamp are not events.
pub fn events_from_table(table: &Table, timestamp_column: &str) -> anyhow::Result<Vec<AssessmentEvent>> {
    let index = |name: &str| {
        table
            .column_index(name)
            .with_context(|| format!("table has no `{name}` column"))
    };
    let (student, name, hypothesis, timestamp) = (
        index("id_aluno")?,
        index("nome_aluno")?,
        index("nome_hipotese")?,
        index(timestamp_column)?,
    );

    Ok(table
        .rows()
        .iter()
        .filter_map(|row| {
            Some(AssessmentEvent {
                student_id: row[student].as_i64()?,
                student_name: row[name].to_string(),
                hypothesis: row[hypothesis].as_str()?.to_string(),
                occurred_at: row[timestamp].as_timestamp()?,
            })
        })
        .collect())
}

/// Distinct ids, ignoring the zero placeholder left by outer joins.
fn distinct_ids(table: &Table, column: &str) -> anyhow::Result<usize> {
    Ok(table
        .distinct(column)?
        .iter()
        .filter(|value| !value.is_null() && value.as_i64() != Some(0))
        .count())
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn stage_label(ordinal: u8) -> &'static str {
    Hypothesis::ALL
        .iter()
        .find(|stage| stage.ordinal() == ordinal)
        .map(|stage| stage.label())
        .unwrap_or("?")
}

const MONTHS: [&str; 12] = [
    "Janeiro", "Fevereiro", "Março", "Abril", "Maio", "Junho", "Julho", "Agosto", "Setembro",
    "Outubro", "Novembro", "Dezembro",
];

fn month_label(value: &Value) -> String {
    match value.as_i64() {
        Some(month @ 1..=12) => MONTHS[(month - 1) as usize].to_string(),
        _ => value.to_string(),
    }
}

fn count_series(title: &str, key_label: &str, value_label: &str, counts: Vec<(Value, usize)>) -> Series {
    Series {
        title: title.to_string(),
        key_label: key_label.to_string(),
        value_label: value_label.to_string(),
        points: counts
            .into_iter()
            .map(|(key, count)| (key.to_string(), count.to_string()))
            .collect(),
    }
}

fn month_series(title: &str, value_label: &str, counts: Vec<(Value, usize)>) -> Series {
    Series {
        title: title.to_string(),
        key_label: "Mês".to_string(),
        value_label: value_label.to_string(),
        points: counts
            .into_iter()
            .map(|(month, count)| (month_label(&month), count.to_string()))
            .collect(),
    }
}

fn crosstab_table(crosstab: &Crosstab) -> anyhow::Result<Table> {
    let mut columns = vec!["num_sondagem".to_string()];
    columns.extend(crosstab.column_keys.iter().map(|key| key.to_string()));
    let mut table = Table::new(columns);
    for (key, counts) in crosstab.row_keys.iter().zip(crosstab.counts.iter()) {
        let mut row = vec![key.clone()];
        row.extend(counts.iter().map(|count| Value::Int(*count as i64)));
        table.push_row(row)?;
    }
    Ok(table)
}

pub fn render_markdown(report: &PageReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# {}", report.page.title());
    let _ = writeln!(output);
    let _ = writeln!(output, "## Métricas");

    if report.metrics.is_empty() {
        let _ = writeln!(output, "Nenhuma métrica para esta seleção.");
    } else {
        for metric in report.metrics.iter() {
            let _ = writeln!(output, "- {}: {}", metric.label, metric.value);
        }
    }

    for series in report.series.iter() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## {}", series.title);
        if series.points.is_empty() {
            let _ = writeln!(output, "Sem dados para esta seleção.");
            continue;
        }
        let _ = writeln!(output, "| {} | {} |", series.key_label, series.value_label);
        let _ = writeln!(output, "| --- | --- |");
        for (key, value) in series.points.iter() {
            let _ = writeln!(output, "| {} | {} |", escape_cell(key), escape_cell(value));
        }
    }

    for (title, table) in report.tables.iter() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## {title}");
        write_table(&mut output, table, table.len());
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Microdados ({} linhas)", report.microdata.len());
    write_table(&mut output, &report.microdata, MICRODATA_PREVIEW);

    output
}

fn write_table(output: &mut String, table: &Table, limit: usize) {
    if table.is_empty() {
        let _ = writeln!(output, "Nenhuma linha para esta seleção.");
        return;
    }
    let header: Vec<String> = table.columns().iter().map(|column| escape_cell(column)).collect();
    let _ = writeln!(output, "| {} |", header.join(" | "));
    let _ = writeln!(output, "|{}", " --- |".repeat(header.len()));
    for row in table.rows().iter().take(limit) {
        let cells: Vec<String> = row.iter().map(|cell| escape_cell(&cell.to_string())).collect();
        let _ = writeln!(output, "| {} |", cells.join(" | "));
    }
    if table.len() > limit {
        let _ = writeln!(output, "\n… mais {} linhas", table.len() - limit);
    }
}

fn escape_cell(raw: &str) -> String {
    raw.replace('|', "\\|").replace('\n', " ")
}

pub fn render_csv(table: &Table) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(|cell| cell.to_string()))?;
    }
    let bytes = writer.into_inner().context("failed to flush CSV output")?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ColumnConstraint;
    use chrono::NaiveDate;

    fn stamp(month: u32, day: u32) -> Value {
        Value::DateTime(
            NaiveDate::from_ymd_opt(2024, month, day)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
        )
    }

    fn hypotheses_table() -> Table {
        let mut table = Table::new([
            "id_turma",
            "cod_inep",
            "id_aluno",
            "nome_aluno",
            "nome_hipotese",
            "data_criacao_sondagem",
            "num_sondagem",
        ]);
        let rows = [
            (10, 355030, 1, "Ana", Some("Pré-silábica"), 3, 1),
            (10, 355030, 1, "Ana", Some("Silábica c/ valor"), 6, 2),
            (10, 355030, 2, "Bruno", Some("Alfabética"), 3, 1),
            (11, 330455, 3, "Carla", None, 3, 1),
        ];
        for (class, school, student, name, hypothesis, month, rank) in rows {
            table
                .push_row(vec![
                    Value::Int(class),
                    Value::Int(school),
                    Value::Int(student),
                    name.into(),
                    hypothesis.into(),
                    if hypothesis.is_some() { stamp(month, 1) } else { Value::Null },
                    Value::Int(rank),
                ])
                .unwrap();
        }
        table
    }

    fn metric<'a>(report: &'a PageReport, label: &str) -> &'a str {
        report
            .metrics
            .iter()
            .find(|metric| metric.label == label)
            .map(|metric| metric.value.as_str())
            .unwrap()
    }

    #[test]
    fn hypotheses_page_counts_improvement_and_builds_crosstab() {
        let report = summarize_page(Page::Hypotheses, hypotheses_table(), None).unwrap();

        assert_eq!(metric(&report, "Total de Alunos"), "3");
        assert_eq!(metric(&report, "Total de Escolas"), "2");
        assert_eq!(metric(&report, "Total de alunos com qualquer melhoria"), "1");

        let (_, crosstab) = &report.tables[0];
        assert_eq!(crosstab.columns()[0], "num_sondagem");
        assert_eq!(crosstab.len(), 2);

        let (_, evolution) = &report.tables[1];
        assert_eq!(evolution.len(), 2);
        assert_eq!(evolution.rows()[1][4], Value::Int(4));
    }

    #[test]
    fn onboarding_page_splits_teachers_by_answer_status() {
        let mut table = Table::new(["id_professor", "pergunta", "resposta", "status_resposta"]);
        for (teacher, answer, status) in [
            (1, "Sim", ANSWERED_ALL),
            (1, "Não", ANSWERED_ALL),
            (2, "Sim", ANSWERED_ALL),
            (3, "Sim", ANSWERED_SOME),
        ] {
            table
                .push_row(vec![Value::Int(teacher), "Usa sondagem?".into(), answer.into(), status.into()])
                .unwrap();
        }

        let report = summarize_page(Page::Onboarding, table, None).unwrap();
        assert_eq!(metric(&report, "Total de Professores Embarcando"), "2");
        assert_eq!(metric(&report, "Total de Professores que não Embarcaram"), "1");
        assert_eq!(report.series[0].points.len(), 2);
    }

    #[test]
    fn teachers_page_ignores_zero_ids_and_guards_empty_rate() {
        let mut table = Table::new([
            "id_professor",
            "id_turma",
            "id_aluno",
            "flag_onboarding",
            "estado_escola",
            "data_cadastro_professor",
        ]);
        table
            .push_row(vec![
                Value::Int(1),
                Value::Int(0),
                Value::Null,
                ONBOARDING_COMPLETE.into(),
                "SP".into(),
                stamp(2, 1),
            ])
            .unwrap();
        table
            .push_row(vec![
                Value::Int(2),
                Value::Int(5),
                Value::Int(9),
                "Onboarding Não Completo".into(),
                "SP".into(),
                Value::DateTime(
                    NaiveDate::from_ymd_opt(2024, 2, 1)
                        .unwrap()
                        .and_hms_opt(11, 30, 0)
                        .unwrap(),
                ),
            ])
            .unwrap();

        let report = summarize_page(Page::Teachers, table, None).unwrap();
        assert_eq!(metric(&report, "Total Geral de Turmas Cadastradas"), "1");
        assert_eq!(metric(&report, "Taxa de Onboarding Completo"), "50.00% (1 de 2)");
        assert_eq!(report.series[0].points, vec![("2024-02-01".to_string(), "2".to_string())]);
        assert_eq!(report.series[1].title, "Tempo Médio de Cadastro de Professores");
        assert_eq!(report.series[1].points, vec![("2024-02-01".to_string(), "90.00".to_string())]);

        let empty = Table::new([
            "id_professor",
            "id_turma",
            "id_aluno",
            "flag_onboarding",
            "estado_escola",
            "data_cadastro_professor",
        ]);
        let report = summarize_page(Page::Teachers, empty, None).unwrap();
        assert_eq!(metric(&report, "Taxa de Onboarding Completo"), "0.00% (0 de 0)");
        assert!(report.series[1].points.is_empty());
    }

    #[test]
    fn class_improvement_page_names_months_and_ranks_states() {
        let mut table = Table::new([
            "id_turma",
            "id_professor",
            "estado_escola",
            "total_alunos",
            "alunos_com_melhoria",
            "porcentagem_melhoria",
            "mes_sondagem",
        ]);
        for (class, teacher, state, total, improved, month) in [
            (1, 7, "SP", 20, 12, 3),
            (2, 8, "RJ", 10, 2, 3),
            (3, 8, "MG", 25, 5, 4),
        ] {
            table
                .push_row(vec![
                    Value::Int(class),
                    Value::Int(teacher),
                    state.into(),
                    Value::Int(total),
                    Value::Int(improved),
                    Value::Float(improved as f64 / total as f64 * 100.0),
                    Value::Int(month),
                ])
                .unwrap();
        }

        let report = summarize_page(Page::ClassImprovement, table, None).unwrap();
        assert_eq!(metric(&report, "Total de Alunos nas Turmas com Evid. de Aprendizagem"), "55");
        assert_eq!(metric(&report, "Profs com Turmas Evid. de Aprend. maior que 50 %"), "1");
        assert_eq!(report.series[0].points[0], ("Março".to_string(), "2".to_string()));

        let top = report.series.last().unwrap();
        assert_eq!(top.points[0].0, "SP");
    }

    #[test]
    fn markdown_report_lists_metrics_and_microdata() {
        let filters = FilterConfig::default().with(
            "nome_aluno",
            ColumnConstraint::Values(vec!["Ana".into()]),
        );
        let output = build_report(
            Page::Hypotheses,
            &hypotheses_table(),
            &filters,
            DisplayMode::Markdown,
            None,
        )
        .unwrap();

        assert!(output.starts_with("# Hipóteses da evidência de aprendizagem"));
        assert!(output.contains("- Total de Alunos: 1"));
        assert!(output.contains("## Microdados (2 linhas)"));
    }

    #[test]
    fn empty_sections_fall_back_to_portuguese_notes() {
        let mut microdata = Table::new(["id_aluno"]);
        for id in 0..25 {
            microdata.push_row(vec![Value::Int(id)]).unwrap();
        }
        let report = PageReport {
            page: Page::Hypotheses,
            metrics: Vec::new(),
            series: vec![count_series("Distribuição", "Hipótese", "Sondagens", Vec::new())],
            tables: vec![("Resumo".to_string(), Table::new(["num_sondagem"]))],
            microdata,
        };

        let output = render_markdown(&report);
        assert!(output.contains("Nenhuma métrica para esta seleção."));
        assert!(output.contains("Sem dados para esta seleção."));
        assert!(output.contains("Nenhuma linha para esta seleção."));
        assert!(output.contains("… mais 5 linhas"));
    }

    #[test]
    fn csv_mode_exports_filtered_rows() {
        let filters = FilterConfig::default().with(
            "id_aluno",
            ColumnConstraint::Values(vec![Value::Int(2)]),
        );
        let output = build_report(
            Page::Hypotheses,
            &hypotheses_table(),
            &filters,
            DisplayMode::Csv,
            None,
        )
        .unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("10,355030,2,Bruno,Alfabética,2024-03-01 10:00:00,1"));
    }

    #[test]
    fn invalid_filters_abort_the_report() {
        let filters = FilterConfig::default().with("missing", ColumnConstraint::Contains("x".into()));
        let result = build_report(
            Page::Hypotheses,
            &hypotheses_table(),
            &filters,
            DisplayMode::Csv,
            None,
        );
        assert!(result.is_err());
    }
}
