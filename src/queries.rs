//! Fixed SQL text for every report page.
//!
//! Page queries carry an `{excluded}` marker standing for the teacher
//! exclusion predicate; [`render`] swaps it for a `NOT IN` list of bind
//! placeholders so the ids are bound rather than spliced into the text.

const EXCLUDED_MARKER: &str = "{excluded}";

pub const TOTAL_LOGINS: &str = "SELECT COUNT(DISTINCT t.auth_id) FROM teacher t";

pub const TOTAL_ONBOARDINGS: &str =
    "SELECT COUNT(t.auth_id) FROM teacher t WHERE t.onboarding_completed = 1";

pub const TOTAL_ACTIVE_STUDENTS: &str =
    "SELECT COUNT(DISTINCT s.id) FROM student s WHERE s.active = 1";

pub const TOTAL_DIAGNOSTICS: &str = "SELECT COUNT(DISTINCT da.id) FROM diagnostic_assessment da";

pub const TOTAL_CLASSES: &str = "SELECT COUNT(*) FROM class";

pub const CLASSES_WITH_MULTIPLE_ASSESSMENTS: &str = r#"
SELECT COUNT(*) FROM (
    SELECT da.class_id
    FROM diagnostic_assessment da
    GROUP BY da.class_id
    HAVING COUNT(da.id) > 1
) AS classes_with_repeats
"#;

pub const STUDENTS_WITH_EVOLUTION: &str = r#"
SELECT COUNT(*) FROM (
    SELECT das.student_id
    FROM diagnostic_assessment_students das
    INNER JOIN diagnostic_assessment_type_hypothesis dh ON dh.id = das.hypothesis_id
    GROUP BY das.student_id
    HAVING MIN(dh.ordering) <> MAX(dh.ordering)
) AS evolved_students
"#;

pub const TEACHERS_WITH_MULTIPLE_CLASSES: &str = r#"
SELECT COUNT(*) FROM (
    SELECT t.id
    FROM teacher t
    INNER JOIN class c ON c.teacher_id = t.id
    GROUP BY t.id
    HAVING COUNT(c.id) > 1
) AS busy_teachers
"#;

pub const STUDENTS_BY_CLASS: &str = r#"
SELECT
    t.id AS id_professor,
    c.id AS id_turma,
    c.name AS nome_turma,
    c.year AS ano_turma,
    s.id AS id_aluno,
    s.name AS nome_aluno,
    sc.cod_inep AS cod_inep,
    sc.name AS nome_escola,
    sc.municipio AS cidade_escola,
    sc.uf AS estado_escola,
    da.id AS id_avaliacao,
    da.month AS mes_avaliacao,
    dh.name AS nome_hipotese,
    MAX(das.comment) AS comentario,
    MAX(da.created_at) AS data_criacao_avaliacao
FROM teacher t
INNER JOIN diagnostic_assessment da ON da.teacher_id = t.id
INNER JOIN class c ON c.id = da.class_id
INNER JOIN student s ON s.class_id = c.id
INNER JOIN diagnostic_assessment_students das ON das.student_id = s.id
INNER JOIN diagnostic_assessment_type_hypothesis dh ON dh.id = das.hypothesis_id
INNER JOIN school sc ON sc.cod_inep = c.cod_inep
WHERE {excluded}
GROUP BY t.id, c.id, c.name, c.year, s.id, s.name, sc.cod_inep, sc.name,
    sc.municipio, sc.uf, da.id, da.month, dh.id, dh.name
ORDER BY data_criacao_avaliacao DESC
"#;

pub const ONBOARDING_ANSWERS: &str = r#"
WITH answers_per_teacher AS (
    SELECT qr.teacher_id, COUNT(a.id) AS num_respostas
    FROM questionnaire_answer a
    JOIN questionnaire_response qr ON a.response_id = qr.id
    GROUP BY qr.teacher_id
)
SELECT
    t.id AS id_professor,
    t.auth_id AS id_nova_escola,
    q.label AS pergunta,
    a.value AS resposta,
    qr.created_at AS data_resposta,
    CASE
        WHEN apt.num_respostas >= 3 THEN 'Respondeu todas'
        ELSE 'Não respondeu todas'
    END AS status_resposta
FROM questionnaire_answer a
JOIN questionnaire_response qr ON a.response_id = qr.id
JOIN teacher t ON qr.teacher_id = t.id
JOIN questionnaire_question q ON a.question_id = q.id
JOIN questionnaire qn ON qr.questionnaire_id = qn.id
JOIN questionnaire_type qt ON qn.type_id = qt.id
JOIN answers_per_teacher apt ON apt.teacher_id = t.id
WHERE qt.name = 'Onboarding' AND {excluded}
ORDER BY t.id, qr.created_at
"#;

pub const TEACHER_ROSTER: &str = r#"
SELECT
    t.id AS id_professor,
    t.auth_id AS id_nova_escola,
    t.created_at AS data_cadastro_professor,
    CASE
        WHEN t.onboarding_completed = 1 THEN 'Onboarding Completo'
        ELSE 'Onboarding Não Completo'
    END AS flag_onboarding,
    CASE
        WHEN c.id IS NOT NULL THEN 'Tem Turma'
        ELSE 'Sem Turma'
    END AS flag_turma,
    c.id AS id_turma,
    c.name AS nome_turma,
    c.year AS ano_turma,
    c.created_at AS data_cadastro_turma,
    s.id AS id_aluno,
    s.name AS nome_aluno,
    sc.name AS nome_escola,
    sc.municipio AS cidade_escola,
    sc.uf AS estado_escola,
    s.created_at AS data_cadastro_aluno
FROM teacher t
LEFT JOIN class c ON c.teacher_id = t.id
LEFT JOIN student s ON s.class_id = c.id
LEFT JOIN school sc ON sc.cod_inep = c.cod_inep
WHERE {excluded}
ORDER BY t.id, c.id, s.id
"#;

pub const CLASS_IMPROVEMENT: &str = r#"
WITH students_per_class AS (
    SELECT c.id AS turma_id, c.name AS nome_turma, c.teacher_id AS professor_id,
        COUNT(DISTINCT s.id) AS total_alunos
    FROM class c
    INNER JOIN student s ON s.class_id = c.id
    GROUP BY c.id, c.name, c.teacher_id
),
student_extremes AS (
    SELECT
        s.id AS aluno_id,
        c.id AS turma_id,
        c.year AS ano_turma,
        c.cod_inep AS cod_inep_turma,
        t.id AS professor_id,
        CAST(da.month AS UNSIGNED) AS mes_sondagem,
        MIN(dh.ordering) AS min_ordering,
        MAX(dh.ordering) AS max_ordering
    FROM diagnostic_assessment_students das
    INNER JOIN student s ON das.student_id = s.id
    INNER JOIN class c ON s.class_id = c.id
    INNER JOIN teacher t ON t.id = c.teacher_id
    INNER JOIN diagnostic_assessment_type_hypothesis dh ON das.hypothesis_id = dh.id
    INNER JOIN diagnostic_assessment da ON das.diagnostic_assessment_id = da.id
    WHERE {excluded}
    GROUP BY s.id, c.id, c.year, c.cod_inep, t.id, mes_sondagem
),
improved_per_class AS (
    SELECT turma_id, ano_turma, cod_inep_turma, professor_id, mes_sondagem,
        COUNT(aluno_id) AS alunos_com_melhoria
    FROM student_extremes
    WHERE min_ordering < max_ordering
    GROUP BY turma_id, ano_turma, cod_inep_turma, professor_id, mes_sondagem
)
SELECT
    spc.turma_id AS id_turma,
    ipc.cod_inep_turma,
    spc.nome_turma,
    ipc.ano_turma,
    sc.name AS nome_escola,
    sc.municipio AS cidade_escola,
    sc.uf AS estado_escola,
    spc.professor_id AS id_professor,
    spc.total_alunos,
    ipc.alunos_com_melhoria,
    CAST(ROUND(ipc.alunos_com_melhoria / spc.total_alunos * 100, 2) AS DOUBLE) AS porcentagem_melhoria,
    ipc.mes_sondagem
FROM students_per_class spc
INNER JOIN improved_per_class ipc ON ipc.turma_id = spc.turma_id
INNER JOIN school sc ON sc.cod_inep = ipc.cod_inep_turma
WHERE ipc.alunos_com_melhoria > 0
"#;

pub const RANKED_HYPOTHESES: &str = r#"
WITH assessments_per_class AS (
    SELECT da.class_id AS turma_id, COUNT(DISTINCT da.id) AS sondagens_realizadas
    FROM diagnostic_assessment da
    GROUP BY da.class_id
),
ranked AS (
    SELECT
        das.student_id,
        dh.name AS nome_hipotese,
        da.month AS mes_de_aplicacao,
        da.created_at,
        da.updated_at,
        ROW_NUMBER() OVER (PARTITION BY das.student_id ORDER BY da.created_at ASC) AS num_sondagem
    FROM diagnostic_assessment_students das
    INNER JOIN diagnostic_assessment da ON das.diagnostic_assessment_id = da.id
    INNER JOIN diagnostic_assessment_type_hypothesis dh ON das.hypothesis_id = dh.id
)
SELECT
    c.id AS id_turma,
    c.name AS nome_turma,
    c.year AS ano_turma,
    t.id AS id_professor,
    sc.cod_inep,
    sc.name AS nome_escola,
    sc.municipio AS cidade_escola,
    sc.uf AS estado_escola,
    s.id AS id_aluno,
    s.name AS nome_aluno,
    s.created_at AS data_cadastro_aluno,
    CASE
        WHEN t.onboarding_completed = 1 THEN 'Onboarding Completo'
        ELSE 'Onboarding Não Completo'
    END AS flag_onboarding,
    COALESCE(apc.sondagens_realizadas, 0) AS flag_sondagens,
    r.nome_hipotese,
    r.mes_de_aplicacao,
    r.created_at AS data_criacao_sondagem,
    r.updated_at AS data_atualizacao_sondagem,
    r.num_sondagem
FROM student s
INNER JOIN class c ON s.class_id = c.id
INNER JOIN teacher t ON t.id = c.teacher_id
LEFT JOIN school sc ON sc.cod_inep = c.cod_inep
LEFT JOIN assessments_per_class apc ON apc.turma_id = c.id
LEFT JOIN ranked r ON r.student_id = s.id
WHERE {excluded}
ORDER BY c.id, s.id, r.num_sondagem
"#;

/// Replaces the exclusion marker with `t.auth_id NOT IN (?, ...)` sized for
/// `excluded` ids, or an always-true predicate when there are none.
pub fn render(template: &str, excluded: usize) -> String {
    let predicate = if excluded == 0 {
        "1 = 1".to_string()
    } else {
        format!("t.auth_id NOT IN ({})", vec!["?"; excluded].join(", "))
    };
    template.replace(EXCLUDED_MARKER, &predicate)
}

pub fn needs_exclusions(template: &str) -> bool {
    template.contains(EXCLUDED_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_one_placeholder_per_excluded_id() {
        let sql = render(TEACHER_ROSTER, 3);
        assert!(sql.contains("WHERE t.auth_id NOT IN (?, ?, ?)"));
        assert!(!needs_exclusions(&sql));
    }

    #[test]
    fn empty_exclusion_list_keeps_every_teacher() {
        let sql = render(ONBOARDING_ANSWERS, 0);
        assert!(sql.contains("qt.name = 'Onboarding' AND 1 = 1"));
    }

    #[test]
    fn headline_queries_take_no_exclusions() {
        for sql in [TOTAL_LOGINS, TOTAL_CLASSES, STUDENTS_WITH_EVOLUTION] {
            assert!(!needs_exclusions(sql));
        }
    }
}
