use reelqa_search::{CaseReport, EvalSummary};

/// Markdown summary of one evaluation run, worst cases first.
pub(crate) fn render_eval_report(
    dataset: &str,
    profile: &str,
    reports: &[CaseReport],
    summary: &EvalSummary,
) -> String {
    let mut md = String::new();
    md.push_str("# ReelQA eval report\n\n");
    md.push_str(&format!("- Dataset: `{dataset}`\n"));
    md.push_str(&format!("- Profile: `{profile}`\n"));
    md.push_str(&format!("- Cases: `{}`\n\n", summary.cases));

    md.push_str("## Summary\n\n");
    md.push_str("| precision@k | recall@k | hallucination | exact_match |\n");
    md.push_str("|---:|---:|---:|---:|\n");
    md.push_str(&format!(
        "| `{:.3}` | `{:.3}` | `{:.3}` | `{:.3}` |\n\n",
        summary.mean_precision_at_k,
        summary.mean_recall_at_k,
        summary.mean_hallucination_score,
        summary.exact_match_rate
    ));

    let mut cases: Vec<&CaseReport> = reports.iter().collect();
    cases.sort_by(|a, b| {
        a.hallucination_score
            .total_cmp(&b.hallucination_score)
            .then_with(|| a.exact_match.score.total_cmp(&b.exact_match.score))
            .then_with(|| a.query.cmp(&b.query))
    });

    md.push_str("## Worst cases\n\n");
    md.push_str("| intent | grounding | exact | movie | query | answer |\n");
    md.push_str("|---|---:|---|---|---|---|\n");
    for case in cases.into_iter().take(10) {
        md.push_str(&format!(
            "| `{}` | `{:.3}` | `{}` | {} | {} | {} |\n",
            case.intent,
            case.hallucination_score,
            if case.exact_match.exact_match { "yes" } else { "no" },
            escape_cell(&truncate_one_line(&case.movie, 40)),
            escape_cell(&truncate_one_line(&case.query, 120)),
            escape_cell(&truncate_one_line(&case.answer, 120)),
        ));
    }
    md.push('\n');
    md
}

fn truncate_one_line(text: &str, max_chars: usize) -> String {
    let mut s = text.replace(['\n', '\r', '\t'], " ");
    s = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if s.chars().count() <= max_chars {
        return s;
    }
    let truncated: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{truncated}…")
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelqa_search::{ExactMatch, Intent};

    fn report(query: &str, grounding: f32, exact: bool) -> CaseReport {
        CaseReport {
            query: query.to_string(),
            answer: "Michael Mann | writer\nand director".to_string(),
            movie: "Heat".to_string(),
            intent: Intent::Director,
            precision_at_k: 1.0,
            recall_at_k: 1.0,
            hallucination_score: grounding,
            is_hallucinated: grounding < 0.5,
            exact_match: ExactMatch {
                score: if exact { 1.0 } else { 0.1 },
                exact_match: exact,
            },
        }
    }

    #[test]
    fn eval_report_lists_worst_cases_first() {
        let reports = vec![
            report("Who directed Heat?", 0.9, true),
            report("Who wrote Heat?", 0.2, false),
        ];
        let summary = EvalSummary::from_reports(&reports);
        let md = render_eval_report("smoke", "default", &reports, &summary);

        assert!(md.starts_with("# ReelQA eval report"));
        assert!(md.contains("- Cases: `2`"));
        assert!(md.contains("Michael Mann \\| writer and director"));
        let worst = md.find("Who wrote Heat?").unwrap();
        let best = md.find("Who directed Heat?").unwrap();
        assert!(worst < best);
    }

    #[test]
    fn long_cells_are_truncated() {
        let text = "word ".repeat(50);
        let truncated = truncate_one_line(&text, 20);
        assert_eq!(truncated.chars().count(), 20);
        assert!(truncated.ends_with('…'));
    }
}
