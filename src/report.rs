//! Markdown summary of a pipeline run.

use crate::model::{Provenance, RelationType};
use crate::pipeline::PipelineOutcome;

pub fn render_markdown(outcome: &PipelineOutcome) -> String {
    let meta = &outcome.collection.metadata;
    let v = &outcome.validation;
    let mut out = String::new();

    out.push_str("# Link Graph Report\n\n");
    out.push_str(&format!("- Run: `{}`\n", meta.run_id));
    out.push_str(&format!("- Generated: {}\n", meta.generated_at.to_rfc3339()));
    out.push_str(&format!("- Items: {}\n", meta.item_count));
    out.push_str(&format!("- Edges: {}\n", meta.total_edges));
    out.push_str(&format!("- Density: {:.4}\n", meta.density));
    out.push_str(&format!(
        "- Score: {:.1} ({})\n",
        v.composite_score, v.verdict
    ));

    out.push_str("\n## Ground Truth\n\n");
    let hl = &outcome.patterns.hard_links;
    out.push_str(&format!(
        "- Curated links valid/dangling/self: {}/{}/{}\n",
        hl.valid, hl.dangling, hl.self_links
    ));
    let s = &outcome.patterns.suggestions;
    out.push_str(&format!(
        "- Suggestions total/unresolvable/relates_to resolved: {}/{}/{}\n",
        s.total, s.unresolvable, s.resolved_from_hint
    ));
    out.push_str(&format!(
        "- Calibrated category pairs: {}\n",
        outcome.patterns.category_thresholds.len()
    ));

    out.push_str("\n## Synthesis\n\n");
    let syn = &outcome.synthesis;
    out.push_str(&format!(
        "- Curated/suggested/inferred: {}/{}/{}\n",
        syn.curated, syn.suggested, syn.inferred
    ));
    out.push_str(&format!("- Dropped references: {}\n", syn.dropped_references));
    out.push_str(&format!("- Duplicates skipped: {}\n", syn.duplicates));
    if syn.skipped_no_embedding > 0 {
        out.push_str(&format!(
            "- Items without embeddings: {}\n",
            syn.skipped_no_embedding
        ));
    }
    let r = &outcome.refine;
    out.push_str(&format!(
        "- Refiner bridges/contradictions: {}/{} ({} of {} pairs examined)\n",
        r.bridges, r.contradictions, r.examined, r.candidates
    ));

    out.push_str("\n## Readability\n\n");
    let rd = &outcome.readability;
    if rd.noop {
        out.push_str("- Already within target density; nothing pruned\n");
    }
    out.push_str(&format!(
        "- Edges {} -> {} (target {})\n",
        rd.original_edges, rd.final_edges, rd.target_edges
    ));
    out.push_str(&format!(
        "- Average degree: {:.2}\n- Density goal met: {}\n- Degree goal met: {}\n",
        rd.avg_degree, rd.density_goal_met, rd.degree_goal_met
    ));

    out.push_str("\n## Edges\n\n");
    out.push_str("| Type | Count | Share | Avg strength |\n|---|---|---|---|\n");
    for relation in RelationType::ALL {
        if let Some(t) = v.type_stats.get(&relation) {
            out.push_str(&format!(
                "| {} | {} | {:.2} | {:.3} |\n",
                relation, t.count, t.share, t.avg_strength
            ));
        }
    }
    out.push('\n');
    for provenance in [Provenance::Curated, Provenance::Suggested, Provenance::Inferred] {
        let count = meta.by_provenance.get(&provenance).copied().unwrap_or(0);
        out.push_str(&format!("- {}: {}\n", provenance.as_str(), count));
    }

    out.push_str("\n## Validation\n\n");
    let c = &v.components;
    out.push_str(&format!("- Curated coverage: {:.3}\n", c.curated_coverage));
    out.push_str(&format!("- Suggestion coverage: {:.3}\n", c.suggestion_coverage));
    out.push_str(&format!("- Inferred quality: {:.3}\n", c.inferred_quality));
    out.push_str(&format!("- Diversity: {:.3}\n", c.diversity));
    out.push_str(&format!("- Bridge coverage: {:.3}\n", c.bridge_coverage));
    out.push_str(&format!("- Connectivity: {:.3}\n", c.connectivity));
    out.push_str(&format!(
        "- Precision/recall/F1: {:.3}/{:.3}/{:.3} ({} sampled)\n",
        v.precision.precision, v.precision.recall, v.precision.f1, v.precision.sampled
    ));

    out
}
