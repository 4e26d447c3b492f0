//! Human-readable and JSON rendering of engine reports.

use rollover_engine::{
  ConsistencyReport, MergeReport, PromotionReport,
  report::{ConsistencyViolation, UnmatchedReason},
};
use serde::Serialize;

fn json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

pub fn promotion(report: &PromotionReport, as_json: bool) -> anyhow::Result<()> {
  if as_json {
    return json(report);
  }

  let mode = if report.dry_run { " (dry run)" } else { "" };
  println!("promotion {} -> {}{mode}", report.source_year_id, report.target_year_id);
  if report.skipped_already_done {
    println!("  source year already promoted; nothing to do (use --force to rerun)");
    return Ok(());
  }
  println!("  source enrollments  {}", report.source_enrollments);
  println!("  planned             {}", report.planned);
  println!("  created             {}", report.created);
  println!("  skipped duplicate   {}", report.skipped_duplicate);
  println!("  unmatched           {}", report.unmatched.len());
  println!("  failed              {}", report.failed.len());
  if report.pending > 0 {
    println!("  pending             {}", report.pending);
  }
  if report.replaced > 0 {
    println!("  replaced            {}", report.replaced);
  }
  if report.ledger_repaired > 0 {
    println!("  ledger repaired     {}", report.ledger_repaired);
  }
  println!("  batches             {}/{}", report.batches_completed, report.batches_total);
  if report.cancelled {
    println!("  cancelled; rerun to apply the remaining batches");
  }
  if report.marked_done {
    println!("  source year marked as promoted");
  }

  for c in &report.class_plan {
    let to = match (&c.to_class_name, c.graduating) {
      (Some(name), _) => name.clone(),
      (None, true) => "graduating".to_owned(),
      (None, false) => "no class".to_owned(),
    };
    let grade = c.next_grade.map_or_else(|| "?".to_owned(), |g| g.to_string());
    println!("  class {:<10} -> {to:<10} grade {grade:<3} students {}", c.from_class_name, c.students);
  }
  for u in &report.unmatched {
    let why = match &u.reason {
      UnmatchedReason::NoTargetClass { next_grade } => format!("no class at grade {next_grade}"),
      UnmatchedReason::Graduating => "graduating".to_owned(),
    };
    println!("  unmatched {} (class {}): {why}", u.student_id, u.from_class_id);
  }
  for f in &report.failed {
    println!("  failed    {} [{:?}]: {}", f.student_id, f.kind, f.message);
  }
  for r in &report.retained {
    println!(
      "  retained  {} in {} (requested {})",
      r.student_id, r.existing_class_id, r.requested_class_id
    );
  }
  for id in &report.ignored_overrides {
    println!("  ignored override for {id}: no ACTIVE source enrollment");
  }
  Ok(())
}

pub fn consistency(report: &ConsistencyReport, as_json: bool) -> anyhow::Result<()> {
  if as_json {
    return json(report);
  }

  let verdict = if report.is_consistent { "consistent" } else { "INCONSISTENT" };
  println!("verify {} -> {}: {verdict}", report.source_year_id, report.target_year_id);
  println!("  distinct students    {}", report.distinct_students);
  println!("  active enrollments   {}", report.active_enrollments);
  println!("  progression records  {}", report.progression_records);
  println!("  promotion done       {}", report.promotion_done);
  for v in &report.violations {
    match v {
      ConsistencyViolation::DuplicateActiveEnrollment { student_id, class_ids } => {
        println!("  student {student_id} is ACTIVE in {} classes", class_ids.len());
      }
      ConsistencyViolation::CountMismatch { distinct_students, active_enrollments } => {
        println!("  {active_enrollments} active enrollments for {distinct_students} students");
      }
    }
  }
  Ok(())
}

pub fn merge(report: &MergeReport, as_json: bool) -> anyhow::Result<()> {
  if as_json {
    return json(report);
  }

  let mode = if report.dry_run { " (dry run)" } else { "" };
  println!("merge {}{mode}", report.academic_year_id);
  println!("  students      {}", report.students.len());
  println!("  deactivated   {}", report.deactivated);
  for s in &report.students {
    println!(
      "  {} keeps {}, drops {}",
      s.student_id,
      s.kept_class_id,
      s.deactivated_class_ids.len()
    );
  }
  Ok(())
}
