use anyhow::Result;
use clusterpool_core::{Cluster, labels};
use clusterpool_lock::selector::matches_filter;

use super::{Outcome, Session};

/// Print the pool, optionally narrowed to clusters matching `filter`.
pub async fn list(session: &Session, filter: &[String], format: &str) -> Result<Outcome> {
    let filter = labels::parse(filter);
    let manager = session.manager(session.keys(None, None)).await?;
    let clusters: Vec<Cluster> = manager
        .list()
        .await?
        .into_iter()
        .filter(|c| matches_filter(c, &filter))
        .collect();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&clusters)?),
        _ => print!("{}", render_table(&clusters, &manager.keys().lock_label)),
    }
    Ok(Outcome::Done)
}

fn render_table(clusters: &[Cluster], lock_label: &str) -> String {
    let name_width = clusters
        .iter()
        .map(|c| c.name.len())
        .chain([4])
        .max()
        .unwrap_or(4);
    let mut out = format!("{:<name_width$}  {:<6}  {:<24}  LABELS\n", "NAME", "STATE", "LOCATION");
    for cluster in clusters {
        let state = if cluster.is_locked(lock_label) { "locked" } else { "free" };
        out.push_str(&format!(
            "{:<name_width$}  {state:<6}  {:<24}  {}\n",
            cluster.name,
            cluster.connection.location,
            labels::format(&cluster.labels),
        ));
    }
    out
}
