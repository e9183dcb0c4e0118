use anyhow::Result;
use clusterpool_core::labels;
use clusterpool_lock::LockError;

use super::{Outcome, Session, picker};

/// Merge `pairs` over a cluster's labels.
pub async fn label(session: &Session, name: Option<String>, pairs: &[String]) -> Result<Outcome> {
    let new_labels = labels::parse(pairs);
    if new_labels.is_empty() {
        return Err(LockError::MissingOption("--label".to_string()).into());
    }

    let keys = session.keys(None, None);
    let name = match name {
        Some(name) => name,
        None => picker::pick(session, &keys, "label").await?,
    };
    let manager = session.manager(keys).await?;

    let written = manager.label(&name, &new_labels).await?;

    println!("✓ Labelled cluster {name}");
    println!("  Labels: {}", labels::format(&written));
    Ok(Outcome::Done)
}
