use anyhow::Result;
use clusterpool_core::{LockKeys, labels};

use super::{Outcome, Session, picker};

/// Release a cluster, picking one interactively when `name` is omitted.
pub async fn unlock(
    session: &Session,
    keys: LockKeys,
    name: Option<String>,
    token: Option<String>,
) -> Result<Outcome> {
    let name = match name {
        Some(name) => name,
        None => picker::pick(session, &keys, "unlock").await?,
    };
    let manager = session.manager(keys).await?;

    let remaining = manager.unlock(&name, token.as_deref()).await?;

    println!("✓ Unlocked cluster {name}");
    if !remaining.is_empty() {
        println!("  Labels: {}", labels::format(&remaining));
    }
    Ok(Outcome::Done)
}
