//! `clusterpool cluster lock`: claim a cluster and switch to it.

use std::time::{Duration, Instant};

use anyhow::Result;
use clusterpool_core::{Labels, LockKeys, labels};
use clusterpool_lock::{Claim, ClusterRegistry};
use tracing::info;

use super::{Manager, Outcome, Session, shell_word};

/// First pause of the `--wait` loop.
const WAIT_INITIAL: Duration = Duration::from_secs(1);
/// Longest pause of the `--wait` loop.
const WAIT_MAX: Duration = Duration::from_secs(30);

pub struct LockRequest {
    pub keys: LockKeys,
    pub test: Option<String>,
    pub filter: Vec<String>,
    /// Keep retrying for this long while no cluster is free.
    pub wait: Option<Duration>,
}

pub async fn lock(session: &Session, request: LockRequest) -> Result<Outcome> {
    let filter = labels::parse(&request.filter);

    let Some((manager, claim)) = claim_with_wait(session, &request, &filter).await? else {
        if filter.is_empty() {
            eprintln!("no cluster found matching constraints: every cluster is locked");
        } else {
            eprintln!(
                "no cluster found matching constraints: {}",
                labels::format(&filter)
            );
        }
        return Ok(Outcome::NoCluster);
    };

    let keys = manager.keys().clone();
    let identity = manager.registry().identity();
    // Connecting can take a while; other callers need the pool meanwhile.
    drop(manager);

    let unlock = unlock_command(session, &keys, &claim);
    let reader = session.context_reader();
    let verifier = session.verifier(keys, identity);
    let context = match verifier.verify_connect(&claim.cluster, reader.as_ref()).await {
        Ok(context) => context,
        Err(e) => {
            eprintln!(
                "cluster {} is locked but could not be connected; release it with:\n  {unlock}",
                claim.cluster.name
            );
            return Err(e.into());
        }
    };

    println!("✓ Locked cluster {}", claim.cluster.name);
    println!("  Token:   {}", claim.token);
    println!("  Context: {context}");
    println!("To release it run:\n  {unlock}");
    Ok(Outcome::Done)
}

/// Run the claim protocol, repeating it with growing pauses until `wait`
/// runs out. The registry is reopened per attempt so the pool is not held
/// while sleeping.
async fn claim_with_wait(
    session: &Session,
    request: &LockRequest,
    filter: &Labels,
) -> Result<Option<(Manager, Claim)>> {
    let deadline = request.wait.map(|wait| Instant::now() + wait);
    let mut backoff = WAIT_INITIAL;

    loop {
        let manager = session.manager(request.keys.clone()).await?;
        if let Some(claim) = manager.lock(request.test.as_deref(), filter).await? {
            return Ok(Some((manager, claim)));
        }
        drop(manager);

        let Some(deadline) = deadline else {
            return Ok(None);
        };
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        let pause = backoff.min(deadline - now);
        info!(?pause, "no cluster available, waiting");
        tokio::time::sleep(pause).await;
        backoff = next_backoff(backoff);
    }
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(WAIT_MAX)
}

/// The command that releases `claim`, printed for the caller to run later.
fn unlock_command(session: &Session, keys: &LockKeys, claim: &Claim) -> String {
    let mut parts = vec!["clusterpool".to_string()];
    if let Some(path) = session.config_arg() {
        parts.push("--config".to_string());
        parts.push(shell_word(&path.display().to_string()));
    }
    parts.extend([
        "cluster".to_string(),
        "unlock".to_string(),
        "--label".to_string(),
        shell_word(&keys.lock_label),
        "--test-label".to_string(),
        shell_word(&keys.test_label),
        "--name".to_string(),
        shell_word(&claim.cluster.name),
        "--token".to_string(),
        shell_word(&claim.token),
    ]);
    parts.join(" ")
}
