//! Interactive cluster choice for commands run without `--name`.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Result, anyhow, bail};
use clusterpool_core::{Cluster, LockKeys, labels};
use clusterpool_lock::LockError;

use super::Session;

/// List the pool on stderr and read the user's choice from stdin.
///
/// Without a terminal on stdin there is nobody to ask, so the missing
/// `--name` is reported instead.
pub async fn pick(session: &Session, keys: &LockKeys, action: &str) -> Result<String> {
    if !io::stdin().is_terminal() {
        return Err(LockError::MissingOption("--name".to_string()).into());
    }
    pick_with(session, keys, action, prompt_stdin).await
}

/// Like [`pick`] with the question asked by `prompt`, which receives the
/// rendered choices and returns the raw answer.
///
/// The registry is closed before `prompt` runs, so the pool stays usable
/// by others for as long as the answer takes.
pub(crate) async fn pick_with<P>(
    session: &Session,
    keys: &LockKeys,
    action: &str,
    prompt: P,
) -> Result<String>
where
    P: FnOnce(&str, &str) -> Result<String>,
{
    let clusters = {
        let manager = session.manager(keys.clone()).await?;
        manager.list().await?
    };
    if clusters.is_empty() {
        bail!("the pool has no clusters to {action}");
    }

    let choices = render_choices(&clusters, &keys.lock_label);
    let question = format!("Cluster to {action} [1-{}]: ", clusters.len());
    let answer = prompt(&choices, &question)?;
    parse_choice(&clusters, &answer).ok_or_else(|| anyhow!("no cluster matches {:?}", answer.trim()))
}

fn prompt_stdin(choices: &str, question: &str) -> Result<String> {
    {
        let mut stderr = io::stderr().lock();
        write!(stderr, "{choices}{question}")?;
        stderr.flush()?;
    }
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

fn render_choices(clusters: &[Cluster], lock_label: &str) -> String {
    let width = clusters.iter().map(|c| c.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for (i, cluster) in clusters.iter().enumerate() {
        let state = match cluster.label(lock_label) {
            Some(token) => format!("locked {token}"),
            None => "free".to_string(),
        };
        out.push_str(&format!(
            "{:>3}) {:<width$}  {state}  {}\n",
            i + 1,
            cluster.name,
            labels::format(&cluster.labels),
        ));
    }
    out
}

/// A 1-based index into `clusters`, or a cluster name.
fn parse_choice(clusters: &[Cluster], input: &str) -> Option<String> {
    let input = input.trim();
    if let Ok(index) = input.parse::<usize>() {
        return index
            .checked_sub(1)
            .and_then(|i| clusters.get(i))
            .map(|c| c.name.clone());
    }
    clusters
        .iter()
        .find(|c| c.name == input)
        .map(|c| c.name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil::{seed, session, stored};
    use crate::commands::{Outcome, lock, unlock};
    use clusterpool_core::ConnectionInfo;

    fn pool() -> Vec<Cluster> {
        vec![
            Cluster::new("alpha", ConnectionInfo::new("p", "us-east1"))
                .with_labels(labels::parse(["locked=tok1"])),
            Cluster::new("beta", ConnectionInfo::new("p", "us-east1")),
        ]
    }

    #[test]
    fn choice_by_index_or_name() {
        let clusters = pool();
        assert_eq!(parse_choice(&clusters, "1\n").as_deref(), Some("alpha"));
        assert_eq!(parse_choice(&clusters, " beta ").as_deref(), Some("beta"));
    }

    #[test]
    fn choice_out_of_range_or_unknown() {
        let clusters = pool();
        assert_eq!(parse_choice(&clusters, "0"), None);
        assert_eq!(parse_choice(&clusters, "3"), None);
        assert_eq!(parse_choice(&clusters, "gamma"), None);
        assert_eq!(parse_choice(&clusters, ""), None);
    }

    #[test]
    fn choices_show_lock_state() {
        let rendered = render_choices(&pool(), "locked");
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("  1) alpha"));
        assert!(lines[0].contains("locked tok1"));
        assert!(lines[1].contains("free"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pool_stays_usable_while_the_prompt_waits() {
        let dir = tempfile::tempdir().unwrap();
        let s = session(dir.path());
        seed(&s, &[("a", &["locked=tok1"]), ("b", &[])]);
        let keys = LockKeys::default();

        let name = pick_with(&s, &keys, "unlock", |choices, _| {
            assert!(choices.contains("locked tok1"));
            // Another CI job locks while this user is still deciding.
            let other = session(dir.path());
            let request = lock::LockRequest {
                keys: LockKeys::default(),
                test: Some("nightly".to_string()),
                filter: Vec::new(),
                wait: None,
            };
            let outcome = tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current().block_on(lock::lock(&other, request))
            })
            .unwrap();
            assert_eq!(outcome, Outcome::Done);
            Ok("1\n".to_string())
        })
        .await
        .unwrap();
        assert_eq!(name, "a");

        unlock::unlock(&s, keys, Some(name), None).await.unwrap();

        assert!(!stored(&s, "a").labels.contains_key("locked"));
        assert_eq!(stored(&s, "b").labels["test"], "nightly");
    }

    #[tokio::test]
    async fn empty_pool_has_nothing_to_pick() {
        let dir = tempfile::tempdir().unwrap();
        let s = session(dir.path());

        let err = pick_with(&s, &LockKeys::default(), "label", |_, _| Ok("1".to_string()))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("no clusters to label"));
    }

    #[tokio::test]
    async fn unknown_answer_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let s = session(dir.path());
        seed(&s, &[("a", &[])]);

        let err = pick_with(&s, &LockKeys::default(), "unlock", |_, question| {
            assert_eq!(question, "Cluster to unlock [1-1]: ");
            Ok("zeta".to_string())
        })
        .await
        .unwrap_err();

        assert!(err.to_string().contains("zeta"));
    }
}
