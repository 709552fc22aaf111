//! Git persistence of the state document.
//!
//! After a run changes the state file it can be committed (and pushed) so
//! the next run on another machine starts from the same observations.
//! Commit and push failures never fail the run; [`persist_state`] logs them
//! and reports what it managed to do.

use std::path::{Path, PathBuf};
use std::process::Command;

use git2::{ErrorCode, Oid, Repository};
use serde::Serialize;

use crate::config::PersistConfig;
use crate::error::{Error, Result};

/// Discover the repository containing `start` and require a working tree.
pub fn discover_repo(start: &Path) -> Result<Repository> {
    let repo = Repository::discover(start).map_err(|err| {
        if err.code() == ErrorCode::NotFound {
            Error::OperationFailed(format!("no git repository found at {}", start.display()))
        } else {
            Error::Git(err)
        }
    })?;
    if repo.is_bare() {
        return Err(Error::OperationFailed(
            "bare repositories are not supported".to_string(),
        ));
    }
    Ok(repo)
}

/// Return the repository workdir (root of the working tree).
pub fn workdir(repo: &Repository) -> Result<PathBuf> {
    repo.workdir()
        .map(|path| path.to_path_buf())
        .ok_or_else(|| Error::OperationFailed("repository has no working directory".to_string()))
}

/// Stage one file, given by any path that resolves inside the working tree.
pub fn stage_path(repo: &Repository, path: &Path) -> Result<PathBuf> {
    let root = workdir(repo)?.canonicalize()?;
    let absolute = path.canonicalize()?;
    let relative = absolute
        .strip_prefix(&root)
        .map_err(|_| {
            Error::OperationFailed(format!(
                "{} is outside the repository at {}",
                path.display(),
                root.display()
            ))
        })?
        .to_path_buf();

    let mut index = repo.index()?;
    index.add_path(&relative)?;
    index.write()?;
    Ok(relative)
}

/// Options for creating a commit.
#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    /// Author name (defaults to Git config).
    pub author_name: Option<String>,
    /// Author email (defaults to Git config).
    pub author_email: Option<String>,
}

/// Commit the index on top of HEAD.
///
/// Returns `None` when the index tree equals HEAD's tree.
pub fn create_commit(
    repo: &Repository,
    message: &str,
    options: &CommitOptions,
) -> Result<Option<Oid>> {
    let mut index = repo.index()?;
    let tree_oid = index.write_tree()?;
    let tree = repo.find_tree(tree_oid)?;

    let parents = match repo.head() {
        Ok(head) => vec![head.peel_to_commit()?],
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
            vec![]
        }
        Err(e) => return Err(Error::Git(e)),
    };
    let parent_refs: Vec<&git2::Commit> = parents.iter().collect();

    if let Some(parent) = parent_refs.first() {
        if parent.tree_id() == tree_oid {
            return Ok(None);
        }
    }

    let signature = match (&options.author_name, &options.author_email) {
        (Some(name), Some(email)) => git2::Signature::now(name, email)?,
        _ => repo.signature()?,
    };

    let oid = repo.commit(
        Some("HEAD"),
        &signature,
        &signature,
        message,
        &tree,
        &parent_refs,
    )?;
    Ok(Some(oid))
}

/// Whether HEAD's branch has commits its upstream does not.
///
/// A detached HEAD or a branch without upstream counts as not ahead.
pub fn ahead_of_upstream(repo: &Repository) -> Result<bool> {
    let head = match repo.head() {
        Ok(head) if head.is_branch() => head,
        Ok(_) => return Ok(false),
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
            return Ok(false)
        }
        Err(e) => return Err(Error::Git(e)),
    };
    let Some(local) = head.target() else {
        return Ok(false);
    };

    let branch = git2::Branch::wrap(head);
    let upstream = match branch.upstream() {
        Ok(upstream) => upstream,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(false),
        Err(e) => return Err(Error::Git(e)),
    };
    let Some(remote) = upstream.get().target() else {
        return Ok(false);
    };

    let (ahead, _behind) = repo.graph_ahead_behind(local, remote)?;
    Ok(ahead > 0)
}

/// Push the current branch to its upstream with the git CLI.
///
/// libgit2 push needs credential callbacks; the CLI reuses whatever the
/// host already has configured.
pub fn push(workdir: &Path) -> Result<()> {
    let output = Command::new("git")
        .arg("push")
        .current_dir(workdir)
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::OperationFailed(format!(
            "git push failed: {}",
            stderr.trim()
        )));
    }
    Ok(())
}

/// What [`persist_state`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PersistOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    pub pushed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Commit `state_path` (and push when configured). Never fails.
///
/// Safe to call on every run: an unchanged tree produces no commit, and
/// commits left unpushed by an earlier failure are pushed again.
pub fn persist_state(state_path: &Path, config: &PersistConfig) -> PersistOutcome {
    let mut outcome = PersistOutcome::default();
    if !config.git_commit {
        return outcome;
    }

    let message = format!(
        "{} - {}",
        config.message.trim(),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    let committed = match commit_state_file(state_path, config, &message) {
        Ok(committed) => committed,
        Err(err) => {
            tracing::error!(path = %state_path.display(), error = %err, "failed to commit state");
            outcome.error = Some(err.to_string());
            return outcome;
        }
    };

    match committed.oid {
        Some(oid) => {
            tracing::info!(commit = %oid, path = %state_path.display(), "state committed");
            outcome.commit = Some(oid.to_string());
        }
        None => {
            tracing::debug!(path = %state_path.display(), "state unchanged in git, nothing to commit");
        }
    }

    if config.git_push && (committed.oid.is_some() || committed.ahead) {
        match push(&committed.root) {
            Ok(()) => {
                tracing::info!("state pushed");
                outcome.pushed = true;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to push state commit");
                outcome.error = Some(err.to_string());
            }
        }
    }

    outcome
}

struct StateCommit {
    oid: Option<Oid>,
    root: PathBuf,
    /// Branch ahead of upstream with no new commit; only checked for pushes.
    ahead: bool,
}

fn commit_state_file(
    state_path: &Path,
    config: &PersistConfig,
    message: &str,
) -> Result<StateCommit> {
    let start = match config.repo.as_deref() {
        Some(repo) => repo.to_path_buf(),
        None => state_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let repo = discover_repo(&start)?;
    let root = workdir(&repo)?;
    stage_path(&repo, state_path)?;

    let options = CommitOptions {
        author_name: config.author_name.clone(),
        author_email: config.author_email.clone(),
    };
    let oid = create_commit(&repo, message, &options)?;
    let ahead = oid.is_none() && config.git_push && ahead_of_upstream(&repo)?;
    Ok(StateCommit { oid, root, ahead })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    fn init_test_repo() -> (TempDir, Repository) {
        let temp = TempDir::new().unwrap();

        Command::new("git")
            .args(["init"])
            .current_dir(temp.path())
            .output()
            .unwrap();
        Command::new("git")
            .args(["config", "user.email", "test@test.com"])
            .current_dir(temp.path())
            .output()
            .unwrap();
        Command::new("git")
            .args(["config", "user.name", "Test"])
            .current_dir(temp.path())
            .output()
            .unwrap();

        std::fs::write(temp.path().join("README.md"), "# Test\n").unwrap();
        Command::new("git")
            .args(["add", "."])
            .current_dir(temp.path())
            .output()
            .unwrap();
        Command::new("git")
            .args(["commit", "-m", "Initial commit"])
            .current_dir(temp.path())
            .output()
            .unwrap();

        let repo = Repository::open(temp.path()).unwrap();
        (temp, repo)
    }

    fn git(dir: &std::path::Path, args: &[&str]) {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(output.status.success(), "git {args:?} failed: {output:?}");
    }

    fn head_message(repo: &Repository) -> String {
        repo.head()
            .unwrap()
            .peel_to_commit()
            .unwrap()
            .message()
            .unwrap_or_default()
            .to_string()
    }

    fn commit_config() -> PersistConfig {
        PersistConfig {
            git_commit: true,
            author_name: Some("Ticket Monitor".to_string()),
            author_email: Some("monitor@example.com".to_string()),
            ..PersistConfig::default()
        }
    }

    #[test]
    fn test_persist_commits_changed_state() {
        let (temp, repo) = init_test_repo();
        let data = temp.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        let state = data.join("ticket_state.json");
        std::fs::write(&state, "{}\n").unwrap();

        let outcome = persist_state(&state, &commit_config());
        assert!(outcome.commit.is_some(), "{outcome:?}");
        assert!(!outcome.pushed);
        assert!(outcome.error.is_none());
        assert!(head_message(&repo).starts_with("chore: update ticket state - "));

        let author = repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(author.author().name(), Some("Ticket Monitor"));
    }

    #[test]
    fn test_persist_skips_unchanged_state() {
        let (temp, repo) = init_test_repo();
        let state = temp.path().join("state.json");
        std::fs::write(&state, "{}\n").unwrap();

        assert!(persist_state(&state, &commit_config()).commit.is_some());
        let head = repo.head().unwrap().target().unwrap();

        let again = persist_state(&state, &commit_config());
        assert!(again.commit.is_none());
        assert!(again.error.is_none());
        assert_eq!(repo.head().unwrap().target().unwrap(), head);
    }

    #[test]
    fn test_persist_picks_up_state_left_uncommitted() {
        let (temp, repo) = init_test_repo();
        let state = temp.path().join("state.json");
        std::fs::write(&state, "{\"100\": {}}\n").unwrap();
        let head = repo.head().unwrap().target().unwrap();

        // Earlier run saved the file but could not commit it.
        let elsewhere = TempDir::new().unwrap();
        let broken = PersistConfig {
            repo: Some(elsewhere.path().to_path_buf()),
            ..commit_config()
        };
        assert!(persist_state(&state, &broken).error.is_some());
        assert_eq!(repo.head().unwrap().target().unwrap(), head);

        // The file itself is unchanged since, yet the next run commits it.
        let outcome = persist_state(&state, &commit_config());
        assert!(outcome.commit.is_some(), "{outcome:?}");
        assert_ne!(repo.head().unwrap().target().unwrap(), head);
    }

    #[test]
    fn test_persist_pushes_commit_left_unpushed() {
        let (temp, repo) = init_test_repo();
        let remote = TempDir::new().unwrap();
        git(remote.path(), &["init", "--bare"]);
        git(
            temp.path(),
            &["remote", "add", "origin", remote.path().to_str().unwrap()],
        );
        git(temp.path(), &["push", "-u", "origin", "HEAD"]);
        assert!(!ahead_of_upstream(&repo).unwrap());

        let state = temp.path().join("state.json");
        std::fs::write(&state, "{}\n").unwrap();
        let committed = persist_state(&state, &commit_config());
        assert!(committed.commit.is_some());
        assert!(!committed.pushed);
        assert!(ahead_of_upstream(&repo).unwrap());

        let config = PersistConfig {
            git_push: true,
            ..commit_config()
        };
        let outcome = persist_state(&state, &config);
        assert!(outcome.commit.is_none());
        assert!(outcome.pushed, "{outcome:?}");
        assert!(outcome.error.is_none());
        assert!(!ahead_of_upstream(&repo).unwrap());
    }

    #[test]
    fn test_ahead_without_upstream_is_false() {
        let (_temp, repo) = init_test_repo();
        assert!(!ahead_of_upstream(&repo).unwrap());
    }

    #[test]
    fn test_persist_disabled_does_nothing() {
        let (temp, repo) = init_test_repo();
        let state = temp.path().join("state.json");
        std::fs::write(&state, "{}\n").unwrap();

        let outcome = persist_state(&state, &PersistConfig::default());
        assert_eq!(outcome, PersistOutcome::default());
        assert_eq!(head_message(&repo).trim(), "Initial commit");
    }

    #[test]
    fn test_persist_outside_repo_reports_error() {
        let temp = TempDir::new().unwrap();
        let state = temp.path().join("state.json");
        std::fs::write(&state, "{}\n").unwrap();

        let config = PersistConfig {
            repo: Some(temp.path().to_path_buf()),
            ..commit_config()
        };
        let outcome = persist_state(&state, &config);
        assert!(outcome.commit.is_none());
        assert!(outcome.error.is_some());
    }

    #[test]
    fn test_push_without_remote_is_error() {
        let (temp, _repo) = init_test_repo();
        assert!(push(temp.path()).is_err());
    }

    #[test]
    fn test_stage_path_rejects_outside_file() {
        let (_temp, repo) = init_test_repo();
        let other = TempDir::new().unwrap();
        let file = other.path().join("x.json");
        std::fs::write(&file, "{}").unwrap();
        assert!(stage_path(&repo, &file).is_err());
    }
}
